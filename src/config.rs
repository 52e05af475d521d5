// config.rs -- external configuration surface
//
// Ground: spec.md section 6 enumerates these fields directly. Shaped as a
// plain struct owned by the caller, the way the teacher's ClientStatic
// holds per-connection settings rather than reading global cvars -- this
// crate has no cvar subsystem, so the struct is the whole story.

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_ip: String,
    pub server_port: u16,
    pub player_name: String,
    pub passive_mode: bool,
    pub monitor_mode: bool,
    pub monitor_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    pub debug: bool,
}

impl ClientConfig {
    pub fn new(server_ip: impl Into<String>, player_name: impl Into<String>) -> Self {
        Self {
            server_ip: server_ip.into(),
            server_port: super::protocol::PORT_SERVER,
            player_name: player_name.into(),
            passive_mode: false,
            monitor_mode: false,
            monitor_interval_ms: 5000,
            max_reconnect_attempts: 5,
            debug: false,
        }
    }
}
