// client.rs -- top-level wiring: socket, netchan, handshake, decoder, events
//
// Ground: myq2-client::cl_main.rs's CLS/ClientState globals and its
// CL_Frame-style poll loop (send connect/resend, read packets, run the
// parse dispatch), reshaped into one owned `Q2Client` value per spec.md
// section 9 instead of global `Mutex`-guarded statics. The render/sound/
// prediction subsystems `CL_Frame` also drives have no counterpart here;
// this crate's poll step is socket I/O, handshake progression, and event
// emission only.

use crate::config::ClientConfig;
use crate::decoder::{Decoder, Signal};
use crate::entity::EntityState;
use crate::error::ClientError;
use crate::events::{Event, EventPayload, EventSink};
use crate::handshake::{Handshake, HandshakeState};
use crate::monitor::{parse_status_response, MonitorEvent, MonitorPoller};
use crate::net_chan::Netchan;
use crate::oob::{self, OobCommand};
use crate::player::PlayerState;
use crate::protocol::CLC_STRINGCMD;
use crate::socket::{ClientSocket, Incoming};

/// Drives one connection's worth of protocol state. Not `Send`/`Sync` by
/// design -- spec.md section 9's single-threaded cooperative model means
/// one task owns this value and polls it from an event loop or a single
/// dedicated thread.
pub struct Q2Client {
    config: ClientConfig,
    qport: u16,
    socket: Option<ClientSocket>,
    netchan: Option<Netchan>,
    handshake: Handshake,
    decoder: Decoder,
    sink: EventSink,
    monitor: MonitorPoller,
    next_monitor_poll_ms: u64,
    reconnect_at_ms: Option<u64>,
}

impl Q2Client {
    pub fn new(config: ClientConfig) -> Self {
        let qport = rand::random::<u16>().max(1);
        let handshake = Handshake::new(&config, qport);
        Self {
            config,
            qport,
            socket: None,
            netchan: None,
            handshake,
            decoder: Decoder::new(),
            sink: EventSink::new(),
            monitor: MonitorPoller::new(),
            next_monitor_poll_ms: 0,
            reconnect_at_ms: None,
        }
    }

    /// Opens the UDP socket and, in full-protocol mode, sends the initial
    /// `getchallenge`. In monitor mode no netchan is ever established --
    /// only OOB status queries are sent (spec.md section 6: "if set, OOB
    /// status polling only; no netchan").
    pub fn connect(&mut self, now_ms: u64) -> Result<(), ClientError> {
        let socket = ClientSocket::connect(&self.config.server_ip, self.config.server_port)?;
        if self.config.monitor_mode {
            self.next_monitor_poll_ms = now_ms;
        } else {
            let packet = self.handshake.start_connect();
            socket.send(&packet).map_err(ClientError::Transport)?;
            self.sink.push(now_ms, EventPayload::Connection { state: "connecting" });
        }
        self.socket = Some(socket);
        Ok(())
    }

    /// Best-effort teardown: sends OOB `disconnect`, drops the socket, and
    /// emits a final `connection{status=disconnected}` event. Never errors
    /// -- a failed send here has nothing left to recover into.
    pub fn disconnect(&mut self, now_ms: u64) {
        if let Some(socket) = &self.socket {
            let _ = socket.send(&crate::net_chan::out_of_band_print("disconnect\n"));
        }
        self.socket = None;
        self.netchan = None;
        self.sink.push(now_ms, EventPayload::Connection { state: "disconnected" });
    }

    /// One iteration of the event loop: drains pending datagrams, advances
    /// the handshake, sends any commands now due, and polls the monitor
    /// timer. Call this from a loop driven by socket readiness and/or a
    /// coarse timer tick (spec.md section 4.6's "scheduling model").
    pub fn poll(&mut self, now_ms: u64) -> Result<(), ClientError> {
        if self.config.monitor_mode {
            self.poll_monitor(now_ms)?;
            return Ok(());
        }

        if let Some(due) = self.reconnect_at_ms {
            if now_ms >= due {
                self.reconnect_at_ms = None;
                self.restart_challenge(now_ms)?;
            }
        }

        let incoming = match &self.socket {
            Some(socket) => socket.poll().map_err(ClientError::Transport)?,
            None => return Ok(()),
        };

        for datagram in incoming {
            match datagram {
                Incoming::OutOfBand(data) => self.handle_oob_datagram(&data, now_ms)?,
                Incoming::Sequenced(data) => self.handle_sequenced_datagram(&data, now_ms)?,
            }
        }

        self.flush_reliable_commands(now_ms)?;
        Ok(())
    }

    fn poll_monitor(&mut self, now_ms: u64) -> Result<(), ClientError> {
        if now_ms >= self.next_monitor_poll_ms {
            if let Some(socket) = &self.socket {
                socket.send(&oob::build_status_query()).map_err(ClientError::Transport)?;
            }
            self.next_monitor_poll_ms = now_ms + self.config.monitor_interval_ms;
        }

        let incoming = match &self.socket {
            Some(socket) => socket.poll().map_err(ClientError::Transport)?,
            None => return Ok(()),
        };
        for datagram in incoming {
            if let Incoming::OutOfBand(data) = datagram {
                if let Some(OobCommand::StatusResponse(body) | OobCommand::Print(body)) = oob::parse(&data) {
                    let status = parse_status_response(&body);
                    for event in self.monitor.observe(status) {
                        self.sink.push(now_ms, monitor_event_to_payload(event));
                    }
                }
            }
        }
        Ok(())
    }

    fn restart_challenge(&mut self, now_ms: u64) -> Result<(), ClientError> {
        let packet = self.handshake.start_connect();
        if let Some(socket) = &self.socket {
            socket.send(&packet).map_err(ClientError::Transport)?;
        }
        self.sink.push(now_ms, EventPayload::Connection { state: "reconnecting" });
        Ok(())
    }

    fn handle_oob_datagram(&mut self, data: &[u8], now_ms: u64) -> Result<(), ClientError> {
        let Some(cmd) = oob::parse(data) else { return Ok(()) };

        if let OobCommand::Print(text) = &cmd {
            if text.to_ascii_lowercase().contains("rejected") {
                return Err(ClientError::HandshakeRejected(text.clone()));
            }
        }

        let prev_state = self.handshake.state();
        if let Some(packet) = self.handshake.handle_oob(&cmd) {
            if let Some(socket) = &self.socket {
                socket.send(&packet).map_err(ClientError::Transport)?;
            }
        }
        let new_state = self.handshake.state();

        if new_state != prev_state {
            self.on_state_change(new_state, now_ms);
            if new_state == HandshakeState::Connected {
                let protocol = self.handshake.protocol().unwrap_or(crate::protocol::ProtocolVersion::Vanilla);
                self.netchan = Some(Netchan::setup(protocol, self.qport));
            }
        }
        Ok(())
    }

    fn handle_sequenced_datagram(&mut self, data: &[u8], now_ms: u64) -> Result<(), ClientError> {
        let Some(netchan) = &mut self.netchan else { return Ok(()) };
        let payload = match netchan.process(data) {
            Ok(Some(p)) => p,
            Ok(None) => return Ok(()),
            Err(_) => return Ok(()),
        };

        let signals = self.decoder.decode(&payload, &mut self.sink, now_ms);
        for signal in signals {
            self.handle_signal(signal, now_ms);
        }
        Ok(())
    }

    fn handle_signal(&mut self, signal: Signal, now_ms: u64) {
        match signal {
            Signal::StuffText(text) => {
                self.handshake.handle_stufftext(&text, now_ms);
                self.on_state_change(self.handshake.state(), now_ms);
            }
            Signal::Disconnect | Signal::Reconnect => match self.handshake.note_disconnect(now_ms) {
                Ok(()) => {
                    self.netchan = None;
                    self.sink.push(now_ms, EventPayload::Connection { state: "reconnecting" });
                }
                Err(attempts) => {
                    self.netchan = None;
                    self.sink.push(now_ms, EventPayload::Connection { state: "disconnected" });
                    tracing::warn!(target: "client", attempts, "reconnect attempts exhausted");
                }
            },
            Signal::ServerData { mapname, gamedir, player_num, .. } => {
                let is_map_change = self.handshake.state() == HandshakeState::Spawned;
                if is_map_change {
                    self.handshake.on_map_change();
                }
                self.sink.push(
                    now_ms,
                    EventPayload::ServerInfo {
                        event: if is_map_change { "map_change" } else { "connected" },
                        gamedir,
                        mapname,
                        player_num,
                    },
                );
            }
        }
    }

    fn on_state_change(&mut self, state: HandshakeState, now_ms: u64) {
        let label = match state {
            HandshakeState::Disconnected => "disconnected",
            HandshakeState::Challenging => "challenging",
            HandshakeState::Connecting => "connecting",
            HandshakeState::Connected => "connected",
            HandshakeState::Handshaking => "handshaking",
            HandshakeState::Spawned => "spawned",
            HandshakeState::Reconnecting => "reconnecting",
        };
        self.sink.push(now_ms, EventPayload::Connection { state: label });
    }

    fn flush_reliable_commands(&mut self, now_ms: u64) -> Result<(), ClientError> {
        let (Some(netchan), Some(socket)) = (&mut self.netchan, &self.socket) else {
            return Ok(());
        };
        if let Some(body) = self.handshake.next_reliable_command(now_ms) {
            let mut w = crate::message::MsgWriter::new();
            w.write_u8(CLC_STRINGCMD);
            w.write_cstring(&body);
            let packet = netchan.transmit(&[], Some(&w.data));
            socket.send(&packet).map_err(ClientError::Transport)?;
        }
        Ok(())
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.sink.drain()
    }

    pub fn player_state(&self) -> &PlayerState {
        &self.decoder.player_state
    }

    pub fn entity(&self, number: u16) -> Option<&EntityState> {
        self.decoder.entities.current(number)
    }

    pub fn active_entities(&self) -> impl Iterator<Item = &EntityState> {
        self.decoder.entities.active_entities()
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake.state()
    }
}

fn monitor_event_to_payload(event: MonitorEvent) -> EventPayload {
    match event {
        MonitorEvent::PlayerJoin { name } => {
            EventPayload::ServerInfo { event: "player_join", gamedir: String::new(), mapname: name, player_num: -1 }
        }
        MonitorEvent::PlayerLeave { name } => {
            EventPayload::ServerInfo { event: "player_leave", gamedir: String::new(), mapname: name, player_num: -1 }
        }
        MonitorEvent::MapChange { previous_map, map } => {
            EventPayload::ServerInfo { event: "map_change", gamedir: previous_map, mapname: map, player_num: -1 }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_starts_disconnected() {
        let client = Q2Client::new(ClientConfig::new("127.0.0.1", "spectator"));
        assert_eq!(client.handshake_state(), HandshakeState::Disconnected);
    }

    #[test]
    fn connect_in_monitor_mode_schedules_first_poll_immediately() {
        let mut config = ClientConfig::new("127.0.0.1", "spectator");
        config.monitor_mode = true;
        config.server_port = 27913;
        let mut client = Q2Client::new(config);
        client.connect(1000).unwrap();
        assert_eq!(client.next_monitor_poll_ms, 1000);
    }
}
