// oob.rs -- out-of-band (connectionless) command codec
//
// Ground: myq2-client::cl_main.rs's cl_connectionless_packet/
// cl_send_connect_packet/cl_check_for_resend. The command dispatch
// (challenge/client_connect/print/ping/echo) and the "connect <proto>
// <qport> <challenge> \"<userinfo>\"" wire format are carried over; rcon
// and local-command-from-gui handling are dropped (no local server, no
// remote-admin surface in this crate).

use crate::protocol::ProtocolVersion;

pub const OOB_PREFIX: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// A parsed connectionless command received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum OobCommand {
    Challenge { challenge: i32, offered_protocols: Vec<i32> },
    ClientConnect,
    Print(String),
    Ping,
    Echo(String),
    StatusResponse(String),
    Unknown(String),
}

/// Strips the 0xFFFFFFFF prefix and tokenizes the remaining ASCII command
/// line the way `cmd_tokenize_string` does for the first token.
pub fn parse(datagram: &[u8]) -> Option<OobCommand> {
    if datagram.len() < 4 || datagram[..4] != OOB_PREFIX {
        return None;
    }
    let body = &datagram[4..];
    let text = String::from_utf8_lossy(body);
    let text = text.trim_end_matches(['\n', '\0']);
    let mut parts = text.split_whitespace();
    let cmd = parts.next().unwrap_or("");

    Some(match cmd {
        "challenge" => {
            let challenge = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let offered_protocols = parts
                .next()
                .and_then(|arg| arg.strip_prefix("p="))
                .map(|list| list.split(',').filter_map(|v| v.parse().ok()).collect())
                .unwrap_or_default();
            OobCommand::Challenge { challenge, offered_protocols }
        }
        "client_connect" => OobCommand::ClientConnect,
        "print" => OobCommand::Print(parts.collect::<Vec<_>>().join(" ")),
        "ping" => OobCommand::Ping,
        "echo" => OobCommand::Echo(parts.collect::<Vec<_>>().join(" ")),
        "info" => OobCommand::StatusResponse(parts.collect::<Vec<_>>().join(" ")),
        _ => OobCommand::Unknown(text.to_string()),
    })
}

/// Builds a `connect <protocol> <qport> <challenge> "<userinfo>"` datagram.
pub fn build_connect(protocol: ProtocolVersion, qport: u16, challenge: i32, userinfo: &str) -> Vec<u8> {
    let body = format!(
        "connect {} {} {} \"{}\"\n",
        protocol.wire_value(),
        qport,
        challenge,
        userinfo
    );
    crate::net_chan::out_of_band_print(&body)
}

pub fn build_getchallenge() -> Vec<u8> {
    crate::net_chan::out_of_band_print("getchallenge\n")
}

pub fn build_ack() -> Vec<u8> {
    crate::net_chan::out_of_band_print("ack")
}

pub fn build_status_query() -> Vec<u8> {
    crate::net_chan::out_of_band_print("status\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_challenge_with_protocol_list() {
        let datagram = crate::net_chan::out_of_band_print("challenge 12345 p=34,35,36,38\n");
        match parse(&datagram).unwrap() {
            OobCommand::Challenge { challenge, offered_protocols } => {
                assert_eq!(challenge, 12345);
                assert_eq!(offered_protocols, vec![34, 35, 36, 38]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_challenge_without_protocol_hint() {
        let datagram = crate::net_chan::out_of_band_print("challenge 42\n");
        match parse(&datagram).unwrap() {
            OobCommand::Challenge { challenge, offered_protocols } => {
                assert_eq!(challenge, 42);
                assert!(offered_protocols.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_oob_datagram_is_rejected() {
        assert!(parse(b"\x00\x00\x00\x00challenge 1").is_none());
    }

    #[test]
    fn connect_command_matches_wire_format() {
        let packet = build_connect(ProtocolVersion::AQtion, 4242, 12345, "name\\spectator\\spectator\\1");
        let text = String::from_utf8_lossy(&packet[4..]);
        assert_eq!(text, "connect 38 4242 12345 \"name\\spectator\\spectator\\1\"\n");
    }
}
