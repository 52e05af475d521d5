// golden.rs -- end-to-end scenarios straight off the wire, per spec.md
// section 8. These exercise the public decoder/handshake/OOB surfaces
// the way a real server exchange would drive them, rather than unit-level
// field decoding (covered in each module's own #[cfg(test)] block).

use q2_spectator_client::decoder::{Decoder, Signal};
use q2_spectator_client::events::{EventPayload, EventSink};
use q2_spectator_client::handshake::{Handshake, HandshakeState};
use q2_spectator_client::message::MsgWriter;
use q2_spectator_client::oob::{self, OobCommand};
use q2_spectator_client::protocol::ProtocolVersion;
use q2_spectator_client::ClientConfig;

fn config() -> ClientConfig {
    ClientConfig::new("127.0.0.1", "spectator")
}

/// Scenario 1: challenge exchange picks the highest mutually supported
/// protocol and replies with a `connect` datagram carrying it.
#[test]
fn challenge_exchange_selects_aqtion_and_replies_connect() {
    let mut hs = Handshake::new(&config(), 4242);
    hs.start_connect();
    assert_eq!(hs.state(), HandshakeState::Challenging);

    let datagram = q2_spectator_client::net_chan::out_of_band_print("challenge 12345 p=34,35,36,38\n");
    let cmd = oob::parse(&datagram).unwrap();
    let reply = hs.handle_oob(&cmd).expect("connect reply");

    assert_eq!(hs.protocol(), Some(ProtocolVersion::AQtion));
    assert_eq!(&reply[..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
    let text = String::from_utf8_lossy(&reply[4..]);
    assert!(text.starts_with("connect 38 4242 12345 \""));
}

/// Scenario 2: vanilla SERVERDATA sets the map/gamedir and emits a signal.
#[test]
fn vanilla_serverdata_sets_map_and_gamedir() {
    let mut w = MsgWriter::new();
    w.write_u8(12); // SVC_SERVERDATA
    w.write_u32(34i32 as u32); // protocol
    w.write_u32(1i32 as u32); // server_count
    w.write_u8(0); // attract_loop
    w.write_cstring("baseq2");
    w.write_u8(5);
    w.write_u8(0); // player_num = 5 (i16 LE)
    w.write_cstring("q2dm1");

    let mut decoder = Decoder::new();
    let mut sink = EventSink::new();
    let signals = decoder.decode(&w.data, &mut sink, 0);

    assert_eq!(decoder.current_map_name, "q2dm1");
    assert_eq!(decoder.gamedir, "baseq2");
    assert_eq!(decoder.protocol, Some(ProtocolVersion::Vanilla));
    assert!(matches!(
        signals[0],
        Signal::ServerData { protocol: 34, player_num: 5, .. }
    ));
}

/// Scenario 3: a CHAT-level print record surfaces as a console_message event.
#[test]
fn print_record_emits_console_message_at_chat_level() {
    let mut w = MsgWriter::new();
    w.write_u8(10); // SVC_PRINT
    w.write_u8(3); // PRINT_CHAT
    w.write_cstring("Player: hi");

    let mut decoder = Decoder::new();
    let mut sink = EventSink::new();
    decoder.decode(&w.data, &mut sink, 0);

    let events = sink.drain();
    assert_eq!(events.len(), 1);
    match &events[0].payload {
        EventPayload::Console { level, text } => {
            assert_eq!(*level, 3);
            assert_eq!(text, "Player: hi");
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

/// Scenario 4: a `precache` stufftext in non-passive mode schedules `begin`
/// after the 500ms delay, carrying the server's spawn count.
#[test]
fn precache_stufftext_schedules_begin_after_delay() {
    let mut hs = Handshake::new(&config(), 4242);
    hs.handle_stufftext("precache 7\n", 0);
    assert!(hs.next_reliable_command(499).is_none());
    assert_eq!(hs.next_reliable_command(500).as_deref(), Some("begin 7"));
}

/// Scenario 5: a second SERVERDATA for a different map while SPAWNED is a
/// map change -- entity/player state reset and handshake re-entered.
#[test]
fn second_serverdata_with_different_map_is_a_map_change() {
    let mut hs = Handshake::new(&config(), 4242);
    hs.start_connect();
    hs.handle_oob(&OobCommand::Challenge { challenge: 1, offered_protocols: vec![38] });
    hs.handle_oob(&OobCommand::ClientConnect);
    hs.handle_stufftext("precache 1\n", 0);
    hs.next_reliable_command(500);
    assert_eq!(hs.state(), HandshakeState::Spawned);

    hs.on_map_change();
    assert_eq!(hs.state(), HandshakeState::Handshaking);
    assert!(!hs.has_pending());
    assert_eq!(hs.protocol(), Some(ProtocolVersion::AQtion));
}

/// Scenario 6: an SVC_ZPACKET wrapping a raw-deflate PRINT record inflates
/// and decodes transparently into the same console_message event.
#[test]
fn zpacket_inflates_and_decodes_the_wrapped_print_record() {
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut inner = MsgWriter::new();
    inner.write_u8(10); // SVC_PRINT
    inner.write_u8(0); // PRINT_LOW
    inner.write_cstring("hello");

    let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&inner.data).unwrap();
    let compressed = enc.finish().unwrap();

    let mut w = MsgWriter::new();
    w.write_u8(21); // SVC_ZPACKET
    w.write_u8((compressed.len() as u16 & 0xFF) as u8);
    w.write_u8(((compressed.len() as u16 >> 8) & 0xFF) as u8);
    w.write_u8((inner.data.len() as u16 & 0xFF) as u8);
    w.write_u8(((inner.data.len() as u16 >> 8) & 0xFF) as u8);
    w.write_bytes(&compressed);

    let mut decoder = Decoder::new();
    let mut sink = EventSink::new();
    decoder.decode(&w.data, &mut sink, 0);

    let events = sink.drain();
    assert_eq!(events.len(), 1);
    match &events[0].payload {
        EventPayload::Console { level, text } => {
            assert_eq!(*level, 0);
            assert_eq!(text, "hello");
        }
        other => panic!("unexpected payload {other:?}"),
    }
}
