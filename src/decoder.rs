// decoder.rs -- SVC_* opcode stream dispatch
//
// Ground: myq2-client::cl_parse.rs's cl_parse_server_message match arms and
// cl_parse_server_data's field order, plus myq2-common::compression.rs for
// ZPACKET inflation. Effect/sound/rendering opcodes the teacher dispatches
// to (muzzle flash, temp entities, downloads, inventory, layout) have no
// counterpart in this spec and are skipped-but-consumed rather than parsed,
// since a console-message/spectator consumer has nothing to do with them.

use crate::compression;
use crate::entity::{parse_delta, EntityState};
use crate::error::DecodeError;
use crate::events::{EventPayload, EventSink};
use crate::frame;
use crate::message::MsgReader;
use crate::player::PlayerState;
use crate::protocol::*;

/// Out-of-band-adjacent signals the decoder surfaces to the handshake
/// state machine. Ordinary display events go straight to the `EventSink`;
/// these are the ones that change connection state.
#[derive(Debug, Clone)]
pub enum Signal {
    StuffText(String),
    Disconnect,
    Reconnect,
    ServerData { protocol: i32, gamedir: String, mapname: String, player_num: i16 },
}

/// Downsamples Quake's high-bit color codes: bytes >= 0x80 have 0x80
/// subtracted, then any remaining non-printable byte is dropped. Ground:
/// spec.md section 6's "bytes with high bit set must be down-sampled".
pub fn sanitize_text(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            let b = c as u32;
            if b >= 0x80 && b < 0x100 {
                char::from_u32(b - 0x80).unwrap_or(' ')
            } else {
                c
            }
        })
        .filter(|c| !c.is_control() || *c == '\n')
        .collect()
}

/// Reads the protocol-specific SERVERDATA tail. These bytes carry no
/// meaning this crate acts on but must be consumed to keep the stream
/// aligned (spec.md section 4.2).
fn read_serverdata_tail(r: &mut MsgReader, protocol: ProtocolVersion) -> Result<(), DecodeError> {
    match protocol {
        ProtocolVersion::Vanilla => {}
        ProtocolVersion::R1Q2 => {
            let _enhanced = r.read_u8()?;
            let _minor_version = r.read_u16()?;
            let _advanced_deltas = r.read_u8()?;
            let _strafejump_hack = r.read_u8()?;
        }
        ProtocolVersion::Q2Pro => {
            let minor_version = r.read_u16()?;
            let _server_state = r.read_u8()?;
            if minor_version >= 1024 {
                let _flags = r.read_u16()?;
            } else {
                let _strafejump = r.read_u8()?;
                let _qw_mode = r.read_u8()?;
                let _waterjump = r.read_u8()?;
            }
        }
        ProtocolVersion::AQtion => {
            let _minor_version = r.read_u16()?;
            let _server_state = r.read_u8()?;
            let _strafejump = r.read_u8()?;
            let _qw_mode = r.read_u8()?;
            let _waterjump = r.read_u8()?;
        }
    }
    Ok(())
}

fn skip_sound(r: &mut MsgReader) -> Result<(), DecodeError> {
    let flags = r.read_u8()?;
    let _sound_num = r.read_u8()?;
    if flags & (SND_VOLUME as u8) != 0 {
        r.read_u8()?;
    }
    if flags & (SND_ATTENUATION as u8) != 0 {
        r.read_u8()?;
    }
    if flags & (SND_OFFSET as u8) != 0 {
        r.read_u8()?;
    }
    if flags & (SND_ENT as u8) != 0 {
        r.read_u16()?;
    }
    if flags & (SND_POS as u8) != 0 {
        r.read_pos()?;
    }
    Ok(())
}

/// Holds state that persists across packets: configstrings, the entity
/// table, and the connected player's state. Ground: myq2-client's
/// `ClientState` fields of the same names, minus everything render-only.
pub struct Decoder {
    pub protocol: Option<ProtocolVersion>,
    pub configstrings: Vec<String>,
    pub entities: crate::entity::EntityTable,
    pub player_state: PlayerState,
    pub current_map_name: String,
    pub gamedir: String,
    pub last_frame_num: i32,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            protocol: None,
            configstrings: vec![String::new(); MAX_CONFIGSTRINGS],
            entities: crate::entity::EntityTable::new(),
            player_state: PlayerState::default(),
            current_map_name: String::new(),
            gamedir: String::new(),
            last_frame_num: 0,
        }
    }

    /// Decodes one payload (already stripped of the netchan header),
    /// pushing display events into `sink` and returning any connection-
    /// affecting signals. Truncation aborts the remainder of this payload
    /// without returning an error -- the events emitted so far are kept.
    pub fn decode(&mut self, payload: &[u8], sink: &mut EventSink, now_ms: u64) -> Vec<Signal> {
        let mut signals = Vec::new();
        if payload.is_empty() {
            return signals;
        }

        let payload = match self.maybe_inflate(payload) {
            Some(inflated) => inflated,
            None => payload.to_vec(),
        };

        let mut r = MsgReader::new(&payload);
        self.decode_stream(&mut r, sink, now_ms, &mut signals);
        signals
    }

    /// Zlib auto-detection on packet entry per spec.md section 4.2: if the
    /// first byte isn't a known opcode, try whole-payload raw-deflate, then
    /// the `{u16 inlen, u16 outlen}` header form.
    fn maybe_inflate(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let first = *payload.first()?;
        if is_known_opcode(first) {
            return None;
        }
        if let Ok(out) = compression::decompress(payload, compression::MAX_DECOMPRESS_SIZE) {
            return Some(out);
        }
        if payload.len() >= 4 {
            let inlen = u16::from_le_bytes([payload[0], payload[1]]) as usize;
            let _outlen = u16::from_le_bytes([payload[2], payload[3]]) as usize;
            if payload.len() >= 4 + inlen {
                if let Ok(out) = compression::decompress(&payload[4..4 + inlen], compression::MAX_DECOMPRESS_SIZE) {
                    return Some(out);
                }
            }
        }
        None
    }

    fn decode_stream(&mut self, r: &mut MsgReader, sink: &mut EventSink, now_ms: u64, signals: &mut Vec<Signal>) {
        loop {
            if r.is_empty() {
                break;
            }
            let mut cmd = match r.read_u8() {
                Ok(b) => b,
                Err(_) => break,
            };
            if cmd == SVC_EXTEND {
                cmd = match r.read_u8() {
                    Ok(b) => b,
                    Err(_) => break,
                };
            }

            let before = signals.len();
            let outcome = self.dispatch(cmd, r, sink, now_ms, signals);
            if outcome.is_err() {
                tracing::warn!(target: "decoder", opcode = cmd, "aborting payload after decode error");
                break;
            }
            if signals.len() > before
                && matches!(signals.last(), Some(Signal::Disconnect) | Some(Signal::Reconnect))
            {
                break;
            }
        }
    }

    fn dispatch(
        &mut self,
        cmd: u8,
        r: &mut MsgReader,
        sink: &mut EventSink,
        now_ms: u64,
        signals: &mut Vec<Signal>,
    ) -> Result<(), DecodeError> {
        match cmd {
            SVC_NOP => Ok(()),

            SVC_DISCONNECT => {
                signals.push(Signal::Disconnect);
                Ok(())
            }

            SVC_RECONNECT => {
                signals.push(Signal::Reconnect);
                Ok(())
            }

            SVC_PRINT => {
                let level = r.read_u8()? as i32;
                let text = sanitize_text(&r.read_cstring()?);
                sink.push(now_ms, EventPayload::Console { level, text });
                Ok(())
            }

            SVC_CENTERPRINT => {
                let text = sanitize_text(&r.read_cstring()?);
                sink.push(now_ms, EventPayload::Console { level: PRINT_HIGH, text });
                Ok(())
            }

            SVC_STUFFTEXT => {
                let text = r.read_cstring()?;
                signals.push(Signal::StuffText(text));
                Ok(())
            }

            SVC_SERVERDATA => {
                let protocol_num = r.read_i32()?;
                let protocol = ProtocolVersion::from_wire(protocol_num)
                    .ok_or(DecodeError::UnsupportedProtocol(protocol_num))?;
                self.protocol = Some(protocol);

                let _server_count = r.read_i32()?;
                let _attract_loop = r.read_u8()?;
                let gamedir = r.read_cstring()?;
                let player_num = r.read_i16()?;
                let mapname = r.read_cstring()?;
                read_serverdata_tail(r, protocol)?;

                self.gamedir = gamedir.clone();
                self.current_map_name = mapname.clone();
                signals.push(Signal::ServerData { protocol: protocol_num, gamedir, mapname, player_num });
                Ok(())
            }

            SVC_CONFIGSTRING => {
                let index = r.read_u16()? as usize;
                let value = r.read_cstring()?;
                if index < self.configstrings.len() {
                    self.configstrings[index] = value;
                }
                Ok(())
            }

            SVC_SPAWNBASELINE => {
                let (number, bits) = crate::entity::parse_entity_bits(r)?;
                let state = parse_delta(&EntityState::default(), number, bits, r)?;
                self.entities.set_baseline(number, state);
                Ok(())
            }

            SVC_DOWNLOAD => {
                let size = r.read_i16()?;
                let _percent = r.read_u8()?;
                if size > 0 {
                    r.read_bytes(size as usize)?;
                }
                Ok(())
            }

            SVC_SOUND => skip_sound(r),

            SVC_FRAME => {
                let protocol = self.protocol.unwrap_or(ProtocolVersion::Vanilla);
                if protocol.supports_fragmentation() {
                    let packed = r.read_u32()?;
                    let framenum = (packed & 0x07FF_FFFF) as i32;
                    let _delta_num = (packed >> 27) as i32;
                    let _suppress_flags = r.read_u8()?;
                    let area_len = r.read_u8()? as usize;
                    r.read_bytes(area_len)?;
                    let flags = r.read_u16()?;
                    self.player_state = crate::player::parse_delta_with_flags(&self.player_state, protocol, flags, r)?;
                    self.last_frame_num = framenum;
                } else {
                    let header = frame::read_header(r, false)?;
                    let area_len = r.read_u8()? as usize;
                    r.read_bytes(area_len)?;
                    let ps = frame::read_playerinfo(r, &self.player_state, protocol)?;
                    self.player_state = ps;
                    self.last_frame_num = header.server_frame;
                }
                let player = self.player_state.clone();
                sink.push(now_ms, EventPayload::Player(Box::new(player)));

                let touched = frame::read_packet_entities(r, &mut self.entities)?;
                for number in touched {
                    if let Some(ent) = self.entities.current(number) {
                        sink.push(now_ms, EventPayload::Entity(Box::new(ent.clone())));
                    }
                }
                Ok(())
            }

            SVC_ZPACKET => {
                let inlen = r.read_u16()? as usize;
                let _outlen = r.read_u16()?;
                let compressed = r.read_bytes(inlen)?;
                let inflated = compression::decompress(compressed, compression::MAX_DECOMPRESS_SIZE)?;
                let mut inner = MsgReader::new(&inflated);
                self.decode_stream_into(&mut inner, sink, now_ms, signals);
                Ok(())
            }

            SVC_GAMESTATE => {
                loop {
                    let index = r.read_u16()?;
                    if index == GAMESTATE_EOF {
                        break;
                    }
                    let value = r.read_cstring()?;
                    if (index as usize) < self.configstrings.len() {
                        self.configstrings[index as usize] = value;
                    }
                }
                Ok(())
            }

            SVC_SETTING => {
                let _setting_id = r.read_u32()?;
                let _value = r.read_u32()?;
                Ok(())
            }

            other => Err(DecodeError::UnknownOpcode(other)),
        }
    }

    fn decode_stream_into(&mut self, r: &mut MsgReader, sink: &mut EventSink, now_ms: u64, signals: &mut Vec<Signal>) {
        self.decode_stream(r, sink, now_ms, signals);
    }
}

fn is_known_opcode(b: u8) -> bool {
    matches!(
        b,
        SVC_NOP
            | SVC_DISCONNECT
            | SVC_RECONNECT
            | SVC_SOUND
            | SVC_PRINT
            | SVC_STUFFTEXT
            | SVC_SERVERDATA
            | SVC_CONFIGSTRING
            | SVC_SPAWNBASELINE
            | SVC_CENTERPRINT
            | SVC_DOWNLOAD
            | SVC_PLAYERINFO
            | SVC_PACKETENTITIES
            | SVC_DELTAPACKETENTITIES
            | SVC_FRAME
            | SVC_ZPACKET
            | SVC_ZDOWNLOAD
            | SVC_GAMESTATE
            | SVC_SETTING
            | SVC_EXTEND
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MsgWriter;

    fn golden_vanilla_serverdata() -> Vec<u8> {
        let mut w = MsgWriter::new();
        w.write_u8(SVC_SERVERDATA);
        w.write_u32(34i32 as u32);
        w.write_u32(1i32 as u32);
        w.write_u8(0);
        w.write_cstring("baseq2");
        w.write_u8(5);
        w.write_u8(0);
        w.write_cstring("q2dm1");
        w.data
    }

    #[test]
    fn vanilla_serverdata_sets_map_and_gamedir() {
        let mut d = Decoder::new();
        let mut sink = EventSink::new();
        let signals = d.decode(&golden_vanilla_serverdata(), &mut sink, 0);
        assert_eq!(d.current_map_name, "q2dm1");
        assert_eq!(d.gamedir, "baseq2");
        assert_eq!(d.protocol, Some(ProtocolVersion::Vanilla));
        assert!(matches!(signals[0], Signal::ServerData { .. }));
    }

    #[test]
    fn print_chat_level_emits_console_message() {
        let mut w = MsgWriter::new();
        w.write_u8(SVC_PRINT);
        w.write_u8(PRINT_CHAT as u8);
        w.write_cstring("Player: hi");

        let mut d = Decoder::new();
        let mut sink = EventSink::new();
        d.decode(&w.data, &mut sink, 0);
        let events = sink.drain();
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::Console { level, text } => {
                assert_eq!(*level, PRINT_CHAT);
                assert_eq!(text, "Player: hi");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stufftext_surfaces_as_signal_not_event() {
        let mut w = MsgWriter::new();
        w.write_u8(SVC_STUFFTEXT);
        w.write_cstring("precache 7");

        let mut d = Decoder::new();
        let mut sink = EventSink::new();
        let signals = d.decode(&w.data, &mut sink, 0);
        assert!(sink.is_empty());
        assert!(matches!(&signals[0], Signal::StuffText(s) if s == "precache 7"));
    }

    #[test]
    fn empty_payload_yields_no_events_no_error() {
        let mut d = Decoder::new();
        let mut sink = EventSink::new();
        let signals = d.decode(&[], &mut sink, 0);
        assert!(signals.is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn gamestate_stops_at_eof_marker_without_reading_past_it() {
        let mut w = MsgWriter::new();
        w.write_u8(SVC_GAMESTATE);
        w.write_u8((0u16 & 0xFF) as u8);
        w.write_u8(0);
        w.write_cstring("q2dm1");
        w.write_u8((GAMESTATE_EOF & 0xFF) as u8);
        w.write_u8(((GAMESTATE_EOF >> 8) & 0xFF) as u8);

        let mut d = Decoder::new();
        let mut sink = EventSink::new();
        d.decode(&w.data, &mut sink, 0);
        assert_eq!(d.configstrings[0], "q2dm1");
    }

    #[test]
    fn unknown_opcode_aborts_remainder_but_keeps_prior_events() {
        let mut w = MsgWriter::new();
        w.write_u8(SVC_PRINT);
        w.write_u8(PRINT_LOW as u8);
        w.write_cstring("before");
        w.write_u8(200); // unknown opcode
        w.write_cstring("never reached");

        let mut d = Decoder::new();
        let mut sink = EventSink::new();
        d.decode(&w.data, &mut sink, 0);
        let events = sink.drain();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn color_codes_are_downsampled() {
        let high = char::from_u32(0x80 + ('A' as u32)).unwrap();
        let raw = format!("{high}BC");
        let sanitized = sanitize_text(&raw);
        assert_eq!(sanitized, "ABC");
    }
}
