// frame.rs -- SVC_FRAME layout: header, areabits, playerinfo, packetentities
//
// Ground: myq2-client::cl_ents.rs's cl_parse_frame/cl_parse_packet_entities
// for the field order and the packet-entities terminator rule. The teacher
// reads an SVC_PLAYERINFO/SVC_PACKETENTITIES sub-opcode byte ahead of each
// block (a legacy-vanilla quirk); this crate's frame layout has no such
// byte -- playerstate flags and the packet-entities record stream follow
// the area mask directly. This crate also has no render-frame snapshot to
// reconcile against, so packet entities are applied straight onto the
// persistent `EntityTable` as they arrive instead of being rebuilt against
// an explicit oldframe/newframe pair -- "unchanged" entities are simply
// left alone.

use crate::entity::{parse_entity_bits, EntityTable};
use crate::error::DecodeError;
use crate::message::MsgReader;
use crate::player::PlayerState;
use crate::protocol::U_REMOVE;

pub struct FrameHeader {
    pub server_frame: i32,
    pub delta_frame: i32,
    pub suppress_count: u8,
}

/// Reads the SVC_FRAME header. `protocol_26_hack` mirrors the teacher's
/// comment about old demos: a server_protocol of exactly 26 omits the
/// suppress-count byte. No protocol this crate negotiates is 26, so the
/// flag exists only to document the historical quirk; it is always false
/// for this crate's connections.
pub fn read_header(r: &mut MsgReader, protocol_26_hack: bool) -> Result<FrameHeader, DecodeError> {
    let server_frame = r.read_i32()?;
    let delta_frame = r.read_i32()?;
    let suppress_count = if protocol_26_hack { 0 } else { r.read_u8()? };
    Ok(FrameHeader { server_frame, delta_frame, suppress_count })
}

pub fn read_areabits(r: &mut MsgReader) -> Result<Vec<u8>, DecodeError> {
    let len = r.read_u8()? as usize;
    Ok(r.read_bytes(len)?.to_vec())
}

/// Reads the playerstate-delta block that follows areabits in a frame.
pub fn read_playerinfo(
    r: &mut MsgReader,
    from: &PlayerState,
    protocol: crate::protocol::ProtocolVersion,
) -> Result<PlayerState, DecodeError> {
    crate::player::parse_delta(from, protocol, r)
}

/// Reads the packet-entities block, applying each delta record directly
/// onto `table`. Returns the numbers of every entity touched, in wire
/// order, so callers can emit an update for exactly those entities rather
/// than guessing from the table's full active set.
pub fn read_packet_entities(r: &mut MsgReader, table: &mut EntityTable) -> Result<Vec<u16>, DecodeError> {
    let mut touched = Vec::new();
    loop {
        let (number, bits) = parse_entity_bits(r)?;
        if number == 0 {
            break;
        }

        if bits & U_REMOVE != 0 {
            table.remove(number);
        } else {
            table.apply_delta(number, bits, r)?;
        }
        touched.push(number);
    }

    Ok(touched)
}
