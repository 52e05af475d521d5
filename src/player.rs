// player.rs -- player movement/view state and its delta decode
//
// Ground: myq2-client::cl_ents.rs's cl_parse_playerstate. The pmove block
// and PS_* field gating order are carried over exactly; demo/attractloop
// freeze handling is dropped (no demo playback in this crate).

use crate::message::MsgReader;
use crate::protocol::*;
use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PmType {
    #[default]
    Normal,
    Spectator,
    Dead,
    Gib,
    Freeze,
}

impl PmType {
    fn from_wire(v: u8) -> Self {
        match v {
            0 => Self::Normal,
            1 => Self::Spectator,
            2 => Self::Dead,
            3 => Self::Gib,
            4 => Self::Freeze,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlayerMove {
    pub pm_type: PmType,
    pub origin: [i16; 3],
    pub velocity: [i16; 3],
    pub pm_time: u8,
    pub pm_flags: u8,
    pub gravity: i16,
    pub delta_angles: [i16; 3],
}

#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    pub pmove: PlayerMove,
    pub view_offset: [f32; 3],
    pub view_angles: [f32; 3],
    pub kick_angles: [f32; 3],
    pub gunindex: u8,
    pub gunframe: u8,
    pub gunoffset: [f32; 3],
    pub gunangles: [f32; 3],
    pub blend: [f32; 4],
    pub fov: f32,
    pub rdflags: u8,
    pub stats: [i16; MAX_STATS],
}

/// Decodes one player-state delta, writing through from `from`.
/// This crate treats the 32-word stat array opaquely: every flagged word
/// is decoded and stored, but no `console_message` consumer interprets
/// individual stat indices (spec.md section 9's open question on stat
/// semantics is resolved here -- decode and store, interpretation is a
/// caller concern).
pub fn parse_delta(
    from: &PlayerState,
    protocol: ProtocolVersion,
    r: &mut MsgReader,
) -> Result<PlayerState, DecodeError> {
    let flags = r.read_u16()?;
    parse_delta_with_flags(from, protocol, flags, r)
}

/// Same as `parse_delta` but for callers (the extended-protocol FRAME
/// layout) that have already read the flags word off the packed header.
pub fn parse_delta_with_flags(
    from: &PlayerState,
    protocol: ProtocolVersion,
    flags: u16,
    r: &mut MsgReader,
) -> Result<PlayerState, DecodeError> {
    let mut state = from.clone();

    if flags & PS_M_TYPE != 0 {
        state.pmove.pm_type = PmType::from_wire(r.read_u8()?);
    }
    if flags & PS_M_ORIGIN != 0 {
        state.pmove.origin = [r.read_i16()?, r.read_i16()?, r.read_i16()?];
    }
    if flags & PS_M_VELOCITY != 0 {
        state.pmove.velocity = [r.read_i16()?, r.read_i16()?, r.read_i16()?];
    }
    if flags & PS_M_TIME != 0 {
        state.pmove.pm_time = r.read_u8()?;
    }
    if flags & PS_M_FLAGS != 0 {
        state.pmove.pm_flags = r.read_u8()?;
    }
    if flags & PS_M_GRAVITY != 0 {
        state.pmove.gravity = r.read_i16()?;
    }
    if flags & PS_M_DELTA_ANGLES != 0 {
        state.pmove.delta_angles = [r.read_i16()?, r.read_i16()?, r.read_i16()?];
    }

    if flags & PS_VIEWOFFSET != 0 {
        state.view_offset = [
            r.read_i8()? as f32 * 0.25,
            r.read_i8()? as f32 * 0.25,
            r.read_i8()? as f32 * 0.25,
        ];
    }
    if flags & PS_VIEWANGLES != 0 {
        state.view_angles = [r.read_angle16()?, r.read_angle16()?, r.read_angle16()?];
    }
    if flags & PS_KICKANGLES != 0 {
        state.kick_angles = [
            r.read_i8()? as f32 * 0.25,
            r.read_i8()? as f32 * 0.25,
            r.read_i8()? as f32 * 0.25,
        ];
    }
    if flags & PS_WEAPONINDEX != 0 {
        state.gunindex = r.read_u8()?;
    }
    if flags & PS_WEAPONFRAME != 0 {
        state.gunframe = r.read_u8()?;
        state.gunoffset = [
            r.read_i8()? as f32 * 0.25,
            r.read_i8()? as f32 * 0.25,
            r.read_i8()? as f32 * 0.25,
        ];
        state.gunangles = [
            r.read_i8()? as f32 * 0.25,
            r.read_i8()? as f32 * 0.25,
            r.read_i8()? as f32 * 0.25,
        ];
    }
    if flags & PS_BLEND != 0 {
        state.blend = [
            r.read_u8()? as f32 / 255.0,
            r.read_u8()? as f32 / 255.0,
            r.read_u8()? as f32 / 255.0,
            r.read_u8()? as f32 / 255.0,
        ];
    }
    if flags & PS_FOV != 0 {
        state.fov = r.read_u8()? as f32;
    }
    if flags & PS_RDFLAGS != 0 {
        state.rdflags = r.read_u8()?;
    }

    // Vanilla always sends the full 32-word stat array with no bitmask;
    // R1Q2/Q2Pro/AQtion gate each word behind a leading statbits mask.
    if protocol == ProtocolVersion::Vanilla {
        for i in 0..MAX_STATS {
            state.stats[i] = r.read_i16()?;
        }
    } else {
        let statbits = r.read_u32()?;
        for i in 0..MAX_STATS {
            if statbits & (1 << i) != 0 {
                state.stats[i] = r.read_i16()?;
            }
        }
    }

    Ok(state)
}
