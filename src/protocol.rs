// protocol.rs -- wire protocol constants and the protocol-version sum type
//
// Ground: myq2-common::qcommon (PROTOCOL_VERSION/PROTOCOL_R1Q2/PROTOCOL_Q2PRO,
// the SvcOps/ClcOps enums, and the U_*/PS_*/CM_* bit constants) extended with
// the AQtion variant and the extended-protocol opcodes (ZPACKET, GAMESTATE,
// SETTING, EXTEND) that the teacher's vanilla-only client never needed.

/// Negotiated wire protocol. Selected once during the challenge exchange
/// (spec.md section 4.4) and immutable for the life of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    Vanilla,
    R1Q2,
    Q2Pro,
    AQtion,
}

impl ProtocolVersion {
    pub const VANILLA: i32 = 34;
    pub const R1Q2: i32 = 35;
    pub const Q2PRO: i32 = 36;
    pub const AQTION: i32 = 38;

    /// Picks the highest protocol this client supports out of a server's
    /// advertised list, preferring AQtion > Q2PRO > R1Q2 > Vanilla as
    /// spec.md section 4.4's challenge-handling table requires.
    pub fn pick_best(offered: &[i32]) -> Option<Self> {
        for candidate in [Self::AQTION, Self::Q2PRO, Self::R1Q2, Self::VANILLA] {
            if offered.contains(&candidate) {
                return Self::from_wire(candidate);
            }
        }
        None
    }

    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            Self::VANILLA => Some(Self::Vanilla),
            Self::R1Q2 => Some(Self::R1Q2),
            Self::Q2PRO => Some(Self::Q2Pro),
            Self::AQTION => Some(Self::AQtion),
            _ => None,
        }
    }

    pub fn wire_value(self) -> i32 {
        match self {
            Self::Vanilla => Self::VANILLA,
            Self::R1Q2 => Self::R1Q2,
            Self::Q2Pro => Self::Q2PRO,
            Self::AQtion => Self::AQTION,
        }
    }

    /// R1Q2 and later use a 1-byte qport; vanilla uses 2 bytes.
    pub fn uses_short_qport(self) -> bool {
        matches!(self, Self::Vanilla)
    }

    /// Q2Pro and AQtion support fragmentation and the packed FRAME header.
    pub fn supports_fragmentation(self) -> bool {
        matches!(self, Self::Q2Pro | Self::AQtion)
    }
}

// ============================================================
// Ports
// ============================================================

pub const PORT_SERVER: u16 = 27910;

// ============================================================
// Client-to-server ops (clc_ops_e)
// ============================================================

pub const CLC_BAD: u8 = 0;
pub const CLC_NOP: u8 = 1;
pub const CLC_MOVE: u8 = 2;
pub const CLC_USERINFO: u8 = 3;
pub const CLC_STRINGCMD: u8 = 4;

// ============================================================
// Server-to-client ops (svc_ops_e) -- values match spec.md section 4.2
// ============================================================

pub const SVC_NOP: u8 = 6;
pub const SVC_DISCONNECT: u8 = 7;
pub const SVC_RECONNECT: u8 = 8;
pub const SVC_SOUND: u8 = 9;
pub const SVC_PRINT: u8 = 10;
pub const SVC_STUFFTEXT: u8 = 11;
pub const SVC_SERVERDATA: u8 = 12;
pub const SVC_CONFIGSTRING: u8 = 13;
pub const SVC_SPAWNBASELINE: u8 = 14;
pub const SVC_CENTERPRINT: u8 = 15;
pub const SVC_DOWNLOAD: u8 = 16;
pub const SVC_PLAYERINFO: u8 = 17;
pub const SVC_PACKETENTITIES: u8 = 18;
pub const SVC_DELTAPACKETENTITIES: u8 = 19;
pub const SVC_FRAME: u8 = 20;

// R1Q2/Q2Pro/AQtion extensions
pub const SVC_ZPACKET: u8 = 21;
pub const SVC_ZDOWNLOAD: u8 = 22;
pub const SVC_GAMESTATE: u8 = 23;
pub const SVC_SETTING: u8 = 24;

/// Escape opcode: the next byte is an extended command id.
pub const SVC_EXTEND: u8 = 30;

pub const GAMESTATE_EOF: u16 = 0x7FFF;

// ============================================================
// Print levels
// ============================================================

pub const PRINT_LOW: i32 = 0;
pub const PRINT_MEDIUM: i32 = 1;
pub const PRINT_HIGH: i32 = 2;
pub const PRINT_CHAT: i32 = 3;

// ============================================================
// Sound flags
// ============================================================

pub const SND_VOLUME: i32 = 1 << 0;
pub const SND_ATTENUATION: i32 = 1 << 1;
pub const SND_POS: i32 = 1 << 2;
pub const SND_ENT: i32 = 1 << 3;
pub const SND_OFFSET: i32 = 1 << 4;

// ============================================================
// Entity state communication flags (U_*) -- bit layout matches spec.md
// section 4.3 and myq2-common::qcommon exactly.
// ============================================================

pub const U_ORIGIN1: u32 = 1 << 0;
pub const U_ORIGIN2: u32 = 1 << 1;
pub const U_ANGLE2: u32 = 1 << 2;
pub const U_ANGLE3: u32 = 1 << 3;
pub const U_FRAME8: u32 = 1 << 4;
pub const U_EVENT: u32 = 1 << 5;
pub const U_REMOVE: u32 = 1 << 6;
pub const U_MOREBITS1: u32 = 1 << 7;

pub const U_NUMBER16: u32 = 1 << 8;
pub const U_ORIGIN3: u32 = 1 << 9;
pub const U_ANGLE1: u32 = 1 << 10;
pub const U_MODEL: u32 = 1 << 11;
pub const U_RENDERFX8: u32 = 1 << 12;
pub const U_EFFECTS8: u32 = 1 << 14;
pub const U_MOREBITS2: u32 = 1 << 15;

pub const U_SKIN8: u32 = 1 << 16;
pub const U_FRAME16: u32 = 1 << 17;
pub const U_RENDERFX16: u32 = 1 << 18;
pub const U_EFFECTS16: u32 = 1 << 19;
pub const U_MODEL2: u32 = 1 << 20;
pub const U_MODEL3: u32 = 1 << 21;
pub const U_MODEL4: u32 = 1 << 22;
pub const U_MOREBITS3: u32 = 1 << 23;

pub const U_OLDORIGIN: u32 = 1 << 24;
pub const U_SKIN16: u32 = 1 << 25;
pub const U_SOUND: u32 = 1 << 26;
pub const U_SOLID: u32 = 1 << 27;

// ============================================================
// Player state communication flags (PS_*)
// ============================================================

pub const PS_M_TYPE: u16 = 1 << 0;
pub const PS_M_ORIGIN: u16 = 1 << 1;
pub const PS_M_VELOCITY: u16 = 1 << 2;
pub const PS_M_TIME: u16 = 1 << 3;
pub const PS_M_FLAGS: u16 = 1 << 4;
pub const PS_M_GRAVITY: u16 = 1 << 5;
pub const PS_M_DELTA_ANGLES: u16 = 1 << 6;
pub const PS_VIEWOFFSET: u16 = 1 << 7;
pub const PS_VIEWANGLES: u16 = 1 << 8;
pub const PS_KICKANGLES: u16 = 1 << 9;
pub const PS_BLEND: u16 = 1 << 10;
pub const PS_FOV: u16 = 1 << 11;
pub const PS_WEAPONINDEX: u16 = 1 << 12;
pub const PS_WEAPONFRAME: u16 = 1 << 13;
pub const PS_RDFLAGS: u16 = 1 << 14;

pub const MAX_STATS: usize = 32;
pub const MAX_EDICTS: usize = 1024;
pub const MAX_CLIENTS: usize = 256;
pub const MAX_CONFIGSTRINGS: usize = 2080;

// Well-known configstring slots (spec.md section 3).
pub const CS_NAME: usize = 0;
pub const CS_PLAYERSKINS: usize = 1408;
pub const CS_PLAYERSKINS_END: usize = 1664;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_best_prefers_aqtion() {
        let offered = [34, 35, 36, 38];
        assert_eq!(ProtocolVersion::pick_best(&offered), Some(ProtocolVersion::AQtion));
    }

    #[test]
    fn pick_best_falls_back() {
        assert_eq!(ProtocolVersion::pick_best(&[34]), Some(ProtocolVersion::Vanilla));
        assert_eq!(ProtocolVersion::pick_best(&[34, 35]), Some(ProtocolVersion::R1Q2));
        assert_eq!(ProtocolVersion::pick_best(&[]), None);
    }

    #[test]
    fn qport_width_matches_spec() {
        assert!(ProtocolVersion::Vanilla.uses_short_qport());
        assert!(!ProtocolVersion::R1Q2.uses_short_qport());
        assert!(!ProtocolVersion::Q2Pro.uses_short_qport());
        assert!(!ProtocolVersion::AQtion.uses_short_qport());
    }
}
