// entity.rs -- entity baseline/current tables and delta application
//
// Ground: myq2-client::cl_ents.rs's cl_parse_entity_bits/cl_parse_delta. The
// U_MOREBITS1/2/3 chained bitmask read and the per-field gating order are
// carried over exactly; the lerp/prediction bookkeeping in cl_delta_entity
// (trail counts, velocity extrapolation, spline history) is dropped -- this
// crate tracks only the current decoded state, not render-frame smoothing.

use crate::message::MsgReader;
use crate::protocol::*;
use crate::error::DecodeError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityState {
    pub number: u16,
    pub modelindex: u8,
    pub modelindex2: u8,
    pub modelindex3: u8,
    pub modelindex4: u8,
    pub frame: u16,
    pub skinnum: u32,
    pub effects: u32,
    pub renderfx: u32,
    pub origin: [f32; 3],
    pub angles: [f32; 3],
    pub old_origin: [f32; 3],
    pub sound: u8,
    pub event: u8,
    pub solid: u16,
    pub active: bool,
}

/// Reads an entity number and its U_* header bits, following the
/// U_MOREBITS1/2/3 chain to extend the mask to 32 bits.
pub fn parse_entity_bits(r: &mut MsgReader) -> Result<(u16, u32), DecodeError> {
    let mut total = r.read_u8()? as u32;
    if total & U_MOREBITS1 != 0 {
        total |= (r.read_u8()? as u32) << 8;
    }
    if total & U_MOREBITS2 != 0 {
        total |= (r.read_u8()? as u32) << 16;
    }
    if total & U_MOREBITS3 != 0 {
        total |= (r.read_u8()? as u32) << 24;
    }

    let number = if total & U_NUMBER16 != 0 {
        r.read_u16()?
    } else {
        r.read_u8()? as u16
    };

    Ok((number, total))
}

/// Applies one entity delta record on top of `from`, producing the new
/// state. Mirrors `cl_parse_delta`'s field-gating order exactly.
pub fn parse_delta(from: &EntityState, number: u16, bits: u32, r: &mut MsgReader) -> Result<EntityState, DecodeError> {
    let mut to = from.clone();
    to.old_origin = from.origin;
    to.number = number;
    to.active = true;

    if bits & U_MODEL != 0 {
        to.modelindex = r.read_u8()?;
    }
    if bits & U_MODEL2 != 0 {
        to.modelindex2 = r.read_u8()?;
    }
    if bits & U_MODEL3 != 0 {
        to.modelindex3 = r.read_u8()?;
    }
    if bits & U_MODEL4 != 0 {
        to.modelindex4 = r.read_u8()?;
    }

    if bits & U_FRAME8 != 0 {
        to.frame = r.read_u8()? as u16;
    }
    if bits & U_FRAME16 != 0 {
        to.frame = r.read_u16()?;
    }

    if (bits & U_SKIN8 != 0) && (bits & U_SKIN16 != 0) {
        to.skinnum = r.read_u32()?;
    } else if bits & U_SKIN8 != 0 {
        to.skinnum = r.read_u8()? as u32;
    } else if bits & U_SKIN16 != 0 {
        to.skinnum = r.read_u16()? as u32;
    }

    if (bits & (U_EFFECTS8 | U_EFFECTS16)) == (U_EFFECTS8 | U_EFFECTS16) {
        to.effects = r.read_u32()?;
    } else if bits & U_EFFECTS8 != 0 {
        to.effects = r.read_u8()? as u32;
    } else if bits & U_EFFECTS16 != 0 {
        to.effects = r.read_u16()? as u32;
    }

    if (bits & (U_RENDERFX8 | U_RENDERFX16)) == (U_RENDERFX8 | U_RENDERFX16) {
        to.renderfx = r.read_u32()?;
    } else if bits & U_RENDERFX8 != 0 {
        to.renderfx = r.read_u8()? as u32;
    } else if bits & U_RENDERFX16 != 0 {
        to.renderfx = r.read_u16()? as u32;
    }

    if bits & U_ORIGIN1 != 0 {
        to.origin[0] = r.read_coord()?;
    }
    if bits & U_ORIGIN2 != 0 {
        to.origin[1] = r.read_coord()?;
    }
    if bits & U_ORIGIN3 != 0 {
        to.origin[2] = r.read_coord()?;
    }

    if bits & U_ANGLE1 != 0 {
        to.angles[0] = r.read_angle()?;
    }
    if bits & U_ANGLE2 != 0 {
        to.angles[1] = r.read_angle()?;
    }
    if bits & U_ANGLE3 != 0 {
        to.angles[2] = r.read_angle()?;
    }

    if bits & U_OLDORIGIN != 0 {
        to.old_origin = r.read_pos()?;
    }

    if bits & U_SOUND != 0 {
        to.sound = r.read_u8()?;
    }

    if bits & U_EVENT != 0 {
        to.event = r.read_u8()?;
    } else {
        to.event = 0;
    }

    if bits & U_SOLID != 0 {
        to.solid = r.read_u16()?;
    }

    if bits & U_REMOVE != 0 {
        to.active = false;
    }

    Ok(to)
}

/// Owns the baseline and current tables for every entity slot. Ground:
/// myq2-client's `cl_entities`/`cl_baselines` arrays, sized `MAX_EDICTS`.
pub struct EntityTable {
    baseline: Vec<EntityState>,
    current: Vec<EntityState>,
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTable {
    pub fn new() -> Self {
        Self {
            baseline: vec![EntityState::default(); MAX_EDICTS],
            current: vec![EntityState::default(); MAX_EDICTS],
        }
    }

    pub fn set_baseline(&mut self, number: u16, state: EntityState) {
        if let Some(slot) = self.baseline.get_mut(number as usize) {
            *slot = state;
        }
    }

    pub fn baseline(&self, number: u16) -> Option<&EntityState> {
        self.baseline.get(number as usize)
    }

    pub fn current(&self, number: u16) -> Option<&EntityState> {
        self.current.get(number as usize)
    }

    pub fn active_entities(&self) -> impl Iterator<Item = &EntityState> {
        self.current.iter().filter(|e| e.active)
    }

    /// Applies a delta record read from the wire. `from` is either the
    /// entity's baseline (full update) or its current state (delta update)
    /// per spec.md section 4.3.
    pub fn apply_delta(&mut self, number: u16, bits: u32, r: &mut MsgReader) -> Result<(), DecodeError> {
        let from = self.current.get(number as usize).cloned().unwrap_or_else(|| {
            self.baseline.get(number as usize).cloned().unwrap_or_default()
        });
        let updated = parse_delta(&from, number, bits, r)?;
        if let Some(slot) = self.current.get_mut(number as usize) {
            *slot = updated;
        }
        Ok(())
    }

    pub fn remove(&mut self, number: u16) {
        if let Some(slot) = self.current.get_mut(number as usize) {
            slot.active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MsgWriter;

    #[test]
    fn entity_bits_follow_morebits_chain() {
        let mut w = MsgWriter::new();
        let total: u32 = U_MOREBITS1 | U_MOREBITS2 | U_ORIGIN1;
        w.write_u8((total & 0xFF) as u8);
        w.write_u8(((total >> 8) & 0xFF) as u8);
        w.write_u8(((total >> 16) & 0xFF) as u8);
        w.write_u8(5); // entity number, 1 byte (no U_NUMBER16)

        let mut r = MsgReader::new(&w.data);
        let (number, bits) = parse_entity_bits(&mut r).unwrap();
        assert_eq!(number, 5);
        assert_eq!(bits, total);
    }

    #[test]
    fn number16_flag_reads_two_byte_number() {
        let mut w = MsgWriter::new();
        w.write_u8((U_NUMBER16 & 0xFF) as u8);
        w.write_u8(0x34);
        w.write_u8(0x12);

        let mut r = MsgReader::new(&w.data);
        let (number, _) = parse_entity_bits(&mut r).unwrap();
        assert_eq!(number, 0x1234);
    }

    #[test]
    fn delta_from_baseline_sets_origin() {
        let from = EntityState::default();
        let mut w = MsgWriter::new();
        w.write_u8(0); // coord low byte
        w.write_u8(64); // coord high byte -> 16384 raw / 8 = 2048.0
        let mut r = MsgReader::new(&w.data);
        let to = parse_delta(&from, 10, U_ORIGIN1, &mut r).unwrap();
        assert_eq!(to.number, 10);
        assert!(to.active);
        assert!((to.origin[0] - 2048.0).abs() < 0.01);
    }

    #[test]
    fn u_remove_deactivates_entity() {
        let mut table = EntityTable::new();
        table.current[7].active = true;
        table.remove(7);
        assert!(!table.current(7).unwrap().active);
    }

    #[test]
    fn apply_delta_falls_back_to_baseline_for_first_update() {
        let mut table = EntityTable::new();
        let mut baseline = EntityState::default();
        baseline.modelindex = 42;
        table.set_baseline(3, baseline);

        let mut w = MsgWriter::new();
        w.write_u8(0);
        w.write_u8(64);
        let mut r = MsgReader::new(&w.data);
        table.apply_delta(3, U_ORIGIN1, &mut r).unwrap();

        let cur = table.current(3).unwrap();
        assert_eq!(cur.modelindex, 42);
        assert!((cur.origin[0] - 2048.0).abs() < 0.01);
    }
}
