// net_chan.rs -- network channel: reliable/unreliable framing over UDP
//
// Ground: myq2-common::net_chan.rs (netchan_setup/netchan_transmit/
// netchan_process). The sequence-number packing, reliable-bit toggling, and
// fragment reassembly rules are carried over verbatim; the duplicate-packet
// burst-loss mitigation (`netchan_transmit_with_dup`) is dropped, since this
// crate's contract sends exactly one packet per transmit call. Ownership is
// an instance field instead of a `NetChan` value inside a mutex-guarded
// global client struct.
//
// qport is asymmetric (spec.md section 4.1; the teacher writes it only for
// `NetSrc::Client` and reads it only for `NetSrc::Server`): `transmit` writes
// it because this crate is always the client, and `process` never reads it
// back, because every packet handed to `process` came from the server, and
// server->client packets carry no qport field at all.

use crate::error::DecodeError;
use crate::message::{MsgReader, MsgWriter};
use crate::protocol::ProtocolVersion;

const MAX_MSGLEN: usize = 1400;
const FRAGMENT_BIT: u32 = 1 << 30;
const MAX_FRAGMENT_SIZE: usize = 1280;

#[derive(Debug, Default)]
struct FragmentAssembly {
    in_progress: bool,
    sequence: u32,
    current_offset: usize,
    buffer: Vec<u8>,
}

impl FragmentAssembly {
    fn reset(&mut self) {
        self.in_progress = false;
        self.sequence = 0;
        self.current_offset = 0;
        self.buffer.clear();
    }
}

/// One end of a netchan connection. The client always has exactly one of
/// these, created by `Netchan::setup` once a qport and protocol are known.
pub struct Netchan {
    protocol: ProtocolVersion,
    qport: u16,

    outgoing_sequence: u32,
    incoming_sequence: u32,
    incoming_acknowledged: u32,
    incoming_reliable_sequence: u32,
    incoming_reliable_acknowledged: u32,

    reliable_sequence: u32,
    last_reliable_sequence: u32,
    reliable_buf: Vec<u8>,

    fragment_in: FragmentAssembly,

    pub dropped: i64,
}

impl Netchan {
    pub fn setup(protocol: ProtocolVersion, qport: u16) -> Self {
        Self {
            protocol,
            qport,
            outgoing_sequence: 1,
            incoming_sequence: 0,
            incoming_acknowledged: 0,
            incoming_reliable_sequence: 0,
            incoming_reliable_acknowledged: 0,
            reliable_sequence: 0,
            last_reliable_sequence: 0,
            reliable_buf: Vec::new(),
            fragment_in: FragmentAssembly::default(),
            dropped: 0,
        }
    }

    pub fn can_reliable(&self) -> bool {
        self.reliable_buf.is_empty()
    }

    fn need_reliable(&self, pending_reliable: bool) -> bool {
        if self.incoming_acknowledged > self.last_reliable_sequence
            && self.incoming_reliable_acknowledged != self.reliable_sequence
        {
            return true;
        }
        self.reliable_buf.is_empty() && pending_reliable
    }

    /// Queues `reliable` (if any) into the reliable buffer and produces the
    /// bytes of one outgoing packet carrying `unreliable` as its payload.
    /// Exactly one packet per call -- no duplicate transmission.
    pub fn transmit(&mut self, unreliable: &[u8], reliable: Option<&[u8]>) -> Vec<u8> {
        if let Some(r) = reliable {
            if self.reliable_buf.is_empty() {
                self.reliable_buf = r.to_vec();
                self.reliable_sequence ^= 1;
            }
        }

        let send_reliable = self.need_reliable(!self.reliable_buf.is_empty());

        let w1 = (self.outgoing_sequence & !(1u32 << 31)) | ((send_reliable as u32) << 31);
        let w2 = (self.incoming_sequence & !(1u32 << 31))
            | (self.incoming_reliable_sequence << 31);

        self.outgoing_sequence += 1;

        let mut w = MsgWriter::new();
        w.write_u32(w1);
        w.write_u32(w2);

        if self.protocol.uses_short_qport() {
            w.write_u8((self.qport & 0xFF) as u8);
            w.write_u8((self.qport >> 8) as u8);
        } else {
            w.write_u8((self.qport & 0xFF) as u8);
        }

        if send_reliable {
            w.write_bytes(&self.reliable_buf);
            self.last_reliable_sequence = self.outgoing_sequence;
        }

        let remaining = MAX_MSGLEN.saturating_sub(w.data.len());
        if remaining >= unreliable.len() {
            w.write_bytes(unreliable);
        } else {
            tracing::warn!(target: "netchan", "dumped unreliable payload, no room in packet");
        }

        w.data
    }

    /// Parses the netchan header off `packet` and returns the payload bytes
    /// ready for the game-message decoder, or `None` if the packet is stale,
    /// duplicated, or an incomplete fragment.
    pub fn process(&mut self, packet: &[u8]) -> Result<Option<Vec<u8>>, DecodeError> {
        let mut r = MsgReader::new(packet);
        let mut sequence = r.read_u32()?;
        let mut sequence_ack = r.read_u32()?;

        let reliable_message = sequence >> 31;
        let reliable_ack = sequence_ack >> 31;

        let fragmented = self.protocol.supports_fragmentation() && (sequence & FRAGMENT_BIT) != 0;

        sequence &= !(1u32 << 31);
        if self.protocol.supports_fragmentation() {
            sequence &= !FRAGMENT_BIT;
        }
        sequence_ack &= !(1u32 << 31);

        if sequence <= self.incoming_sequence {
            tracing::trace!(target: "netchan", sequence, incoming = self.incoming_sequence, "dropped stale or duplicate packet");
            return Ok(None);
        }

        self.dropped = sequence as i64 - (self.incoming_sequence as i64 + 1);

        let payload: Vec<u8> = if fragmented {
            let fragment_offset = r.read_u16()? as usize;
            let fragment_length = r.read_u16()? as usize;

            if fragment_length == 0 || fragment_length > MAX_FRAGMENT_SIZE {
                tracing::warn!(target: "netchan", fragment_length, "bad fragment length");
                return Err(DecodeError::BadFragment);
            }

            if !self.fragment_in.in_progress || self.fragment_in.sequence != sequence {
                self.fragment_in.reset();
                self.fragment_in.in_progress = true;
                self.fragment_in.sequence = sequence;
            }

            if fragment_offset != self.fragment_in.current_offset {
                tracing::warn!(
                    target: "netchan",
                    expected = self.fragment_in.current_offset,
                    got = fragment_offset,
                    "fragment out of order"
                );
                self.fragment_in.reset();
                return Err(DecodeError::BadFragment);
            }

            let chunk = r.read_bytes(fragment_length)?;
            self.fragment_in.buffer.extend_from_slice(chunk);
            self.fragment_in.current_offset += fragment_length;

            if fragment_length < MAX_FRAGMENT_SIZE {
                self.fragment_in.in_progress = false;
                let complete = std::mem::take(&mut self.fragment_in.buffer);
                self.fragment_in.reset();
                complete
            } else {
                self.incoming_sequence = sequence;
                return Ok(None);
            }
        } else {
            r.read_bytes(r.remaining())?.to_vec()
        };

        if reliable_ack == self.reliable_sequence {
            self.reliable_buf.clear();
        }

        self.incoming_sequence = sequence;
        self.incoming_acknowledged = sequence_ack;
        self.incoming_reliable_acknowledged = reliable_ack;

        if reliable_message != 0 {
            self.incoming_reliable_sequence ^= 1;
        }

        Ok(Some(payload))
    }
}

/// Builds an out-of-band datagram: a `0xFFFFFFFF` sequence prefix followed
/// by raw command bytes. Ground: `netchan_out_of_band_data`.
pub fn out_of_band_data(data: &[u8]) -> Vec<u8> {
    let mut w = MsgWriter::new();
    w.write_u32(0xFFFF_FFFF);
    w.write_bytes(data);
    w.data
}

pub fn out_of_band_print(command: &str) -> Vec<u8> {
    out_of_band_data(command.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan() -> Netchan {
        Netchan::setup(ProtocolVersion::AQtion, 12345)
    }

    #[test]
    fn fresh_channel_can_reliable() {
        assert!(chan().can_reliable());
    }

    #[test]
    fn out_of_band_prefix_is_all_ones() {
        let packet = out_of_band_data(b"ping");
        assert_eq!(&packet[..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&packet[4..], b"ping");
    }

    #[test]
    fn transmit_advances_outgoing_sequence() {
        let mut c = chan();
        let before = c.outgoing_sequence;
        c.transmit(b"test", None);
        assert_eq!(c.outgoing_sequence, before + 1);
    }

    // Server->client packets carry no qport field (spec.md section 4.1), so
    // these build raw headers by hand rather than routing through
    // `transmit`, which writes one (client->server only).
    fn raw_server_packet(sequence: u32, ack: u32, payload: &[u8]) -> Vec<u8> {
        let mut w = MsgWriter::new();
        w.write_u32(sequence);
        w.write_u32(ack);
        w.write_bytes(payload);
        w.data
    }

    #[test]
    fn process_reads_a_server_packet_with_no_qport_field() {
        let mut client = Netchan::setup(ProtocolVersion::AQtion, 4242);
        let packet = raw_server_packet(1, 0, b"hello");
        let payload = client.process(&packet).unwrap().unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn duplicate_packet_is_dropped() {
        let mut client = Netchan::setup(ProtocolVersion::Vanilla, 4242);
        let packet = raw_server_packet(1, 0, b"hello");
        assert!(client.process(&packet).unwrap().is_some());
        assert!(client.process(&packet).unwrap().is_none());
    }

    #[test]
    fn bad_fragment_length_is_rejected() {
        let mut c = Netchan::setup(ProtocolVersion::Q2Pro, 1);
        let mut w = MsgWriter::new();
        w.write_u32((1u32) | FRAGMENT_BIT);
        w.write_u32(0);
        w.write_u8(0);
        w.write_u8(0); // fragment_offset = 0
        w.write_u8(0xFF);
        w.write_u8(0xFF); // fragment_length = 0xFFFF, too large
        assert!(c.process(&w.data).is_err());
    }
}
