// compression.rs -- zlib (raw deflate) packet compression for ZPACKET
//
// Ground: myq2-common::compression.rs. Only decompression is needed here --
// this crate is receive-only (spectator client, never sends game state) --
// so `compress_packet`/`compress_data` are dropped.

use flate2::read::DeflateDecoder;
use std::io::Read;

use crate::error::DecodeError;

pub const MAX_DECOMPRESS_SIZE: usize = 65536;

/// Inflates raw-deflate `data`, refusing to grow past `max_size` to guard
/// against a malicious server sending a decompression bomb.
pub fn decompress(data: &[u8], max_size: usize) -> Result<Vec<u8>, DecodeError> {
    let max_size = max_size.min(MAX_DECOMPRESS_SIZE);
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::with_capacity(max_size.min(data.len() * 4));

    let mut buf = [0u8; 4096];
    loop {
        match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if out.len() + n > max_size {
                    return Err(DecodeError::Inflate("decompressed size exceeds limit".into()));
                }
                out.extend_from_slice(&buf[..n]);
            }
            Err(e) => return Err(DecodeError::Inflate(e.to_string())),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn roundtrips_through_raw_deflate() {
        let original = b"the quick brown fox jumps over the lazy dog, repeatedly, repeatedly";
        let compressed = deflate(original);
        let out = decompress(&compressed, 1024).unwrap();
        assert_eq!(out, original);
    }

    #[test]
    fn rejects_output_over_limit() {
        let original = vec![0u8; 10_000];
        let compressed = deflate(&original);
        assert!(decompress(&compressed, 100).is_err());
    }
}
