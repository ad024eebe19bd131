//! `[compression:u8][payload]` framing (§3.6). `compression = 0` is raw,
//! `compression = 1` is Snappy. Compression is applied only when the raw
//! payload is at least [`COMPRESSION_THRESHOLD`] bytes — unlike the marker-
//! byte scheme this is adapted from, an unrecognized flag byte is a decode
//! error here, not a passthrough: the wire format's two values are
//! exhaustive.

use crate::error::CodecError;

pub const COMPRESSION_THRESHOLD: usize = 256;

const FLAG_RAW: u8 = 0;
const FLAG_SNAPPY: u8 = 1;

/// Frame `raw` per the threshold/marker rules and return the wire bytes.
pub fn frame(raw: &[u8]) -> Result<Vec<u8>, CodecError> {
    if raw.len() < COMPRESSION_THRESHOLD {
        let mut out = Vec::with_capacity(raw.len() + 1);
        out.push(FLAG_RAW);
        out.extend_from_slice(raw);
        return Ok(out);
    }
    let mut encoder = snap::raw::Encoder::new();
    let compressed = encoder.compress_vec(raw)?;
    let mut out = Vec::with_capacity(compressed.len() + 1);
    out.push(FLAG_SNAPPY);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Recover the raw MessagePack payload from a framed wire buffer.
pub fn unframe(wire: &[u8]) -> Result<Vec<u8>, CodecError> {
    let (&flag, payload) = wire.split_first().ok_or(CodecError::EmptyFrame)?;
    match flag {
        FLAG_RAW => Ok(payload.to_vec()),
        FLAG_SNAPPY => {
            let mut decoder = snap::raw::Decoder::new();
            Ok(decoder.decompress_vec(payload)?)
        }
        other => Err(CodecError::UnknownCompressionFlag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_raw() {
        let raw = vec![1u8, 2, 3, 4];
        let wire = frame(&raw).unwrap();
        assert_eq!(wire[0], FLAG_RAW);
        assert_eq!(unframe(&wire).unwrap(), raw);
    }

    #[test]
    fn at_or_above_threshold_is_snappy() {
        let raw = vec![7u8; COMPRESSION_THRESHOLD];
        let wire = frame(&raw).unwrap();
        assert_eq!(wire[0], FLAG_SNAPPY);
        assert_eq!(unframe(&wire).unwrap(), raw);
    }

    #[test]
    fn unknown_flag_is_an_error() {
        let wire = vec![9u8, 1, 2, 3];
        assert!(matches!(
            unframe(&wire),
            Err(CodecError::UnknownCompressionFlag(9))
        ));
    }

    #[test]
    fn empty_wire_is_an_error() {
        assert!(matches!(unframe(&[]), Err(CodecError::EmptyFrame)));
    }
}
