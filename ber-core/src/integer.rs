//! Minimal-length two's-complement integer codec (§4.2, C2).

use crate::error::{BerError, BerResult};

/// Minimum number of bytes needed to represent `value` such that the
/// two's-complement encoding is sign-recoverable. Zero always takes one
/// byte.
pub fn minimally_encoded_length_i64(value: i64) -> usize {
    if value == 0 {
        return 1;
    }
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let b = bytes[start];
        let next = bytes[start + 1];
        // Stripping `b` is safe only if doing so doesn't flip the sign:
        // `b` must be all-zero with the next byte's high bit clear, or
        // all-one with the next byte's high bit set.
        let strippable = (b == 0x00 && next & 0x80 == 0) || (b == 0xff && next & 0x80 != 0);
        if !strippable {
            break;
        }
        start += 1;
    }
    8 - start
}

/// Encode `value` into `buf` using the minimal two's-complement form.
/// Returns the number of bytes written.
pub fn encode_i64(value: i64, buf: &mut [u8]) -> BerResult<usize> {
    let n = minimally_encoded_length_i64(value);
    if buf.len() < n {
        return Err(BerError::BufferOverflow { needed: n, available: buf.len() });
    }
    let bytes = value.to_be_bytes();
    buf[..n].copy_from_slice(&bytes[8 - n..]);
    Ok(n)
}

/// Decode a signed two's-complement integer. Accepts non-minimal encodings
/// up to 8 bytes; anything longer overflows `i64`.
pub fn decode_i64(bytes: &[u8]) -> BerResult<i64> {
    if bytes.is_empty() {
        return Err(BerError::MalformedContent("empty integer content".to_string()));
    }
    if bytes.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }
    let negative = bytes[0] & 0x80 != 0;
    let fill = if negative { 0xffu8 } else { 0x00u8 };
    let mut wide = [fill; 8];
    wide[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(i64::from_be_bytes(wide))
}

/// Minimum number of bytes for an unsigned value; zero takes one byte.
pub fn minimally_encoded_length_u64(value: u64) -> usize {
    if value == 0 {
        return 1;
    }
    let bits = 64 - value.leading_zeros();
    ((bits + 7) / 8) as usize
}

pub fn encode_u64(value: u64, buf: &mut [u8]) -> BerResult<usize> {
    let n = minimally_encoded_length_u64(value);
    if buf.len() < n {
        return Err(BerError::BufferOverflow { needed: n, available: buf.len() });
    }
    let bytes = value.to_be_bytes();
    buf[..n].copy_from_slice(&bytes[8 - n..]);
    Ok(n)
}

pub fn decode_u64(bytes: &[u8]) -> BerResult<u64> {
    if bytes.is_empty() {
        return Err(BerError::MalformedContent("empty integer content".to_string()));
    }
    if bytes.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }
    let mut wide = [0u8; 8];
    wide[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(wide))
}

/// Decode into a narrower signed width, failing if the decoded value does
/// not fit. Covers i8/i16/i32 on top of the i64 decode path.
pub fn decode_signed_width(bytes: &[u8], width: u32) -> BerResult<i64> {
    let v = decode_i64(bytes)?;
    let min = -(1i64 << (width - 1));
    let max = (1i64 << (width - 1)) - 1;
    if v < min || v > max {
        return Err(BerError::IntegerOverflow);
    }
    Ok(v)
}

pub fn decode_unsigned_width(bytes: &[u8], width: u32) -> BerResult<u64> {
    let v = decode_u64(bytes)?;
    if width < 64 && v >= (1u64 << width) {
        return Err(BerError::IntegerOverflow);
    }
    Ok(v)
}

/// Reinterpret a value that was encoded as unsigned 32-bit BER as a signed
/// 64-bit value for the XML projection (§4.2 `uint_to_int`): negative i64
/// values are masked to their low 32 bits, which is the inverse of sign
/// extension for a grammar that used `u32` on the wire but wants `i64` in
/// XML.
pub fn uint_to_int(value: i64) -> i64 {
    if value < 0 {
        value & 0xffff_ffff
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_is_one_byte() {
        assert_eq!(minimally_encoded_length_i64(0), 1);
        let mut buf = [0u8; 8];
        let n = encode_i64(0, &mut buf).unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn scenario_negative_123_i16() {
        // `02 02 FF 85` decodes as i16 = -123; the non-minimal two-byte
        // content is accepted on decode even though -123 minimally encodes
        // to a single byte (0x85).
        let bytes = [0xff, 0x85];
        let v = decode_signed_width(&bytes, 16).unwrap();
        assert_eq!(v, -123);
        let mut buf = [0u8; 8];
        let n = encode_i64(-123, &mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x85]);
    }

    #[test]
    fn negative_128_is_one_byte() {
        let mut buf = [0u8; 8];
        let n = encode_i64(-128, &mut buf).unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], 0x80);
    }

    #[test]
    fn uint_to_int_masks_low_32_bits() {
        assert_eq!(uint_to_int(-1), 0xffff_ffff);
        assert_eq!(uint_to_int(42), 42);
    }

    proptest! {
        #[test]
        fn signed_round_trip(v: i64) {
            let mut buf = [0u8; 8];
            let n = encode_i64(v, &mut buf).unwrap();
            prop_assert_eq!(n, minimally_encoded_length_i64(v));
            prop_assert_eq!(decode_i64(&buf[..n]).unwrap(), v);
        }

        #[test]
        fn unsigned_round_trip(v: u64) {
            let mut buf = [0u8; 8];
            let n = encode_u64(v, &mut buf).unwrap();
            prop_assert_eq!(n, minimally_encoded_length_u64(v));
            prop_assert_eq!(decode_u64(&buf[..n]).unwrap(), v);
        }
    }
}
