//! Fixed-width little-endian integer and length-prefixed byte string encoding.
//!
//! Every decoder is bounded by the caller-supplied slice: a short slice yields
//! `None` rather than reading past what the caller knows is present.

/// Encode a `u8` at `buf[offset..]`. Returns the number of bytes written.
pub fn encode_u8(buf: &mut [u8], offset: usize, value: u8) -> usize {
    buf[offset] = value;
    1
}

/// Decode a `u8` from the front of `bytes`. Returns the value and bytes consumed.
pub fn decode_u8(bytes: &[u8]) -> Option<(u8, usize)> {
    bytes.first().map(|&b| (b, 1))
}

/// Encode a `u16` at `buf[offset..]`, little-endian. Returns bytes written.
pub fn encode_u16(buf: &mut [u8], offset: usize, value: u16) -> usize {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    2
}

/// Decode a `u16` from the front of `bytes`, little-endian.
pub fn decode_u16(bytes: &[u8]) -> Option<(u16, usize)> {
    let raw: [u8; 2] = bytes.get(0..2)?.try_into().ok()?;
    Some((u16::from_le_bytes(raw), 2))
}

/// Encode a `u32` at `buf[offset..]`, little-endian. Returns bytes written.
pub fn encode_u32(buf: &mut [u8], offset: usize, value: u32) -> usize {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    4
}

/// Decode a `u32` from the front of `bytes`, little-endian.
pub fn decode_u32(bytes: &[u8]) -> Option<(u32, usize)> {
    let raw: [u8; 4] = bytes.get(0..4)?.try_into().ok()?;
    Some((u32::from_le_bytes(raw), 4))
}

/// Encode a `u64` at `buf[offset..]`, little-endian. Returns bytes written.
pub fn encode_u64(buf: &mut [u8], offset: usize, value: u64) -> usize {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    8
}

/// Decode a `u64` from the front of `bytes`, little-endian.
pub fn decode_u64(bytes: &[u8]) -> Option<(u64, usize)> {
    let raw: [u8; 8] = bytes.get(0..8)?.try_into().ok()?;
    Some((u64::from_le_bytes(raw), 8))
}

/// Encode an `i8` at `buf[offset..]`. Returns bytes written.
pub fn encode_i8(buf: &mut [u8], offset: usize, value: i8) -> usize {
    encode_u8(buf, offset, value as u8)
}

/// Decode an `i8` from the front of `bytes`.
pub fn decode_i8(bytes: &[u8]) -> Option<(i8, usize)> {
    decode_u8(bytes).map(|(v, n)| (v as i8, n))
}

/// Encode an `i16` at `buf[offset..]`, little-endian. Returns bytes written.
pub fn encode_i16(buf: &mut [u8], offset: usize, value: i16) -> usize {
    encode_u16(buf, offset, value as u16)
}

/// Decode an `i16` from the front of `bytes`, little-endian.
pub fn decode_i16(bytes: &[u8]) -> Option<(i16, usize)> {
    decode_u16(bytes).map(|(v, n)| (v as i16, n))
}

/// Encode an `i64` at `buf[offset..]`, little-endian. Returns bytes written.
pub fn encode_i64(buf: &mut [u8], offset: usize, value: i64) -> usize {
    encode_u64(buf, offset, value as u64)
}

/// Decode an `i64` from the front of `bytes`, little-endian.
pub fn decode_i64(bytes: &[u8]) -> Option<(i64, usize)> {
    decode_u64(bytes).map(|(v, n)| (v as i64, n))
}

/// Encode `value` at `buf[offset..]` as a `u32` length prefix followed by the raw bytes.
/// Returns bytes written.
pub fn encode_bytes(buf: &mut [u8], offset: usize, value: &[u8]) -> usize {
    let mut written = encode_u32(buf, offset, value.len() as u32);
    buf[offset + written..offset + written + value.len()].copy_from_slice(value);
    written += value.len();
    written
}

/// Decode a `u32`-length-prefixed byte string from the front of `bytes`.
/// Returns the decoded bytes and the total bytes consumed (prefix + payload).
pub fn decode_bytes(bytes: &[u8]) -> Option<(Vec<u8>, usize)> {
    let (len, prefix) = decode_u32(bytes)?;
    let len = len as usize;
    let payload = bytes.get(prefix..prefix + len)?;
    Some((payload.to_vec(), prefix + len))
}
