//! Length-prefixed block padding.
//!
//! Frame layout: `len (4 bytes, big-endian) || data || zero fill`, with the
//! total rounded up to a multiple of the block size. Ciphertext lengths then
//! leak only the block count.

use crate::error::{CoreError, CoreResult};

const LEN_SIZE: usize = 4;

/// Pads `data` to a multiple of `block` bytes.
///
/// A `block` of 0 disables the rounding; the length prefix is still written.
pub fn pad(data: &[u8], block: usize) -> Vec<u8> {
    let framed = LEN_SIZE + data.len();
    let total = match block {
        0 => framed,
        b => framed.div_ceil(b) * b,
    };
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out.resize(total, 0);
    out
}

/// Recovers the data framed by [`pad`].
///
/// # Errors
///
/// Returns [`CoreError::InvalidPadding`] if the frame is shorter than its
/// prefix claims or the fill is not all zeros.
pub fn unpad(frame: &[u8]) -> CoreResult<Vec<u8>> {
    if frame.len() < LEN_SIZE {
        return Err(CoreError::invalid_padding("frame shorter than length prefix"));
    }
    let (prefix, rest) = frame.split_at(LEN_SIZE);
    let mut len_bytes = [0u8; LEN_SIZE];
    len_bytes.copy_from_slice(prefix);
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > rest.len() {
        return Err(CoreError::invalid_padding(format!(
            "length {len} exceeds frame of {} bytes",
            rest.len()
        )));
    }
    let (data, fill) = rest.split_at(len);
    if fill.iter().any(|&b| b != 0) {
        return Err(CoreError::invalid_padding("non-zero fill"));
    }
    Ok(data.to_vec())
}
