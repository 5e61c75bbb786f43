// Vector codec
// Byte encoding used for vector query parameters


use crate::RagError;

/// Width of one encoded element in bytes
pub const ELEMENT_WIDTH: usize = std::mem::size_of::<f64>();

/// Encode a vector as concatenated little-endian `f64` values.
///
/// This is the blob format RediSearch expects for a `FLOAT64` vector passed
/// through `PARAMS`.
#[inline]
pub fn encode_vector(vector: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * ELEMENT_WIDTH);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a blob produced by [`encode_vector`].
#[inline]
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f64>, RagError> {
    if bytes.len() % ELEMENT_WIDTH != 0 {
        return Err(RagError::Codec(format!(
            "vector blob length {} is not a multiple of {}",
            bytes.len(),
            ELEMENT_WIDTH
        )));
    }

    let vector = bytes
        .chunks_exact(ELEMENT_WIDTH)
        .map(|chunk| {
            let mut buf = [0u8; ELEMENT_WIDTH];
            buf.copy_from_slice(chunk);
            f64::from_le_bytes(buf)
        })
        .collect();
    Ok(vector)
}
