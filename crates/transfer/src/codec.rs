use std::io::Read;

use base64::{Engine, engine::general_purpose::STANDARD};
use bzip2::read::BzDecoder;
use framesink_protocol::constants::MAX_DECODED_CHUNK;

use crate::TransferError;

/// Decodes a chunk buffer into raw file bytes.
///
/// The buffer is base64 text; line breaks and other ASCII whitespace
/// inserted by senders that wrap their encoding are ignored. When
/// `compressed` is set the decoded bytes are a bzip2 stream, which may
/// expand to at most [`MAX_DECODED_CHUNK`] bytes.
pub fn decode_chunk(buffer: &str, compressed: bool) -> Result<Vec<u8>, TransferError> {
    decode_chunk_with_limit(buffer, compressed, MAX_DECODED_CHUNK)
}

fn decode_chunk_with_limit(
    buffer: &str,
    compressed: bool,
    limit: usize,
) -> Result<Vec<u8>, TransferError> {
    let decoded = if buffer.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = buffer.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(buffer)
    }
    .map_err(|e| TransferError::Decode(format!("base64: {e}")))?;

    if !compressed {
        return Ok(decoded);
    }

    let mut data = Vec::with_capacity((decoded.len() * 4).min(limit));
    BzDecoder::new(decoded.as_slice())
        .take(limit as u64 + 1)
        .read_to_end(&mut data)
        .map_err(|e| TransferError::Decode(format!("bzip2: {e}")))?;
    if data.len() > limit {
        return Err(TransferError::Decode(format!(
            "bzip2: chunk expands beyond {limit} bytes"
        )));
    }
    Ok(data)
}
