use std::io::Read;
use std::path::Path;
use std::time::Instant;

use framesink_protocol::FileMetadata;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::TransferError;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Digest used for whole-file verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Md5,
    Sha256,
}

/// Computes the digest of `data` and returns it hex-encoded.
pub fn checksum_bytes(data: &[u8], algorithm: ChecksumAlgorithm) -> String {
    match algorithm {
        ChecksumAlgorithm::Md5 => hex::encode(Md5::digest(data)),
        ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
    }
}

/// Computes the digest of an entire file and returns it hex-encoded.
///
/// Reads the file in a streaming fashion; this can stall the calling
/// thread for a long time on large files.
pub fn file_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String, TransferError> {
    let start = Instant::now();
    let file = std::fs::File::open(path)?;
    let digest = match algorithm {
        ChecksumAlgorithm::Md5 => digest_reader::<Md5>(file)?,
        ChecksumAlgorithm::Sha256 => digest_reader::<Sha256>(file)?,
    };
    tracing::debug!(
        path = %path.display(),
        checksum = %digest,
        elapsed_secs = format_args!("{:.3}", start.elapsed().as_secs_f64()),
        "checksum computed"
    );
    Ok(digest)
}

fn digest_reader<D: Digest>(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Checks a stored byte count against the declared size, if any.
pub fn verify_size(expected: Option<u64>, actual: u64) -> Result<(), TransferError> {
    match expected {
        Some(expected) if expected != actual => {
            Err(TransferError::SizeMismatch { expected, actual })
        }
        _ => Ok(()),
    }
}

/// Verifies the file at `path` against `metadata.checksum`.
///
/// When the sender supplied no checksum the computed one is stored in
/// `metadata` instead of failing. Returns the computed digest.
pub fn verify_checksum(
    path: &Path,
    metadata: &mut FileMetadata,
    algorithm: ChecksumAlgorithm,
) -> Result<String, TransferError> {
    let computed = file_checksum(path, algorithm)?;
    match metadata.checksum.as_deref().map(str::trim) {
        Some(sent) if !sent.is_empty() => {
            if !sent.eq_ignore_ascii_case(&computed) {
                return Err(TransferError::ChecksumMismatch {
                    expected: sent.to_string(),
                    actual: computed,
                });
            }
        }
        _ => {
            tracing::warn!(path = %path.display(), "sender supplied no checksum; storing computed value");
            metadata.checksum = Some(computed.clone());
        }
    }
    Ok(computed)
}
