//! SHA-256 provenance hashing for stored images

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const CHUNK_SIZE: usize = 1024 * 1024;

/// Hex-encoded SHA-256 of a file, streamed in 1MB chunks
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    tracing::debug!(path = %path.display(), "Calculating SHA-256 hash");

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Size and (optionally) hash of a stored file
///
/// Both are best-effort: a failure is logged and the field left empty.
pub fn describe_file(path: &Path, hash: bool) -> (Option<u64>, Option<String>) {
    let bytes = match std::fs::metadata(path) {
        Ok(metadata) => Some(metadata.len()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not read size of stored file");
            return (None, None);
        }
    };

    if !hash {
        return (bytes, None);
    }

    match sha256_file(path) {
        Ok(digest) => (bytes, Some(digest)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not hash stored file");
            (bytes, None)
        }
    }
}
