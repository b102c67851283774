//! Chunk Assembler
//!
//! Reassembles a file's chunk slots into one contiguous buffer and encodes
//! it for the remote content API.

use base64::Engine;

use super::types::{FileUpload, UploadError};

/// Input window for base64 encoding. Must stay a multiple of 3 so that no
/// window emits padding before the final one.
pub const ENCODE_WINDOW: usize = 3 * 16 * 1024;

/// Concatenate every chunk slot in index order.
pub fn assemble(file: &FileUpload) -> Result<Vec<u8>, UploadError> {
    let missing = file.missing_chunks();
    if !missing.is_empty() {
        return Err(UploadError::IncompleteUpload {
            file: file.name.clone(),
            missing,
        });
    }

    let len = file.chunks.iter().flatten().map(|c| c.len()).sum();
    let mut merged = Vec::with_capacity(len);
    for chunk in file.chunks.iter().flatten() {
        merged.extend_from_slice(chunk);
    }

    Ok(merged)
}

/// Standard padded base64, produced one bounded window at a time.
pub fn encode_base64(bytes: &[u8]) -> String {
    let engine = &base64::engine::general_purpose::STANDARD;
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for window in bytes.chunks(ENCODE_WINDOW) {
        engine.encode_string(window, &mut out);
    }
    out
}
