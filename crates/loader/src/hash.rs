//! Content hashes: the document hash a source statement is registered under,
//! and the hash of each extraction loaded from it.

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

/// Hex SHA-256 of a statement file's bytes.
pub fn document_hash(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hex SHA-256 of an extraction. Objects serialise with sorted keys, so
/// reformatting or reordering the file does not change the hash.
pub fn json_hash(value: &serde_json::Value) -> String {
    format!("{:x}", Sha256::digest(value.to_string().as_bytes()))
}
