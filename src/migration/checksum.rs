// ABOUTME: Content checksums for distribution files
// ABOUTME: Streaming SHA-256 so large release assets never load fully into memory

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Hex-encoded SHA-256 of a file's current bytes
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open {} for checksum", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let read = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {} for checksum", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether the file at `path` hashes to `expected` (case-insensitive hex)
pub fn verify_sha256(path: &Path, expected: &str) -> Result<bool> {
    Ok(sha256_file(path)?.eq_ignore_ascii_case(expected))
}
