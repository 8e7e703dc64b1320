// SPDX-License-Identifier: MIT

//! SHA-256 content hashing. Content only, never metadata (mtimes,
//! permissions are never fed into a hash; permissions do appear as a
//! plain field in directory manifests, see [`crate::manifest`]).

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

/// Hex-encoded SHA-256 digest of an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hex-encoded SHA-256 digest of a file's contents, streamed rather than
/// read fully into memory.
pub async fn hash_file(path: &Path) -> io::Result<String> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hash_bytes_is_deterministic() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[tokio::test]
    async fn hash_file_matches_hash_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, b"hello").unwrap();
        let digest = hash_file(&path).await.unwrap();
        assert_eq!(digest, hash_bytes(b"hello"));
    }
}
