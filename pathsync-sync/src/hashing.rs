//! Streaming SHA-256 content fingerprints.
//!
//! Fingerprints are lower-case hex digests of the raw bytes. No line-ending
//! normalisation: synced content must round-trip byte for byte.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

const READ_BUF: usize = 64 * 1024;

/// Fingerprint of an in-memory payload.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Fingerprint and byte length of everything `reader` yields.
pub fn hash_reader(mut reader: impl Read) -> std::io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}

/// Fingerprint and byte length of the file at `path`.
pub fn hash_file(path: &Path) -> Result<(String, u64), SyncError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    hash_reader(file).map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn empty_input_has_known_digest() {
        assert_eq!(hash_bytes(b""), EMPTY_SHA256);
        assert_eq!(hash_reader(&b""[..]).unwrap(), (EMPTY_SHA256.to_string(), 0));
    }

    #[test]
    fn file_and_bytes_agree() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &payload).unwrap();

        let (digest, len) = hash_file(&path).unwrap();
        assert_eq!(digest, hash_bytes(&payload));
        assert_eq!(len, payload.len() as u64);
    }

    #[test]
    fn crlf_is_not_normalised() {
        assert_ne!(hash_bytes(b"a\r\nb"), hash_bytes(b"a\nb"));
    }

    #[test]
    fn missing_file_is_io_error_with_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope");
        match hash_file(&path) {
            Err(SyncError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}
