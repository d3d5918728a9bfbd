use sha2::{Digest, Sha512};
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::IntegrityError;

/// Length of a hex-encoded SHA-512 digest.
pub const DIGEST_HEX_LEN: usize = 128;

/// Compute SHA-512 hex digest of a byte slice.
pub fn sha512_hex(data: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA-512 hex digest of a file, streaming its content.
pub fn hash_file(path: &Path) -> Result<String, IntegrityError> {
    let mut file = fs::File::open(path).map_err(|e| IntegrityError::not_readable(path, e))?;
    let mut hasher = Sha512::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| IntegrityError::not_readable(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        assert_eq!(
            sha512_hex(b""),
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce\
             47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
        );
    }

    #[test]
    fn file_digest_equals_byte_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let digest = hash_file(&path).unwrap();
        assert_eq!(digest, sha512_hex(&data));
        assert_eq!(digest.len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn missing_file_is_not_readable() {
        let dir = tempfile::tempdir().unwrap();
        let err = hash_file(&dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), crate::error::FatalKind::NotReadable);
    }
}
