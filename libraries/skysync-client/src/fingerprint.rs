//! SSH public-key fingerprint computation.
//!
//! The cloud service identifies an agent by the SHA-256 digest of its raw
//! public-key blob (the same digest `ssh-keygen -lf` reports). We read the
//! OpenSSH one-line format: `<type> <base64-blob> [comment]`.

use crate::error::{ClientError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Read and trim the public key file contents.
pub fn read_public_key(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        ClientError::Identity(format!("cannot read public key {}: {}", path.display(), e))
    })?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Err(ClientError::Identity(format!(
            "public key {} is empty",
            path.display()
        )));
    }
    Ok(trimmed.to_string())
}

/// Compute the SHA-256 fingerprint of the key blob in an OpenSSH
/// public key file.
pub fn compute_fingerprint(path: &Path) -> Result<Vec<u8>> {
    let key_line = read_public_key(path)?;

    let blob_b64 = key_line.split_whitespace().nth(1).ok_or_else(|| {
        ClientError::Identity(format!(
            "public key {} is not in OpenSSH format",
            path.display()
        ))
    })?;

    let blob = BASE64.decode(blob_b64).map_err(|e| {
        ClientError::Identity(format!("public key {} blob: {}", path.display(), e))
    })?;

    Ok(Sha256::digest(&blob).to_vec())
}

/// Base64-encoded fingerprint, ready for an API payload.
pub fn fingerprint_b64(path: &Path) -> Result<String> {
    Ok(BASE64.encode(compute_fingerprint(path)?))
}

/// Hex rendering of a fingerprint, for log lines.
pub fn fingerprint_hex(fingerprint: &[u8]) -> String {
    hex::encode(fingerprint)
}

/// Base64 of the full public key line, as the register payload expects.
pub fn public_key_b64(path: &Path) -> Result<String> {
    Ok(BASE64.encode(read_public_key(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // A syntactically valid OpenSSH ed25519 public key line; the blob is
    // just base64, the digest does not care what it decodes to.
    const KEY_LINE: &str = "ssh-ed25519 QUJDREVGR0hJSktMTU5PUFFSU1RVVldYWVph pilot@cc";

    fn write_key(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_read_public_key_trims() {
        let f = write_key("ssh-ed25519 QUJD comment\n\n");
        let key = read_public_key(f.path()).unwrap();
        assert_eq!(key, "ssh-ed25519 QUJD comment");
    }

    #[test]
    fn test_fingerprint_is_sha256_of_blob() {
        let f = write_key("ssh-ed25519 QUJD comment\n");
        let fp = compute_fingerprint(f.path()).unwrap();
        // QUJD decodes to "ABC"
        assert_eq!(fp, Sha256::digest(b"ABC").to_vec());
    }

    #[test]
    fn test_fingerprint_stable_across_reads() {
        let f = write_key(KEY_LINE);
        let a = fingerprint_b64(f.path()).unwrap();
        let b = fingerprint_b64(f.path()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_file_is_identity_error() {
        let err = compute_fingerprint(Path::new("/nonexistent/id_skysync.pub")).unwrap_err();
        assert!(matches!(err, ClientError::Identity(_)));
    }

    #[test]
    fn test_single_field_line_rejected() {
        let f = write_key("not-a-key\n");
        let err = compute_fingerprint(f.path()).unwrap_err();
        assert!(matches!(err, ClientError::Identity(_)));
    }

    #[test]
    fn test_empty_file_rejected() {
        let f = write_key("   \n");
        let err = read_public_key(f.path()).unwrap_err();
        assert!(matches!(err, ClientError::Identity(_)));
    }
}
