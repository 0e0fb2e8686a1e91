//! Streaming SHA-512 fingerprints of output files.

use anyhow::{Context, Result};
use sha2::{Digest, Sha512};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Content identity of one file: byte length plus SHA-512 hex digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    pub length: u64,
    pub sha512: String,
}

/// Hash a file in bounded chunks so large archives never get buffered
/// whole.
pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let mut file =
        File::open(path).with_context(|| format!("open {} for hashing", path.display()))?;
    let mut hasher = Sha512::new();
    let mut buffer = [0u8; 16 * 1024];
    let mut length = 0u64;
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        length += read as u64;
    }
    Ok(Fingerprint {
        length,
        sha512: hex::encode(hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EMPTY_SHA512: &str = "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce\
                                47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e";

    #[test]
    fn empty_file_has_well_known_digest() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("empty");
        File::create(&path).expect("create empty file");
        let fp = fingerprint(&path).expect("fingerprint empty file");
        assert_eq!(fp.length, 0);
        assert_eq!(fp.sha512, EMPTY_SHA512);
    }

    #[test]
    fn known_fixture_digest() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("fixture");
        let mut file = File::create(&path).expect("create fixture");
        file.write_all(b"hello world").expect("write fixture");
        drop(file);
        let fp = fingerprint(&path).expect("fingerprint fixture");
        assert_eq!(fp.length, 11);
        assert_eq!(
            fp.sha512,
            "309ecc489c12d6eb4cc40f50c902f2b4d0ed77ee511a7c7a9bcd3ca86d4cd86f\
             989dd35bc5ff499670da34255b45b0cfd830e81f605dcf7dc5542e93ae9cd76f"
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(fingerprint(Path::new("/nonexistent/file")).is_err());
    }
}
