/// SHA-256 fingerprints for chunks and reassembled files.
///
/// The same primitive is used at both granularities, so a sender can hash
/// chunks and the whole file with one function and compare against what the
/// receiver reports.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

/// Digest length in bytes.
pub const FINGERPRINT_LEN: usize = 32;

/// A 256-bit content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Lowercase hex, 64 chars.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First `len` hex chars, for log lines and progress events.
    pub fn short(&self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintParseError {
    #[error("fingerprint is not valid hex: {0}")]
    InvalidHex(String),

    #[error("fingerprint must be {FINGERPRINT_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    /// Parses hex in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| FingerprintParseError::InvalidHex(e.to_string()))?;
        let bytes: [u8; FINGERPRINT_LEN] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| FingerprintParseError::InvalidLength(v.len()))?;
        Ok(Self(bytes))
    }
}

/// Stateless content hasher.
pub struct ChunkHasher;

impl ChunkHasher {
    /// SHA-256 of `data`.
    pub fn fingerprint(data: &[u8]) -> Fingerprint {
        Fingerprint(Sha256::digest(data).into())
    }

    /// Recompute and compare against `expected`.
    pub fn verify(data: &[u8], expected: &Fingerprint) -> bool {
        Self::fingerprint(data) == *expected
    }
}
