//! Content-addressed script identifiers.
//!
//! A [`Digest`] is a 20-byte SHA-1 hash rendered as the 40-character lowercase
//! hex string scripts are addressed by everywhere outside this module: cache
//! keys, `EVALSHA`-style lookups, and `SCRIPT EXISTS`/`SCRIPT SHOW` arguments.

use std::fmt;
use std::str::FromStr;

use sha1::{Digest as _, Sha1};
use thiserror::Error;

/// Number of hex characters in a rendered digest.
pub const DIGEST_HEX_LEN: usize = 40;

/// A SHA-1 digest of a script body, the cache's primary key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 20]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("invalid digest length: expected {DIGEST_HEX_LEN} hex characters, got {0}")]
    WrongLength(usize),
    #[error("invalid digest: not a hex string")]
    NotHex,
}

impl Digest {
    /// Computes the content-addressed digest of a raw script body.
    pub fn of(body: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(body);
        let bytes: [u8; 20] = hasher.finalize().into();
        Digest(bytes)
    }

    /// Validates and normalizes a caller-supplied digest string (e.g. the
    /// argument to `EVALSHA` or `SCRIPT EXISTS`): must be exactly 40 hex
    /// characters, case-insensitive, lowercased on return.
    pub fn parse(s: &str) -> Result<Self, DigestError> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(DigestError::WrongLength(s.len()));
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_val(chunk[0]).ok_or(DigestError::NotHex)?;
            let lo = hex_val(chunk[1]).ok_or(DigestError::NotHex)?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Digest(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_of_is_deterministic() {
        let a = Digest::of(b"return 1");
        let b = Digest::of(b"return 1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_of_differs_on_different_bodies() {
        let a = Digest::of(b"return 1");
        let b = Digest::of(b"return 2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let d = Digest::of(b"local x = 1");
        let hex = d.to_string();
        assert_eq!(hex.len(), DIGEST_HEX_LEN);
        let parsed = Digest::parse(&hex).expect("valid digest");
        assert_eq!(d, parsed);
    }

    #[test]
    fn test_parse_uppercase_lowercases() {
        let lower = Digest::of(b"x").to_string();
        let upper = lower.to_uppercase();
        let parsed = Digest::parse(&upper).expect("valid digest");
        assert_eq!(parsed.to_string(), lower);
    }

    #[test]
    fn test_parse_wrong_length_rejected() {
        assert_eq!(Digest::parse("abc"), Err(DigestError::WrongLength(3)));
    }

    #[test]
    fn test_parse_non_hex_rejected() {
        let bad = "g".repeat(DIGEST_HEX_LEN);
        assert_eq!(Digest::parse(&bad), Err(DigestError::NotHex));
    }
}
