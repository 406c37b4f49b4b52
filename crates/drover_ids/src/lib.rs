//! Sortable job identifiers for Drover.
//!
//! A `JobId` is a 26-character Crockford-base32 string: a 48-bit millisecond
//! timestamp followed by an 80-bit random suffix. Identifiers issued by one
//! process sort lexicographically in issue order, which makes the id both the
//! primary key and the claim-ordering tie-break key without a secondary
//! index.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Crockford base32 alphabet (no I, L, O, U).
const ENCODING: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Encoded identifier length: 10 chars of timestamp + 16 chars of suffix.
pub const JOB_ID_LEN: usize = 26;

const SUFFIX_BITS: u32 = 80;
const SUFFIX_MASK: u128 = (1 << SUFFIX_BITS) - 1;

/// Error returned when parsing a job identifier fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("job id must be 26 characters, got {0}")]
    Length(usize),
    #[error("job id contains invalid character {0:?}")]
    Character(char),
    #[error("job id timestamp out of range")]
    Overflow,
}

/// A lexicographically sortable, time-prefixed job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh identifier from the process-wide generator.
    ///
    /// Within a single millisecond, the random suffix of the previous id is
    /// incremented so consecutive ids remain strictly increasing.
    pub fn generate() -> Self {
        let (millis, suffix) = GENERATOR
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .next(now_millis());
        Self(encode(millis, suffix))
    }

    /// Parse a canonical (uppercase) 26-character identifier.
    pub fn parse(value: &str) -> Result<Self, IdParseError> {
        if value.len() != JOB_ID_LEN {
            return Err(IdParseError::Length(value.len()));
        }
        for ch in value.chars() {
            if !ENCODING.contains(&(ch as u8)) {
                return Err(IdParseError::Character(ch));
            }
        }
        // The first character carries bits 126..130 of a 128-bit value;
        // anything above '7' would not round-trip through 48+80 bits.
        if value.as_bytes()[0] > b'7' {
            return Err(IdParseError::Overflow);
        }
        Ok(Self(value.to_string()))
    }

    /// Wrap a value read back from the store.
    ///
    /// The store only ever contains ids written through [`JobId::generate`]
    /// or [`JobId::parse`], so no re-validation is performed.
    pub fn from_store(value: String) -> Self {
        Self(value)
    }

    /// Millisecond timestamp encoded in the identifier prefix.
    pub fn timestamp_ms(&self) -> u64 {
        let mut millis: u64 = 0;
        for &byte in &self.0.as_bytes()[..10] {
            millis = (millis << 5) | u64::from(decode_char(byte));
        }
        millis
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

static GENERATOR: Mutex<Generator> = Mutex::new(Generator {
    last_millis: 0,
    last_suffix: 0,
});

/// Monotonic id state: last issued (timestamp, suffix) pair.
struct Generator {
    last_millis: u64,
    last_suffix: u128,
}

impl Generator {
    fn next(&mut self, now_millis: u64) -> (u64, u128) {
        if now_millis > self.last_millis {
            self.last_millis = now_millis;
            self.last_suffix = rand::thread_rng().gen::<u128>() & SUFFIX_MASK;
        } else {
            // Same millisecond, or the clock stepped backwards: keep the
            // previous timestamp and bump the suffix to stay monotonic.
            self.last_suffix = (self.last_suffix + 1) & SUFFIX_MASK;
            if self.last_suffix == 0 {
                self.last_millis += 1;
            }
        }
        (self.last_millis, self.last_suffix)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn encode(millis: u64, suffix: u128) -> String {
    let value = (u128::from(millis) << SUFFIX_BITS) | (suffix & SUFFIX_MASK);
    let mut buf = [0u8; JOB_ID_LEN];
    let mut rest = value;
    for slot in buf.iter_mut().rev() {
        *slot = ENCODING[(rest & 0x1f) as usize];
        rest >>= 5;
    }
    buf.iter().map(|&b| b as char).collect()
}

fn decode_char(byte: u8) -> u8 {
    match byte {
        b'0'..=b'9' => byte - b'0',
        b'A'..=b'H' => byte - b'A' + 10,
        b'J'..=b'K' => byte - b'J' + 18,
        b'M'..=b'N' => byte - b'M' + 20,
        b'P'..=b'T' => byte - b'P' + 22,
        b'V'..=b'Z' => byte - b'V' + 27,
        _ => 0,
    }
}
