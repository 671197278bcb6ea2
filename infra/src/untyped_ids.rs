use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use data_encoding::BASE32HEX_NOPAD;
use err_derive::Error;
use hex_slice::AsHex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::{Entity, Id};

const ENCODED_LEN: usize = 26;

/// 128 bits: creation time in nanoseconds followed by random noise. The
/// derived ordering compares the timestamp first, so sorted ids are sorted
/// by creation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UntypedId {
    stamp: u64,
    random: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdParseError {
    #[error(display = "Invalid prefix")]
    InvalidPrefix,
    #[error(display = "Unparseable Id")]
    Unparseable,
}

#[derive(Debug)]
pub struct IdGen {
    last: Mutex<u64>,
}

impl UntypedId {
    pub fn hashed<H: Hash + ?Sized>(entity: &H) -> Self {
        let mut halves = [0u64; 2];
        for (i, half) in halves.iter_mut().enumerate() {
            let mut h = siphasher::sip::SipHasher24::new_with_keys(0, i as u64);
            entity.hash(&mut h);
            *half = h.finish();
        }
        UntypedId {
            stamp: halves[0],
            random: halves[1],
        }
    }

    pub fn typed<T>(self) -> Id<T> {
        Id::from_untyped(self)
    }

    pub fn timestamp(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.stamp)
    }

    pub fn random(&self) -> u64 {
        self.random
    }

    fn to_bytes(&self) -> [u8; 16] {
        let mut val = [0u8; 16];
        val[..8].copy_from_slice(&self.stamp.to_be_bytes());
        val[8..].copy_from_slice(&self.random.to_be_bytes());
        val
    }

    fn from_bytes(val: &[u8]) -> Result<Self, IdParseError> {
        if val.len() != 16 {
            return Err(IdParseError::Unparseable);
        }
        let mut stamp = [0u8; 8];
        let mut random = [0u8; 8];
        stamp.copy_from_slice(&val[..8]);
        random.copy_from_slice(&val[8..]);
        Ok(UntypedId {
            stamp: u64::from_be_bytes(stamp),
            random: u64::from_be_bytes(random),
        })
    }

    pub(crate) fn parse_body(b32: &str) -> Result<Self, IdParseError> {
        if b32.len() != ENCODED_LEN {
            return Err(IdParseError::Unparseable);
        }
        let val = BASE32HEX_NOPAD
            .decode(b32.as_bytes())
            .map_err(|_| IdParseError::Unparseable)?;
        Self::from_bytes(&val)
    }
}

impl IdGen {
    pub fn new() -> Self {
        IdGen {
            last: Mutex::new(0),
        }
    }

    pub fn untyped(&self) -> UntypedId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let stamp = {
            // A poisoned lock still holds a valid counter.
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            *last = std::cmp::max(now, *last + 1);
            *last
        };
        UntypedId {
            stamp,
            random: rand::random(),
        }
    }

    pub fn generate<T: Entity>(&self) -> Id<T> {
        self.untyped().typed()
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UntypedId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", BASE32HEX_NOPAD.encode(&self.to_bytes()))
    }
}

impl fmt::Debug for UntypedId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("UntypedId")
            .field("val", &format_args!("{:x}", self.to_bytes().as_hex()))
            .finish()
    }
}

impl std::str::FromStr for UntypedId {
    type Err = IdParseError;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        // Accept both the bare body and a prefixed form.
        let body = src.rsplit('-').next().unwrap_or(src);
        Self::parse_body(body)
    }
}

impl Serialize for UntypedId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for UntypedId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
