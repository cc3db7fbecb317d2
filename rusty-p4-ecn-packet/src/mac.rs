use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct MAC(pub [u8; 6]);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MacParseError {
    #[error("invalid mac address {0:?}: {1}")]
    Hex(String, hex::FromHexError),
    #[error("invalid mac address {0:?}: expected 6 octets, got {1}")]
    Length(String, usize),
}

impl MAC {
    pub fn broadcast() -> MAC {
        MAC([0xff; 6])
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MAC {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.replace(':', "").replace('-', ""))
            .map_err(|e| MacParseError::Hex(s.to_owned(), e))?;
        if raw.len() != 6 {
            return Err(MacParseError::Length(s.to_owned(), raw.len()));
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&raw);
        Ok(MAC(mac))
    }
}

impl Display for MAC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl Debug for MAC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<[u8; 6]> for MAC {
    fn from(b: [u8; 6]) -> Self {
        MAC(b)
    }
}

impl Serialize for MAC {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MAC {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
