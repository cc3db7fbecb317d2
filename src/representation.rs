use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Static identity of one managed switch.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SwitchIdentity {
    pub name: String,
    /// `host:port` of the P4Runtime server.
    pub address: String,
    /// the device id used in p4runtime
    pub device_id: u64,
    /// every outbound request is appended here when set
    #[serde(default)]
    pub proto_dump_file: Option<PathBuf>,
}

impl SwitchIdentity {
    pub fn new(name: &str, address: &str, device_id: u64) -> SwitchIdentity {
        SwitchIdentity {
            name: name.to_owned(),
            address: address.to_owned(),
            device_id,
            proto_dump_file: None,
        }
    }

    pub fn with_dump_file<P: Into<PathBuf>>(mut self, path: P) -> SwitchIdentity {
        self.proto_dump_file = Some(path.into());
        self
    }
}

impl Display for SwitchIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}#{})", self.name, self.address, self.device_id)
    }
}

/// The p4runtime election id claimed during arbitration.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ElectionId {
    pub high: u64,
    pub low: u64,
}

impl Default for ElectionId {
    fn default() -> Self {
        ElectionId { high: 0, low: 1 }
    }
}

impl From<ElectionId> for crate::proto::p4runtime::Uint128 {
    fn from(id: ElectionId) -> Self {
        crate::proto::p4runtime::Uint128 {
            high: id.high,
            low: id.low,
        }
    }
}
