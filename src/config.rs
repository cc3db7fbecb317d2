use crate::error::ConfigError;
use crate::monitor::DEFAULT_TELEMETRY_ETHER_TYPE;
use crate::p4rt::session::SessionOptions;
use crate::representation::{ElectionId, SwitchIdentity};
use crate::rules::ProgramNames;
use rusty_p4_ecn_packet::MAC;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ForwardingIntent {
    pub prefix: Ipv4Addr,
    #[serde(default = "host_prefix_len")]
    pub prefix_len: i32,
    pub mac: MAC,
    pub port: u32,
}

fn host_prefix_len() -> i32 {
    32
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MirrorIntent {
    pub session_id: u32,
    pub port: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SwitchConfig {
    #[serde(flatten)]
    pub identity: SwitchIdentity,
    #[serde(default)]
    pub forwarding: Vec<ForwardingIntent>,
    /// The threshold rule is only installed where this is set.
    #[serde(default)]
    pub congestion_port: Option<u32>,
    #[serde(default)]
    pub mirror: Option<MirrorIntent>,
    #[serde(default)]
    pub switch_id: Option<u32>,
}

/// Everything a run needs, read from a JSON file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub p4info: PathBuf,
    pub device_config: PathBuf,
    /// Prompted for on stdin when absent.
    #[serde(default)]
    pub threshold: Option<u32>,
    #[serde(default)]
    pub election_id: ElectionId,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    #[serde(default = "default_telemetry_ether_type")]
    pub telemetry_ether_type: u16,
    #[serde(default)]
    pub dump_tables: bool,
    #[serde(default)]
    pub program: ProgramNames,
    pub switches: Vec<SwitchConfig>,
}

fn default_rpc_timeout_ms() -> u64 {
    5000
}

fn default_event_queue_capacity() -> usize {
    1024
}

fn default_telemetry_ether_type() -> u16 {
    DEFAULT_TELEMETRY_ETHER_TYPE
}

impl ControllerConfig {
    /// Reads and validates `path`. Relative paths inside the file are taken
    /// relative to the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ControllerConfig, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|error| ConfigError::Io {
            path: path.display().to_string(),
            error,
        })?;
        let mut config: ControllerConfig =
            serde_json::from_slice(&raw).map_err(|error| ConfigError::Parse {
                path: path.display().to_string(),
                error,
            })?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<ControllerConfig, ConfigError> {
        let config: ControllerConfig =
            serde_json::from_str(json).map_err(|error| ConfigError::Parse {
                path: "<inline>".to_owned(),
                error,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(p.as_path());
            }
        };
        resolve(&mut self.p4info);
        resolve(&mut self.device_config);
        for switch in self.switches.iter_mut() {
            if let Some(dump) = switch.identity.proto_dump_file.as_mut() {
                resolve(dump);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.switches.is_empty() {
            return Err(ConfigError::Invalid("no switches configured".to_owned()));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(ConfigError::Invalid("rpc_timeout_ms must be positive".to_owned()));
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_queue_capacity must be positive".to_owned(),
            ));
        }
        let mut names = HashSet::new();
        let mut devices = HashSet::new();
        for switch in &self.switches {
            let id = &switch.identity;
            if id.name.is_empty() {
                return Err(ConfigError::Invalid(format!("switch at {} has no name", id.address)));
            }
            if !names.insert(id.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate switch name {}", id.name)));
            }
            if !devices.insert((id.address.as_str(), id.device_id)) {
                return Err(ConfigError::Invalid(format!(
                    "{} repeats device {} at {}",
                    id.name, id.device_id, id.address
                )));
            }
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            election_id: self.election_id,
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
            event_queue_capacity: self.event_queue_capacity,
        }
    }

    pub fn identities(&self) -> Vec<SwitchIdentity> {
        self.switches.iter().map(|s| s.identity.clone()).collect()
    }
}

/// Parses an operator-supplied threshold.
pub fn parse_threshold(input: &str) -> Result<u32, ConfigError> {
    let trimmed = input.trim();
    trimmed
        .parse()
        .map_err(|_| ConfigError::Threshold(trimmed.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPOLOGY: &str = include_str!("../config/ecn.json");

    #[test]
    fn bundled_topology() {
        let config = ControllerConfig::from_json(TOPOLOGY).unwrap();
        assert_eq!(config.switches.len(), 3);
        assert_eq!(config.threshold, None);
        assert_eq!(config.election_id, ElectionId { high: 0, low: 1 });
        assert_eq!(config.telemetry_ether_type, 0x2333);
        assert_eq!(config.program, ProgramNames::default());

        let s1 = &config.switches[0];
        assert_eq!(s1.identity, SwitchIdentity::new("s1", "127.0.0.1:50051", 0)
            .with_dump_file("logs/s1-p4runtime-requests.txt"));
        assert_eq!(s1.forwarding.len(), 4);
        assert_eq!(
            s1.forwarding[2],
            ForwardingIntent {
                prefix: Ipv4Addr::new(10, 0, 2, 0),
                prefix_len: 24,
                mac: MAC([0x08, 0, 0, 0, 0x02, 0]),
                port: 3,
            }
        );
        assert_eq!(s1.forwarding[0].prefix_len, 32);
        assert_eq!(s1.congestion_port, Some(3));
        assert_eq!(s1.mirror, Some(MirrorIntent { session_id: 100, port: 10 }));
        let s3 = &config.switches[2];
        assert_eq!(s3.congestion_port, None);
        assert_eq!(s3.mirror, None);

        let options = config.session_options();
        assert_eq!(options.rpc_timeout, Duration::from_secs(5));
        assert_eq!(options.event_queue_capacity, 1024);
    }

    #[test]
    fn relative_paths_follow_the_file() {
        let mut config = ControllerConfig::from_json(TOPOLOGY).unwrap();
        config.resolve_paths(Path::new("/etc/ecn"));
        assert_eq!(config.p4info, PathBuf::from("/etc/ecn/build/ecn.p4.p4info.txt"));
        assert_eq!(
            config.switches[1].identity.proto_dump_file,
            Some(PathBuf::from("/etc/ecn/logs/s2-p4runtime-requests.txt"))
        );
    }

    #[test]
    fn rejects_bad_documents() {
        assert!(matches!(
            ControllerConfig::from_json("{"),
            Err(ConfigError::Parse { .. })
        ));
        let empty = r#"{"p4info": "a.txt", "device_config": "a.json", "switches": []}"#;
        assert!(matches!(
            ControllerConfig::from_json(empty),
            Err(ConfigError::Invalid(_))
        ));
        let duplicate = r#"{"p4info": "a.txt", "device_config": "a.json", "switches": [
            {"name": "s1", "address": "127.0.0.1:50051", "device_id": 0},
            {"name": "s1", "address": "127.0.0.1:50052", "device_id": 1}
        ]}"#;
        assert!(matches!(
            ControllerConfig::from_json(duplicate),
            Err(ConfigError::Invalid(_))
        ));
        let bad_mac = r#"{"p4info": "a.txt", "device_config": "a.json", "switches": [
            {"name": "s1", "address": "127.0.0.1:50051", "device_id": 0,
             "forwarding": [{"prefix": "10.0.1.1", "mac": "08:00:00", "port": 1}]}
        ]}"#;
        assert!(matches!(
            ControllerConfig::from_json(bad_mac),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn threshold_input() {
        assert_eq!(parse_threshold(" 30\n").unwrap(), 30);
        assert!(matches!(parse_threshold("lots"), Err(ConfigError::Threshold(t)) if t == "lots"));
        assert!(parse_threshold("-1").is_err());
    }
}
