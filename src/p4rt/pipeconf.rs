use crate::error::{ControllerError, DeviceError};
use crate::p4rt::schema::SchemaIndex;
use crate::proto::p4config::P4Info;
use bytes::Bytes;
use log::info;
use std::fmt::{Debug, Formatter};
use std::path::Path;

/// Everything a switch needs to run the program: the P4Info (through its
/// index) and the compiled device config, read once at startup.
#[derive(Clone)]
pub struct Pipeconf {
    name: String,
    schema: SchemaIndex,
    device_config: Bytes,
}

impl Pipeconf {
    pub fn new(name: &str, schema: SchemaIndex, device_config: Bytes) -> Pipeconf {
        Pipeconf {
            name: name.to_owned(),
            schema,
            device_config,
        }
    }

    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        name: &str,
        p4info_path: P,
        device_config_path: Q,
    ) -> Result<Pipeconf, ControllerError> {
        let schema = SchemaIndex::load(p4info_path.as_ref())?;
        let device_config_path = device_config_path.as_ref();
        let device_config = std::fs::read(device_config_path).map_err(|error| {
            DeviceError::DeviceConfigFile {
                path: device_config_path.display().to_string(),
                error,
            }
        })?;
        info!(
            "pipeconf {}: {} tables, {} actions, device config {} bytes",
            name,
            schema.tables().count(),
            schema.actions().count(),
            device_config.len()
        );
        Ok(Pipeconf::new(name, schema, device_config.into()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &SchemaIndex {
        &self.schema
    }

    pub fn p4info(&self) -> &P4Info {
        self.schema.p4info()
    }

    pub fn device_config(&self) -> &Bytes {
        &self.device_config
    }
}

impl Debug for Pipeconf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeconf")
            .field("name", &self.name)
            .field("device_config", &self.device_config.len())
            .finish()
    }
}
