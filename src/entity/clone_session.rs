use super::{wrap, ProtoEntity, ToEntity};
use crate::p4rt::schema::SchemaIndex;
use crate::proto::p4runtime::{
    entity, packet_replication_engine_entry, CloneSessionEntry, PacketReplicationEngineEntry,
    Replica,
};
use smallvec::SmallVec;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct ReplicaSpec {
    pub egress_port: u32,
    pub instance: u32,
}

/// A clone (mirror) session of the packet replication engine.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ReplicationSpec {
    pub session_id: u32,
    pub replicas: SmallVec<[ReplicaSpec; 2]>,
    pub class_of_service: u32,
}

impl ReplicationSpec {
    pub fn to_proto(&self) -> CloneSessionEntry {
        CloneSessionEntry {
            session_id: self.session_id,
            replicas: self
                .replicas
                .iter()
                .map(|r| Replica {
                    egress_port: r.egress_port,
                    instance: r.instance,
                    ..Default::default()
                })
                .collect(),
            class_of_service: self.class_of_service,
            ..Default::default()
        }
    }

    pub fn from_proto(entry: &CloneSessionEntry) -> Self {
        ReplicationSpec {
            session_id: entry.session_id,
            replicas: entry
                .replicas
                .iter()
                .map(|r| ReplicaSpec {
                    egress_port: r.egress_port,
                    instance: r.instance,
                })
                .collect(),
            class_of_service: entry.class_of_service,
        }
    }

    pub fn describe(&self) -> String {
        let replicas: Vec<String> = self
            .replicas
            .iter()
            .map(|r| format!("{}#{}", r.egress_port, r.instance))
            .collect();
        format!(
            "clone session {} -> [{}] cos {}",
            self.session_id,
            replicas.join(", "),
            self.class_of_service
        )
    }
}

impl ToEntity for ReplicationSpec {
    fn to_proto_entity(&self) -> ProtoEntity {
        wrap(entity::Entity::PacketReplicationEngineEntry(
            PacketReplicationEngineEntry {
                r#type: Some(packet_replication_engine_entry::Type::CloneSessionEntry(
                    self.to_proto(),
                )),
            },
        ))
    }

    fn key_entity(&self) -> ProtoEntity {
        wrap(entity::Entity::PacketReplicationEngineEntry(
            PacketReplicationEngineEntry {
                r#type: Some(packet_replication_engine_entry::Type::CloneSessionEntry(
                    CloneSessionEntry {
                        session_id: self.session_id,
                        ..Default::default()
                    },
                )),
            },
        ))
    }

    fn is_same_as(&self, _schema: &SchemaIndex, found: &ProtoEntity) -> bool {
        match &found.entity {
            Some(entity::Entity::PacketReplicationEngineEntry(PacketReplicationEngineEntry {
                r#type: Some(packet_replication_engine_entry::Type::CloneSessionEntry(entry)),
            })) => &ReplicationSpec::from_proto(entry) == self,
            _ => false,
        }
    }

    fn describe_key(&self, _schema: &SchemaIndex) -> String {
        format!("clone session {}", self.session_id)
    }
}
