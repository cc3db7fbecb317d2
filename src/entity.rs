use crate::p4rt::schema::SchemaIndex;
use crate::proto::p4runtime::{entity, Entity};

pub mod clone_session;
pub mod table_entry;

pub use clone_session::{ReplicaSpec, ReplicationSpec};
pub use table_entry::{
    ActionSpec, FieldMatchSpec, MatchValue, ParamSpec, TableEntryBuilder, TableEntrySpec,
};

pub type ProtoEntity = Entity;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UpdateType {
    Insert,
    Modify,
    Delete,
}

impl From<UpdateType> for crate::proto::p4runtime::update::Type {
    fn from(t: UpdateType) -> Self {
        match t {
            UpdateType::Insert => crate::proto::p4runtime::update::Type::Insert,
            UpdateType::Modify => crate::proto::p4runtime::update::Type::Modify,
            UpdateType::Delete => crate::proto::p4runtime::update::Type::Delete,
        }
    }
}

/// Something that can be written to a switch.
pub trait ToEntity {
    fn to_proto_entity(&self) -> ProtoEntity;

    /// INSERT unless the entity can only be modified in place.
    fn update_type(&self) -> UpdateType {
        UpdateType::Insert
    }

    /// The same entity stripped to its key, as used in a read request.
    fn key_entity(&self) -> ProtoEntity;

    /// Whether `found`, read back from a switch, is this entity exactly.
    fn is_same_as(&self, schema: &SchemaIndex, found: &ProtoEntity) -> bool;

    fn describe_key(&self, schema: &SchemaIndex) -> String;
}

pub(crate) fn wrap(e: entity::Entity) -> ProtoEntity {
    Entity { entity: Some(e) }
}
