use crate::entity::{ProtoEntity, UpdateType};
use crate::p4rt::pipeconf::Pipeconf;
use crate::proto::p4runtime::{
    entity, set_forwarding_pipeline_config_request, stream_message_request,
    stream_message_response, ForwardingPipelineConfig, MasterArbitrationUpdate, ReadRequest,
    SetForwardingPipelineConfigRequest, StreamMessageRequest, StreamMessageResponse, TableEntry,
    Update, WriteRequest,
};
use crate::representation::ElectionId;

pub fn new_master_update_request(device_id: u64, election_id: ElectionId) -> StreamMessageRequest {
    StreamMessageRequest {
        update: Some(stream_message_request::Update::Arbitration(
            MasterArbitrationUpdate {
                device_id,
                election_id: Some(election_id.into()),
                ..Default::default()
            },
        )),
    }
}

/// `(code, message)` of an arbitration response, code 0 meaning we are master.
pub fn arbitration_result(response: &StreamMessageResponse) -> Option<(i32, String)> {
    match response.update.as_ref()? {
        stream_message_response::Update::Arbitration(update) => Some(
            update
                .status
                .as_ref()
                .map(|s| (s.code, s.message.clone()))
                .unwrap_or((0, String::new())),
        ),
        _ => None,
    }
}

pub fn new_set_forwarding_pipeline_config_request(
    pipeconf: &Pipeconf,
    device_id: u64,
    election_id: ElectionId,
) -> SetForwardingPipelineConfigRequest {
    SetForwardingPipelineConfigRequest {
        device_id,
        election_id: Some(election_id.into()),
        action: set_forwarding_pipeline_config_request::Action::VerifyAndCommit as i32,
        config: Some(ForwardingPipelineConfig {
            p4info: Some(pipeconf.p4info().clone()),
            p4_device_config: pipeconf.device_config().clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn new_write_request(
    device_id: u64,
    election_id: ElectionId,
    entity: ProtoEntity,
    update: UpdateType,
) -> WriteRequest {
    let update_type: crate::proto::p4runtime::update::Type = update.into();
    WriteRequest {
        device_id,
        election_id: Some(election_id.into()),
        updates: vec![Update {
            r#type: update_type as i32,
            entity: Some(entity),
        }],
        ..Default::default()
    }
}

pub fn new_read_request(device_id: u64, entities: Vec<ProtoEntity>) -> ReadRequest {
    ReadRequest {
        device_id,
        entities,
        ..Default::default()
    }
}

/// Reads every entry of `table_id`, or of every table when it is 0.
pub fn table_wildcard_entity(table_id: u32) -> ProtoEntity {
    crate::entity::wrap(entity::Entity::TableEntry(TableEntry {
        table_id,
        ..Default::default()
    }))
}
