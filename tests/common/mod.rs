#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use rusty_p4_ecn::config::ControllerConfig;
use rusty_p4_ecn::error::DeviceError;
use rusty_p4_ecn::event::CongestionReport;
use rusty_p4_ecn::p4rt::pipeconf::Pipeconf;
use rusty_p4_ecn::p4rt::schema::SchemaIndex;
use rusty_p4_ecn::p4rt::transport::{Connector, P4RuntimeTransport, ResponseStream};
use rusty_p4_ecn::packet::{Data, Ethernet, Packet, Telemetry, MAC};
use rusty_p4_ecn::proto::p4runtime::{
    entity, packet_replication_engine_entry, stream_message_request, stream_message_response,
    update, Entity, MasterArbitrationUpdate, PacketIn, PacketReplicationEngineEntry, ReadRequest,
    ReadResponse, SetForwardingPipelineConfigRequest, StreamMessageRequest, StreamMessageResponse,
    TableEntry, WriteRequest,
};
use rusty_p4_ecn::proto::rpc;
use rusty_p4_ecn::report::Reporter;
use rusty_p4_ecn::representation::SwitchIdentity;
use rusty_p4_ecn::util::Shutdown;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tonic::Status;

pub const ECN_P4INFO: &str = include_str!("../../config/ecn.p4info.txt");
pub const ECN_TOPOLOGY: &str = include_str!("../../config/ecn.json");

pub fn ecn_schema() -> SchemaIndex {
    SchemaIndex::from_text(ECN_P4INFO).unwrap()
}

pub fn ecn_pipeconf() -> Arc<Pipeconf> {
    Arc::new(Pipeconf::new("ecn", ecn_schema(), Bytes::from_static(b"{\"program\": \"ecn.p4\"}")))
}

/// The bundled three-switch topology with a threshold set.
pub fn ecn_config(threshold: u32) -> ControllerConfig {
    let mut config = ControllerConfig::from_json(ECN_TOPOLOGY).unwrap();
    config.threshold = Some(threshold);
    for switch in config.switches.iter_mut() {
        switch.identity.proto_dump_file = None;
    }
    config
}

#[derive(Default)]
pub struct SwitchState {
    pub device_id: Option<u64>,
    pub master_requests: usize,
    pub pipeline: Option<SetForwardingPipelineConfigRequest>,
    pub write_requests: usize,
    pub table_entries: Vec<TableEntry>,
    pub clone_sessions: Vec<PacketReplicationEngineEntry>,
    stream: Option<UnboundedSender<Result<StreamMessageResponse, Status>>>,
}

/// An in-memory P4Runtime server for one device.
pub struct MockSwitch {
    /// `None` grants mastership, otherwise the refusal code.
    pub deny_mastership: Option<i32>,
    /// Packet-ins delivered once the pipeline is installed.
    pub packet_ins: Vec<StreamMessageResponse>,
    /// End the stream after delivering `packet_ins`.
    pub hang_up: bool,
    /// Fail the stream with this code after delivering `packet_ins`.
    pub stream_error: Option<tonic::Code>,
    /// Never answer writes.
    pub stall_writes: bool,
    pub state: Mutex<SwitchState>,
}

impl Default for MockSwitch {
    fn default() -> Self {
        MockSwitch {
            deny_mastership: None,
            packet_ins: Vec::new(),
            hang_up: false,
            stream_error: None,
            stall_writes: false,
            state: Mutex::new(SwitchState::default()),
        }
    }
}

impl MockSwitch {
    pub fn new() -> Arc<MockSwitch> {
        Arc::new(MockSwitch::default())
    }

    pub fn denying(code: i32) -> Arc<MockSwitch> {
        Arc::new(MockSwitch {
            deny_mastership: Some(code),
            ..Default::default()
        })
    }

    pub fn with_packets(packet_ins: Vec<StreamMessageResponse>) -> Arc<MockSwitch> {
        Arc::new(MockSwitch {
            packet_ins,
            ..Default::default()
        })
    }

    /// Delivers `packet_ins`, then closes the stream channel.
    pub fn hanging_up(packet_ins: Vec<StreamMessageResponse>) -> Arc<MockSwitch> {
        Arc::new(MockSwitch {
            packet_ins,
            hang_up: true,
            ..Default::default()
        })
    }

    pub fn entry_count(&self) -> usize {
        let state = self.state.lock();
        state.table_entries.len() + state.clone_sessions.len()
    }

    pub fn installed(&self) -> bool {
        self.state.lock().pipeline.is_some()
    }

    pub fn write_requests(&self) -> usize {
        self.state.lock().write_requests
    }

    fn apply(&self, update_type: i32, entity: Entity) -> Result<(), Status> {
        let mut state = self.state.lock();
        if state.pipeline.is_none() {
            return Err(Status::failed_precondition("no pipeline"));
        }
        let insert = update_type == update::Type::Insert as i32;
        match entity.entity {
            Some(entity::Entity::TableEntry(entry)) => {
                let key = table_key(&entry);
                match state.table_entries.iter().position(|e| table_key(e) == key) {
                    Some(_) if insert => Err(Status::already_exists("entry exists")),
                    Some(i) => {
                        state.table_entries[i] = entry;
                        Ok(())
                    }
                    None => {
                        state.table_entries.push(entry);
                        Ok(())
                    }
                }
            }
            Some(entity::Entity::PacketReplicationEngineEntry(entry)) => {
                let id = clone_session_id(&entry);
                match state
                    .clone_sessions
                    .iter()
                    .position(|e| clone_session_id(e) == id)
                {
                    Some(_) if insert => Err(Status::already_exists("clone session exists")),
                    Some(i) => {
                        state.clone_sessions[i] = entry;
                        Ok(())
                    }
                    None => {
                        state.clone_sessions.push(entry);
                        Ok(())
                    }
                }
            }
            _ => Err(Status::unimplemented("entity")),
        }
    }

    fn lookup(&self, wanted: &Entity) -> Vec<Entity> {
        let state = self.state.lock();
        match &wanted.entity {
            Some(entity::Entity::TableEntry(wanted)) => state
                .table_entries
                .iter()
                .filter(|e| {
                    if wanted.table_id == 0 {
                        true
                    } else if wanted.r#match.is_empty() && !wanted.is_default_action {
                        e.table_id == wanted.table_id
                    } else {
                        table_key(e) == table_key(wanted)
                    }
                })
                .map(|e| Entity {
                    entity: Some(entity::Entity::TableEntry(e.clone())),
                })
                .collect(),
            Some(entity::Entity::PacketReplicationEngineEntry(wanted)) => state
                .clone_sessions
                .iter()
                .filter(|e| clone_session_id(e) == clone_session_id(wanted))
                .map(|e| Entity {
                    entity: Some(entity::Entity::PacketReplicationEngineEntry(e.clone())),
                })
                .collect(),
            _ => vec![],
        }
    }
}

fn table_key(entry: &TableEntry) -> TableEntry {
    TableEntry {
        action: None,
        ..entry.clone()
    }
}

fn clone_session_id(entry: &PacketReplicationEngineEntry) -> Option<u32> {
    match &entry.r#type {
        Some(packet_replication_engine_entry::Type::CloneSessionEntry(c)) => Some(c.session_id),
        _ => None,
    }
}

pub struct MockTransport {
    switch: Arc<MockSwitch>,
}

#[async_trait]
impl P4RuntimeTransport for MockTransport {
    async fn stream_channel(
        &mut self,
        mut outbound: ReceiverStream<StreamMessageRequest>,
    ) -> Result<ResponseStream<StreamMessageResponse>, Status> {
        let arbitration = match outbound.next().await {
            Some(StreamMessageRequest {
                update: Some(stream_message_request::Update::Arbitration(a)),
            }) => a,
            _ => return Err(Status::invalid_argument("expected an arbitration update first")),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let status = self.switch.deny_mastership.map(|code| rpc::Status {
            code,
            message: "a controller with a higher election id is master".to_owned(),
            ..Default::default()
        });
        let _ = tx.send(Ok(StreamMessageResponse {
            update: Some(stream_message_response::Update::Arbitration(
                MasterArbitrationUpdate {
                    device_id: arbitration.device_id,
                    election_id: arbitration.election_id,
                    status,
                    ..Default::default()
                },
            )),
        }));
        let mut state = self.switch.state.lock();
        state.device_id = Some(arbitration.device_id);
        state.master_requests += 1;
        state.stream = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn set_forwarding_pipeline_config(
        &mut self,
        request: SetForwardingPipelineConfigRequest,
    ) -> Result<(), Status> {
        if self.switch.deny_mastership.is_some() {
            return Err(Status::permission_denied("not master"));
        }
        let mut state = self.switch.state.lock();
        state.pipeline = Some(request);
        if let Some(stream) = &state.stream {
            for packet in &self.switch.packet_ins {
                let _ = stream.send(Ok(packet.clone()));
            }
            if let Some(code) = self.switch.stream_error {
                let _ = stream.send(Err(Status::new(code, "stream reset")));
            }
        }
        if self.switch.hang_up || self.switch.stream_error.is_some() {
            state.stream = None;
        }
        Ok(())
    }

    async fn write(&mut self, request: WriteRequest) -> Result<(), Status> {
        if self.switch.stall_writes {
            futures::future::pending::<()>().await;
        }
        self.switch.state.lock().write_requests += 1;
        for u in request.updates {
            let entity = u.entity.ok_or_else(|| Status::invalid_argument("no entity"))?;
            self.switch.apply(u.r#type, entity)?;
        }
        Ok(())
    }

    async fn read(&mut self, request: ReadRequest) -> Result<ResponseStream<ReadResponse>, Status> {
        let entities: Vec<Entity> = request
            .entities
            .iter()
            .flat_map(|e| self.switch.lookup(e))
            .collect();
        let response = ReadResponse { entities };
        Ok(futures::stream::iter(vec![Ok(response)]).boxed())
    }
}

/// Hands out transports to the mock switches, keyed by switch name.
#[derive(Default)]
pub struct MockConnector {
    pub switches: HashMap<String, Arc<MockSwitch>>,
}

impl MockConnector {
    pub fn new(switches: Vec<(&str, Arc<MockSwitch>)>) -> MockConnector {
        MockConnector {
            switches: switches
                .into_iter()
                .map(|(name, switch)| (name.to_owned(), switch))
                .collect(),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        identity: &SwitchIdentity,
    ) -> Result<Box<dyn P4RuntimeTransport>, DeviceError> {
        match self.switches.get(&identity.name) {
            Some(switch) => Ok(Box::new(MockTransport {
                switch: switch.clone(),
            })),
            None => Err(DeviceError::Connection {
                device: identity.name.clone(),
                address: identity.address.clone(),
                reason: "connection refused".to_owned(),
            }),
        }
    }
}

/// Collects reports for inspection after a run.
#[derive(Clone, Default)]
pub struct SharedReporter(pub Arc<Mutex<Vec<CongestionReport>>>);

impl Reporter for SharedReporter {
    fn report(&mut self, report: CongestionReport) {
        self.0.lock().push(report);
    }
}

impl SharedReporter {
    pub fn reports(&self) -> Vec<CongestionReport> {
        self.0.lock().clone()
    }
}

/// Triggers `shutdown` once `reporter` holds `count` reports.
pub fn shutdown_after_reports(shutdown: &Shutdown, reporter: &SharedReporter, count: usize) {
    let shutdown = shutdown.clone();
    let reporter = reporter.clone();
    tokio::spawn(async move {
        while reporter.reports().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.trigger();
    });
}

pub fn packet_in(payload: Bytes) -> StreamMessageResponse {
    StreamMessageResponse {
        update: Some(stream_message_response::Update::Packet(PacketIn {
            payload,
            ..Default::default()
        })),
    }
}

pub fn telemetry(src: Ipv4Addr, dst: Ipv4Addr, egress_port: u16, threshold: u32) -> StreamMessageResponse {
    let frame = Ethernet {
        dst: MAC::broadcast(),
        src: MAC([0x08, 0, 0, 0, 0x01, 0x01]),
        ether_type: 0x2333,
        payload: Telemetry {
            src,
            dst,
            egress_port,
            threshold,
            pad: 0,
        },
    };
    packet_in(frame.write_to_bytes())
}

/// An IPv4 frame that happened to reach the CPU port.
pub fn noise(seq: u32) -> StreamMessageResponse {
    let body = seq.to_be_bytes();
    let frame = Ethernet {
        dst: MAC([0x08, 0, 0, 0, 0x02, 0x02]),
        src: MAC([0x08, 0, 0, 0, 0x01, 0x01]),
        ether_type: 0x0800,
        payload: Data(&body),
    };
    packet_in(frame.write_to_bytes())
}
