use crate::entity::{ProtoEntity, ReplicationSpec, TableEntrySpec, ToEntity};
use crate::error::{DeviceError, RpcStatus, ValidationError};
use crate::p4rt::pipeconf::Pipeconf;
use crate::p4rt::pure::{
    arbitration_result, new_master_update_request, new_read_request,
    new_set_forwarding_pipeline_config_request, new_write_request, table_wildcard_entity,
};
use crate::p4rt::transport::{with_timeout, Connector, P4RuntimeTransport, ResponseStream};
use crate::proto::p4runtime::{entity, StreamMessageRequest, StreamMessageResponse};
use crate::representation::{ElectionId, SwitchIdentity};
use crate::util::queue::EventQueue;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

/// Lifecycle of a [SwitchSession]. States only move forward; a failed step
/// leaves the session where it was.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Arbitrated,
    Configured,
    Streaming,
    Closed,
}

#[derive(Copy, Clone, Debug)]
pub struct SessionOptions {
    pub election_id: ElectionId,
    /// Bound on every unary RPC and on the wait for the arbitration reply.
    pub rpc_timeout: Duration,
    pub event_queue_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            election_id: ElectionId::default(),
            rpc_timeout: Duration::from_secs(5),
            event_queue_capacity: 1024,
        }
    }
}

/// Result of a successful write.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WriteOutcome {
    Installed,
    /// The switch already held exactly this entry.
    AlreadyPresent,
}

pub struct SwitchSession {
    identity: SwitchIdentity,
    options: SessionOptions,
    state: SessionState,
    transport: Option<Box<dyn P4RuntimeTransport>>,
    sender: Option<mpsc::Sender<StreamMessageRequest>>,
    inbound: Option<ResponseStream<StreamMessageResponse>>,
    events: Option<Arc<EventQueue<StreamMessageResponse>>>,
    /// Yields the reason the stream channel ended, `None` when the session closed it.
    pump: Option<JoinHandle<Option<DeviceError>>>,
    pipeconf: Option<Arc<Pipeconf>>,
    dump: Option<Mutex<File>>,
}

impl SwitchSession {
    pub fn new(identity: SwitchIdentity, options: SessionOptions) -> SwitchSession {
        let dump = identity
            .proto_dump_file
            .as_ref()
            .and_then(|path| match open_dump_file(path) {
                Ok(file) => Some(Mutex::new(file)),
                Err(e) => {
                    warn!(
                        "Device {} cannot open request dump {}: {}",
                        identity.name,
                        path.display(),
                        e
                    );
                    None
                }
            });
        SwitchSession {
            identity,
            options,
            state: SessionState::Disconnected,
            transport: None,
            sender: None,
            inbound: None,
            events: None,
            pump: None,
            pipeconf: None,
            dump,
        }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pipeconf(&self) -> Option<&Arc<Pipeconf>> {
        self.pipeconf.as_ref()
    }

    pub async fn connect(&mut self, connector: &dyn Connector) -> Result<(), DeviceError> {
        self.expect_state("connect", &[SessionState::Disconnected])?;
        let transport = tokio::time::timeout(self.options.rpc_timeout, connector.connect(&self.identity))
            .await
            .map_err(|_| DeviceError::Connection {
                device: self.identity.name.clone(),
                address: self.identity.address.clone(),
                reason: format!("timed out after {:?}", self.options.rpc_timeout),
            })??;
        self.transport = Some(transport);
        self.state = SessionState::Connected;
        info!("connected to {}", self.identity);
        Ok(())
    }

    /// Opens the stream channel, claims mastership and waits for the verdict.
    pub async fn establish_mastership(&mut self) -> Result<(), DeviceError> {
        self.expect_state("arbitrate", &[SessionState::Connected])?;
        let request = new_master_update_request(self.identity.device_id, self.options.election_id);
        self.dump("arbitration", &request);

        let (sender, receiver) = mpsc::channel(4096);
        let device = self.identity.name.clone();
        let transport_error = |operation: &'static str, status: tonic::Status| DeviceError::Transport {
            device: device.clone(),
            operation,
            status: status.into(),
        };
        // Queued before the stream opens, so it is the first message the switch sees.
        sender
            .send(request)
            .await
            .map_err(|_| transport_error("arbitration", tonic::Status::cancelled("stream closed")))?;

        let timeout = self.options.rpc_timeout;
        let transport = self.transport.as_mut().ok_or(DeviceError::InvalidState {
            device: device.clone(),
            operation: "arbitrate",
            state: self.state,
        })?;
        let mut inbound = with_timeout(timeout, transport.stream_channel(ReceiverStream::new(receiver)))
            .await
            .map_err(|status| transport_error("stream channel", status))?;

        let (code, message) = with_timeout(timeout, async {
            while let Some(response) = inbound.next().await {
                match arbitration_result(&response?) {
                    Some(result) => return Ok(result),
                    None => debug!("Device {} message before arbitration ignored", device),
                }
            }
            Err(tonic::Status::unavailable("stream closed before arbitration"))
        })
        .await
        .map_err(|status| transport_error("arbitration", status))?;

        if code != 0 {
            warn!("Device {} mastership refused, code {}: {}", device, code, message);
            return Err(DeviceError::Arbitration {
                device,
                code,
                message,
            });
        }
        debug!("Device {} master arbitration done", device);
        self.sender = Some(sender);
        self.inbound = Some(inbound);
        self.state = SessionState::Arbitrated;
        Ok(())
    }

    pub async fn install_pipeline(&mut self, pipeconf: Arc<Pipeconf>) -> Result<(), DeviceError> {
        self.expect_state("install pipeline", &[SessionState::Arbitrated])?;
        let request = new_set_forwarding_pipeline_config_request(
            &pipeconf,
            self.identity.device_id,
            self.options.election_id,
        );
        self.dump("set forwarding pipeline config", &request);
        let timeout = self.options.rpc_timeout;
        let transport = self.transport_mut("install pipeline")?;
        with_timeout(timeout, transport.set_forwarding_pipeline_config(request))
            .await
            .map_err(|status| DeviceError::PipelineInstall {
                device: self.identity.name.clone(),
                status: status.into(),
            })?;
        info!("Device {} running pipeconf {}", self.identity.name, pipeconf.name());
        self.pipeconf = Some(pipeconf);
        self.state = SessionState::Configured;
        Ok(())
    }

    pub async fn write_table_entry(
        &mut self,
        entry: &TableEntrySpec,
    ) -> Result<WriteOutcome, DeviceError> {
        self.write(entry).await
    }

    pub async fn write_replication_entry(
        &mut self,
        entry: &ReplicationSpec,
    ) -> Result<WriteOutcome, DeviceError> {
        self.write(entry).await
    }

    /// Writes one entity. A duplicate insert is read back and accepted when
    /// the switch already holds an identical entity.
    pub async fn write<E: ToEntity>(&mut self, target: &E) -> Result<WriteOutcome, DeviceError> {
        self.expect_state("write", &[SessionState::Configured, SessionState::Streaming])?;
        let request = new_write_request(
            self.identity.device_id,
            self.options.election_id,
            target.to_proto_entity(),
            target.update_type(),
        );
        self.dump("write", &request);
        let timeout = self.options.rpc_timeout;
        let transport = self.transport_mut("write")?;
        let status = match with_timeout(timeout, transport.write(request)).await {
            Ok(()) => return Ok(WriteOutcome::Installed),
            Err(status) => status,
        };
        if status.code() != tonic::Code::AlreadyExists {
            return Err(DeviceError::Transport {
                device: self.identity.name.clone(),
                operation: "write",
                status: status.into(),
            });
        }

        let existing = self.read_entities(target.key_entity()).await?;
        let schema = match &self.pipeconf {
            Some(pipeconf) => pipeconf.schema(),
            None => return Err(self.invalid_state("write")),
        };
        if existing.iter().any(|found| target.is_same_as(schema, found)) {
            debug!(
                "Device {} already holds {}",
                self.identity.name,
                target.describe_key(schema)
            );
            Ok(WriteOutcome::AlreadyPresent)
        } else {
            Err(DeviceError::EntryConflict {
                device: self.identity.name.clone(),
                entry: target.describe_key(schema),
            })
        }
    }

    /// Lazily reads the entries of `table`, or of every table.
    pub async fn read_table_entries(
        &mut self,
        table: Option<&str>,
    ) -> Result<BoxStream<'static, Result<TableEntrySpec, DeviceError>>, DeviceError> {
        self.expect_state("read", &[SessionState::Configured, SessionState::Streaming])?;
        let pipeconf = match &self.pipeconf {
            Some(pipeconf) => pipeconf.clone(),
            None => return Err(self.invalid_state("read")),
        };
        let table_id = match table {
            Some(name) => pipeconf
                .schema()
                .table(name)
                .map(|t| t.id)
                .ok_or_else(|| DeviceError::Validation {
                    device: self.identity.name.clone(),
                    error: ValidationError::UnknownTable(name.to_owned()),
                })?,
            None => 0,
        };
        let request = new_read_request(self.identity.device_id, vec![table_wildcard_entity(table_id)]);
        self.dump("read", &request);
        let timeout = self.options.rpc_timeout;
        let device = self.identity.name.clone();
        let transport = self.transport_mut("read")?;
        let responses = with_timeout(timeout, transport.read(request))
            .await
            .map_err(|status| DeviceError::Transport {
                device: device.clone(),
                operation: "read",
                status: status.into(),
            })?;

        let entries = responses.flat_map(move |response| {
            let items: Vec<Result<TableEntrySpec, DeviceError>> = match response {
                Ok(response) => response
                    .entities
                    .iter()
                    .filter_map(|e| match &e.entity {
                        Some(entity::Entity::TableEntry(entry)) => Some(
                            TableEntrySpec::from_proto(pipeconf.schema(), entry).map_err(|error| {
                                DeviceError::Validation {
                                    device: device.clone(),
                                    error,
                                }
                            }),
                        ),
                        _ => None,
                    })
                    .collect(),
                Err(status) => vec![Err(DeviceError::Transport {
                    device: device.clone(),
                    operation: "read",
                    status: status.into(),
                })],
            };
            futures::stream::iter(items)
        });
        Ok(entries.boxed())
    }

    async fn read_entities(&mut self, key: ProtoEntity) -> Result<Vec<ProtoEntity>, DeviceError> {
        let request = new_read_request(self.identity.device_id, vec![key]);
        self.dump("read", &request);
        let timeout = self.options.rpc_timeout;
        let transport = self.transport_mut("read")?;
        let collected = with_timeout(timeout, async {
            let mut responses = transport.read(request).await?;
            let mut entities = Vec::new();
            while let Some(response) = responses.next().await {
                entities.extend(response?.entities);
            }
            Ok(entities)
        })
        .await;
        collected.map_err(|status: tonic::Status| DeviceError::Transport {
            device: self.identity.name.clone(),
            operation: "read",
            status: RpcStatus::from(status),
        })
    }

    /// Starts moving inbound stream messages into a bounded queue and hands
    /// the queue out. Messages past capacity displace the oldest ones.
    pub fn start_streaming(&mut self) -> Result<Arc<EventQueue<StreamMessageResponse>>, DeviceError> {
        self.expect_state("start streaming", &[SessionState::Configured])?;
        let mut inbound = match self.inbound.take() {
            Some(inbound) => inbound,
            None => return Err(self.invalid_state("start streaming")),
        };
        let queue = EventQueue::new(self.options.event_queue_capacity);
        let sink = queue.clone();
        let device = self.identity.name.clone();
        let pump = tokio::spawn(async move {
            let mut status = None;
            while let Some(message) = inbound.next().await {
                match message {
                    Ok(message) => {
                        if !sink.push(message) {
                            return None;
                        }
                    }
                    Err(e) => {
                        status = Some(RpcStatus::from(e));
                        break;
                    }
                }
            }
            let lost = DeviceError::StreamLost { device, status };
            warn!("{}", lost);
            sink.close();
            Some(lost)
        });
        self.pump = Some(pump);
        self.events = Some(queue.clone());
        self.state = SessionState::Streaming;
        Ok(queue)
    }

    pub fn events(&self) -> Option<&Arc<EventQueue<StreamMessageResponse>>> {
        self.events.as_ref()
    }

    /// Why the stream channel ended while the session was still open.
    ///
    /// Only meaningful once the event queue has closed without [SwitchSession::close]
    /// being called; otherwise this waits for the stream to end.
    pub async fn stream_failure(&mut self) -> Option<DeviceError> {
        let pump = self.pump.take()?;
        match pump.await {
            Ok(lost) => lost,
            Err(e) => Some(DeviceError::StreamLost {
                device: self.identity.name.clone(),
                status: Some(RpcStatus {
                    code: tonic::Code::Internal,
                    message: e.to_string(),
                }),
            }),
        }
    }

    /// Messages displaced from a full event queue so far.
    pub fn dropped_events(&self) -> u64 {
        self.events.as_ref().map(|q| q.dropped()).unwrap_or(0)
    }

    /// Releases the stream channel and the connection. Safe to call in any state, any number of times.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(events) = &self.events {
            events.close();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.sender = None;
        self.inbound = None;
        self.transport = None;
        debug!("Device {} closed from {:?}", self.identity.name, self.state);
        self.state = SessionState::Closed;
    }

    fn expect_state(&self, operation: &'static str, allowed: &[SessionState]) -> Result<(), DeviceError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> DeviceError {
        DeviceError::InvalidState {
            device: self.identity.name.clone(),
            operation,
            state: self.state,
        }
    }

    fn transport_mut(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut Box<dyn P4RuntimeTransport>, DeviceError> {
        let state = self.state;
        let device = &self.identity.name;
        self.transport.as_mut().ok_or_else(|| DeviceError::InvalidState {
            device: device.clone(),
            operation,
            state,
        })
    }

    fn dump<T: Debug>(&self, operation: &str, request: &T) {
        if let Some(file) = &self.dump {
            let mut file = file.lock();
            if let Err(e) = writeln!(file, "[{}] {:?}", operation, request) {
                warn!("Device {} request dump failed: {}", self.identity.name, e);
            }
        }
    }
}

impl Drop for SwitchSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_dump_file(path: &std::path::Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}
