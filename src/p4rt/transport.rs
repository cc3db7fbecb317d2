use crate::error::DeviceError;
use crate::proto::p4runtime::{
    p4_runtime_client::P4RuntimeClient, ReadRequest, ReadResponse, SetForwardingPipelineConfigRequest,
    StreamMessageRequest, StreamMessageResponse, WriteRequest,
};
use crate::representation::SwitchIdentity;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::{Channel, Endpoint};

pub type ResponseStream<T> = BoxStream<'static, Result<T, tonic::Status>>;

/// The part of the P4Runtime service a session uses.
#[async_trait]
pub trait P4RuntimeTransport: Send + 'static {
    /// Opens the bidirectional stream; `outbound` is consumed as the request side.
    async fn stream_channel(
        &mut self,
        outbound: ReceiverStream<StreamMessageRequest>,
    ) -> Result<ResponseStream<StreamMessageResponse>, tonic::Status>;

    async fn set_forwarding_pipeline_config(
        &mut self,
        request: SetForwardingPipelineConfigRequest,
    ) -> Result<(), tonic::Status>;

    async fn write(&mut self, request: WriteRequest) -> Result<(), tonic::Status>;

    async fn read(&mut self, request: ReadRequest)
        -> Result<ResponseStream<ReadResponse>, tonic::Status>;
}

/// Opens a transport to a switch.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(
        &self,
        identity: &SwitchIdentity,
    ) -> Result<Box<dyn P4RuntimeTransport>, DeviceError>;
}

/// Bounds an RPC by `timeout`; expiry surfaces as `DEADLINE_EXCEEDED`.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, tonic::Status>
where
    F: Future<Output = Result<T, tonic::Status>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(tonic::Status::deadline_exceeded(format!(
            "no response within {:?}",
            timeout
        ))),
    }
}

pub struct GrpcTransport {
    client: P4RuntimeClient<Channel>,
}

impl GrpcTransport {
    pub fn new(channel: Channel) -> Self {
        GrpcTransport {
            client: P4RuntimeClient::new(channel),
        }
    }
}

#[async_trait]
impl P4RuntimeTransport for GrpcTransport {
    async fn stream_channel(
        &mut self,
        outbound: ReceiverStream<StreamMessageRequest>,
    ) -> Result<ResponseStream<StreamMessageResponse>, tonic::Status> {
        let inbound = self.client.stream_channel(outbound).await?.into_inner();
        Ok(inbound.boxed())
    }

    async fn set_forwarding_pipeline_config(
        &mut self,
        request: SetForwardingPipelineConfigRequest,
    ) -> Result<(), tonic::Status> {
        self.client
            .set_forwarding_pipeline_config(tonic::Request::new(request))
            .await?;
        Ok(())
    }

    async fn write(&mut self, request: WriteRequest) -> Result<(), tonic::Status> {
        self.client.write(tonic::Request::new(request)).await?;
        Ok(())
    }

    async fn read(
        &mut self,
        request: ReadRequest,
    ) -> Result<ResponseStream<ReadResponse>, tonic::Status> {
        let responses = self
            .client
            .read(tonic::Request::new(request))
            .await?
            .into_inner();
        Ok(responses.boxed())
    }
}

/// Plain-text HTTP/2 connections, as bmv2's `simple_switch_grpc` serves them.
pub struct GrpcConnector {
    pub connect_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        GrpcConnector { connect_timeout }
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(
        &self,
        identity: &SwitchIdentity,
    ) -> Result<Box<dyn P4RuntimeTransport>, DeviceError> {
        let connection_error = |reason: String| DeviceError::Connection {
            device: identity.name.clone(),
            address: identity.address.clone(),
            reason,
        };
        let endpoint = Endpoint::from_shared(format!("http://{}", identity.address))
            .map_err(|e| connection_error(e.to_string()))?;
        debug!("connecting to {}", identity);
        let channel = tokio::time::timeout(self.connect_timeout, endpoint.connect())
            .await
            .map_err(|_| connection_error(format!("timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| connection_error(e.to_string()))?;
        Ok(Box::new(GrpcTransport::new(channel)))
    }
}
