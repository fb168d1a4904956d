//! gRPC control connection to the bpfman agent

use super::delegated::{AgentClient, AgentConnector};
use crate::closer::Closer;
use crate::config::AgentEndpoint;
use crate::{Result, SslcountError};
use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use sslcount_proto::{BpfmanClient, LoadRequest, LoadResponse, UnloadRequest};
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::{debug, info};

/// Placeholder authority for unix socket channels; the connector ignores it.
const UNIX_SOCKET_AUTHORITY: &str = "http://[::]:50051";

#[async_trait]
impl AgentClient for BpfmanClient<Channel> {
    async fn load(&self, request: LoadRequest) -> std::result::Result<LoadResponse, tonic::Status> {
        let mut client = self.clone();
        Ok(BpfmanClient::load(&mut client, request).await?.into_inner())
    }

    async fn unload(&self, id: u32) -> std::result::Result<(), tonic::Status> {
        let mut client = self.clone();
        BpfmanClient::unload(&mut client, UnloadRequest { id }).await?;
        Ok(())
    }
}

pub struct GrpcConnector {
    endpoint: AgentEndpoint,
}

impl GrpcConnector {
    pub fn new(endpoint: AgentEndpoint) -> Self {
        Self { endpoint }
    }

    async fn channel(&self) -> std::result::Result<Channel, String> {
        let connected = match &self.endpoint {
            AgentEndpoint::Unix(path) => {
                let path = path.clone();
                Endpoint::from_static(UNIX_SOCKET_AUTHORITY)
                    .connect_with_connector(service_fn(move |_: Uri| {
                        let path = path.clone();
                        async move {
                            let stream = UnixStream::connect(path).await?;
                            Ok::<_, std::io::Error>(TokioIo::new(stream))
                        }
                    }))
                    .await
            }
            AgentEndpoint::Http(uri) => {
                Endpoint::from_shared(uri.clone())
                    .map_err(|e| e.to_string())?
                    .connect()
                    .await
            }
        };
        connected.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl AgentConnector for GrpcConnector {
    type Client = BpfmanClient<Channel>;

    async fn connect(&self) -> Result<(Self::Client, Box<dyn Closer>)> {
        debug!("Connecting to agent at {}", self.endpoint);
        let channel = self
            .channel()
            .await
            .map_err(|e| SslcountError::AgentConnect {
                endpoint: self.endpoint.to_string(),
                reason: e,
            })?;
        info!("Connected to agent at {}", self.endpoint);

        let client = BpfmanClient::new(channel.clone());
        let connection = ConnectionCloser {
            endpoint: self.endpoint.to_string(),
            channel,
        };
        Ok((client, Box::new(connection)))
    }
}

/// The control connection itself; releasing it drops the channel.
struct ConnectionCloser {
    endpoint: String,
    channel: Channel,
}

#[async_trait]
impl Closer for ConnectionCloser {
    fn describe(&self) -> String {
        format!("agent connection {}", self.endpoint)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        debug!("Closing agent connection {}", self.endpoint);
        drop(self.channel);
        Ok(())
    }
}
