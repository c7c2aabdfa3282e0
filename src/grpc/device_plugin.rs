// DevicePlugin service implementation

use crate::network::LinkOps;
use crate::plugin::allocator::Allocator;
use crate::plugin::devices::DeviceAdvertiser;
use crate::plugin::{PluginConfig, PluginError};
use crate::v1beta1::device_plugin_server::DevicePlugin;
use crate::v1beta1::{
    AllocateRequest, AllocateResponse, DevicePluginOptions, Empty, ListAndWatchResponse,
    PreStartContainerRequest, PreStartContainerResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct DevicePluginService {
    bridge: String,
    pool_size: usize,
    poll_interval: Duration,
    links: Arc<dyn LinkOps>,
    allocator: Arc<Allocator>,
}

impl DevicePluginService {
    pub fn new(config: &PluginConfig, allocator: Allocator, links: Arc<dyn LinkOps>) -> Self {
        Self {
            bridge: config.bridge.clone(),
            pool_size: config.pool_size,
            poll_interval: config.poll_interval,
            links,
            allocator: Arc::new(allocator),
        }
    }
}

impl From<PluginError> for Status {
    fn from(e: PluginError) -> Self {
        match e {
            PluginError::Status(status) => status,
            closed @ PluginError::QueueClosed(_) => Status::unavailable(closed.to_string()),
            other => Status::internal(other.to_string()),
        }
    }
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<DevicePluginOptions>, Status> {
        Ok(Response::new(DevicePluginOptions::default()))
    }

    type ListAndWatchStream =
        tokio_stream::wrappers::ReceiverStream<Result<ListAndWatchResponse, Status>>;

    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListAndWatchStream>, Status> {
        tracing::debug!("ListAndWatch opened for bridge {}", self.bridge);

        let (tx, rx) = mpsc::channel(4);
        let advertiser = DeviceAdvertiser::new(
            self.bridge.clone(),
            self.pool_size,
            self.poll_interval,
            self.links.clone(),
        );
        tokio::spawn(advertiser.run(tx));

        Ok(Response::new(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        let request = request.into_inner();
        tracing::debug!(
            "Allocate for bridge {}: {} container request(s)",
            self.bridge,
            request.container_requests.len()
        );

        let response = self.allocator.allocate(request).await?;
        Ok(Response::new(response))
    }

    async fn pre_start_container(
        &self,
        _request: Request<PreStartContainerRequest>,
    ) -> Result<Response<PreStartContainerResponse>, Status> {
        Ok(Response::new(PreStartContainerResponse {}))
    }
}
