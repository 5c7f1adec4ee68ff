//! TCP port readiness.

use crate::resource::ContainerHandle;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Waits until a TCP connection from the host to the mapped container port
/// succeeds.
#[derive(Debug, Clone, Copy)]
pub struct PortWait {
    container_port: u16,
}

impl PortWait {
    /// Wait for the given container port.
    pub fn new(container_port: u16) -> Self {
        Self { container_port }
    }

    /// Probe a concrete host/port pair once.
    pub async fn check(host: &str, port: u16) -> bool {
        matches!(
            tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }
}

#[async_trait]
impl crate::wait::WaitStrategy for PortWait {
    async fn ready(&self, container: &ContainerHandle) -> Result<bool> {
        let host = container.host().await?;
        let port = container.mapped_port(self.container_port).await?;
        Ok(Self::check(&host, port).await)
    }

    fn describe(&self) -> String {
        format!("tcp port {} open", self.container_port)
    }
}
