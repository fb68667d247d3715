use {async_trait::async_trait, secrecy::Secret};

use crate::error::LinkError;

/// Where the bus lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEndpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for BusEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Opens links to a bus.
#[async_trait]
pub trait BusTransport: Send + Sync {
    async fn connect(&self, endpoint: &BusEndpoint) -> Result<Box<dyn BusLink>, LinkError>;
}

/// One established connection to the bus.
///
/// Only the publisher holds a link, and it serializes every call, so
/// implementations never see concurrent use.
#[async_trait]
pub trait BusLink: Send {
    async fn authenticate(&mut self, credential: &Secret<String>) -> Result<(), LinkError>;

    /// Publish `payload` on `channel`, returning how many subscribers
    /// received it.
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<u64, LinkError>;

    /// Liveness probe.
    async fn ping(&mut self) -> Result<(), LinkError>;
}
