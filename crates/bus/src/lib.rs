//! Pub/sub bus publishing.
//!
//! [`BusPublisher`] owns the single process-wide link to the bus and drives
//! it through the [`BusState`] machine: the link is opened lazily, the
//! credential is re-issued on every transition into `Ready`, and a dropped
//! link is re-established in the background. Callers only ever see
//! [`TaskPublisher::publish`].

pub mod error;
pub mod publisher;
pub mod redis_transport;
pub mod state;
pub mod transport;

pub use {
    error::{BusError, LinkError, Result},
    publisher::{BusPublisher, PublishReceipt, PublisherOptions, TaskPublisher},
    redis_transport::RedisTransport,
    state::{BusEvent, BusState, LinkEvent},
    transport::{BusEndpoint, BusLink, BusTransport},
};
