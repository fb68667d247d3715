//! Redis pub/sub transport.
//!
//! Uses a `redis::aio::MultiplexedConnection` per link. Unlike
//! `ConnectionManager` it does not reconnect on its own, so drops surface as
//! [`LinkError::Lost`] and the publisher's state machine stays in charge.

use {
    async_trait::async_trait,
    redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, aio::MultiplexedConnection},
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

use crate::{
    error::LinkError,
    transport::{BusEndpoint, BusLink, BusTransport},
};

/// Connects to a Redis server over TCP.
#[derive(Debug, Default, Clone)]
pub struct RedisTransport;

#[async_trait]
impl BusTransport for RedisTransport {
    async fn connect(&self, endpoint: &BusEndpoint) -> Result<Box<dyn BusLink>, LinkError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(endpoint.host.clone(), endpoint.port),
            redis: RedisConnectionInfo::default(),
        };
        let client = redis::Client::open(info).map_err(classify)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(classify)?;

        debug!(endpoint = %endpoint, "redis link established");
        Ok(Box::new(RedisLink { conn }))
    }
}

struct RedisLink {
    conn: MultiplexedConnection,
}

#[async_trait]
impl BusLink for RedisLink {
    async fn authenticate(&mut self, credential: &Secret<String>) -> Result<(), LinkError> {
        let (): () = redis::cmd("AUTH")
            .arg(credential.expose_secret())
            .query_async(&mut self.conn)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn publish(&mut self, channel: &str, payload: &str) -> Result<u64, LinkError> {
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut self.conn)
            .await
            .map_err(classify)?;
        Ok(receivers)
    }

    async fn ping(&mut self) -> Result<(), LinkError> {
        let pong: String = redis::cmd("PING")
            .query_async(&mut self.conn)
            .await
            .map_err(classify)?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(LinkError::Rejected(format!("unexpected PING reply {pong:?}")))
        }
    }
}

/// Split redis errors into "the connection is gone" and "the server said no".
fn classify(err: redis::RedisError) -> LinkError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        LinkError::Lost(err.to_string())
    } else {
        LinkError::Rejected(err.to_string())
    }
}
