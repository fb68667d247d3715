use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    secrecy::Secret,
    tokio::sync::{Mutex, watch},
    tracing::{debug, info, warn},
};

use crate::{
    error::{BusError, LinkError, Result},
    state::{BusEvent, BusState, LinkEvent},
    transport::{BusEndpoint, BusLink, BusTransport},
};

/// Maximum reconnect backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Publish-only view of the bus handed to the rest of the relay.
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    /// One best-effort publish. Never retried, never queued.
    async fn publish(&self, channel: &str, payload: &str) -> Result<PublishReceipt>;
}

/// What the bus said about a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Subscribers the bus delivered the message to. Zero is not an error:
    /// the worker may simply not be listening.
    pub receivers: u64,
}

/// Timeouts and background behaviour of a [`BusPublisher`].
#[derive(Debug, Clone)]
pub struct PublisherOptions {
    pub connect_timeout: Duration,
    /// Bound on a whole publish call. `None` disables it.
    pub publish_timeout: Option<Duration>,
    /// Interval between liveness pings while `Ready`. `None` disables them.
    pub keepalive: Option<Duration>,
    /// Re-establish dropped links in the background.
    pub auto_reconnect: bool,
    /// First reconnect delay; doubles per failed attempt up to 30s.
    pub reconnect_delay: Duration,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            publish_timeout: Some(Duration::from_secs(5)),
            keepalive: Some(Duration::from_secs(30)),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

struct LinkSlot {
    state: BusState,
    link: Option<Box<dyn BusLink>>,
}

/// Owner of the single shared bus link.
///
/// Every state transition and every call on the link happens while holding
/// one async mutex, so authenticate-then-publish never interleaves with a
/// reconnect. The current state is mirrored into a `watch` channel so
/// publishes can fail fast without queueing on that mutex.
pub struct BusPublisher {
    me: Weak<Self>,
    transport: Arc<dyn BusTransport>,
    endpoint: BusEndpoint,
    credential: Secret<String>,
    options: PublisherOptions,
    slot: Mutex<LinkSlot>,
    state_tx: watch::Sender<BusState>,
    reconnecting: AtomicBool,
    keepalive_started: AtomicBool,
}

impl BusPublisher {
    pub fn new(
        transport: Arc<dyn BusTransport>,
        endpoint: BusEndpoint,
        credential: Secret<String>,
        options: PublisherOptions,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(BusState::Disconnected);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            transport,
            endpoint,
            credential,
            options,
            slot: Mutex::new(LinkSlot {
                state: BusState::Disconnected,
                link: None,
            }),
            state_tx,
            reconnecting: AtomicBool::new(false),
            keepalive_started: AtomicBool::new(false),
        })
    }

    /// Current link state.
    #[must_use]
    pub fn state(&self) -> BusState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BusState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub fn endpoint(&self) -> &BusEndpoint {
        &self.endpoint
    }

    /// Open the link now instead of on the first publish.
    ///
    /// Succeeds immediately if the link is already `Ready`.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        match slot.state {
            BusState::Ready => Ok(()),
            BusState::Disconnected => self.open(&mut slot).await,
            BusState::Failed => Err(BusError::unavailable("bus authentication was rejected")),
            state => Err(BusError::NotReady { state }),
        }
    }

    /// Feed a lifecycle notification from the transport.
    ///
    /// `Connected`/`Reconnected` re-issue the credential on the current link
    /// (opening a fresh one first if the old one was discarded). `Dropped`
    /// discards the link and, with `auto_reconnect`, starts the background
    /// reconnect loop.
    pub async fn notify(&self, event: LinkEvent) {
        let mut slot = self.slot.lock().await;
        if slot.state == BusState::Failed {
            debug!(?event, "bus link event after terminal failure ignored");
            return;
        }
        match event {
            LinkEvent::Dropped => {
                self.drop_link(&mut slot, "transport reported a drop");
            },
            LinkEvent::Connected | LinkEvent::Reconnected => {
                if slot.link.is_none() {
                    match self.dial().await {
                        Ok(link) => slot.link = Some(link),
                        Err(e) => {
                            warn!(endpoint = %self.endpoint, error = %e, "bus reconnect failed");
                            self.apply(&mut slot, BusEvent::ConnectFailed);
                            return;
                        },
                    }
                }
                if self.apply(&mut slot, event.into()) == BusState::Authenticating {
                    self.authenticate(&mut slot).await;
                }
            },
        }
    }

    async fn publish_once(&self, channel: &str, payload: &str) -> Result<PublishReceipt> {
        // Decide from the mirrored state first: a publish never waits for a
        // link that is still being (re-)established.
        match self.state() {
            BusState::Failed => {
                return Err(BusError::unavailable("bus authentication was rejected"));
            },
            state if state.is_transitional() => return Err(BusError::NotReady { state }),
            _ => {},
        }

        let mut slot = self.slot.lock().await;
        match slot.state {
            BusState::Disconnected => self.open(&mut slot).await?,
            BusState::Ready => {},
            BusState::Failed => {
                return Err(BusError::unavailable("bus authentication was rejected"));
            },
            state => return Err(BusError::NotReady { state }),
        }

        let Some(link) = slot.link.as_mut() else {
            return Err(BusError::unavailable("no bus link"));
        };
        match link.publish(channel, payload).await {
            Ok(receivers) => {
                debug!(channel, receivers, bytes = payload.len(), "published to bus");
                Ok(PublishReceipt { receivers })
            },
            Err(LinkError::Lost(reason)) => {
                self.drop_link(&mut slot, &reason);
                Err(BusError::unavailable(reason))
            },
            Err(LinkError::Rejected(reason)) => Err(BusError::unavailable(reason)),
        }
    }

    /// Disconnected → Connecting → Authenticating → Ready, in one go.
    async fn open(&self, slot: &mut LinkSlot) -> Result<()> {
        self.apply(slot, BusEvent::ConnectRequested);
        match self.dial().await {
            Ok(link) => slot.link = Some(link),
            Err(e) => {
                self.apply(slot, BusEvent::ConnectFailed);
                return Err(e);
            },
        }
        self.apply(slot, BusEvent::Connected);
        self.authenticate(slot).await;

        match slot.state {
            BusState::Ready => Ok(()),
            BusState::Failed => Err(BusError::unavailable("bus authentication was rejected")),
            state => Err(BusError::NotReady { state }),
        }
    }

    async fn dial(&self) -> Result<Box<dyn BusLink>> {
        let after = self.options.connect_timeout;
        match tokio::time::timeout(after, self.transport.connect(&self.endpoint)).await {
            Ok(Ok(link)) => Ok(link),
            Ok(Err(e)) => Err(BusError::unavailable(e)),
            Err(_) => Err(BusError::Timeout { after }),
        }
    }

    /// Issue the credential on the current link. Expects `Authenticating`.
    async fn authenticate(&self, slot: &mut LinkSlot) {
        let Some(link) = slot.link.as_mut() else {
            self.apply(slot, BusEvent::Dropped);
            return;
        };

        let after = self.options.connect_timeout;
        let outcome = match tokio::time::timeout(after, link.authenticate(&self.credential)).await
        {
            Ok(result) => result,
            Err(_) => Err(LinkError::Lost(format!(
                "authentication timed out after {after:?}"
            ))),
        };

        match outcome {
            Ok(()) => {
                self.apply(slot, BusEvent::Authenticated);
                self.start_keepalive();
            },
            Err(LinkError::Rejected(reason)) => {
                warn!(endpoint = %self.endpoint, reason = %reason, "bus rejected credential");
                slot.link = None;
                self.apply(slot, BusEvent::AuthRejected);
            },
            Err(LinkError::Lost(reason)) => {
                self.drop_link(slot, &reason);
            },
        }
    }

    fn drop_link(&self, slot: &mut LinkSlot, reason: &str) {
        slot.link = None;
        let before = slot.state;
        let after = self.apply(slot, BusEvent::Dropped);
        if before != after {
            warn!(endpoint = %self.endpoint, reason, "bus link dropped");
        }
        if after == BusState::Reconnecting {
            self.spawn_reconnect();
        }
    }

    /// Apply `event` to the slot and mirror the result. Returns the state
    /// after the event (unchanged if the event was ignored).
    fn apply(&self, slot: &mut LinkSlot, event: BusEvent) -> BusState {
        match slot.state.next(event) {
            Some(next) => {
                if next != slot.state {
                    info!(from = %slot.state, to = %next, ?event, "bus state changed");
                }
                slot.state = next;
                self.state_tx.send_replace(next);
            },
            None => {
                debug!(state = %slot.state, ?event, "bus event ignored");
            },
        }
        slot.state
    }

    fn spawn_reconnect(&self) {
        if !self.options.auto_reconnect || self.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(me) = self.me.upgrade() else {
            self.reconnecting.store(false, Ordering::Release);
            return;
        };
        tokio::spawn(async move {
            me.reconnect_loop().await;
            me.reconnecting.store(false, Ordering::Release);
        });
    }

    async fn reconnect_loop(&self) {
        let mut backoff = self.options.reconnect_delay;
        loop {
            info!(
                endpoint = %self.endpoint,
                delay_ms = backoff.as_millis(),
                "reconnecting to bus after delay"
            );
            tokio::time::sleep(backoff).await;

            if self.state() != BusState::Reconnecting {
                return;
            }
            // Dial without holding the slot so publishes keep failing fast.
            let link = match self.dial().await {
                Ok(link) => link,
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "bus reconnect failed");
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                },
            };

            let mut slot = self.slot.lock().await;
            if slot.state != BusState::Reconnecting {
                return;
            }
            slot.link = Some(link);
            self.apply(&mut slot, BusEvent::Reconnected);
            self.authenticate(&mut slot).await;
            match slot.state {
                BusState::Ready | BusState::Failed => return,
                _ => backoff = (backoff * 2).min(MAX_BACKOFF),
            }
        }
    }

    fn start_keepalive(&self) {
        let Some(interval) = self.options.keepalive else {
            return;
        };
        if self.keepalive_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let me = self.me.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(publisher) = me.upgrade() else {
                    return;
                };
                if publisher.state() == BusState::Failed {
                    return;
                }
                publisher.probe().await;
            }
        });
    }

    /// Ping the link if it is `Ready`; a lost or wedged link is dropped.
    async fn probe(&self) {
        let mut slot = self.slot.lock().await;
        if slot.state != BusState::Ready {
            return;
        }
        let Some(link) = slot.link.as_mut() else {
            return;
        };
        let after = self.options.connect_timeout;
        match tokio::time::timeout(after, link.ping()).await {
            Ok(Ok(())) => debug!(endpoint = %self.endpoint, "bus keepalive ok"),
            Ok(Err(LinkError::Lost(reason))) => self.drop_link(&mut slot, &reason),
            Ok(Err(LinkError::Rejected(reason))) => {
                debug!(endpoint = %self.endpoint, reason = %reason, "bus keepalive rejected");
            },
            Err(_) => self.drop_link(&mut slot, "keepalive timed out"),
        }
    }

    /// A publish that blew its deadline was cancelled wherever it stood:
    /// mid-dial, mid-auth or mid-send. Leave no transitional state behind.
    async fn abandon_wedged_link(&self) {
        let mut slot = self.slot.lock().await;
        match slot.state {
            BusState::Connecting => {
                slot.link = None;
                self.apply(&mut slot, BusEvent::ConnectFailed);
            },
            BusState::Authenticating | BusState::Ready => {
                self.drop_link(&mut slot, "publish timed out");
            },
            _ => {},
        }
    }
}

#[async_trait]
impl TaskPublisher for BusPublisher {
    async fn publish(&self, channel: &str, payload: &str) -> Result<PublishReceipt> {
        let Some(after) = self.options.publish_timeout else {
            return self.publish_once(channel, payload).await;
        };
        match tokio::time::timeout(after, self.publish_once(channel, payload)).await {
            Ok(result) => result,
            Err(_) => {
                self.abandon_wedged_link().await;
                Err(BusError::Timeout { after })
            },
        }
    }
}
