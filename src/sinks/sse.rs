//! Server-Sent Events fan-out.
//!
//! Every connected client gets its own bounded queue and one subscription per
//! finalizer. Publishing never waits on a client: when a queue is full the
//! event is dropped for that client only.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::pipeline::{FinalizerSet, Provider, SubscriptionId};
use crate::shutdown::ShutdownListener;
use crate::telemetry::{TaggedEvent, TaggedValue};

/// Render one SSE block: `event: <tag>\ndata: <value>@<stamp>\n\n`
///
/// Both the value and the stamp are JSON; NaN renders as `null`.
///
/// # Examples
///
/// ```
/// use groundlink::sinks::format_event;
/// use groundlink::telemetry::{DataStamp, Event, GpsCoords, TaggedValue};
///
/// let event = Event::new(
///     DataStamp::new(42, GpsCoords::UNKNOWN),
///     TaggedValue { tag: "primary/altitude", value: 12.5 },
/// );
/// assert_eq!(
///     format_event(&event).unwrap(),
///     "event: primary/altitude\n\
///      data: 12.5@{\"Timestamp\":42,\"Coordinates\":{\"Latitude\":null,\"Longitude\":null}}\n\n"
/// );
/// ```
pub fn format_event(event: &TaggedEvent) -> Result<String> {
    Ok(format!(
        "event: {}\ndata: {}@{}\n\n",
        event.data.tag,
        serde_json::to_string(&event.data.value)?,
        serde_json::to_string(&event.stamp)?
    ))
}

type Registrations = Vec<(Arc<Provider<TaggedValue>>, SubscriptionId)>;

/// Live subscriptions keyed by client id
///
/// Removing a client's entry is what grants the right to unsubscribe it, so
/// drop, explicit close and shutdown can race without unsubscribing twice.
#[derive(Default)]
struct Registry {
    clients: Mutex<HashMap<u64, Registrations>>,
}

impl Registry {
    fn insert(&self, id: u64, registrations: Registrations) {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, registrations);
    }

    fn remove(&self, id: u64) -> bool {
        let removed = self
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        match removed {
            Some(registrations) => {
                for (provider, subscription) in registrations {
                    provider.unsubscribe(subscription);
                }
                true
            }
            None => false,
        }
    }

    fn drain(&self) -> usize {
        let drained: Vec<Registrations> = self
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, registrations)| registrations)
            .collect();

        for (provider, subscription) in drained.iter().flatten() {
            provider.unsubscribe(*subscription);
        }
        drained.len()
    }

    fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Hands out per-client SSE subscriptions over a finalizer set
pub struct SseBroadcaster {
    finalizers: FinalizerSet,
    buffer: usize,
    registry: Arc<Registry>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl std::fmt::Debug for SseBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseBroadcaster")
            .field("finalizers", &self.finalizers.len())
            .field("buffer", &self.buffer)
            .field("clients", &self.registry.len())
            .finish()
    }
}

impl SseBroadcaster {
    /// `buffer` is the per-client queue length
    pub fn new(finalizers: FinalizerSet, buffer: usize) -> Self {
        Self {
            finalizers,
            buffer: buffer.max(1),
            registry: Arc::new(Registry::default()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a new client on every finalizer
    ///
    /// After [`close_all`](Self::close_all) the returned subscription is
    /// already finished.
    pub fn subscribe(&self) -> SseSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel::<String>(self.buffer);
        let subscription = SseSubscription {
            id,
            rx,
            registry: Arc::clone(&self.registry),
        };

        if self.closed.load(Ordering::Acquire) {
            return subscription;
        }

        let mut registrations = Vec::with_capacity(self.finalizers.len());
        for (tag, provider) in self.finalizers.iter() {
            let tx = tx.clone();
            let registry = Arc::clone(&self.registry);
            let handler_id = provider.subscribe(move |event: &TaggedEvent| {
                let block = match format_event(event) {
                    Ok(block) => block,
                    Err(e) => {
                        warn!(tag, "Failed to format SSE event: {}", e);
                        return;
                    }
                };
                match tx.try_send(block) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        trace!(client = id, tag, "SSE client lagging, event dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        if registry.remove(id) {
                            debug!(client = id, "SSE client gone");
                        }
                    }
                }
            });
            registrations.push((Arc::clone(provider), handler_id));
        }
        self.registry.insert(id, registrations);

        // A shutdown racing with this subscribe must not leave it registered
        if self.closed.load(Ordering::Acquire) {
            self.registry.remove(id);
        }

        info!(client = id, "SSE client connected");
        subscription
    }

    /// Unsubscribe every client; their streams end once queued events drain
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
        let closed = self.registry.drain();
        info!("Closed {} SSE client(s)", closed);
    }

    /// Close every client when `shutdown` fires
    pub async fn close_on(self: Arc<Self>, mut shutdown: ShutdownListener) {
        shutdown.wait().await;
        self.close_all();
    }

    pub fn active_subscriptions(&self) -> usize {
        self.registry.len()
    }
}

/// One client's event stream
///
/// Yields formatted SSE blocks. Dropping it unsubscribes the client.
pub struct SseSubscription {
    id: u64,
    rx: mpsc::Receiver<String>,
    registry: Arc<Registry>,
}

impl std::fmt::Debug for SseSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseSubscription").field("id", &self.id).finish()
    }
}

impl SseSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next block, or `None` once the client was closed and its queue drained
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Unsubscribe now; queued blocks can still be received
    pub fn close(&mut self) {
        if self.registry.remove(self.id) {
            debug!(client = self.id, "SSE client closed");
        }
    }
}

impl Stream for SseSubscription {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for SseSubscription {
    fn drop(&mut self) {
        if self.registry.remove(self.id) {
            info!(client = self.id, "SSE client disconnected");
        }
    }
}
