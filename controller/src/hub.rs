use futures_util::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tracing::{debug, info};

use crate::cache::Snapshot;

/// What a streaming client receives.
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    Initial(Arc<Snapshot>),
    Update(Arc<Snapshot>),
    Heartbeat,
}

type Sink = mpsc::UnboundedSender<StreamEvent>;
type SharedSinks = Arc<Mutex<HashMap<usize, Sink>>>;

/// Registry of connected streaming clients.
///
/// Every sink is an unbounded FIFO, so a subscriber sees events in the order
/// they were pushed. All pushes happen under the registry lock; a sink that
/// refuses a push is removed in the same pass.
pub struct BroadcastHub {
    sinks: SharedSinks,
    next_id: AtomicUsize,
    keepalive: Duration,
}

impl BroadcastHub {
    pub fn new(keepalive: Duration) -> Self {
        BroadcastHub {
            sinks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicUsize::new(1),
            keepalive,
        }
    }

    /// Registers a new subscriber. `initial` is evaluated under the registry
    /// lock, so no publish can land between the initial snapshot and the
    /// registration.
    pub fn subscribe<F>(&self, initial: F) -> Subscription
    where
        F: FnOnce() -> Snapshot,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut sinks = self.sinks.lock();
            let sent = tx.send(StreamEvent::Initial(Arc::new(initial())));
            debug_assert!(sent.is_ok(), "receiver is held by this subscription");
            sinks.insert(id, tx);
        }

        let keepalive = tokio::spawn(keep_alive(id, self.sinks.clone(), self.keepalive));
        debug!("subscriber {} connected", id);

        Subscription {
            id,
            rx,
            sinks: self.sinks.clone(),
            keepalive,
        }
    }

    #[cfg(test)]
    pub fn unsubscribe(&self, id: usize) -> bool {
        remove(&self.sinks, id)
    }

    /// Pushes `snapshot` to every subscriber and returns how many received it.
    pub fn publish(&self, snapshot: Snapshot) -> usize {
        let event = StreamEvent::Update(Arc::new(snapshot));
        let mut sinks = self.sinks.lock();

        sinks.retain(|id, tx| match tx.send(event.clone()) {
            Ok(()) => true,
            Err(_closed) => {
                debug!("subscriber {} closed; removing", id);
                false
            }
        });

        sinks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Drops every sink, which ends every open stream.
    pub fn disconnect_all(&self) {
        let mut sinks = self.sinks.lock();
        info!("disconnecting {} subscriber(s)", sinks.len());
        sinks.clear();
    }
}

fn remove(sinks: &SharedSinks, id: usize) -> bool {
    let removed = sinks.lock().remove(&id).is_some();
    if removed {
        debug!("subscriber {} disconnected", id);
    }
    removed
}

async fn keep_alive(id: usize, sinks: SharedSinks, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        ticker.tick().await;

        let mut guard = sinks.lock();
        let Some(tx) = guard.get(&id) else {
            break;
        };
        if tx.send(StreamEvent::Heartbeat).is_err() {
            guard.remove(&id);
            debug!("subscriber {} missed a heartbeat; removing", id);
            break;
        }
    }
}

/// One connected client. Dropping it unsubscribes and stops its heartbeat.
pub struct Subscription {
    id: usize,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    sinks: SharedSinks,
    keepalive: JoinHandle<()>,
}

impl Subscription {
    pub fn id(&self) -> usize {
        self.id
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Closes the receiving side while keeping the registration, which is
    /// what a dead connection looks like from the hub's point of view.
    #[cfg(test)]
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Stream for Subscription {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.keepalive.abort();
        remove(&self.sinks, self.id);
    }
}
