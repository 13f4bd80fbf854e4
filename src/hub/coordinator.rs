//! Hub coordinator: one task owns the identity -> session registry.
//!
//! Other tasks only hold a [`HubHandle`] and talk to the coordinator through an
//! event channel, so register, unregister, broadcast and shutdown are applied
//! strictly in arrival order. The coordinator never awaits on a session: every
//! delivery is a `try_send`, and a session whose queue is full or gone is evicted.
//!
//! The event inbox is bounded. Session lifecycle events wait for room; a
//! broadcast that finds the inbox full fails fast with a contention error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::envelope::{Envelope, Frame};
use crate::error::{GameError, Result};

/// One authenticated connection as the hub sees it.
///
/// The hub holds the only sender for the session's outbound queue, so dropping a
/// `Session` closes the queue and tells its writer to send a close frame.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub identity: Uuid,
    outbound: mpsc::Sender<Frame>,
}

impl Session {
    /// Create a session and the receiving end of its bounded outbound queue
    pub fn new(identity: Uuid, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                identity,
                outbound,
            },
            rx,
        )
    }
}

enum HubEvent {
    Register(Session),
    Unregister { identity: Uuid, session_id: Uuid },
    Broadcast(Frame),
    Shutdown(oneshot::Sender<usize>),
}

/// Cloneable entry point to the hub
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
    live: Arc<AtomicUsize>,
}

impl HubHandle {
    /// Admit a session, evicting any earlier one for the same identity
    pub async fn register(&self, session: Session) {
        if self.events.send(HubEvent::Register(session)).await.is_err() {
            debug!("Hub stopped; dropping new session");
        }
    }

    /// Remove a session if it is still the current one for its identity
    pub async fn unregister(&self, identity: Uuid, session_id: Uuid) {
        let _ = self
            .events
            .send(HubEvent::Unregister {
                identity,
                session_id,
            })
            .await;
    }

    /// Queue a pre-encoded frame for every live session.
    ///
    /// Never waits: a full inbox is reported as contention.
    pub fn broadcast(&self, frame: Frame) -> Result<()> {
        match self.events.try_send(HubEvent::Broadcast(frame)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Hub inbox full, dropping broadcast");
                Err(GameError::Contention("hub inbox is full".into()))
            }
            Err(TrySendError::Closed(_)) => Err(GameError::Internal("Hub is not running".into())),
        }
    }

    pub fn broadcast_event(&self, envelope: &Envelope) -> Result<()> {
        self.broadcast(envelope.encode()?)
    }

    /// Evict every session and wait for the coordinator to confirm.
    ///
    /// Returns the number of sessions closed; zero if the hub had already stopped.
    pub async fn shutdown(&self) -> usize {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.events.send(HubEvent::Shutdown(ack_tx)).await.is_err() {
            return 0;
        }
        ack_rx.await.unwrap_or(0)
    }

    /// Live sessions as last published by the coordinator
    pub fn session_count(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

struct Hub {
    sessions: HashMap<Uuid, Session>,
    live: Arc<AtomicUsize>,
}

/// Start the coordinator task with an inbox of `inbox_capacity` events
pub fn spawn_hub(inbox_capacity: usize) -> (HubHandle, JoinHandle<()>) {
    let (events, rx) = mpsc::channel(inbox_capacity.max(1));
    let live = Arc::new(AtomicUsize::new(0));
    let hub = Hub {
        sessions: HashMap::new(),
        live: Arc::clone(&live),
    };
    let task = tokio::spawn(hub.run(rx));
    info!("Connection hub started (inbox capacity {})", inbox_capacity);
    (HubHandle { events, live }, task)
}

impl Hub {
    async fn run(mut self, mut events: mpsc::Receiver<HubEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                HubEvent::Register(session) => self.register(session),
                HubEvent::Unregister {
                    identity,
                    session_id,
                } => self.unregister(identity, session_id),
                HubEvent::Broadcast(frame) => self.broadcast(frame),
                HubEvent::Shutdown(ack) => {
                    let closed = self.evict_all();
                    info!("Hub shut down, closed {} sessions", closed);
                    let _ = ack.send(closed);
                    return;
                }
            }
            self.publish_count();
        }

        // Every handle dropped without an explicit shutdown
        let closed = self.evict_all();
        debug!("Hub event channel closed, dropped {} sessions", closed);
    }

    fn register(&mut self, session: Session) {
        let identity = session.identity;
        let session_id = session.id;
        if let Some(previous) = self.sessions.insert(identity, session) {
            debug!(
                user_id = %identity,
                session_id = %previous.id,
                "Replaced by newer session"
            );
        }
        debug!(user_id = %identity, session_id = %session_id, "Session registered");
    }

    fn unregister(&mut self, identity: Uuid, session_id: Uuid) {
        match self.sessions.get(&identity) {
            Some(current) if current.id == session_id => {
                self.sessions.remove(&identity);
                debug!(user_id = %identity, session_id = %session_id, "Session unregistered");
            }
            // Late unregister from a superseded session
            _ => {}
        }
    }

    fn broadcast(&mut self, frame: Frame) {
        let mut evicted = Vec::new();
        for (identity, session) in &self.sessions {
            match session.outbound.try_send(Arc::clone(&frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(user_id = %identity, session_id = %session.id, "Outbound queue full, evicting session");
                    evicted.push(*identity);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(user_id = %identity, session_id = %session.id, "Writer gone, evicting session");
                    evicted.push(*identity);
                }
            }
        }
        for identity in evicted {
            self.sessions.remove(&identity);
        }
    }

    fn evict_all(&mut self) -> usize {
        let closed = self.sessions.len();
        self.sessions.clear();
        self.publish_count();
        closed
    }

    fn publish_count(&self) {
        self.live.store(self.sessions.len(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn frame(text: &str) -> Frame {
        Arc::from(text)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let (hub, _task) = spawn_hub(64);
        let (a, mut rx_a) = Session::new(Uuid::new_v4(), 8);
        let (b, mut rx_b) = Session::new(Uuid::new_v4(), 8);
        hub.register(a).await;
        hub.register(b).await;
        hub.broadcast(frame("hello")).unwrap();

        assert_eq!(&*rx_a.recv().await.unwrap(), "hello");
        assert_eq!(&*rx_b.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_second_session_closes_first() {
        let (hub, _task) = spawn_hub(64);
        let identity = Uuid::new_v4();
        let (first, mut rx_first) = Session::new(identity, 8);
        let (second, mut rx_second) = Session::new(identity, 8);

        hub.register(first).await;
        hub.register(second).await;
        assert!(timeout(Duration::from_secs(1), rx_first.recv())
            .await
            .unwrap()
            .is_none());

        hub.broadcast(frame("only-second")).unwrap();
        assert_eq!(&*rx_second.recv().await.unwrap(), "only-second");
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_new_session() {
        let (hub, _task) = spawn_hub(64);
        let identity = Uuid::new_v4();
        let (first, _rx_first) = Session::new(identity, 8);
        let first_id = first.id;
        let (second, mut rx_second) = Session::new(identity, 8);

        hub.register(first).await;
        hub.register(second).await;
        hub.unregister(identity, first_id).await;
        hub.broadcast(frame("still-here")).unwrap();

        assert_eq!(&*rx_second.recv().await.unwrap(), "still-here");
    }

    #[tokio::test]
    async fn test_unregister_closes_queue() {
        let (hub, _task) = spawn_hub(64);
        let (session, mut rx) = Session::new(Uuid::new_v4(), 8);
        let (identity, id) = (session.identity, session.id);
        hub.register(session).await;
        hub.unregister(identity, id).await;
        assert!(timeout(Duration::from_secs(1), rx.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_saturated_session_evicted_others_served() {
        let (hub, _task) = spawn_hub(64);
        let (slow, mut rx_slow) = Session::new(Uuid::new_v4(), 1);
        let (fast, mut rx_fast) = Session::new(Uuid::new_v4(), 8);
        hub.register(slow).await;
        hub.register(fast).await;

        hub.broadcast(frame("one")).unwrap();
        hub.broadcast(frame("two")).unwrap();
        hub.broadcast(frame("three")).unwrap();

        assert_eq!(&*rx_fast.recv().await.unwrap(), "one");
        assert_eq!(&*rx_fast.recv().await.unwrap(), "two");
        assert_eq!(&*rx_fast.recv().await.unwrap(), "three");

        // Slow consumer kept what fit, then its queue was closed
        assert_eq!(&*rx_slow.recv().await.unwrap(), "one");
        assert!(rx_slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_acknowledges() {
        let (hub, task) = spawn_hub(64);
        let (a, mut rx_a) = Session::new(Uuid::new_v4(), 8);
        let (b, mut rx_b) = Session::new(Uuid::new_v4(), 8);
        hub.register(a).await;
        hub.register(b).await;

        assert_eq!(hub.shutdown().await, 2);
        assert!(rx_a.recv().await.is_none());
        assert!(rx_b.recv().await.is_none());
        task.await.unwrap();

        assert_eq!(hub.session_count(), 0);
        assert!(hub.broadcast(frame("late")).is_err());
        assert_eq!(hub.shutdown().await, 0);
    }

    #[tokio::test]
    async fn test_session_count_published() {
        let (hub, _task) = spawn_hub(64);
        let (a, mut rx_a) = Session::new(Uuid::new_v4(), 8);
        let (b, _rx_b) = Session::new(Uuid::new_v4(), 8);
        let (b_identity, b_id) = (b.identity, b.id);
        hub.register(a).await;
        hub.register(b).await;

        // A delivered broadcast means every earlier event has been applied
        hub.broadcast(frame("sync")).unwrap();
        rx_a.recv().await.unwrap();
        assert_eq!(hub.session_count(), 2);

        hub.unregister(b_identity, b_id).await;
        hub.broadcast(frame("sync")).unwrap();
        rx_a.recv().await.unwrap();
        assert_eq!(hub.session_count(), 1);
    }

    #[tokio::test]
    async fn test_full_inbox_rejects_broadcast() {
        // The coordinator cannot run until this task yields
        let (hub, _task) = spawn_hub(2);
        hub.broadcast(frame("one")).unwrap();
        hub.broadcast(frame("two")).unwrap();
        assert!(matches!(
            hub.broadcast(frame("three")),
            Err(GameError::Contention(_))
        ));

        // Lifecycle events wait for room instead of failing
        let (session, mut rx) = Session::new(Uuid::new_v4(), 8);
        hub.register(session).await;
        hub.broadcast(frame("after")).unwrap();
        assert_eq!(&*rx.recv().await.unwrap(), "after");
    }
}
