//! Per-job publish/subscribe for progress and log events.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::Stream;
use tokio::sync::mpsc;

use super::event::Event;
use crate::job::JobStatus;

/// Sending half of one subscriber's queue.
struct Sink {
    id: u64,
    sender: mpsc::UnboundedSender<Event>,
}

#[derive(Default)]
struct BusState {
    subscribers: HashMap<String, Vec<Sink>>,
    /// Jobs whose streams have ended. Late subscribers get `Connected` and
    /// then end immediately.
    closed: HashSet<String>,
    next_id: u64,
}

/// Fans events out to the live subscribers of each job.
///
/// Each subscriber owns an unbounded queue, so a slow reader never loses
/// events. Publishing happens under the write lock, which gives all
/// subscribers of a job one publish order. Events published while nobody is
/// subscribed are dropped.
///
/// Closed job ids are remembered so late subscribers end at once, just as
/// the job store keeps finished jobs. Both are released when the job is
/// deleted, which calls [`EventBus::forget`].
#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<RwLock<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BusState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Event bus lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, BusState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Event bus lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Sends an event to every subscriber currently attached to `job_id`.
    /// Subscribers that were dropped without unsubscribing are pruned.
    pub fn publish(&self, job_id: &str, event: Event) {
        let mut state = self.write();
        let Some(sinks) = state.subscribers.get_mut(job_id) else {
            return;
        };

        sinks.retain(|sink| sink.sender.send(event.clone()).is_ok());
        if sinks.is_empty() {
            state.subscribers.remove(job_id);
        }
    }

    /// Registers a new subscriber. The first event it yields is always
    /// `Connected`.
    pub fn subscribe(&self, job_id: &str, status: Option<JobStatus>) -> Subscriber {
        let connected = Event::connected(job_id, status);
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.write();
        let id = state.next_id;
        state.next_id += 1;

        if state.closed.contains(job_id) {
            drop(sender);
            return Subscriber::new(job_id, id, connected, receiver);
        }

        state
            .subscribers
            .entry(job_id.to_string())
            .or_default()
            .push(Sink { id, sender });

        log::debug!("Subscriber attached to job {}", job_id);
        Subscriber::new(job_id, id, connected, receiver)
    }

    /// Detaches a subscriber and drops the job's entry once it has no
    /// listeners left.
    pub fn unsubscribe(&self, subscriber: Subscriber) {
        let mut state = self.write();
        if let Some(sinks) = state.subscribers.get_mut(&subscriber.job_id) {
            sinks.retain(|sink| sink.id != subscriber.id);
            if sinks.is_empty() {
                state.subscribers.remove(&subscriber.job_id);
            }
        }
        log::debug!("Subscriber detached from job {}", subscriber.job_id);
    }

    /// Ends every stream for `job_id` once queued events are drained.
    pub fn close(&self, job_id: &str) {
        let mut state = self.write();
        state.subscribers.remove(job_id);
        state.closed.insert(job_id.to_string());
    }

    /// Drops all bookkeeping for a job that has been removed from the store.
    pub fn forget(&self, job_id: &str) {
        let mut state = self.write();
        state.subscribers.remove(job_id);
        state.closed.remove(job_id);
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.read()
            .subscribers
            .get(job_id)
            .map(|sinks| sinks.iter().filter(|s| !s.sender.is_closed()).count())
            .unwrap_or(0)
    }
}

/// A live listener bound to one job.
pub struct Subscriber {
    job_id: String,
    id: u64,
    connected: Option<Event>,
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl Subscriber {
    fn new(
        job_id: &str,
        id: u64,
        connected: Event,
        receiver: mpsc::UnboundedReceiver<Event>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            id,
            connected: Some(connected),
            receiver,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Waits for the next event. Returns `None` once the job's stream has
    /// been closed and everything queued has been delivered.
    pub async fn recv(&mut self) -> Option<Event> {
        if let Some(event) = self.connected.take() {
            return Some(event);
        }
        self.receiver.recv().await
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        if let Some(event) = self.connected.take() {
            return Some(event);
        }
        self.receiver.try_recv().ok()
    }

    /// Turns the subscriber into a stream that ends with the job.
    pub fn into_stream(self) -> impl Stream<Item = Event> + Send + 'static {
        futures_util::stream::unfold(self, |mut subscriber| async move {
            subscriber.recv().await.map(|event| (event, subscriber))
        })
    }
}
