//! Job state and real-time event streaming.
//!
//! The job store holds the authoritative record of every job; the event bus
//! fans progress and log events out to per-job subscribers.

pub mod event;
pub mod event_bus;
pub mod job_store;
pub mod log_forwarder;

pub use event::Event;
pub use event_bus::{EventBus, Subscriber};
pub use job_store::JobStore;
pub use log_forwarder::{JobLogLayer, JOB_ID_FIELD, JOB_SPAN};
