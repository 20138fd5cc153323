//! Forwards job-scoped tracing output to the job's subscribers.
//!
//! The pipeline engine runs every job inside a `job` span that records a
//! `job_id` field. [`JobLogLayer`] remembers that id on the span and, for
//! each event emitted anywhere beneath it, publishes an [`Event::Log`] on the
//! [`EventBus`]. Records from the `log` crate reach the layer through
//! `tracing_log::LogTracer` and are forwarded the same way.

use std::fmt::Write as _;

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Level, Subscriber};
use tracing_log::NormalizeEvent;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::event::Event;
use super::event_bus::EventBus;

/// Name of the span the engine opens around a job run.
pub const JOB_SPAN: &str = "job";

/// Field on [`JOB_SPAN`] holding the job id.
pub const JOB_ID_FIELD: &str = "job_id";

/// Stored in the extensions of a `job` span.
struct JobScope(String);

#[derive(Default)]
struct JobIdVisitor {
    job_id: Option<String>,
}

impl Visit for JobIdVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == JOB_ID_FIELD {
            self.job_id = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == JOB_ID_FIELD {
            self.job_id = Some(format!("{:?}", value));
        }
    }
}

/// Renders an event as `message key=value ...`, skipping the `log.*`
/// bookkeeping fields added by `tracing-log`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            name if name.starts_with("log.") => {}
            name => self.push_field(name, format_args!("{}", value)),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            name if name.starts_with("log.") => {}
            name => self.push_field(name, format_args!("{:?}", value)),
        }
    }
}

/// A `tracing-subscriber` layer publishing job-scoped events as log events.
#[derive(Clone)]
pub struct JobLogLayer {
    bus: EventBus,
    level: Level,
}

impl JobLogLayer {
    /// Forwards events at `level` or more severe.
    pub fn new(bus: EventBus, level: Level) -> Self {
        Self { bus, level }
    }

    fn job_id<S>(event: &tracing::Event<'_>, ctx: &Context<'_, S>) -> Option<String>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let scope = ctx.event_scope(event)?;
        for span in scope {
            if let Some(JobScope(job_id)) = span.extensions().get::<JobScope>() {
                return Some(job_id.clone());
            }
        }
        None
    }
}

impl<S> Layer<S> for JobLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != JOB_SPAN {
            return;
        }
        let mut visitor = JobIdVisitor::default();
        attrs.record(&mut visitor);
        if let (Some(job_id), Some(span)) = (visitor.job_id, ctx.span(id)) {
            span.extensions_mut().insert(JobScope(job_id));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        if span.name() != JOB_SPAN {
            return;
        }
        let mut visitor = JobIdVisitor::default();
        values.record(&mut visitor);
        if let Some(job_id) = visitor.job_id {
            span.extensions_mut().replace(JobScope(job_id));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());

        // Level ordering runs from ERROR (smallest) to TRACE.
        if *metadata.level() > self.level {
            return;
        }

        let Some(job_id) = Self::job_id(event, &ctx) else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.bus.publish(
            &job_id,
            Event::log_from(
                &job_id,
                metadata.level().as_str(),
                metadata.target(),
                &visitor.finish(),
            ),
        );
    }
}
