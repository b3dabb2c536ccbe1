use std::borrow::Borrow;

use taskvisor::{Event, EventKind};
use tracing::{debug, error, info, trace, warn};

/// Log level a supervisor event is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Level and message for an event kind.
///
/// A failed attempt of the subscription reader is routine (the stream drops
/// and is reopened) so failures are warnings; only permanent task death is
/// an error.
pub fn classify(kind: EventKind) -> (Severity, &'static str) {
    use Severity::*;

    match kind {
        EventKind::TaskAddRequested => (Trace, "task add requested"),
        EventKind::TaskAdded => (Debug, "task registered"),
        EventKind::TaskRemoveRequested => (Trace, "task removal requested"),
        EventKind::TaskRemoved => (Debug, "task removed"),

        EventKind::TaskStarting => (Info, "task starting"),
        EventKind::TaskStopped => (Debug, "task stopped"),
        EventKind::TaskFailed => (Warn, "task attempt failed"),
        EventKind::TimeoutHit => (Warn, "task attempt timed out"),
        EventKind::BackoffScheduled => (Debug, "task restart scheduled"),

        EventKind::ActorExhausted => (Warn, "task will not be restarted"),
        EventKind::ActorDead => (Error, "task died permanently"),

        EventKind::ShutdownRequested => (Info, "shutdown requested"),
        EventKind::AllStoppedWithinGrace => (Info, "all tasks stopped"),
        EventKind::GraceExceeded => (Warn, "tasks still running after grace period"),

        EventKind::SubscriberOverflow => (Error, "event subscriber dropped an event"),
        EventKind::SubscriberPanicked => (Error, "event subscriber panicked"),

        EventKind::ControllerRejected => (Warn, "controller rejected submission"),
        EventKind::ControllerSubmitted => (Trace, "controller accepted submission"),
        EventKind::ControllerSlotTransition => (Debug, "controller slot transition"),
    }
}

fn task_of(e: &Event) -> &str {
    e.task.as_deref().unwrap_or("-")
}

fn reason_of(e: &Event) -> &str {
    e.reason.as_deref().unwrap_or("-")
}

pub fn log_event<E: Borrow<Event>>(ev: E) {
    let e = ev.borrow();
    let (severity, msg) = classify(e.kind);
    let task = task_of(e);
    let attempt = e.attempt.unwrap_or(0);

    match (e.kind, severity) {
        (EventKind::BackoffScheduled, _) => debug!(
            task,
            attempt,
            delay_ms = e.delay_ms.unwrap_or(0),
            reason = reason_of(e),
            "{msg}"
        ),
        (EventKind::TimeoutHit, _) => warn!(
            task,
            attempt,
            timeout_ms = e.timeout_ms.unwrap_or(0),
            "{msg}"
        ),
        (_, Severity::Trace) => trace!(task, "{msg}"),
        (_, Severity::Debug) => debug!(task, attempt, "{msg}"),
        (_, Severity::Info) => info!(task, attempt, "{msg}"),
        (_, Severity::Warn) => warn!(task, attempt, reason = reason_of(e), "{msg}"),
        (_, Severity::Error) => error!(task, attempt, reason = reason_of(e), "{msg}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_permanent_failures_are_errors() {
        assert_eq!(classify(EventKind::ActorDead).0, Severity::Error);
        assert_eq!(classify(EventKind::TaskFailed).0, Severity::Warn);
        assert_eq!(classify(EventKind::ActorExhausted).0, Severity::Warn);
    }

    #[test]
    fn lifecycle_noise_stays_below_info() {
        for kind in [
            EventKind::TaskAddRequested,
            EventKind::TaskAdded,
            EventKind::TaskStopped,
            EventKind::BackoffScheduled,
        ] {
            assert!(classify(kind).0 < Severity::Info, "{kind:?}");
        }
    }
}
