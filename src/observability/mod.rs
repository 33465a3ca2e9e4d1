//! Observability for aerokv
//!
//! Structured JSON logging with a closed event vocabulary. Logging is
//! read-only with respect to store state: a failed log write never fails
//! the operation that produced it.
//!
//! ```ignore
//! use aerokv::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::BackendOpen, &[("path", "/var/lib/aerokv/aerokv.db")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity, LOG_LEVEL_ENV};

/// Log an event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log an event with fields at its own severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(Event::ConfigLoaded);
        log_event_with_fields(Event::BackendOpen, &[("path", "/tmp/x")]);
        log_event_with_fields(Event::TxnFatal, &[("op", "put")]);
    }
}
