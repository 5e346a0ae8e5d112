use super::FeedbackRouter;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::debug;
use veritas_kernel::{FeedbackEvent, FeedbackKind, FeedbackPayload};

#[derive(Default)]
struct LogState {
    events: Vec<FeedbackEvent>,
    emitted: HashSet<FeedbackKind>,
}

/// Per-request event emitter.
///
/// Stamps events with the request id, enforces at most one event per kind
/// (consistency failures excepted), keeps the ordered log handed back to the
/// caller and forwards each event to the router. Publishing happens under
/// the log's lock so the router sees events in log order.
pub struct FeedbackLog {
    request_id: String,
    router: FeedbackRouter,
    state: Mutex<LogState>,
}

impl FeedbackLog {
    pub fn new(router: FeedbackRouter, request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            router,
            state: Mutex::new(LogState::default()),
        }
    }

    /// Log that records events without any subscriber behind it.
    pub fn detached(request_id: impl Into<String>) -> Self {
        Self::new(FeedbackRouter::default(), request_id)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Record and publish an event. Returns `false` when an event of the same
    /// kind was already emitted for this request.
    pub fn emit(&self, source: &str, payload: FeedbackPayload) -> bool {
        let kind = payload.kind();
        let mut state = self.state.lock();
        if !state.emitted.insert(kind) && !kind.may_recur() {
            debug!(request_id = %self.request_id, kind = %kind, "Duplicate feedback suppressed");
            return false;
        }

        let event = FeedbackEvent::new(self.request_id.clone(), source, payload);
        debug!(
            request_id = %self.request_id,
            kind = %kind,
            source = source,
            event_id = %event.id,
            "Feedback event"
        );
        state.events.push(event.clone());
        self.router.publish(event);
        true
    }

    pub fn has_emitted(&self, kind: FeedbackKind) -> bool {
        self.state.lock().emitted.contains(&kind)
    }

    pub fn events(&self) -> Vec<FeedbackEvent> {
        self.state.lock().events.clone()
    }

    pub fn into_events(self) -> Vec<FeedbackEvent> {
        self.state.into_inner().events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_failure() -> FeedbackPayload {
        FeedbackPayload::BackendFailure {
            model_id: "m".into(),
            attempts: 1,
            detail: "x".into(),
        }
    }

    fn consistency_failure() -> FeedbackPayload {
        FeedbackPayload::ConsistencyFailure {
            agreement_ratio: 0.33,
            quorum: 0.6,
            samples_succeeded: 3,
            dissenting: 2,
        }
    }

    #[test]
    fn test_once_per_kind() {
        let log = FeedbackLog::detached("r1");
        assert!(log.emit("agent", backend_failure()));
        assert!(!log.emit("agent", backend_failure()));
        assert!(log.has_emitted(FeedbackKind::BackendFailure));
        assert_eq!(log.events().len(), 1);
    }

    #[test]
    fn test_consistency_failure_may_recur() {
        let log = FeedbackLog::detached("r1");
        assert!(log.emit("consistency", consistency_failure()));
        assert!(log.emit("consistency", consistency_failure()));
        let events = log.into_events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.request_id == "r1"));
    }
}
