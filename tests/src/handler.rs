use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use veritas_foundation::feedback::{FeedbackHandler, HandlerError};
use veritas_kernel::{FeedbackEvent, FeedbackKind};

/// Feedback handler that keeps every event it receives.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<FeedbackEvent>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FeedbackEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<FeedbackKind> {
        self.events.lock().iter().map(FeedbackEvent::kind).collect()
    }

    pub fn count(&self, kind: FeedbackKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }
}

#[async_trait]
impl FeedbackHandler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    async fn handle(&self, event: &FeedbackEvent) -> Result<(), HandlerError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
