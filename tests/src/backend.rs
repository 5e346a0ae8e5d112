use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use veritas_kernel::{BackendAdapter, BackendError, GenerationParams};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(BackendError),
    /// Sleep, then answer. Cooperates with a paused test clock.
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// A mock backend that answers from a script.
///
/// Replies are consumed in call order; once the script runs out the fallback
/// answers every further call. Every prompt received is recorded.
#[derive(Clone)]
pub struct ScriptedBackend {
    name: String,
    script: Arc<Mutex<VecDeque<Reply>>>,
    fallback: Reply,
    history: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new(fallback: Reply) -> Self {
        Self {
            name: "scripted".to_string(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answers `text`.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::new(Reply::text(text))
    }

    /// Answers each text once, in order, then repeats the last one.
    pub fn sequence<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replies: Vec<Reply> = texts.into_iter().map(Reply::text).collect();
        let fallback = replies
            .last()
            .cloned()
            .unwrap_or_else(|| Reply::text(String::new()));
        Self::new(fallback).with_script(replies)
    }

    /// Fails every call with `error`.
    pub fn failing(error: BackendError) -> Self {
        Self::new(Reply::Fail(error))
    }

    /// Answers `text` after `delay`.
    pub fn delayed(delay: Duration, text: impl Into<String>) -> Self {
        Self::new(Reply::Delayed(delay, Box::new(Reply::text(text))))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_script(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.script.lock().extend(replies);
        self
    }

    /// Prompts received so far, in call order.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.history.lock().len()
    }

    fn next_reply(&self) -> Reply {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

async fn answer(reply: Reply) -> Result<String, BackendError> {
    let mut reply = reply;
    loop {
        match reply {
            Reply::Text(text) => return Ok(text),
            Reply::Fail(error) => return Err(error),
            Reply::Delayed(delay, next) => {
                tokio::time::sleep(delay).await;
                reply = *next;
            }
        }
    }
}

#[async_trait]
impl BackendAdapter for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        prompt: &str,
        _params: &GenerationParams,
        _deadline: Instant,
    ) -> Result<String, BackendError> {
        self.history.lock().push(prompt.to_string());
        let reply = self.next_reply();
        answer(reply).await
    }
}

#[macro_export]
macro_rules! assert_backend_called {
    ($backend:expr, $expected_count:expr) => {
        let count = $backend.call_count();
        assert_eq!(
            count, $expected_count,
            "Expected backend '{}' to be called {} times, but was called {} times",
            stringify!($backend),
            $expected_count,
            count
        );
    };
}
