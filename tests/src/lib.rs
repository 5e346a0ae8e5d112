//! Veritas Testing Framework
//!
//! Scripted backends and recording feedback handlers for exercising the
//! inference loop without a model server.

pub mod backend;
pub mod handler;

pub use backend::{Reply, ScriptedBackend};
pub use handler::RecordingHandler;
