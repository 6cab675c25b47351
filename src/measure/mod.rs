// Measurement engines and backend selection

pub mod cli;
pub mod library;
pub mod models;
pub mod selector;


use crate::error::MeasurementError;
use std::future::Future;

pub use cli::{CliEngine, CommandOutput, CommandRunner, PathLocator, ProcessRunner, ToolLocator};
pub use library::LibraryEngine;
pub use models::{sanitize_server_info, EngineKind, ResultRecord, ServerInfo, Target};
pub use selector::{select_engine, EnginePolicy, Measurer, Selection};

/// A measurement backend
pub trait Backend: Send + Sync {
    /// Environment probe; only the external tool can be absent
    fn is_available(&self) -> bool {
        true
    }

    fn measure(&self, target: &Target) -> impl Future<Output = Result<ResultRecord, MeasurementError>> + Send;
}
