// Scripted backends shared by unit tests

use crate::error::MeasurementError;
use crate::measure::{Backend, EngineKind, ResultRecord, Target};
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

type Responder = Box<dyn Fn(&Target, u32) -> Result<ResultRecord, MeasurementError> + Send + Sync>;

/// Backend whose answers come from a closure over (target, call number)
pub struct FakeBackend {
    available: bool,
    calls: Arc<AtomicU32>,
    responder: Responder,
}

impl FakeBackend {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Target, u32) -> Result<ResultRecord, MeasurementError> + Send + Sync + 'static,
    {
        Self {
            available: true,
            calls: Arc::new(AtomicU32::new(0)),
            responder: Box::new(responder),
        }
    }

    /// Always returns a fixed measurement
    pub fn succeeding(kind: EngineKind) -> Self {
        Self::new(move |target, _| Ok(sample_record(kind, target.server_id())))
    }

    /// Always fails with the error built by `make`
    pub fn failing<F>(make: F) -> Self
    where
        F: Fn() -> MeasurementError + Send + Sync + 'static,
    {
        Self::new(move |_, _| Err(make()))
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Shared call counter, readable after the backend is moved
    pub fn calls(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }
}

impl Backend for FakeBackend {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn measure(&self, target: &Target) -> Result<ResultRecord, MeasurementError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.responder)(target, call)
    }
}

pub fn sample_record(engine: EngineKind, server_id: Option<&str>) -> ResultRecord {
    ResultRecord::new(
        Utc::now(),
        12.3456,
        95.1234,
        18.9876,
        Some(server_id.unwrap_or("20013")),
        Some("Example ISP - Springfield"),
        engine,
    )
}
