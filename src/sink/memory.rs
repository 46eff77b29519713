//! In-process log backend
//!
//! Keeps records in memory. Useful for local runs without a broker and for
//! exercising the sink path in tests.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::{LogBackend, LogRecord, SinkError};

#[derive(Debug, Default)]
struct Inner {
    records: Mutex<Vec<LogRecord>>,
    attempts: AtomicU64,
    fail: bool,
}

/// Backend that stores records in a shared vector
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that rejects every record
    pub fn failing() -> Self {
        Self {
            inner: Arc::new(Inner {
                fail: true,
                ..Inner::default()
            }),
        }
    }

    /// Records accepted so far
    pub fn records(&self) -> Vec<LogRecord> {
        match self.inner.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of send calls, successful or not
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Relaxed)
    }
}

impl MemoryBackend {
    fn store(&self, record: LogRecord) -> Result<(), SinkError> {
        self.inner.attempts.fetch_add(1, Ordering::Relaxed);

        if self.inner.fail {
            return Err(SinkError::Backend("memory backend configured to fail".into()));
        }

        match self.inner.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        Ok(())
    }
}

impl LogBackend for MemoryBackend {
    // Stored before the future is returned; there is nothing to wait for
    fn send(&self, record: LogRecord) -> impl Future<Output = Result<(), SinkError>> + Send {
        std::future::ready(self.store(record))
    }
}
