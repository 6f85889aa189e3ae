use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing dispatch activity across all transports.
#[derive(Default)]
pub struct DispatchMetrics {
    calls: AtomicU64,
    failures: AtomicU64,
    unknown_tools: AtomicU64,
}

impl DispatchMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tool invocation that reached a registered handler.
    pub fn record_call(&self, succeeded: bool) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a request naming a tool that is not registered.
    pub fn record_unknown_tool(&self) {
        self.unknown_tools.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            unknown_tools: self.unknown_tools.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of dispatch counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Invocations that reached a handler since startup.
    pub calls: u64,
    /// Invocations whose handler returned an error or panicked.
    pub failures: u64,
    /// Requests that named an unregistered tool.
    pub unknown_tools: u64,
}
