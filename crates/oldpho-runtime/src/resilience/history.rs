//! Bounded rolling history of classified errors.

use oldpho_core::{ErrorCategory, ErrorCode, ErrorDetails, Severity};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// External sink for escalated (high and critical) errors.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, details: &ErrorDetails);
}

/// Aggregate counts over the retained history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorStats {
    pub total: usize,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_code: BTreeMap<ErrorCode, usize>,

    /// Newest first
    pub recent: Vec<ErrorDetails>,
}

/// Keeps the last `capacity` errors; the oldest is dropped first.
pub struct ErrorHistory {
    capacity: usize,
    entries: Mutex<VecDeque<ErrorDetails>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

const RECENT_IN_STATS: usize = 10;

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Log an error by severity, escalate it if needed, and retain it.
    pub fn record(&self, details: ErrorDetails) {
        match details.severity {
            Severity::Critical | Severity::High => tracing::error!(
                error_code = %details.code,
                category = %details.category,
                severity = ?details.severity,
                message = %details.message,
                "Escalated error"
            ),
            Severity::Medium => tracing::warn!(
                error_code = %details.code,
                category = %details.category,
                message = %details.message,
                "Error recorded"
            ),
            Severity::Low => tracing::info!(
                error_code = %details.code,
                message = %details.message,
                "Error recorded"
            ),
        }

        if details.severity.escalates() {
            if let Some(reporter) = &self.reporter {
                reporter.report(&details);
            }
        }

        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(details);
    }

    /// The `n` most recent errors, newest first.
    pub fn recent(&self, n: usize) -> Vec<ErrorDetails> {
        self.entries.lock().iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> ErrorStats {
        let entries = self.entries.lock();
        let mut stats = ErrorStats {
            total: entries.len(),
            ..Default::default()
        };
        for details in entries.iter() {
            *stats.by_category.entry(details.category).or_insert(0) += 1;
            *stats.by_severity.entry(details.severity).or_insert(0) += 1;
            *stats.by_code.entry(details.code).or_insert(0) += 1;
        }
        stats.recent = entries.iter().rev().take(RECENT_IN_STATS).cloned().collect();
        stats
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::new(1000)
    }
}
