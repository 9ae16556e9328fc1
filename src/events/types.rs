//! Event type definitions for the coordination event system
//!
//! These are in-process observability events — distinct from the coordinator
//! key-value writes in `crate::coordinator` — used for structured logging,
//! metrics, and test assertions over the lock protocol, partitioning,
//! batch lifecycle, and rebalancing described in SPEC_FULL.md §4.

use serde::{Deserialize, Serialize};

/// Reason for event bus shutdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShutdownReason {
    /// Process received a graceful shutdown signal
    Graceful,
    /// Process is exiting due to a fatal error
    Error(String),
}

/// Events emitted during coordination-plane operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CrawlEvent {
    /// A lock was acquired (fresh or after takeover from a stale holder).
    LockAcquired {
        role: String,
        id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A lock refresh detected loss of ownership.
    LockLost {
        role: String,
        id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A lock acquire attempt failed because another instance holds it.
    LockContended {
        role: String,
        id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// The Manager (re)partitioned page ranges across live General workers.
    PartitionAssigned {
        mode: String,
        assignments: Vec<(String, u32, u32)>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A General worker opened a new batch window.
    BatchOpened {
        general_id: String,
        start: u32,
        end: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A General worker observed every live Product worker drain a batch.
    BatchCompleted {
        general_id: String,
        start: u32,
        end: u32,
        duration: std::time::Duration,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Pages were moved from a busy Product worker to an idle one mid-batch.
    Rebalanced {
        from: String,
        to: String,
        page_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Session cookies were published after a successful login/verification.
    SessionPublished {
        general_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Session cookies were found invalid; a re-login is required.
    SessionInvalidated {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A record was extracted and persisted (or failed to persist).
    RecordExtracted {
        product_id: String,
        page: u32,
        identifier: Option<String>,
        status: ExtractionStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Signals that the event bus is shutting down.
    ///
    /// Subscribers should exit their event loops when receiving this event.
    Shutdown {
        reason: ShutdownReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionStatus {
    Success,
    Failed,
}

/// Result of publishing a batch of events
///
/// Provides detailed information about batch publication success/failure.
/// Unlike a Result type, this always represents successful execution of the
/// batch operation itself - the fields indicate how many individual events
/// succeeded or failed within the batch.
///
/// # Best-Effort Semantics
///
/// The event bus uses best-effort delivery. All events in the batch are attempted
/// regardless of individual failures. This struct transparently reports what happened
/// so callers can make informed decisions about partial success scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPublishResult {
    /// Total number of events in the batch
    pub total: usize,

    /// Number of events successfully published
    pub published: usize,

    /// Number of events that failed to publish (no active subscribers)
    pub failed: usize,

    /// Peak subscriber count observed during batch
    pub max_subscribers: usize,
}

impl BatchPublishResult {
    /// Check if all events were successfully published
    ///
    /// Returns true only if published == total and failed == 0
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.published == self.total && self.failed == 0
    }

    /// Check if any events failed to publish
    ///
    /// Returns true if failed > 0
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Calculate success rate as a percentage
    ///
    /// Returns 100.0 if total is 0 (empty batch), otherwise (published / total) * 100.0
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.published as f64 / self.total as f64) * 100.0
    }
}

/// Helper functions for creating common events
impl CrawlEvent {
    #[must_use]
    pub fn lock_acquired(role: impl Into<String>, id: impl Into<String>) -> Self {
        Self::LockAcquired {
            role: role.into(),
            id: id.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn lock_lost(role: impl Into<String>, id: impl Into<String>) -> Self {
        Self::LockLost {
            role: role.into(),
            id: id.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn lock_contended(role: impl Into<String>, id: impl Into<String>) -> Self {
        Self::LockContended {
            role: role.into(),
            id: id.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn partition_assigned(mode: impl Into<String>, assignments: Vec<(String, u32, u32)>) -> Self {
        Self::PartitionAssigned {
            mode: mode.into(),
            assignments,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn batch_opened(general_id: impl Into<String>, start: u32, end: u32) -> Self {
        Self::BatchOpened {
            general_id: general_id.into(),
            start,
            end,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn batch_completed(
        general_id: impl Into<String>,
        start: u32,
        end: u32,
        duration: std::time::Duration,
    ) -> Self {
        Self::BatchCompleted {
            general_id: general_id.into(),
            start,
            end,
            duration,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn rebalanced(from: impl Into<String>, to: impl Into<String>, page_count: usize) -> Self {
        Self::Rebalanced {
            from: from.into(),
            to: to.into(),
            page_count,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn session_published(general_id: impl Into<String>) -> Self {
        Self::SessionPublished {
            general_id: general_id.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn session_invalidated() -> Self {
        Self::SessionInvalidated {
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn record_extracted(
        product_id: impl Into<String>,
        page: u32,
        identifier: Option<String>,
        status: ExtractionStatus,
    ) -> Self {
        Self::RecordExtracted {
            product_id: product_id.into(),
            page,
            identifier,
            status,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create a Shutdown event
    #[must_use]
    pub fn shutdown(reason: ShutdownReason) -> Self {
        Self::Shutdown {
            reason,
            timestamp: chrono::Utc::now(),
        }
    }
}
