//! Link status, communication quality, and error recovery state.
//!
//! The engine updates these trackers after every transaction. The
//! quality monitor condenses latency and failure tallies into a 0..=100
//! score; the recovery state decides when the engine should stop
//! retrying individual commands and run its recovery procedure instead.
//!
//! All state is per engine instance. Nothing here is global, so several
//! engines (e.g. under test) never interfere with each other.

use std::time::{Duration, Instant};

use aclink_core::ErrorKind;

/// Weight of the previous average in the latency EWMA.
const EWMA_OLD_WEIGHT: f32 = 0.8;

/// Weight of the newest sample in the latency EWMA.
const EWMA_NEW_WEIGHT: f32 = 0.2;

/// Latency above which the latency penalty starts accruing, ms.
const LATENCY_PENALTY_FLOOR_MS: f32 = 500.0;

/// Score threshold below which the engine proactively runs recovery.
pub const RECOVERY_SCORE_THRESHOLD: f32 = 50.0;

/// Minimum transaction count before the score-based recovery trigger
/// becomes meaningful. Keeps a single early failure from reading as a
/// catastrophic success rate.
pub const RECOVERY_SCORE_MIN_SAMPLES: u64 = 10;

/// Consecutive-failure count that triggers the recovery procedure.
pub const RECOVERY_CONSECUTIVE_ERRORS: u32 = 3;

/// Failed recovery attempts after which the engine performs a full reset.
pub const MAX_RECOVERY_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// Link status
// ---------------------------------------------------------------------------

/// Sticky error-flag bits carried in [`LinkStatus::error_flags`].
pub mod error_flags {
    /// A transaction timed out.
    pub const TIMEOUT: u8 = 0x01;
    /// A frame failed checksum verification.
    pub const CHECKSUM: u8 = 0x02;
    /// A reply had the wrong shape.
    pub const INVALID_RESPONSE: u8 = 0x04;
    /// A protocol-level rejection (NAK or contradiction).
    pub const PROTOCOL: u8 = 0x08;
    /// An incoming frame overran the buffer cap.
    pub const OVERFLOW: u8 = 0x10;
    /// The unit reported a fault code.
    pub const DEVICE: u8 = 0x20;
    /// Transport-level communication trouble.
    pub const COMMUNICATION: u8 = 0x40;
}

/// Connection/health summary mutated by the engine after every
/// transaction.
#[derive(Debug, Clone)]
pub struct LinkStatus {
    /// Whether the unit is currently considered reachable.
    pub connected: bool,
    /// Whether any sticky error flag is set.
    pub has_errors: bool,
    /// Classification of the most recent error, if any.
    pub last_error: Option<ErrorKind>,
    /// Sticky per-class error bits (see [`error_flags`]); cleared by
    /// the recovery procedure.
    pub error_flags: u8,
    /// Cumulative successful transactions.
    pub success_count: u64,
    /// Cumulative failed transactions.
    pub error_count: u64,
    /// When the last valid response was seen.
    pub last_response: Option<Instant>,
}

impl Default for LinkStatus {
    fn default() -> Self {
        LinkStatus {
            connected: false,
            has_errors: false,
            last_error: None,
            error_flags: 0,
            success_count: 0,
            error_count: 0,
            last_response: None,
        }
    }
}

impl LinkStatus {
    /// Record a successful transaction.
    pub fn record_success(&mut self, now: Instant) {
        self.connected = true;
        self.success_count += 1;
        self.last_response = Some(now);
        self.last_error = None;
    }

    /// Record a failed transaction.
    pub fn record_failure(&mut self, kind: ErrorKind) {
        self.error_count += 1;
        self.last_error = Some(kind);
        self.error_flags |= match kind {
            ErrorKind::Timeout => error_flags::TIMEOUT,
            ErrorKind::Checksum => error_flags::CHECKSUM,
            ErrorKind::InvalidResponse => error_flags::INVALID_RESPONSE,
            ErrorKind::Protocol => error_flags::PROTOCOL,
            ErrorKind::BufferOverflow => error_flags::OVERFLOW,
            ErrorKind::Device => error_flags::DEVICE,
            _ => error_flags::COMMUNICATION,
        };
        self.has_errors = true;
    }

    /// Clear the sticky error flags (recovery procedure).
    pub fn clear_error_flags(&mut self) {
        self.error_flags = 0;
        self.has_errors = false;
    }
}

// ---------------------------------------------------------------------------
// Communication quality
// ---------------------------------------------------------------------------

/// Rolling communication-quality metrics.
///
/// Only a small in-memory window of derived values is kept; there is no
/// long-term history.
#[derive(Debug, Clone)]
pub struct CommunicationQuality {
    /// Exponentially smoothed response time, ms.
    pub avg_response_ms: f32,
    /// Slowest observed response, ms.
    pub max_response_ms: f32,
    /// Fastest observed response, ms.
    pub min_response_ms: f32,
    /// Transactions that ended in a timeout.
    pub timeout_count: u64,
    /// Transactions that ended in a checksum mismatch.
    pub checksum_error_count: u64,
    /// Total transactions observed.
    pub total_commands: u64,
    /// Successful transactions observed.
    pub success_commands: u64,
    /// Derived health score in 0..=100.
    pub quality_score: f32,
    /// Whether the link currently qualifies as stable.
    pub stable: bool,
    /// When the metrics were last updated.
    pub last_update: Option<Instant>,
}

impl Default for CommunicationQuality {
    fn default() -> Self {
        CommunicationQuality {
            avg_response_ms: 0.0,
            max_response_ms: 0.0,
            min_response_ms: f32::MAX,
            timeout_count: 0,
            checksum_error_count: 0,
            total_commands: 0,
            success_commands: 0,
            quality_score: 100.0,
            stable: false,
            last_update: None,
        }
    }
}

impl CommunicationQuality {
    /// Record a successful transaction with its response latency, then
    /// recompute the score.
    pub fn record_success(&mut self, latency: Duration, consecutive_errors: u32, now: Instant) {
        let ms = latency.as_secs_f32() * 1000.0;
        self.total_commands += 1;
        self.success_commands += 1;
        if self.avg_response_ms == 0.0 {
            self.avg_response_ms = ms;
        } else {
            self.avg_response_ms = self.avg_response_ms * EWMA_OLD_WEIGHT + ms * EWMA_NEW_WEIGHT;
        }
        self.max_response_ms = self.max_response_ms.max(ms);
        self.min_response_ms = self.min_response_ms.min(ms);
        self.last_update = Some(now);
        self.recompute(consecutive_errors);
    }

    /// Record a failed transaction, tallying timeout/checksum failures,
    /// then recompute the score.
    pub fn record_failure(&mut self, kind: ErrorKind, consecutive_errors: u32, now: Instant) {
        self.total_commands += 1;
        match kind {
            ErrorKind::Timeout => self.timeout_count += 1,
            ErrorKind::Checksum => self.checksum_error_count += 1,
            _ => {}
        }
        self.last_update = Some(now);
        self.recompute(consecutive_errors);
    }

    /// Recompute `quality_score` and `stable`.
    ///
    /// score = success rate − timeout penalty − checksum penalty −
    /// latency penalty, floored at 0 (the success-rate term caps the
    /// top at 100).
    fn recompute(&mut self, consecutive_errors: u32) {
        if self.total_commands == 0 {
            self.quality_score = 100.0;
            self.stable = false;
            return;
        }
        let total = self.total_commands as f32;
        let success_rate = self.success_commands as f32 / total * 100.0;
        let timeout_penalty = (self.timeout_count as f32 / total * 200.0).min(30.0);
        let checksum_penalty = (self.checksum_error_count as f32 / total * 150.0).min(20.0);
        let latency_penalty =
            ((self.avg_response_ms - LATENCY_PENALTY_FLOOR_MS) / 100.0).clamp(0.0, 20.0);

        self.quality_score =
            (success_rate - timeout_penalty - checksum_penalty - latency_penalty).clamp(0.0, 100.0);
        self.stable = self.quality_score > 80.0
            && consecutive_errors < RECOVERY_CONSECUTIVE_ERRORS
            && self.avg_response_ms < 2000.0;
    }

    /// Whether the score alone warrants a proactive recovery pass.
    pub fn needs_recovery(&self) -> bool {
        self.total_commands >= RECOVERY_SCORE_MIN_SAMPLES
            && self.quality_score < RECOVERY_SCORE_THRESHOLD
    }
}

// ---------------------------------------------------------------------------
// Error recovery state
// ---------------------------------------------------------------------------

/// State of the engine's recovery machinery.
#[derive(Debug, Clone)]
pub struct ErrorRecoveryState {
    /// Failures since the last success. Any single success resets this
    /// to zero regardless of the prior streak.
    pub consecutive_errors: u32,
    /// Recovery passes that ended in failure since the last full reset.
    pub recovery_attempts: u32,
    /// When recovery last ran.
    pub last_recovery: Option<Instant>,
    /// Whether a recovery pass is currently executing (suppresses
    /// re-entrant triggers).
    pub in_recovery: bool,
    /// Response timeout widened by repeated recovery attempts.
    pub adaptive_timeout: Duration,
    /// The configured base timeout the adaptive value grows from.
    base_timeout: Duration,
}

impl ErrorRecoveryState {
    /// Create recovery state around the configured response timeout.
    pub fn new(base_timeout: Duration) -> Self {
        ErrorRecoveryState {
            consecutive_errors: 0,
            recovery_attempts: 0,
            last_recovery: None,
            in_recovery: false,
            adaptive_timeout: base_timeout,
            base_timeout,
        }
    }

    /// Record a transaction success.
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Record a transaction failure.
    pub fn record_failure(&mut self) {
        self.consecutive_errors += 1;
    }

    /// Whether the consecutive-failure streak warrants recovery.
    pub fn needs_recovery(&self) -> bool {
        !self.in_recovery && self.consecutive_errors >= RECOVERY_CONSECUTIVE_ERRORS
    }

    /// Widen the adaptive timeout after a failed recovery, capped at
    /// three times the configured base.
    pub fn widen_timeout(&mut self) {
        let widened = self.adaptive_timeout + self.base_timeout / 2;
        let cap = self.base_timeout * 3;
        self.adaptive_timeout = widened.min(cap);
    }

    /// Whether the failed-recovery budget is spent and a full engine
    /// reset is due.
    pub fn reset_due(&self) -> bool {
        self.recovery_attempts >= MAX_RECOVERY_ATTEMPTS
    }

    /// Return to the pristine post-construction state (full reset).
    pub fn reset(&mut self) {
        *self = ErrorRecoveryState::new(self.base_timeout);
    }
}
