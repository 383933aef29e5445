//! Observability for roomlink sessions.
//!
//! All instrumentation uses `tracing` with per-component targets and never
//! records SDP bodies or candidate strings, only their lengths. Metric labels
//! are bounded:
//! - `role`: 2 values (initiator, responder)
//! - `outcome`: 3 values (success, retry, exhausted)
//! - `stage`: bounded by negotiation steps
//! - `operation`: bounded by store operations
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `roomlink_sessions_active` | Gauge | none | Running session actors |
//! | `roomlink_reconnect_attempts_total` | Counter | `outcome` | Store reconnection attempts |
//! | `roomlink_negotiations_completed_total` | Counter | `role` | Offer/answer exchanges completed |
//! | `roomlink_negotiation_failures_total` | Counter | `stage` | Rejected or failed negotiation steps |
//! | `roomlink_store_errors_total` | Counter | `operation` | Failed store operations |
//! | `roomlink_remote_hangups_total` | Counter | none | Remote peers that hung up |

pub mod metrics;

pub use metrics::{
    record_negotiation_completed, record_negotiation_failure, record_reconnect_attempt,
    record_remote_hangup, record_store_error, session_ended, session_started,
};
