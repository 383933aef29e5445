//! Polling helpers for assertions on asynchronous session behavior.
//!
//! Sessions apply store deliveries on their own task, so tests wait for an
//! observable condition instead of sleeping a fixed amount. The clock used is
//! `tokio::time`, which keeps these helpers usable under paused time.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Categories of waits with a maximum timeout each.
#[derive(Debug, Clone, Copy)]
pub enum WaitCategory {
    /// A command round trip through the session mailbox.
    Mailbox,

    /// A full offer/answer/candidate exchange.
    Negotiation,

    /// A whole reconnection loop with default backoff (2+4+8+16+30s, doubled).
    Reconnection,
}

impl WaitCategory {
    /// Maximum time to wait for this category.
    pub fn timeout(&self) -> Duration {
        match self {
            WaitCategory::Mailbox => Duration::from_secs(1),
            WaitCategory::Negotiation => Duration::from_secs(5),
            WaitCategory::Reconnection => Duration::from_secs(120),
        }
    }

    /// Initial poll delay.
    fn initial_delay(&self) -> Duration {
        Duration::from_millis(5)
    }

    /// Poll delay ceiling.
    fn max_delay(&self) -> Duration {
        match self {
            WaitCategory::Mailbox | WaitCategory::Negotiation => Duration::from_millis(50),
            WaitCategory::Reconnection => Duration::from_millis(250),
        }
    }
}

/// Wait until `condition` holds, polling with exponential backoff.
///
/// - Initial delay: 5ms
/// - Exponential multiplier: 2x, capped per category
/// - Gives up once the category timeout has elapsed
///
/// # Errors
///
/// Returns a description of the timeout if the condition never held.
pub async fn eventually<F, Fut>(category: WaitCategory, mut condition: F) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let timeout = category.timeout();
    let mut delay = category.initial_delay();
    let start = Instant::now();

    loop {
        if condition().await {
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(format!(
                "Condition not met within {timeout:?} (category: {category:?})"
            ));
        }

        sleep(delay).await;
        delay = (delay * 2).min(category.max_delay());
    }
}
