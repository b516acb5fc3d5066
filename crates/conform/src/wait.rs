//! Drift-free polling waits
//!
//! Both waits schedule each cycle at a multiple of the interval measured from
//! the start of the wait, so slow predicates do not push later polls back.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ConformError, ConformResult};
use crate::ledger::Ledger;

/// Shortest accepted poll interval
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Status update interval for unconditional delays
pub const DELAY_UPDATE_INTERVAL_MS: u64 = 500;

/// Test name timeouts are recorded under
const TIMEOUT_TEST_NAME: &str = "WaitUntil";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    Cancelled,
}

/// Poll `predicate` until it returns false.
///
/// The wait is allowed `timeout_s` seconds plus two poll intervals. Running
/// out of time records an Issue and returns `ConformError::WaitTimeout`; a
/// predicate error is returned as is.
pub async fn wait_while<F, Fut>(
    label: &str,
    mut predicate: F,
    poll_ms: u64,
    timeout_s: u64,
    cancel: &CancellationToken,
    ledger: &mut Ledger,
) -> ConformResult<WaitOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ConformResult<bool>>,
{
    if poll_ms < MIN_POLL_INTERVAL_MS {
        return Err(ConformError::InvalidValue(format!(
            "The poll interval must be >=100ms: {}",
            poll_ms
        )));
    }

    ledger.set_status(&format!(
        "Waiting for the {} operation to complete: 0.0 / {:.1} seconds",
        label, timeout_s as f64
    ));

    let start = Instant::now();
    let budget = Duration::from_secs(timeout_s) + Duration::from_millis(2 * poll_ms);

    loop {
        if cancel.is_cancelled() {
            ledger.set_status("");
            return Ok(WaitOutcome::Cancelled);
        }

        let waiting = match predicate().await {
            Ok(waiting) => waiting,
            Err(e) => {
                ledger.set_status("");
                return Err(e);
            }
        };
        if !waiting {
            break;
        }

        let elapsed = start.elapsed();
        if elapsed >= budget {
            return Err(timed_out(label, timeout_s, ledger));
        }

        let loop_number = (elapsed.as_millis() as u64 + 50) / poll_ms;
        let next = (start + Duration::from_millis(poll_ms * (loop_number + 1))).min(start + budget);
        debug!(label, loop_number, "waiting");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                ledger.set_status("");
                return Ok(WaitOutcome::Cancelled);
            }
            _ = sleep_until(next) => {}
        }
        if start.elapsed() >= budget {
            return Err(timed_out(label, timeout_s, ledger));
        }

        ledger.set_status(&format!(
            "Waiting for the {} operation to complete: {:.1} / {:.1} seconds",
            label,
            (loop_number + 1) as f64 * poll_ms as f64 / 1000.0,
            timeout_s as f64
        ));
    }

    ledger.set_status("");
    Ok(WaitOutcome::Completed)
}

/// Record the timeout Issue and build the fault that ends the plan
fn timed_out(label: &str, timeout_s: u64, ledger: &mut Ledger) -> ConformError {
    ledger.issue(
        TIMEOUT_TEST_NAME,
        &format!("The {} operation timed out after {} seconds.", label, timeout_s),
        None,
    );
    ledger.set_status("");
    ConformError::WaitTimeout {
        action: label.to_string(),
        seconds: timeout_s,
    }
}

/// Wait the full `duration_ms` unless the run is cancelled first
pub async fn wait_for(
    duration_ms: u64,
    purpose: &str,
    cancel: &CancellationToken,
    ledger: &mut Ledger,
) -> WaitOutcome {
    if duration_ms == 0 {
        return WaitOutcome::Completed;
    }

    let interval = DELAY_UPDATE_INTERVAL_MS.min(duration_ms);
    let total = duration_ms as f64 / 1000.0;
    ledger.set_status(&format!("Waiting for {} - 0.0 / {:.1} seconds", purpose, total));

    let start = Instant::now();
    let end = start + Duration::from_millis(duration_ms);

    while Instant::now() < end {
        let elapsed = start.elapsed().as_millis() as u64;
        let loop_number = (elapsed + 50) / interval;
        let next = (start + Duration::from_millis(interval * (loop_number + 1))).min(end);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                ledger.set_status("");
                return WaitOutcome::Cancelled;
            }
            _ = sleep_until(next) => {}
        }

        ledger.set_status(&format!(
            "Waiting for {} - {:.1} / {:.1} seconds",
            purpose,
            ((loop_number + 1) * interval).min(duration_ms) as f64 / 1000.0,
            total
        ));
    }

    ledger.set_status("");
    WaitOutcome::Completed
}
