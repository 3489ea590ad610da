//! Utility functions and helpers
//!
//! Clocks, ISO-8601 handling, cancellable task handles and guarded callback
//! invocation.

pub mod task;
pub mod time;

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{error, warn};

pub use task::ScheduledTask;
pub use time::{format_iso8601, parse_iso8601, AnchoredClock, Clock, ManualClock, SystemClock};

/// Result returned by user-supplied callbacks
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Invoke a user callback, containing both returned errors and panics
///
/// Returns `true` when the callback completed successfully. Failures are
/// logged with `context` so one misbehaving callback never blocks the next.
pub fn invoke_guarded<F>(context: &str, callback: F) -> bool
where
    F: FnOnce() -> HandlerResult,
{
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(context, error = %e, "callback failed");
            false
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(context, panic = %message, "callback panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_guarded_contains_failures() {
        assert!(invoke_guarded("ok", || Ok(())));
        assert!(!invoke_guarded("err", || Err("boom".into())));
        assert!(!invoke_guarded("panic", || panic!("boom")));
    }
}
