//! Bounded retry with resumption state
//!
//! An attempt that fails hands back the most recent checkpoint it reached; the
//! next attempt starts from that checkpoint instead of from scratch. Between
//! attempts the loop sleeps with exponential backoff and jitter.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::Error;

/// A failed attempt together with the state it reached
#[derive(Debug)]
pub struct Interrupted<C> {
    pub error: Error,
    /// Most recent checkpoint; `None` if the attempt failed before producing one
    pub checkpoint: Option<C>,
}

impl<C> Interrupted<C> {
    pub fn new(error: Error, checkpoint: Option<C>) -> Self {
        Self { error, checkpoint }
    }
}

impl<C> From<Error> for Interrupted<C> {
    fn from(error: Error) -> Self {
        Self {
            error,
            checkpoint: None,
        }
    }
}

/// Final failure of a retry loop
#[derive(Debug)]
pub struct RetryFailure<C> {
    /// Number of attempts made
    pub attempts: u32,
    /// Error of the last attempt
    pub error: Error,
    /// Checkpoint left by the last attempt
    pub checkpoint: Option<C>,
}

/// Run `operation` until it succeeds, the budget is spent, or a failure is not resumable
///
/// `operation` receives the checkpoint of the previous failed attempt (`None` on the
/// first attempt) and must return the latest checkpoint it holds when it fails.
///
/// # Example
/// ```ignore
/// let receipt = retry_resumable(
///     &config,
///     |checkpoint| engine.attempt(&task, checkpoint),
///     is_resumable_error,
/// ).await?;
/// ```
pub async fn retry_resumable<T, C, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    is_resumable: R,
) -> Result<T, RetryFailure<C>>
where
    F: FnMut(Option<C>) -> Fut,
    Fut: std::future::Future<Output = Result<T, Interrupted<C>>>,
    R: Fn(&Error) -> bool,
{
    let mut attempt = 0;
    let mut checkpoint: Option<C> = None;

    loop {
        attempt += 1;

        match operation(checkpoint.take()).await {
            Ok(result) => return Ok(result),
            Err(Interrupted {
                error,
                checkpoint: latest,
            }) => {
                if attempt >= config.max_attempts || !is_resumable(&error) {
                    return Err(RetryFailure {
                        attempts: attempt,
                        error,
                        checkpoint: latest,
                    });
                }

                let backoff = calculate_backoff(config, attempt);
                tracing::debug!(
                    attempt = attempt,
                    backoff_ms = backoff.as_millis(),
                    resumable = latest.is_some(),
                    error = %error,
                    "Retrying after failure"
                );

                checkpoint = latest;
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Calculate backoff duration with jitter
fn calculate_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    // Exponential backoff: initial * 2^(attempt-1)
    let base_ms = config.initial_backoff_ms * (1u64 << (attempt - 1).min(10));
    let capped_ms = base_ms.min(config.max_backoff_ms);

    let jitter_ms = rand_jitter(capped_ms);
    Duration::from_millis(capped_ms + jitter_ms)
}

/// Generate pseudo-random jitter without external RNG dependency
fn rand_jitter(max: u64) -> u64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    nanos % max.max(1)
}

/// Check if a failure inside a multipart attempt may be resumed
pub fn is_resumable_error(error: &Error) -> bool {
    match error {
        Error::Network(_) | Error::General(_) => true,
        Error::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::WouldBlock
        ),
        // The upload itself is gone or the input is unusable; retrying cannot help
        Error::NotFound(_)
        | Error::LocalPathNotFound(_)
        | Error::InvalidPath(_)
        | Error::Conflict(_)
        | Error::Config(_)
        | Error::ConfigNotFound(_)
        | Error::MissingArgument(_)
        | Error::UploadExhausted { .. } => false,
    }
}
