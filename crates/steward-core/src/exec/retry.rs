//! Abort-aware polling and retry helpers.
//!
//! Two families. Probes (`do_with_*_timeout`) repeatedly evaluate a boolean
//! condition until it holds or the overall deadline passes, reporting the
//! final answer without error. Actions (`run_with_*_retries`) re-run a
//! fallible operation within a deadline; once the budget is spent one final
//! attempt is made and its outcome propagates verbatim.
//!
//! All waiting goes through [`RunnableTask::wait_for`], so an abort of the
//! tree interrupts any sleep and surfaces as `Cancelled`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::StewardError;

use super::runnable::RunnableTask;

/// Cap applied to the growing delay of the exponential helpers.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential delay for the given zero-based attempt, with jitter.
///
/// Doubles per attempt from `base`, capped at `max`, then jittered down by up
/// to 25% so herds of waiters do not probe in lockstep.
fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exp = attempt.min(31);
    let raw = base.saturating_mul(1u32 << exp).min(max);
    let jitter = rand::thread_rng().gen_range(0.75..=1.0);
    raw.mul_f64(jitter)
}

/// Poll `probe` at a fixed interval until it reports true or `timeout`
/// elapses. Returns `Ok(false)` on deadline, never an elapsed-time error; a
/// probe error or an abort of the tree propagates immediately.
pub async fn do_with_const_timeout<F, Fut>(
    runnable: &RunnableTask,
    mut probe: F,
    interval: Duration,
    timeout: Duration,
) -> Result<bool, StewardError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<bool, StewardError>> + Send,
{
    let deadline = Instant::now() + timeout;
    loop {
        if probe().await? {
            return Ok(true);
        }
        if Instant::now() + interval > deadline {
            return Ok(false);
        }
        runnable.wait_for(interval).await?;
    }
}

/// Like [`do_with_const_timeout`] but the interval starts at `base` and
/// doubles per attempt, capped at [`MAX_BACKOFF`].
pub async fn do_with_exponential_timeout<F, Fut>(
    runnable: &RunnableTask,
    mut probe: F,
    base: Duration,
    timeout: Duration,
) -> Result<bool, StewardError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<bool, StewardError>> + Send,
{
    let deadline = Instant::now() + timeout;
    let mut attempt: u32 = 0;
    loop {
        if probe().await? {
            return Ok(true);
        }
        let delay = backoff_delay(base, MAX_BACKOFF, attempt);
        if Instant::now() + delay > deadline {
            return Ok(false);
        }
        runnable.wait_for(delay).await?;
        attempt += 1;
    }
}

/// Re-run `operation` at a fixed interval until it succeeds or `timeout`
/// elapses, then make one final attempt past the budget. The final attempt's
/// outcome propagates unchanged; a cancellation is never retried.
pub async fn run_with_const_retries<F, Fut>(
    runnable: &RunnableTask,
    mut operation: F,
    interval: Duration,
    timeout: Duration,
) -> Result<(), StewardError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<(), StewardError>> + Send,
{
    let deadline = Instant::now() + timeout;
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                if Instant::now() + interval > deadline {
                    debug!(%err, attempt, "retry budget spent, making the final attempt");
                    break;
                }
                attempt += 1;
                debug!(%err, attempt, "operation failed, retrying");
                runnable.wait_for(interval).await?;
            }
        }
    }
    operation().await
}

/// Like [`run_with_const_retries`] with a doubling, capped, jittered delay.
pub async fn run_with_exponential_retries<F, Fut>(
    runnable: &RunnableTask,
    mut operation: F,
    base: Duration,
    timeout: Duration,
) -> Result<(), StewardError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<(), StewardError>> + Send,
{
    let deadline = Instant::now() + timeout;
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                let delay = backoff_delay(base, MAX_BACKOFF, attempt);
                if Instant::now() + delay > deadline {
                    debug!(%err, attempt, "retry budget spent, making the final attempt");
                    break;
                }
                attempt += 1;
                debug!(%err, attempt, "operation failed, retrying with backoff");
                runnable.wait_for(delay).await?;
            }
        }
    }
    operation().await
}
