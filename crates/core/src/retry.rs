use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use docchat_model::ModelProviderError;

/// Controls how requests failing with a transient error are retried.
///
/// Only errors whose kind is transient (see
/// [`docchat_model::ErrorKind::is_transient`]) are retried, everything
/// else is returned right away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry. Later delays grow exponentially.
    pub initial_interval: Duration,
    /// Upper bound of a single delay.
    pub max_interval: Duration,
    /// Give up once this much time has passed since the first attempt.
    pub max_elapsed_time: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    #[inline]
    pub fn never() -> Self {
        Self {
            max_elapsed_time: Duration::ZERO,
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            max_elapsed_time: Duration::from_secs(30),
        }
    }
}

/// Runs `op` until it succeeds, fails permanently or the policy gives up.
pub(crate) async fn retry_transient<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, E>
where
    E: ModelProviderError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval)
        .with_max_interval(policy.max_interval)
        .with_max_elapsed_time(Some(policy.max_elapsed_time))
        .build();

    backoff::future::retry_notify(
        backoff,
        || {
            let fut = op();
            async move {
                fut.await.map_err(|err| {
                    if err.kind().is_transient() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        },
        |err: E, delay: Duration| {
            warn!("request failed ({err}), retrying in {delay:?}");
        },
    )
    .await
}
