use std::{fmt::Display, future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Keep calling `connect` until it succeeds, backing off exponentially between
/// attempts. With `max_attempts` set, the last error is returned once they are used up.
pub async fn connect_with_backoff<F, Fut, T, E>(
    max_attempts: Option<u32>,
    mut connect: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delay = INITIAL_DELAY;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match connect().await {
            Ok(store) => {
                if attempt > 1 {
                    info!(attempt, "storage connection established after retrying");
                }
                return Ok(store);
            }
            Err(err) => {
                if max_attempts.is_some_and(|max| attempt >= max) {
                    warn!(attempt, error = %err, "exhausted storage connection attempts");
                    return Err(err);
                }
                warn!(attempt, error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}
