// src/exec/parallel.rs

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run `units` with at most `max_concurrent` running at any moment.
///
/// When the token is cancelled no further units start; units already in
/// flight run to completion (their own cancellation is cooperative, via the
/// signal forwarded to their child processes). Returns once every started
/// unit has returned.
pub async fn bounded_parallel<F>(max_concurrent: usize, token: CancellationToken, units: Vec<F>)
where
    F: Future<Output = ()> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();

    for unit in units {
        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => {
                let Ok(permit) = permit else {
                    break;
                };
                permit
            }
            _ = token.cancelled() => {
                debug!("cancellation requested; not starting further work units");
                break;
            }
        };

        if token.is_cancelled() {
            debug!("cancellation requested; not starting further work units");
            break;
        }

        tasks.spawn(async move {
            unit.await;
            drop(permit);
        });
    }

    while tasks.join_next().await.is_some() {}
}
