//! First-win fan-in for concurrent requests to backing servers.

use tokio::task::JoinSet;

use crate::error::{RouterError, RouterResult};

/// Returns the first non-empty successful result from a JoinSet of concurrent requests.
///
/// Iterates through completed futures in arrival order and aborts the
/// remaining tasks as soon as one result passes `is_nonempty`.
///
/// When nothing wins: `Ok(None)` if at least one server answered (with an
/// empty result), otherwise the first failure. A server answering "nothing
/// here" is a normal outcome; a request nobody could answer is not.
pub(super) async fn first_win<T: Send + 'static>(
    join_set: &mut JoinSet<RouterResult<T>>,
    is_nonempty: impl Fn(&T) -> bool,
) -> RouterResult<Option<T>> {
    let mut answered = false;
    let mut first_error: Option<RouterError> = None;

    while let Some(result) = join_set.join_next().await {
        match result {
            Ok(Ok(value)) if is_nonempty(&value) => {
                join_set.abort_all();
                return Ok(Some(value));
            }
            Ok(Ok(_)) => answered = true,
            Ok(Err(err)) => {
                log::debug!(target: "razor_router::router", "Fan-out request failed: {}", err);
                first_error.get_or_insert(err);
            }
            Err(join_error) => {
                log::warn!(target: "razor_router::router", "Fan-out task failed: {}", join_error);
            }
        }
    }

    match first_error {
        Some(err) if !answered => Err(err),
        _ => Ok(None),
    }
}
