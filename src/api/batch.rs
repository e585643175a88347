//! Independent reads issued side by side when a screen mounts.

use super::ApiError;
use std::thread::{self, ScopedJoinHandle};

type Reply<T> = Result<T, ApiError>;

fn joined<T>(handle: ScopedJoinHandle<'_, Reply<T>>) -> Reply<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(ApiError::Transport("request worker panicked".to_string())))
}

/// Runs both reads concurrently and waits for both.
pub fn join2<A, B, FA, FB>(a: FA, b: FB) -> (Reply<A>, Reply<B>)
where
    A: Send,
    B: Send,
    FA: FnOnce() -> Reply<A> + Send,
    FB: FnOnce() -> Reply<B> + Send,
{
    thread::scope(|scope| {
        let b = scope.spawn(b);
        let a = a();
        (a, joined(b))
    })
}

/// Runs three reads concurrently and waits for all of them.
pub fn join3<A, B, C, FA, FB, FC>(a: FA, b: FB, c: FC) -> (Reply<A>, Reply<B>, Reply<C>)
where
    A: Send,
    B: Send,
    C: Send,
    FA: FnOnce() -> Reply<A> + Send,
    FB: FnOnce() -> Reply<B> + Send,
    FC: FnOnce() -> Reply<C> + Send,
{
    thread::scope(|scope| {
        let b = scope.spawn(b);
        let c = scope.spawn(c);
        let a = a();
        (a, joined(b), joined(c))
    })
}
