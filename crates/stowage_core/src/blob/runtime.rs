//! Sync-over-async bridge for `object_store` calls.

use super::{BlobError, BlobResult};
use std::future::Future;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

/// Drives `make_future` to completion from synchronous code.
///
/// - Inside a multi-thread Tokio runtime the future runs on that runtime
///   through a scoped helper thread.
/// - Inside a current-thread runtime the caller's thread is the only one
///   that can drive its IO and timer drivers, and it is blocked here, so
///   the helper thread builds a private runtime instead.
/// - Outside any runtime a private current-thread runtime is used directly.
pub(crate) fn run_blocking<F, Fut, T>(make_future: F) -> BlobResult<T>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = BlobResult<T>> + Send,
    T: Send,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            on_helper_thread(|| handle.block_on(make_future()))
        }
        Ok(_) => on_helper_thread(|| private_runtime()?.block_on(make_future())),
        Err(_) => private_runtime()?.block_on(make_future()),
    }
}

fn on_helper_thread<T: Send>(work: impl FnOnce() -> BlobResult<T> + Send) -> BlobResult<T> {
    std::thread::scope(|scope| {
        scope
            .spawn(work)
            .join()
            .map_err(|_| BlobError::Runtime("blob worker thread panicked".to_string()))?
    })
}

fn private_runtime() -> BlobResult<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| BlobError::Runtime(format!("failed to start runtime: {err}")))
}

#[cfg(test)]
mod tests {
    use super::run_blocking;
    use std::time::Duration;

    async fn delayed(value: u32) -> crate::blob::BlobResult<u32> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(value)
    }

    #[test]
    fn runs_without_an_ambient_runtime() {
        assert_eq!(run_blocking(|| delayed(1)).unwrap(), 1);
    }

    #[test]
    fn timers_fire_inside_a_current_thread_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let value = runtime.block_on(async { run_blocking(|| delayed(2)) });
        assert_eq!(value.unwrap(), 2);
    }

    #[test]
    fn reuses_a_multi_thread_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let value = runtime.block_on(async { run_blocking(|| delayed(3)) });
        assert_eq!(value.unwrap(), 3);
    }
}
