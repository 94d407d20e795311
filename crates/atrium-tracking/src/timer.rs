//! Per-session evaluation timer
//!
//! Follows the shutdown pattern of a task registry: a `watch` channel
//! signals the loop, which races it against the next tick, and the handle is
//! aborted as a backstop. Dropping the timer cancels it.

use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A recurring task bound to one tracking session.
#[derive(Debug)]
pub struct SessionTimer {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SessionTimer {
    /// Run `tick` on `runtime` every `interval` until cancelled. The first
    /// run happens one interval after spawning.
    pub fn spawn<F, Fut>(runtime: &Handle, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(interval) => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        tick().await;
                    }
                }
            }
        });
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the loop.
    pub fn cancel(self) {}
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let timer = SessionTimer::spawn(&Handle::current(), Duration::from_secs(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(15_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        timer.cancel();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }
}
