//! Background expiry sweep for the memory backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A store that can drop its expired records.
pub trait Sweep: Send + Sync + 'static {
    /// Store name for logging.
    fn name(&self) -> &'static str;

    /// Remove expired records. Returns how many were removed.
    fn sweep(&self) -> usize;
}

/// Run `targets`' sweeps every `period` until `cancel` fires.
pub fn spawn_sweeper(
    targets: Vec<Arc<dyn Sweep>>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            stores = targets.len(),
            interval_secs = period.as_secs(),
            "Memory expiry sweeper started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    for target in &targets {
                        let removed = target.sweep();
                        if removed > 0 {
                            debug!(store = target.name(), removed, "Swept expired records");
                        }
                    }
                }
            }
        }

        debug!("Memory expiry sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl Sweep for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn sweep(&self) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_on_interval_until_cancelled() {
        let target = Arc::new(Counting(AtomicUsize::new(0)));
        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            vec![target.clone() as Arc<dyn Sweep>],
            Duration::from_secs(10),
            cancel.clone(),
        );

        time::sleep(Duration::from_secs(25)).await;
        assert_eq!(target.0.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(target.0.load(Ordering::SeqCst), 2);
    }
}
