//! Background loops: reconciler tick, relay drain and suggestion expiry.
//!
//! Each loop is its own task. A loop starts its next run only after the
//! previous one finished, and every loop stops on the shared shutdown signal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    config::Timings, reconciler::Nudge, reconciler::Reconciler, relay::Relay,
    suggestions::SuggestionService,
};

pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(
        reconciler: Arc<Reconciler>,
        relay: Relay,
        suggestions: Arc<SuggestionService>,
        timings: &Timings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let nudge = reconciler.nudger();
        let reconcile = spawn_periodic(
            "reconciler",
            timings.reconcile_interval(),
            Some(nudge),
            shutdown.clone(),
            move || {
                let reconciler = reconciler.clone();
                async move {
                    if let Err(e) = reconciler.tick(Utc::now()).await {
                        warn!(error = %e, "reconcile tick failed");
                    }
                }
            },
        );

        let drain = spawn_periodic(
            "relay",
            timings.drain_interval(),
            None,
            shutdown.clone(),
            move || {
                let relay = relay.clone();
                async move {
                    if let Err(e) = relay.drain().await {
                        warn!(error = %e, "relay drain failed");
                    }
                }
            },
        );

        let expiry = spawn_periodic(
            "suggestion-expiry",
            timings.suggestion_expiry_interval(),
            None,
            shutdown,
            move || {
                let suggestions = suggestions.clone();
                async move {
                    if let Err(e) = suggestions.expire(Utc::now()).await {
                        warn!(error = %e, "suggestion expiry failed");
                    }
                }
            },
        );

        Self {
            handles: vec![reconcile, drain, expiry],
        }
    }

    /// Wait for every loop to observe shutdown and return.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "background loop panicked");
            }
        }
    }
}

/// Run `job` every `period` (and whenever `wake` fires) until shutdown.
///
/// The first run happens immediately. Missed ticks are delayed, not burst.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    wake: Option<Nudge>,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(task = name, ?period, "background loop started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = async {
                    match &wake {
                        Some(nudge) => nudge.notified().await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    debug!(task = name, "woken early");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
            job().await;
        }
        info!(task = name, "background loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn periodic_runs_until_shutdown() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(false);
        let counter = runs.clone();
        let handle = spawn_periodic("test", Duration::from_secs(5), None, rx, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        tx.send(true).unwrap();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn nudge_triggers_an_early_run() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(false);
        let nudge = Nudge::new();
        let counter = runs.clone();
        let handle = spawn_periodic(
            "test",
            Duration::from_secs(60),
            Some(nudge.clone()),
            rx,
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        nudge.nudge();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
