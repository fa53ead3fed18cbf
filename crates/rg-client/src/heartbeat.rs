//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Periodic keep-alive task for the device session."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

/// Handle to a running heartbeat. Stopping never waits for the task.
pub struct Heartbeat {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawn a task invoking `tick` every `period`, first after one full period.
    ///
    /// `tick` returns `None` once its owner is gone, which ends the task.
    pub fn spawn<F, Fut, E>(period: Duration, tick: F) -> Self
    where
        F: FnMut() -> Option<Fut> + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(run(period, stopped, tick));
        Self { stop, task }
    }

    pub fn stop(self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run<F, Fut, E>(period: Duration, mut stopped: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Option<Fut>,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            changed = stopped.changed() => {
                if changed.is_err() || *stopped.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if *stopped.borrow() {
                    break;
                }
                let Some(beat) = tick() else {
                    break;
                };
                debug!("heartbeat");
                if let Err(err) = beat.await {
                    error!(error = %err, "heartbeat failed");
                }
            }
        }
    }
    debug!("heartbeat stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let heartbeat = Heartbeat::spawn(Duration::from_secs(3), move || {
            let counter = counter.clone();
            Some(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            })
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "first beat waits a full period");

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        heartbeat.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn ends_when_owner_is_gone() {
        let heartbeat = Heartbeat::spawn(Duration::from_secs(1), || {
            None::<std::future::Ready<Result<(), String>>>
        });
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(heartbeat.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_end_the_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let heartbeat = Heartbeat::spawn(Duration::from_secs(1), move || {
            let counter = counter.clone();
            Some(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("not connected")
            })
        });
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        heartbeat.stop();
    }
}
