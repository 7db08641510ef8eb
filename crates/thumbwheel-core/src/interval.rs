//! Start/stoppable periodic driver
//!
//! One background task per `Interval`, created once. While stopped the task
//! is parked on a watch channel and costs nothing; `start()` wakes it.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct Interval {
    running: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Interval {
    /// Create a stopped interval that will call `callback` once per `delay`
    /// while running. Must be called from within a tokio runtime.
    pub fn new<F>(delay: Duration, callback: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (running, rx) = watch::channel(false);
        let handle = tokio::spawn(drive(delay, callback, rx));
        Self { running, handle }
    }

    /// Begin ticking; the first call happens immediately. No-op when running.
    pub fn start(&self) {
        self.running.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        });
    }

    /// Park the driver. No-op when already stopped.
    pub fn stop(&self) {
        self.running.send_if_modified(|running| {
            if *running {
                *running = false;
                true
            } else {
                false
            }
        });
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }
}

impl Drop for Interval {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn drive<F>(delay: Duration, callback: F, mut rx: watch::Receiver<bool>)
where
    F: Fn() + Send + 'static,
{
    loop {
        if rx.wait_for(|running| *running).await.is_err() {
            return;
        }
        tracing::trace!(delay_ms = delay.as_millis() as u64, "interval started");

        let mut ticker = tokio::time::interval(delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !*rx.borrow_and_update() {
                        tracing::trace!("interval parked");
                        break;
                    }
                }

                _ = ticker.tick() => callback(),
            }
        }
    }
}
