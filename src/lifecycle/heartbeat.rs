//! Periodic "still alive" log line.

use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time;

pub struct Heartbeat {
    interval: Duration,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Log every interval until the shutdown broadcast fires. A zero interval
    /// returns immediately.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.interval.is_zero() {
            tracing::debug!("Heartbeat disabled");
            return;
        }

        let started = Instant::now();
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!(uptime_secs = started.elapsed().as_secs(), "Server heartbeat <3");
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Heartbeat received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_on_shutdown() {
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(Heartbeat::new(Duration::from_millis(10)).run(rx));

        tokio::time::sleep(Duration::from_millis(35)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn zero_interval_is_disabled() {
        let (_tx, rx) = broadcast::channel(1);
        Heartbeat::new(Duration::ZERO).run(rx).await;
    }
}
