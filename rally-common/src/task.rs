// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Task spawning and shutdown management.
//!
//! Long-running components implement [`Runnable`] and are driven until the shutdown signal
//! distributed by a [`ShutdownBus`] resolves.

use std::future::Future;

use tokio::sync::oneshot;

/// Receiving half of a shutdown signal.
pub type ShutdownRx = oneshot::Receiver<()>;
type ShutdownTx = oneshot::Sender<()>;

/// A long-running component driven by the runtime until cancelled.
#[async_trait::async_trait]
pub trait Runnable {
    /// Name under which the task is logged.
    const NAME: &'static str;

    /// Future that resolves when the task must wind down.
    type Cancel: Future + Send + Unpin + 'static;

    /// Runs the component until completion or cancellation.
    async fn run(self, cancel: Self::Cancel);
}

/// Spawns runnables and plain futures onto the tokio runtime.
pub struct Spawner {}

impl Spawner {
    /// Spawns a [`Runnable`] tied to a shutdown signal.
    pub fn spawn_runnable<R>(runnable: R, cancel: ShutdownRx)
    where
        R: Runnable<Cancel = ShutdownRx> + Send + 'static,
    {
        log::info!("Running `{}`.", R::NAME);

        tokio::spawn(runnable.run(cancel));
    }

    /// Spawns a named future.
    pub fn spawn<F>(fut: F, task_name: &str)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        log::info!("Spawning `{}` task.", task_name);

        tokio::spawn(fut);
    }
}

/// Fans a single shutdown trigger out to every registered task.
#[derive(Default)]
pub struct ShutdownBus {
    senders: Vec<ShutdownTx>,
}

impl ShutdownBus {
    /// Creates an empty shutdown bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task and returns the receiving half of its shutdown signal.
    pub fn register(&mut self) -> ShutdownRx {
        let (tx, rx) = oneshot::channel::<()>();
        self.senders.push(tx);
        rx
    }

    /// Triggers the shutdown of all registered tasks.
    pub fn trigger(self) {
        for s in self.senders {
            // A task that already terminated has dropped its receiver.
            s.send(()).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bus_reaches_every_registree() {
        let mut bus = ShutdownBus::new();
        let first = bus.register();
        let second = bus.register();

        bus.trigger();

        assert!(first.await.is_ok());
        assert!(second.await.is_ok());
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_block_trigger() {
        let mut bus = ShutdownBus::new();
        drop(bus.register());
        let kept = bus.register();

        bus.trigger();

        assert!(kept.await.is_ok());
    }
}
