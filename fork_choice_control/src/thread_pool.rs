use std::sync::mpsc::{channel, Receiver};

use anyhow::Result;
use rayon::ThreadPoolBuilder;

/// A bounded pool for CPU-heavy work.
///
/// Signature batches and long state replays run here so they never block
/// the mutator loop. Results come back over channels and re-enter the loop
/// as ordinary messages.
pub struct ThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool {
    pub fn new() -> Result<Self> {
        // One core is left for the mutator thread and one for the runtime.
        let threads = std::thread::available_parallelism()
            .map(|parallelism| parallelism.get().saturating_sub(2).max(1))
            .unwrap_or(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("offload-{index}"))
            .build()?;

        Ok(Self { pool })
    }

    /// Runs `task` on the pool and returns a receiver for its result.
    ///
    /// Dropping the receiver cancels nothing; the task runs to completion
    /// and its result is discarded.
    pub fn spawn<T: Send + 'static>(
        &self,
        task: impl FnOnce() -> T + Send + 'static,
    ) -> Receiver<T> {
        let (sender, receiver) = channel();

        self.pool.spawn(move || {
            sender.send(task()).ok();
        });

        receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_tasks_deliver_results() -> Result<()> {
        let pool = ThreadPool::new()?;

        let receiver = pool.spawn(|| 6 * 7);

        assert_eq!(receiver.recv()?, 42);

        Ok(())
    }
}
