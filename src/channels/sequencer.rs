//! Per-key FIFO task lanes.
//!
//! Messages from one session must be processed in arrival order, while
//! different sessions proceed concurrently. Each key gets an unbounded
//! lane drained by its own task; enqueueing never blocks the caller.

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct Sequencer {
    lanes: Mutex<HashMap<String, mpsc::UnboundedSender<BoxFuture<'static, ()>>>>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task on the lane for `key`, creating the lane (and its
    /// drainer) on first use. Tasks on one lane run strictly in order.
    pub fn enqueue(&self, key: &str, task: BoxFuture<'static, ()>) {
        let mut lanes = self.lanes.lock();
        let sender = lanes.entry(key.to_string()).or_insert_with(|| {
            let (tx, mut rx) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
            tokio::spawn(async move {
                while let Some(task) = rx.recv().await {
                    task.await;
                }
            });
            tx
        });
        // Send only fails if the drainer died, which only happens at
        // runtime shutdown.
        let _ = sender.send(task);
    }
}
