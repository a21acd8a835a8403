use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::bank::BankError;
use crate::model::Operation;

/// Unbounded FIFO of pending operations shared by every cashier.
///
/// Enqueueing never waits for a consumer, so producers that outpace the
/// cashiers grow the queue without bound.
/// Each operation is handed to exactly one `dequeue` caller.
#[derive(Debug)]
pub struct TransactionQueue {
    sender: Mutex<Option<UnboundedSender<Operation>>>,
    receiver: tokio::sync::Mutex<UnboundedReceiver<Operation>>,
    pending: AtomicUsize,
}

impl TransactionQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            pending: AtomicUsize::new(0),
        }
    }

    pub fn enqueue(&self, op: Operation) -> Result<(), BankError> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = sender.as_ref().ok_or(BankError::ShuttingDown)?;
        // counted before the send so a fast dequeue never underflows
        self.pending.fetch_add(1, Ordering::SeqCst);
        sender.send(op).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            BankError::ShuttingDown
        })
    }

    /// Wait for the next operation.
    ///
    /// Returns `None` once the queue is closed and every queued operation
    /// has been handed out. The receiver lock is released before returning,
    /// so the caller runs the operation without blocking other consumers.
    pub async fn dequeue(&self) -> Option<Operation> {
        let op = self.receiver.lock().await.recv().await?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(op)
    }

    /// Stop accepting operations. Already queued operations stay available.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Operations enqueued but not yet dequeued.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl Default for TransactionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn deposit(client: u32) -> Operation {
        Operation::Deposit {
            client,
            currency: "USD".to_string(),
            amount: Amount::new(1.0),
        }
    }

    #[tokio::test]
    async fn fifo_order() {
        let queue = TransactionQueue::new();
        for client in 1..=3 {
            queue.enqueue(deposit(client)).unwrap();
        }
        assert_eq!(queue.pending(), 3);

        assert_eq!(queue.dequeue().await, Some(deposit(1)));
        assert_eq!(queue.dequeue().await, Some(deposit(2)));
        assert_eq!(queue.dequeue().await, Some(deposit(3)));
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = TransactionQueue::new();
        queue.enqueue(deposit(1)).unwrap();
        queue.close();

        assert!(matches!(
            queue.enqueue(deposit(2)),
            Err(BankError::ShuttingDown)
        ));
        assert_eq!(queue.dequeue().await, Some(deposit(1)));
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn each_operation_is_delivered_once() {
        let queue = Arc::new(TransactionQueue::new());

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    while let Some(Operation::Deposit { client, .. }) = queue.dequeue().await {
                        seen.push(client);
                    }
                    seen
                })
            })
            .collect();

        let producers: Vec<_> = (0..4u32)
            .map(|p| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for i in 0..250 {
                        queue.enqueue(deposit(p * 1_000 + i)).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        queue.close();

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 1_000);
        assert_eq!(unique.len(), 1_000);
    }
}
