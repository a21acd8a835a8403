use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span};

use crate::bank::TransactionQueue;
use crate::model::{Event, Operation};

/// What a cashier does with the operations it dequeues.
pub trait Executor: Send + Sync + 'static {
    /// Run `op` to completion and describe its outcome.
    fn execute(&self, op: Operation) -> Event;

    /// Report an outcome to the bank's observers.
    fn publish(&self, event: &Event);
}

/// One worker of the cashier pool.
#[derive(Debug)]
pub struct Cashier {
    id: usize,
    handle: JoinHandle<()>,
}

impl Cashier {
    /// Start a cashier loop on the current tokio runtime.
    pub fn spawn<E: Executor>(id: usize, queue: Arc<TransactionQueue>, executor: Arc<E>) -> Self {
        let handle = tokio::spawn(run(queue, executor).instrument(info_span!("cashier", id)));
        Self { id, handle }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn into_handle(self) -> JoinHandle<()> {
        self.handle
    }
}

/// Dequeue and serve operations until the queue is closed and drained.
async fn run<E: Executor>(queue: Arc<TransactionQueue>, executor: Arc<E>) {
    while let Some(op) = queue.dequeue().await {
        serve(executor.as_ref(), op);
    }
    debug!("queue closed, cashier leaving");
}

/// Serve a single operation. A panic is contained here so the loop keeps going.
fn serve<E: Executor>(executor: &E, op: Operation) {
    let operation = op.kind();
    let event = match panic::catch_unwind(AssertUnwindSafe(|| executor.execute(op))) {
        Ok(event) => event,
        Err(payload) => {
            let reason = panic_reason(payload.as_ref());
            error!(operation, reason = %reason, "operation panicked, discarding it");
            Event::OperationFailed { operation, reason }
        }
    };
    executor.publish(&event);
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use std::sync::Mutex;

    /// Records executed clients; client 13 is cursed and panics.
    #[derive(Default)]
    struct Recorder {
        executed: Mutex<Vec<u32>>,
        published: Mutex<Vec<String>>,
    }

    impl Executor for Recorder {
        fn execute(&self, op: Operation) -> Event {
            let Operation::Deposit {
                client,
                currency,
                amount,
            } = op
            else {
                unreachable!("tests only submit deposits")
            };
            if client == 13 {
                panic!("cursed client");
            }
            self.executed.lock().unwrap().push(client);
            Event::Deposited {
                client,
                currency,
                amount,
            }
        }

        fn publish(&self, event: &Event) {
            self.published.lock().unwrap().push(event.to_string());
        }
    }

    fn deposit(client: u32) -> Operation {
        Operation::Deposit {
            client,
            currency: "USD".to_string(),
            amount: Amount::new(10.0),
        }
    }

    #[tokio::test]
    async fn single_cashier_serves_in_fifo_order() {
        let queue = Arc::new(TransactionQueue::new());
        let recorder = Arc::new(Recorder::default());
        for client in 1..=5 {
            queue.enqueue(deposit(client)).unwrap();
        }

        let cashier = Cashier::spawn(0, queue.clone(), recorder.clone());
        queue.close();
        cashier.into_handle().await.unwrap();

        assert_eq!(*recorder.executed.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn panicking_operation_does_not_stop_the_cashier() {
        let queue = Arc::new(TransactionQueue::new());
        let recorder = Arc::new(Recorder::default());
        queue.enqueue(deposit(1)).unwrap();
        queue.enqueue(deposit(13)).unwrap();
        queue.enqueue(deposit(2)).unwrap();

        let cashier = Cashier::spawn(0, queue.clone(), recorder.clone());
        queue.close();
        cashier.into_handle().await.unwrap();

        assert_eq!(*recorder.executed.lock().unwrap(), vec![1, 2]);
        assert_eq!(
            *recorder.published.lock().unwrap(),
            vec![
                "client 1 deposited 10 USD",
                "deposit discarded: cursed client",
                "client 2 deposited 10 USD",
            ]
        );
    }

    #[test]
    fn panic_reason_from_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("static reason");
        assert_eq!(panic_reason(payload.as_ref()), "static reason");

        let payload: Box<dyn Any + Send> = Box::new(format!("formatted {}", 1));
        assert_eq!(panic_reason(payload.as_ref()), "formatted 1");

        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_reason(payload.as_ref()), "unknown panic");
    }
}
