use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::common::{PicoError, Result, IO_QUEUE_DEPTH};

/// A queued I/O task, erased to a closure that delivers its own result.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the eventual result of an enqueued task.
pub struct IoTicket<T> {
    receiver: mpsc::Receiver<Result<T>>,
}

impl<T> IoTicket<T> {
    /// Blocks until the task has run and returns its result.
    pub fn wait(self) -> Result<T> {
        self.receiver
            .recv()
            .map_err(|_| PicoError::IoQueue("task dropped before completion".to_string()))?
    }
}

/// IoQueue dispatches I/O tasks on a fixed pool of worker threads.
///
/// Tasks are picked up in submission order and at most `IO_QUEUE_DEPTH` run
/// at any moment; excess tasks wait in the channel without rejection. A task
/// failure resolves only that task's ticket, the queue keeps running.
pub struct IoQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    started: AtomicBool,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl IoQueue {
    /// Creates the queue without starting it. Tasks enqueued before `start`
    /// accumulate unexecuted.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded::<Job>();

        Self {
            sender,
            receiver,
            started: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a task and returns a ticket for its result.
    pub fn enqueue<T, F>(&self, task: F) -> IoTicket<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();

        let job: Job = Box::new(move || {
            // The receiver may have been dropped by an uninterested caller.
            let _ = tx.send(task());
        });

        // Send only fails once the queue is torn down; the ticket then
        // reports the abandoned task on wait().
        let _ = self.sender.send(job);

        IoTicket { receiver: rx }
    }

    /// Marks the queue ready and spawns the worker pool. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut workers = self.workers.lock();
        for _ in 0..IO_QUEUE_DEPTH {
            let receiver = self.receiver.clone();
            let shutdown = Arc::clone(&self.shutdown);
            workers.push(thread::spawn(move || {
                Self::worker_loop(receiver, shutdown);
            }));
        }
    }

    /// Worker thread body: run jobs until shutdown, then drain what is left.
    fn worker_loop(receiver: Receiver<Job>, shutdown: Arc<AtomicBool>) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                while let Ok(job) = receiver.try_recv() {
                    job();
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(job) => job(),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl Default for IoQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IoQueue {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_io_queue_runs_task() {
        let queue = IoQueue::new();
        queue.start();

        let ticket = queue.enqueue(|| Ok(21 * 2));
        assert_eq!(ticket.wait().unwrap(), 42);
    }

    #[test]
    fn test_io_queue_pending_until_start() {
        let queue = IoQueue::new();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let ticket = queue.enqueue(move || {
            ran_clone.store(true, Ordering::SeqCst);
            Ok(())
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!ran.load(Ordering::SeqCst));

        queue.start();
        ticket.wait().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_io_queue_start_idempotent() {
        let queue = IoQueue::new();
        queue.start();
        queue.start();

        let ticket = queue.enqueue(|| Ok(1));
        assert_eq!(ticket.wait().unwrap(), 1);
    }

    #[test]
    fn test_io_queue_task_error_does_not_poison() {
        let queue = IoQueue::new();
        queue.start();

        let bad: IoTicket<()> =
            queue.enqueue(|| Err(PicoError::IoQueue("task failed".to_string())));
        assert!(bad.wait().is_err());

        let good = queue.enqueue(|| Ok(7));
        assert_eq!(good.wait().unwrap(), 7);
    }

    #[test]
    fn test_io_queue_concurrency_ceiling() {
        let queue = IoQueue::new();
        queue.start();

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tickets: Vec<_> = (0..32)
            .map(|_| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                queue.enqueue(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for ticket in tickets {
            ticket.wait().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= IO_QUEUE_DEPTH);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_io_queue_many_results_in_order_of_submission() {
        let queue = IoQueue::new();
        queue.start();

        let tickets: Vec<_> = (0..100u64).map(|i| queue.enqueue(move || Ok(i))).collect();

        for (i, ticket) in tickets.into_iter().enumerate() {
            assert_eq!(ticket.wait().unwrap(), i as u64);
        }
    }
}
