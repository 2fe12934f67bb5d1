//! Request/complete handoff between a worker thread and the thread that owns
//! the sink.
//!
//! The worker calls [`Requester::request_and_wait`], which queues an action
//! and parks until the owner has run it. The owner runs queued actions from
//! its own tick via [`Mailbox::drain_pending`]. [`Mailbox::cancel_all`]
//! releases the worker without running anything and needs no further ticks.

use crossbeam_channel::{select, Receiver, Sender};

/// Returned to the worker when its action will never run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

struct Request<A, R> {
    action: A,
    done: Sender<R>,
}

/// Worker side of the handoff.
pub struct Requester<A, R> {
    queue: Sender<Request<A, R>>,
    cancelled: Receiver<()>,
}

/// Owner side of the handoff.
pub struct Mailbox<A, R> {
    queue: Receiver<Request<A, R>>,
    /// Never sent on; dropping it wakes every waiting worker.
    cancel: Option<Sender<()>>,
}

/// Outcome of running one action on the owner thread.
pub enum Handled<R> {
    /// Complete the request with this reply.
    Reply(R),
    /// Refuse the request and cancel the mailbox.
    Refuse,
}

/// Create a connected requester/mailbox pair.
pub fn mailbox<A, R>() -> (Requester<A, R>, Mailbox<A, R>) {
    let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
    let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(0);
    (
        Requester {
            queue: queue_tx,
            cancelled: cancel_rx,
        },
        Mailbox {
            queue: queue_rx,
            cancel: Some(cancel_tx),
        },
    )
}

impl<A, R> Requester<A, R> {
    /// Queue `action` and block until the owner completes it.
    ///
    /// Returns `Err(Cancelled)` if the mailbox was cancelled before or while
    /// waiting; in that case the action may not have run.
    pub fn request_and_wait(&self, action: A) -> Result<R, Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.queue
            .send(Request {
                action,
                done: done_tx,
            })
            .map_err(|_| Cancelled)?;

        select! {
            recv(done_rx) -> reply => reply.map_err(|_| Cancelled),
            recv(self.cancelled) -> _ => Err(Cancelled),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.cancelled.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        )
    }
}

impl<A, R> Mailbox<A, R> {
    /// Run every queued action in submission order and complete each request.
    ///
    /// Returns the number of actions run. Stops early, cancelling the
    /// mailbox, if the handler refuses an action.
    pub fn drain_pending<F>(&mut self, mut handler: F) -> usize
    where
        F: FnMut(A) -> Handled<R>,
    {
        if self.cancel.is_none() {
            return 0;
        }

        let mut ran = 0;
        while let Ok(request) = self.queue.try_recv() {
            match handler(request.action) {
                Handled::Reply(reply) => {
                    let _ = request.done.send(reply);
                    ran += 1;
                }
                Handled::Refuse => {
                    self.cancel_all();
                    break;
                }
            }
        }
        ran
    }

    /// Drop queued actions without running them and release any waiting worker.
    pub fn cancel_all(&mut self) {
        self.cancel = None;
        for request in self.queue.try_iter() {
            drop(request);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }

    /// Number of actions waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn wait_for_pending(mailbox: &Mailbox<u32, u32>, count: usize) {
        for _ in 0..500 {
            if mailbox.pending() >= count {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("worker never queued {count} request(s)");
    }

    #[test]
    fn request_blocks_until_drained() {
        let (requester, mut mailbox) = mailbox::<u32, u32>();
        let worker = thread::spawn(move || requester.request_and_wait(20));

        wait_for_pending(&mailbox, 1);
        assert!(!worker.is_finished());

        let ran = mailbox.drain_pending(|n| Handled::Reply(n + 1));
        assert_eq!(ran, 1);
        assert_eq!(worker.join().unwrap(), Ok(21));
    }

    #[test]
    fn cancel_releases_a_waiting_worker_without_running_it() {
        let (requester, mut mailbox) = mailbox::<u32, u32>();
        let worker = thread::spawn(move || requester.request_and_wait(1));

        wait_for_pending(&mailbox, 1);
        mailbox.cancel_all();

        assert_eq!(worker.join().unwrap(), Err(Cancelled));
        assert_eq!(mailbox.pending(), 0);
        assert_eq!(mailbox.drain_pending(|_| panic!("must not run")), 0);
    }

    #[test]
    fn requests_after_cancel_return_immediately() {
        let (requester, mut mailbox) = mailbox::<u32, u32>();
        mailbox.cancel_all();
        mailbox.cancel_all();
        assert!(requester.is_cancelled());
        assert_eq!(requester.request_and_wait(5), Err(Cancelled));
    }

    #[test]
    fn drain_preserves_submission_order() {
        let (requester, mut mailbox) = mailbox::<u32, u32>();
        let requester = std::sync::Arc::new(requester);

        let first = {
            let requester = requester.clone();
            thread::spawn(move || requester.request_and_wait(1))
        };
        wait_for_pending(&mailbox, 1);
        let second = {
            let requester = requester.clone();
            thread::spawn(move || requester.request_and_wait(2))
        };
        wait_for_pending(&mailbox, 2);

        let mut seen = Vec::new();
        mailbox.drain_pending(|n| {
            seen.push(n);
            Handled::Reply(n * 10)
        });

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(first.join().unwrap(), Ok(10));
        assert_eq!(second.join().unwrap(), Ok(20));
    }

    #[test]
    fn refusing_cancels_the_mailbox() {
        let (requester, mut mailbox) = mailbox::<u32, u32>();
        let worker = thread::spawn(move || requester.request_and_wait(3));
        wait_for_pending(&mailbox, 1);

        assert_eq!(mailbox.drain_pending(|_| Handled::Refuse), 0);
        assert!(mailbox.is_cancelled());
        assert_eq!(worker.join().unwrap(), Err(Cancelled));
    }

    #[test]
    fn dropping_the_mailbox_releases_the_worker() {
        let (requester, mailbox) = mailbox::<u32, u32>();
        let worker = thread::spawn(move || requester.request_and_wait(9));
        wait_for_pending(&mailbox, 1);
        drop(mailbox);
        assert_eq!(worker.join().unwrap(), Err(Cancelled));
    }
}
