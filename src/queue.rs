//! Single-flight FIFO admission for proof jobs.
//!
//! Every caller draws a ticket on arrival. A ticket is admitted only when it
//! equals the serving cursor; the resulting [`Turn`] advances the cursor when
//! dropped, whether the job succeeded, failed or panicked. Tickets dropped
//! before admission are skipped.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};

#[derive(Debug, Default)]
struct QueueState {
    next_ticket: u64,
    now_serving: u64,
    abandoned: BTreeSet<u64>,
}

impl QueueState {
    fn advance(&mut self) {
        self.now_serving += 1;
        while self.abandoned.remove(&self.now_serving) {
            self.now_serving += 1;
        }
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    state: Mutex<QueueState>,
    turn_changed: Notify,
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self) {
        self.lock().advance();
        self.turn_changed.notify_waiters();
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProofQueue {
    inner: Arc<QueueInner>,
}

impl ProofQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the next ticket. Arrival order is fixed here, not at admission.
    pub fn ticket(&self) -> Ticket {
        let mut state = self.inner.lock();
        let number = state.next_ticket;
        state.next_ticket += 1;
        Ticket {
            queue: self.inner.clone(),
            number,
            admitted: false,
        }
    }

    /// Tickets drawn and not yet finished, including the one being served.
    pub fn pending(&self) -> usize {
        let state = self.inner.lock();
        (state.next_ticket - state.now_serving) as usize - state.abandoned.len()
    }

    /// Queue `job` behind every earlier ticket and run it on the blocking
    /// pool once admitted.
    ///
    /// The job runs in its own task, so dropping the returned handle does not
    /// cancel an admitted job.
    pub fn submit<F, T>(&self, job: F) -> JoinHandle<Result<T, JoinError>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let ticket = self.ticket();
        tokio::spawn(async move {
            let turn = ticket.wait().await;
            tracing::debug!("Ticket {} admitted", turn.number);
            let result = tokio::task::spawn_blocking(job).await;
            drop(turn);
            result
        })
    }
}

/// A place in line.
#[derive(Debug)]
pub struct Ticket {
    queue: Arc<QueueInner>,
    number: u64,
    admitted: bool,
}

impl Ticket {
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Wait until every earlier ticket has finished or been abandoned.
    pub async fn wait(mut self) -> Turn {
        loop {
            let notified = self.queue.turn_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.queue.lock().now_serving == self.number {
                break;
            }
            notified.await;
        }
        self.admitted = true;
        Turn {
            queue: self.queue.clone(),
            number: self.number,
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }
        let serving = {
            let mut state = self.queue.lock();
            if state.now_serving == self.number {
                true
            } else {
                state.abandoned.insert(self.number);
                false
            }
        };
        if serving {
            self.queue.advance();
        }
    }
}

/// Exclusive right to prove. Releases the queue on drop.
#[derive(Debug)]
pub struct Turn {
    queue: Arc<QueueInner>,
    number: u64,
}

impl Turn {
    pub fn number(&self) -> u64 {
        self.number
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        self.queue.advance();
    }
}
