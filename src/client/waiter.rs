//! Per-request delivery slot.
//!
//! The background reader pushes completed responses into a [`Waiter`]; the
//! thread that owns the matching request blocks on it until something shows
//! up, the connection fails, or its deadline passes.
use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::protocol::Envelope;

use super::ClientError;

/// Why a connection stopped delivering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Failure {
    Closed,
    Broken(String),
}

impl From<Failure> for ClientError {
    fn from(value: Failure) -> Self {
        match value {
            Failure::Closed => ClientError::ConnectionClosed,
            Failure::Broken(reason) => ClientError::ConnectionBroken(reason),
        }
    }
}

#[derive(Debug, Default)]
struct Inbox {
    delivered: VecDeque<Vec<Envelope>>,
    failure: Option<Failure>,
}

#[derive(Debug, Default)]
pub(crate) struct Waiter {
    inbox: Mutex<Inbox>,
    ready: Condvar,
}

impl Waiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn inbox(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn deliver(&self, parts: Vec<Envelope>) {
        let mut inbox = self.inbox();
        inbox.delivered.push_back(parts);
        if inbox.delivered.len() == 1 {
            self.ready.notify_one();
        }
    }

    /// Marks the waiter as failed. The first failure sticks.
    pub fn fail(&self, failure: Failure) {
        let mut inbox = self.inbox();
        if inbox.failure.is_none() {
            inbox.failure = Some(failure);
        }
        self.ready.notify_all();
    }

    /// Pops the oldest delivery. Deliveries that arrived before a failure are
    /// still handed out.
    pub fn wait(&self, tag: u64, timeout: Option<Duration>) -> Result<Vec<Envelope>, ClientError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inbox = self.inbox();

        loop {
            if let Some(parts) = inbox.delivered.pop_front() {
                return Ok(parts);
            }
            if let Some(failure) = &inbox.failure {
                return Err(failure.clone().into());
            }

            inbox = match deadline {
                None => self
                    .ready
                    .wait(inbox)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ClientError::Timeout(tag));
                    }
                    self.ready
                        .wait_timeout(inbox, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.inbox().delivered.len()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    fn parts(tag: u64) -> Vec<Envelope> {
        vec![Envelope::new(tag, true, vec![])]
    }

    #[test]
    fn delivered_before_wait() {
        let waiter = Waiter::new();
        waiter.deliver(parts(1));

        assert_eq!(waiter.wait(1, None).unwrap(), parts(1));
        assert_eq!(waiter.pending(), 0);
    }

    #[test]
    fn wakes_blocked_thread() {
        let waiter = Arc::new(Waiter::new());
        let handle = {
            let waiter = Arc::clone(&waiter);
            thread::spawn(move || waiter.wait(3, None))
        };

        thread::sleep(Duration::from_millis(20));
        waiter.deliver(parts(3));

        assert_eq!(handle.join().unwrap().unwrap(), parts(3));
    }

    #[test]
    fn deliveries_are_fifo() {
        let waiter = Waiter::new();
        waiter.deliver(parts(1));
        waiter.deliver(parts(2));

        assert_eq!(waiter.wait(0, None).unwrap(), parts(1));
        assert_eq!(waiter.wait(0, None).unwrap(), parts(2));
    }

    #[test]
    fn times_out() {
        let waiter = Waiter::new();
        let err = waiter.wait(9, Some(Duration::from_millis(10))).unwrap_err();

        assert!(matches!(err, ClientError::Timeout(9)));
    }

    #[test]
    fn failure_wakes_and_sticks() {
        let waiter = Arc::new(Waiter::new());
        let handle = {
            let waiter = Arc::clone(&waiter);
            thread::spawn(move || waiter.wait(4, None))
        };

        thread::sleep(Duration::from_millis(20));
        waiter.fail(Failure::Broken("reset".into()));
        waiter.fail(Failure::Closed);

        assert!(matches!(
            handle.join().unwrap(),
            Err(ClientError::ConnectionBroken(reason)) if reason == "reset"
        ));
        assert!(matches!(
            waiter.wait(4, None),
            Err(ClientError::ConnectionBroken(_))
        ));
    }

    #[test]
    fn delivery_beats_failure() {
        let waiter = Waiter::new();
        waiter.deliver(parts(5));
        waiter.fail(Failure::Closed);

        assert_eq!(waiter.wait(5, None).unwrap(), parts(5));
        assert!(matches!(
            waiter.wait(5, None),
            Err(ClientError::ConnectionClosed)
        ));
    }
}
