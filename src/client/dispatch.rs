//! Tag allocation and response routing.
//!
//! One lock guards both the tag counter and the tag to [`Waiter`] map. It is
//! only held for map and counter updates; waking a waiter always happens after
//! it has been released.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, warn};

use crate::protocol::Envelope;

use super::waiter::{Failure, Waiter};

#[derive(Debug, Default)]
struct Routes {
    next_tag: u64,
    waiters: HashMap<u64, Arc<Waiter>>,
    failure: Option<Failure>,
}

#[derive(Debug, Default)]
pub(crate) struct DispatchRegistry {
    routes: Mutex<Routes>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn starting_at(tag: u64) -> Self {
        let registry = Self::new();
        registry.routes().next_tag = tag;
        registry
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a tag and registers a fresh waiter for it. Tags wrap on
    /// overflow; tags still registered are skipped.
    pub fn register(&self) -> (u64, Arc<Waiter>) {
        let waiter = Arc::new(Waiter::new());
        let (tag, failure) = {
            let mut routes = self.routes();
            let mut tag = routes.next_tag;
            while routes.waiters.contains_key(&tag) {
                tag = tag.wrapping_add(1);
            }
            routes.next_tag = tag.wrapping_add(1);
            routes.waiters.insert(tag, Arc::clone(&waiter));
            (tag, routes.failure.clone())
        };

        debug!("registered tag {tag}");
        if let Some(failure) = failure {
            waiter.fail(failure);
        }
        (tag, waiter)
    }

    pub fn deregister(&self, tag: u64) {
        if self.routes().waiters.remove(&tag).is_some() {
            debug!("released tag {tag}");
        }
    }

    /// Hands a completed response to whoever registered its tag. Responses
    /// nobody is waiting for are dropped.
    pub fn dispatch(&self, parts: Vec<Envelope>) {
        let Some(tag) = parts.first().map(Envelope::tag) else {
            return;
        };
        let waiter = self.routes().waiters.get(&tag).cloned();

        match waiter {
            Some(waiter) => {
                debug!("delivering {} parts to tag {tag}", parts.len());
                waiter.deliver(parts);
            }
            None => warn!("discarding response for unregistered tag {tag}"),
        }
    }

    /// Fails every registered waiter and any registered later. Only the first
    /// call has an effect.
    pub fn fail_all(&self, failure: Failure) {
        let waiters: Vec<Arc<Waiter>> = {
            let mut routes = self.routes();
            if routes.failure.is_some() {
                return;
            }
            routes.failure = Some(failure.clone());
            routes.waiters.values().cloned().collect()
        };

        debug!("failing {} waiters: {failure:?}", waiters.len());
        for waiter in waiters {
            waiter.fail(failure.clone());
        }
    }

    /// The failure recorded by [`fail_all`](Self::fail_all), if any.
    pub fn failure(&self) -> Option<Failure> {
        self.routes().failure.clone()
    }

    pub fn len(&self) -> usize {
        self.routes().waiters.len()
    }

    #[cfg(test)]
    pub fn is_registered(&self, tag: u64) -> bool {
        self.routes().waiters.contains_key(&tag)
    }
}
