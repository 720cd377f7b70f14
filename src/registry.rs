//! Per-endpoint shared state, keyed by endpoint identity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::ack::AckSlot;
use crate::event::DeviceEvent;
use crate::history::MessageHistory;
use crate::runtime;
use crate::status::DeviceState;

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot of an endpoint's failure counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub retries: u64,
    pub errors: u64,
}

/// Counter values on either side of one command.
///
/// Both snapshots are read while the command holds its endpoint, so the
/// difference belongs to that command alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub before: CounterSnapshot,
    pub after: CounterSnapshot,
}

impl CounterDelta {
    /// A `retries` or `errors` event for each counter that moved.
    pub fn events(&self) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        if self.after.retries != self.before.retries {
            events.push(DeviceEvent::retries(self.after.retries));
        }
        if self.after.errors != self.before.errors {
            events.push(DeviceEvent::errors(self.after.errors));
        }
        events
    }
}

/// Monotonic failure counters, reset only on endpoint re-initialization.
#[derive(Debug, Default)]
pub struct Counters {
    retries: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            retries: self.retries.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
        }
    }

    pub fn reset(&self) {
        self.retries.store(0, Ordering::SeqCst);
        self.errors.store(0, Ordering::SeqCst);
    }
}

/// Everything shared between command attempts and inbound frame handling for
/// one endpoint.
#[derive(Debug, Default)]
pub struct EndpointSlot {
    /// Held across send and wait; one command in flight per endpoint.
    pub(crate) flight: runtime::Mutex<()>,
    pub(crate) ack: AckSlot,
    pub(crate) state: Mutex<DeviceState>,
    pub(crate) counters: Counters,
    pub(crate) history: Mutex<MessageHistory>,
}

impl EndpointSlot {
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub fn state(&self) -> DeviceState {
        lock(&self.state).clone()
    }

    pub fn history(&self) -> MessageHistory {
        lock(&self.history).clone()
    }

    /// Forget canonical state and traffic, and zero the counters.
    pub fn reset(&self) {
        *lock(&self.state) = DeviceState::default();
        lock(&self.history).clear();
        self.counters.reset();
    }
}

/// Concurrency-safe map from endpoint id to its slot.
///
/// Slots are created on first access and live as long as the registry.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    slots: Mutex<HashMap<String, Arc<EndpointSlot>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, id: &str) -> Arc<EndpointSlot> {
        Arc::clone(
            lock(&self.slots)
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(EndpointSlot::default())),
        )
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.slots).is_empty()
    }
}
