//! Periodic liveness probe.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crate::dispatcher::{Dispatcher, Endpoint, SendPolicy};
use crate::errors::Error;
use crate::event::{EventCallback, emit};
use crate::protocol::{Datapoints, FrameCodec, Transport, Verb};
use crate::registry::lock;
use crate::runtime::Scheduler;

type Result<T> = std::result::Result<T, Error>;

/// Sends an empty `HEART_BEAT` every interval through the dispatcher.
///
/// Each beat is a single attempt so a dead link never stalls the endpoint
/// for a full retry cycle. Failures are only logged and counted, and counter
/// changes are passed to the subscriber set with [`Heartbeat::with_events`].
/// Deciding when a bulb is gone is left to whoever watches
/// [`Heartbeat::consecutive_failures`].
pub struct Heartbeat<C, T> {
    dispatcher: Arc<Dispatcher<C, T>>,
    scheduler: Arc<dyn Scheduler>,
    endpoint: Mutex<Endpoint>,
    interval: Duration,
    timeout: Duration,
    running: AtomicBool,
    consecutive_failures: AtomicU32,
    events: Option<Arc<EventCallback>>,
}

impl<C, T> Heartbeat<C, T>
where
    C: FrameCodec + 'static,
    T: Transport + 'static,
{
    pub fn new(
        dispatcher: Arc<Dispatcher<C, T>>,
        scheduler: Arc<dyn Scheduler>,
        endpoint: Endpoint,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Heartbeat {
            dispatcher,
            scheduler,
            endpoint: Mutex::new(endpoint),
            interval,
            timeout,
            running: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            events: None,
        }
    }

    /// Report `retries` and `errors` changes caused by beats.
    pub fn with_events(mut self, callback: Arc<EventCallback>) -> Self {
        self.events = Some(callback);
        self
    }

    /// Schedule the first beat one interval from now.
    pub fn start(self: &Arc<Self>) {
        if !self.running.swap(true, Ordering::SeqCst) {
            self.schedule_next();
        }
    }

    /// Stop rescheduling. A beat already in flight still completes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Beat against a new address from the next beat on.
    pub fn retarget(&self, address: Ipv4Addr) {
        let mut endpoint = lock(&self.endpoint);
        *endpoint = endpoint.at(address);
    }

    fn schedule_next(self: &Arc<Self>) {
        let heartbeat = Arc::downgrade(self);
        self.scheduler.schedule(
            self.interval,
            Box::pin(async move {
                let Some(heartbeat) = heartbeat.upgrade() else {
                    return;
                };
                if !heartbeat.is_running() {
                    return;
                }
                // Outcome is logged and counted inside beat().
                let _ = heartbeat.beat().await;
                if heartbeat.is_running() {
                    heartbeat.schedule_next();
                }
            }),
        );
    }

    /// Send one heartbeat now.
    pub async fn beat(&self) -> Result<()> {
        let endpoint = lock(&self.endpoint).clone();
        let (result, delta) = self
            .dispatcher
            .send_tracked(
                &endpoint,
                &Datapoints::new(),
                Verb::HeartBeat,
                SendPolicy::single(self.timeout),
            )
            .await;
        emit(self.events.as_deref(), &endpoint.id, &delta.events());

        match result {
            Ok(_) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                debug!("Heartbeat acknowledged by {}", endpoint.id);
                Ok(())
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(
                    "Heartbeat to {} failed ({failures} in a row): {e}",
                    endpoint.id
                );
                Err(e)
            }
        }
    }
}
