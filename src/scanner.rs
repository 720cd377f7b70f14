//! Finding a bulb by probing a range of addresses one at a time.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};

use crate::dispatcher::{Dispatcher, Endpoint, SendPolicy};
use crate::errors::Error;
use crate::protocol::{Datapoints, FrameCodec, Transport, Verb};
use crate::registry::lock;
use crate::runtime::Scheduler;

type Result<T> = std::result::Result<T, Error>;

/// Where a scan stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Probing(Ipv4Addr),
    Found(Ipv4Addr),
    Exhausted,
}

/// One scan of `start..=end` for a known identity.
pub struct ScanRun {
    endpoint: Endpoint,
    probe: Datapoints,
    start: Ipv4Addr,
    end: Ipv4Addr,
    on_found: Box<dyn FnOnce(Ipv4Addr) + Send>,
}

impl ScanRun {
    /// `probe` is sent as a CONTROL command to every address and should be
    /// harmless to repeat, such as restating the current power state.
    pub fn new(
        endpoint: Endpoint,
        probe: Datapoints,
        start: Ipv4Addr,
        end: Ipv4Addr,
        on_found: impl FnOnce(Ipv4Addr) + Send + 'static,
    ) -> Self {
        ScanRun {
            endpoint,
            probe,
            start,
            end,
            on_found: Box::new(on_found),
        }
    }
}

/// Probes addresses sequentially until a bulb acknowledges.
///
/// Each address gets a single uncounted attempt with a short timeout; any
/// failure means "nothing here" and leaves the bulb's counters alone. Every
/// probe is its own deferred task on the scheduler, so a scan never blocks
/// its caller.
pub struct Scanner<C, T> {
    dispatcher: Arc<Dispatcher<C, T>>,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<ScanState>,
}

impl<C, T> Scanner<C, T>
where
    C: FrameCodec + 'static,
    T: Transport + 'static,
{
    pub const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

    pub fn new(dispatcher: Arc<Dispatcher<C, T>>, scheduler: Arc<dyn Scheduler>) -> Self {
        Scanner {
            dispatcher,
            scheduler,
            state: Mutex::new(ScanState::Idle),
        }
    }

    pub fn state(&self) -> ScanState {
        *lock(&self.state)
    }

    /// Begin scanning. The first probe runs on the scheduler.
    pub fn start(self: &Arc<Self>, run: ScanRun) -> Result<()> {
        if u32::from(run.start) > u32::from(run.end) {
            return Err(Error::InvalidRange {
                start: run.start,
                end: run.end,
            });
        }
        run.endpoint.check_identity()?;

        {
            let mut state = lock(&self.state);
            if matches!(*state, ScanState::Probing(_)) {
                return Err(Error::ScanInProgress);
            }
            *state = ScanState::Probing(run.start);
        }

        info!("Scanning {} - {} for {}", run.start, run.end, run.endpoint.id);
        let first = run.start;
        self.schedule_probe(first, run);
        Ok(())
    }

    fn schedule_probe(self: &Arc<Self>, address: Ipv4Addr, run: ScanRun) {
        *lock(&self.state) = ScanState::Probing(address);
        let scanner = Arc::downgrade(self);
        self.scheduler.schedule(
            Duration::ZERO,
            Box::pin(async move {
                if let Some(scanner) = scanner.upgrade() {
                    scanner.probe(address, run).await;
                }
            }),
        );
    }

    async fn probe(self: &Arc<Self>, address: Ipv4Addr, run: ScanRun) {
        let result = self
            .dispatcher
            .send(
                &run.endpoint.at(address),
                &run.probe,
                Verb::Control,
                SendPolicy::probe(Self::PROBE_TIMEOUT),
            )
            .await;

        match result {
            Ok(_) => {
                info!("Found {} at {address}", run.endpoint.id);
                *lock(&self.state) = ScanState::Found(address);
                (run.on_found)(address);
            }
            Err(e) => {
                debug!("Nothing answered at {address}: {e}");
                match next_address(address, run.end) {
                    Some(next) => self.schedule_probe(next, run),
                    None => {
                        info!(
                            "Scan for {} exhausted {} - {}",
                            run.endpoint.id, run.start, run.end
                        );
                        *lock(&self.state) = ScanState::Exhausted;
                    }
                }
            }
        }
    }
}

fn next_address(address: Ipv4Addr, end: Ipv4Addr) -> Option<Ipv4Addr> {
    let next = u32::from(address).checked_add(1)?;
    (next <= u32::from(end)).then(|| Ipv4Addr::from(next))
}
