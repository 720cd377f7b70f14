//! Single-flight command delivery with bounded retries.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

use crate::config::BulbConfig;
use crate::errors::Error;
use crate::history::MessageType;
use crate::protocol::{Datapoints, DecodedFrame, FrameCodec, Transport, Verb};
use crate::registry::{CounterDelta, EndpointRegistry, EndpointSlot, lock};
use crate::runtime;

type Result<T> = std::result::Result<T, Error>;

/// Who to talk to and with which key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: String,
    pub local_key: String,
    pub address: Option<Ipv4Addr>,
}

impl Endpoint {
    pub fn new(id: &str, local_key: &str, address: Option<Ipv4Addr>) -> Self {
        Endpoint {
            id: id.to_string(),
            local_key: local_key.to_string(),
            address,
        }
    }

    /// Same identity, different address.
    pub fn at(&self, address: Ipv4Addr) -> Self {
        Endpoint {
            address: Some(address),
            ..self.clone()
        }
    }

    /// Fails when the identity or local key is missing.
    pub fn check_identity(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::Configuration { missing: "id" });
        }
        if self.local_key.is_empty() {
            return Err(Error::Configuration { missing: "local key" });
        }
        Ok(())
    }

    fn target(&self) -> Result<Ipv4Addr> {
        self.check_identity()?;
        self.address.ok_or(Error::Configuration { missing: "address" })
    }
}

impl From<&BulbConfig> for Endpoint {
    fn from(config: &BulbConfig) -> Self {
        Endpoint::new(&config.id, &config.local_key, config.address)
    }
}

/// How hard to try before giving up on a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
    /// Whether failures move the endpoint's retry and error counters.
    pub counted: bool,
}

impl SendPolicy {
    /// Pause after a transport failure before the next attempt.
    pub const BACKOFF: Duration = Duration::from_millis(250);

    pub fn new(attempts: u32, timeout: Duration) -> Self {
        SendPolicy {
            attempts: attempts.max(1),
            timeout,
            backoff: Self::BACKOFF,
            counted: true,
        }
    }

    /// One attempt, no escalation.
    pub fn single(timeout: Duration) -> Self {
        Self::new(1, timeout)
    }

    /// One uncounted attempt. Silence only means nothing answered.
    pub fn probe(timeout: Duration) -> Self {
        SendPolicy {
            counted: false,
            ..Self::single(timeout)
        }
    }
}

impl From<&BulbConfig> for SendPolicy {
    fn from(config: &BulbConfig) -> Self {
        SendPolicy::new(config.repeat(), config.timeout())
    }
}

/// Sends commands through the external codec and transport and waits for the
/// matching acknowledgment.
///
/// Commands to one endpoint are strictly serialized: the endpoint lock is held
/// from the first transmission until an acknowledgment arrives or every
/// attempt has failed. Different endpoints proceed independently.
pub struct Dispatcher<C, T> {
    codec: C,
    transport: T,
    registry: Arc<EndpointRegistry>,
}

impl<C: FrameCodec, T: Transport> Dispatcher<C, T> {
    pub fn new(codec: C, transport: T, registry: Arc<EndpointRegistry>) -> Self {
        Dispatcher {
            codec,
            transport,
            registry,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn slot(&self, id: &str) -> Arc<EndpointSlot> {
        self.registry.slot(id)
    }

    /// Send a command and wait for its acknowledgment.
    ///
    /// Transport failures count as errors and back off before the next
    /// attempt; silent attempts count as retries. A decoded error reply ends
    /// the command at once. When every attempt is used up the command fails
    /// with [`Error::AckTimeout`] and the caller decides on a fallback.
    pub async fn send(
        &self,
        endpoint: &Endpoint,
        dps: &Datapoints,
        verb: Verb,
        policy: SendPolicy,
    ) -> Result<DecodedFrame> {
        self.send_tracked(endpoint, dps, verb, policy).await.0
    }

    /// Like [`Dispatcher::send`], also reporting how the endpoint's counters
    /// moved while this command held it.
    pub async fn send_tracked(
        &self,
        endpoint: &Endpoint,
        dps: &Datapoints,
        verb: Verb,
        policy: SendPolicy,
    ) -> (Result<DecodedFrame>, CounterDelta) {
        let (address, frame) = match self.prepare(endpoint, dps, verb) {
            Ok(prepared) => prepared,
            Err(e) => return (Err(e), CounterDelta::default()),
        };
        let slot = self.registry.slot(&endpoint.id);

        let _flight = slot.flight.lock().await;
        let before = slot.counters();
        record_send(&slot, verb, dps);
        debug!("Sending {verb} {dps:?} to {} at {address}", endpoint.id);

        let result = self.attempt_all(&slot, address, &frame, verb, policy).await;
        let delta = CounterDelta {
            before,
            after: slot.counters(),
        };
        (result, delta)
    }

    async fn attempt_all(
        &self,
        slot: &EndpointSlot,
        address: Ipv4Addr,
        frame: &[u8],
        verb: Verb,
        policy: SendPolicy,
    ) -> Result<DecodedFrame> {
        for attempt in 1..=policy.attempts {
            let pending = slot.ack.arm();

            if let Err(e) = self.transport.send(address, frame).await {
                drop(pending);
                let err = Error::transport("send", e);
                if policy.counted {
                    warn!("{verb} to {address} failed on attempt {attempt}/{}: {err}", policy.attempts);
                    slot.counters.error();
                    lock(&slot.history).record_error(&err.to_string());
                } else {
                    debug!("{verb} to {address} failed: {err}");
                }
                if attempt < policy.attempts {
                    runtime::sleep(policy.backoff).await;
                }
                if policy.counted {
                    slot.counters.retry();
                }
                continue;
            }

            match pending.wait(policy.timeout).await {
                Some(ack) => {
                    if let Some(reason) = ack.error {
                        if policy.counted {
                            slot.counters.error();
                        }
                        lock(&slot.history).record_error(&reason);
                        return Err(Error::Protocol(reason));
                    }
                    lock(&slot.history).record(
                        MessageType::Ack,
                        &ack.command.to_string(),
                        Value::String(ack.text.clone()),
                    );
                    return Ok(ack);
                }
                None if policy.counted => {
                    warn!(
                        "No acknowledgment for {verb} from {address} within {:?} (attempt {attempt}/{})",
                        policy.timeout, policy.attempts
                    );
                    slot.counters.retry();
                }
                None => debug!("No acknowledgment for {verb} from {address}"),
            }
        }

        let err = Error::AckTimeout {
            attempts: policy.attempts,
        };
        if policy.counted {
            lock(&slot.history).record_error(&err.to_string());
        }
        Err(err)
    }

    /// Transmit a command without waiting for an acknowledgment.
    ///
    /// Still serialized with other commands to the same endpoint.
    pub async fn post(&self, endpoint: &Endpoint, dps: &Datapoints, verb: Verb) -> Result<()> {
        self.post_tracked(endpoint, dps, verb).await.0
    }

    pub async fn post_tracked(
        &self,
        endpoint: &Endpoint,
        dps: &Datapoints,
        verb: Verb,
    ) -> (Result<()>, CounterDelta) {
        let (address, frame) = match self.prepare(endpoint, dps, verb) {
            Ok(prepared) => prepared,
            Err(e) => return (Err(e), CounterDelta::default()),
        };
        let slot = self.registry.slot(&endpoint.id);

        let _flight = slot.flight.lock().await;
        let before = slot.counters();
        record_send(&slot, verb, dps);

        let result = self.transport.send(address, &frame).await.map_err(|e| {
            slot.counters.error();
            let err = Error::transport("send", e);
            lock(&slot.history).record_error(&err.to_string());
            err
        });
        let delta = CounterDelta {
            before,
            after: slot.counters(),
        };
        (result, delta)
    }

    fn prepare(&self, endpoint: &Endpoint, dps: &Datapoints, verb: Verb) -> Result<(Ipv4Addr, Vec<u8>)> {
        let address = endpoint.target()?;
        let frame = self.codec.encode(&endpoint.local_key, dps, verb)?;
        Ok((address, frame))
    }

    /// Hand an acknowledgment frame to whoever is waiting on `id`.
    ///
    /// Returns false when nobody is; the frame is then dropped.
    pub fn deliver_ack(&self, id: &str, frame: DecodedFrame) -> bool {
        self.registry.slot(id).ack.offer(frame)
    }
}

fn record_send(slot: &EndpointSlot, verb: Verb, dps: &Datapoints) {
    let message = serde_json::to_value(dps).unwrap_or(Value::Null);
    lock(&slot.history).record(MessageType::Send, &verb.to_string(), message);
}
