//! In-memory codec and transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use crate::dispatcher::Dispatcher;
use crate::errors::Error;
use crate::protocol::{Datapoints, DecodedFrame, FrameCodec, Transport, Verb};
use crate::registry::lock;
use crate::runtime::{BoxFuture, Scheduler};

/// Plain JSON frames. Replies are `"<command>|<text>"` or `"<command>!<error>"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockCodec;

impl MockCodec {
    pub fn reply(command: u8, text: &str) -> Vec<u8> {
        format!("{command}|{text}").into_bytes()
    }

    pub fn error_reply(command: u8, error: &str) -> Vec<u8> {
        format!("{command}!{error}").into_bytes()
    }
}

impl FrameCodec for MockCodec {
    fn encode(&self, local_key: &str, dps: &Datapoints, verb: Verb) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(&json!({"key": local_key, "verb": verb.to_string(), "dps": dps}))
            .map_err(Error::JsonDump)
    }

    fn decode(&self, frame: &[u8], _local_key: &str) -> DecodedFrame {
        let text = String::from_utf8_lossy(frame);
        let split = text.find(['|', '!']);
        let parsed = split.and_then(|at| Some((text[..at].parse::<u8>().ok()?, at)));
        match parsed {
            Some((command, at)) if text[at..].starts_with('|') => {
                DecodedFrame::new(command, &text[at + 1..])
            }
            Some((command, at)) => DecodedFrame::failed(command, &text[at + 1..]),
            None => DecodedFrame::failed(0, "undecodable frame"),
        }
    }
}

/// How the fake bulb answers a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Accepts the frame and never answers.
    Silent,
    /// The send itself fails, as if nothing listens at the address.
    Fail,
    /// Answers at once with this command byte.
    Ack(u8),
    /// Answers after a delay.
    AckAfter(u8, Duration),
    /// Answers at once with a decoded error.
    Error(u8),
}

type Sink = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

#[derive(Default)]
struct Inner {
    default_reply: Option<Reply>,
    replies: Mutex<HashMap<Ipv4Addr, Reply>>,
    sink: Mutex<Option<Sink>>,
    sinks: Mutex<HashMap<Ipv4Addr, Sink>>,
    sent: Mutex<Vec<(Ipv4Addr, Vec<u8>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Fake network that records frames and answers according to [`Reply`].
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn new(default_reply: Reply) -> Self {
        MockTransport {
            inner: Arc::new(Inner {
                default_reply: Some(default_reply),
                ..Inner::default()
            }),
        }
    }

    pub fn set_reply(&self, address: Ipv4Addr, reply: Reply) {
        lock(&self.inner.replies).insert(address, reply);
    }

    /// Receive every reply frame.
    pub fn on_reply(&self, sink: impl Fn(Vec<u8>) + Send + Sync + 'static) {
        *lock(&self.inner.sink) = Some(Arc::new(sink));
    }

    /// Receive reply frames from one address, overriding [`MockTransport::on_reply`].
    pub fn on_reply_from(&self, address: Ipv4Addr, sink: impl Fn(Vec<u8>) + Send + Sync + 'static) {
        lock(&self.inner.sinks).insert(address, Arc::new(sink));
    }

    /// Route every reply to the waiter for `id`.
    pub fn attach(&self, dispatcher: &Arc<Dispatcher<MockCodec, MockTransport>>, id: &str) {
        self.on_reply(ack_sink(dispatcher, id));
    }

    /// Route replies from `address` to the waiter for `id`.
    pub fn attach_from(
        &self,
        dispatcher: &Arc<Dispatcher<MockCodec, MockTransport>>,
        address: Ipv4Addr,
        id: &str,
    ) {
        self.on_reply_from(address, ack_sink(dispatcher, id));
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.inner.sent).len()
    }

    /// Frames sent so far, decoded back to JSON.
    pub fn sent(&self) -> Vec<(Ipv4Addr, Value)> {
        lock(&self.inner.sent)
            .iter()
            .map(|(address, frame)| (*address, serde_json::from_slice(frame).unwrap_or(Value::Null)))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn reply_for(&self, address: Ipv4Addr) -> Reply {
        lock(&self.inner.replies)
            .get(&address)
            .copied()
            .or(self.inner.default_reply)
            .unwrap_or(Reply::Silent)
    }

    fn sink_for(&self, address: Ipv4Addr) -> Option<Sink> {
        lock(&self.inner.sinks)
            .get(&address)
            .cloned()
            .or_else(|| lock(&self.inner.sink).clone())
    }

    fn deliver(&self, address: Ipv4Addr, frame: Vec<u8>) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(sink) = self.sink_for(address) {
            sink(frame);
        }
    }
}

fn ack_sink(dispatcher: &Arc<Dispatcher<MockCodec, MockTransport>>, id: &str) -> impl Fn(Vec<u8>) + Send + Sync + 'static {
    let dispatcher = Arc::downgrade(dispatcher);
    let id = id.to_string();
    move |frame| {
        if let Some(dispatcher) = dispatcher.upgrade() {
            let decoded = dispatcher.codec().decode(&frame, "");
            dispatcher.deliver_ack(&id, decoded);
        }
    }
}

impl Transport for MockTransport {
    async fn send(&self, address: Ipv4Addr, frame: &[u8]) -> io::Result<()> {
        let reply = self.reply_for(address);
        if reply == Reply::Fail {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        }

        lock(&self.inner.sent).push((address, frame.to_vec()));
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        match reply {
            Reply::Ack(command) => self.deliver(address, MockCodec::reply(command, "{}")),
            Reply::Error(command) => self.deliver(address, MockCodec::error_reply(command, "bad crc")),
            Reply::AckAfter(command, delay) => {
                let transport = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    transport.deliver(address, MockCodec::reply(command, "{}"));
                });
            }
            Reply::Silent | Reply::Fail => {}
        }
        Ok(())
    }
}

/// Queues deferred tasks until a test runs them.
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<VecDeque<(Duration, BoxFuture<'static, ()>)>>,
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        lock(&self.tasks).push_back((delay, task));
    }
}

impl ManualScheduler {
    pub fn pending(&self) -> usize {
        lock(&self.tasks).len()
    }

    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.tasks).iter().map(|(delay, _)| *delay).collect()
    }

    /// Run the oldest queued task to completion. Returns false if none was queued.
    pub async fn run_next(&self) -> bool {
        let task = lock(&self.tasks).pop_front();
        match task {
            Some((_, task)) => {
                task.await;
                true
            }
            None => false,
        }
    }

    /// Run queued tasks, including ones they schedule, up to `limit` of them.
    pub async fn run_until_idle(&self, limit: usize) -> usize {
        let mut ran = 0;
        while ran < limit && self.run_next().await {
            ran += 1;
        }
        ran
    }
}

#[test]
fn test_mock_codec_decode() {
    let codec = MockCodec;
    assert_eq!(codec.decode(&MockCodec::reply(8, r#"{"1":true}"#), ""), DecodedFrame::new(8, r#"{"1":true}"#));
    assert_eq!(codec.decode(&MockCodec::error_reply(7, "bad crc"), ""), DecodedFrame::failed(7, "bad crc"));
    assert_eq!(codec.decode(b"garbage", "").command, 0);
}
