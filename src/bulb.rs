//! Capability surface of a single bulb.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{Value, json};

use crate::command::{CommandBuilder, MODE_COLOUR, MODE_WHITE};
use crate::config::{BulbConfig, FunctionMap};
use crate::dispatcher::{Dispatcher, Endpoint, SendPolicy};
use crate::errors::Error;
use crate::event::{DeviceEvent, EventCallback, emit};
use crate::heartbeat::Heartbeat;
use crate::history::{MessageHistory, MessageType};
use crate::normalizer::apply_datapoints;
use crate::protocol::{Datapoints, DecodedFrame, DpValue, FrameCodec, Transport, Verb, parse_datapoints};
use crate::registry::{CounterSnapshot, EndpointRegistry, lock};
use crate::runtime::{RuntimeScheduler, Scheduler};
use crate::scanner::{ScanRun, ScanState, Scanner};
use crate::status::DeviceState;
use crate::types::{ColorMode, Effect};

type Result<T> = std::result::Result<T, Error>;

/// Receives commands that ran out of attempts, with the bulb id.
pub type Fallback = Box<dyn Fn(&str, &Datapoints) + Send + Sync + 'static>;

/// Persists an address found by a network scan, with the bulb id.
pub type AddressStore = Box<dyn Fn(&str, Ipv4Addr) + Send + Sync + 'static>;

/// How a control command ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The bulb acknowledged. `events` holds the optimistic state changes and
    /// any counter changes.
    Acknowledged {
        ack: DecodedFrame,
        events: Vec<DeviceEvent>,
    },
    /// No acknowledgment arrived and the command went to the fallback.
    Delegated { events: Vec<DeviceEvent> },
}

impl CommandOutcome {
    pub fn events(&self) -> &[DeviceEvent] {
        match self {
            CommandOutcome::Acknowledged { events, .. } | CommandOutcome::Delegated { events } => {
                events
            }
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        matches!(self, CommandOutcome::Acknowledged { .. })
    }
}

/// A bulb on the local network.
///
/// Commands go through a [`Dispatcher`] that allows one command in flight per
/// bulb. Frames arriving from the transport are fed to [`Bulb::handle_frame`],
/// which completes pending commands and turns state pushes into
/// [`DeviceEvent`]s. Only attributes that actually changed produce events.
///
/// # Example
///
/// ```ignore
/// use tuya_lights_rs::{Bulb, BulbConfig};
///
/// let config: BulbConfig = serde_json::from_str(&persisted)?;
/// let mut bulb = Bulb::new(config, codec, transport);
/// bulb.on_event(|id, event| println!("{id} {event}"));
/// bulb.initialize();
///
/// bulb.set_color(66.7, 100.0, 50.0).await?;
/// ```
pub struct Bulb<C, T> {
    config: Arc<Mutex<BulbConfig>>,
    dispatcher: Arc<Dispatcher<C, T>>,
    scheduler: Arc<dyn Scheduler>,
    heartbeat: Arc<Mutex<Option<Arc<Heartbeat<C, T>>>>>,
    scanner: Arc<Scanner<C, T>>,
    on_event: Option<Arc<EventCallback>>,
    fallback: Option<Fallback>,
    address_store: Option<Arc<AddressStore>>,
}

impl<C, T> Bulb<C, T>
where
    C: FrameCodec + 'static,
    T: Transport + 'static,
{
    /// A bulb with its own registry, scheduled on the active runtime.
    pub fn new(config: BulbConfig, codec: C, transport: T) -> Self {
        let dispatcher = Dispatcher::new(codec, transport, Arc::new(EndpointRegistry::new()));
        Self::with_dispatcher(config, Arc::new(dispatcher), Arc::new(RuntimeScheduler))
    }

    /// A bulb sharing a dispatcher, and so its registry, with other bulbs.
    pub fn with_dispatcher(
        config: BulbConfig,
        dispatcher: Arc<Dispatcher<C, T>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let scanner = Arc::new(Scanner::new(dispatcher.clone(), scheduler.clone()));
        Bulb {
            config: Arc::new(Mutex::new(config)),
            dispatcher,
            scheduler,
            heartbeat: Arc::new(Mutex::new(None)),
            scanner,
            on_event: None,
            fallback: None,
            address_store: None,
        }
    }

    /// Subscribe to every emitted event.
    pub fn on_event(&mut self, callback: impl Fn(&str, &DeviceEvent) + Send + Sync + 'static) -> &mut Self {
        let callback: EventCallback = Box::new(callback);
        self.on_event = Some(Arc::new(callback));
        self
    }

    /// Hand commands that exhaust their attempts to another path.
    pub fn on_fallback(&mut self, fallback: impl Fn(&str, &Datapoints) + Send + Sync + 'static) -> &mut Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Persist addresses found by [`Bulb::scan_network`].
    pub fn on_address_found(&mut self, store: impl Fn(&str, Ipv4Addr) + Send + Sync + 'static) -> &mut Self {
        let store: AddressStore = Box::new(store);
        self.address_store = Some(Arc::new(store));
        self
    }

    pub fn config(&self) -> BulbConfig {
        lock(&self.config).clone()
    }

    pub fn id(&self) -> String {
        lock(&self.config).id.clone()
    }

    pub fn functions(&self) -> FunctionMap {
        lock(&self.config).function_map()
    }

    /// Reset canonical state, counters and history, and (re)start the
    /// heartbeat. Must be called from within the async runtime.
    pub fn initialize(&self) {
        let config = self.config();
        self.dispatcher.slot(&config.id).reset();

        let mut heartbeat = lock(&self.heartbeat);
        if let Some(previous) = heartbeat.take() {
            previous.stop();
        }
        if let Some(interval) = config.heartbeat() {
            let mut beat = Heartbeat::new(
                self.dispatcher.clone(),
                self.scheduler.clone(),
                Endpoint::from(&config),
                interval,
                config.timeout(),
            );
            if let Some(callback) = &self.on_event {
                beat = beat.with_events(Arc::clone(callback));
            }
            let beat = Arc::new(beat);
            beat.start();
            *heartbeat = Some(beat);
        }
        info!("Initialized bulb {}", config.id);
    }

    /// Replace the configuration and re-initialize.
    pub fn update_config(&self, config: BulbConfig) {
        *lock(&self.config) = config;
        self.initialize();
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.dispatcher.slot(&self.id()).counters()
    }

    pub fn state(&self) -> DeviceState {
        self.dispatcher.slot(&self.id()).state()
    }

    pub fn history(&self) -> MessageHistory {
        self.dispatcher.slot(&self.id()).history()
    }

    pub fn clear_history(&self) {
        lock(&self.dispatcher.slot(&self.id()).history).clear();
    }

    /// Heartbeats missed in a row, or None while no heartbeat runs.
    pub fn heartbeat_failures(&self) -> Option<u32> {
        lock(&self.heartbeat)
            .as_ref()
            .map(|heartbeat| heartbeat.consecutive_failures())
    }

    pub fn scan_state(&self) -> ScanState {
        self.scanner.state()
    }

    /// Returns diagnostics including configuration, counters, state, and history.
    pub fn diagnostics(&self) -> Value {
        let config = self.config();
        let slot = self.dispatcher.slot(&config.id);
        let history = slot.history();
        let heartbeat_running = lock(&self.heartbeat).as_ref().is_some_and(|h| h.is_running());

        json!({
            "id": config.id,
            "address": config.address.map(|a| a.to_string()),
            "config": {
                "powerDp": config.power_dp,
                "repeat": config.repeat(),
                "timeoutSecs": config.timeout().as_secs(),
                "heartbeatSecs": config.heartbeat().map_or(0, |d| d.as_secs()),
                "effectCount": config.effect_count(),
            },
            "counters": serde_json::to_value(slot.counters()).unwrap_or(Value::Null),
            "state": serde_json::to_value(slot.state()).unwrap_or(Value::Null),
            "history": serde_json::to_value(history.summary()).unwrap_or(Value::Null),
            "heartbeat": {
                "running": heartbeat_running,
                "consecutiveFailures": self.heartbeat_failures(),
            },
            "scan": format!("{:?}", self.scanner.state()),
        })
    }

    /// Route one inbound frame from the transport.
    ///
    /// Acknowledgments and error replies go to the pending command, state
    /// pushes and query results to the normalizer. Returns the events the
    /// frame produced.
    pub fn handle_frame(&self, frame: &[u8]) -> Vec<DeviceEvent> {
        let config = self.config();
        let frame = self.dispatcher.codec().decode(frame, &config.local_key);
        let kind = frame.kind();

        if kind.is_ack() || frame.error.is_some() {
            debug!("Routing {kind:?} frame from {} to the pending command", config.id);
            self.dispatcher.deliver_ack(&config.id, frame);
            return Vec::new();
        }
        if !kind.carries_state() {
            debug!("Ignoring frame with command {} from {}", frame.command, config.id);
            return Vec::new();
        }

        let slot = self.dispatcher.slot(&config.id);
        let dps = match parse_datapoints(&frame.text) {
            Ok(dps) => dps,
            Err(e) => {
                warn!("Dropping {kind:?} frame from {}: {e}", config.id);
                lock(&slot.history).record_error(&e.to_string());
                return Vec::new();
            }
        };
        lock(&slot.history).record(
            MessageType::Push,
            &frame.command.to_string(),
            serde_json::to_value(&dps).unwrap_or(Value::Null),
        );

        let events = apply_datapoints(&config.function_map(), &mut lock(&slot.state), &dps);
        self.emit(&config.id, &events);
        events
    }

    pub async fn on(&self) -> Result<CommandOutcome> {
        self.set_power(true).await
    }

    pub async fn off(&self) -> Result<CommandOutcome> {
        self.set_power(false).await
    }

    async fn set_power(&self, on: bool) -> Result<CommandOutcome> {
        let functions = self.functions();
        let mut builder = CommandBuilder::new(&functions);
        builder.power(on)?;
        self.control(builder.build()).await
    }

    /// Switch to colour mode. Hue, saturation and level are 0-100.
    pub async fn set_color(&self, hue: f64, saturation: f64, level: f64) -> Result<CommandOutcome> {
        let functions = self.functions();
        let mut builder = CommandBuilder::new(&functions);
        builder.mode(MODE_COLOUR)?.colour(
            percent("hue", hue)?,
            percent("saturation", saturation)?,
            percent("level", level)?,
        )?;
        self.control(builder.build()).await
    }

    /// Switch to white at `kelvin`, optionally with a 0-100 level.
    pub async fn set_color_temperature(&self, kelvin: u32, level: Option<f64>) -> Result<CommandOutcome> {
        let functions = self.functions();
        let mut builder = CommandBuilder::new(&functions);
        builder.mode(MODE_WHITE)?.temperature(kelvin)?;
        if let Some(level) = level {
            builder.brightness(percent("level", level)?)?;
        }
        self.control(builder.build()).await
    }

    /// Set the level in the current color mode and switch on.
    ///
    /// The protocol has no transition time, so `duration` is ignored.
    pub async fn set_level(&self, level: f64, duration: Option<Duration>) -> Result<CommandOutcome> {
        let level = percent("level", level)?;
        if let Some(duration) = duration {
            debug!("Ignoring transition of {duration:?}");
        }

        let state = self.state();
        let functions = self.functions();
        let mut builder = CommandBuilder::new(&functions);
        builder.power(true)?;
        if state.color_mode() == Some(ColorMode::Rgb) {
            builder.colour(
                state.hue().unwrap_or(0.0),
                state.saturation().unwrap_or(100.0),
                level,
            )?;
        } else {
            builder.brightness(level)?;
        }
        self.control(builder.build()).await
    }

    pub async fn set_hue(&self, hue: f64) -> Result<CommandOutcome> {
        let state = self.state();
        self.set_color(
            hue,
            state.saturation().unwrap_or(100.0),
            state.level().unwrap_or(100.0),
        )
        .await
    }

    pub async fn set_saturation(&self, saturation: f64) -> Result<CommandOutcome> {
        let state = self.state();
        self.set_color(
            state.hue().unwrap_or(0.0),
            saturation,
            state.level().unwrap_or(100.0),
        )
        .await
    }

    /// Select built-in effect `slot`, counted from 1.
    pub async fn set_effect(&self, slot: u8) -> Result<CommandOutcome> {
        let count = self.effect_count()?;
        let effect = Effect::create(slot, count)
            .ok_or_else(|| Error::invalid_argument(format!("effect {slot} is outside 1..={count}")))?;
        self.apply_effect(effect).await
    }

    pub async fn set_next_effect(&self) -> Result<CommandOutcome> {
        let count = self.effect_count()?;
        let effect = Effect::next(self.state().effect(), count)
            .ok_or_else(|| Error::invalid_argument("bulb has no effects"))?;
        self.apply_effect(effect).await
    }

    pub async fn set_previous_effect(&self) -> Result<CommandOutcome> {
        let count = self.effect_count()?;
        let effect = Effect::previous(self.state().effect(), count)
            .ok_or_else(|| Error::invalid_argument("bulb has no effects"))?;
        self.apply_effect(effect).await
    }

    fn effect_count(&self) -> Result<u8> {
        match lock(&self.config).effect_count() {
            0 => Err(Error::invalid_argument("bulb has no effects")),
            count => Ok(count),
        }
    }

    async fn apply_effect(&self, effect: Effect) -> Result<CommandOutcome> {
        let functions = self.functions();
        let mut builder = CommandBuilder::new(&functions);
        builder.mode(&effect.mode_value())?;
        self.control(builder.build()).await
    }

    /// Send any datapoint as a control command.
    pub async fn send_custom_dps(&self, code: &str, value: DpValue) -> Result<CommandOutcome> {
        let functions = self.functions();
        let mut builder = CommandBuilder::new(&functions);
        builder.raw(code, value);
        self.control(builder.build()).await
    }

    /// Ask the bulb for its full state.
    ///
    /// Does not wait for the reply; the query result arrives through
    /// [`Bulb::handle_frame`].
    pub async fn refresh(&self) -> Result<()> {
        let config = self.config();
        let (result, delta) = self
            .dispatcher
            .post_tracked(&Endpoint::from(&config), &Datapoints::new(), Verb::DpQuery)
            .await;
        self.emit(&config.id, &delta.events());
        result
    }

    /// Probe `start..=end` for this bulb in the background.
    ///
    /// Each address is asked to restate the current power state. When one
    /// acknowledges, the address is stored in the configuration, handed to
    /// the address store, and the heartbeat follows it.
    pub fn scan_network(&self, start: Ipv4Addr, end: Ipv4Addr) -> Result<()> {
        let config = self.config();
        let functions = config.function_map();
        let on = self.state().switch().is_none_or(|switch| switch.is_on());
        let mut builder = CommandBuilder::new(&functions);
        builder.power(on)?;

        let shared_config = Arc::clone(&self.config);
        let heartbeat = Arc::clone(&self.heartbeat);
        let store = self.address_store.clone();
        let id = config.id.clone();

        let run = ScanRun::new(Endpoint::from(&config), builder.build(), start, end, move |address| {
            lock(&shared_config).address = Some(address);
            if let Some(heartbeat) = lock(&heartbeat).as_ref() {
                heartbeat.retarget(address);
            }
            if let Some(store) = store {
                store(&id, address);
            }
        });
        self.scanner.start(run)
    }

    async fn control(&self, dps: Datapoints) -> Result<CommandOutcome> {
        let config = self.config();
        let slot = self.dispatcher.slot(&config.id);

        let (result, delta) = self
            .dispatcher
            .send_tracked(&Endpoint::from(&config), &dps, Verb::Control, SendPolicy::from(&config))
            .await;
        let mut events = delta.events();

        match result {
            Ok(ack) => {
                // The bulb confirms with a status push later; until then assume
                // it did what it was told.
                events.extend(apply_datapoints(&config.function_map(), &mut lock(&slot.state), &dps));
                self.emit(&config.id, &events);
                Ok(CommandOutcome::Acknowledged { ack, events })
            }
            Err(e) => {
                self.emit(&config.id, &events);
                match &self.fallback {
                    Some(fallback) if e.is_exhausted() => {
                        warn!("Delegating {dps:?} for {}: {e}", config.id);
                        fallback(&config.id, &dps);
                        Ok(CommandOutcome::Delegated { events })
                    }
                    _ => Err(e),
                }
            }
        }
    }

    fn emit(&self, id: &str, events: &[DeviceEvent]) {
        emit(self.on_event.as_deref(), id, events);
    }
}

fn percent(name: &str, value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(Error::invalid_argument(format!("{name} must be a number, got {value}")));
    }
    Ok(value.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::event::{Attribute, AttributeValue};
    use crate::testing::{ManualScheduler, MockCodec, MockTransport, Reply};
    use crate::types::Switch;

    type TestBulb = Bulb<MockCodec, MockTransport>;

    struct Harness {
        bulb: Arc<TestBulb>,
        transport: MockTransport,
        scheduler: Arc<ManualScheduler>,
        events: Arc<Mutex<Vec<DeviceEvent>>>,
        delegated: Arc<Mutex<Vec<Datapoints>>>,
        stored: Arc<Mutex<Vec<Ipv4Addr>>>,
    }

    fn config() -> BulbConfig {
        BulbConfig::new("bf01", "0123456789abcdef", Some(Ipv4Addr::new(192, 168, 1, 40)))
    }

    fn harness(config: BulbConfig, reply: Reply, with_fallback: bool) -> Harness {
        let transport = MockTransport::new(reply);
        let scheduler = Arc::new(ManualScheduler::default());
        let dispatcher = Arc::new(Dispatcher::new(
            MockCodec,
            transport.clone(),
            Arc::new(EndpointRegistry::new()),
        ));

        let events = Arc::new(Mutex::new(Vec::new()));
        let delegated = Arc::new(Mutex::new(Vec::new()));
        let stored = Arc::new(Mutex::new(Vec::new()));

        let mut bulb = Bulb::with_dispatcher(config, dispatcher, scheduler.clone());
        let sink = events.clone();
        bulb.on_event(move |_, event| lock(&sink).push(event.clone()));
        if with_fallback {
            let sink = delegated.clone();
            bulb.on_fallback(move |_, dps| lock(&sink).push(dps.clone()));
        }
        let sink = stored.clone();
        bulb.on_address_found(move |_, address| lock(&sink).push(address));

        let bulb = Arc::new(bulb);
        let weak = Arc::downgrade(&bulb);
        transport.on_reply(move |frame| {
            if let Some(bulb) = weak.upgrade() {
                bulb.handle_frame(&frame);
            }
        });

        Harness {
            bulb,
            transport,
            scheduler,
            events,
            delegated,
            stored,
        }
    }

    #[tokio::test]
    async fn test_on_is_acknowledged_and_optimistic() {
        let h = harness(config(), Reply::Ack(7), false);

        let outcome = h.bulb.on().await.unwrap();
        assert!(outcome.is_acknowledged());
        assert_eq!(outcome.events(), &[DeviceEvent::switch(Switch::On)]);
        assert_eq!(*lock(&h.events), vec![DeviceEvent::switch(Switch::On)]);
        assert_eq!(h.bulb.counters(), CounterSnapshot::default());

        let sent = h.transport.sent();
        assert_eq!(sent[0].0, Ipv4Addr::new(192, 168, 1, 40));
        assert_eq!(sent[0].1["dps"], json!({"1": true}));

        // Same state again changes nothing.
        let outcome = h.bulb.on().await.unwrap();
        assert!(outcome.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_go_to_fallback() {
        let h = harness(config(), Reply::Silent, true);

        let started = tokio::time::Instant::now();
        let outcome = h.bulb.on().await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(outcome, CommandOutcome::Delegated {
            events: vec![DeviceEvent::retries(3)],
        });
        assert_eq!(h.bulb.counters(), CounterSnapshot { retries: 3, errors: 0 });
        assert_eq!(h.transport.sent_count(), 3);
        assert_eq!(
            *lock(&h.delegated),
            vec![Datapoints::from([("1".to_string(), DpValue::Bool(true))])]
        );
        // Nothing was confirmed, so canonical state is untouched.
        assert_eq!(h.bulb.state().switch(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_without_fallback_fail() {
        let h = harness(config(), Reply::Silent, false);
        assert_eq!(h.bulb.off().await, Err(Error::AckTimeout { attempts: 3 }));
        assert_eq!(*lock(&h.events), vec![DeviceEvent::retries(3)]);
    }

    #[tokio::test]
    async fn test_protocol_error_reply() {
        let h = harness(config(), Reply::Error(7), true);
        assert_eq!(h.bulb.on().await, Err(Error::Protocol("bad crc".to_string())));
        assert_eq!(h.bulb.counters(), CounterSnapshot { retries: 0, errors: 1 });
        assert_eq!(*lock(&h.events), vec![DeviceEvent::errors(1)]);
        assert!(lock(&h.delegated).is_empty());
    }

    #[tokio::test]
    async fn test_missing_address_fails_fast() {
        let h = harness(BulbConfig::new("bf01", "0123456789abcdef", None), Reply::Ack(7), true);
        assert_eq!(h.bulb.on().await, Err(Error::Configuration { missing: "address" }));
        assert_eq!(h.transport.sent_count(), 0);
        assert_eq!(h.bulb.counters(), CounterSnapshot::default());
    }

    #[test]
    fn test_status_push_is_normalized_once() {
        let h = harness(config(), Reply::Silent, false);
        let push = MockCodec::reply(8, r#"{"devId": "bf01", "dps": {"2": "white", "3": 140}}"#);

        let events = h.bulb.handle_frame(&push);
        assert_eq!(events, vec![DeviceEvent::color_mode(ColorMode::Ct), DeviceEvent::level(50.0)]);
        assert!(h.bulb.handle_frame(&push).is_empty());
        assert_eq!(lock(&h.events).len(), 2);
        assert_eq!(h.bulb.history().summary().push_count, 2);
    }

    #[test]
    fn test_unsolicited_ack_changes_nothing() {
        let h = harness(config(), Reply::Silent, false);
        assert!(h.bulb.handle_frame(&MockCodec::reply(7, "{}")).is_empty());
        assert!(h.bulb.handle_frame(&MockCodec::error_reply(8, "bad crc")).is_empty());
        assert!(h.bulb.handle_frame(&MockCodec::reply(13, "{}")).is_empty());

        assert!(h.bulb.state().is_empty());
        assert_eq!(h.bulb.counters(), CounterSnapshot::default());
        assert!(lock(&h.events).is_empty());
    }

    #[tokio::test]
    async fn test_set_color_temperature() {
        let h = harness(config(), Reply::Ack(7), false);
        let outcome = h.bulb.set_color_temperature(2000, Some(50.0)).await.unwrap();

        assert_eq!(h.transport.sent()[0].1["dps"], json!({"2": "white", "3": 140, "4": 0}));
        assert_eq!(
            outcome.events(),
            &[
                DeviceEvent::color_mode(ColorMode::Ct),
                DeviceEvent::color_temperature(2000),
                DeviceEvent::level(50.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_set_level_follows_color_mode() {
        let h = harness(config(), Reply::Ack(7), false);
        h.bulb.set_level(50.0, None).await.unwrap();
        assert_eq!(h.transport.sent()[0].1["dps"], json!({"1": true, "3": 140}));

        h.bulb.handle_frame(&MockCodec::reply(8, r#"{"2": "colour", "5": "0000ff00f0ff80"}"#));
        h.bulb.set_level(100.0, Some(Duration::from_secs(2))).await.unwrap();

        let sent = h.transport.sent();
        let dps = &sent[1].1["dps"];
        assert_eq!(dps["1"], true);
        assert!(dps.get("3").is_none());
        assert!(dps["5"].as_str().unwrap().ends_with("00f0ffff"));
        assert_eq!(h.bulb.state().level(), Some(100.0));
    }

    #[tokio::test]
    async fn test_set_hue_keeps_other_channels() {
        let h = harness(config(), Reply::Ack(7), false);
        h.bulb.set_hue(50.0).await.unwrap();

        assert_eq!(h.transport.sent()[0].1["dps"]["2"], "colour");
        let state = h.bulb.state();
        assert_eq!(state.color_mode(), Some(ColorMode::Rgb));
        assert_eq!(state.saturation(), Some(100.0));
        assert_eq!(state.level(), Some(100.0));
        assert_eq!(
            state.get(Attribute::ColorName),
            Some(&AttributeValue::Name(crate::types::ColorName::Cyan))
        );
    }

    #[tokio::test]
    async fn test_effects_wrap_around() {
        let h = harness(config(), Reply::Ack(7), false);
        h.bulb.set_effect(4).await.unwrap();
        assert_eq!(h.bulb.state().effect_name(), Some("scene_4"));

        h.bulb.set_next_effect().await.unwrap();
        assert_eq!(h.bulb.state().effect_name(), Some("scene_1"));

        h.bulb.set_previous_effect().await.unwrap();
        assert_eq!(h.bulb.state().effect_name(), Some("scene_4"));

        assert!(matches!(h.bulb.set_effect(5).await, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_effects_disabled() {
        let config = BulbConfig {
            effect_count: 0,
            ..config()
        };
        let h = harness(config, Reply::Ack(7), false);
        assert!(matches!(h.bulb.set_next_effect().await, Err(Error::InvalidArgument(_))));
        assert!(matches!(h.bulb.set_effect(1).await, Err(Error::InvalidArgument(_))));
        assert_eq!(h.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_level_is_rejected() {
        let h = harness(config(), Reply::Ack(7), false);
        assert!(matches!(h.bulb.set_level(f64::NAN, None).await, Err(Error::InvalidArgument(_))));
        assert_eq!(h.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_send_custom_dps() {
        let h = harness(config(), Reply::Ack(7), false);
        let outcome = h.bulb.send_custom_dps("101", DpValue::parse("7")).await.unwrap();
        assert!(outcome.events().is_empty());
        assert_eq!(h.transport.sent()[0].1["dps"], json!({"101": 7}));
    }

    #[tokio::test]
    async fn test_refresh_does_not_wait() {
        let h = harness(config(), Reply::Silent, false);
        h.bulb.refresh().await.unwrap();
        assert_eq!(h.transport.sent()[0].1["verb"], "DP_QUERY");

        let events = h.bulb.handle_frame(&MockCodec::reply(10, r#"{"dps": {"1": false}}"#));
        assert_eq!(events, vec![DeviceEvent::switch(Switch::Off)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_config_reinitializes() {
        let h = harness(config(), Reply::Silent, false);
        h.bulb.handle_frame(&MockCodec::reply(8, r#"{"1": true}"#));
        h.bulb.refresh().await.unwrap();
        assert!(!h.bulb.state().is_empty());

        h.bulb.update_config(BulbConfig {
            repeat: 1,
            ..config()
        });
        assert!(h.bulb.state().is_empty());
        assert!(h.bulb.history().is_empty());
        assert_eq!(h.bulb.config().repeat(), 1);
        assert_eq!(h.bulb.heartbeat_failures(), Some(0));
        assert_eq!(h.scheduler.delays(), vec![Duration::from_secs(20)]);

        // A second initialization replaces the heartbeat instead of adding one.
        h.bulb.initialize();
        assert_eq!(h.scheduler.pending(), 2);
        // The stopped heartbeat's task is a no-op; only the new one beats.
        h.scheduler.run_until_idle(2).await;
        assert_eq!(h.transport.sent_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_network_stores_address() {
        let h = harness(BulbConfig::new("bf01", "0123456789abcdef", None), Reply::Fail, false);
        h.transport.set_reply(Ipv4Addr::new(10, 0, 0, 7), Reply::Ack(7));

        h.bulb
            .scan_network(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 20))
            .unwrap();
        assert_eq!(
            h.bulb.scan_network(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 20)),
            Err(Error::ScanInProgress)
        );
        h.scheduler.run_until_idle(20).await;

        assert_eq!(h.bulb.scan_state(), ScanState::Found(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(h.bulb.config().address, Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(*lock(&h.stored), vec![Ipv4Addr::new(10, 0, 0, 7)]);
        assert_eq!(h.transport.sent()[0].1["dps"], json!({"1": true}));
    }

    #[test]
    fn test_non_ascii_colour_push_is_dropped() {
        let h = harness(config(), Reply::Silent, false);
        let events = h.bulb.handle_frame(&MockCodec::reply(8, r#"{"2": "colour", "5": "abcé123"}"#));

        assert_eq!(events, vec![DeviceEvent::color_mode(ColorMode::Rgb)]);
        assert_eq!(h.bulb.state().hue(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_scan_leaves_counters_alone() {
        let h = harness(BulbConfig::new("bf01", "0123456789abcdef", None), Reply::Fail, false);

        h.bulb
            .scan_network(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 20))
            .unwrap();
        assert_eq!(h.scheduler.run_until_idle(30).await, 20);

        assert_eq!(h.bulb.scan_state(), ScanState::Exhausted);
        assert_eq!(h.bulb.counters(), CounterSnapshot::default());
        assert!(lock(&h.events).is_empty());
        assert!(lock(&h.stored).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_heartbeat_emits_retries() {
        let h = harness(config(), Reply::Silent, false);
        h.bulb.initialize();
        h.scheduler.run_next().await;

        assert_eq!(h.bulb.counters(), CounterSnapshot { retries: 1, errors: 0 });
        assert_eq!(*lock(&h.events), vec![DeviceEvent::retries(1)]);
        assert_eq!(h.bulb.heartbeat_failures(), Some(1));
    }

    #[tokio::test]
    async fn test_zero_heartbeat_interval_disables_heartbeat() {
        let config = BulbConfig {
            heartbeat_secs: 0,
            ..config()
        };
        let h = harness(config, Reply::Ack(7), false);
        h.bulb.initialize();

        assert_eq!(h.bulb.heartbeat_failures(), None);
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.bulb.diagnostics()["heartbeat"]["running"], false);
    }

    #[tokio::test]
    async fn test_diagnostics() {
        let h = harness(config(), Reply::Ack(7), false);
        h.bulb.on().await.unwrap();

        let diag = h.bulb.diagnostics();
        assert_eq!(diag["id"], "bf01");
        assert_eq!(diag["address"], "192.168.1.40");
        assert_eq!(diag["config"]["repeat"], 3);
        assert_eq!(diag["counters"], json!({"retries": 0, "errors": 0}));
        assert_eq!(diag["state"]["switch"], "on");
        assert_eq!(diag["history"]["send_count"], 1);
        assert_eq!(diag["history"]["ack_count"], 1);
        assert_eq!(diag["heartbeat"]["running"], false);
        assert_eq!(diag["scan"], "Idle");
    }
}
