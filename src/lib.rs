//! # tuya_lights_rs
//!
//! An async Rust library for driving Tuya-style smart bulbs over the local
//! network, without a cloud relay.
//!
//! The crate is the **delivery and state-sync layer** between capability calls
//! (turn on, set color, ...) and an unreliable local link. The wire codec
//! (encryption, framing, checksums) and the socket are supplied by the caller
//! through the [`FrameCodec`] and [`Transport`] traits.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tuya_lights_rs::{Bulb, BulbConfig};
//!
//! async fn control_bulb(codec: MyCodec, transport: MyTransport) -> Result<(), tuya_lights_rs::Error> {
//!     let config = BulbConfig::new("bf01", "0123456789abcdef", Some("192.168.1.40".parse().unwrap()));
//!     let mut bulb = Bulb::new(config, codec, transport);
//!     bulb.on_event(|id, event| println!("{id}: {event}"));
//!     bulb.initialize();
//!
//!     // Feed every inbound frame from the transport to the bulb:
//!     //     bulb.handle_frame(&bytes);
//!
//!     bulb.set_color(66.7, 100.0, 50.0).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Single-flight delivery**: one command in flight per bulb, retried with a
//!   bounded timeout by the [`Dispatcher`]
//! - **Fallback**: commands that exhaust their attempts go to a callback
//!   registered with [`Bulb::on_fallback`]
//! - **Heartbeat**: periodic liveness probe via [`Heartbeat`]
//! - **State sync**: raw datapoints become [`DeviceEvent`]s, emitted only when
//!   an attribute actually changes
//! - **Unit remapping**: hardware ranges from the [`FunctionMap`] to 0-100
//!   levels, mireds and Kelvin with [`remap`]
//! - **Network scan**: find a bulb's address by probing a range with
//!   [`Bulb::scan_network`]
//!
//! ## Runtime Selection
//!
//! This library is runtime-agnostic. Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! tuya-lights-rs = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! tuya-lights-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! tuya-lights-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Feature Flags
//!
//! - `runtime-tokio` (default): Use the tokio async runtime
//! - `runtime-async-std`: Use the async-std runtime
//! - `runtime-smol`: Use the smol runtime

mod ack;
mod bulb;
mod command;
mod config;
mod dispatcher;
mod errors;
mod event;
mod heartbeat;
mod history;
mod normalizer;
mod protocol;
mod registry;
pub mod runtime;
mod scanner;
mod status;
mod types;

#[cfg(test)]
mod testing;

// Re-export public API
pub use ack::{AckSlot, PendingAck};
pub use bulb::{AddressStore, Bulb, CommandOutcome, Fallback};
pub use command::{CommandBuilder, MODE_COLOUR, MODE_WHITE};
pub use config::{BulbConfig, ColourRanges, Function, FunctionMap, FunctionSpec, FunctionValues, Range};
pub use dispatcher::{Dispatcher, Endpoint, SendPolicy};
pub use errors::Error;
pub use event::{Attribute, AttributeValue, DeviceEvent, EventCallback};
pub use heartbeat::Heartbeat;
pub use history::{HistoryEntry, HistorySummary, MessageHistory, MessageType};
pub use normalizer::{apply_datapoints, candidates};
pub use protocol::{
    Datapoints, DecodedFrame, DpValue, FrameCodec, FrameKind, Transport, Verb, parse_datapoints,
};
pub use registry::{CounterDelta, CounterSnapshot, Counters, EndpointRegistry, EndpointSlot};
pub use scanner::{ScanRun, ScanState, Scanner};
pub use status::DeviceState;
pub use types::{
    Color, ColorMode, ColorName, Effect, MIREDS_MAX, MIREDS_MIN, Switch, kelvin_to_mireds,
    mireds_to_kelvin, remap,
};
