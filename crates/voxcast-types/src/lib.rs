//! Shared domain types for the Voxcast voice-broadcast platform.
//!
//! This crate defines the data model that flows between the persistence
//! layer, the dispatch engine, the telephony adapter and the HTTP API:
//! broadcasts, calls, opt-outs, live event payloads, voice profiles and
//! the message template utility.

pub mod broadcast;
pub mod call;
pub mod events;
pub mod optout;
pub mod template;
pub mod voice;

pub use broadcast::{
    Broadcast, BroadcastConfig, BroadcastStats, BroadcastStatus, ComplianceConfig,
};
pub use call::{Call, CallStatus, Contact};
pub use events::{
    broadcast_room, BroadcastEvent, BroadcastUpdate, CallUpdate, Envelope, GLOBAL_ROOM,
};
pub use optout::{OptOut, OptOutSource};
pub use voice::{AudioAsset, VoiceProfile};
