//! The broadcast dispatch engine.
//!
//! One periodic task per active campaign selects eligible calls, applies
//! the compliance filter, dials through the telephony provider and retires
//! itself once the campaign's call population drains. The engine owns no
//! transport and no business data: it talks to the persistence gateway for
//! state, to [`TelephonyProvider`](voxcast_telephony::TelephonyProvider)
//! for dialing, and to a [`Publisher`] for live updates.

pub mod compliance;
pub mod dispatcher;
pub mod error;
pub mod publish;

pub use compliance::{DndChecker, DndOutcome, HttpDndChecker, NoopDnd};
pub use dispatcher::{Dispatcher, EngineSettings, TickOutcome, DEFAULT_POLL_INTERVAL};
pub use error::EngineError;
pub use publish::{ChannelPublisher, NullPublisher, Publisher};
