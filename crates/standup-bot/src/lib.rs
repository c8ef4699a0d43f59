//! `standup-bot`: the live side of the standup bot.
//!
//! Everything here runs on Tokio: the IRC connection, the notifier that fans
//! a message out to channels or nicks, and the timer loop that walks each
//! cycle through its reminder phases.
//!
//! # Architecture
//!
//! ```text
//! PhaseTimers (standup-core)
//!     │
//!     ▼
//! ReminderScheduler   ← sleeps until the next (time, phase), fires it
//!     │                  reads MissingSet from MembershipStore
//!     ▼
//! Notifier            ← concurrent fan-out, per-target timeout
//!     │
//!     ▼
//! Transport           ← IrcTransport in production, fakes in tests
//! ```
//!
//! At the deadline the scheduler hands over to [`CycleResetter`], which
//! clears every presence marker before the next phase is considered.

pub mod clock;
pub mod connection;
pub mod error;
pub mod notify;
pub mod reset;
pub mod scheduler;

pub use clock::{Clock, MonotonicClock, SystemClock};
pub use connection::IrcTransport;
pub use error::BotError;
pub use notify::{DeliveryFailure, DeliveryKind, DeliveryReport, Notifier, Transport};
pub use reset::{CycleResetter, ResetOutcome};
pub use scheduler::{PhaseReport, ReminderScheduler};
