//! # Vaultgate Notify
//!
//! Notification fan-out: tells a user's live sessions that a consent
//! request is waiting, and that one was resolved.
//!
//! Implementations plug in behind [`Notifier`]; [`MemoryNotifier`] is the
//! in-process one used by the server and by tests.

pub mod error;
pub mod event;
pub mod memory;
pub mod notifier;

pub use error::{NotifyError, Result};
pub use event::ConsentEvent;
pub use memory::{MemoryNotifier, DEFAULT_CAPACITY};
pub use notifier::{Notifier, Subscription};
