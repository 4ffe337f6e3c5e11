//! Selection protocol core for clipboard exchange between display clients.
//!
//! Implements the ownership, negotiation and transfer semantics of the
//! ICCCM selection model without binding to a display library. The owner
//! of a selection advertises its formats through the TARGETS pseudo-target
//! and converts content on demand; a requestor asks for conversions and
//! collects the asynchronous replies. All display traffic goes through the
//! [`Transport`] trait supplied by the embedding application.
//!
//! # Architecture
//!
//! ```text
//! Clipboard (blocking facade, timeout-bounded)
//!     |
//! SelectionMachine (event-driven state machine, one per selection)
//!     |            \
//! HandlerChain      FormatRegistry (names <-> atoms)
//! (encode/decode)
//!     |
//! Transport (display connection supplied by the caller)
//! ```
//!
//! The machine never blocks and never spins up threads; the caller's
//! event loop feeds it [`RequestEvent`], [`NotifyEvent`] and
//! [`ClearEvent`] values, and the facade pumps that loop while it waits.
//!
//! # Example
//!
//! ```no_run
//! use selection_core::{Clipboard, ClipboardConfig, SelectionResult};
//! # fn run<T: selection_core::Transport>(transport: T) -> SelectionResult<()> {
//! let clipboard = Clipboard::new(transport, ClipboardConfig::default())?;
//! clipboard.set_text("hello", 0)?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod clipboard;
pub mod data;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod selection;
pub mod transport;
pub mod wait;

#[cfg(test)]
pub(crate) mod testutil;

pub use clipboard::{Clipboard, ClipboardConfig};
pub use data::{DataObject, Value};
pub use error::{SelectionError, SelectionResult};
pub use handlers::{
    unescape_unicode, EncodedProperty, FormatHandler, HandlerChain, IdentityCodec,
    SerializedCodec, SerializedHandler, TargetsHandler, TextHandler,
};
pub use registry::{FormatRegistry, WellKnownAtoms};
pub use selection::{PendingKind, PendingOperation, SelectionMachine};
pub use transport::{
    Atom, ClearEvent, NotifyEvent, PropertyValue, RequestEvent, Timestamp, Transport, Window,
    CURRENT_TIME, NONE,
};
pub use wait::{wait_until, EventPump};

/// Commonly used types for building on the selection core
pub mod prelude {
    pub use crate::clipboard::{Clipboard, ClipboardConfig};
    pub use crate::data::{DataObject, Value};
    pub use crate::error::{SelectionError, SelectionResult};
    pub use crate::selection::SelectionMachine;
    pub use crate::transport::{
        Atom, ClearEvent, NotifyEvent, RequestEvent, Timestamp, Transport, Window,
    };
    pub use crate::wait::EventPump;
}
