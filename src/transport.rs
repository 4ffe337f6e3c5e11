//! Display transport abstraction.
//!
//! The protocol core never talks to a display server directly. Everything it
//! needs — atom interning, ownership calls, property I/O, event delivery —
//! goes through the [`Transport`] trait, so the same state machine runs
//! against a live X connection or an in-memory fake in tests.

use crate::error::SelectionResult;

/// Interned identifier for a format or selection name
pub type Atom = u32;

/// Window identifier on the display connection
pub type Window = u32;

/// Server timestamp attached to selection events
pub type Timestamp = u32;

/// The null atom / null window / null property
pub const NONE: u32 = 0;

/// Timestamp meaning "now"; peers substitute the current server time
pub const CURRENT_TIME: Timestamp = 0;

/// A peer asks the owner to convert the selection to a target format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestEvent {
    /// Selection being requested
    pub selection: Atom,
    /// Format the requestor wants
    pub target: Atom,
    /// Property on the requestor's window to write into (may be [`NONE`])
    pub property: Atom,
    /// Window that issued the request
    pub requestor: Window,
    /// Time of the request
    pub time: Timestamp,
}

/// The owner answers a conversion we asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyEvent {
    /// Selection that was converted
    pub selection: Atom,
    /// Target we asked for
    pub target: Atom,
    /// Property holding the result, or [`NONE`] for a refusal
    pub property: Atom,
    /// Window the result was written to
    pub requestor: Window,
    /// Time of the conversion
    pub time: Timestamp,
}

/// The server tells us another client took the selection away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearEvent {
    /// Selection that was lost
    pub selection: Atom,
    /// Time ownership changed
    pub time: Timestamp,
}

/// Raw property contents read back from a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue {
    /// Type atom the writer declared
    pub ty: Atom,
    /// Element width in bits (8 or 32)
    pub format: u8,
    /// Payload bytes; for 32-bit data, native-endian u32 words
    pub data: Vec<u8>,
}

impl PropertyValue {
    /// Interpret 32-bit property data as a list of atoms.
    ///
    /// Truncates a trailing partial word rather than failing; a damaged
    /// property is treated as holding fewer entries.
    pub fn as_atoms(&self) -> Vec<Atom> {
        self.data
            .chunks_exact(4)
            .map(|w| u32::from_ne_bytes([w[0], w[1], w[2], w[3]]))
            .collect()
    }
}

/// Low-level display operations the selection core depends on.
///
/// Implementations are expected to be thin: one call here maps to one
/// request on the wire. The core does all sequencing and state tracking.
pub trait Transport {
    /// Resolve a name to its interned atom, creating it if needed
    fn intern_atom(&self, name: &str) -> SelectionResult<Atom>;

    /// Look up the name of an interned atom, if the server knows it
    fn atom_name(&self, atom: Atom) -> SelectionResult<Option<String>>;

    /// The hidden window this client uses for selection traffic
    fn local_window(&self) -> Window;

    /// Current owner window of a selection, or [`NONE`]
    fn selection_owner(&self, selection: Atom) -> SelectionResult<Window>;

    /// Claim or release ownership; `owner` of [`NONE`] releases
    fn set_selection_owner(
        &self,
        selection: Atom,
        owner: Window,
        time: Timestamp,
    ) -> SelectionResult<()>;

    /// Ask the current owner to convert `selection` to `target`,
    /// delivering the result into `property` on `requestor`
    fn convert_selection(
        &self,
        selection: Atom,
        target: Atom,
        property: Atom,
        requestor: Window,
        time: Timestamp,
    ) -> SelectionResult<()>;

    /// Replace a window property with 8-bit data
    fn change_property8(
        &self,
        window: Window,
        property: Atom,
        ty: Atom,
        data: &[u8],
    ) -> SelectionResult<()>;

    /// Replace a window property with 32-bit data
    fn change_property32(
        &self,
        window: Window,
        property: Atom,
        ty: Atom,
        data: &[u32],
    ) -> SelectionResult<()>;

    /// Read a window property in full, or `None` if it does not exist
    fn get_property(
        &self,
        window: Window,
        property: Atom,
    ) -> SelectionResult<Option<PropertyValue>>;

    /// Delete a window property
    fn delete_property(&self, window: Window, property: Atom) -> SelectionResult<()>;

    /// Send a SelectionNotify event to a requestor window
    fn send_notify(&self, event: NotifyEvent) -> SelectionResult<()>;

    /// Release any display-side buffers from previous exports
    fn free_exported_buffers(&self) -> SelectionResult<()>;

    /// Best-effort handoff of current contents to a clipboard manager.
    ///
    /// Failure here is ignored by callers; a missing manager is normal.
    fn persist_to_manager(&self, selection: Atom) -> SelectionResult<()>;
}
