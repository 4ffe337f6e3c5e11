//! Blocking clipboard facade.
//!
//! Wraps a [`SelectionMachine`] in the synchronous API applications expect:
//! store content, then ask for text or formats and get an answer within a
//! bounded wait. While a call waits it drives the caller's [`EventPump`],
//! so peer replies can be dispatched into the machine. A timeout yields
//! whatever arrived, not an error.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::data::DataObject;
use crate::error::SelectionResult;
use crate::handlers::{HandlerChain, IdentityCodec, SerializedCodec};
use crate::selection::SelectionMachine;
use crate::transport::{
    Atom, ClearEvent, NotifyEvent, RequestEvent, Timestamp, Transport, NONE,
};
use crate::wait::{wait_until, EventPump};

/// Configuration for the clipboard facade
#[derive(Debug, Clone)]
pub struct ClipboardConfig {
    /// Selection to exchange through
    pub selection: String,
    /// How long blocking calls keep pumping before settling for what arrived
    pub wait_timeout: Duration,
    /// Serve and retrieve text targets only, refusing application formats
    pub legacy_text_only: bool,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            selection: "CLIPBOARD".to_string(),
            wait_timeout: Duration::from_secs(4),
            legacy_text_only: false,
        }
    }
}

/// Synchronous clipboard over one selection
pub struct Clipboard<T: Transport> {
    machine: Rc<RefCell<SelectionMachine<T>>>,
    config: ClipboardConfig,
}

impl<T: Transport> Clipboard<T> {
    /// Clipboard carrying application formats as opaque bytes
    pub fn new(transport: T, config: ClipboardConfig) -> SelectionResult<Self> {
        Self::with_codec(transport, config, Box::new(IdentityCodec))
    }

    /// Clipboard with a custom codec for serialized application formats
    pub fn with_codec(
        transport: T,
        config: ClipboardConfig,
        codec: Box<dyn SerializedCodec>,
    ) -> SelectionResult<Self> {
        let chain = if config.legacy_text_only {
            HandlerChain::text_only()
        } else {
            HandlerChain::standard(codec)
        };
        let machine = SelectionMachine::new(transport, &config.selection, chain)?;
        Ok(Self {
            machine: Rc::new(RefCell::new(machine)),
            config,
        })
    }

    /// Shared handle to the underlying machine, for event-loop dispatch
    pub fn machine(&self) -> Rc<RefCell<SelectionMachine<T>>> {
        Rc::clone(&self.machine)
    }

    /// Register a format name, interning its atom on first use.
    ///
    /// A peer's offer of an unregistered format is invisible to
    /// [`get_formats`](Self::get_formats) and skipped by
    /// [`get_content`](Self::get_content).
    pub fn format_id(&self, name: &str) -> SelectionResult<Atom> {
        self.machine.borrow_mut().format_id(name)
    }

    // ===== Event dispatch =====

    /// Route a conversion request from a peer into the machine
    pub fn handle_request_event(&self, ev: RequestEvent) -> SelectionResult<bool> {
        self.machine.borrow_mut().handle_request_event(ev)
    }

    /// Route an owner's reply into the machine
    pub fn handle_notify_event(&self, ev: NotifyEvent) -> SelectionResult<bool> {
        self.machine.borrow_mut().handle_notify_event(ev)
    }

    /// Route an ownership-loss notice into the machine
    pub fn handle_clear_event(&self, ev: ClearEvent) -> SelectionResult<bool> {
        self.machine.borrow_mut().handle_clear_event(ev)
    }

    // ===== Storing =====

    /// Claim the selection and serve `data` to peers.
    ///
    /// With `persist`, the contents are also offered to a clipboard
    /// manager so they outlive this client. Managers are optional;
    /// that handoff failing is logged and swallowed.
    pub fn set_content(
        &self,
        data: DataObject,
        time: Timestamp,
        persist: bool,
    ) -> SelectionResult<()> {
        let mut machine = self.machine.borrow_mut();
        machine.set_outgoing(data, time)?;
        if persist && machine.is_owner() {
            let selection = machine.selection();
            if let Err(err) = machine.transport().persist_to_manager(selection) {
                debug!(error = %err, "no clipboard manager took the contents");
            }
        }
        Ok(())
    }

    /// Claim the selection with a single text payload
    pub fn set_text(&self, text: impl Into<String>, time: Timestamp) -> SelectionResult<()> {
        let mut machine = self.machine.borrow_mut();
        let utf8 = machine.atoms().utf8_string;
        machine.set_outgoing(DataObject::with_text(utf8, text), time)
    }

    /// Release the selection; any in-flight retrieval is abandoned
    pub fn clear(&self, time: Timestamp) -> SelectionResult<()> {
        let mut machine = self.machine.borrow_mut();
        machine.abandon_pending();
        machine.clear_outgoing(time)
    }

    // ===== Retrieving =====

    /// Names of the formats currently available on the selection.
    ///
    /// Serving our own content answers locally; otherwise the owner is
    /// asked and a timeout reports no formats.
    pub fn get_formats<P: EventPump>(
        &mut self,
        pump: &mut P,
        time: Timestamp,
    ) -> SelectionResult<Vec<String>> {
        let local = {
            let machine = self.machine.borrow();
            machine.outgoing().filter(|_| machine.is_owner()).map(|data| data.formats())
        };
        let offered = match local {
            Some(formats) => formats,
            None => {
                let no_owner = {
                    let machine = self.machine.borrow();
                    machine.transport().selection_owner(machine.selection())? == NONE
                };
                if no_owner {
                    Vec::new()
                } else {
                    self.fetch_targets(pump, time)?.unwrap_or_default()
                }
            }
        };
        let machine = self.machine.borrow();
        let atoms = *machine.atoms();
        let mut names = Vec::new();
        for atom in offered {
            if atom == atoms.targets || atom == atoms.delete {
                continue;
            }
            let name = if atom == atoms.string {
                Some("Text".to_string())
            } else if atom == atoms.utf8_string || atom == atoms.utf16_string {
                Some("UnicodeText".to_string())
            } else if atom == atoms.bitmap {
                Some("Bitmap".to_string())
            } else if atom == atoms.pixmap {
                Some("DeviceIndependentBitmap".to_string())
            } else if atom == atoms.colormap {
                Some("Palette".to_string())
            } else if let Some(known) = machine.registry().name_for(atom) {
                Some(known.to_string())
            } else {
                machine.transport().atom_name(atom)?
            };
            if let Some(name) = name {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Retrieve every representation the owner offers that we can carry.
    ///
    /// On timeout the partially transferred content is returned as-is.
    pub fn get_content<P: EventPump>(
        &mut self,
        pump: &mut P,
        time: Timestamp,
    ) -> SelectionResult<DataObject> {
        {
            let machine = self.machine.borrow();
            if machine.is_owner() {
                return Ok(machine.outgoing().cloned().unwrap_or_default());
            }
            if machine.transport().selection_owner(machine.selection())? == NONE {
                return Ok(DataObject::new());
            }
        }
        let Some(offered) = self.fetch_targets(pump, time)? else {
            return Ok(DataObject::new());
        };
        let wanted = {
            let machine = self.machine.borrow();
            let atoms = machine.atoms();
            offered
                .into_iter()
                .filter(|&t| t != atoms.targets && t != atoms.delete)
                .filter(|&t| !self.config.legacy_text_only || atoms.is_text_target(t))
                .collect::<Vec<_>>()
        };
        self.retrieve(pump, &wanted, time)
    }

    /// Retrieve the selection as text, preferring richer encodings.
    ///
    /// `None` means no owner, no text on offer, or a silent owner.
    pub fn get_text<P: EventPump>(
        &mut self,
        pump: &mut P,
        time: Timestamp,
    ) -> SelectionResult<Option<String>> {
        {
            let machine = self.machine.borrow();
            if machine.is_owner() {
                return Ok(machine
                    .outgoing()
                    .and_then(|data| data.text())
                    .map(str::to_string));
            }
            if machine.transport().selection_owner(machine.selection())? == NONE {
                return Ok(None);
            }
        }
        let Some(offered) = self.fetch_targets(pump, time)? else {
            return Ok(None);
        };
        let target = {
            let machine = self.machine.borrow();
            let atoms = machine.atoms();
            [atoms.utf8_string, atoms.utf16_string, atoms.string]
                .into_iter()
                .find(|t| offered.contains(t))
        };
        let Some(target) = target else {
            return Ok(None);
        };
        let content = self.retrieve(pump, &[target], time)?;
        Ok(content.text().map(str::to_string))
    }

    fn fetch_targets<P: EventPump>(
        &self,
        pump: &mut P,
        time: Timestamp,
    ) -> SelectionResult<Option<Vec<Atom>>> {
        self.machine.borrow_mut().begin_enumerate(time)?;
        let done = self.machine();
        let finished = wait_until(pump, self.config.wait_timeout, || {
            done.borrow().pending().is_none()
        })?;
        let mut machine = self.machine.borrow_mut();
        if !finished {
            debug!(selection = %self.config.selection, "format enumeration timed out");
            machine.abandon_pending();
            return Ok(None);
        }
        Ok(machine.incoming_targets().map(<[Atom]>::to_vec))
    }

    fn retrieve<P: EventPump>(
        &self,
        pump: &mut P,
        targets: &[Atom],
        time: Timestamp,
    ) -> SelectionResult<DataObject> {
        if targets.is_empty() {
            return Ok(DataObject::new());
        }
        self.machine.borrow_mut().begin_retrieve(targets, time)?;
        let done = self.machine();
        let finished = wait_until(pump, self.config.wait_timeout, || {
            done.borrow().pending().is_none()
        })?;
        let mut machine = self.machine.borrow_mut();
        if !finished {
            debug!(
                selection = %self.config.selection,
                "content transfer timed out, returning what arrived"
            );
            machine.abandon_pending();
        }
        Ok(machine.take_incoming())
    }
}
