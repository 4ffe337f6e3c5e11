//! Selection ownership and transfer state machine.
//!
//! One [`SelectionMachine`] tracks a single selection end to end: the
//! content it serves while it owns the selection, the conversions it has
//! outstanding against a remote owner, and the replies accumulated so far.
//! It is event-driven and never blocks; the caller feeds it the three
//! selection events from its loop and polls for completion.

use tracing::{debug, trace, warn};

use crate::data::{DataObject, Value};
use crate::error::{SelectionError, SelectionResult};
use crate::handlers::{EncodedProperty, HandlerChain};
use crate::registry::{FormatRegistry, WellKnownAtoms};
use crate::transport::{
    Atom, ClearEvent, NotifyEvent, RequestEvent, Timestamp, Transport, NONE,
};

/// What an in-flight request is waiting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKind {
    /// A TARGETS reply naming the owner's formats
    EnumeratingFormats,
    /// A single content conversion
    RetrievingContent,
    /// Several content conversions; counts replies still outstanding
    AwaitingConversions(usize),
}

/// An outstanding request against the remote owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    /// What completion means
    pub kind: PendingKind,
    /// Targets we asked for; replies for anything else are stale
    pub targets: Vec<Atom>,
}

/// Event-driven protocol core for one selection
pub struct SelectionMachine<T: Transport> {
    transport: T,
    selection: Atom,
    selection_name: String,
    atoms: WellKnownAtoms,
    registry: FormatRegistry,
    chain: HandlerChain,
    outgoing: Option<DataObject>,
    owned: bool,
    incoming: DataObject,
    incoming_targets: Option<Vec<Atom>>,
    pending: Option<PendingOperation>,
}

impl<T: Transport> SelectionMachine<T> {
    /// Machine for the selection named `selection_name`, serving and
    /// decoding formats through `chain`
    pub fn new(transport: T, selection_name: &str, chain: HandlerChain) -> SelectionResult<Self> {
        let selection = transport.intern_atom(selection_name)?;
        let atoms = WellKnownAtoms::intern(&transport)?;
        let registry = FormatRegistry::with_well_known(&transport)?;
        Ok(Self {
            transport,
            selection,
            selection_name: selection_name.to_string(),
            atoms,
            registry,
            chain,
            outgoing: None,
            owned: false,
            incoming: DataObject::new(),
            incoming_targets: None,
            pending: None,
        })
    }

    /// The selection atom this machine manages
    pub fn selection(&self) -> Atom {
        self.selection
    }

    /// Protocol atoms interned for this connection
    pub fn atoms(&self) -> &WellKnownAtoms {
        &self.atoms
    }

    /// The format registry gating which peer formats are visible
    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Register a caller format name, interning its atom on first use
    pub fn format_id(&mut self, name: &str) -> SelectionResult<Atom> {
        self.registry.id_for(&self.transport, name)
    }

    /// Borrow the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// True while this client holds the selection
    pub fn is_owner(&self) -> bool {
        self.owned
    }

    /// The request currently in flight, if any
    pub fn pending(&self) -> Option<&PendingOperation> {
        self.pending.as_ref()
    }

    /// Content we are serving as owner, if any
    pub fn outgoing(&self) -> Option<&DataObject> {
        self.outgoing.as_ref()
    }

    /// Format list from the last completed enumeration
    pub fn incoming_targets(&self) -> Option<&[Atom]> {
        self.incoming_targets.as_deref()
    }

    /// Peek at content retrieved so far
    pub fn incoming(&self) -> &DataObject {
        &self.incoming
    }

    /// Take ownership of whatever content has been retrieved
    pub fn take_incoming(&mut self) -> DataObject {
        std::mem::take(&mut self.incoming)
    }

    /// Drop an in-flight request; a late reply will be treated as stale
    pub fn abandon_pending(&mut self) {
        if self.pending.take().is_some() {
            debug!(selection = %self.selection_name, "abandoning in-flight request");
        }
    }

    // ===== Owner side =====

    /// Claim the selection and start serving `data`.
    ///
    /// Ownership is verified with the server after the claim; another
    /// client can win the race, in which case we do not serve.
    pub fn set_outgoing(&mut self, data: DataObject, time: Timestamp) -> SelectionResult<()> {
        let window = self.transport.local_window();
        self.transport.free_exported_buffers()?;
        self.transport.set_selection_owner(self.selection, window, time)?;
        self.owned = self.transport.selection_owner(self.selection)? == window;
        if self.owned {
            debug!(
                selection = %self.selection_name,
                formats = data.len(),
                "claimed selection"
            );
            self.outgoing = Some(data);
        } else {
            warn!(selection = %self.selection_name, "selection claim lost to another client");
            self.outgoing = None;
        }
        Ok(())
    }

    /// Release the selection and stop serving
    pub fn clear_outgoing(&mut self, time: Timestamp) -> SelectionResult<()> {
        if self.owned {
            self.transport.set_selection_owner(self.selection, NONE, time)?;
        }
        self.owned = false;
        self.outgoing = None;
        self.transport.free_exported_buffers()?;
        debug!(selection = %self.selection_name, "released selection");
        Ok(())
    }

    /// Answer a conversion request from a peer.
    ///
    /// Returns `Ok(false)` if the event is for another selection.
    pub fn handle_request_event(&mut self, ev: RequestEvent) -> SelectionResult<bool> {
        if ev.selection != self.selection {
            return Ok(false);
        }

        // Obsolete clients pass a null property; the target doubles as one.
        let property = if ev.property == NONE { ev.target } else { ev.property };

        if ev.target == self.atoms.delete {
            return self.handle_delete_request(ev, property).map(|_| true);
        }

        let encoded = self
            .outgoing
            .as_ref()
            .filter(|_| self.owned)
            .and_then(|data| self.chain.encode(data, ev.target, &self.atoms));

        let reply_property = match encoded {
            Some(EncodedProperty::Bytes { ty, data }) => {
                trace!(
                    target = ev.target,
                    requestor = ev.requestor,
                    len = data.len(),
                    "serving conversion"
                );
                self.transport
                    .change_property8(ev.requestor, property, ty, &data)?;
                property
            }
            Some(EncodedProperty::Atoms { ty, atoms }) => {
                trace!(
                    target = ev.target,
                    requestor = ev.requestor,
                    count = atoms.len(),
                    "serving target list"
                );
                self.transport
                    .change_property32(ev.requestor, property, ty, &atoms)?;
                property
            }
            None => {
                debug!(
                    target = ev.target,
                    requestor = ev.requestor,
                    "refusing unsupported conversion"
                );
                NONE
            }
        };

        self.transport.send_notify(NotifyEvent {
            selection: ev.selection,
            target: ev.target,
            property: reply_property,
            requestor: ev.requestor,
            time: ev.time,
        })?;
        Ok(true)
    }

    /// The DELETE pseudo-target: a peer asks us to drop the content it
    /// just took, completing a cut. We acknowledge with a zero-length
    /// property, then release the selection.
    fn handle_delete_request(&mut self, ev: RequestEvent, property: Atom) -> SelectionResult<()> {
        let reply_property = if self.owned {
            self.transport
                .change_property8(ev.requestor, property, self.atoms.delete, &[])?;
            property
        } else {
            NONE
        };
        self.transport.send_notify(NotifyEvent {
            selection: ev.selection,
            target: ev.target,
            property: reply_property,
            requestor: ev.requestor,
            time: ev.time,
        })?;
        if self.owned {
            debug!(selection = %self.selection_name, "content deleted at peer request");
            self.clear_outgoing(ev.time)?;
        }
        Ok(())
    }

    /// Another client took the selection.
    ///
    /// Only the outgoing side is affected; a retrieval already in flight
    /// keeps waiting for its replies.
    pub fn handle_clear_event(&mut self, ev: ClearEvent) -> SelectionResult<bool> {
        if ev.selection != self.selection {
            return Ok(false);
        }
        debug!(selection = %self.selection_name, "lost selection to another client");
        self.owned = false;
        self.outgoing = None;
        self.transport.free_exported_buffers()?;
        Ok(true)
    }

    // ===== Requestor side =====

    /// Ask the owner for its format list
    pub fn begin_enumerate(&mut self, time: Timestamp) -> SelectionResult<()> {
        self.ensure_idle()?;
        self.incoming_targets = None;
        let target = self.atoms.targets;
        self.issue_convert(target, time)?;
        self.pending = Some(PendingOperation {
            kind: PendingKind::EnumeratingFormats,
            targets: vec![target],
        });
        Ok(())
    }

    /// Ask the owner to convert the selection to each of `targets`.
    ///
    /// Duplicates are coalesced; a sloppy peer may list the same target
    /// twice in its TARGETS reply, and one conversion answers both.
    pub fn begin_retrieve(&mut self, targets: &[Atom], time: Timestamp) -> SelectionResult<()> {
        self.ensure_idle()?;
        let mut unique: Vec<Atom> = Vec::with_capacity(targets.len());
        for &target in targets {
            if !unique.contains(&target) {
                unique.push(target);
            }
        }
        if unique.is_empty() {
            return Ok(());
        }
        self.incoming = DataObject::new();
        for &target in &unique {
            self.issue_convert(target, time)?;
        }
        let kind = if unique.len() == 1 {
            PendingKind::RetrievingContent
        } else {
            PendingKind::AwaitingConversions(unique.len())
        };
        self.pending = Some(PendingOperation {
            kind,
            targets: unique,
        });
        Ok(())
    }

    fn ensure_idle(&self) -> SelectionResult<()> {
        if self.pending.is_some() {
            return Err(SelectionError::RequestInFlight(self.selection_name.clone()));
        }
        Ok(())
    }

    fn issue_convert(&self, target: Atom, time: Timestamp) -> SelectionResult<()> {
        trace!(selection = %self.selection_name, target, "requesting conversion");
        // The reply lands in a property named after the target.
        self.transport.convert_selection(
            self.selection,
            target,
            target,
            self.transport.local_window(),
            time,
        )
    }

    /// Process the owner's reply to one of our conversions.
    ///
    /// Returns `Ok(false)` for events that belong to another selection or
    /// that no in-flight request is waiting on.
    pub fn handle_notify_event(&mut self, ev: NotifyEvent) -> SelectionResult<bool> {
        if ev.selection != self.selection {
            return Ok(false);
        }
        let Some(pending) = &self.pending else {
            trace!(target = ev.target, "ignoring reply with no request in flight");
            return Ok(false);
        };
        if !pending.targets.contains(&ev.target) {
            trace!(target = ev.target, "ignoring reply for a target we did not request");
            return Ok(false);
        }

        let value = if ev.property == NONE {
            None
        } else {
            let read = self.transport.get_property(ev.requestor, ev.property)?;
            self.transport.delete_property(ev.requestor, ev.property)?;
            read
        };

        match value {
            Some(prop) => self.complete_target(ev.target, &prop),
            None => {
                debug!(
                    selection = %self.selection_name,
                    target = ev.target,
                    "owner refused conversion"
                );
                self.fail_target(ev.target);
            }
        }
        Ok(true)
    }

    fn complete_target(&mut self, target: Atom, prop: &crate::transport::PropertyValue) {
        let decoded = self.chain.decode(prop, target, &self.atoms);
        match (&decoded, self.pending_kind()) {
            (Some(Value::Atoms(list)), Some(PendingKind::EnumeratingFormats)) => {
                // Only formats the registry knows (or native text targets)
                // are visible; anything else the peer offers is dropped.
                let known: Vec<Atom> = list
                    .iter()
                    .copied()
                    .filter(|&a| self.registry.contains(a) || self.atoms.is_text_target(a))
                    .collect();
                debug!(
                    selection = %self.selection_name,
                    offered = list.len(),
                    known = known.len(),
                    "format enumeration complete"
                );
                self.incoming_targets = Some(known);
            }
            (Some(value), _) => {
                trace!(target, "conversion complete");
                self.incoming.set(target, value.clone());
            }
            (None, _) => {
                debug!(target, "reply property could not be decoded");
            }
        }
        self.advance_pending(target);
    }

    fn fail_target(&mut self, target: Atom) {
        if self.pending_kind() == Some(PendingKind::EnumeratingFormats) {
            // An explicit refusal still answers the question: no formats.
            self.incoming_targets = Some(Vec::new());
        }
        self.advance_pending(target);
    }

    fn pending_kind(&self) -> Option<PendingKind> {
        self.pending.as_ref().map(|p| p.kind.clone())
    }

    fn advance_pending(&mut self, target: Atom) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        pending.targets.retain(|&t| t != target);
        let still_waiting = match &mut pending.kind {
            PendingKind::AwaitingConversions(remaining) if *remaining > 1 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if !still_waiting {
            self.pending = None;
        }
    }
}
