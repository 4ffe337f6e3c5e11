//! In-memory transport for unit tests.
//!
//! Atoms, window properties, ownership and sent events all live in a
//! shared `RefCell`, so a test can keep a clone of the transport and
//! inspect or mutate display state while a machine owns the other clone.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::SelectionResult;
use crate::registry::WellKnownAtoms;
use crate::transport::{
    Atom, NotifyEvent, PropertyValue, Timestamp, Transport, Window, NONE,
};

/// The window the fake connection assigns to this client
pub(crate) const LOCAL_WINDOW: Window = 1;

/// A convert_selection call recorded by the fake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConvertRequest {
    pub(crate) selection: Atom,
    pub(crate) target: Atom,
    pub(crate) property: Atom,
    pub(crate) requestor: Window,
    pub(crate) time: Timestamp,
}

#[derive(Default)]
struct Inner {
    atoms: HashMap<String, Atom>,
    names: HashMap<Atom, String>,
    next_atom: Atom,
    intern_counts: HashMap<String, usize>,
    properties: HashMap<(Window, Atom), PropertyValue>,
    owners: HashMap<Atom, Window>,
    notifies: Vec<NotifyEvent>,
    converts: Vec<ConvertRequest>,
    freed: usize,
    persisted: Vec<Atom>,
    claim_fails: bool,
}

/// Fake display connection; clones share the same state
#[derive(Clone)]
pub(crate) struct FakeTransport {
    inner: Rc<RefCell<Inner>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                next_atom: 100,
                ..Inner::default()
            })),
        }
    }

    /// Make the next ownership claim lose to a phantom client
    pub(crate) fn set_claim_fails(&self, fail: bool) {
        self.inner.borrow_mut().claim_fails = fail;
    }

    pub(crate) fn intern_count(&self, name: &str) -> usize {
        self.inner
            .borrow()
            .intern_counts
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn owner_of(&self, selection: Atom) -> Window {
        self.inner
            .borrow()
            .owners
            .get(&selection)
            .copied()
            .unwrap_or(NONE)
    }

    pub(crate) fn read_property(&self, window: Window, property: Atom) -> Option<PropertyValue> {
        self.inner.borrow().properties.get(&(window, property)).cloned()
    }

    pub(crate) fn write_property8(&self, window: Window, property: Atom, ty: Atom, data: &[u8]) {
        self.inner.borrow_mut().properties.insert(
            (window, property),
            PropertyValue {
                ty,
                format: 8,
                data: data.to_vec(),
            },
        );
    }

    pub(crate) fn write_property32(
        &self,
        window: Window,
        property: Atom,
        ty: Atom,
        data: &[Atom],
    ) {
        self.inner.borrow_mut().properties.insert(
            (window, property),
            PropertyValue {
                ty,
                format: 32,
                data: data.iter().flat_map(|a| a.to_ne_bytes()).collect(),
            },
        );
    }

    pub(crate) fn last_notify(&self) -> Option<NotifyEvent> {
        self.inner.borrow().notifies.last().copied()
    }

    pub(crate) fn convert_requests(&self) -> Vec<ConvertRequest> {
        self.inner.borrow().converts.clone()
    }

    pub(crate) fn persisted_selections(&self) -> Vec<Atom> {
        self.inner.borrow().persisted.clone()
    }

    pub(crate) fn freed_buffer_calls(&self) -> usize {
        self.inner.borrow().freed
    }
}

impl Transport for FakeTransport {
    fn intern_atom(&self, name: &str) -> SelectionResult<Atom> {
        let mut inner = self.inner.borrow_mut();
        *inner.intern_counts.entry(name.to_string()).or_insert(0) += 1;
        if let Some(&atom) = inner.atoms.get(name) {
            return Ok(atom);
        }
        let atom = inner.next_atom;
        inner.next_atom += 1;
        inner.atoms.insert(name.to_string(), atom);
        inner.names.insert(atom, name.to_string());
        Ok(atom)
    }

    fn atom_name(&self, atom: Atom) -> SelectionResult<Option<String>> {
        Ok(self.inner.borrow().names.get(&atom).cloned())
    }

    fn local_window(&self) -> Window {
        LOCAL_WINDOW
    }

    fn selection_owner(&self, selection: Atom) -> SelectionResult<Window> {
        Ok(self.owner_of(selection))
    }

    fn set_selection_owner(
        &self,
        selection: Atom,
        owner: Window,
        _time: Timestamp,
    ) -> SelectionResult<()> {
        let mut inner = self.inner.borrow_mut();
        if owner == NONE {
            inner.owners.remove(&selection);
        } else if inner.claim_fails {
            // Another client beat us to the claim.
            inner.owners.insert(selection, owner + 1000);
        } else {
            inner.owners.insert(selection, owner);
        }
        Ok(())
    }

    fn convert_selection(
        &self,
        selection: Atom,
        target: Atom,
        property: Atom,
        requestor: Window,
        time: Timestamp,
    ) -> SelectionResult<()> {
        self.inner.borrow_mut().converts.push(ConvertRequest {
            selection,
            target,
            property,
            requestor,
            time,
        });
        Ok(())
    }

    fn change_property8(
        &self,
        window: Window,
        property: Atom,
        ty: Atom,
        data: &[u8],
    ) -> SelectionResult<()> {
        self.write_property8(window, property, ty, data);
        Ok(())
    }

    fn change_property32(
        &self,
        window: Window,
        property: Atom,
        ty: Atom,
        data: &[u32],
    ) -> SelectionResult<()> {
        self.write_property32(window, property, ty, data);
        Ok(())
    }

    fn get_property(
        &self,
        window: Window,
        property: Atom,
    ) -> SelectionResult<Option<PropertyValue>> {
        Ok(self.read_property(window, property))
    }

    fn delete_property(&self, window: Window, property: Atom) -> SelectionResult<()> {
        self.inner.borrow_mut().properties.remove(&(window, property));
        Ok(())
    }

    fn send_notify(&self, event: NotifyEvent) -> SelectionResult<()> {
        self.inner.borrow_mut().notifies.push(event);
        Ok(())
    }

    fn free_exported_buffers(&self) -> SelectionResult<()> {
        self.inner.borrow_mut().freed += 1;
        Ok(())
    }

    fn persist_to_manager(&self, selection: Atom) -> SelectionResult<()> {
        self.inner.borrow_mut().persisted.push(selection);
        Ok(())
    }
}

/// Protocol atoms interned on a throwaway fake connection, for tests
/// that exercise handlers without a machine.
pub(crate) fn test_atoms() -> WellKnownAtoms {
    WellKnownAtoms::intern(&FakeTransport::new()).unwrap()
}
