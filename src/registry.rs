//! Format name registry.
//!
//! Callers name formats with display-neutral strings ("Text",
//! "UnicodeText", ...). The registry maps those to interned atoms, caching
//! both directions so negotiation never re-interns, and remembers which
//! formats carry serialized objects rather than protocol-native payloads.

use std::collections::HashMap;

use crate::error::SelectionResult;
use crate::transport::{Atom, Transport};

/// Abstract format names with fixed wire equivalents.
///
/// These map to protocol-native targets and are never serialized.
const WELL_KNOWN: &[(&str, &str)] = &[
    ("Text", "STRING"),
    ("UnicodeText", "UTF8_STRING"),
    ("Bitmap", "BITMAP"),
    ("DeviceIndependentBitmap", "PIXMAP"),
    ("Palette", "COLORMAP"),
];

/// Atoms the protocol itself depends on, interned once per connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellKnownAtoms {
    /// Latin-1 text target
    pub string: Atom,
    /// UTF-8 text target
    pub utf8_string: Atom,
    /// UTF-16 text target
    pub utf16_string: Atom,
    /// Format-list negotiation target
    pub targets: Atom,
    /// Cut-operation pseudo-target
    pub delete: Atom,
    /// Type of TARGETS replies
    pub atom: Atom,
    /// Single-plane image target
    pub bitmap: Atom,
    /// Server-side image target
    pub pixmap: Atom,
    /// Color table target
    pub colormap: Atom,
}

impl WellKnownAtoms {
    /// Intern every protocol atom on `transport`
    pub fn intern<T: Transport>(transport: &T) -> SelectionResult<Self> {
        Ok(Self {
            string: transport.intern_atom("STRING")?,
            utf8_string: transport.intern_atom("UTF8_STRING")?,
            utf16_string: transport.intern_atom("UTF16_STRING")?,
            targets: transport.intern_atom("TARGETS")?,
            delete: transport.intern_atom("DELETE")?,
            atom: transport.intern_atom("ATOM")?,
            bitmap: transport.intern_atom("BITMAP")?,
            pixmap: transport.intern_atom("PIXMAP")?,
            colormap: transport.intern_atom("COLORMAP")?,
        })
    }

    /// True if `target` is one of the text targets
    pub fn is_text_target(&self, target: Atom) -> bool {
        target == self.string || target == self.utf8_string || target == self.utf16_string
    }
}

#[derive(Debug, Clone)]
struct FormatInfo {
    atom: Atom,
    serializable: bool,
}

/// Bidirectional map between caller format names and interned atoms
#[derive(Debug, Default)]
pub struct FormatRegistry {
    by_name: HashMap<String, FormatInfo>,
    by_atom: HashMap<Atom, String>,
}

impl FormatRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-seeded with every well-known format name.
    ///
    /// Peers offering atoms outside this table are invisible until the
    /// application registers the format by name.
    pub fn with_well_known<T: Transport>(transport: &T) -> SelectionResult<Self> {
        let mut registry = Self::default();
        for &(name, _) in WELL_KNOWN {
            registry.id_for(transport, name)?;
        }
        Ok(registry)
    }

    /// Atom for a format name, interning on first use.
    ///
    /// Well-known abstract names resolve to their fixed wire targets and
    /// are marked protocol-native. Any other name is interned verbatim and
    /// marked serializable, since peers cannot be assumed to understand it.
    pub fn id_for<T: Transport>(
        &mut self,
        transport: &T,
        name: &str,
    ) -> SelectionResult<Atom> {
        if let Some(info) = self.by_name.get(name) {
            return Ok(info.atom);
        }

        let (wire_name, serializable) = match WELL_KNOWN.iter().find(|(n, _)| *n == name) {
            Some((_, wire)) => (*wire, false),
            None => (name, true),
        };

        let atom = transport.intern_atom(wire_name)?;
        self.by_name
            .insert(name.to_string(), FormatInfo { atom, serializable });
        // An ad-hoc intern of a wire name ("STRING") can alias a well-known
        // abstract name ("Text"); the first registration wins the inverse.
        self.by_atom.entry(atom).or_insert_with(|| name.to_string());
        Ok(atom)
    }

    /// Caller-facing name registered for an atom, if any
    pub fn name_for(&self, atom: Atom) -> Option<&str> {
        self.by_atom.get(&atom).map(String::as_str)
    }

    /// True if a format is registered under `atom`
    pub fn contains(&self, atom: Atom) -> bool {
        self.by_atom.contains_key(&atom)
    }

    /// True if the format registered under `atom` carries serialized objects
    pub fn is_serializable(&self, atom: Atom) -> bool {
        self.by_atom
            .get(&atom)
            .and_then(|name| self.by_name.get(name))
            .is_some_and(|info| info.serializable)
    }
}
