//! Multi-format clipboard payloads.
//!
//! A single copy operation can carry the same logical content in several
//! formats at once (plain text plus a serialized object, say). [`DataObject`]
//! keeps those representations keyed by format atom, preserving the order
//! they were stored in so negotiation can advertise them deterministically.

use crate::transport::Atom;

/// One representation of clipboard content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Decoded text
    Text(String),
    /// Opaque bytes in some serialized format
    Bytes(Vec<u8>),
    /// A list of atoms (the TARGETS reply shape)
    Atoms(Vec<Atom>),
}

impl Value {
    /// Borrow the text payload, if this value is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the raw bytes, if this value is a byte payload
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// Content held under a selection, in one or more formats.
///
/// Insertion order is preserved; the first entry is the preferred format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataObject {
    entries: Vec<(Atom, Value)>,
}

impl DataObject {
    /// Empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload holding a single text representation under `format`
    pub fn with_text(format: Atom, text: impl Into<String>) -> Self {
        let mut obj = Self::new();
        obj.set(format, Value::Text(text.into()));
        obj
    }

    /// Store a representation, replacing any previous value for `format`
    pub fn set(&mut self, format: Atom, value: Value) {
        if let Some(slot) = self.entries.iter_mut().find(|(a, _)| *a == format) {
            slot.1 = value;
        } else {
            self.entries.push((format, value));
        }
    }

    /// Look up the representation stored under `format`
    pub fn get(&self, format: Atom) -> Option<&Value> {
        self.entries.iter().find(|(a, _)| *a == format).map(|(_, v)| v)
    }

    /// True if a representation exists under `format`
    pub fn contains(&self, format: Atom) -> bool {
        self.entries.iter().any(|(a, _)| *a == format)
    }

    /// Format atoms in insertion order
    pub fn formats(&self) -> Vec<Atom> {
        self.entries.iter().map(|(a, _)| *a).collect()
    }

    /// The first text representation, regardless of which format holds it
    pub fn text(&self) -> Option<&str> {
        self.entries.iter().find_map(|(_, v)| v.as_text())
    }

    /// Number of stored representations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no representations are stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate stored representations in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (Atom, &Value)> {
        self.entries.iter().map(|(a, v)| (*a, v))
    }
}
