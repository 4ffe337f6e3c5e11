//! Format handlers.
//!
//! Each handler knows how to advertise, encode and decode one family of
//! targets. The owner side asks the chain to encode outgoing replies; the
//! requestor side asks it to decode incoming properties. Handlers are
//! consulted in order, so the serialized fallback sits last in the chain.

use crate::data::{DataObject, Value};
use crate::registry::WellKnownAtoms;
use crate::transport::{Atom, PropertyValue};

/// A reply payload ready to be written into a requestor property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedProperty {
    /// 8-bit property data
    Bytes {
        /// Property type atom
        ty: Atom,
        /// Payload
        data: Vec<u8>,
    },
    /// 32-bit atom-list property data
    Atoms {
        /// Property type atom
        ty: Atom,
        /// Payload
        atoms: Vec<Atom>,
    },
}

/// Conversion logic for one family of targets
pub trait FormatHandler {
    /// True if this handler services `target`
    fn matches(&self, target: Atom, atoms: &WellKnownAtoms) -> bool;

    /// Targets this handler can offer for `data` in a TARGETS reply
    fn offered(&self, data: &DataObject, atoms: &WellKnownAtoms) -> Vec<Atom>;

    /// Encode `data` as `target`, or `None` if the content cannot satisfy it.
    ///
    /// `advertised` is the full target list the owner is currently offering,
    /// so list-shaped replies can reproduce it.
    fn encode(
        &self,
        data: &DataObject,
        target: Atom,
        atoms: &WellKnownAtoms,
        advertised: &[Atom],
    ) -> Option<EncodedProperty>;

    /// Decode a property received for `target` into a caller value
    fn decode(&self, value: &PropertyValue, target: Atom, atoms: &WellKnownAtoms)
        -> Option<Value>;
}

// ===== Text =====

/// Text targets: Latin-1 STRING, UTF8_STRING, and the UTF-16 media type
pub struct TextHandler;

impl FormatHandler for TextHandler {
    fn matches(&self, target: Atom, atoms: &WellKnownAtoms) -> bool {
        atoms.is_text_target(target)
    }

    fn offered(&self, data: &DataObject, atoms: &WellKnownAtoms) -> Vec<Atom> {
        if data.text().is_some() {
            vec![atoms.utf8_string, atoms.string, atoms.utf16_string]
        } else {
            Vec::new()
        }
    }

    fn encode(
        &self,
        data: &DataObject,
        target: Atom,
        atoms: &WellKnownAtoms,
        _advertised: &[Atom],
    ) -> Option<EncodedProperty> {
        let text = data.text()?;
        let bytes = if target == atoms.string {
            encode_latin1(text)
        } else if target == atoms.utf16_string {
            text.encode_utf16().flat_map(u16::to_le_bytes).collect()
        } else if target == atoms.utf8_string {
            text.as_bytes().to_vec()
        } else {
            return None;
        };
        Some(EncodedProperty::Bytes { ty: target, data: bytes })
    }

    fn decode(
        &self,
        value: &PropertyValue,
        target: Atom,
        atoms: &WellKnownAtoms,
    ) -> Option<Value> {
        let text = if target == atoms.string {
            // Some peers stuff UTF-8 into STRING properties; honor it when
            // the bytes are valid UTF-8, else read them as Latin-1.
            let raw = match std::str::from_utf8(&value.data) {
                Ok(s) => s.to_string(),
                Err(_) => value.data.iter().map(|&b| b as char).collect(),
            };
            unescape_unicode(&raw)
        } else if target == atoms.utf16_string {
            let units: Vec<u16> = value
                .data
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else if target == atoms.utf8_string {
            String::from_utf8_lossy(&value.data).into_owned()
        } else {
            return None;
        };
        Some(Value::Text(text))
    }
}

fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

/// Expand `\uXXXX` escapes left behind by peers that round-trip Unicode
/// text through a single-byte encoding.
///
/// Every escape must carry exactly four hex digits naming a valid scalar
/// value; if any does not, the input is returned unchanged rather than
/// half-translated.
pub fn unescape_unicode(input: &str) -> String {
    if !input.contains("\\u") {
        return input.to_string();
    }
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && chars.get(i + 1) == Some(&'u') {
            let digits: String = chars[i + 2..].iter().take(4).collect();
            if digits.len() < 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return input.to_string();
            }
            let code = match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                Some(c) => c,
                None => return input.to_string(),
            };
            out.push(code);
            i += 6;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

// ===== TARGETS =====

/// The negotiation pseudo-target: replies with the advertised format list
pub struct TargetsHandler;

impl FormatHandler for TargetsHandler {
    fn matches(&self, target: Atom, atoms: &WellKnownAtoms) -> bool {
        target == atoms.targets
    }

    fn offered(&self, _data: &DataObject, atoms: &WellKnownAtoms) -> Vec<Atom> {
        vec![atoms.targets]
    }

    fn encode(
        &self,
        _data: &DataObject,
        _target: Atom,
        atoms: &WellKnownAtoms,
        advertised: &[Atom],
    ) -> Option<EncodedProperty> {
        Some(EncodedProperty::Atoms {
            ty: atoms.atom,
            atoms: advertised.to_vec(),
        })
    }

    fn decode(
        &self,
        value: &PropertyValue,
        _target: Atom,
        _atoms: &WellKnownAtoms,
    ) -> Option<Value> {
        if value.format != 32 {
            return None;
        }
        Some(Value::Atoms(value.as_atoms()))
    }
}

// ===== Serialized fallback =====

/// Byte-level codec for serialized application formats
pub trait SerializedCodec {
    /// Encode a stored value to wire bytes, or `None` if it cannot be
    fn encode(&self, value: &Value) -> Option<Vec<u8>>;

    /// Decode wire bytes back into a stored value
    fn decode(&self, data: &[u8]) -> Value;
}

/// Codec that passes byte payloads through unchanged
pub struct IdentityCodec;

impl SerializedCodec for IdentityCodec {
    fn encode(&self, value: &Value) -> Option<Vec<u8>> {
        match value {
            Value::Bytes(b) => Some(b.clone()),
            Value::Text(s) => Some(s.as_bytes().to_vec()),
            Value::Atoms(_) => None,
        }
    }

    fn decode(&self, data: &[u8]) -> Value {
        Value::Bytes(data.to_vec())
    }
}

/// Fallback handler for application formats carried as opaque bytes.
///
/// Matches any target, so it must sit last in the chain; it only encodes
/// targets the data object actually holds a representation for.
pub struct SerializedHandler {
    codec: Box<dyn SerializedCodec>,
}

impl SerializedHandler {
    /// Handler using `codec` for payload bytes
    pub fn new(codec: Box<dyn SerializedCodec>) -> Self {
        Self { codec }
    }
}

impl FormatHandler for SerializedHandler {
    fn matches(&self, _target: Atom, _atoms: &WellKnownAtoms) -> bool {
        true
    }

    fn offered(&self, data: &DataObject, atoms: &WellKnownAtoms) -> Vec<Atom> {
        data.formats()
            .into_iter()
            .filter(|&f| !atoms.is_text_target(f) && f != atoms.targets)
            .collect()
    }

    fn encode(
        &self,
        data: &DataObject,
        target: Atom,
        _atoms: &WellKnownAtoms,
        _advertised: &[Atom],
    ) -> Option<EncodedProperty> {
        let value = data.get(target)?;
        let bytes = self.codec.encode(value)?;
        Some(EncodedProperty::Bytes { ty: target, data: bytes })
    }

    fn decode(
        &self,
        value: &PropertyValue,
        _target: Atom,
        _atoms: &WellKnownAtoms,
    ) -> Option<Value> {
        Some(self.codec.decode(&value.data))
    }
}

// ===== Chain =====

/// Ordered set of handlers consulted for every conversion
pub struct HandlerChain {
    handlers: Vec<Box<dyn FormatHandler>>,
}

impl HandlerChain {
    /// Text, TARGETS and the serialized fallback
    pub fn standard(codec: Box<dyn SerializedCodec>) -> Self {
        Self {
            handlers: vec![
                Box::new(TargetsHandler),
                Box::new(TextHandler),
                Box::new(SerializedHandler::new(codec)),
            ],
        }
    }

    /// Text and TARGETS only; non-text formats are neither offered nor served
    pub fn text_only() -> Self {
        Self {
            handlers: vec![Box::new(TargetsHandler), Box::new(TextHandler)],
        }
    }

    fn find(&self, target: Atom, atoms: &WellKnownAtoms) -> Option<&dyn FormatHandler> {
        self.handlers
            .iter()
            .map(Box::as_ref)
            .find(|h| h.matches(target, atoms))
    }

    /// Full target list to advertise for `data`, deduplicated in chain order
    pub fn advertised(&self, data: &DataObject, atoms: &WellKnownAtoms) -> Vec<Atom> {
        let mut out = Vec::new();
        for handler in &self.handlers {
            for target in handler.offered(data, atoms) {
                if !out.contains(&target) {
                    out.push(target);
                }
            }
        }
        out
    }

    /// Encode `data` as `target`, or `None` when the request must be refused
    pub fn encode(
        &self,
        data: &DataObject,
        target: Atom,
        atoms: &WellKnownAtoms,
    ) -> Option<EncodedProperty> {
        let advertised = self.advertised(data, atoms);
        self.find(target, atoms)?.encode(data, target, atoms, &advertised)
    }

    /// Decode a received property for `target`
    pub fn decode(
        &self,
        value: &PropertyValue,
        target: Atom,
        atoms: &WellKnownAtoms,
    ) -> Option<Value> {
        self.find(target, atoms)?.decode(value, target, atoms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_atoms, FakeTransport};

    fn text_object(atoms: &WellKnownAtoms, s: &str) -> DataObject {
        DataObject::with_text(atoms.utf8_string, s)
    }

    #[test]
    fn test_unescape_basic() {
        assert_eq!(unescape_unicode("caf\\u00e9"), "café");
        assert_eq!(unescape_unicode("\\u0041\\u0042"), "AB");
        assert_eq!(unescape_unicode("no escapes"), "no escapes");
    }

    #[test]
    fn test_unescape_malformed_returns_input() {
        assert_eq!(unescape_unicode("\\u00z1"), "\\u00z1");
        assert_eq!(unescape_unicode("tail\\u0a"), "tail\\u0a");
        assert_eq!(unescape_unicode("\\u"), "\\u");
        // Lone surrogate is not a scalar value
        assert_eq!(unescape_unicode("\\ud800"), "\\ud800");
    }

    #[test]
    fn test_unescape_mixed_failure_is_atomic() {
        // One bad escape leaves even the good ones untranslated
        assert_eq!(unescape_unicode("\\u0041 then \\uXYZW"), "\\u0041 then \\uXYZW");
    }

    #[test]
    fn test_latin1_encode_replaces_wide_chars() {
        assert_eq!(encode_latin1("aé☃"), vec![b'a', 0xe9, b'?']);
    }

    #[test]
    fn test_text_encode_per_target() {
        let atoms = test_atoms();
        let chain = HandlerChain::text_only();
        let data = text_object(&atoms, "hé");

        match chain.encode(&data, atoms.utf8_string, &atoms) {
            Some(EncodedProperty::Bytes { ty, data }) => {
                assert_eq!(ty, atoms.utf8_string);
                assert_eq!(data, "hé".as_bytes());
            }
            other => panic!("unexpected encoding: {other:?}"),
        }

        match chain.encode(&data, atoms.string, &atoms) {
            Some(EncodedProperty::Bytes { ty, data }) => {
                assert_eq!(ty, atoms.string);
                assert_eq!(data, vec![b'h', 0xe9]);
            }
            other => panic!("unexpected encoding: {other:?}"),
        }

        match chain.encode(&data, atoms.utf16_string, &atoms) {
            Some(EncodedProperty::Bytes { data, .. }) => {
                assert_eq!(data, vec![b'h', 0, 0xe9, 0]);
            }
            other => panic!("unexpected encoding: {other:?}"),
        }
    }

    #[test]
    fn test_string_decode_utf8_then_latin1_fallback() {
        let atoms = test_atoms();
        let chain = HandlerChain::text_only();

        // Valid UTF-8 read as UTF-8
        let prop = PropertyValue {
            ty: atoms.string,
            format: 8,
            data: "café".as_bytes().to_vec(),
        };
        assert_eq!(
            chain.decode(&prop, atoms.string, &atoms),
            Some(Value::Text("café".to_string()))
        );

        // Invalid UTF-8 read byte-per-char
        let prop = PropertyValue {
            ty: atoms.string,
            format: 8,
            data: vec![b'c', b'a', b'f', 0xe9],
        };
        assert_eq!(
            chain.decode(&prop, atoms.string, &atoms),
            Some(Value::Text("café".to_string()))
        );
    }

    #[test]
    fn test_string_decode_unescapes() {
        let atoms = test_atoms();
        let chain = HandlerChain::text_only();
        let prop = PropertyValue {
            ty: atoms.string,
            format: 8,
            data: b"caf\\u00e9".to_vec(),
        };
        assert_eq!(
            chain.decode(&prop, atoms.string, &atoms),
            Some(Value::Text("café".to_string()))
        );
    }

    #[test]
    fn test_targets_encode_reproduces_advertised_list() {
        let atoms = test_atoms();
        let chain = HandlerChain::standard(Box::new(IdentityCodec));
        let mut data = text_object(&atoms, "x");
        data.set(777, Value::Bytes(vec![1, 2]));

        match chain.encode(&data, atoms.targets, &atoms) {
            Some(EncodedProperty::Atoms { ty, atoms: list }) => {
                assert_eq!(ty, atoms.atom);
                assert_eq!(
                    list,
                    vec![
                        atoms.targets,
                        atoms.utf8_string,
                        atoms.string,
                        atoms.utf16_string,
                        777,
                    ]
                );
            }
            other => panic!("unexpected encoding: {other:?}"),
        }
    }

    #[test]
    fn test_text_only_chain_refuses_custom_formats() {
        let atoms = test_atoms();
        let chain = HandlerChain::text_only();
        let mut data = DataObject::new();
        data.set(777, Value::Bytes(vec![1]));
        assert!(chain.encode(&data, 777, &atoms).is_none());
        assert_eq!(chain.advertised(&data, &atoms), vec![atoms.targets]);
    }

    #[test]
    fn test_serialized_fallback_round_trips_bytes() {
        let atoms = test_atoms();
        let chain = HandlerChain::standard(Box::new(IdentityCodec));
        let mut data = DataObject::new();
        data.set(777, Value::Bytes(vec![9, 8, 7]));

        let encoded = chain.encode(&data, 777, &atoms);
        match encoded {
            Some(EncodedProperty::Bytes { ty, data }) => {
                assert_eq!(ty, 777);
                assert_eq!(data, vec![9, 8, 7]);
            }
            other => panic!("unexpected encoding: {other:?}"),
        }

        let prop = PropertyValue {
            ty: 777,
            format: 8,
            data: vec![9, 8, 7],
        };
        assert_eq!(
            chain.decode(&prop, 777, &atoms),
            Some(Value::Bytes(vec![9, 8, 7]))
        );
    }

    #[test]
    fn test_encode_without_matching_content_refuses() {
        let atoms = test_atoms();
        let chain = HandlerChain::standard(Box::new(IdentityCodec));
        let data = DataObject::new();
        assert!(chain.encode(&data, atoms.utf8_string, &atoms).is_none());
        assert!(chain.encode(&data, 777, &atoms).is_none());
    }

    mod unescape_props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_no_escapes_is_identity(s in "[^\\\\]*") {
                prop_assert_eq!(unescape_unicode(&s), s);
            }

            #[test]
            fn prop_valid_escape_expands(c in any::<char>()) {
                // Only BMP scalars have a single-escape form
                prop_assume!((c as u32) <= 0xFFFF);
                let input = format!("a\\u{:04x}b", c as u32);
                prop_assert_eq!(unescape_unicode(&input), format!("a{c}b"));
            }

            #[test]
            fn prop_short_escape_returns_input(digits in "[0-9a-f]{0,3}") {
                let input = format!("\\u{digits}");
                prop_assert_eq!(unescape_unicode(&input), input);
            }
        }
    }

    #[test]
    fn test_atoms_distinct() {
        let transport = FakeTransport::new();
        let atoms = WellKnownAtoms::intern(&transport).unwrap();
        let all = [
            atoms.string,
            atoms.utf8_string,
            atoms.utf16_string,
            atoms.targets,
            atoms.delete,
            atoms.atom,
            atoms.bitmap,
            atoms.pixmap,
            atoms.colormap,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
