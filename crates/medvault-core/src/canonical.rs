//! Deterministic CBOR encoding for signing and hashing.
//!
//! A small writer for the RFC 8949 Core Deterministic Encoding subset that
//! MedVault needs:
//! - Integers use the smallest valid encoding
//! - Definite lengths only
//! - Map keys are small unsigned integers written in ascending order
//! - No floats (timestamps are i64 milliseconds)
//!
//! Callers are responsible for emitting map keys in ascending order; the
//! writer asserts this in debug builds.

/// Writer for canonical CBOR.
#[derive(Debug, Default)]
pub struct CanonicalWriter {
    buf: Vec<u8>,
    #[cfg(debug_assertions)]
    last_keys: Vec<Option<u64>>,
}

impl CanonicalWriter {
    /// Start an empty encoding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an encoding prefixed with a raw domain-separation tag.
    pub fn with_domain(domain: &[u8]) -> Self {
        let mut writer = Self::new();
        writer.buf.extend_from_slice(domain);
        writer
    }

    /// Open a map with `len` entries.
    pub fn map(&mut self, len: usize) -> &mut Self {
        self.head(5, len as u64);
        #[cfg(debug_assertions)]
        self.last_keys.push(None);
        self
    }

    /// Close the innermost map.
    pub fn end_map(&mut self) -> &mut Self {
        #[cfg(debug_assertions)]
        self.last_keys.pop();
        self
    }

    /// Write an integer map key.
    pub fn key(&mut self, key: u64) -> &mut Self {
        #[cfg(debug_assertions)]
        if let Some(last) = self.last_keys.last_mut() {
            debug_assert!(
                last.map_or(true, |prev| prev < key),
                "canonical map keys must be ascending"
            );
            *last = Some(key);
        }
        self.head(0, key);
        self
    }

    /// Open an array with `len` items.
    pub fn array(&mut self, len: usize) -> &mut Self {
        self.head(4, len as u64);
        self
    }

    /// Write an unsigned integer.
    pub fn uint(&mut self, n: u64) -> &mut Self {
        self.head(0, n);
        self
    }

    /// Write a signed integer.
    pub fn int(&mut self, n: i64) -> &mut Self {
        if n >= 0 {
            self.head(0, n as u64);
        } else {
            // CBOR encodes -1 as 0, -2 as 1, etc.
            self.head(1, (-1 - n) as u64);
        }
        self
    }

    /// Write a byte string.
    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.head(2, bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Write a text string.
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.head(3, s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// Finish and return the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn head(&mut self, major: u8, n: u64) {
        let mt = major << 5;
        if n < 24 {
            self.buf.push(mt | n as u8);
        } else if n <= 0xff {
            self.buf.push(mt | 24);
            self.buf.push(n as u8);
        } else if n <= 0xffff {
            self.buf.push(mt | 25);
            self.buf.extend_from_slice(&(n as u16).to_be_bytes());
        } else if n <= 0xffff_ffff {
            self.buf.push(mt | 26);
            self.buf.extend_from_slice(&(n as u32).to_be_bytes());
        } else {
            self.buf.push(mt | 27);
            self.buf.extend_from_slice(&n.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::value::Value;
    use proptest::prelude::*;

    #[test]
    fn test_small_integers_are_single_byte() {
        let mut w = CanonicalWriter::new();
        w.uint(0).uint(23);
        assert_eq!(w.finish(), vec![0x00, 0x17]);
    }

    #[test]
    fn test_integer_width_boundaries() {
        let mut w = CanonicalWriter::new();
        w.uint(24).uint(256).uint(65_536).uint(u64::MAX);
        assert_eq!(
            w.finish(),
            vec![
                0x18, 24, //
                0x19, 0x01, 0x00, //
                0x1a, 0x00, 0x01, 0x00, 0x00, //
                0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            ]
        );
    }

    #[test]
    fn test_negative_integers() {
        let mut w = CanonicalWriter::new();
        w.int(-1).int(-25);
        assert_eq!(w.finish(), vec![0x20, 0x38, 24]);
    }

    #[test]
    fn test_output_is_valid_cbor() {
        let mut w = CanonicalWriter::new();
        w.map(2)
            .key(0)
            .bytes(&[1, 2, 3])
            .key(1)
            .text("grant")
            .end_map();
        let bytes = w.finish();

        let value: Value = ciborium::from_reader(&bytes[..]).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[1].1, Value::Text("grant".into()));
    }

    #[test]
    fn test_domain_prefix() {
        let w = CanonicalWriter::with_domain(b"tag:");
        assert_eq!(w.finish(), b"tag:".to_vec());
    }

    fn decode_integer(bytes: &[u8]) -> i128 {
        match ciborium::from_reader(bytes).unwrap() {
            Value::Integer(i) => i128::from(i),
            other => panic!("not an integer: {:?}", other),
        }
    }

    proptest! {
        #[test]
        fn signed_integers_decode_with_reference_reader(n in any::<i64>()) {
            let mut w = CanonicalWriter::new();
            w.int(n);
            prop_assert_eq!(decode_integer(&w.finish()), n as i128);
        }

        #[test]
        fn unsigned_integers_use_shortest_form(n in any::<u64>()) {
            let mut w = CanonicalWriter::new();
            w.uint(n);
            let bytes = w.finish();
            let expected_len = match n {
                0..=23 => 1,
                24..=0xff => 2,
                0x100..=0xffff => 3,
                0x1_0000..=0xffff_ffff => 5,
                _ => 9,
            };
            prop_assert_eq!(bytes.len(), expected_len);
            prop_assert_eq!(decode_integer(&bytes), n as i128);
        }
    }
}
