//! Magic-tagged, versioned CBOR envelopes.
//!
//! ## Layout
//!
//! ```text
//! | magic (4) | version (2, LE) | body (CBOR) |
//! ```
//!
//! The header is checked before the body is touched: wrong magic fails with
//! [`CodecError::BadMagic`] and any version other than the envelope's own
//! fails with [`CodecError::UnsupportedVersion`].

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Header size (magic + version).
pub const HEADER_SIZE: usize = 4 + 2;

/// Describes one record format: its magic bytes and current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    magic: [u8; 4],
    version: u16,
}

impl Envelope {
    /// Creates an envelope description.
    #[must_use]
    pub const fn new(magic: [u8; 4], version: u16) -> Self {
        Self { magic, version }
    }

    /// Returns the magic bytes.
    #[must_use]
    pub const fn magic(&self) -> [u8; 4] {
        self.magic
    }

    /// Returns the format version.
    #[must_use]
    pub const fn version(&self) -> u16 {
        self.version
    }

    /// Serializes `value` behind this envelope's header.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as CBOR.
    pub fn seal<T: Serialize>(&self, value: &T) -> CodecResult<Vec<u8>> {
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(&self.magic);
        out.extend_from_slice(&self.version.to_le_bytes());
        ciborium::into_writer(value, &mut out)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(out)
    }

    /// Checks the header and deserializes the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the header does not match this envelope, the body
    /// is not valid CBOR for `T`, or bytes are left over after the body.
    pub fn open<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::UnexpectedEof);
        }
        let found = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if found != self.magic {
            return Err(CodecError::BadMagic {
                expected: self.magic,
                found,
            });
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != self.version {
            return Err(CodecError::UnsupportedVersion {
                found: version,
                expected: self.version,
            });
        }

        let mut body = &bytes[HEADER_SIZE..];
        if body.is_empty() {
            return Err(CodecError::UnexpectedEof);
        }
        let value = ciborium::from_reader(&mut body)
            .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
        if !body.is_empty() {
            return Err(CodecError::decoding_failed(format!(
                "{} trailing bytes after body",
                body.len()
            )));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    const TEST: Envelope = Envelope::new(*b"TEST", 1);

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: u64,
        name: String,
        tags: Vec<String>,
    }

    fn sample() -> Sample {
        Sample {
            id: 7,
            name: "row".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
        }
    }

    #[test]
    fn header_layout() {
        let bytes = TEST.seal(&sample()).unwrap();
        assert_eq!(&bytes[0..4], b"TEST");
        assert_eq!(&bytes[4..6], &[1, 0]);
        assert!(bytes.len() > HEADER_SIZE);
    }

    #[test]
    fn seal_then_open() {
        let bytes = TEST.seal(&sample()).unwrap();
        let decoded: Sample = TEST.open(&bytes).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(TEST.seal(&sample()).unwrap(), TEST.seal(&sample()).unwrap());
    }

    #[test]
    fn rejects_wrong_magic() {
        let bytes = Envelope::new(*b"OTHR", 1).seal(&sample()).unwrap();
        let err = TEST.open::<Sample>(&bytes).unwrap_err();
        assert_eq!(
            err,
            CodecError::BadMagic {
                expected: *b"TEST",
                found: *b"OTHR",
            }
        );
    }

    #[test]
    fn rejects_unknown_version() {
        let bytes = Envelope::new(*b"TEST", 2).seal(&sample()).unwrap();
        let err = TEST.open::<Sample>(&bytes).unwrap_err();
        assert_eq!(
            err,
            CodecError::UnsupportedVersion {
                found: 2,
                expected: 1,
            }
        );
    }

    #[test]
    fn truncated_input() {
        assert_eq!(TEST.open::<Sample>(b"TES").unwrap_err(), CodecError::UnexpectedEof);
        assert_eq!(
            TEST.open::<Sample>(b"TEST\x01\x00").unwrap_err(),
            CodecError::UnexpectedEof
        );

        let bytes = TEST.seal(&sample()).unwrap();
        let err = TEST.open::<Sample>(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = TEST.seal(&sample()).unwrap();
        bytes.push(0);
        let err = TEST.open::<Sample>(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
    }

    proptest! {
        #[test]
        fn open_never_panics_on_garbage(body in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut bytes = b"TEST\x01\x00".to_vec();
            bytes.extend_from_slice(&body);
            let _ = TEST.open::<Sample>(&bytes);
        }
    }
}
