//! # rowtxn Codec
//!
//! Versioned CBOR encoding for records persisted by rowtxn.
//!
//! Every persisted record is wrapped in an [`Envelope`]: four magic bytes
//! naming the record kind, a little-endian format version, and a CBOR body
//! produced by `ciborium`. Decoders reject foreign magic and any version they
//! were not written for, so a format change is always detected instead of
//! being misread.
//!
//! ## Usage
//!
//! ```
//! use rowtxn_codec::Envelope;
//!
//! const POINT: Envelope = Envelope::new(*b"PONT", 1);
//!
//! let bytes = POINT.seal(&(3u32, 4u32)).unwrap();
//! let decoded: (u32, u32) = POINT.open(&bytes).unwrap();
//! assert_eq!(decoded, (3, 4));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod error;

pub use envelope::{Envelope, HEADER_SIZE};
pub use error::{CodecError, CodecResult};

/// Trait for types that can be encoded to their persisted form.
pub trait Encode {
    /// Encode this value to bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from their persisted form.
pub trait Decode: Sized {
    /// Decode this value from bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}
