//! Pool and vault contract events: ABI registry, decoding, display formatting.

pub mod abi;
pub mod decode;
pub mod format;

pub use abi::{EventRegistry, Source};
pub use decode::{decode_log, ArgValue, DecodeError, DecodedEvent};
