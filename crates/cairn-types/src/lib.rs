//! Foundation types for Cairn.
//!
//! Every other Cairn crate depends on `cairn-types`.
//!
//! # Key Types
//!
//! - [`Hash`] : fixed-width BLAKE3 content digest, with an empty sentinel
//! - [`Chunk`] : immutable bytes addressed by their [`Hash`]
//! - [`Value`] / [`Type`] : the typed value model
//! - [`Ref`] : typed pointer from one chunk to another
//!
//! [`encode_value`] and [`decode_chunk`] convert between values and chunks.

pub mod chunk;
pub mod codec;
pub mod error;
pub mod hash;
pub mod value;

pub use chunk::Chunk;
pub use codec::{decode_chunk, encode_value, MAX_DEPTH};
pub use error::TypeError;
pub use hash::{Hash, HASH_LEN};
pub use value::{Ref, Struct, Type, Value};
