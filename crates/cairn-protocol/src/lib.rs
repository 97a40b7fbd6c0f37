//! Wire protocol for Cairn's HTTP batch store.
//!
//! Defines the paths, the version header, and the body formats shared by
//! `cairn-client` and `cairn-server`:
//!
//! - [`codec`]: hash lists and chunk streams
//! - [`compress`]: gzip bodies
//! - [`form`]: `ref=` forms and `hasRefs` answers

pub mod codec;
pub mod compress;
pub mod endpoint;
pub mod error;
pub mod form;

pub use codec::{
    decode_chunks, decode_hash_list, decode_write_body, encode_chunks, encode_hash_list,
    encode_write_body, ChunkReader,
};
pub use compress::{gunzip, gzip, names_gzip, GZIP};
pub use endpoint::{
    endpoints, params, ref_path, MAX_BODY_SIZE, PROTOCOL_VERSION, VERSION_HEADER,
};
pub use error::{ProtocolError, ProtocolResult};
pub use form::{
    decode_has_response, decode_ref_form, encode_has_response, encode_ref_form,
    FORM_CONTENT_TYPE,
};
