//! Type-tagged serialization for gitkv values.
//!
//! A [`Value`] is turned into an [`Encoded`] payload: the bytes that get
//! content-addressed plus the metadata (type tag, MIME type, file extension)
//! used to decode it again and to publish human-viewable copies.
//!
//! [`encode`] and [`decode`] are exact inverses. Numbers survive bit-exactly,
//! negative zero included.

pub mod codec;
pub mod error;
pub mod message;
pub mod number;
pub mod value;

pub use codec::{decode, encode, Encoded};
pub use error::{CodecError, CodecResult};
pub use message::{encode_message, parse_message, MessageMeta};
pub use number::to_js_string;
pub use value::Value;
