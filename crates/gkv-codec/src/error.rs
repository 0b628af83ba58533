use gkv_types::TypeTag;

/// Errors from encoding or decoding values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value cannot be represented in the store.
    #[error("unsupported value: {0}")]
    UnsupportedType(String),

    /// Stored bytes are not valid UTF-8 for a text-encoded tag.
    #[error("{tag} payload is not valid UTF-8")]
    InvalidText { tag: TypeTag },

    /// Stored number text does not parse.
    #[error("invalid number text: {0:?}")]
    InvalidNumber(String),

    /// Stored JSON document does not parse.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A blob was stored without a MIME type.
    #[error("blob payload has no MIME type")]
    MissingMimeType,
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
