use bytes::Bytes;
use gkv_types::TypeTag;

/// A value as stored under a key, or used as a key.
///
/// Every case except [`Value::Raw`] carries a [`TypeTag`]. Raw bytes are
/// stored untyped; they read back as `Raw`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    String(String),
    Json(serde_json::Value),
    Blob { mime_type: String, data: Bytes },
    ArrayBuffer(Bytes),
    Raw(Bytes),
}

impl Value {
    /// The type tag, `None` for raw bytes.
    pub fn tag(&self) -> Option<TypeTag> {
        match self {
            Self::Number(_) => Some(TypeTag::Number),
            Self::Boolean(_) => Some(TypeTag::Boolean),
            Self::String(_) => Some(TypeTag::String),
            Self::Json(_) => Some(TypeTag::Json),
            Self::Blob { .. } => Some(TypeTag::Blob),
            Self::ArrayBuffer(_) => Some(TypeTag::ArrayBuffer),
            Self::Raw(_) => None,
        }
    }

    /// Human-readable name of the value's shape, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self.tag() {
            Some(tag) => tag.as_str(),
            None => "Raw",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Convenience constructor for blobs.
    pub fn blob(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::Blob {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}
