use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Type tag attached to every stored value.
///
/// The tag decides how the value's bytes are decoded and is itself stored
/// as a canonical commit, one per tag, shared by every key of that type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeTag {
    Number,
    Boolean,
    String,
    #[serde(rename = "JSON")]
    Json,
    Blob,
    ArrayBuffer,
}

impl TypeTag {
    /// Every tag, in registration order.
    pub const ALL: [TypeTag; 6] = [
        TypeTag::Number,
        TypeTag::Boolean,
        TypeTag::String,
        TypeTag::Json,
        TypeTag::Blob,
        TypeTag::ArrayBuffer,
    ];

    /// Name used in reference names and key UUIDs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::Json => "JSON",
            Self::Blob => "Blob",
            Self::ArrayBuffer => "ArrayBuffer",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| TypeError::UnknownTypeTag(s.to_string()))
    }
}
