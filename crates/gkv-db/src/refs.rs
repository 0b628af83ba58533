//! Reference naming for keys and the type registry.

use std::fmt;
use std::str::FromStr;

use gkv_types::{ObjectId, TypeTag};

use crate::error::DbError;

/// Category prefix of key refs.
pub const KEY_PREFIX: &str = "refs/tags/kv/";
/// Category prefix of value and expiry branches.
pub const BRANCH_PREFIX: &str = "refs/heads/kv/";
/// Prefix of the type registry tags.
pub const TYPES_PREFIX: &str = "refs/tags/kv/types/";
/// UUID prefix of keys without a type tag.
pub const RAW_PREFIX: &str = "Raw";

pub const VALUE_BYTES_SUFFIX: &str = "/value/bytes";
pub const VALUE_TYPE_SUFFIX: &str = "/value/type";
pub const EXPIRY_SUFFIX: &str = "/expiry";

/// Content-derived identity of a key: `"<Tag>/" + base64url(commit)`.
///
/// Keys with equal canonical bytes and tag share a UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyUuid {
    /// `None` for raw keys.
    pub tag: Option<TypeTag>,
    pub commit: ObjectId,
}

impl KeyUuid {
    pub fn new(tag: Option<TypeTag>, commit: ObjectId) -> Self {
        Self { tag, commit }
    }

    /// The refs this key owns.
    pub fn refs(&self) -> KeyRefs {
        KeyRefs::new(self)
    }
}

impl fmt::Display for KeyUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.tag.map_or(RAW_PREFIX, |tag| tag.as_str());
        write!(f, "{prefix}/{}", self.commit.to_base64url())
    }
}

impl FromStr for KeyUuid {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DbError::InvalidUuid(s.to_string());
        let (prefix, encoded) = s.split_once('/').ok_or_else(invalid)?;
        let tag = if prefix == RAW_PREFIX {
            None
        } else {
            Some(prefix.parse::<TypeTag>().map_err(|_| invalid())?)
        };
        let commit = ObjectId::from_base64url(encoded).map_err(|_| invalid())?;
        Ok(Self { tag, commit })
    }
}

/// The four refs of one key, fully qualified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRefs {
    pub key: String,
    pub value_bytes: String,
    pub value_type: String,
    pub expiry: String,
}

impl KeyRefs {
    pub fn new(uuid: &KeyUuid) -> Self {
        Self {
            key: format!("{KEY_PREFIX}{uuid}"),
            value_bytes: format!("{BRANCH_PREFIX}{uuid}{VALUE_BYTES_SUFFIX}"),
            value_type: format!("{BRANCH_PREFIX}{uuid}{VALUE_TYPE_SUFFIX}"),
            expiry: format!("{BRANCH_PREFIX}{uuid}{EXPIRY_SUFFIX}"),
        }
    }
}

/// Registry tag of a type.
pub fn type_ref(tag: TypeTag) -> String {
    format!("{TYPES_PREFIX}{tag}")
}

/// The UUID owning an expiry branch, if `name` is one.
pub fn uuid_from_expiry_ref(name: &str) -> Option<KeyUuid> {
    name.strip_prefix(BRANCH_PREFIX)?
        .strip_suffix(EXPIRY_SUFFIX)?
        .parse()
        .ok()
}
