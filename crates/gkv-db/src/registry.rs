use bimap::BiMap;
use gkv_types::{ObjectId, TypeTag};

use crate::error::RegistryError;

/// Bijection between type tags and their canonical commits.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    map: BiMap<TypeTag, ObjectId>,
}

impl TypeRegistry {
    /// Build from `(tag, commit)` pairs. Either side repeating is an error.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (TypeTag, ObjectId)>,
    ) -> Result<Self, RegistryError> {
        let mut map = BiMap::new();
        for (tag, commit) in pairs {
            map.insert_no_overwrite(tag, commit)
                .map_err(|(tag, commit)| RegistryError::NotBijective { tag, commit })?;
        }
        Ok(Self { map })
    }

    pub fn commit_of(&self, tag: TypeTag) -> Option<ObjectId> {
        self.map.get_by_left(&tag).copied()
    }

    pub fn tag_of(&self, commit: &ObjectId) -> Option<TypeTag> {
        self.map.get_by_right(commit).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries in tag order.
    pub fn entries(&self) -> Vec<(TypeTag, ObjectId)> {
        let mut entries: Vec<_> = self.map.iter().map(|(t, c)| (*t, *c)).collect();
        entries.sort();
        entries
    }
}
