use std::collections::HashSet;

use digest::Digest;
use gkv_types::{CommitObject, ObjectId, ObjectKind, TreeEntry};
use sha1::Sha1;

/// Git object hasher.
///
/// Each hasher carries the object kind that is written into the header
/// (`"<kind> <len>\0"`) prepended to the payload before hashing. This is the
/// same scheme git uses, so ids computed here match the ids the remote store
/// reports for the objects it creates.
pub struct ObjectHasher {
    kind: ObjectKind,
}

impl ObjectHasher {
    /// Hasher for blob objects.
    pub const BLOB: Self = Self {
        kind: ObjectKind::Blob,
    };
    /// Hasher for tree objects.
    pub const TREE: Self = Self {
        kind: ObjectKind::Tree,
    };
    /// Hasher for commit objects.
    pub const COMMIT: Self = Self {
        kind: ObjectKind::Commit,
    };

    pub const fn new(kind: ObjectKind) -> Self {
        Self { kind }
    }

    /// Hash a serialized object payload with its git header.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", self.kind, data.len()).as_bytes());
        hasher.update(data);
        ObjectId::from_hash(to_array(&hasher.finalize()))
    }

    /// Verify that data produces the expected object ID.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// Raw SHA-1 without the git header (for low-level use).
    pub fn raw_hash(data: &[u8]) -> [u8; 20] {
        to_array(&Sha1::digest(data))
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }
}

/// Id of a blob holding `data`.
pub fn blob_hash(data: &[u8]) -> ObjectId {
    ObjectHasher::BLOB.hash(data)
}

/// Id of a tree with the given entries.
pub fn tree_hash(entries: &[TreeEntry]) -> Result<ObjectId, HashError> {
    Ok(ObjectHasher::TREE.hash(&encode_tree(entries)?))
}

/// Id of a commit.
pub fn commit_hash(commit: &CommitObject) -> ObjectId {
    ObjectHasher::COMMIT.hash(&encode_commit(commit))
}

/// Serialize tree entries into the canonical git tree payload.
///
/// Entries are sorted by name, with directories compared as if their name
/// ended in `/`. Each entry is `"<mode> <name>\0"` followed by the 20 raw id
/// bytes.
pub fn encode_tree(entries: &[TreeEntry]) -> Result<Vec<u8>, HashError> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        validate_entry_name(&entry.name)?;
        if !seen.insert(entry.name.as_str()) {
            return Err(HashError::DuplicateEntry(entry.name.clone()));
        }
    }

    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| sort_key(entry));

    let mut out = Vec::with_capacity(entries.len() * 40);
    for entry in sorted {
        out.extend_from_slice(entry.mode.as_git_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.id.as_bytes());
    }
    Ok(out)
}

/// Serialize a commit into the canonical git commit payload.
pub fn encode_commit(commit: &CommitObject) -> Vec<u8> {
    let mut text = format!("tree {}\n", commit.tree);
    for parent in &commit.parents {
        text.push_str(&format!("parent {parent}\n"));
    }
    text.push_str(&format!("author {}\n", commit.author.to_git_line()));
    text.push_str(&format!("committer {}\n", commit.committer.to_git_line()));
    text.push('\n');
    text.push_str(&commit.message);
    text.into_bytes()
}

fn to_array(digest: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(digest);
    out
}

fn sort_key(entry: &TreeEntry) -> Vec<u8> {
    let mut key = entry.name.as_bytes().to_vec();
    if entry.mode.is_directory() {
        key.push(b'/');
    }
    key
}

fn validate_entry_name(name: &str) -> Result<(), HashError> {
    let reason = if name.is_empty() {
        "name must not be empty"
    } else if name == "." || name == ".." {
        "name must not be '.' or '..'"
    } else if name.contains('/') {
        "name must not contain '/'"
    } else if name.contains('\0') {
        "name must not contain NUL"
    } else {
        return Ok(());
    };
    Err(HashError::InvalidEntryName {
        name: name.to_string(),
        reason: reason.into(),
    })
}

/// Errors from hashing malformed structural input.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    #[error("invalid tree entry name {name:?}: {reason}")]
    InvalidEntryName { name: String, reason: String },

    #[error("duplicate tree entry: {0}")]
    DuplicateEntry(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use gkv_types::{EntryMode, Signature};
    use proptest::prelude::*;

    #[test]
    fn empty_blob_matches_git() {
        assert_eq!(
            blob_hash(b"").to_hex(),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }

    #[test]
    fn text_blob_matches_git() {
        assert_eq!(
            blob_hash(b"hello\n").to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }

    #[test]
    fn empty_tree_matches_git() {
        assert_eq!(
            tree_hash(&[]).unwrap().to_hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }

    #[test]
    fn raw_hash_is_plain_sha1() {
        assert_eq!(
            hex::encode(ObjectHasher::raw_hash(b"Hello World")),
            "0a4d55a8d778e5022fab701977c5d840bbc486d0"
        );
    }

    #[test]
    fn kinds_produce_different_ids() {
        let data = b"same content";
        let blob = ObjectHasher::BLOB.hash(data);
        let tree = ObjectHasher::TREE.hash(data);
        let commit = ObjectHasher::COMMIT.hash(data);
        assert_ne!(blob, tree);
        assert_ne!(blob, commit);
        assert_ne!(tree, commit);
    }

    #[test]
    fn verify_detects_tampering() {
        let id = blob_hash(b"original");
        assert!(ObjectHasher::BLOB.verify(b"original", &id));
        assert!(!ObjectHasher::BLOB.verify(b"tampered", &id));
    }

    #[test]
    fn tree_order_is_independent_of_input_order() {
        let blob = blob_hash(b"x");
        let a = vec![
            TreeEntry::file("view.txt", blob),
            TreeEntry::file("bytes", blob),
            TreeEntry::file("view.json", blob),
        ];
        let b = vec![
            TreeEntry::file("bytes", blob),
            TreeEntry::file("view.json", blob),
            TreeEntry::file("view.txt", blob),
        ];
        assert_eq!(tree_hash(&a).unwrap(), tree_hash(&b).unwrap());
    }

    #[test]
    fn directories_sort_as_if_slash_suffixed() {
        let id = blob_hash(b"x");
        // "a-b" < "a/" because '-' (0x2d) < '/' (0x2f), but "a" < "a-b" as plain names.
        let entries = vec![
            TreeEntry::new(EntryMode::Directory, "a", id),
            TreeEntry::file("a-b", id),
        ];
        let encoded = encode_tree(&entries).unwrap();
        let first_name_end = encoded.iter().position(|b| *b == 0).unwrap();
        assert_eq!(&encoded[..first_name_end], b"100644 a-b");
    }

    #[test]
    fn tree_rejects_bad_names() {
        let id = blob_hash(b"x");
        assert!(tree_hash(&[TreeEntry::file("", id)]).is_err());
        assert!(tree_hash(&[TreeEntry::file("a/b", id)]).is_err());
        assert!(matches!(
            tree_hash(&[TreeEntry::file("a", id), TreeEntry::file("a", id)]),
            Err(HashError::DuplicateEntry(_))
        ));
    }

    #[test]
    fn commit_encoding_layout() {
        let tree = tree_hash(&[]).unwrap();
        let commit = CommitObject::root(tree, Signature::fixed(), "image/png;extension=png");
        let text = String::from_utf8(encode_commit(&commit)).unwrap();
        assert_eq!(
            text,
            "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
             author a a <a@a.a> 1735689600 +0000\n\
             committer a a <a@a.a> 1735689600 +0000\n\
             \n\
             image/png;extension=png\n"
        );
    }

    #[test]
    fn commit_hash_depends_on_message_and_parents() {
        let tree = tree_hash(&[]).unwrap();
        let plain = CommitObject::root(tree, Signature::fixed(), "");
        let with_message = CommitObject::root(tree, Signature::fixed(), "text/plain");
        let mut with_parent = plain.clone();
        with_parent.parents.push(commit_hash(&plain));
        assert_ne!(commit_hash(&plain), commit_hash(&with_message));
        assert_ne!(commit_hash(&plain), commit_hash(&with_parent));
        assert_eq!(commit_hash(&plain), commit_hash(&plain.clone()));
    }

    proptest! {
        #[test]
        fn blob_hash_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(blob_hash(&data), blob_hash(&data.clone()));
        }
    }
}
