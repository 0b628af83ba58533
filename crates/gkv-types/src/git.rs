//! The git object model: object kinds, tree entries, and commit headers.
//!
//! These types describe objects exactly as the remote store sees them. They
//! carry no hashing logic; ids are computed by `gkv-crypto`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::object::ObjectId;

/// The kind of a git object, as written in its hash header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (100644).
    Regular,
    /// Executable file (100755).
    Executable,
    /// Symbolic link (120000).
    Symlink,
    /// Subtree / directory (40000).
    Directory,
    /// Gitlink to a commit (160000).
    Submodule,
}

impl EntryMode {
    /// Mode string exactly as git serializes it inside tree objects.
    ///
    /// Directories are written without a leading zero.
    pub fn as_git_str(&self) -> &'static str {
        match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Directory => "40000",
            Self::Submodule => "160000",
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_git_str())
    }
}

impl FromStr for EntryMode {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "100644" => Ok(Self::Regular),
            "100755" => Ok(Self::Executable),
            "120000" => Ok(Self::Symlink),
            "40000" | "040000" => Ok(Self::Directory),
            "160000" => Ok(Self::Submodule),
            other => Err(TypeError::UnknownEntryMode(other.to_string())),
        }
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: EntryMode,
    /// Entry name (a single path component).
    pub name: String,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            id,
        }
    }

    /// Shorthand for a regular file entry.
    pub fn file(name: impl Into<String>, id: ObjectId) -> Self {
        Self::new(EntryMode::Regular, name, id)
    }
}

/// Identity line of a commit (author or committer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<Utc>,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>, when: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
        }
    }

    /// The fixed identity used for every commit unless configured otherwise.
    ///
    /// Name and email repeat the same letter so the objects compress well,
    /// and the timestamp is constant so commits are reproducible.
    pub fn fixed() -> Self {
        let when = Utc
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        Self::new("a a", "a@a.a", when)
    }

    /// `"<name> <<email>> <unix seconds> +0000"`, the git identity line.
    pub fn to_git_line(&self) -> String {
        format!("{} <{}> {} +0000", self.name, self.email, self.when.timestamp())
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::fixed()
    }
}

/// A commit object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitObject {
    pub tree: ObjectId,
    #[serde(default)]
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Commit message; non-empty messages end with a single `\n`.
    #[serde(default)]
    pub message: String,
}

impl CommitObject {
    /// A root commit with the same identity for author and committer.
    ///
    /// The message is normalized to end with a line feed when non-empty.
    pub fn root(tree: ObjectId, identity: Signature, message: impl Into<String>) -> Self {
        Self {
            tree,
            parents: Vec::new(),
            author: identity.clone(),
            committer: identity,
            message: normalize_message(message.into()),
        }
    }
}

/// Ensure a non-empty message ends with exactly one trailing line feed.
pub fn normalize_message(mut message: String) -> String {
    if !message.is_empty() && !message.ends_with('\n') {
        message.push('\n');
    }
    message
}
