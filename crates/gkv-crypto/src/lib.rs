//! Cryptographic primitives for gitkv.
//!
//! Provides git-compatible object hashing (blob, tree, commit) and the
//! [`Cipher`] seam through which callers plug in encryption.
//!
//! All hashing wraps the established `sha1` crate. There is no custom cryptography.

pub mod cipher;
pub mod hasher;

pub use cipher::{Cipher, CipherError};
pub use hasher::{
    blob_hash, commit_hash, encode_commit, encode_tree, tree_hash, HashError, ObjectHasher,
};
