//! Ref name rules.
//!
//! A valid ref name:
//! - starts with `refs/` and has at least one component after it
//! - contains no whitespace, control characters, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - contains no `..` and no `@{`
//! - has no empty components and no component starting with `.`
//! - does not end with `.`, `/`, or `.lock`

use crate::error::{RemoteError, RemoteResult};

const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Qualify a short branch name as `refs/heads/<name>`; full names pass through.
pub fn qualify_ref_name(name: &str) -> String {
    if name.starts_with("refs/") {
        name.to_string()
    } else {
        format!("refs/heads/{name}")
    }
}

/// Validate a fully qualified ref name.
pub fn validate_ref_name(name: &str) -> RemoteResult<()> {
    let invalid = |reason: String| RemoteError::InvalidRefName {
        name: name.to_string(),
        reason,
    };

    let Some(rest) = name.strip_prefix("refs/") else {
        return Err(invalid("must start with 'refs/'".into()));
    };
    if rest.is_empty() {
        return Err(invalid("must name something below 'refs/'".into()));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(invalid(format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'".into()));
    }
    if name.contains("@{") {
        return Err(invalid("must not contain '@{'".into()));
    }
    if name.ends_with('.') || name.ends_with('/') || name.ends_with(".lock") {
        return Err(invalid("must not end with '.', '/' or '.lock'".into()));
    }
    for component in rest.split('/') {
        if component.is_empty() {
            return Err(invalid("path components must not be empty".into()));
        }
        if component.starts_with('.') {
            return Err(invalid(format!(
                "component must not start with '.': {component:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualify_short_names() {
        assert_eq!(qualify_ref_name("kv/a/expiry"), "refs/heads/kv/a/expiry");
        assert_eq!(qualify_ref_name("refs/tags/kv/a"), "refs/tags/kv/a");
    }

    #[test]
    fn accepts_key_refs() {
        assert!(validate_ref_name("refs/tags/kv/JSON/q83vEjRWeJq83vEjRWeJq83vEjQ").is_ok());
        assert!(validate_ref_name("refs/heads/kv/Number/a-b_c/value/bytes").is_ok());
        assert!(validate_ref_name("refs/tags/kv/types/ArrayBuffer").is_ok());
    }

    #[test]
    fn rejects_unqualified() {
        assert!(validate_ref_name("heads/main").is_err());
        assert!(validate_ref_name("refs/").is_err());
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(validate_ref_name("refs/heads/a..b").is_err());
        assert!(validate_ref_name("refs/heads/a b").is_err());
        assert!(validate_ref_name("refs/heads/a:b").is_err());
        assert!(validate_ref_name("refs/heads/a@{1}").is_err());
        assert!(validate_ref_name("refs/heads//a").is_err());
        assert!(validate_ref_name("refs/heads/.hidden").is_err());
        assert!(validate_ref_name("refs/heads/a.lock").is_err());
        assert!(validate_ref_name("refs/heads/a/").is_err());
    }
}
