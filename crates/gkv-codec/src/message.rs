//! Commit message metadata.
//!
//! A value commit's message records how its payload should be served:
//! `"<mime>;extension=<ext>"` when both are known, the bare MIME type when
//! only it is known, and nothing otherwise.

/// MIME type and view extension recovered from a commit message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageMeta {
    pub mime_type: Option<String>,
    pub extension: Option<String>,
}

/// Build the commit message for a payload.
pub fn encode_message(mime_type: Option<&str>, extension: Option<&str>) -> String {
    match (mime_type, extension) {
        (Some(mime), Some(ext)) => format!("{mime};extension={ext}"),
        (Some(mime), None) => mime.to_string(),
        _ => String::new(),
    }
}

/// Parse a commit message written by [`encode_message`].
///
/// Splits on the first `;`, then on `=`. Trailing line feeds are ignored.
pub fn parse_message(message: &str) -> MessageMeta {
    let message = message.trim_end_matches('\n');
    if message.is_empty() {
        return MessageMeta::default();
    }
    let (mime, params) = match message.split_once(';') {
        Some((mime, params)) => (mime, Some(params)),
        None => (message, None),
    };
    let extension = params
        .and_then(|params| params.split_once('='))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .map(str::to_string);
    MessageMeta {
        mime_type: Some(mime.to_string()).filter(|m| !m.is_empty()),
        extension,
    }
}
