use bytes::Bytes;
use gkv_types::TypeTag;

use crate::error::{CodecError, CodecResult};
use crate::message::encode_message;
use crate::number::to_js_string;
use crate::value::Value;

/// Numbers whose text is longer than this are stored as 8 binary bytes.
pub const MAX_NUMBER_TEXT_LEN: usize = 7;

/// Width of a binary-encoded number.
pub const BINARY_NUMBER_LEN: usize = 8;

/// A value ready to be content-addressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoded {
    /// `None` for raw bytes.
    pub tag: Option<TypeTag>,
    pub bytes: Bytes,
    pub mime_type: Option<String>,
    /// View extension, e.g. `txt` for text-encoded values.
    pub extension: Option<String>,
}

impl Encoded {
    fn new(tag: Option<TypeTag>, bytes: impl Into<Bytes>, extension: Option<&str>) -> Self {
        Self {
            tag,
            bytes: bytes.into(),
            mime_type: None,
            extension: extension.map(str::to_string),
        }
    }

    /// The commit message carrying this payload's view metadata.
    pub fn message(&self) -> String {
        encode_message(self.mime_type.as_deref(), self.extension.as_deref())
    }
}

/// Encode a value into bytes plus metadata.
pub fn encode(value: &Value) -> CodecResult<Encoded> {
    let tag = value.tag();
    let encoded = match value {
        Value::Number(n) => {
            let text = to_js_string(*n);
            let negative_zero = *n == 0.0 && n.is_sign_negative();
            if negative_zero || text.len() > MAX_NUMBER_TEXT_LEN {
                Encoded::new(tag, n.to_le_bytes().to_vec(), None)
            } else {
                Encoded::new(tag, text.into_bytes(), Some("txt"))
            }
        }
        Value::Boolean(b) => Encoded::new(tag, b.to_string().into_bytes(), Some("txt")),
        Value::String(s) => Encoded::new(tag, s.clone().into_bytes(), Some("txt")),
        Value::Json(json) => Encoded::new(tag, serde_json::to_vec(json)?, Some("json")),
        Value::Blob { mime_type, data } => {
            let essence = mime_essence(mime_type);
            if !is_valid_mime(essence) {
                return Err(CodecError::UnsupportedType(format!(
                    "blob MIME type {mime_type:?} is not of the form type/subtype"
                )));
            }
            Encoded {
                tag,
                bytes: data.clone(),
                mime_type: Some(essence.to_string()),
                extension: extension_for_mime(essence),
            }
        }
        Value::ArrayBuffer(data) | Value::Raw(data) => Encoded::new(tag, data.clone(), None),
    };
    Ok(encoded)
}

/// Decode bytes written by [`encode`] back into a value.
pub fn decode(tag: Option<TypeTag>, bytes: Bytes, mime_type: Option<&str>) -> CodecResult<Value> {
    let Some(tag) = tag else {
        return Ok(Value::Raw(bytes));
    };
    let value = match tag {
        TypeTag::Number => {
            if bytes.len() == BINARY_NUMBER_LEN {
                let mut raw = [0u8; BINARY_NUMBER_LEN];
                raw.copy_from_slice(&bytes);
                Value::Number(f64::from_le_bytes(raw))
            } else {
                let text = as_text(tag, &bytes)?;
                let n = text
                    .parse::<f64>()
                    .map_err(|_| CodecError::InvalidNumber(text.to_string()))?;
                Value::Number(n)
            }
        }
        TypeTag::Boolean => Value::Boolean(as_text(tag, &bytes)? == "true"),
        TypeTag::String => Value::String(as_text(tag, &bytes)?.to_string()),
        TypeTag::Json => Value::Json(serde_json::from_slice(&bytes)?),
        TypeTag::Blob => Value::Blob {
            mime_type: mime_type.ok_or(CodecError::MissingMimeType)?.to_string(),
            data: bytes,
        },
        TypeTag::ArrayBuffer => Value::ArrayBuffer(bytes),
    };
    Ok(value)
}

/// Preferred file extension for a MIME type, if any.
///
/// Common types use the extension mime-db lists first (`txt`, `jpeg`,
/// `html`, `mp3`). Anything else falls back to the first extension
/// `mime_guess` knows.
pub fn extension_for_mime(mime_type: &str) -> Option<String> {
    let essence = mime_essence(mime_type).to_ascii_lowercase();
    if let Some(ext) = preferred_extension(&essence) {
        return Some(ext.to_string());
    }
    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
}

// mime_guess orders extensions alphabetically (`text/plain` gives `asm`),
// which would change view paths and commit ids.
fn preferred_extension(essence: &str) -> Option<&'static str> {
    let ext = match essence {
        "text/plain" => "txt",
        "text/html" => "html",
        "text/css" => "css",
        "text/csv" => "csv",
        "text/markdown" => "md",
        "text/xml" | "application/xml" => "xml",
        "text/javascript" | "application/javascript" => "js",
        "text/calendar" => "ics",
        "text/yaml" | "application/yaml" | "application/x-yaml" => "yaml",
        "application/json" => "json",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/gzip" => "gz",
        "application/octet-stream" => "bin",
        "application/wasm" => "wasm",
        "application/msword" => "doc",
        "image/jpeg" => "jpeg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/tiff" => "tiff",
        "image/bmp" => "bmp",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "audio/ogg" => "oga",
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        "audio/webm" => "weba",
        "video/mp4" => "mp4",
        "video/mpeg" => "mpeg",
        "video/webm" => "webm",
        "video/quicktime" => "qt",
        "font/woff" => "woff",
        "font/woff2" => "woff2",
        _ => return None,
    };
    Some(ext)
}

/// `type/subtype` without parameters: `text/plain; charset=utf-8` gives
/// `text/plain`.
fn mime_essence(mime_type: &str) -> &str {
    mime_type
        .split_once(';')
        .map_or(mime_type, |(essence, _)| essence)
        .trim()
}

fn as_text(tag: TypeTag, bytes: &[u8]) -> CodecResult<&str> {
    std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidText { tag })
}

// Only called on the essence; parameters never reach the commit message.
fn is_valid_mime(mime_type: &str) -> bool {
    let is_token = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c))
    };
    match mime_type.split_once('/') {
        Some((kind, subtype)) => is_token(kind) && is_token(subtype),
        None => false,
    }
}
