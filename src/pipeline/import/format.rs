use std::path::Path;

use crate::models::enums::DeviceFormat;
use crate::pipeline::parsers::ParseError;

/// Bytes of the upload inspected when the extension does not decide.
pub const PEEK_LEN: usize = 256;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const FILE_SEPARATOR: u8 = 0x1C;

/// Lowercased extension of a client-supplied name, empty if none.
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Pick the parser family for an upload.
///
/// The extension decides. Only a missing or generic extension (`.dat`,
/// `.txt`) falls back to the first bytes of the content.
pub fn detect_format(file_name: &str, peek: Option<&[u8]>) -> DeviceFormat {
    match extension_of(file_name).as_str() {
        "xml" => DeviceFormat::Xml,
        "log" => DeviceFormat::Log,
        "bnk" => DeviceFormat::Bnk,
        "pdf" => DeviceFormat::Pdf,
        "" | "dat" | "txt" => peek.map(sniff).unwrap_or(DeviceFormat::Unsupported),
        _ => DeviceFormat::Unsupported,
    }
}

/// Recognise a format from leading bytes.
fn sniff(peek: &[u8]) -> DeviceFormat {
    let peek = &peek[..peek.len().min(PEEK_LEN)];
    let body = peek.strip_prefix(UTF8_BOM).unwrap_or(peek);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let body = &body[start..];

    if body.starts_with(b"<?xml") {
        return DeviceFormat::Xml;
    }
    if body.starts_with(b"%PDF-") {
        return DeviceFormat::Pdf;
    }

    let first_line = body.split(|b| *b == b'\n').next().unwrap_or_default();
    if contains(first_line, b"SAVE DATE:") {
        return DeviceFormat::Bnk;
    }
    if first_line.contains(&FILE_SEPARATOR) {
        return DeviceFormat::Log;
    }
    DeviceFormat::Unsupported
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Fail fast on formats no parser handles, echoing the extension back.
pub fn require_supported(file_name: &str, format: DeviceFormat) -> Result<DeviceFormat, ParseError> {
    if format.is_supported() {
        return Ok(format);
    }
    let ext = extension_of(file_name);
    Err(ParseError::UnsupportedFormat(if ext.is_empty() {
        "(none)".into()
    } else {
        format!(".{ext}")
    }))
}

/// Sanitize a filename: strip path components, limit length
pub fn sanitize_filename(original: &str) -> String {
    // Windows-style separators are not path separators on unix
    let last = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let name = Path::new(last)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .take(255)
        .collect();

    if clean.is_empty() {
        "upload".to_string()
    } else {
        clean
    }
}
