//! Fax records as the backend returns them. The list and status views show
//! the payload verbatim; only the detail view normalizes the field-name
//! variants different backend revisions use for the same logical value.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine as _;
use serde_json::Value;

const ID_KEYS: &[&str] = &["id", "faxId", "fax_id"];
const DIRECTION_KEYS: &[&str] = &["direction"];
const STATUS_KEYS: &[&str] = &["status", "state"];
const CREATED_AT_KEYS: &[&str] = &["createdAt", "created_at"];
const UPDATED_AT_KEYS: &[&str] = &["updatedAt", "updated_at"];
const FROM_KEYS: &[&str] = &["from", "fromNumber", "from_number"];
const TO_KEYS: &[&str] = &["to", "toNumber", "to_number"];
const PAGE_COUNT_KEYS: &[&str] = &["pageCount", "page_count", "pages"];
const FAILURE_KEYS: &[&str] = &["failureReason", "failure_reason", "error"];
const MEDIA_URL_KEYS: &[&str] = &["mediaUrl", "media_url"];
const PREVIEW_URL_KEYS: &[&str] = &["previewUrl", "preview_url"];

/// A single record flattened through the fallback chains above. Absent
/// values stay absent; nothing is invented.
#[derive(Debug, Default)]
pub struct FaxDetails {
    pub id: Option<String>,
    pub direction: Option<String>,
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub page_count: Option<String>,
    pub failure_reason: Option<String>,
    pub media_url: Option<String>,
    pub preview_url: Option<String>,
}

impl FaxDetails {
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: pick(value, ID_KEYS),
            direction: pick(value, DIRECTION_KEYS),
            status: pick(value, STATUS_KEYS),
            from: pick(value, FROM_KEYS),
            to: pick(value, TO_KEYS),
            created_at: pick(value, CREATED_AT_KEYS),
            updated_at: pick(value, UPDATED_AT_KEYS),
            page_count: pick(value, PAGE_COUNT_KEYS),
            failure_reason: pick(value, FAILURE_KEYS),
            media_url: pick(value, MEDIA_URL_KEYS),
            preview_url: pick(value, PREVIEW_URL_KEYS),
        }
    }
}

/// First present key wins; numbers are rendered as-is so timestamps and
/// page counts survive both string and numeric encodings.
fn pick(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|key| value.get(key)).find_map(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

pub fn render_detail(details: &FaxDetails) -> String {
    let mut out = String::new();
    let mut line = |label: &str, value: &Option<String>| {
        if let Some(value) = value {
            let _ = writeln!(out, "{label}: {value}");
        }
    };
    line("Id", &details.id);
    line("Direction", &details.direction);
    line("Status", &details.status);
    line("From", &details.from);
    line("To", &details.to);
    line("Created At", &details.created_at);
    line("Updated At", &details.updated_at);
    line("Pages", &details.page_count);
    line("Failure Reason", &details.failure_reason);
    line("Media", &details.media_url);
    line("Preview", &details.preview_url);
    if out.is_empty() {
        out.push_str("(empty record)\n");
    }
    out
}

pub fn render_status_line(value: &Value) -> String {
    let details = FaxDetails::from_value(value);
    format!(
        "Fax {}: {}",
        details.id.as_deref().unwrap_or("?"),
        details.status.as_deref().unwrap_or("unknown"),
    )
}

pub fn render_list(faxes: &[Value]) -> String {
    if faxes.is_empty() {
        return "No faxes.\n".to_owned();
    }
    let mut out = String::new();
    for value in faxes {
        let details = FaxDetails::from_value(value);
        let _ = writeln!(
            out,
            "{:<28} {:<9} {:<10} {}",
            details.id.as_deref().unwrap_or("?"),
            details.direction.as_deref().unwrap_or("-"),
            details.status.as_deref().unwrap_or("-"),
            details.created_at.as_deref().unwrap_or("-"),
        );
    }
    out
}

/// The document argument of a fax-send command: a URL passed through, or a
/// local file converted to a data URL reference before submission.
#[derive(Debug, Clone)]
pub enum MediaArg {
    Url(String),
    File(String),
}

pub fn media_reference(media: &MediaArg) -> Result<String> {
    match media {
        MediaArg::Url(url) => Ok(url.clone()),
        MediaArg::File(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("could not read the document at {path}"))?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            Ok(format!("data:{};base64,{encoded}", content_type(path)))
        }
    }
}

fn content_type(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn created_at_falls_back_across_key_variants() {
        // Camel case only: the camel value must show under "Created At".
        let details = FaxDetails::from_value(&json!({
            "id": "fx-1",
            "status": "delivered",
            "createdAt": "2024-05-01T10:00:00Z",
        }));
        assert_eq!(details.created_at.as_deref(), Some("2024-05-01T10:00:00Z"));
        let rendered = render_detail(&details);
        assert!(rendered.contains("Created At: 2024-05-01T10:00:00Z"));

        // Snake case only.
        let details = FaxDetails::from_value(&json!({
            "created_at": "2024-05-02T10:00:00Z",
        }));
        assert_eq!(details.created_at.as_deref(), Some("2024-05-02T10:00:00Z"));

        // Camel case wins when both are present.
        let details = FaxDetails::from_value(&json!({
            "createdAt": "camel",
            "created_at": "snake",
        }));
        assert_eq!(details.created_at.as_deref(), Some("camel"));
    }

    #[test]
    fn numeric_page_counts_are_rendered() {
        let details = FaxDetails::from_value(&json!({ "pageCount": 3 }));
        assert_eq!(details.page_count.as_deref(), Some("3"));
        let details = FaxDetails::from_value(&json!({ "pages": "12" }));
        assert_eq!(details.page_count.as_deref(), Some("12"));
    }

    #[test]
    fn absent_fields_stay_off_the_detail_view() {
        let rendered = render_detail(&FaxDetails::from_value(&json!({ "id": "fx-2" })));
        assert!(rendered.contains("Id: fx-2"));
        assert!(!rendered.contains("Failure Reason"));
    }

    #[test]
    fn a_url_argument_passes_through() {
        let reference = media_reference(&MediaArg::Url("https://cdn/doc.pdf".into())).unwrap();
        assert_eq!(reference, "https://cdn/doc.pdf");
    }

    #[test]
    fn a_file_argument_becomes_a_data_url() {
        let dir = std::env::temp_dir().join("faxdesk-media-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("page.pdf");
        std::fs::write(&path, b"%PDF-1.4 test").unwrap();

        let reference = media_reference(&MediaArg::File(path.display().to_string())).unwrap();
        assert!(reference.starts_with("data:application/pdf;base64,"));
    }

    #[test]
    fn status_line_uses_the_normalized_fields() {
        let line = render_status_line(&json!({ "fax_id": "fx-3", "state": "sending" }));
        assert_eq!(line, "Fax fx-3: sending");
    }
}
