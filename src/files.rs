//! Drive file metadata / 文件元数据

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::{get_ext, guess_mime_type};

/// MIME types used by Drive / Drive 使用的MIME类型
pub mod mimetypes {
    pub const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps.";
    pub const GOOGLE_DRIVE_FOLDER: &str = "application/vnd.google-apps.folder";
    pub const GOOGLE_DRIVE_FILE: &str = "application/vnd.google-apps.file";
    pub const GOOGLE_DRIVE_SHORTCUT: &str = "application/vnd.google-apps.shortcut";
    pub const GOOGLE_SHEETS: &str = "application/vnd.google-apps.spreadsheet";
    pub const GOOGLE_DOCS: &str = "application/vnd.google-apps.document";
    pub const GOOGLE_SLIDES: &str = "application/vnd.google-apps.presentation";
    pub const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
    pub const JSON: &str = "application/json";
    pub const CSV: &str = "text/csv";
    pub const PDF: &str = "application/pdf";
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// Drive sends `size` as a decimal string; accept numbers too
fn deserialize_option_u64_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .parse::<u64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("failed to parse string '{}' as u64", s))),
    }
}

/// A file or folder on Drive / Drive 文件或文件夹
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_option_u64_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub trashed: bool,
}

impl File {
    /// `None` when the MIME type was not fetched
    pub fn is_directory(&self) -> Option<bool> {
        self.mime_type
            .as_deref()
            .map(|m| m == mimetypes::GOOGLE_DRIVE_FOLDER)
    }

    /// Docs/Sheets/Slides etc. have no binary content and must be exported
    pub fn is_google_document(&self) -> bool {
        match self.mime_type.as_deref() {
            Some(mimetypes::GOOGLE_DRIVE_FOLDER) | Some(mimetypes::GOOGLE_DRIVE_SHORTCUT) => false,
            Some(m) => m.starts_with(mimetypes::GOOGLE_APPS_PREFIX),
            None => false,
        }
    }

    /// Short human-readable type label / 文件类型显示名
    ///
    /// The extension is only shown for types without a label of their own:
    /// `foo.json` with no MIME type fetched is `?`, `foo.jsons` is `JSONS`.
    pub fn human_type(&self) -> String {
        if let Some(label) = self.mime_type.as_deref().and_then(mime_label) {
            return label.to_string();
        }

        let ext = get_ext(&self.name);
        if ext.is_empty() || mime_label(&guess_mime_type(&self.name)).is_some() {
            "?".to_string()
        } else {
            ext.to_uppercase()
        }
    }
}

fn mime_label(mime: &str) -> Option<&'static str> {
    match mime {
        mimetypes::GOOGLE_DRIVE_FOLDER => Some("folder"),
        mimetypes::GOOGLE_SHEETS => Some("spreadsheet"),
        mimetypes::GOOGLE_DOCS => Some("document"),
        mimetypes::GOOGLE_SLIDES => Some("presentation"),
        mimetypes::JSON => Some("JSON"),
        mimetypes::CSV => Some("CSV"),
        mimetypes::PDF => Some("PDF"),
        mimetypes::XLSX => Some("XLSX"),
        _ => None,
    }
}
