//! Progress events published to UI and CLI subscribers

use serde::{Deserialize, Serialize};

/// Kind of progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Info,
    Download,
    Upload,
    Complete,
    Error,
}

/// A structured progress event
///
/// Serializes as `{"type": "download", "filename": "a.txt", ...}` with
/// absent optional fields omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

impl ProgressEvent {
    fn new(kind: ProgressKind) -> Self {
        Self {
            kind,
            filename: None,
            message: None,
            download_count: None,
            upload_count: None,
            percent: None,
            bytes: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(ProgressKind::Info)
        }
    }

    /// Transfer progress for a download in flight
    pub fn download(filename: impl Into<String>, percent: f64, bytes: u64) -> Self {
        Self {
            filename: Some(filename.into()),
            percent: Some(percent),
            bytes: Some(bytes),
            ..Self::new(ProgressKind::Download)
        }
    }

    /// Transfer progress for an upload in flight
    pub fn upload(filename: impl Into<String>, percent: f64, bytes: u64) -> Self {
        Self {
            filename: Some(filename.into()),
            percent: Some(percent),
            bytes: Some(bytes),
            ..Self::new(ProgressKind::Upload)
        }
    }

    /// End of a cycle, with per-direction counts
    pub fn complete(download_count: u64, upload_count: u64) -> Self {
        Self {
            download_count: Some(download_count),
            upload_count: Some(upload_count),
            ..Self::new(ProgressKind::Complete)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(ProgressKind::Error)
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_type_tag_and_omits_empty_fields() {
        let json = serde_json::to_value(ProgressEvent::complete(2, 1)).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["downloadCount"], 2);
        assert_eq!(json["uploadCount"], 1);
        assert!(json.get("filename").is_none());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_error_with_filename() {
        let event = ProgressEvent::error("HTTP 500").with_filename("b.txt");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["filename"], "b.txt");
        assert_eq!(json["message"], "HTTP 500");
    }
}
