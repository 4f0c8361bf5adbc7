use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("unsupported export format {:?}", other)),
        }
    }
}

/// A downloaded report body
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ExportedFile {
    /// Extracts `filename=` from a Content-Disposition header value
    pub fn file_name_from_disposition(header: &str) -> Option<String> {
        header.split(';').map(str::trim).find_map(|part| {
            part.strip_prefix("filename=")
                .map(|name| name.trim_matches('"').to_string())
                .filter(|name| !name.is_empty())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SystemStats {
    pub total_users: u64,
    pub total_teachers: u64,
    pub total_students: u64,
    pub total_admins: u64,
    pub total_sessions: u64,
    pub active_sessions: u64,
    pub completed_sessions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_disposition() {
        assert_eq!(
            ExportedFile::file_name_from_disposition(
                "attachment; filename=session_665f1c_report.csv"
            )
            .as_deref(),
            Some("session_665f1c_report.csv")
        );
        assert_eq!(
            ExportedFile::file_name_from_disposition("attachment; filename=\"summary.pdf\"")
                .as_deref(),
            Some("summary.pdf")
        );
        assert!(ExportedFile::file_name_from_disposition("inline").is_none());
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }
}
