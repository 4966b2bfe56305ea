//! Tabular data sources. Read once per process start.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::info;

use crate::auth::CredentialProvider;
use crate::error::{AuthError, SourceError};

/// Source of the raw credential/catalog grid.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Return every row of the table, header first.
    async fn load_table(&self) -> Result<Vec<Vec<String>>, SourceError>;
}

/// Body of a Sheets `values.get` response. Trailing empty rows and cells
/// are omitted by the API, and `values` is absent for an empty range.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Reads a range from the Google Sheets v4 API.
pub struct GoogleSheetSource {
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    spreadsheet_id: String,
    range: String,
}

impl GoogleSheetSource {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
        }
    }

    fn url(&self) -> String {
        format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values/{}",
            self.spreadsheet_id, self.range
        )
    }
}

#[async_trait]
impl SheetSource for GoogleSheetSource {
    async fn load_table(&self) -> Result<Vec<Vec<String>>, SourceError> {
        let credential = self.credentials.valid_credential().await?;
        let token = credential
            .access_token
            .ok_or_else(|| AuthError::Missing("MAILBOT_ACCESS_TOKEN".into()))?;

        let response = self
            .client
            .get(self.url())
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::Rejected {
                service: "sheets".into(),
                reason: format!("HTTP {}", status.as_u16()),
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| SourceError::Request(format!("invalid response body: {e}")))?;

        info!(
            spreadsheet = %self.spreadsheet_id,
            range = %self.range,
            rows = body.values.len(),
            "Fetched sheet"
        );
        Ok(body.values)
    }
}

/// Reads a local JSON file shaped like a Sheets `values.get` response.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SheetSource for JsonFileSource {
    async fn load_table(&self) -> Result<Vec<Vec<String>>, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let body: ValueRange = serde_json::from_str(&raw)?;
        Ok(body.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCredentialProvider;

    #[tokio::test]
    async fn json_file_source_reads_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");
        std::fs::write(
            &path,
            r#"{"range": "db!A1:E2", "values": [["id","title","role","alias","status"],["a@x.com","","eng","",""]]}"#,
        )
        .unwrap();

        let rows = JsonFileSource::new(&path).load_table().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "a@x.com");
    }

    #[tokio::test]
    async fn json_file_source_missing_values_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, r#"{"range": "db!A1:I1"}"#).unwrap();

        let rows = JsonFileSource::new(&path).load_table().await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn json_file_source_missing_file() {
        let err = JsonFileSource::new("/nonexistent/mailbot/table.json")
            .load_table()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[tokio::test]
    async fn google_source_requires_access_token() {
        let provider = Arc::new(StaticCredentialProvider::new("bot@x.com", "pw"));
        let source = GoogleSheetSource::new(provider, "sheet-id", "db!A:I");
        assert!(matches!(
            source.load_table().await,
            Err(SourceError::Auth(AuthError::Missing(_)))
        ));
    }

    #[test]
    fn google_source_url() {
        let provider = Arc::new(StaticCredentialProvider::new("bot@x.com", "pw"));
        let source = GoogleSheetSource::new(provider, "abc123", "db!A:I");
        assert_eq!(
            source.url(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/db!A:I"
        );
    }
}
