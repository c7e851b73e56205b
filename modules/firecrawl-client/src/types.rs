use serde::{Deserialize, Serialize};

/// Request body for `POST /v1/scrape`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScrapeInput<'a> {
    pub url: &'a str,
    pub formats: &'a [&'a str],
    pub only_main_content: bool,
    /// Server-side page timeout in milliseconds.
    pub timeout: u64,
}

/// Request body for `POST /v1/extract`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExtractInput<'a> {
    pub urls: Vec<&'a str>,
    pub prompt: &'a str,
    pub schema: &'a serde_json::Value,
}

/// Envelope shared by Firecrawl responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Rendered page returned by the scrape endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapedDocument {
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "sourceURL")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
}

/// Response of `POST /v1/extract`: either inline data or an async job id.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExtractStarted {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `GET /v1/extract/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExtractStatus {
    pub status: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_response_deserializes() {
        let json = r##"{
            "success": true,
            "data": {
                "markdown": "# Kommunen\n\nNyheter",
                "metadata": {"title": "Kommunen", "sourceURL": "https://example.se", "statusCode": 200}
            }
        }"##;
        let resp: ApiResponse<ScrapedDocument> = serde_json::from_str(json).unwrap();
        let doc = resp.data.unwrap();
        assert_eq!(doc.metadata.title.as_deref(), Some("Kommunen"));
        assert_eq!(doc.metadata.status_code, Some(200));
        assert!(doc.html.is_none());
    }

    #[test]
    fn extract_started_with_job_id() {
        let started: ExtractStarted =
            serde_json::from_str(r#"{"success": true, "id": "job-123"}"#).unwrap();
        assert_eq!(started.id.as_deref(), Some("job-123"));
        assert!(started.data.is_none());
    }
}
