use async_trait::async_trait;
use common::{
    env_config::GeminiConfig,
    error::{AppError, Res},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::services::table::{ImagePayload, TableData};

const TABLE_PROMPT: &str = r#"Analyze this image and extract the table it contains.

Return ONLY a valid JSON object, with no text before or after it, shaped like:
{
  "headers": ["Column1", "Column2", "Column3"],
  "rows": [
    ["value1", "value2", "value3"],
    ["value4", "value5", "value6"]
  ]
}

Rules:
1. Use the visible headers. If there are none, generate descriptive names (Column 1, Column 2, ...).
2. Preserve every value exactly as it appears.
3. Use an empty string "" for empty cells.
4. Keep the formatting of numbers, dates and text unchanged.
5. If there are several tables, extract the largest or most prominent one.
6. Return ONLY the JSON, without code fences or explanations."#;

/// Turns an image into a table.
#[async_trait]
pub trait TableExtractor: Send + Sync {
    /// Fails with [`AppError::ExtractionFailed`] when no usable table comes back
    /// and with [`AppError::UpstreamUnavailable`] when the provider cannot be reached.
    async fn extract(&self, image: &ImagePayload) -> Res<TableData>;
}

/// Gemini `generateContent` over the REST API.
pub struct GeminiExtractor {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiExtractor {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

#[async_trait]
impl TableExtractor for GeminiExtractor {
    async fn extract(&self, image: &ImagePayload) -> Res<TableData> {
        if self.config.api_key.is_empty() {
            return Err(AppError::UpstreamUnavailable(
                "Gemini API key is not configured".to_string(),
            ));
        }

        let body = json!({
            "contents": [{
                "parts": [
                    { "text": TABLE_PROMPT },
                    { "inline_data": { "mime_type": image.mime_type, "data": image.data } }
                ]
            }],
            "generationConfig": { "temperature": 0 }
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("Gemini: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(AppError::UpstreamUnavailable(format!("Gemini answered {}", status)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            log::warn!("Gemini rejected the request ({}): {}", status, detail);
            return Err(AppError::ExtractionFailed(format!("Gemini answered {}", status)));
        }

        let reply = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| AppError::ExtractionFailed(format!("Unreadable Gemini reply: {}", e)))?;
        parse_table_reply(&reply.text())
    }
}

#[derive(Debug, Deserialize)]
struct RawTable {
    headers: Option<Vec<Value>>,
    rows: Option<Vec<Vec<Value>>>,
}

/// Parses the model's JSON answer, tolerating markdown code fences around it.
pub fn parse_table_reply(text: &str) -> Res<TableData> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(AppError::ExtractionFailed("Empty reply".to_string()));
    }

    let raw: RawTable = serde_json::from_str(cleaned)
        .map_err(|e| AppError::ExtractionFailed(format!("Reply is not a table: {}", e)))?;
    let headers = raw
        .headers
        .ok_or_else(|| AppError::ExtractionFailed("Missing \"headers\"".to_string()))?;
    let rows = raw
        .rows
        .ok_or_else(|| AppError::ExtractionFailed("Missing \"rows\"".to_string()))?;

    Ok(TableData {
        headers: headers.into_iter().map(cell_text).collect(),
        rows: rows
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect(),
    })
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_reply_is_parsed() {
        let reply = "```json\n{\"headers\": [\"A\", \"B\"], \"rows\": [[\"1\", 2.5], [null, true]]}\n```";
        let table = parse_table_reply(reply).unwrap();
        assert_eq!(table.headers, vec!["A", "B"]);
        assert_eq!(table.rows[0], vec!["1", "2.5"]);
        assert_eq!(table.rows[1], vec!["", "true"]);
    }

    #[test]
    fn reply_without_rows_fails() {
        let err = parse_table_reply("{\"headers\": [\"A\"]}").unwrap_err();
        assert!(matches!(err, AppError::ExtractionFailed(_)));
    }

    #[test]
    fn prose_reply_fails() {
        let err = parse_table_reply("I could not find a table in this image.").unwrap_err();
        assert!(matches!(err, AppError::ExtractionFailed(_)));
    }

    #[test]
    fn candidate_parts_are_concatenated() {
        let reply: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"headers\":" }, { "text": "[],\"rows\":[]}" }] } }]
        }))
        .unwrap();
        assert_eq!(parse_table_reply(&reply.text()).unwrap().rows.len(), 0);
    }

    #[tokio::test]
    async fn missing_api_key_is_upstream_unavailable() {
        let extractor = GeminiExtractor::new(GeminiConfig {
            api_key: String::new(),
            model: "gemini-2.5-flash-lite".to_string(),
            api_url: "http://127.0.0.1:9".to_string(),
        });
        let image = ImagePayload {
            data: "aGVsbG8=".to_string(),
            mime_type: "image/png".to_string(),
        };
        assert!(matches!(
            extractor.extract(&image).await,
            Err(AppError::UpstreamUnavailable(_))
        ));
    }
}
