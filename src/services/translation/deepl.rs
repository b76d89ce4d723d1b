// DeepL REST client (v2/translate)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::StatelessTranslator;
use crate::core::errors::{TranslationError, TranslationResult};

const FREE_API_URL: &str = "https://api-free.deepl.com";
const PRO_API_URL: &str = "https://api.deepl.com";

pub struct DeeplClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: [&'a str; 1],
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(default)]
    detected_source_language: Option<String>,
    text: String,
}

/// Free-tier keys end in ":fx" and must use the free endpoint
fn default_base_url(api_key: &str) -> &'static str {
    if api_key.ends_with(":fx") {
        FREE_API_URL
    } else {
        PRO_API_URL
    }
}

impl DeeplClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> TranslationResult<Self> {
        let api_key = api_key.into();
        let base_url = base_url
            .unwrap_or_else(|| default_base_url(&api_key).to_string())
            .trim_end_matches('/')
            .to_string();

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }
}

#[async_trait]
impl StatelessTranslator for DeeplClient {
    async fn translate(&self, text: &str, target_lang: &str) -> TranslationResult<String> {
        let response = self
            .http
            .post(format!("{}/v2/translate", self.base_url))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&TranslateRequest {
                text: [text],
                target_lang,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::ApiStatus {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: TranslateResponse = response.json().await?;
        let translation = parsed
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| TranslationError::InvalidResponse("no translations returned".into()))?;

        debug!(
            "DeepL: {} -> {} ({} chars)",
            translation.detected_source_language.as_deref().unwrap_or("?"),
            target_lang,
            translation.text.chars().count()
        );
        Ok(translation.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_key_tier() {
        assert_eq!(default_base_url("abc:fx"), FREE_API_URL);
        assert_eq!(default_base_url("abc"), PRO_API_URL);
    }

    #[test]
    fn test_explicit_base_url_wins() {
        let client = DeeplClient::new("k:fx", Some("http://localhost:9/".to_string())).unwrap();
        assert_eq!(client.base_url, "http://localhost:9");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"translations":[{"detected_source_language":"JA","text":"Hello"}]}"#;
        let parsed: TranslateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.translations[0].text, "Hello");
    }

    #[test]
    fn test_request_shape() {
        let json = serde_json::to_value(TranslateRequest {
            text: ["こんにちは"],
            target_lang: "EN-US",
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"text": ["こんにちは"], "target_lang": "EN-US"}));
    }
}
