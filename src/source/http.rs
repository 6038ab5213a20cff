// src/source/http.rs
use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{FetchOptions, RawSourceResult, SourceAdapter, SourceId};
use crate::normalize::coerce::clean_text;

const DEFAULT_USER_AGENT: &str =
    "company-profile-aggregator/0.1 (+https://example.invalid/company-profile-aggregator)";

/// Markers of an anti-bot interstitial served with a 2xx status.
const BLOCK_MARKERS: [&str; 4] = [
    "captcha",
    "unusual traffic",
    "are you a robot",
    "access denied",
];

/// Cleaned text length above which a page is treated as content.
const INTERSTITIAL_MAX_CHARS: usize = 600;

static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// Body is a JSON object of source-shaped fields.
    #[default]
    Json,
    /// Body is HTML/plain text; exposed to the normalizer as field `text`.
    Text,
}

fn default_query_param() -> String {
    "q".to_string()
}

/// Host-supplied description of one HTTP-backed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default = "default_query_param")]
    pub query_param: String,
    #[serde(default)]
    pub payload: PayloadKind,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Adapter that asks an HTTP endpoint about a company
/// (`GET url?{query_param}={company}`).
pub struct HttpAdapter {
    source: SourceId,
    endpoint: EndpointConfig,
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new(source: SourceId, endpoint: EndpointConfig) -> Result<Self> {
        let ua = endpoint
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let client = reqwest::Client::builder()
            .user_agent(ua)
            .build()
            .context("building http client")?;
        Ok(Self {
            source,
            endpoint,
            client,
        })
    }

    fn classify_status(&self, status: StatusCode) -> Option<RawSourceResult> {
        if status.is_success() {
            return None;
        }
        let msg = format!("http status {}", status.as_u16());
        let res = match status {
            StatusCode::NOT_FOUND => RawSourceResult::empty(self.source),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                RawSourceResult::blocked(self.source, msg)
            }
            _ => RawSourceResult::failed(self.source, msg),
        };
        Some(res)
    }

    fn parse_body(&self, body: &str) -> RawSourceResult {
        match self.endpoint.payload {
            PayloadKind::Json => match serde_json::from_str::<serde_json::Value>(body) {
                Ok(serde_json::Value::Object(map)) if map.is_empty() => {
                    RawSourceResult::empty(self.source)
                }
                Ok(serde_json::Value::Object(map)) => {
                    RawSourceResult::success(self.source, map.into_iter().collect())
                }
                Ok(serde_json::Value::Null) => RawSourceResult::empty(self.source),
                Ok(_) => RawSourceResult::failed(self.source, "expected a JSON object"),
                Err(_) if looks_blocked(body) => {
                    RawSourceResult::blocked(self.source, "anti-bot interstitial")
                }
                Err(e) => RawSourceResult::failed(self.source, format!("invalid json: {e}")),
            },
            PayloadKind::Text => {
                if looks_blocked(body) {
                    return RawSourceResult::blocked(self.source, "anti-bot interstitial");
                }
                let text = clean_text(body);
                if text.is_empty() {
                    RawSourceResult::empty(self.source)
                } else {
                    let mut fields = BTreeMap::new();
                    fields.insert("text".to_string(), serde_json::Value::String(text));
                    RawSourceResult::success(self.source, fields)
                }
            }
        }
    }
}

/// An interstitial names itself in its `<title>` or is a short page that
/// mentions a marker. Long pages that merely talk about CAPTCHAs are content.
fn looks_blocked(body: &str) -> bool {
    let has_marker = |s: &str| {
        let lowered = s.to_ascii_lowercase();
        BLOCK_MARKERS.iter().any(|m| lowered.contains(m))
    };
    if let Some(title) = TITLE_RE.captures(body).and_then(|c| c.get(1)) {
        if has_marker(title.as_str()) {
            return true;
        }
    }
    clean_text(body).len() <= INTERSTITIAL_MAX_CHARS && has_marker(body)
}

#[async_trait]
impl SourceAdapter for HttpAdapter {
    fn source(&self) -> SourceId {
        self.source
    }

    async fn fetch(&self, company: &str, options: &FetchOptions) -> RawSourceResult {
        let resp = self
            .client
            .get(&self.endpoint.url)
            .query(&[(self.endpoint.query_param.as_str(), company)])
            .timeout(options.remaining())
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return RawSourceResult::timed_out(self.source),
            Err(e) => {
                tracing::warn!(error = ?e, source = %self.source, "source http error");
                return RawSourceResult::failed(self.source, format!("http get: {e}"));
            }
        };

        if let Some(res) = self.classify_status(resp.status()) {
            return res;
        }

        match resp.text().await {
            Ok(body) => self.parse_body(&body),
            Err(e) if e.is_timeout() => RawSourceResult::timed_out(self.source),
            Err(e) => RawSourceResult::failed(self.source, format!("http body: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchStatus;

    fn adapter(payload: PayloadKind) -> HttpAdapter {
        HttpAdapter::new(
            SourceId::GeneralSearch,
            EndpointConfig {
                url: "http://127.0.0.1:9/search".into(),
                query_param: default_query_param(),
                payload,
                user_agent: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn status_codes_map_to_fetch_status() {
        let a = adapter(PayloadKind::Json);
        assert!(a.classify_status(StatusCode::OK).is_none());
        assert_eq!(
            a.classify_status(StatusCode::NOT_FOUND).unwrap().status,
            FetchStatus::Empty
        );
        assert_eq!(
            a.classify_status(StatusCode::TOO_MANY_REQUESTS).unwrap().status,
            FetchStatus::Blocked
        );
        assert_eq!(
            a.classify_status(StatusCode::BAD_GATEWAY).unwrap().status,
            FetchStatus::Failed
        );
    }

    #[test]
    fn json_bodies_become_fields() {
        let a = adapter(PayloadKind::Json);
        let ok = a.parse_body(r#"{"name":"Acme","industry":"Fintech"}"#);
        assert_eq!(ok.status, FetchStatus::Success);
        assert_eq!(ok.fields["name"], serde_json::json!("Acme"));
        assert_eq!(a.parse_body("{}").status, FetchStatus::Empty);
        assert_eq!(a.parse_body("[1,2]").status, FetchStatus::Failed);
    }

    #[test]
    fn text_bodies_are_cleaned_and_captcha_is_blocked() {
        let a = adapter(PayloadKind::Text);
        let ok = a.parse_body("<p>Acme raised&nbsp;$5M</p>");
        assert_eq!(ok.fields["text"], serde_json::json!("Acme raised $5M"));
        let blocked = a.parse_body("<html>Please solve this CAPTCHA</html>");
        assert_eq!(blocked.status, FetchStatus::Blocked);
        let titled = a.parse_body(&format!(
            "<html><head><title>Access Denied</title></head><body>{}</body></html>",
            "filler ".repeat(200)
        ));
        assert_eq!(titled.status, FetchStatus::Blocked);
    }

    #[test]
    fn json_mentioning_captcha_is_content() {
        let a = adapter(PayloadKind::Json);
        let ok = a.parse_body(r#"{"name":"hCaptcha","description":"Privacy-first CAPTCHA service"}"#);
        assert_eq!(ok.status, FetchStatus::Success);
        assert_eq!(ok.fields["name"], serde_json::json!("hCaptcha"));

        let wall = a.parse_body("<html><body>Are you a robot? Solve the captcha.</body></html>");
        assert_eq!(wall.status, FetchStatus::Blocked);
        assert_eq!(a.parse_body("<html>oops</html>").status, FetchStatus::Failed);
    }

    #[test]
    fn long_pages_about_captchas_are_content() {
        let a = adapter(PayloadKind::Text);
        let body = format!(
            "<html><head><title>Security startup raises $10M</title></head><body>{}</body></html>",
            "hCaptcha builds a privacy-first captcha service for websites. ".repeat(20)
        );
        let ok = a.parse_body(&body);
        assert_eq!(ok.status, FetchStatus::Success);
    }
}
