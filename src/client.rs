//! HTTP client for a running gateway, used by the CLI subcommands.

use crate::roster::{Entry, EntryDuration, ListKind};
use anyhow::{bail, Context, Result};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(rename = "expiresIn")]
    pub expires_in: i64,
}

pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("Invalid gateway URL '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            bail!("Gateway URL '{base_url}' cannot be used as a base");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url,
            http,
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("Gateway URL cannot be a base"))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut request = self.http.request(method, self.url(segments)?);
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }

    fn require_token(&self) -> Result<()> {
        if self.token.is_none() {
            bail!("No token given. Run `dnmenu-manager login` and pass --token or DNMENU_TOKEN");
        }
        Ok(())
    }

    pub async fn health(&self) -> Result<Value> {
        let resp = self.request(Method::GET, &["health"])?.send().await?;
        parse_json(resp).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let resp = self
            .request(Method::POST, &["login"])?
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        parse_json(resp).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.require_token()?;
        let resp = self.request(Method::POST, &["logout"])?.send().await?;
        parse_json::<Value>(resp).await.map(|_| ())
    }

    /// `Ok(false)` when the gateway rejects the token.
    pub async fn validate(&self) -> Result<bool> {
        self.require_token()?;
        let resp = self.request(Method::GET, &["validate-token"])?.send().await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(false);
        }
        let body: Value = parse_json(resp).await?;
        Ok(body["valid"].as_bool().unwrap_or(false))
    }

    pub async fn list(&self, kind: ListKind) -> Result<Vec<Entry>> {
        self.require_token()?;
        let resp = self.request(Method::GET, &[kind.as_str()])?.send().await?;
        let mut body: Value = parse_json(resp).await?;
        let entries = body
            .get_mut(kind.response_key())
            .map(Value::take)
            .with_context(|| format!("Response is missing '{}'", kind.response_key()))?;
        Ok(serde_json::from_value(entries)?)
    }

    pub async fn add(
        &self,
        kind: ListKind,
        username: &str,
        duration: &EntryDuration,
    ) -> Result<Entry> {
        self.require_token()?;
        let resp = self
            .request(Method::POST, &[kind.as_str(), "add"])?
            .json(&json!({ "username": username, "duration": duration }))
            .send()
            .await?;
        let mut body: Value = parse_json(resp).await?;
        let entry = body
            .get_mut("user")
            .map(Value::take)
            .context("Response is missing 'user'")?;
        Ok(serde_json::from_value(entry)?)
    }

    pub async fn remove(&self, kind: ListKind, username: &str) -> Result<()> {
        self.require_token()?;
        let resp = self
            .request(Method::DELETE, &[kind.as_str(), username])?
            .send()
            .await?;
        parse_json::<Value>(resp).await.map(|_| ())
    }
}

/// Decode a success body, or turn `{"error": ...}` into an error.
async fn parse_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v["error"].as_str().map(str::to_string))
            .unwrap_or(text);
        bail!("Gateway returned {status}: {message}");
    }
    resp.json::<T>()
        .await
        .context("Failed to decode gateway response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn url_encodes_username_segment() {
        let client = ApiClient::new("http://127.0.0.1:5000/").unwrap();
        let url = client.url(&["users", "john doe/../x"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:5000/api/users/john%20doe%2F..%2Fx"
        );
    }

    #[test]
    fn rejects_non_base_url() {
        assert!(ApiClient::new("mailto:admin@example.com").is_err());
        assert!(ApiClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn login_parses_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(body_json(json!({"email": "a@b.c", "password": "pw"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"token": "abc", "expiresIn": 86400})),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let resp = client.login("a@b.c", "pw").await.unwrap();
        assert_eq!(resp.token, "abc");
        assert_eq!(resp.expires_in, 86_400);
    }

    #[tokio::test]
    async fn error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"error": "Email ou senha incorretos"})),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let err = client.login("a@b.c", "bad").await.unwrap_err();
        assert!(err.to_string().contains("Email ou senha incorretos"));
    }

    #[tokio::test]
    async fn list_sends_bearer_and_reads_response_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/usersfarm"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usersFarm": [{
                    "username": "bob",
                    "duration": "lifetime",
                    "expiration": null,
                    "addedAt": "2024-05-01T12:00:00Z"
                }]
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri())
            .unwrap()
            .with_token(Some("tok".into()));
        let entries = client.list(ListKind::UsersFarm).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username, "bob");
        assert_eq!(entries[0].duration, EntryDuration::Lifetime);
    }

    #[tokio::test]
    async fn validate_reports_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/validate-token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Não autorizado"})))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri())
            .unwrap()
            .with_token(Some("stale".into()));
        assert!(!client.validate().await.unwrap());
    }

    #[tokio::test]
    async fn protected_calls_need_a_token() {
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        let err = client.list(ListKind::Users).await.unwrap_err();
        assert!(err.to_string().contains("No token"));
    }
}
