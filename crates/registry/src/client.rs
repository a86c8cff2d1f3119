//! HTTP client for the Confluent schema-registry REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::error::{RegistryError, Result};
use crate::source::{RegisteredSchema, SchemaSource};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for a schema registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL, e.g. `http://localhost:8081`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
}

impl RegistryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }
}

pub struct RegistryClient {
    http: reqwest::Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        if config.accept_invalid_certs {
            tracing::warn!("TLS certificate verification is disabled for {}", config.url);
        }
        let invalid_url = |message: String| RegistryError::InvalidUrl {
            url: config.url.clone(),
            message,
        };
        let base_url = Url::parse(&config.url).map_err(|e| invalid_url(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid_url("URL cannot have path segments".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self {
            http,
            base_url,
            username: config.username,
            password: config.password,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn schema_by_id_url(&self, id: u32) -> Result<Url> {
        self.endpoint(&["schemas", "ids", &id.to_string()])
    }

    /// Subjects are one path segment; a `/` inside one is percent-encoded.
    pub fn schema_by_version_url(&self, subject: &str, version: i32) -> Result<Url> {
        self.endpoint(&["subjects", subject, "versions", &version.to_string()])
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RegistryError::InvalidUrl {
                url: self.base_url.to_string(),
                message: "URL cannot have path segments".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        tracing::debug!("Fetching schema from {url}");

        let mut request = self
            .http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/vnd.schemaregistry.v1+json");
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RegistryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| RegistryError::InvalidResponse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl SchemaSource for RegistryClient {
    async fn schema_by_id(&self, id: u32) -> Result<RegisteredSchema> {
        self.get_json(self.schema_by_id_url(id)?).await
    }

    async fn schema_by_version(&self, subject: &str, version: i32) -> Result<RegisteredSchema> {
        self.get_json(self.schema_by_version_url(subject, version)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let client = RegistryClient::new(RegistryConfig::new("http://localhost:8081/")).unwrap();
        assert_eq!(
            client.schema_by_id_url(42).unwrap().as_str(),
            "http://localhost:8081/schemas/ids/42"
        );
        assert_eq!(
            client.schema_by_version_url("animal-value", 3).unwrap().as_str(),
            "http://localhost:8081/subjects/animal-value/versions/3"
        );

        let client = RegistryClient::new(RegistryConfig::new("https://example.com/registry")).unwrap();
        assert_eq!(
            client.schema_by_id_url(1).unwrap().as_str(),
            "https://example.com/registry/schemas/ids/1"
        );
    }

    #[test]
    fn test_subject_with_slashes_is_one_segment() {
        let client = RegistryClient::new(RegistryConfig::new("http://localhost:8081")).unwrap();
        let url = client
            .schema_by_version_url("com/acme/diet.proto", 1)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8081/subjects/com%2Facme%2Fdiet.proto/versions/1"
        );
        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(segments.len(), 4);
    }

    #[test]
    fn test_invalid_base_url() {
        let err = RegistryClient::new(RegistryConfig::new("not a url")).err().unwrap();
        assert!(matches!(err, RegistryError::InvalidUrl { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_http_error() {
        let client = RegistryClient::new(RegistryConfig::new("ftp://localhost")).unwrap();
        let err = client.schema_by_id(1).await.unwrap_err();
        assert!(matches!(err, RegistryError::Http(_)), "{err:?}");
    }
}
