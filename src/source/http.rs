//! HTTP origin source.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::{EntityIdDigestGenerator, OriginSource};
use crate::criteria::CriteriaSet;
use crate::types::EntityDescriptor;
use crate::{HeimdallError, Result};

/// Content types accepted by default.
pub const DEFAULT_CONTENT_TYPES: &[&str] = &["application/samlmetadata+json", "application/json"];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the request URL is derived from an entity ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestUrlBuilder {
    /// The entity ID is itself an `http`/`https` URL ("well-known location").
    EntityId,
    /// Substitute `{entity_id}` (URL-encoded) and `{sha1}` (lower-hex digest)
    /// into a template, e.g. `https://mdq.example.org/entities/{sha1}`.
    Template(String),
}

impl RequestUrlBuilder {
    /// Request URL for `entity_id`, or `None` if it cannot be built.
    pub fn build(&self, entity_id: &str) -> Option<String> {
        match self {
            Self::EntityId => {
                let url = Url::parse(entity_id).ok()?;
                matches!(url.scheme(), "http" | "https").then(|| entity_id.to_string())
            }
            Self::Template(template) => {
                let encoded: String = url::form_urlencoded::byte_serialize(entity_id.as_bytes()).collect();
                let mut url = template.replace("{entity_id}", &encoded);
                if url.contains("{sha1}") {
                    let digest = EntityIdDigestGenerator::new().generate(entity_id)?;
                    url = url.replace("{sha1}", &digest);
                }
                Some(url)
            }
        }
    }
}

/// Fetches documents over HTTP(S).
///
/// 304 and other non-200 responses yield `Ok(None)`, except 5xx and 429,
/// which fail with [`HeimdallError::HttpStatus`] so they can be retried.
/// Responses whose `Content-Type` is not one of the supported types are
/// rejected; a missing `Content-Type` is accepted.
#[derive(Debug, Clone)]
pub struct HttpOriginSource {
    client: Client,
    url_builder: RequestUrlBuilder,
    content_types: Vec<String>,
}

impl HttpOriginSource {
    /// Create a source with the default timeout and content types.
    pub fn new(url_builder: RequestUrlBuilder) -> Result<Self> {
        Self::with_timeout(url_builder, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url_builder: RequestUrlBuilder, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HeimdallError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, url_builder))
    }

    /// Use an existing client (for custom TLS or proxy settings).
    pub fn with_client(client: Client, url_builder: RequestUrlBuilder) -> Self {
        Self {
            client,
            url_builder,
            content_types: DEFAULT_CONTENT_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the supported content types. An empty list accepts anything.
    pub fn content_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.content_types = types
            .into_iter()
            .map(|t| {
                let t: String = t.into();
                t.trim().to_ascii_lowercase()
            })
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    fn accept_header(&self) -> Option<String> {
        (!self.content_types.is_empty()).then(|| self.content_types.join(", "))
    }

    fn is_supported(&self, content_type: Option<&str>) -> bool {
        if self.content_types.is_empty() {
            return true;
        }
        let Some(value) = content_type else {
            return true;
        };
        let essence = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        self.content_types.iter().any(|t| *t == essence)
    }
}

#[async_trait]
impl OriginSource for HttpOriginSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, criteria: &CriteriaSet) -> Result<Option<EntityDescriptor>> {
        let Some(entity_id) = criteria.entity_id() else {
            return Ok(None);
        };
        let Some(url) = self.url_builder.build(entity_id) else {
            debug!(entity_id, "could not build request URL, skipping HTTP fetch");
            return Ok(None);
        };

        let mut request = self.client.get(&url);
        if let Some(accept) = self.accept_header() {
            request = request.header(ACCEPT, accept);
        }
        debug!(url = %url, "fetching metadata over HTTP");
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_MODIFIED => {
                debug!(url = %url, "metadata not modified");
                return Ok(None);
            }
            status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                return Err(HeimdallError::HttpStatus {
                    status: status.as_u16(),
                    url,
                });
            }
            status => {
                warn!(url = %url, status = status.as_u16(), "non-OK response fetching metadata");
                return Ok(None);
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !self.is_supported(content_type.as_deref()) {
            return Err(HeimdallError::UnsupportedContentType(content_type.unwrap_or_default()));
        }

        let body = response.bytes().await?;
        EntityDescriptor::from_json_slice(&body).map(Some)
    }
}
