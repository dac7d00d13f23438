use serde_json::Value;
use std::sync::Arc;

use super::common::FormParams;
use super::content::CatalogApi;
use super::error::Result;
use super::features::FeaturesApi;
use super::layer::FeatureLayerHandle;
use super::service::ServicesApi;
use super::session::Session;
use super::transport::{HttpTransport, Transport, TransportConfig};

/// ArcGIS Online / Portal client
///
/// Cheap to clone; all clones share one transport.
#[derive(Clone)]
pub struct Portal {
    inner: Arc<PortalInner>,
}

struct PortalInner {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl Portal {
    /// Create a new client with the default transport configuration
    pub fn new(endpoint: &str, insecure: bool) -> Result<Self> {
        let config = TransportConfig {
            insecure,
            ..Default::default()
        };
        Self::with_config(endpoint, &config)
    }

    /// Create a new client with a custom transport configuration
    pub fn with_config(endpoint: &str, config: &TransportConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(endpoint, Arc::new(transport)))
    }

    /// Create a client over any [`Transport`] implementation
    pub fn with_transport(endpoint: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(PortalInner {
                transport,
                base_url: endpoint.trim_end_matches('/').to_string(),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// `{portal}/sharing/rest{path}`
    pub fn sharing_url(&self, path: &str) -> String {
        format!("{}/sharing/rest{}", self.inner.base_url, path)
    }

    /// Content root for a user, `{portal}/sharing/rest/content/users/{username}`
    pub fn user_content_url(&self, username: &str) -> String {
        self.sharing_url(&format!(
            "/content/users/{}",
            urlencoding::encode(username)
        ))
    }

    /// POST a form to an absolute URL and return the decoded body
    pub async fn post(&self, url: &str, form: &FormParams) -> Result<Value> {
        self.inner.transport.post_form(url, form).await
    }

    /// Search and item lookups
    pub fn catalog(&self) -> CatalogApi<'_> {
        CatalogApi::new(self)
    }

    /// Feature service reading, provisioning and mirroring
    pub fn services(&self) -> ServicesApi<'_> {
        ServicesApi::new(self)
    }

    /// Feature edits and queries against a layer handle, using its session if it has one
    pub fn features<'a>(&'a self, layer: &'a FeatureLayerHandle) -> FeaturesApi<'a> {
        FeaturesApi::new(self, layer.url(), layer.session())
    }

    /// Feature edits and queries against any layer URL
    pub fn features_at<'a>(
        &'a self,
        layer_url: &str,
        session: Option<&'a Session>,
    ) -> FeaturesApi<'a> {
        FeaturesApi::new(self, layer_url, session)
    }
}
