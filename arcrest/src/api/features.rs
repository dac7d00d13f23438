//! Feature edits and queries against a single layer

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::client::Portal;
use super::common::{check_response, decode, null_as_default, FormParams, RemoteError};
use super::error::{ApiError, Result};
use super::session::Session;

pub const DEFAULT_DELETE_WHERE: &str = "ObjectId>0";

/// A feature as sent to `addFeatures` and returned by `query`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureRecord {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
}

impl FeatureRecord {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self {
            attributes,
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Value) -> Self {
        self.geometry = Some(geometry);
        self
    }
}

/// Per-feature outcome of an edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResult {
    pub object_id: Option<i64>,
    pub global_id: Option<String>,
    #[serde(default)]
    pub success: bool,
    pub error: Option<RemoteError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddResult {
    pub add_results: Vec<EditResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub delete_results: Vec<EditResult>,
}

fn failures(results: &[EditResult]) -> Vec<&EditResult> {
    results.iter().filter(|r| !r.success).collect()
}

impl AddResult {
    pub fn succeeded(&self) -> usize {
        self.add_results.iter().filter(|r| r.success).count()
    }

    pub fn failures(&self) -> Vec<&EditResult> {
        failures(&self.add_results)
    }
}

impl DeleteResult {
    pub fn succeeded(&self) -> usize {
        self.delete_results.iter().filter(|r| r.success).count()
    }

    pub fn failures(&self) -> Vec<&EditResult> {
        failures(&self.delete_results)
    }
}

#[derive(Debug, Clone)]
pub struct QueryParams {
    pub where_clause: String,
    pub out_fields: String,
    pub return_geometry: bool,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            where_clause: "1=1".to_string(),
            out_fields: "*".to_string(),
            return_geometry: true,
        }
    }
}

impl QueryParams {
    pub fn new(where_clause: impl Into<String>) -> Self {
        Self {
            where_clause: where_clause.into(),
            ..Default::default()
        }
    }

    pub fn with_out_fields(mut self, out_fields: impl Into<String>) -> Self {
        self.out_fields = out_fields.into();
        self
    }

    pub fn without_geometry(mut self) -> Self {
        self.return_geometry = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    pub object_id_field_name: Option<String>,
    pub geometry_type: Option<String>,
    pub spatial_reference: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<Value>,
    pub features: Vec<FeatureRecord>,
    #[serde(default)]
    pub exceeded_transfer_limit: bool,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: Option<u64>,
}

/// Features API for one layer URL
///
/// The token is attached only when a session is present; public-write layers
/// accept anonymous edits.
pub struct FeaturesApi<'a> {
    portal: &'a Portal,
    layer_url: String,
    session: Option<&'a Session>,
}

impl<'a> FeaturesApi<'a> {
    pub fn new(portal: &'a Portal, layer_url: &str, session: Option<&'a Session>) -> Self {
        Self {
            portal,
            layer_url: layer_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn layer_url(&self) -> &str {
        &self.layer_url
    }

    fn form(&self) -> FormParams {
        FormParams::format("json").add_optional("token", self.session.map(Session::token))
    }

    async fn post(&self, operation: &str, form: FormParams) -> Result<Value> {
        let url = format!("{}/{}", self.layer_url, operation);
        let value = self.portal.post(&url, &form).await?;
        check_response(value, ApiError::Mutation)
    }

    /// POST {layerUrl}/addFeatures
    pub async fn add(&self, features: &[FeatureRecord]) -> Result<AddResult> {
        let form = self.form().add_json("features", features)?;
        let value = self.post("addFeatures", form).await?;
        if value.get("addResults").is_none() {
            return Err(ApiError::Mutation(RemoteError::missing_field("addResults")));
        }
        let result: AddResult = decode(value, "addFeatures response")?;
        tracing::info!(
            "Added {}/{} feature(s) to {}",
            result.succeeded(),
            features.len(),
            self.layer_url
        );
        Ok(result)
    }

    /// POST {layerUrl}/deleteFeatures
    ///
    /// `where_clause` goes to the service verbatim; it is not sanitized here.
    pub async fn delete(&self, where_clause: &str) -> Result<DeleteResult> {
        let form = self.form().add("where", where_clause);
        let value = self.post("deleteFeatures", form).await?;
        if value.get("deleteResults").is_none() {
            return Err(ApiError::Mutation(RemoteError::missing_field("deleteResults")));
        }
        let result: DeleteResult = decode(value, "deleteFeatures response")?;
        tracing::info!(
            "Deleted {} feature(s) from {} where {}",
            result.succeeded(),
            self.layer_url,
            where_clause
        );
        Ok(result)
    }

    /// Delete every feature with a positive object id.
    pub async fn delete_all(&self) -> Result<DeleteResult> {
        self.delete(DEFAULT_DELETE_WHERE).await
    }

    /// POST {layerUrl}/query
    pub async fn query(&self, params: &QueryParams) -> Result<FeatureSet> {
        let form = self
            .form()
            .add("where", &params.where_clause)
            .add("outFields", &params.out_fields)
            .add("returnGeometry", params.return_geometry);
        let url = format!("{}/query", self.layer_url);
        let value = self.portal.post(&url, &form).await?;
        let value = check_response(value, ApiError::Remote)?;
        decode(value, "query response")
    }

    /// POST {layerUrl}/query with returnCountOnly=true
    pub async fn count(&self, where_clause: &str) -> Result<u64> {
        let form = self
            .form()
            .add("where", where_clause)
            .add("returnCountOnly", true);
        let url = format!("{}/query", self.layer_url);
        let value = self.portal.post(&url, &form).await?;
        let value = check_response(value, ApiError::Remote)?;
        let response: CountResponse = decode(value, "count response")?;
        response.count.ok_or_else(|| {
            ApiError::MalformedResponse("count response did not include `count`".to_string())
        })
    }
}
