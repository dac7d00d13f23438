//! Feature service definitions, create-parameter templates and provisioning

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::client::Portal;
use super::common::{check_response, decode, FormParams, RemoteError};
use super::error::{ApiError, Result};
use super::layer::FeatureLayerHandle;
use super::session::Session;

/// Service definition fields that carry over when provisioning a look-alike service.
pub const CREATE_PARAMETER_FIELDS: [&str; 13] = [
    "name",
    "serviceDescription",
    "hasStaticData",
    "maxRecordCount",
    "supportedQueryFormats",
    "capabilities",
    "description",
    "copyrightText",
    "spatialReference",
    "initialExtent",
    "allowGeometryUpdates",
    "units",
    "xssPreventionInfo",
];

/// Full JSON definition of a feature service or layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceDefinition(Map<String, Value>);

/// Entry of a service definition's `layers` array
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayerRef {
    pub id: i64,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub layer_type: Option<String>,
}

impl ServiceDefinition {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ApiError::MalformedResponse(format!(
                "service definition is not a JSON object: {}",
                other
            ))),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// The `layers` entries sorted by layer id. A definition without `layers`
    /// has none; an entry without an `id` is malformed.
    pub fn layers(&self) -> Result<Vec<LayerRef>> {
        let mut layers: Vec<LayerRef> = match self.0.get("layers") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(layers) => decode(layers.clone(), "layers list")?,
        };
        layers.sort_by_key(|layer| layer.id);
        Ok(layers)
    }
}

impl From<Map<String, Value>> for ServiceDefinition {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Allow-listed subset of a service definition, sent as `createParameters`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreateParametersTemplate(Map<String, Value>);

/// Copy the allow-listed keys present in `source`; absent keys stay absent.
pub fn derive_create_parameters(source: &Map<String, Value>) -> CreateParametersTemplate {
    CreateParametersTemplate(project(source, &CREATE_PARAMETER_FIELDS))
}

pub(crate) fn project(source: &Map<String, Value>, fields: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|field| {
            source
                .get(*field)
                .map(|value| (field.to_string(), value.clone()))
        })
        .collect()
}

impl CreateParametersTemplate {
    pub fn derive(definition: &ServiceDefinition) -> Self {
        derive_create_parameters(definition.as_map())
    }

    /// Editable, sync-enabled template for a brand-new empty service.
    pub fn editable(name: &str, wkid: u32) -> Self {
        let mut map = Map::new();
        map.insert("name".to_string(), json!(name));
        map.insert(
            "capabilities".to_string(),
            json!("Query,Editing,Create,Update,Delete,Sync"),
        );
        map.insert("allowGeometryUpdates".to_string(), json!(true));
        map.insert("units".to_string(), json!("esriMeters"));
        map.insert(
            "editorTrackingInfo".to_string(),
            json!({
                "enableEditorTracking": true,
                "enableOwnershipAccessControl": false,
                "allowOthersToUpdate": true,
                "allowOthersToDelete": true
            }),
        );
        map.insert("syncEnabled".to_string(), json!(true));
        map.insert(
            "syncCapabilities".to_string(),
            json!({
                "supportsAsync": true,
                "supportsRegisteringExistingData": true,
                "supportsSyncDirectionControl": true,
                "supportsPerLayerSync": true,
                "supportsPerReplicaSync": true,
                "supportsSyncModelNone": true,
                "supportsRollbackOnFailure": true
            }),
        );
        map.insert("spatialReference".to_string(), json!({ "wkid": wkid }));
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of the template with `name` replaced.
    pub fn with_name(&self, name: &str) -> Self {
        let mut map = self.0.clone();
        map.insert("name".to_string(), Value::String(name.to_string()));
        Self(map)
    }
}

/// A remote feature service with its definition and layers
#[derive(Debug, Clone)]
pub struct FeatureServiceHandle {
    url: String,
    name: Option<String>,
    item_id: Option<String>,
    session: Option<Arc<Session>>,
    definition: ServiceDefinition,
    template: CreateParametersTemplate,
    layers: Vec<FeatureLayerHandle>,
}

impl FeatureServiceHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Display name given when the handle was opened, else the definition's own name.
    pub fn name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or_else(|| self.definition.str_field("name"))
    }

    /// Portal item id, known only for services this client provisioned.
    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_deref()
    }

    pub fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    pub fn create_parameters(&self) -> &CreateParametersTemplate {
        &self.template
    }

    pub fn layers(&self) -> &[FeatureLayerHandle] {
        &self.layers
    }

    pub fn layer(&self, id: i64) -> Option<&FeatureLayerHandle> {
        self.layers.iter().find(|layer| layer.id() == id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateServiceResponse {
    #[serde(rename = "serviceurl")]
    service_url: Option<String>,
    item_id: Option<String>,
}

/// Services API for reading, provisioning and mirroring feature services
pub struct ServicesApi<'a> {
    pub(crate) portal: &'a Portal,
}

impl<'a> ServicesApi<'a> {
    pub fn new(portal: &'a Portal) -> Self {
        Self { portal }
    }

    /// POST {serviceUrl} with f=pjson
    pub async fn read_definition(
        &self,
        service_url: &str,
        session: Option<&Session>,
    ) -> Result<ServiceDefinition> {
        let form = FormParams::format("pjson").add_optional("token", session.map(Session::token));
        let value = self
            .portal
            .post(service_url.trim_end_matches('/'), &form)
            .await?;
        let value = check_response(value, ApiError::Remote)?;
        ServiceDefinition::from_value(value)
    }

    /// Wrap an existing service: read its definition and every layer's definition.
    pub async fn open(
        &self,
        service_url: &str,
        name: Option<&str>,
        session: Option<&Session>,
    ) -> Result<FeatureServiceHandle> {
        let session = session.map(|s| Arc::new(s.clone()));
        self.open_shared(service_url, name, None, session).await
    }

    async fn open_shared(
        &self,
        service_url: &str,
        name: Option<&str>,
        item_id: Option<String>,
        session: Option<Arc<Session>>,
    ) -> Result<FeatureServiceHandle> {
        let url = service_url.trim_end_matches('/').to_string();
        let definition = self.read_definition(&url, session.as_deref()).await?;
        let template = CreateParametersTemplate::derive(&definition);

        let mut layers = Vec::new();
        for layer_ref in definition.layers()? {
            let layer =
                FeatureLayerHandle::read(self.portal, &url, &layer_ref, session.clone()).await?;
            layers.push(layer);
        }

        tracing::debug!("Opened {} with {} layer(s)", url, layers.len());

        Ok(FeatureServiceHandle {
            url,
            name: name.map(str::to_string),
            item_id,
            session,
            definition,
            template,
            layers,
        })
    }

    /// POST {userContent}/createService
    ///
    /// The template's `name` is replaced with `service_name`. The new service is
    /// read back before returning, so a handle only exists once that succeeds.
    pub async fn create(
        &self,
        session: &Session,
        template: &CreateParametersTemplate,
        service_name: &str,
    ) -> Result<FeatureServiceHandle> {
        let url = format!(
            "{}/createService",
            self.portal.user_content_url(session.username())
        );
        let form = FormParams::new()
            .add_json("createParameters", &template.with_name(service_name))?
            .add("outputType", "featureService")
            .add("f", "json")
            .add("token", session.token());

        let value = self.portal.post(&url, &form).await?;
        let value = check_response(value, ApiError::Provision)?;
        let response: CreateServiceResponse = decode(value, "createService response")?;

        let service_url = response
            .service_url
            .ok_or_else(|| ApiError::Provision(RemoteError::missing_field("serviceurl")))?;

        tracing::info!("Created feature service {} at {}", service_name, service_url);

        self.open_shared(
            &service_url,
            Some(service_name),
            response.item_id,
            Some(Arc::new(session.clone())),
        )
        .await
    }

    /// Provision a copy of `source_url` named `new_name` and mirror its layers onto it.
    pub async fn copy(
        &self,
        session: &Session,
        source_url: &str,
        new_name: &str,
    ) -> Result<FeatureServiceHandle> {
        let source = self.open(source_url, None, Some(session)).await?;
        let target = self
            .create(session, source.create_parameters(), new_name)
            .await?;
        self.mirror_layers(session, &source, &target).await?;

        let shared = target.session.clone();
        self.open_shared(target.url(), Some(new_name), target.item_id.clone(), shared)
            .await
    }
}
