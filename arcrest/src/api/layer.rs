//! Feature layer handles and layer mirroring between services

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::client::Portal;
use super::common::{check_response, decode, FormParams};
use super::error::{ApiError, Result};
use super::service::{project, FeatureServiceHandle, LayerRef, ServiceDefinition, ServicesApi};
use super::session::Session;

/// Layer definition fields replayed onto a target service by `addToDefinition`.
pub const LAYER_DEFINITION_FIELDS: [&str; 25] = [
    "id",
    "name",
    "type",
    "displayField",
    "description",
    "copyrightText",
    "defaultVisibility",
    "geometryType",
    "objectIdField",
    "globalIdField",
    "typeIdField",
    "fields",
    "types",
    "templates",
    "indexes",
    "drawingInfo",
    "extent",
    "hasAttachments",
    "htmlPopupType",
    "hasM",
    "hasZ",
    "capabilities",
    "maxRecordCount",
    "supportedQueryFormats",
    "relationships",
];

/// A layer template cannot be replayed without these.
pub const REQUIRED_LAYER_FIELDS: [&str; 3] = ["name", "type", "fields"];

/// Allow-listed subset of a layer definition
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerTemplate(Map<String, Value>);

pub fn derive_layer_template(source: &Map<String, Value>) -> LayerTemplate {
    LayerTemplate(project(source, &LAYER_DEFINITION_FIELDS))
}

impl LayerTemplate {
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        REQUIRED_LAYER_FIELDS
            .iter()
            .copied()
            .filter(|field| self.0.get(*field).map_or(true, Value::is_null))
            .collect()
    }

    pub fn is_resolved(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// One layer of a feature service
#[derive(Debug, Clone)]
pub struct FeatureLayerHandle {
    url: String,
    id: i64,
    name: String,
    layer_type: Option<String>,
    definition: ServiceDefinition,
    template: LayerTemplate,
    session: Option<Arc<Session>>,
}

impl FeatureLayerHandle {
    /// POST {serviceUrl}/{id} with f=json
    pub(crate) async fn read(
        portal: &Portal,
        service_url: &str,
        layer_ref: &LayerRef,
        session: Option<Arc<Session>>,
    ) -> Result<Self> {
        let url = format!("{}/{}", service_url.trim_end_matches('/'), layer_ref.id);
        let form = FormParams::format("json")
            .add_optional("token", session.as_deref().map(Session::token));

        let value = portal.post(&url, &form).await?;
        let value = check_response(value, ApiError::Remote)?;
        let definition = ServiceDefinition::from_value(value)?;

        let id = definition
            .get("id")
            .and_then(Value::as_i64)
            .unwrap_or(layer_ref.id);
        let name = definition
            .str_field("name")
            .map(str::to_string)
            .or_else(|| layer_ref.name.clone())
            .ok_or_else(|| {
                ApiError::MalformedResponse(format!("layer definition at {} has no name", url))
            })?;
        let layer_type = definition
            .str_field("type")
            .map(str::to_string)
            .or_else(|| layer_ref.layer_type.clone());
        let template = derive_layer_template(definition.as_map());

        tracing::debug!("Read layer {} ({}) from {}", id, name, url);

        Ok(Self {
            url,
            id,
            name,
            layer_type,
            definition,
            template,
            session,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Feature Layer` or `Table`
    pub fn layer_type(&self) -> Option<&str> {
        self.layer_type.as_deref()
    }

    pub fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    pub fn template(&self) -> &LayerTemplate {
        &self.template
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_deref()
    }
}

/// Layers confirmed on the target by `addToDefinition`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirroredLayer {
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MirrorReport {
    pub layers: Vec<MirroredLayer>,
}

#[derive(Debug, Deserialize)]
struct AddToDefinitionResponse {
    success: Option<bool>,
    layers: Option<Vec<AddedLayer>>,
}

#[derive(Debug, Deserialize)]
struct AddedLayer {
    id: Option<i64>,
    name: Option<String>,
}

/// Administrative `addToDefinition` endpoint for a hosted feature service.
///
/// `…/rest/services/{name}/FeatureServer` becomes
/// `…/rest/admin/services/{name}/FeatureServer/addToDefinition`. URLs without a
/// `/rest/services/` segment get `/addToDefinition` appended as they are.
pub fn admin_definition_url(service_url: &str) -> Result<String> {
    let mut url = url::Url::parse(service_url.trim_end_matches('/'))
        .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", service_url, e)))?;

    let path = url.path().trim_end_matches('/').to_string();
    let admin_path = match path.find("/rest/services/") {
        Some(idx) => format!(
            "{}/rest/admin/services/{}",
            &path[..idx],
            &path[idx + "/rest/services/".len()..]
        ),
        None => path,
    };
    url.set_path(&format!("{}/addToDefinition", admin_path));
    Ok(url.to_string())
}

/// Pair each source layer name with one unclaimed layer of the same name in the
/// target's response. Every source layer must be matched and every reported
/// layer must be accounted for.
fn confirm_layers(names: &[String], added: Vec<AddedLayer>) -> Result<MirrorReport> {
    let reported = added.len();
    let mut unclaimed: Vec<Option<MirroredLayer>> = added
        .into_iter()
        .map(|layer| {
            Some(MirroredLayer {
                id: layer.id,
                name: layer.name.unwrap_or_default(),
            })
        })
        .collect();

    let mut confirmed = Vec::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        let slot = unclaimed
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|layer| &layer.name == name));
        match slot.and_then(Option::take) {
            Some(layer) => confirmed.push(layer),
            None => missing.push(name.clone()),
        }
    }
    let unexpected: Vec<String> = unclaimed
        .into_iter()
        .flatten()
        .map(|layer| layer.name)
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        let mut message = format!(
            "target confirmed {} of {} layers",
            confirmed.len(),
            names.len()
        );
        if !unexpected.is_empty() {
            message.push_str(&format!(
                " and reported {} unknown layer(s) {:?} out of {}",
                unexpected.len(),
                unexpected,
                reported
            ));
        }
        return Err(ApiError::Mirror {
            message,
            unmirrored: missing,
        });
    }

    Ok(MirrorReport { layers: confirmed })
}

impl<'a> ServicesApi<'a> {
    /// Replay every source layer onto `target` in one `addToDefinition` request.
    ///
    /// Either all source layers are reported on the target or the call fails with
    /// [`ApiError::Mirror`] naming the layers that were not confirmed.
    pub async fn mirror_layers(
        &self,
        session: &Session,
        source: &FeatureServiceHandle,
        target: &FeatureServiceHandle,
    ) -> Result<MirrorReport> {
        let layers = source.layers();
        let names: Vec<String> = layers.iter().map(|l| l.name().to_string()).collect();

        let unresolved: Vec<String> = layers
            .iter()
            .filter(|layer| !layer.template().is_resolved())
            .map(|layer| {
                tracing::error!(
                    "Layer {} template is missing {:?}",
                    layer.name(),
                    layer.template().missing_fields()
                );
                layer.name().to_string()
            })
            .collect();
        if !unresolved.is_empty() {
            return Err(ApiError::Mirror {
                message: format!("{} layer template(s) are incomplete", unresolved.len()),
                unmirrored: unresolved,
            });
        }

        if layers.is_empty() {
            tracing::info!("No layers to mirror from {}", source.url());
            return Ok(MirrorReport::default());
        }

        let templates: Vec<&LayerTemplate> = layers.iter().map(|l| l.template()).collect();
        let url = admin_definition_url(target.url())?;
        let form = FormParams::new()
            .add_json("addToDefinition", &json!({ "layers": templates }))?
            .add("f", "json")
            .add("token", session.token());

        let value = self.portal.post(&url, &form).await?;
        let value = match check_response(value, ApiError::Remote) {
            Ok(value) => value,
            Err(ApiError::Remote(err)) => {
                return Err(ApiError::Mirror {
                    message: err.to_string(),
                    unmirrored: names,
                })
            }
            Err(other) => return Err(other),
        };

        let response: AddToDefinitionResponse = decode(value, "addToDefinition response")?;
        if response.success != Some(true) {
            return Err(ApiError::Mirror {
                message: "addToDefinition did not report success".to_string(),
                unmirrored: names,
            });
        }

        let report = match response.layers {
            Some(added) => confirm_layers(&names, added)?,
            None => MirrorReport {
                layers: layers
                    .iter()
                    .map(|layer| MirroredLayer {
                        id: Some(layer.id()),
                        name: layer.name().to_string(),
                    })
                    .collect(),
            },
        };

        tracing::info!(
            "Mirrored {} layer(s) from {} onto {}",
            report.layers.len(),
            source.url(),
            target.url()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::{create_test_portal, test_session};
    use mockito::{Matcher, Mock, Server, ServerGuard};

    const ADD_TO_DEFINITION: &str =
        "/org/arcgis/rest/admin/services/WaterCopy/FeatureServer/addToDefinition";

    #[test]
    fn admin_url_inserts_admin_segment() {
        let url = admin_definition_url(
            "https://services.arcgis.com/N4jtru9dctSQR53c/ArcGIS/rest/services/Storm%20Discharge%20Points/FeatureServer",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://services.arcgis.com/N4jtru9dctSQR53c/ArcGIS/rest/admin/services/Storm%20Discharge%20Points/FeatureServer/addToDefinition"
        );
    }

    #[test]
    fn admin_url_without_services_segment_appends_operation() {
        let url = admin_definition_url("http://localhost:1234/custom/FeatureServer/").unwrap();
        assert_eq!(url, "http://localhost:1234/custom/FeatureServer/addToDefinition");
    }

    #[test]
    fn admin_url_rejects_garbage() {
        assert!(matches!(
            admin_definition_url("not a url"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn layer_template_requires_name_type_and_fields() {
        let mut source = Map::new();
        source.insert("id".to_string(), json!(0));
        source.insert("name".to_string(), json!("Hydrants"));
        source.insert("type".to_string(), json!("Feature Layer"));
        source.insert("currentVersion".to_string(), json!(11.1));

        let template = derive_layer_template(&source);
        assert!(template.get("currentVersion").is_none());
        assert_eq!(template.missing_fields(), vec!["fields"]);
        assert!(!template.is_resolved());

        source.insert("fields".to_string(), json!([{"name": "OBJECTID"}]));
        assert!(derive_layer_template(&source).is_resolved());
    }

    async fn source_service(
        server: &mut ServerGuard,
        layers: &[(i64, &str, bool)],
    ) -> (String, Vec<Mock>) {
        let base = "/org/arcgis/rest/services/Water/FeatureServer";
        let entries: Vec<Value> = layers
            .iter()
            .map(|(id, name, _)| json!({"id": id, "name": name, "type": "Feature Layer"}))
            .collect();
        let mut mocks = vec![
            server
                .mock("POST", base)
                .with_body(json!({"name": "Water", "layers": entries}).to_string())
                .create_async()
                .await,
        ];
        for (id, name, with_fields) in layers {
            let mut def = json!({
                "id": id,
                "name": name,
                "type": "Feature Layer",
                "geometryType": "esriGeometryPoint"
            });
            if *with_fields {
                def["fields"] = json!([{"name": "OBJECTID", "type": "esriFieldTypeOID"}]);
            }
            let mock = server
                .mock("POST", format!("{}/{}", base, id).as_str())
                .with_body(def.to_string())
                .create_async()
                .await;
            mocks.push(mock);
        }
        (format!("{}{}", server.url(), base), mocks)
    }

    async fn target_service(server: &mut ServerGuard) -> (String, Mock) {
        let base = "/org/arcgis/rest/services/WaterCopy/FeatureServer";
        let mock = server
            .mock("POST", base)
            .with_body(r#"{"name":"WaterCopy","layers":[]}"#)
            .create_async()
            .await;
        (format!("{}{}", server.url(), base), mock)
    }

    #[tokio::test]
    async fn mirror_sends_all_layers_in_one_request() {
        let mut server = Server::new_async().await;
        let (source_url, _source_mocks) =
            source_service(&mut server, &[(0, "Hydrants", true), (1, "Mains", true)]).await;
        let (target_url, _target_mock) = target_service(&mut server).await;
        let add = server
            .mock("POST", ADD_TO_DEFINITION)
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("addToDefinition=".to_string()),
                Matcher::UrlEncoded("f".into(), "json".into()),
                Matcher::UrlEncoded("token".into(), "test-token".into()),
            ]))
            .with_body(
                r#"{"success":true,"layers":[{"name":"Hydrants","id":0},{"name":"Mains","id":1}]}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let portal = create_test_portal(&server.url());
        let session = test_session(&server.url());
        let services = portal.services();
        let source = services.open(&source_url, None, Some(&session)).await.unwrap();
        let target = services.open(&target_url, None, Some(&session)).await.unwrap();

        let report = services.mirror_layers(&session, &source, &target).await.unwrap();

        assert_eq!(report.layers.len(), 2);
        assert_eq!(report.layers[0].name, "Hydrants");
        assert_eq!(report.layers[1].id, Some(1));
        add.assert_async().await;
    }

    #[tokio::test]
    async fn mirror_refuses_unresolved_templates_before_any_request() {
        let mut server = Server::new_async().await;
        let (source_url, _source_mocks) =
            source_service(&mut server, &[(0, "Hydrants", true), (1, "Valves", false)]).await;
        let (target_url, _target_mock) = target_service(&mut server).await;
        let add = server
            .mock("POST", ADD_TO_DEFINITION)
            .expect(0)
            .create_async()
            .await;

        let portal = create_test_portal(&server.url());
        let session = test_session(&server.url());
        let services = portal.services();
        let source = services.open(&source_url, None, Some(&session)).await.unwrap();
        let target = services.open(&target_url, None, Some(&session)).await.unwrap();

        match services.mirror_layers(&session, &source, &target).await {
            Err(ApiError::Mirror { unmirrored, .. }) => assert_eq!(unmirrored, vec!["Valves"]),
            other => panic!("Expected Mirror error, got {:?}", other),
        }
        add.assert_async().await;
    }

    #[tokio::test]
    async fn mirror_reports_partial_target_as_failure() {
        let mut server = Server::new_async().await;
        let (source_url, _source_mocks) =
            source_service(&mut server, &[(0, "Hydrants", true), (1, "Mains", true)]).await;
        let (target_url, _target_mock) = target_service(&mut server).await;
        let _add = server
            .mock("POST", ADD_TO_DEFINITION)
            .with_body(r#"{"success":true,"layers":[{"name":"Hydrants","id":0}]}"#)
            .create_async()
            .await;

        let portal = create_test_portal(&server.url());
        let session = test_session(&server.url());
        let services = portal.services();
        let source = services.open(&source_url, None, Some(&session)).await.unwrap();
        let target = services.open(&target_url, None, Some(&session)).await.unwrap();

        match services.mirror_layers(&session, &source, &target).await {
            Err(ApiError::Mirror { unmirrored, message }) => {
                assert_eq!(unmirrored, vec!["Mains"]);
                assert!(message.contains("1 of 2"));
            }
            other => panic!("Expected Mirror error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn mirror_rejects_layers_the_source_never_sent() {
        let mut server = Server::new_async().await;
        let (source_url, _source_mocks) =
            source_service(&mut server, &[(0, "Points", true), (1, "Points", true)]).await;
        let (target_url, _target_mock) = target_service(&mut server).await;
        let _add = server
            .mock("POST", ADD_TO_DEFINITION)
            .with_body(
                r#"{"success":true,"layers":[{"name":"Points","id":0},{"name":"Unrelated","id":7}]}"#,
            )
            .create_async()
            .await;

        let portal = create_test_portal(&server.url());
        let session = test_session(&server.url());
        let services = portal.services();
        let source = services.open(&source_url, None, Some(&session)).await.unwrap();
        let target = services.open(&target_url, None, Some(&session)).await.unwrap();

        match services.mirror_layers(&session, &source, &target).await {
            Err(ApiError::Mirror {
                unmirrored,
                message,
            }) => {
                assert_eq!(unmirrored, vec!["Points"]);
                assert!(message.contains("1 of 2"));
                assert!(message.contains("Unrelated"));
            }
            other => panic!("Expected Mirror error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn mirror_confirms_duplicate_names_one_to_one() {
        let mut server = Server::new_async().await;
        let (source_url, _source_mocks) =
            source_service(&mut server, &[(0, "Points", true), (1, "Points", true)]).await;
        let (target_url, _target_mock) = target_service(&mut server).await;
        let _add = server
            .mock("POST", ADD_TO_DEFINITION)
            .with_body(
                r#"{"success":true,"layers":[{"name":"Points","id":0},{"name":"Points","id":1}]}"#,
            )
            .create_async()
            .await;

        let portal = create_test_portal(&server.url());
        let session = test_session(&server.url());
        let services = portal.services();
        let source = services.open(&source_url, None, Some(&session)).await.unwrap();
        let target = services.open(&target_url, None, Some(&session)).await.unwrap();

        let report = services.mirror_layers(&session, &source, &target).await.unwrap();
        let ids: Vec<Option<i64>> = report.layers.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![Some(0), Some(1)]);
    }

    #[tokio::test]
    async fn mirror_rejection_names_every_layer() {
        let mut server = Server::new_async().await;
        let (source_url, _source_mocks) =
            source_service(&mut server, &[(0, "Hydrants", true)]).await;
        let (target_url, _target_mock) = target_service(&mut server).await;
        let _add = server
            .mock("POST", ADD_TO_DEFINITION)
            .with_body(
                r#"{"error":{"code":500,"message":"Unable to add feature service definition.","details":[]}}"#,
            )
            .create_async()
            .await;

        let portal = create_test_portal(&server.url());
        let session = test_session(&server.url());
        let services = portal.services();
        let source = services.open(&source_url, None, Some(&session)).await.unwrap();
        let target = services.open(&target_url, None, Some(&session)).await.unwrap();

        match services.mirror_layers(&session, &source, &target).await {
            Err(ApiError::Mirror { unmirrored, message }) => {
                assert_eq!(unmirrored, vec!["Hydrants"]);
                assert!(message.contains("Unable to add"));
            }
            other => panic!("Expected Mirror error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn mirror_of_service_without_layers_is_a_no_op() {
        let mut server = Server::new_async().await;
        let (source_url, _source_mocks) = source_service(&mut server, &[]).await;
        let (target_url, _target_mock) = target_service(&mut server).await;

        let portal = create_test_portal(&server.url());
        let session = test_session(&server.url());
        let services = portal.services();
        let source = services.open(&source_url, None, Some(&session)).await.unwrap();
        let target = services.open(&target_url, None, Some(&session)).await.unwrap();

        let report = services.mirror_layers(&session, &source, &target).await.unwrap();
        assert!(report.layers.is_empty());
    }
}
