//! Content catalog: search, owned items and item lookups

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use super::client::Portal;
use super::common::{check_response, decode, null_as_default, FormParams};
use super::error::{ApiError, Result};
use super::session::Session;

/// A portal item as returned by search and content listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub owner: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub access: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub type_keywords: BTreeSet<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: BTreeSet<String>,
    pub url: Option<String>,
    pub spatial_reference: Option<Value>,
}

impl ContentItem {
    pub fn is_feature_service(&self) -> bool {
        self.item_type.as_deref() == Some("Feature Service")
    }
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub num: u32,
    pub sort_field: String,
    pub sort_order: String,
    pub start: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            num: 100,
            sort_field: "numviews".to_string(),
            sort_order: "desc".to_string(),
            start: 0,
        }
    }
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_num(mut self, num: u32) -> Self {
        self.num = num;
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: impl Into<String>) -> Self {
        self.sort_field = field.into();
        self.sort_order = order.into();
        self
    }

    pub fn with_start(mut self, start: u32) -> Self {
        self.start = start;
        self
    }

    fn to_form(&self, session: Option<&Session>) -> FormParams {
        FormParams::new()
            .add("q", &self.query)
            .add("num", self.num)
            .add("sortField", &self.sort_field)
            .add("sortOrder", &self.sort_order)
            .add("start", self.start)
            .add("f", "json")
            .add_optional("token", session.map(Session::token))
    }
}

/// One page of search results
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub results: Vec<ContentItem>,
    pub total: Option<u64>,
    pub start: Option<i64>,
    pub num: Option<i64>,
    pub next_start: Option<i64>,
}

impl SearchPage {
    /// Start offset for the following page; the portal reports -1 after the last one.
    pub fn next(&self) -> Option<u32> {
        self.next_start
            .filter(|n| *n > 0)
            .and_then(|n| u32::try_from(n).ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalInfo {
    pub id: String,
    pub name: Option<String>,
    pub url_key: Option<String>,
    pub custom_base_url: Option<String>,
    pub is_portal: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub title: Option<String>,
}

/// Items and folders in a user's root content folder
#[derive(Debug, Clone, Deserialize)]
pub struct UserContent {
    pub username: Option<String>,
    pub items: Vec<ContentItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub folders: Vec<Folder>,
}

/// Catalog API for search and item operations
pub struct CatalogApi<'a> {
    portal: &'a Portal,
}

impl<'a> CatalogApi<'a> {
    pub fn new(portal: &'a Portal) -> Self {
        Self { portal }
    }

    /// POST /sharing/rest/search
    pub async fn search_page(
        &self,
        params: &SearchParams,
        session: Option<&Session>,
    ) -> Result<SearchPage> {
        let url = self.portal.sharing_url("/search");
        let value = self.portal.post(&url, &params.to_form(session)).await?;
        let value = check_response(value, ApiError::Remote)?;
        let page: SearchPage = decode(value, "search response")?;
        tracing::debug!(
            "Search '{}' returned {} of {:?} results",
            params.query,
            page.results.len(),
            page.total
        );
        Ok(page)
    }

    /// Single page of results; an empty page is not an error.
    pub async fn search(
        &self,
        params: &SearchParams,
        session: Option<&Session>,
    ) -> Result<Vec<ContentItem>> {
        Ok(self.search_page(params, session).await?.results)
    }

    /// POST /sharing/rest/content/users/{username}
    pub async fn user_content(&self, session: &Session) -> Result<UserContent> {
        let url = self.portal.user_content_url(session.username());
        let form = FormParams::format("json").add("token", session.token());
        let value = self.portal.post(&url, &form).await?;
        let value = check_response(value, ApiError::Remote)?;
        decode(value, "user content")
    }

    pub async fn owned_content(&self, session: &Session) -> Result<Vec<ContentItem>> {
        Ok(self.user_content(session).await?.items)
    }

    /// POST /sharing/rest/portals/self
    pub async fn portal_info(&self, session: &Session) -> Result<PortalInfo> {
        let url = self.portal.sharing_url("/portals/self");
        let form = FormParams::format("json").add("token", session.token());
        let value = self.portal.post(&url, &form).await?;
        let value = check_response(value, ApiError::Remote)?;
        decode(value, "portal description")
    }

    /// POST /sharing/rest/content/items/{id}
    pub async fn item(&self, session: &Session, item_id: &str) -> Result<ContentItem> {
        let value = self.item_resource(session, item_id, "").await?;
        decode(value, "item description")
    }

    /// POST /sharing/rest/content/items/{id}/data
    pub async fn item_data(&self, session: &Session, item_id: &str) -> Result<Value> {
        self.item_resource(session, item_id, "/data").await
    }

    async fn item_resource(&self, session: &Session, item_id: &str, suffix: &str) -> Result<Value> {
        let url = self.portal.sharing_url(&format!(
            "/content/items/{}{}",
            urlencoding::encode(item_id),
            suffix
        ));
        let form = FormParams::format("json").add("token", session.token());
        let value = self.portal.post(&url, &form).await?;
        check_response(value, ApiError::Remote)
    }
}
