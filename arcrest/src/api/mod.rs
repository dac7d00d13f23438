pub mod client;
pub mod common;
pub mod content;
pub mod error;
pub mod export;
pub mod features;
pub mod layer;
pub mod service;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use client::Portal;
pub use common::{FormParams, RemoteError};
pub use content::{
    CatalogApi, ContentItem, Folder, PortalInfo, SearchPage, SearchParams, UserContent,
};
pub use error::{ApiError, Result};
pub use features::{
    AddResult, DeleteResult, EditResult, FeatureRecord, FeatureSet, FeaturesApi, QueryParams,
    DEFAULT_DELETE_WHERE,
};
pub use layer::{
    admin_definition_url, derive_layer_template, FeatureLayerHandle, LayerTemplate, MirrorReport,
    MirroredLayer,
};
pub use service::{
    derive_create_parameters, CreateParametersTemplate, FeatureServiceHandle, LayerRef,
    ServiceDefinition, ServicesApi, CREATE_PARAMETER_FIELDS,
};
pub use session::{Session, DEFAULT_TOKEN_EXPIRATION_MINUTES};
pub use transport::{HttpTransport, Transport, TransportConfig};
