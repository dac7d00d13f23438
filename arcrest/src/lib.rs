//! Client for ArcGIS Online and Portal for ArcGIS
//!
//! Authenticates against a portal, searches its content, and mirrors hosted
//! feature services: a source service's definition is reduced to a
//! create-parameters template, a new service is provisioned from it and the
//! source layers are replayed onto the new service in one request.

pub mod api;
pub mod config;

pub use api::{ApiError, FeatureLayerHandle, FeatureServiceHandle, Portal, Result, Session};
pub use config::{ConfigError, PortalConfig};
