//! Test helpers for the ArcGIS REST API

#[cfg(test)]
pub fn create_test_portal(url: &str) -> super::Portal {
    super::Portal::new(url, true).unwrap()
}

#[cfg(test)]
pub fn test_session(url: &str) -> super::Session {
    super::Session::from_token(
        url,
        "tester",
        "test-token",
        chrono::Utc::now() + chrono::Duration::hours(1),
    )
}

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_api_error_formatting() {
        let error = ApiError::Provision(RemoteError {
            code: Some(400),
            message: "bad name".to_string(),
            details: vec!["Service name already exists.".to_string()],
        });

        let error_str = error.to_string();
        assert!(error_str.contains("[400]"));
        assert!(error_str.contains("bad name"));
        assert!(error_str.contains("Service name already exists."));
        assert_eq!(error.remote().and_then(|e| e.code), Some(400));
    }

    #[test]
    fn test_mirror_error_names_layers() {
        let error = ApiError::Mirror {
            message: "2 layer templates are incomplete".to_string(),
            unmirrored: vec!["Hydrants".to_string(), "Valves".to_string()],
        };

        let error_str = error.to_string();
        assert!(error_str.contains("Hydrants"));
        assert!(error_str.contains("Valves"));
        assert!(error.remote().is_none());
        assert!(!error.is_transport());
    }

    #[test]
    fn test_session_helper_is_valid() {
        let session = super::test_session("https://www.arcgis.com");
        assert!(!session.is_expired());
        assert_eq!(session.token(), "test-token");
    }
}
