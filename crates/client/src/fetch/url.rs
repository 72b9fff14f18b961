//! Joining intercepted request paths onto the configured origin.

/// Error type for request URL construction failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("path must be absolute: {0}")]
    RelativePath(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Join an absolute path (with optional query) onto the origin.
///
/// The origin's scheme, host, and port are kept; the path and query are
/// taken wholly from the intercepted request.
pub fn join_origin(origin: &url::Url, path_and_query: &str) -> Result<url::Url, UrlError> {
    if !path_and_query.starts_with('/') {
        return Err(UrlError::RelativePath(path_and_query.to_string()));
    }

    origin
        .join(path_and_query)
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> url::Url {
        url::Url::parse("http://127.0.0.1:5173").unwrap()
    }

    #[test]
    fn test_join_root() {
        let url = join_origin(&origin(), "/").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5173/");
    }

    #[test]
    fn test_join_path_with_query() {
        let url = join_origin(&origin(), "/api/spots?zone=plateau").unwrap();
        assert_eq!(url.path(), "/api/spots");
        assert_eq!(url.query(), Some("zone=plateau"));
    }

    #[test]
    fn test_join_keeps_origin_authority() {
        let url = join_origin(&origin(), "/pwa-192x192.png").unwrap();
        assert_eq!(url.host_str(), Some("127.0.0.1"));
        assert_eq!(url.port(), Some(5173));
    }

    #[test]
    fn test_join_rejects_relative_path() {
        let result = join_origin(&origin(), "index.html");
        assert!(matches!(result, Err(UrlError::RelativePath(_))));
    }
}
