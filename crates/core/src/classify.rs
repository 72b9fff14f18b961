//! Request model and pure classification.
//!
//! Every intercepted request is classified into exactly one of three
//! categories at dispatch time, from its declared destination, mode, and
//! URL path alone. Classification never touches shared state, so the
//! strategy choice for a request is a plain function of its metadata.

use url::Url;

/// What kind of resource the request declares it is for.
///
/// Mirrors the destination metadata a user agent attaches to a request
/// (`Sec-Fetch-Dest`). Anything we do not handle specially collapses
/// into [`Destination::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Image,
    Style,
    Script,
    Other,
}

impl Destination {
    /// Parse a destination token as sent in `Sec-Fetch-Dest`.
    pub fn from_token(token: &str) -> Self {
        match token {
            "document" => Destination::Document,
            "image" => Destination::Image,
            "style" => Destination::Style,
            "script" => Destination::Script,
            _ => Destination::Other,
        }
    }
}

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// A full-page load.
    Navigate,
    /// Any subresource or programmatic fetch.
    Other,
}

/// The identity and metadata of an intercepted request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Uppercase HTTP method.
    pub method: String,
    /// Absolute request URL.
    pub url: Url,
    pub destination: Destination,
    pub mode: RequestMode,
}

impl RequestInfo {
    /// Convenience constructor for a GET subresource request.
    pub fn get(url: Url) -> Self {
        Self { method: "GET".to_string(), url, destination: Destination::Other, mode: RequestMode::Other }
    }

    /// Convenience constructor for a full-page navigation.
    pub fn navigate(url: Url) -> Self {
        Self { method: "GET".to_string(), url, destination: Destination::Document, mode: RequestMode::Navigate }
    }

    /// Whether the request uses an http(s) scheme.
    ///
    /// Non-HTTP requests are ignored by the worker entirely.
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }
}

/// The strategy class a request falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Cache-first: images, styles, scripts, and the reserved static prefix.
    StaticAsset,
    /// Network-first with document fallback: full-page loads.
    Navigation,
    /// Network-first: everything else (API calls and the like).
    Dynamic,
}

/// Classify a request.
///
/// The static check runs before the navigation check, so a navigation
/// under `static_prefix` is served cache-first like any other asset.
pub fn classify(request: &RequestInfo, static_prefix: &str) -> RequestClass {
    let is_static_destination = matches!(
        request.destination,
        Destination::Image | Destination::Style | Destination::Script
    );

    if is_static_destination || request.url.path().starts_with(static_prefix) {
        RequestClass::StaticAsset
    } else if request.mode == RequestMode::Navigate {
        RequestClass::Navigation
    } else {
        RequestClass::Dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "/static/";

    fn req(path: &str, destination: Destination, mode: RequestMode) -> RequestInfo {
        let url = Url::parse(&format!("https://example.com{path}")).unwrap();
        RequestInfo { method: "GET".to_string(), url, destination, mode }
    }

    #[test]
    fn test_image_is_static() {
        let r = req("/pwa-192x192.png", Destination::Image, RequestMode::Other);
        assert_eq!(classify(&r, PREFIX), RequestClass::StaticAsset);
    }

    #[test]
    fn test_style_and_script_are_static() {
        let style = req("/assets/app.css", Destination::Style, RequestMode::Other);
        let script = req("/assets/app.js", Destination::Script, RequestMode::Other);
        assert_eq!(classify(&style, PREFIX), RequestClass::StaticAsset);
        assert_eq!(classify(&script, PREFIX), RequestClass::StaticAsset);
    }

    #[test]
    fn test_reserved_prefix_is_static() {
        let r = req("/static/logo.bin", Destination::Other, RequestMode::Other);
        assert_eq!(classify(&r, PREFIX), RequestClass::StaticAsset);
    }

    #[test]
    fn test_navigation() {
        let r = req("/dashboard", Destination::Document, RequestMode::Navigate);
        assert_eq!(classify(&r, PREFIX), RequestClass::Navigation);
    }

    #[test]
    fn test_static_wins_over_navigation() {
        let r = req("/static/page.html", Destination::Document, RequestMode::Navigate);
        assert_eq!(classify(&r, PREFIX), RequestClass::StaticAsset);
    }

    #[test]
    fn test_api_is_dynamic() {
        let r = req("/api/parking/spots", Destination::Other, RequestMode::Other);
        assert_eq!(classify(&r, PREFIX), RequestClass::Dynamic);
    }

    #[test]
    fn test_prefix_must_anchor_at_path_start() {
        let r = req("/api/static/thing", Destination::Other, RequestMode::Other);
        assert_eq!(classify(&r, PREFIX), RequestClass::Dynamic);
    }

    #[test]
    fn test_is_http() {
        let http = req("/", Destination::Other, RequestMode::Other);
        assert!(http.is_http());
        let ext = RequestInfo::get(Url::parse("chrome-extension://abc/def").unwrap());
        assert!(!ext.is_http());
    }

    #[test]
    fn test_destination_from_token() {
        assert_eq!(Destination::from_token("image"), Destination::Image);
        assert_eq!(Destination::from_token("document"), Destination::Document);
        assert_eq!(Destination::from_token("empty"), Destination::Other);
        assert_eq!(Destination::from_token("font"), Destination::Other);
    }
}
