//! Pure URL rewriting: direct backend URLs become proxy-safe equivalents.

use crate::core::config::ProxyConfig;
use url::Url;

/// Rewrites direct backend and object-storage URLs to local proxy paths.
#[derive(Debug, Clone, Default)]
pub struct ServiceUrlResolver {
    config: ProxyConfig,
}

impl ServiceUrlResolver {
    pub fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Rewrites a recognized backend prefix or object-storage host to its
    /// proxy path. Unrecognized URLs come back unchanged.
    pub fn to_proxy_url(&self, url: &str) -> String {
        if let Some(rule) = self
            .config
            .rules
            .iter()
            .find(|rule| !rule.backend_prefix.is_empty() && url.starts_with(&rule.backend_prefix))
        {
            return format!("{}{}", rule.proxy_prefix, &url[rule.backend_prefix.len()..]);
        }

        self.to_object_store_proxy(url)
            .unwrap_or_else(|| url.to_string())
    }

    fn to_object_store_proxy(&self, url: &str) -> Option<String> {
        if !self
            .config
            .object_store_hosts
            .iter()
            .any(|host| url.contains(host.as_str()))
        {
            return None;
        }

        let parsed = Url::parse(url).ok()?;
        let path = parsed.path().trim_start_matches('/');
        if path.is_empty() {
            return None;
        }
        let query = parsed.query().map(|q| format!("?{}", q)).unwrap_or_default();
        Some(format!(
            "{}/{}{}",
            self.config.object_store_proxy_path.trim_end_matches('/'),
            path,
            query
        ))
    }

    /// Whether `url` was produced by the object-storage rewrite.
    pub fn is_object_store_proxy(&self, url: &str) -> bool {
        !self.config.object_store_proxy_path.is_empty()
            && url.starts_with(&format!(
                "{}/",
                self.config.object_store_proxy_path.trim_end_matches('/')
            ))
    }

    /// Proxied endpoint for map requests against a vector layer's service URL.
    /// URLs without a `/wms` segment get their last path segment replaced by `wms`.
    pub fn to_wms_endpoint(&self, url: &str) -> String {
        let proxied = self.to_proxy_url(url);
        if proxied.contains("/wms") {
            return proxied;
        }
        match proxied.rfind('/') {
            Some(index) => format!("{}/wms", &proxied[..index]),
            None => proxied,
        }
    }
}

/// Splits a `layers` query parameter off a service URL.
///
/// `/geoserver/ws/wms?service=WMS&layers=ws:images` becomes
/// `("/geoserver/ws/wms", Some("ws:images"))`. Other query parameters are dropped.
pub fn split_layers_param(url: &str) -> (String, Option<String>) {
    let Some((base, query)) = url.split_once('?') else {
        return (url.to_string(), None);
    };
    let layers = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key.eq_ignore_ascii_case("layers"))
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty());
    (base.to_string(), layers)
}

/// Appends URL-encoded query pairs, respecting an existing query string.
pub fn append_query<'a, I>(base: &str, pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    let query = serializer.finish();
    if query.is_empty() {
        return base.to_string();
    }
    let separator = if !base.contains('?') {
        "?"
    } else if base.ends_with('?') || base.ends_with('&') {
        ""
    } else {
        "&"
    };
    format!("{}{}{}", base, separator, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_prefix_is_stripped() {
        let resolver = ServiceUrlResolver::default();
        assert_eq!(
            resolver.to_proxy_url("http://192.168.29.247:8080/geoserver/ws/wms"),
            "/geoserver/ws/wms"
        );
        assert_eq!(
            resolver.to_proxy_url("http://192.168.29.246:8080/geoserver/ws/wms?layers=a"),
            "/geoserver/ws/wms?layers=a"
        );
    }

    #[test]
    fn test_object_storage_keeps_signature() {
        let resolver = ServiceUrlResolver::default();
        let proxied = resolver
            .to_proxy_url("https://kampas.s3.amazonaws.com/projects/7/img.jpg?X-Amz-Signature=abc");
        assert_eq!(proxied, "/s3-proxy/projects/7/img.jpg?X-Amz-Signature=abc");
        assert!(resolver.is_object_store_proxy(&proxied));
    }

    #[test]
    fn test_unknown_urls_are_unchanged() {
        let resolver = ServiceUrlResolver::default();
        assert_eq!(
            resolver.to_proxy_url("https://tiles.example.com/wms"),
            "https://tiles.example.com/wms"
        );
        assert_eq!(resolver.to_proxy_url(""), "");
        assert_eq!(
            ServiceUrlResolver::new(ProxyConfig::passthrough())
                .to_proxy_url("http://192.168.29.247:8080/geoserver/wms"),
            "http://192.168.29.247:8080/geoserver/wms"
        );
    }

    #[test]
    fn test_wms_endpoint_normalization() {
        let resolver = ServiceUrlResolver::default();
        assert_eq!(
            resolver.to_wms_endpoint("http://192.168.29.247:8080/geoserver/ws/ows"),
            "/geoserver/ws/wms"
        );
        assert_eq!(
            resolver.to_wms_endpoint("http://192.168.29.247:8080/geoserver/ws/wms"),
            "/geoserver/ws/wms"
        );
    }

    #[test]
    fn test_split_layers_param() {
        assert_eq!(
            split_layers_param("/geoserver/ws/wms?service=WMS&layers=ws%3Aimages"),
            ("/geoserver/ws/wms".to_string(), Some("ws:images".to_string()))
        );
        assert_eq!(
            split_layers_param("/geoserver/ws/wms"),
            ("/geoserver/ws/wms".to_string(), None)
        );
    }

    #[test]
    fn test_append_query() {
        assert_eq!(
            append_query("/wms", [("SERVICE", "WMS"), ("LAYERS", "ws:a b")]),
            "/wms?SERVICE=WMS&LAYERS=ws%3Aa+b"
        );
        assert_eq!(append_query("/wms?map=x", [("A", "1")]), "/wms?map=x&A=1");
        assert_eq!(append_query("/wms", std::iter::empty()), "/wms");
    }
}
