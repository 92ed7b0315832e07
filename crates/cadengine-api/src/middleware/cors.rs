//! CORS layer configuration.

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, Any, CorsLayer};

use cadengine_core::config::CorsConfig;

/// Response headers browsers may read from a conversion response.
const EXPOSED_HEADERS: [&str; 4] = [
    "x-original-filename",
    "x-conversion-engine",
    "x-file-size",
    "x-mesh-quality",
];

/// Builds a CORS tower layer from configuration.
///
/// A `*` origin allows any origin without credentials; an explicit list
/// allows credentials and mirrors requested headers.
pub fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .expose_headers(EXPOSED_HEADERS.map(HeaderName::from_static))
        .max_age(Duration::from_secs(config.max_age_seconds));

    if config.allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any).allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer
        .allow_origin(origins)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
