/// CORS configuration error
///
/// Returned by [`CorsPolicy::from_definition`](super::CorsPolicy::from_definition)
/// when a listener's CORS settings are invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorsConfigError {
    /// Wildcard origin (`*`) cannot be used with credentials
    #[error(
        "CORS configuration error: Cannot use wildcard origin (*) with credentials. \
        When allowCredentials is true, you must specify exact origins."
    )]
    WildcardWithCredentials,
    /// An `allowOrigin` entry is neither `*`, an origin nor a valid pattern
    #[error("CORS configuration error: Invalid origin pattern '{origin}': {reason}")]
    InvalidOriginPattern { origin: String, reason: String },
    /// An `allowMethods` entry is not an HTTP method
    #[error("CORS configuration error: Invalid method '{method}'")]
    InvalidMethod { method: String },
}
