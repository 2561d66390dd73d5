use super::RequestsLoggingLevel;

/// Runtime configuration of the HTTP surface, fixed at bootstrap.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Streamable-HTTP answers with a single JSON body instead of a stream.
    pub json_response: bool,
    /// Bearer check on inbound requests.
    pub require_auth: bool,
    /// Paths that are never auth-gated.
    pub auth_exclude_paths: Vec<String>,
    pub requests_logging_level: RequestsLoggingLevel,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3111,
            json_response: false,
            require_auth: false,
            auth_exclude_paths: vec!["/health".to_string()],
            requests_logging_level: RequestsLoggingLevel::default(),
        }
    }
}
