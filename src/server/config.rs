use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Search results per page when the request does not say.
    pub default_page_size: usize,
    /// Hard cap on requested page sizes.
    pub max_page_size: usize,
    /// Path to the frontend directory to be statically served.
    pub frontend_dir_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            default_page_size: 9,
            max_page_size: 50,
            frontend_dir_path: None,
        }
    }
}
