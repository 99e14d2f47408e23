use super::RequestsLoggingLevel;
use crate::config::Environment;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub environment: Environment,
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            environment: Environment::Local,
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
        }
    }
}
