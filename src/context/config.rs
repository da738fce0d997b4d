/// Service-wide dispatch configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Whether access control is enforced for this deployment.
    pub auth_enabled: bool,

    /// Whether test-only commands may be registered.
    pub test_commands_enabled: bool,

    /// Whether multi-document transactions may touch the config database.
    pub allow_transactions_on_config_db: bool,
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self {
            auth_enabled: true,
            test_commands_enabled: false,
            allow_transactions_on_config_db: false,
        }
    }

    pub fn auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    pub fn test_commands_enabled(mut self, enabled: bool) -> Self {
        self.test_commands_enabled = enabled;
        self
    }

    pub fn allow_transactions_on_config_db(mut self, allow: bool) -> Self {
        self.allow_transactions_on_config_db = allow;
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert!(config.auth_enabled);
        assert!(!config.test_commands_enabled);
        assert!(!config.allow_transactions_on_config_db);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ServiceConfig::new()
            .auth_enabled(false)
            .test_commands_enabled(true);
        assert!(!config.auth_enabled);
        assert!(config.test_commands_enabled);
    }
}
