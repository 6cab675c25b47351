#[cfg(test)]
mod tests {
    use crate::config::*;
    use crate::error::Result;
    use crate::measure::{EnginePolicy, Target};
    use crate::storage::archive::DEFAULT_MAX_FILES;
    use crate::storage::store::DEFAULT_RETENTION_DAYS;
    use serial_test::serial;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.interval_secs, 120);
        assert!(config.servers.is_empty());
        assert_eq!(config.primary_command, "speedtest");
        assert_eq!(config.primary_timeout_secs, 300);
        assert!(config.use_primary);
        assert!(!config.require_primary);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_backoff_secs, 2);
        assert_eq!(config.main_retention_days, 30);
        assert_eq!(config.archive_retention_files, 12);
        assert_eq!(config.jitter_secs, 5);
        assert_eq!(config.main_retention_days, DEFAULT_RETENTION_DAYS);
        assert_eq!(config.archive_retention_files, DEFAULT_MAX_FILES);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str("interval_secs: 300\nservers: ['20013', '12345']\n").unwrap();
        assert_eq!(config.interval_secs, 300);
        assert_eq!(config.servers, vec!["20013", "12345"]);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.primary_command, "speedtest");
    }

    #[test]
    fn test_config_default_path() {
        let path = Config::default_path().unwrap();
        assert!(path.to_string_lossy().contains("netpulse"));
        assert!(path.to_string_lossy().ends_with("config.yaml"));
    }

    #[test]
    #[serial]
    fn test_config_load_missing() -> Result<()> {
        let config = Config::load(Some("/nonexistent/netpulse/config.yaml".into()))?;
        assert_eq!(config.interval_secs, 120);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_config_save_load() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("nested").join("config.yaml");

        let original = Config {
            data_dir: Some(PathBuf::from("/srv/netpulse")),
            servers: vec!["20013".to_string()],
            require_primary: true,
            ..Config::default()
        };
        original.save(config_path.clone())?;

        let loaded = Config::load(Some(config_path))?;
        assert_eq!(loaded.data_dir, Some(PathBuf::from("/srv/netpulse")));
        assert_eq!(loaded.servers, vec!["20013"]);
        assert!(loaded.require_primary);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_data_dir_env_override() -> Result<()> {
        let dir = TempDir::new()?;
        std::env::set_var(DATA_DIR_ENV, dir.path());
        let loaded = Config::load(Some("/nonexistent/netpulse/config.yaml".into()));
        std::env::remove_var(DATA_DIR_ENV);

        let config = loaded?;
        assert_eq!(config.data_dir(), dir.path());
        assert_eq!(config.main_path(), dir.path().join("speedtest_results.csv"));
        assert_eq!(config.archive_dir(), dir.path().join("archive"));
        Ok(())
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "interval_secs: [not a number]\n").unwrap();
        assert!(Config::load(Some(path)).is_err());
    }

    #[test]
    fn test_engine_policy_and_targets() {
        let mut config = Config::default();
        assert_eq!(config.engine_policy(), EnginePolicy::default());
        assert_eq!(config.targets().unwrap(), vec![Target::Best]);

        config.use_primary = false;
        config.servers = vec!["20013".to_string(), "x1".to_string()];
        assert!(!config.engine_policy().prefer_primary);
        assert!(config.targets().is_err());

        config.require_primary = true;
        assert!(!config.engine_policy().allow_fallback);
    }
}
