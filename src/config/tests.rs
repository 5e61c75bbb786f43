use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let original_config = Config {
            redis: RedisConfig {
                host: "redis-stack".to_string(),
                port: 6380,
                password: Some("secret".to_string()),
                command_timeout_ms: Some(2_000),
                ..RedisConfig::default()
            },
            index: IndexConfig {
                vector_dimension: 768,
                ..IndexConfig::default()
            },
            ..Config::default()
        };

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn config_directory_creation() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config = Config {
            base_dir: temp_dir.path().join(".redis-rag"),
            ..Config::default()
        };

        assert!(!config.get_base_dir().exists());

        config.save().expect("should save config successfully");

        assert!(config.get_base_dir().is_dir());
        assert!(config.config_file_path().is_file());
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [redis
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        let invalid_toml = r#"
            [redis]
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn config_dir_ends_with_app_name() {
        if let Ok(dir) = get_config_dir() {
            let name = dir
                .file_name()
                .and_then(|n| n.to_str())
                .expect("should have a file name");
            assert!(name.contains("redis-rag"));
        }
    }
}
