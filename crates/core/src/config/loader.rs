use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("MEDIARR_").split("_"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[server]
port = 9000
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_load_config_from_str_invalid_kind() {
        let toml = r#"
[[sources]]
id = "a"
name = "a"
kind = "gopher"
base_url = "http://a"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_quality_definitions_and_runtime() {
        let toml = r#"
[[quality_definitions]]
quality = "Bluray-1080p"
min_mb_per_minute = 20.0
max_mb_per_minute = 120.0

[[quality_definitions]]
quality = "Remux-2160p"
min_mb_per_minute = 100

[[wanted]]
id = "movie-1"
profile = "hd"
terms = "Movie Name"
runtime_minutes = 128
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.quality_definitions.len(), 2);
        assert_eq!(config.quality_definitions[0].max_mb_per_minute, Some(120.0));
        assert_eq!(config.quality_definitions[1].min_mb_per_minute, 100.0);
        assert_eq!(config.quality_definitions[1].max_mb_per_minute, None);
        assert_eq!(config.wanted[0].target().runtime_minutes, Some(128));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 3000

[orchestrator]
enabled = true
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert!(config.orchestrator.enabled);
    }
}
