use crate::error::{PipeError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Files probed by [`Config::load`], first match wins.
pub const CONFIG_PATHS: [&str; 2] = ["./tspipe.toml", "./config.toml"];

/// Default number of bytes `file_reader` emits per unit.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1 << 10;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log filter directive used when `RUST_LOG` is not set
    pub log_level: String,
    /// Bytes read per unit by `file_reader`
    pub read_chunk_size: usize,
    /// Default output directory of the `vbv` cell
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: String::from("info"),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            output_dir: None,
        }
    }
}

impl Config {
    /// Defaults, then the first config file found, then `TSPIPE_*` variables.
    pub fn load() -> Result<Self> {
        match CONFIG_PATHS.iter().find(|path| Path::new(path).exists()) {
            Some(path) => Config::from_file(path),
            None => Config::default().with_env(),
        }
    }

    /// Loads an explicit file; environment overrides still apply.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Config::from_toml(&content)?.with_env()
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| PipeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the `TSPIPE_*` overrides on top of `self`.
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(level) = env::var("TSPIPE_LOG") {
            self.log_level = level;
        }
        if let Ok(size) = env::var("TSPIPE_CHUNK_SIZE") {
            self.read_chunk_size = size.trim().parse()?;
        }
        if let Ok(dir) = env::var("TSPIPE_OUTPUT_DIR") {
            if !dir.is_empty() {
                self.output_dir = Some(PathBuf::from(dir));
            }
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.read_chunk_size == 0 {
            return Err(PipeError::Config("read_chunk_size must be positive".into()));
        }
        Ok(())
    }
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# tspipe configuration
# Log filter used when RUST_LOG is not set
log_level = "info"

# Bytes read per unit by file_reader
read_chunk_size = 1024

# Default output directory of the vbv cell (console when unset)
# output_dir = "./vbv_out"
"#;
        fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml("read_chunk_size = 1316\n").unwrap();
        assert_eq!(config.read_chunk_size, 1316);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.output_dir, None);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(matches!(
            Config::from_toml("read_chunk_size = 0"),
            Err(PipeError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tspipe.toml");
        fs::write(&path, "read_chunk_size = 1316\nlog_level = \"debug\"\n").unwrap();

        env::set_var("TSPIPE_CHUNK_SIZE", "188");
        let from_file = Config::from_file(&path);
        let from_defaults = Config::default().with_env();
        env::remove_var("TSPIPE_CHUNK_SIZE");

        let config = from_file.unwrap();
        assert_eq!(config.read_chunk_size, 188);
        assert_eq!(config.log_level, "debug");
        assert_eq!(from_defaults.unwrap().read_chunk_size, 188);
    }

    #[test]
    fn test_template_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tspipe.toml");
        create_default_config_template(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let config = Config::from_toml(&content).unwrap();
        assert_eq!(config.read_chunk_size, DEFAULT_READ_CHUNK_SIZE);
    }
}
