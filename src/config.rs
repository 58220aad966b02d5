//! Configuration management for the OmniPage server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub staging: StagingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted request body in bytes
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub company: String,
    pub product: String,
    pub license_file: String,
    pub oem_code: String,
    /// Recognition language applied before plain-text OCR
    pub language: String,
    /// Output code page applied before plain-text OCR
    pub code_page: String,
    /// Number of engine handles; 1 serializes all OCR work
    pub pool_size: usize,
    /// Upper bound for one orchestration (all pages of a document)
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StagingConfig {
    pub tmp_dir: PathBuf,
    pub prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                max_upload_bytes: 100 * 1024 * 1024,
            },
            engine: EngineConfig {
                company: String::new(),
                product: String::new(),
                license_file: String::new(),
                oem_code: String::new(),
                language: "pt-BR".to_string(),
                code_page: "UTF-8".to_string(),
                pool_size: 1,
                call_timeout_secs: 300,
            },
            staging: StagingConfig {
                tmp_dir: env::temp_dir(),
                prefix: "omnipage".to_string(),
            },
        }
    }
}

impl Config {
    /// Load the full configuration; the four `OMNIPAGE_*` license variables are required
    pub fn from_env() -> Result<Self, env::VarError> {
        let mut config = Self::from_env_optional();

        config.engine.company = env::var("OMNIPAGE_COMPANY")?;
        config.engine.product = env::var("OMNIPAGE_PRODUCT")?;
        config.engine.license_file = env::var("OMNIPAGE_LICENSE_FILE")?;
        config.engine.oem_code = env::var("OMNIPAGE_OEM_CODE")?;

        Ok(config)
    }

    /// Every setting that has a default, read from the environment
    ///
    /// The license fields stay empty.
    pub fn from_env_optional() -> Self {
        let defaults = Config::default();

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port),
                max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.server.max_upload_bytes),
            },
            engine: EngineConfig {
                language: env::var("OCR_LANGUAGE").unwrap_or(defaults.engine.language),
                code_page: env::var("OCR_CODE_PAGE").unwrap_or(defaults.engine.code_page),
                pool_size: parse_var("ENGINE_POOL_SIZE", defaults.engine.pool_size).max(1),
                call_timeout_secs: parse_var("ENGINE_CALL_TIMEOUT_SECS", defaults.engine.call_timeout_secs),
                ..defaults.engine
            },
            staging: StagingConfig {
                tmp_dir: env::var("OCR_TMP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.staging.tmp_dir),
                prefix: env::var("OCR_TMP_PREFIX").unwrap_or(defaults.staging.prefix),
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
