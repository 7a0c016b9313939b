//! Startup configuration.
//!
//! A TOML file supplies the base settings; `DEEPMARK_*` environment
//! variables override individual values. Everything is read once at
//! startup and nothing is hot-reloaded. The master key is mandatory and
//! malformed keys fail the load, not the first request.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::keyvault::MasterKey;
use crate::watermark::WatermarkParams;
use crate::{fingerprint, watermark};

const DEFAULT_DB_PATH: &str = "deepmark.db";
const DEFAULT_BLOB_ROOT: &str = "blobs";
const DEFAULT_FACE_BACKEND: &str = "auto";

fn config_string(value: Option<String>, default: &str) -> String {
    value.unwrap_or_else(|| default.to_string())
}

fn config_usize(value: Option<usize>, default: usize) -> usize {
    value.unwrap_or(default)
}

#[derive(Debug, Deserialize, Default)]
struct DeepmarkConfigFile {
    master_key: Option<String>,
    db_path: Option<String>,
    blob_root: Option<String>,
    fingerprint: Option<FingerprintConfigFile>,
    watermark: Option<WatermarkConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct FingerprintConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    stride: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct WatermarkConfigFile {
    stride: Option<usize>,
    alpha: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DeepmarkConfig {
    master_key_hex: String,
    pub db_path: String,
    pub blob_root: String,
    pub face_backend: String,
    pub face_model_path: Option<PathBuf>,
    pub fingerprint_stride: usize,
    pub watermark: WatermarkParams,
}

impl DeepmarkConfig {
    /// Load from an optional TOML file plus `DEEPMARK_*` env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file: DeepmarkConfigFile = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parse config file {}", path.display()))?
            }
            None => DeepmarkConfigFile::default(),
        };

        let fingerprint_file = file.fingerprint.unwrap_or_default();
        let watermark_file = file.watermark.unwrap_or_default();

        let master_key_hex = env_string("DEEPMARK_MASTER_KEY")
            .or(file.master_key)
            .ok_or_else(|| anyhow!("master key is required (DEEPMARK_MASTER_KEY or master_key)"))?;
        // fail fast on malformed keys
        MasterKey::from_hex(&master_key_hex)?;

        let config = Self {
            master_key_hex,
            db_path: config_string(
                env_string("DEEPMARK_DB_PATH").or(file.db_path),
                DEFAULT_DB_PATH,
            ),
            blob_root: config_string(
                env_string("DEEPMARK_BLOB_ROOT").or(file.blob_root),
                DEFAULT_BLOB_ROOT,
            ),
            face_backend: config_string(
                env_string("DEEPMARK_FACE_BACKEND").or(fingerprint_file.backend),
                DEFAULT_FACE_BACKEND,
            ),
            face_model_path: fingerprint_file.model_path,
            fingerprint_stride: config_usize(
                env_parse("DEEPMARK_FINGERPRINT_STRIDE")?.or(fingerprint_file.stride),
                fingerprint::DEFAULT_STRIDE,
            ),
            watermark: WatermarkParams {
                stride: config_usize(
                    env_parse("DEEPMARK_WATERMARK_STRIDE")?.or(watermark_file.stride),
                    watermark::DEFAULT_STRIDE,
                ),
                alpha: env_parse("DEEPMARK_WATERMARK_ALPHA")?
                    .or(watermark_file.alpha)
                    .unwrap_or(watermark::DEFAULT_ALPHA),
            },
        };

        if config.fingerprint_stride == 0 || config.watermark.stride == 0 {
            return Err(anyhow!("sampling strides must be at least 1"));
        }
        if !(config.watermark.alpha > 0.0) {
            return Err(anyhow!("watermark alpha must be positive"));
        }
        Ok(config)
    }

    pub fn master_key(&self) -> Result<MasterKey> {
        MasterKey::from_hex(&self.master_key_hex)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("{} is not a valid value", key)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "DEEPMARK_MASTER_KEY",
            "DEEPMARK_DB_PATH",
            "DEEPMARK_BLOB_ROOT",
            "DEEPMARK_FACE_BACKEND",
            "DEEPMARK_FINGERPRINT_STRIDE",
            "DEEPMARK_WATERMARK_STRIDE",
            "DEEPMARK_WATERMARK_ALPHA",
        ] {
            std::env::remove_var(key);
        }
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp config");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn loads_file_with_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let file = write_config(&format!("master_key = \"{}\"\n", "ab".repeat(32)));
        let config = DeepmarkConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.db_path, "deepmark.db");
        assert_eq!(config.blob_root, "blobs");
        assert_eq!(config.face_backend, "auto");
        assert_eq!(config.fingerprint_stride, 5);
        assert_eq!(config.watermark.stride, 15);
        assert_eq!(config.watermark.alpha, 1.0);
        assert!(config.master_key().is_ok());
    }

    #[test]
    fn file_sections_and_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let file = write_config(&format!(
            r#"
            master_key = "{}"
            db_path = "prod.db"

            [fingerprint]
            backend = "stub"
            stride = 3

            [watermark]
            stride = 10
            alpha = 0.5
            "#,
            "cd".repeat(32)
        ));
        std::env::set_var("DEEPMARK_DB_PATH", "env.db");
        std::env::set_var("DEEPMARK_WATERMARK_STRIDE", "20");

        let config = DeepmarkConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.db_path, "env.db");
        assert_eq!(config.face_backend, "stub");
        assert_eq!(config.fingerprint_stride, 3);
        assert_eq!(config.watermark.stride, 20);
        assert_eq!(config.watermark.alpha, 0.5);

        clear_env();
    }

    #[test]
    fn missing_master_key_fails_fast() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let file = write_config("db_path = \"x.db\"\n");
        assert!(DeepmarkConfig::load(Some(file.path())).is_err());
        assert!(DeepmarkConfig::load(None).is_err());
    }

    #[test]
    fn malformed_master_key_fails_fast() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let file = write_config("master_key = \"not-hex\"\n");
        assert!(DeepmarkConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn zero_strides_are_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let file = write_config(&format!(
            "master_key = \"{}\"\n\n[watermark]\nstride = 0\n",
            "ab".repeat(32)
        ));
        assert!(DeepmarkConfig::load(Some(file.path())).is_err());
    }
}
