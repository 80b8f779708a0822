//! Process configuration
//!
//! Read once at startup from the environment, after loading a `.env` file
//! from the working directory when one exists:
//! - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` (required)
//! - `AWS_DEFAULT_REGION` / `AWS_REGION`
//! - `DEBUG`
//! - `S3_ENDPOINT_URL`, `S3_FORCE_PATH_STYLE` for S3-compatible services

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use crate::s3::S3ClientConfig;

const REQUIRED_VARS: &[&str] = &["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: Option<String>,
    pub debug: bool,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

/// `true`, `1` and `yes` in any case
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Whether `DEBUG` is set; usable before the full config is validated
pub fn debug_enabled() -> bool {
    env::var("DEBUG").map(|v| is_truthy(&v)).unwrap_or(false)
}

/// Load `.env` into the process environment. `Ok(None)` when there is no file.
pub fn load_dotenv() -> std::result::Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|name| get(*name).is_none())
            .collect();
        if !missing.is_empty() {
            bail!(
                "Missing required environment variables: {}. Set them in the environment or in a .env file.",
                missing.join(", ")
            );
        }

        let endpoint_url = get("S3_ENDPOINT_URL");
        if let Some(endpoint) = &endpoint_url {
            url::Url::parse(endpoint)
                .with_context(|| format!("Invalid S3_ENDPOINT_URL {:?}", endpoint))?;
        }

        Ok(Self {
            access_key_id: get("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: get("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            region: get("AWS_DEFAULT_REGION").or_else(|| get("AWS_REGION")),
            debug: get("DEBUG").map(|v| is_truthy(&v)).unwrap_or(false),
            endpoint_url,
            force_path_style: get("S3_FORCE_PATH_STYLE")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
        })
    }

    /// Settings for the AWS connector
    pub fn client_config(&self) -> S3ClientConfig {
        S3ClientConfig {
            endpoint_url: self.endpoint_url.clone(),
            force_path_style: self.force_path_style,
            region: self.region.clone(),
            access_key_id: Some(self.access_key_id.clone()),
            secret_access_key: Some(self.secret_access_key.clone()),
        }
    }

    /// Region for display; the SDK picks its own default when unset
    pub fn region_display(&self) -> &str {
        self.region
            .as_deref()
            .unwrap_or("Not specified (using default)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_config_minimal() {
        let config = Config::from_lookup(lookup(&[
            ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.access_key_id, "AKIDEXAMPLE");
        assert!(config.region.is_none());
        assert!(!config.debug);
        assert!(!config.force_path_style);
        assert_eq!(config.region_display(), "Not specified (using default)");
    }

    #[test]
    fn test_config_missing_credentials_names_all() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err().to_string();
        assert!(err.contains("AWS_ACCESS_KEY_ID"));
        assert!(err.contains("AWS_SECRET_ACCESS_KEY"));
    }

    #[test]
    fn test_config_empty_value_counts_as_missing() {
        let err = Config::from_lookup(lookup(&[
            ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
            ("AWS_SECRET_ACCESS_KEY", ""),
        ]))
        .unwrap_err()
        .to_string();
        assert!(err.contains("AWS_SECRET_ACCESS_KEY"));
        assert!(!err.contains("AWS_ACCESS_KEY_ID,"));
    }

    #[test]
    fn test_config_full() {
        let config = Config::from_lookup(lookup(&[
            ("AWS_ACCESS_KEY_ID", "minioadmin"),
            ("AWS_SECRET_ACCESS_KEY", "minioadmin"),
            ("AWS_REGION", "eu-central-1"),
            ("DEBUG", "Yes"),
            ("S3_ENDPOINT_URL", "http://localhost:9000"),
            ("S3_FORCE_PATH_STYLE", "1"),
        ]))
        .unwrap();

        assert_eq!(config.region.as_deref(), Some("eu-central-1"));
        assert!(config.debug);

        let client = config.client_config();
        assert_eq!(client.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert!(client.force_path_style);
        assert_eq!(client.access_key_id.as_deref(), Some("minioadmin"));
    }

    #[test]
    fn test_default_region_wins_over_region() {
        let config = Config::from_lookup(lookup(&[
            ("AWS_ACCESS_KEY_ID", "a"),
            ("AWS_SECRET_ACCESS_KEY", "b"),
            ("AWS_DEFAULT_REGION", "us-west-2"),
            ("AWS_REGION", "eu-central-1"),
        ]))
        .unwrap();
        assert_eq!(config.region.as_deref(), Some("us-west-2"));
    }

    #[test]
    fn test_config_rejects_bad_endpoint() {
        let result = Config::from_lookup(lookup(&[
            ("AWS_ACCESS_KEY_ID", "a"),
            ("AWS_SECRET_ACCESS_KEY", "b"),
            ("S3_ENDPOINT_URL", "not a url"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("true"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy(" yes "));
        assert!(is_truthy("1"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }
}
