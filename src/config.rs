//! Configuration loader and validator for the price adjustment service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub shopify: Shopify,
    pub billing: Billing,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub bind_addr: String,
}

/// Shopify Admin API settings for the managed shop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shopify {
    pub shop: String,
    pub access_token: String,
    pub api_version: String,
    /// Public base URL of this app; billing confirmation redirects land here.
    pub app_url: String,
}

/// Default subscription plan offered to the shop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Billing {
    pub plan_name: String,
    pub price: String,
    pub currency: String,
    pub trial_days: Option<u32>,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// URL the billing system redirects back to after the merchant confirms.
    pub fn billing_return_url(&self) -> String {
        format!(
            "{}/billing/confirm",
            self.shopify.app_url.trim_end_matches('/')
        )
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }

    if cfg.shopify.shop.trim().is_empty() {
        return Err(ConfigError::Invalid("shopify.shop must be non-empty"));
    }
    if cfg.shopify.access_token.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "shopify.access_token must be non-empty",
        ));
    }
    if cfg.shopify.api_version.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "shopify.api_version must be non-empty",
        ));
    }
    if cfg.shopify.app_url.trim().is_empty() {
        return Err(ConfigError::Invalid("shopify.app_url must be non-empty"));
    }

    if cfg.billing.plan_name.trim().is_empty() {
        return Err(ConfigError::Invalid("billing.plan_name must be non-empty"));
    }
    if cfg.billing.price.trim().is_empty() {
        return Err(ConfigError::Invalid("billing.price must be non-empty"));
    }
    if cfg.billing.currency.trim().is_empty() {
        return Err(ConfigError::Invalid("billing.currency must be non-empty"));
    }

    Ok(())
}

/// Canonical example YAML used in docs and tests.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  bind_addr: "127.0.0.1:8080"

shopify:
  shop: "example.myshopify.com"
  access_token: "shpat_0000000000000000"
  api_version: "2024-07"
  app_url: "https://pricebot.example.com"

billing:
  plan_name: "Basic"
  price: "9.99"
  currency: "USD"
  trial_days: null
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_access_token() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.shopify.access_token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("access_token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_shop_and_app_url() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.shopify.shop = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("shopify.shop")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.shopify.app_url = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_billing_fields() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.billing.plan_name = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.billing.price = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.billing.currency = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn billing_return_url_strips_trailing_slash() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.shopify.app_url = "https://pricebot.example.com/".into();
        assert_eq!(
            cfg.billing_return_url(),
            "https://pricebot.example.com/billing/confirm"
        );
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.shopify.shop, "example.myshopify.com");
    }
}
