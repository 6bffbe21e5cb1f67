//! Runtime configuration.
//!
//! Settings are layered with the `config` crate: `config/default.yaml`
//! (optional), then the file named by `DISPATCH_CONFIG` (if set), then
//! environment variables such as `DISPATCH__CRON_SECRET` or
//! `DISPATCH__BATCH__SIZE`.

use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::delivery::batch_sender::BatchConfig;
use crate::errors::Error;

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_owned()
}

/// Upper bound for `page_size`. A page is claimed in one insert that binds
/// nine parameters per user, which must stay under SQLite's variable limit.
pub const MAX_PAGE_SIZE: i64 = 1_000;

fn default_page_size() -> i64 {
    500
}

fn default_implicit_tls() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Shared secret expected in `Authorization: Bearer <secret>` on cron routes.
    pub cron_secret: String,
    /// Public origin used to build unsubscribe and feedback links.
    pub base_url: String,
    pub unsubscribe_secret: String,
    pub sender: SenderSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderSettings {
    pub address: String,
    pub name: Option<String>,
    pub reply_to: Option<String>,
}

impl SenderSettings {
    /// `"Name <address>"` or the bare address.
    pub fn from_header(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => format!("{name} <{}>", self.address),
            _ => self.address.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderSettings {
    Http {
        api_url: String,
        api_key: String,
    },
    Smtp {
        host: String,
        port: u16,
        login: String,
        password: String,
        #[serde(default = "default_implicit_tls")]
        implicit_tls: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    pub size: usize,
    pub delay_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            size: 100,
            delay_ms: 1_000,
            max_retries: 3,
            retry_delay_ms: 2_000,
        }
    }
}

impl Settings {
    /// Loads settings from the default file, `DISPATCH_CONFIG` and the
    /// environment.
    pub fn load() -> Result<Self, Error> {
        let mut builder = config::Config::builder()
            .add_source(File::with_name("config/default").required(false));

        if let Ok(path) = std::env::var("DISPATCH_CONFIG") {
            builder = builder.add_source(File::with_name(&path));
        }

        let builder = builder.add_source(
            Environment::with_prefix("DISPATCH")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, Error> {
        let settings: Settings = builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.cron_secret.trim().is_empty() {
            return Err(Error::Config("cron_secret must not be empty".to_owned()));
        }
        if self.unsubscribe_secret.trim().is_empty() {
            return Err(Error::Config(
                "unsubscribe_secret must not be empty".to_owned(),
            ));
        }
        if self.batch.size == 0 {
            return Err(Error::Config("batch.size must be positive".to_owned()));
        }
        if self.page_size <= 0 {
            return Err(Error::Config("page_size must be positive".to_owned()));
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!("page_size must not exceed {MAX_PAGE_SIZE}")));
        }
        Ok(())
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch.size,
            batch_delay: Duration::from_millis(self.batch.delay_ms),
            max_retries: self.batch.max_retries,
            retry_delay: Duration::from_millis(self.batch.retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const YAML: &str = r#"
database_url: "dispatch.db"
cron_secret: "s3cret"
base_url: "https://news.example.com"
unsubscribe_secret: "unsub"
sender:
  address: "daily@example.com"
  name: "Daily Digest"
provider:
  kind: http
  api_url: "https://api.mail.example.com"
  api_key: "key"
batch:
  size: 50
  delay_ms: 200
  max_retries: 2
  retry_delay_ms: 100
"#;

    fn builder(yaml: &str) -> ConfigBuilder<DefaultState> {
        config::Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml))
    }

    #[test]
    fn loads_yaml_with_defaults() {
        let settings = Settings::from_builder(builder(YAML)).unwrap();
        assert_eq!(settings.bind_address, "0.0.0.0:8080");
        assert_eq!(settings.page_size, 500);
        assert_eq!(settings.batch.size, 50);
        assert_eq!(settings.sender.from_header(), "Daily Digest <daily@example.com>");
        assert!(matches!(settings.provider, ProviderSettings::Http { .. }));

        let batch = settings.batch_config();
        assert_eq!(batch.batch_delay, Duration::from_millis(200));
        assert_eq!(batch.max_retries, 2);
    }

    #[test]
    fn rejects_empty_cron_secret() {
        let yaml = YAML.replace("\"s3cret\"", "\"\"");
        let err = Settings::from_builder(builder(&yaml)).unwrap_err();
        assert!(err.to_string().contains("cron_secret"));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let yaml = YAML.replace("size: 50", "size: 0");
        assert!(Settings::from_builder(builder(&yaml)).is_err());
    }

    #[test]
    fn rejects_page_size_above_limit() {
        let yaml = format!("{YAML}page_size: 5000\n");
        let err = Settings::from_builder(builder(&yaml)).unwrap_err();
        assert!(err.to_string().contains("page_size"));

        let yaml = format!("{YAML}page_size: {MAX_PAGE_SIZE}\n");
        let settings = Settings::from_builder(builder(&yaml)).unwrap();
        assert_eq!(settings.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn smtp_provider_defaults_to_implicit_tls() {
        let yaml = YAML.replace(
            "  kind: http\n  api_url: \"https://api.mail.example.com\"\n  api_key: \"key\"",
            "  kind: smtp\n  host: \"smtp.example.com\"\n  port: 465\n  login: \"u\"\n  password: \"p\"",
        );
        let settings = Settings::from_builder(builder(&yaml)).unwrap();
        match settings.provider {
            ProviderSettings::Smtp {
                port, implicit_tls, ..
            } => {
                assert_eq!(port, 465);
                assert!(implicit_tls);
            }
            other => panic!("unexpected provider {other:?}"),
        }
    }
}
