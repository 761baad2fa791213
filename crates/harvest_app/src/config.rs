//! RON configuration for a harvest run.
//!
//! Relative paths are resolved against the working directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use harvest_core::CycleSettings;
use harvest_engine::{CommandDelegate, FeedSettings, HarvestSettings, POST_ID_PLACEHOLDER};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarvestConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
    #[serde(default = "default_items_per_cycle")]
    pub items_per_cycle: usize,
    #[serde(default = "default_max_session_secs")]
    pub max_session_secs: u64,
    pub locality: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    #[serde(default = "default_share_url_template")]
    pub share_url_template: String,
    #[serde(default)]
    pub operator: Option<String>,
    pub feed: FeedConfig,
    #[serde(default)]
    pub delegate: DelegateConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    pub base_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelegateConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        let wget = CommandDelegate::wget();
        Self {
            program: wget.program,
            args: wget.args,
            working_dir: wget.working_dir,
        }
    }
}

fn default_poll_interval_secs() -> f64 {
    120.0
}

fn default_items_per_cycle() -> usize {
    60
}

fn default_max_session_secs() -> u64 {
    24 * 60 * 60
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

fn default_share_url_template() -> String {
    format!("https://share.jodel.com/post?postId={POST_ID_PLACEHOLDER}")
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_response_bytes() -> u64 {
    5 * 1024 * 1024
}

impl HarvestConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = ron::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Duration::try_from_secs_f64(self.poll_interval_secs).is_err() {
            return Err(invalid(format!(
                "poll_interval_secs must be a non-negative number of seconds, got {}",
                self.poll_interval_secs
            )));
        }
        if self.items_per_cycle == 0 {
            return Err(invalid("items_per_cycle must be at least 1"));
        }
        if self.locality.trim().is_empty() {
            return Err(invalid("locality must not be empty"));
        }
        let single_line = [
            Some(("locality", &self.locality)),
            self.operator.as_ref().map(|op| ("operator", op)),
        ];
        for (name, value) in single_line.into_iter().flatten() {
            if value.contains(['\r', '\n']) {
                return Err(invalid(format!("{name} must be a single line")));
            }
        }
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude)
        {
            return Err(invalid(format!(
                "coordinates out of range: {}, {}",
                self.latitude, self.longitude
            )));
        }
        if !self.share_url_template.contains(POST_ID_PLACEHOLDER) {
            return Err(invalid(format!(
                "share_url_template must contain {POST_ID_PLACEHOLDER}"
            )));
        }
        if self.feed.base_url.trim().is_empty() {
            return Err(invalid("feed.base_url must not be empty"));
        }
        if self.delegate.program.trim().is_empty() {
            return Err(invalid("delegate.program must not be empty"));
        }
        Ok(())
    }

    /// An interval that `validate` would reject falls back to the default.
    pub fn harvest_settings(&self) -> HarvestSettings {
        HarvestSettings {
            cycle: CycleSettings {
                item_limit: self.items_per_cycle,
                max_session: Duration::from_secs(self.max_session_secs),
            },
            poll_interval: Duration::try_from_secs_f64(self.poll_interval_secs)
                .unwrap_or_else(|_| Duration::from_secs_f64(default_poll_interval_secs())),
            output_dir: self.output_dir.clone(),
            media_dir: self.media_dir.clone(),
            locality: self.locality.trim().to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            share_url_template: self.share_url_template.clone(),
            operator: self.operator.clone(),
        }
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            access_token: self.feed.access_token.clone(),
            connect_timeout: Duration::from_secs(self.feed.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.feed.request_timeout_secs),
            max_bytes: self.feed.max_response_bytes,
            ..FeedSettings::new(self.feed.base_url.trim())
        }
    }

    pub fn command_delegate(&self) -> CommandDelegate {
        CommandDelegate {
            program: self.delegate.program.clone(),
            args: self.delegate.args.clone(),
            working_dir: self.delegate.working_dir.clone(),
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"(
        locality: "Aarhus",
        latitude: 56.15,
        longitude: 10.216667,
        feed: (base_url: "https://api.example/v3"),
    )"#;

    fn parse(text: &str) -> HarvestConfig {
        ron::from_str(text).unwrap()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse(MINIMAL);
        config.validate().unwrap();

        let settings = config.harvest_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(120));
        assert_eq!(settings.cycle.item_limit, 60);
        assert_eq!(settings.cycle.max_session, Duration::from_secs(86_400));
        assert_eq!(settings.output_dir, PathBuf::from("output"));
        assert_eq!(
            settings.share_url("p1"),
            "https://share.jodel.com/post?postId=p1"
        );
        assert_eq!(config.command_delegate(), CommandDelegate::wget());

        let feed = config.feed_settings();
        assert_eq!(feed.base_url, "https://api.example/v3");
        assert_eq!(feed.access_token, None);
        assert_eq!(feed.max_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn full_config_round_trips_into_settings() {
        let config = parse(
            r#"(
                poll_interval_secs: 2.5,
                items_per_cycle: 20,
                max_session_secs: 3600,
                locality: " New York ",
                latitude: 40.7,
                longitude: -74.0,
                output_dir: "/data/warc",
                media_dir: "/data/media",
                share_url_template: "https://s.example/{post_id}",
                operator: Some("ops@example.org"),
                feed: (
                    base_url: "https://api.example/v3",
                    access_token: Some("secret"),
                    connect_timeout_secs: 3,
                    request_timeout_secs: 7,
                    max_response_bytes: 1024,
                ),
                delegate: (program: "true", args: ["{input}"], working_dir: Some("/tmp")),
            )"#,
        );
        config.validate().unwrap();

        let settings = config.harvest_settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(2500));
        assert_eq!(settings.cycle.item_limit, 20);
        assert_eq!(settings.locality, "New York");
        assert_eq!(settings.operator.as_deref(), Some("ops@example.org"));
        assert_eq!(settings.share_url("p9"), "https://s.example/p9");

        let feed = config.feed_settings();
        assert_eq!(feed.access_token.as_deref(), Some("secret"));
        assert_eq!(feed.request_timeout, Duration::from_secs(7));

        let delegate = config.command_delegate();
        assert_eq!(delegate.program, "true");
        assert_eq!(delegate.working_dir, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = parse(MINIMAL);
        config.items_per_cycle = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = parse(MINIMAL);
        config.poll_interval_secs = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.share_url_template = "https://s.example/".to_string();
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.latitude = 91.0;
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.locality = "   ".to_string();
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.locality = "Aarhus\r\nsoftware: other".to_string();
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.operator = Some("ops\n@example.org".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn poll_interval_must_fit_a_duration() {
        let config = parse(&MINIMAL.replace("locality:", "poll_interval_secs: 1e30, locality:"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = parse(MINIMAL);
        config.poll_interval_secs = -1.0;
        assert!(config.validate().is_err());
        config.poll_interval_secs = f64::INFINITY;
        assert!(config.validate().is_err());

        config.poll_interval_secs = 0.0;
        config.validate().unwrap();
        assert_eq!(config.harvest_settings().poll_interval, Duration::ZERO);
    }

    #[test]
    fn load_rejects_oversized_interval() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("huge.ron");
        let text = MINIMAL.replace("locality:", "poll_interval_secs: 1e30, locality:");
        fs::write(&path, text).unwrap();
        assert!(matches!(HarvestConfig::load(&path), Err(ConfigError::Invalid(_))));
        assert_eq!(
            parse(&MINIMAL.replace("locality:", "poll_interval_secs: 1e30, locality:"))
                .harvest_settings()
                .poll_interval,
            Duration::from_secs(120)
        );
    }

    #[test]
    fn unknown_fields_fail_to_parse() {
        let text = MINIMAL.replace("locality", "localty");
        assert!(ron::from_str::<HarvestConfig>(&text).is_err());
    }

    #[test]
    fn load_reports_missing_file_and_bad_syntax() {
        let temp = tempfile::TempDir::new().unwrap();
        let missing = temp.path().join("missing.ron");
        assert!(matches!(
            HarvestConfig::load(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = temp.path().join("broken.ron");
        fs::write(&broken, "(locality: ").unwrap();
        assert!(matches!(
            HarvestConfig::load(&broken),
            Err(ConfigError::Parse { .. })
        ));

        let good = temp.path().join("good.ron");
        fs::write(&good, MINIMAL).unwrap();
        assert_eq!(HarvestConfig::load(&good).unwrap().locality, "Aarhus");
    }
}
