//! Configuration management
//!
//! Connection parameters and command defaults are read from a `key=value`
//! file and merged with command-line overrides into an [`EffectiveConfig`],
//! which is built once per invocation and passed to every component.
//!
//! Precedence, lowest to highest: built-in defaults, config file, CLI flags.

use std::path::{Path, PathBuf};

use jiff::Timestamp;

use crate::error::{Error, Result};
use crate::retention::{RetentionPolicy, parse_expire_date};

/// File name of the configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "env.conf";

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "OSS_TOOL_CONFIG_DIR";

/// Region used when neither the file nor the flags name one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Files up to this size are stored with a single put
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 4_194_304;

/// Size of each part of a multipart upload
pub const DEFAULT_PART_SIZE: u64 = 10_240_000;

/// Number of items processed concurrently by batch commands
pub const DEFAULT_PARALLEL: usize = 4;

/// Retry settings for resumable multipart uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
        }
    }
}

/// Transfer tuning, not persisted in the config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub retry: RetryConfig,
    pub parallel: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            part_size: DEFAULT_PART_SIZE,
            retry: RetryConfig::default(),
            parallel: DEFAULT_PARALLEL,
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.part_size == 0 {
            return Err(Error::Config("part size must be at least 1 byte".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry attempts must be at least 1".to_string()));
        }
        if self.parallel == 0 {
            return Err(Error::Config("parallel must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Contents of a config file
///
/// Values are kept as written; they are parsed when merged into an [`EffectiveConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    pub number: Option<String>,
    pub expire_date: Option<String>,
}

impl ConfigFile {
    /// Parse `key=value` lines
    ///
    /// Blank lines and `#` comments are skipped, unknown keys are ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let mut file = ConfigFile::default();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::Config(format!(
                    "line {}: expected key=value, got '{line}'",
                    index + 1
                )));
            };

            let key = key.trim();
            let value = unquote(value.trim());
            let value = (!value.is_empty()).then(|| value.to_string());

            match key {
                "accessKeyId" => file.access_key_id = value,
                "accessKeySecret" => file.access_key_secret = value,
                "endpoint" => file.endpoint = value,
                "bucket" => file.bucket = value,
                "region" => file.region = value,
                "prefix" => file.prefix = value,
                "marker" => file.marker = value,
                "delimiter" => file.delimiter = value,
                "number" => file.number = value,
                "expireDate" => file.expire_date = value,
                other => tracing::debug!(key = other, "Ignoring unknown config key"),
            }
        }

        Ok(file)
    }

    /// Load a config file
    ///
    /// A missing file is an error only when it was named explicitly; a missing
    /// default file yields an empty configuration.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        if !path.exists() {
            if explicit {
                return Err(Error::ConfigNotFound(path.display().to_string()));
            }
            tracing::debug!(path = %path.display(), "Default config file not present");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Render as `key=value` lines, omitting empty fields
    pub fn render(&self) -> String {
        let fields = [
            ("accessKeyId", &self.access_key_id),
            ("accessKeySecret", &self.access_key_secret),
            ("endpoint", &self.endpoint),
            ("bucket", &self.bucket),
            ("region", &self.region),
            ("prefix", &self.prefix),
            ("marker", &self.marker),
            ("delimiter", &self.delimiter),
            ("number", &self.number),
            ("expireDate", &self.expire_date),
        ];

        fields
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("{key}={v}\n"))
            })
            .collect()
    }

    /// Write the file, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render())?;
        tracing::debug!(path = %path.display(), "Config file written");
        Ok(())
    }

    /// Replace fields with the connection overrides that are set
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        overlay(&mut self.access_key_id, &overrides.access_key_id);
        overlay(&mut self.access_key_secret, &overrides.access_key_secret);
        overlay(&mut self.endpoint, &overrides.endpoint);
        overlay(&mut self.bucket, &overrides.bucket);
        overlay(&mut self.region, &overrides.region);
    }
}

fn overlay(target: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value.as_ref().filter(|v| !v.is_empty()) {
        *target = Some(v.clone());
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    pub number: Option<usize>,
    pub expire_date: Option<String>,
    pub parallel: Option<usize>,
    /// Explicit config file path
    pub conf: Option<PathBuf>,
}

/// Default config file location
///
/// `$OSS_TOOL_CONFIG_DIR/env.conf`, else `<config dir>/oss-tool/env.conf`, else `./env.conf`.
pub fn default_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir).join(CONFIG_FILE_NAME);
    }

    dirs::config_dir()
        .map(|dir| dir.join("oss-tool").join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Config file path for an invocation and whether it was named explicitly
pub fn resolve_config_path(overrides: &ConfigOverrides) -> (PathBuf, bool) {
    match &overrides.conf {
        Some(path) => (path.clone(), true),
        None => (default_config_path(), false),
    }
}

/// Credentials and endpoint needed to talk to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub access_key_id: String,
    pub access_key_secret: String,
    /// Endpoint URL including scheme
    pub endpoint: String,
    pub region: String,
    pub bucket: Option<String>,
}

/// Fully resolved configuration for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: String,
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    pub number: Option<usize>,
    pub expire_date: Option<Timestamp>,
    pub transfer: TransferConfig,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            access_key_id: None,
            access_key_secret: None,
            endpoint: None,
            bucket: None,
            region: DEFAULT_REGION.to_string(),
            prefix: None,
            marker: None,
            delimiter: None,
            number: None,
            expire_date: None,
            transfer: TransferConfig::default(),
        }
    }
}

impl EffectiveConfig {
    /// Load the config file named by the overrides (or the default file) and merge
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let (path, explicit) = resolve_config_path(overrides);
        let file = ConfigFile::load(&path, explicit)?;
        Self::merge(file, overrides)
    }

    /// Merge defaults, file contents and overrides, validating typed fields
    pub fn merge(file: ConfigFile, overrides: &ConfigOverrides) -> Result<Self> {
        let defaults = Self::default();

        let pick = |flag: &Option<String>, file: Option<String>| -> Option<String> {
            flag.clone().filter(|v| !v.is_empty()).or(file)
        };

        // The retention policy is taken as a whole: a policy flag replaces
        // both policy fields of the file.
        let policy_flag = overrides.number.is_some()
            || overrides.expire_date.as_deref().is_some_and(|v| !v.is_empty());
        let (file_number, file_expire_date) = if policy_flag {
            (None, None)
        } else {
            (file.number, file.expire_date)
        };

        let number = match overrides.number {
            Some(n) => Some(n),
            None => file_number
                .as_deref()
                .map(|raw| {
                    raw.parse::<usize>()
                        .map_err(|_| Error::Config(format!("number must be a count, got '{raw}'")))
                })
                .transpose()?,
        };

        let expire_date = pick(&overrides.expire_date, file_expire_date)
            .as_deref()
            .map(parse_expire_date)
            .transpose()?;

        let mut transfer = defaults.transfer;
        if let Some(parallel) = overrides.parallel {
            transfer.parallel = parallel;
        }
        transfer.validate()?;

        Ok(Self {
            access_key_id: pick(&overrides.access_key_id, file.access_key_id),
            access_key_secret: pick(&overrides.access_key_secret, file.access_key_secret),
            endpoint: pick(&overrides.endpoint, file.endpoint),
            bucket: pick(&overrides.bucket, file.bucket),
            region: pick(&overrides.region, file.region).unwrap_or(defaults.region),
            prefix: pick(&overrides.prefix, file.prefix),
            marker: pick(&overrides.marker, file.marker),
            delimiter: pick(&overrides.delimiter, file.delimiter),
            number,
            expire_date,
            transfer,
        })
    }

    /// Connection parameters, failing with `MissingArgument` for the first absent field
    pub fn connection(&self) -> Result<Connection> {
        let require = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| Error::MissingArgument(name.to_string()))
        };

        Ok(Connection {
            access_key_id: require(&self.access_key_id, "accessKeyId")?,
            access_key_secret: require(&self.access_key_secret, "accessKeySecret")?,
            endpoint: normalize_endpoint(&require(&self.endpoint, "endpoint")?)?,
            region: self.region.clone(),
            bucket: self.bucket.clone(),
        })
    }

    /// Retention policy selected by `number` / `expireDate`, if any
    pub fn retention_policy(&self) -> Result<Option<RetentionPolicy>> {
        match (self.number, self.expire_date) {
            (Some(_), Some(_)) => Err(Error::Config(
                "number and expireDate cannot be used together".to_string(),
            )),
            (Some(n), None) => Ok(Some(RetentionPolicy::KeepLast(n))),
            (None, Some(date)) => Ok(Some(RetentionPolicy::ExpireBefore(date))),
            (None, None) => Ok(None),
        }
    }

    /// Prefix to use when none is given for a single command
    pub fn default_prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }
}

/// Ensure the endpoint carries a scheme and parses as a URL
pub fn normalize_endpoint(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    };

    let url = url::Url::parse(&with_scheme)
        .map_err(|e| Error::Config(format!("invalid endpoint '{endpoint}': {e}")))?;
    if url.host_str().is_none() {
        return Err(Error::Config(format!("endpoint '{endpoint}' has no host")));
    }

    Ok(with_scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# connection
accessKeyId=AKID
accessKeySecret=\"s3cr3t\"
endpoint=oss-cn-hangzhou.aliyuncs.com
bucket=photos

prefix=backup/
number=3
";

    #[test]
    fn test_parse_recognized_fields() {
        let file = ConfigFile::parse(SAMPLE).unwrap();
        assert_eq!(file.access_key_id.as_deref(), Some("AKID"));
        assert_eq!(file.access_key_secret.as_deref(), Some("s3cr3t"));
        assert_eq!(file.endpoint.as_deref(), Some("oss-cn-hangzhou.aliyuncs.com"));
        assert_eq!(file.bucket.as_deref(), Some("photos"));
        assert_eq!(file.prefix.as_deref(), Some("backup/"));
        assert_eq!(file.number.as_deref(), Some("3"));
        assert!(file.marker.is_none());
    }

    #[test]
    fn test_parse_ignores_unknown_and_empty() {
        let file = ConfigFile::parse("color=blue\nbucket=\n").unwrap();
        assert_eq!(file, ConfigFile::default());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ConfigFile::parse("just some words"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_render_omits_empty_fields() {
        let file = ConfigFile {
            access_key_id: Some("AKID".to_string()),
            bucket: Some("photos".to_string()),
            prefix: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(file.render(), "accessKeyId=AKID\nbucket=photos\n");
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("env.conf");

        let file = ConfigFile::parse(SAMPLE).unwrap();
        file.save(&path).unwrap();

        let loaded = ConfigFile::load(&path, true).unwrap();
        assert_eq!(loaded, file);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        let result = ConfigFile::load(&temp.path().join("nope.conf"), true);
        assert!(matches!(result, Err(Error::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_missing_default_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let file = ConfigFile::load(&temp.path().join("env.conf"), false).unwrap();
        assert_eq!(file, ConfigFile::default());
    }

    #[test]
    fn test_merge_precedence() {
        let file = ConfigFile {
            access_key_id: Some("file-id".to_string()),
            access_key_secret: Some("file-secret".to_string()),
            endpoint: Some("file.example.com".to_string()),
            bucket: Some("file-bucket".to_string()),
            prefix: Some("file/".to_string()),
            ..Default::default()
        };
        let overrides = ConfigOverrides {
            access_key_id: Some("flag-id".to_string()),
            bucket: Some("flag-bucket".to_string()),
            ..Default::default()
        };

        let config = EffectiveConfig::merge(file, &overrides).unwrap();

        // Flag beats file
        assert_eq!(config.access_key_id.as_deref(), Some("flag-id"));
        assert_eq!(config.bucket.as_deref(), Some("flag-bucket"));
        // File beats default
        assert_eq!(config.access_key_secret.as_deref(), Some("file-secret"));
        assert_eq!(config.endpoint.as_deref(), Some("file.example.com"));
        assert_eq!(config.prefix.as_deref(), Some("file/"));
        // Default when neither is set
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.transfer, TransferConfig::default());
        assert!(config.marker.is_none());
    }

    #[test]
    fn test_merge_empty_flag_does_not_override() {
        let file = ConfigFile {
            bucket: Some("file-bucket".to_string()),
            ..Default::default()
        };
        let overrides = ConfigOverrides {
            bucket: Some(String::new()),
            ..Default::default()
        };
        let config = EffectiveConfig::merge(file, &overrides).unwrap();
        assert_eq!(config.bucket.as_deref(), Some("file-bucket"));
    }

    #[test]
    fn test_merge_typed_fields() {
        let file = ConfigFile {
            number: Some("7".to_string()),
            expire_date: Some("2021-01-01".to_string()),
            ..Default::default()
        };
        let config = EffectiveConfig::merge(file.clone(), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.number, Some(7));
        assert_eq!(
            config.expire_date,
            Some("2021-01-01T00:00:00Z".parse().unwrap())
        );

        let overrides = ConfigOverrides {
            number: Some(2),
            ..Default::default()
        };
        let config = EffectiveConfig::merge(file, &overrides).unwrap();
        assert_eq!(config.number, Some(2));
    }

    #[test]
    fn test_policy_flag_replaces_file_policy() {
        let file = ConfigFile::parse("number=3\n").unwrap();
        let overrides = ConfigOverrides {
            expire_date: Some("2021-01-01".to_string()),
            ..Default::default()
        };
        let config = EffectiveConfig::merge(file, &overrides).unwrap();
        assert_eq!(config.number, None);
        assert_eq!(
            config.retention_policy().unwrap(),
            Some(RetentionPolicy::ExpireBefore(
                "2021-01-01T00:00:00Z".parse().unwrap()
            ))
        );

        let file = ConfigFile::parse("expireDate=2021-01-01\n").unwrap();
        let overrides = ConfigOverrides {
            number: Some(2),
            ..Default::default()
        };
        let config = EffectiveConfig::merge(file, &overrides).unwrap();
        assert_eq!(config.expire_date, None);
        assert_eq!(
            config.retention_policy().unwrap(),
            Some(RetentionPolicy::KeepLast(2))
        );
    }

    #[test]
    fn test_policy_flag_ignores_unparsable_file_policy() {
        let file = ConfigFile::parse("number=many\n").unwrap();
        let overrides = ConfigOverrides {
            expire_date: Some("2021-01-01".to_string()),
            ..Default::default()
        };
        assert!(EffectiveConfig::merge(file, &overrides).is_ok());
    }

    #[test]
    fn test_merge_rejects_bad_number() {
        let file = ConfigFile {
            number: Some("many".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            EffectiveConfig::merge(file, &ConfigOverrides::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_merge_rejects_zero_parallel() {
        let overrides = ConfigOverrides {
            parallel: Some(0),
            ..Default::default()
        };
        assert!(EffectiveConfig::merge(ConfigFile::default(), &overrides).is_err());
    }

    #[test]
    fn test_resolve_explicit_missing_file() {
        let temp = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            conf: Some(temp.path().join("missing.conf")),
            ..Default::default()
        };
        assert!(matches!(
            EffectiveConfig::resolve(&overrides),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_reads_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dev.conf");
        std::fs::write(&path, "bucket=from-file\nregion=eu-west-1\n").unwrap();

        let overrides = ConfigOverrides {
            conf: Some(path),
            ..Default::default()
        };
        let config = EffectiveConfig::resolve(&overrides).unwrap();
        assert_eq!(config.bucket.as_deref(), Some("from-file"));
        assert_eq!(config.region, "eu-west-1");
    }

    #[test]
    fn test_connection_requires_credentials() {
        let config = EffectiveConfig {
            access_key_id: Some("id".to_string()),
            endpoint: Some("example.com".to_string()),
            ..Default::default()
        };
        match config.connection() {
            Err(Error::MissingArgument(field)) => assert_eq!(field, "accessKeySecret"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_connection_normalizes_endpoint() {
        let config = EffectiveConfig {
            access_key_id: Some("id".to_string()),
            access_key_secret: Some("secret".to_string()),
            endpoint: Some("oss-cn-hangzhou.aliyuncs.com/".to_string()),
            ..Default::default()
        };
        let conn = config.connection().unwrap();
        assert_eq!(conn.endpoint, "https://oss-cn-hangzhou.aliyuncs.com");
        assert!(conn.bucket.is_none());
    }

    #[test]
    fn test_normalize_endpoint_keeps_scheme() {
        assert_eq!(
            normalize_endpoint("http://localhost:9000").unwrap(),
            "http://localhost:9000"
        );
        assert!(normalize_endpoint("").is_err());
    }

    #[test]
    fn test_retention_policy() {
        let mut config = EffectiveConfig {
            number: Some(3),
            ..Default::default()
        };
        assert_eq!(
            config.retention_policy().unwrap(),
            Some(RetentionPolicy::KeepLast(3))
        );

        config.expire_date = Some(Timestamp::UNIX_EPOCH);
        assert!(config.retention_policy().is_err());

        config.number = None;
        assert_eq!(
            config.retention_policy().unwrap(),
            Some(RetentionPolicy::ExpireBefore(Timestamp::UNIX_EPOCH))
        );
    }

    #[test]
    fn test_apply_overrides_to_file() {
        let mut file = ConfigFile::parse(SAMPLE).unwrap();
        file.apply(&ConfigOverrides {
            bucket: Some("videos".to_string()),
            region: Some("eu-central-1".to_string()),
            ..Default::default()
        });
        assert_eq!(file.bucket.as_deref(), Some("videos"));
        assert_eq!(file.region.as_deref(), Some("eu-central-1"));
        assert_eq!(file.access_key_id.as_deref(), Some("AKID"));
    }
}
