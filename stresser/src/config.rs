//! Configuration for the stresser.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags (see [`Overrides`])
//! 2. Environment variables prefixed with `STRESSER__`
//! 3. The well-known AWS variables `AWS_ENDPOINT_URL`, `AWS_REGION` and `S3_BUCKET`
//! 4. YAML configuration file (specified via `-c` or `--config`)
//! 5. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `STRESSER__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `STRESSER__CONCURRENCY=32` sets the number of workers
//! - `STRESSER__STORAGE__TYPE=filesystem` selects the local filesystem store
//! - `STRESSER__STORAGE__PATH=/data` sets its root directory
//!
//! # YAML Configuration File
//!
//! ```yaml
//! duration: 5m
//! concurrency: 32
//! operation: mixed
//! put_object_size: 64KiB
//!
//! storage:
//!   type: s3compatible
//!   endpoint: http://localhost:9000
//!   bucket: stress
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use bytesize::ByteSize;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "STRESSER__";

/// Un-prefixed environment variables understood for compatibility with common S3 tooling.
const AWS_ENV_KEYS: &[(&str, &str)] = &[
    ("AWS_ENDPOINT_URL", "storage.endpoint"),
    ("AWS_REGION", "storage.region"),
    ("S3_BUCKET", "storage.bucket"),
];

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or a value failed to parse.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The configuration file given on the command line does not exist.
    #[error("configuration file {0:?} does not exist")]
    MissingFile(PathBuf),

    /// The merged configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::Load(Box::new(error))
    }
}

/// Newtype around `String` that protects against accidental logging of secrets in our
/// configuration struct. Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// The object store to run against.
///
/// The `type` field in YAML or `STRESSER__STORAGE__TYPE` determines which variant is used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// S3 or an S3-compatible service such as MinIO or Ceph (type `"s3compatible"`).
    ///
    /// ```yaml
    /// storage:
    ///   type: s3compatible
    ///   endpoint: http://localhost:9000
    ///   region: us-east-1
    ///   bucket: stress
    /// ```
    S3Compatible {
        /// Endpoint URL. Uses the AWS endpoint for `region` if unset.
        ///
        /// Also read from `AWS_ENDPOINT_URL`.
        #[serde(default)]
        endpoint: Option<String>,

        /// Signing region. Also read from `AWS_REGION`.
        ///
        /// # Default
        ///
        /// `us-east-1`
        #[serde(default = "default_region")]
        region: String,

        /// Bucket name. The bucket must exist. Also read from `S3_BUCKET`.
        #[serde(default)]
        bucket: String,

        /// Static access key. If this or `secret_key` is missing, the default AWS credential
        /// chain is used (`AWS_ACCESS_KEY_ID`, shared profiles, instance metadata).
        #[serde(default)]
        access_key: Option<String>,

        /// Static secret key, redacted from logs.
        #[serde(default)]
        secret_key: Option<SecretBox<ConfigSecret>>,

        /// Use path-style addressing, which most S3-compatible services require.
        ///
        /// # Default
        ///
        /// `true`
        #[serde(default = "default_path_style")]
        path_style: bool,

        /// Timeout applied by the HTTP client to each request. No timeout if unset.
        #[serde(default, with = "humantime_serde")]
        request_timeout: Option<Duration>,

        /// Accept any TLS certificate and host name presented by the endpoint.
        ///
        /// Only meant for test rigs with self-signed certificates.
        ///
        /// # Default
        ///
        /// `false`
        #[serde(default)]
        insecure_skip_verify: bool,
    },

    /// Objects as files below a local directory (type `"filesystem"`).
    FileSystem {
        /// Root directory. Created on demand.
        path: PathBuf,
    },

    /// A process-local in-memory store (type `"memory"`), useful for dry runs.
    Memory,
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

fn default_path_style() -> bool {
    true
}

impl Default for Storage {
    fn default() -> Self {
        Self::S3Compatible {
            endpoint: None,
            region: default_region(),
            bucket: String::new(),
            access_key: None,
            secret_key: None,
            path_style: default_path_style(),
            request_timeout: None,
            insecure_skip_verify: false,
        }
    }
}

/// The kind of load generated by every worker.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    /// GET existing keys from the manifest.
    #[default]
    Read,
    /// PUT freshly generated objects.
    Write,
    /// Flip a fair coin between a GET and a PUT on every iteration.
    Mixed,
}

impl OperationMode {
    /// Returns `true` if this mode issues GETs and therefore needs a manifest.
    pub fn reads(self) -> bool {
        matches!(self, Self::Read | Self::Mixed)
    }

    /// Returns `true` if this mode issues PUTs.
    pub fn writes(self) -> bool {
        matches!(self, Self::Write | Self::Mixed)
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

impl FromStr for OperationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("read") => Ok(Self::Read),
            s if s.eq_ignore_ascii_case("write") => Ok(Self::Write),
            s if s.eq_ignore_ascii_case("mixed") => Ok(Self::Mixed),
            s => Err(format!(
                "invalid operation type {s:?}, must be 'read', 'write', or 'mixed'"
            )),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty for a TTY, simplified otherwise.
    #[default]
    Auto,
    /// Pretty printing with colors.
    Pretty,
    /// Plain single-line text.
    Simplified,
    /// JSON lines.
    Json,
}

/// Logging configuration. Logs are always written to stderr.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level. `RUST_LOG` takes precedence when set.
    ///
    /// # Default
    ///
    /// `INFO`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Complete stresser configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// The object store under test.
    pub storage: Storage,

    /// How long new operations are issued for.
    ///
    /// # Default
    ///
    /// `1m`
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Number of concurrent workers.
    ///
    /// # Default
    ///
    /// `10`
    pub concurrency: usize,

    /// The operation mix, see [`OperationMode`].
    pub operation: OperationMode,

    /// Pick manifest keys at random instead of sequentially.
    pub randomize: bool,

    /// Size of every object uploaded in `write` and `mixed` mode.
    ///
    /// # Default
    ///
    /// `1MiB`
    pub put_object_size: ByteSize,

    /// Upload exactly this many objects in `write` mode instead of running for `duration`.
    pub file_count: Option<usize>,

    /// Record the keys of uploaded objects in the manifest file in `write` mode.
    ///
    /// # Default
    ///
    /// `true`
    pub generate_manifest: bool,

    /// Manifest file: read in `read` and `mixed` mode, written in `write` mode.
    pub manifest: Option<PathBuf>,

    /// CSV file receiving one row per operation.
    ///
    /// # Default
    ///
    /// `stress_results.csv`
    pub output: PathBuf,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: Storage::default(),
            duration: Duration::from_secs(60),
            concurrency: 10,
            operation: OperationMode::default(),
            randomize: false,
            put_object_size: ByteSize::mib(1),
            file_count: None,
            generate_manifest: true,
            manifest: None,
            output: PathBuf::from("stress_results.csv"),
            logging: Logging::default(),
        }
    }
}

/// Values given on the command line, applied on top of all other sources.
///
/// Unset fields leave the configured value untouched. Durations and sizes are kept as strings so
/// they are parsed by the same rules as the other sources.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub randomize: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put_object_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_manifest: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip)]
    pub log_level: Option<String>,
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file, the environment and `overrides`.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file is missing or cannot be parsed, or if any source contains a
    /// value of the wrong type, such as an unparseable duration.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::MissingFile(path.to_owned()));
            }
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment
            .merge(aws_env())
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides));
        if let Some(level) = &overrides.log_level {
            figment = figment.merge(Serialized::default("logging.level", level));
        }

        Ok(figment.extract()?)
    }

    /// Checks the merged configuration for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_owned()));

        if self.duration.is_zero() {
            return invalid("duration must be greater than 0");
        }
        if self.concurrency == 0 {
            return invalid("concurrency must be greater than 0");
        }
        if self.operation.writes() && self.put_object_size.as_u64() == 0 {
            return invalid("put object size must be greater than 0 for 'write' or 'mixed' mode");
        }
        if self.file_count == Some(0) {
            return invalid("file count must be greater than 0");
        }
        if self.operation.reads() && self.manifest.is_none() {
            return invalid("a manifest file is required for 'read' or 'mixed' mode");
        }
        if let Storage::S3Compatible { bucket, .. } = &self.storage
            && bucket.is_empty()
        {
            return invalid("bucket name is required (storage.bucket or S3_BUCKET)");
        }

        Ok(())
    }

    /// Extracts the parameters of a single run.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            duration: self.duration,
            concurrency: self.concurrency,
            mode: self.operation,
            randomize: self.randomize,
            put_object_size: self.put_object_size.as_u64() as usize,
            file_count: self.file_count,
            generate_manifest: self.generate_manifest,
        }
    }
}

/// The parameters of a single run, immutable for its lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// How long new operations are issued for.
    pub duration: Duration,
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// The operation mix.
    pub mode: OperationMode,
    /// Pick keys at random instead of sequentially.
    pub randomize: bool,
    /// Size of every uploaded object in bytes.
    pub put_object_size: usize,
    /// Fixed number of uploads in `write` mode. Ignored in other modes.
    pub file_count: Option<usize>,
    /// Record uploaded keys in the manifest in `write` mode.
    pub generate_manifest: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Config::default().run_config()
    }
}

impl RunConfig {
    /// The fixed number of uploads, if this run generates a fixed set of objects.
    pub fn fixed_file_count(&self) -> Option<usize> {
        match self.mode {
            OperationMode::Write => self.file_count,
            _ => None,
        }
    }
}

fn aws_env() -> Env {
    let names: Vec<&str> = AWS_ENV_KEYS.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        AWS_ENV_KEYS
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map_or(key.as_str(), |(_, path)| *path)
            .into()
    })
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
