//! Configuration loading and validation.
//!
//! Configuration is a JSON file merged with `DIRSNAP_`-prefixed environment
//! variables (nested keys split on `__`, so `DIRSNAP_OBJECT_STORE__KEY_ID`
//! overrides `object_store.key_id` — handy for keeping credentials out of
//! the file). There is no ambient config state; the loaded value is passed
//! into the pipeline explicitly.
//!
//! ```json
//! {
//!   "jobs": [
//!     {
//!       "source": "/srv/website",
//!       "destinations": {
//!         "local": ["/mnt/backups"],
//!         "buckets": ["website-backups"]
//!       }
//!     }
//!   ],
//!   "object_store": {
//!     "region": "us-west-004",
//!     "endpoint": "https://s3.us-west-004.backblazeb2.com",
//!     "key_id": "...",
//!     "key_secret": "..."
//!   }
//! }
//! ```

use crate::error::{ErrorKind, Result};
use dirsnap_transfer::{DEFAULT_CHUNK_SIZE, ObjectStoreSettings};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Backup jobs, executed sequentially in file order.
    pub jobs: Vec<Job>,
    /// Object-store connection settings; required only when a job names
    /// bucket destinations.
    #[serde(default)]
    pub object_store: Option<ObjectStore>,
}

#[derive(Debug, Deserialize)]
pub struct Job {
    /// Absolute path to the directory to snapshot.
    pub source: PathBuf,
    #[serde(default)]
    pub destinations: JobDestinations,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobDestinations {
    #[serde(default)]
    pub local: Vec<PathBuf>,
    #[serde(default)]
    pub buckets: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectStore {
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_operation_timeout_secs() -> u64 {
    900
}

fn default_attempt_timeout_secs() -> u64 {
    300
}

impl ObjectStore {
    pub fn to_settings(&self) -> ObjectStoreSettings {
        let mut settings = ObjectStoreSettings::new(&self.region, &self.key_id, &self.key_secret);
        settings.endpoint = self.endpoint.clone();
        settings.chunk_size = self.chunk_size;
        settings.operation_timeout = Duration::from_secs(self.operation_timeout_secs);
        settings.attempt_timeout = Duration::from_secs(self.attempt_timeout_secs);
        settings
    }
}

/// Load and validate configuration from `path` plus the environment.
pub fn load(path: &Path) -> Result<Config> {
    if !path.is_file() {
        exn::bail!(ErrorKind::Config(path.to_path_buf()));
    }
    let config: Config = Figment::new()
        .merge(Json::file(path))
        .merge(Env::prefixed("DIRSNAP_").split("__"))
        .extract()
        .or_raise(|| ErrorKind::Config(path.to_path_buf()))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.jobs.is_empty() {
        exn::bail!(ErrorKind::Invalid("no jobs configured".to_string()));
    }
    for job in &config.jobs {
        if !job.source.is_absolute() {
            exn::bail!(ErrorKind::Invalid(format!("job source must be absolute: {}", job.source.display())));
        }
        for dest in &job.destinations.local {
            if !dest.is_absolute() {
                exn::bail!(ErrorKind::Invalid(format!("local destination must be absolute: {}", dest.display())));
            }
        }
        if !job.destinations.buckets.is_empty() && config.object_store.is_none() {
            exn::bail!(ErrorKind::Invalid(format!(
                "job {} names bucket destinations but no object_store is configured",
                job.source.display()
            )));
        }
    }
    if let Some(store) = &config.object_store
        && store.chunk_size == 0
    {
        exn::bail!(ErrorKind::Invalid("object_store.chunk_size must be non-zero".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("backup.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_a_minimal_configuration() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "backup.json",
                r#"{"jobs": [{"source": "/srv/website", "destinations": {"local": ["/mnt/backups"]}}]}"#,
            )?;

            let config = load(Path::new("backup.json")).expect("config loads");
            assert_eq!(config.jobs.len(), 1);
            assert_eq!(config.jobs[0].source, Path::new("/srv/website"));
            assert_eq!(config.jobs[0].destinations.local, vec![PathBuf::from("/mnt/backups")]);
            assert!(config.jobs[0].destinations.buckets.is_empty());
            assert!(config.object_store.is_none());
            Ok(())
        });
    }

    #[test]
    fn object_store_defaults_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{
                "jobs": [{"source": "/srv/website", "destinations": {"buckets": ["site-backups"]}}],
                "object_store": {"region": "eu-central-1", "key_id": "k", "key_secret": "s"}
            }"#,
        );

        let config = load(&path).unwrap();
        let store = config.object_store.unwrap();
        assert_eq!(store.chunk_size, DEFAULT_CHUNK_SIZE);
        let settings = store.to_settings();
        assert_eq!(settings.region, "eu-central-1");
        assert_eq!(settings.operation_timeout, Duration::from_secs(900));
        assert_eq!(settings.attempt_timeout, Duration::from_secs(300));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Config(_)));
    }

    #[test]
    fn relative_source_is_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("backup.json", r#"{"jobs": [{"source": "relative/dir"}]}"#)?;
            let err = load(Path::new("backup.json")).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn buckets_without_object_store_are_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "backup.json",
                r#"{"jobs": [{"source": "/srv/website", "destinations": {"buckets": ["b"]}}]}"#,
            )?;
            let err = load(Path::new("backup.json")).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{
                "jobs": [{"source": "/srv/website"}],
                "object_store": {"region": "r", "key_id": "k", "key_secret": "s", "chunk_size": 0}
            }"#,
        );
        let err = load(&path).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn environment_overrides_the_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "backup.json",
                r#"{
                    "jobs": [{"source": "/srv/website"}],
                    "object_store": {"region": "eu-central-1", "key_id": "from-file", "key_secret": "s"}
                }"#,
            )?;
            jail.set_env("DIRSNAP_OBJECT_STORE__KEY_ID", "from-env");

            let config = load(Path::new("backup.json")).expect("config loads");
            assert_eq!(config.object_store.unwrap().key_id, "from-env");
            Ok(())
        });
    }
}
