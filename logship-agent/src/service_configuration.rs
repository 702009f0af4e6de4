use anyhow::{anyhow, Context, Result};
use logship_storage::{BackendConfig, CloudBackend, LocalBackend, UploaderConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// configuration settings loaded from the config file
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LoadConfiguration {
    /// Application storage root; the queue directory is `<storage_root>/LogFiles`
    pub(crate) storage_root: String,
    /// Sample records written at startup (defaults to 10)
    pub(crate) write_count: Option<u64>,
    /// Permission gate; uploads start only once this is true (defaults to true)
    pub(crate) send_enabled: Option<bool>,
    /// Prometheus exporter address, e.g. "0.0.0.0:9040"
    pub(crate) prom_exporter: Option<String>,
    /// Uploader timings, all optional
    #[serde(default)]
    pub(crate) uploader: UploaderNode,
    /// Remote object store
    pub(crate) remote: RemoteConfig,
}

/// configuration the agent runs with, after defaults and validation
#[derive(Debug)]
pub(crate) struct ServiceConfiguration {
    pub(crate) storage_root: PathBuf,
    pub(crate) write_count: u64,
    pub(crate) send_enabled: bool,
    pub(crate) prom_exporter: Option<SocketAddr>,
    pub(crate) uploader: UploaderConfig,
    /// Size of one streamed write to the remote store, in bytes
    pub(crate) chunk_size: usize,
    pub(crate) backend: BackendConfig,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub(crate) struct UploaderNode {
    pub(crate) poll_interval_ms: Option<u64>,
    pub(crate) dependency_poll_interval_ms: Option<u64>,
    pub(crate) permission_poll_interval_ms: Option<u64>,
    /// Prefix of every remote object key (defaults to "Root")
    pub(crate) remote_root: Option<String>,
    pub(crate) shutdown_timeout_ms: Option<u64>,
    pub(crate) chunk_size_kb: Option<usize>,
}

/// Remote configuration enum (tagged by `backend`)
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "backend")]
pub(crate) enum RemoteConfig {
    #[serde(rename = "memory")]
    Memory { root: String },
    #[serde(rename = "fs")]
    Fs { root: String },
    #[serde(rename = "s3")]
    S3 {
        /// Root format: "s3://bucket" or "s3://bucket/prefix"
        root: String,
        region: Option<String>,
        endpoint: Option<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
        role_arn: Option<String>,
        session_token: Option<String>,
        anonymous: Option<bool>,
    },
    #[serde(rename = "gcs")]
    Gcs {
        /// Root format: "gcs://bucket" or "gs://bucket/prefix"
        root: String,
        endpoint: Option<String>,
        credentials_json: Option<String>,
        credentials_path: Option<String>,
    },
}

const DEFAULT_WRITE_COUNT: u64 = 10;
const DEFAULT_CHUNK_SIZE_KB: usize = 64;

/// Implementing the TryFrom trait to transform LoadConfiguration into ServiceConfiguration
impl TryFrom<LoadConfiguration> for ServiceConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        if config.storage_root.trim().is_empty() {
            return Err(anyhow!("storage_root must not be empty"));
        }

        let prom_exporter: Option<SocketAddr> = match config.prom_exporter {
            Some(addr) => Some(
                addr.parse()
                    .context(format!("Failed to parse prom_exporter address: {}", addr))?,
            ),
            None => None,
        };

        let defaults = UploaderConfig::default();
        let node = config.uploader;
        let uploader = UploaderConfig {
            poll_interval_ms: node.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            dependency_poll_interval_ms: node
                .dependency_poll_interval_ms
                .unwrap_or(defaults.dependency_poll_interval_ms),
            permission_poll_interval_ms: node
                .permission_poll_interval_ms
                .unwrap_or(defaults.permission_poll_interval_ms),
            remote_root: node.remote_root.unwrap_or(defaults.remote_root),
            content_type: defaults.content_type,
            shutdown_timeout_ms: node
                .shutdown_timeout_ms
                .unwrap_or(defaults.shutdown_timeout_ms),
        };
        if uploader.poll_interval_ms == 0
            || uploader.dependency_poll_interval_ms == 0
            || uploader.permission_poll_interval_ms == 0
        {
            return Err(anyhow!("uploader poll intervals must be greater than zero"));
        }

        let chunk_size_kb = node.chunk_size_kb.unwrap_or(DEFAULT_CHUNK_SIZE_KB);
        if chunk_size_kb == 0 {
            return Err(anyhow!("uploader.chunk_size_kb must be greater than zero"));
        }

        Ok(ServiceConfiguration {
            storage_root: PathBuf::from(config.storage_root),
            write_count: config.write_count.unwrap_or(DEFAULT_WRITE_COUNT),
            send_enabled: config.send_enabled.unwrap_or(true),
            prom_exporter,
            uploader,
            chunk_size: chunk_size_kb * 1024,
            backend: config.remote.into(),
        })
    }
}

impl From<RemoteConfig> for BackendConfig {
    fn from(remote: RemoteConfig) -> Self {
        match remote {
            RemoteConfig::Memory { root } => BackendConfig::Local {
                backend: LocalBackend::Memory,
                root,
            },
            RemoteConfig::Fs { root } => BackendConfig::Local {
                backend: LocalBackend::Fs,
                root,
            },
            RemoteConfig::S3 {
                root,
                region,
                endpoint,
                access_key,
                secret_key,
                role_arn,
                session_token,
                anonymous,
            } => {
                let mut options: HashMap<String, String> = HashMap::new();
                if let Some(v) = region {
                    options.insert("region".into(), v);
                }
                if let Some(v) = endpoint {
                    options.insert("endpoint".into(), v);
                }
                if let Some(v) = access_key {
                    options.insert("access_key".into(), v);
                }
                if let Some(v) = secret_key {
                    options.insert("secret_key".into(), v);
                }
                if let Some(v) = role_arn {
                    options.insert("role_arn".into(), v);
                }
                if let Some(v) = session_token {
                    options.insert("session_token".into(), v);
                }
                if let Some(v) = anonymous {
                    options.insert("anonymous".into(), v.to_string());
                }
                BackendConfig::Cloud {
                    backend: CloudBackend::S3,
                    root,
                    options,
                }
            }
            RemoteConfig::Gcs {
                root,
                endpoint,
                credentials_json,
                credentials_path,
            } => {
                let mut options: HashMap<String, String> = HashMap::new();
                if let Some(v) = endpoint {
                    options.insert("endpoint".into(), v);
                }
                if let Some(v) = credentials_json {
                    options.insert("credentials_json".into(), v);
                }
                if let Some(v) = credentials_path {
                    options.insert("credentials_path".into(), v);
                }
                BackendConfig::Cloud {
                    backend: CloudBackend::Gcs,
                    root,
                    options,
                }
            }
        }
    }
}
