use logship_core::ShipperError;
use opendal::{services, Operator};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudBackend {
    S3,
    Gcs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalBackend {
    Fs,
    Memory,
}

#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Object stores hosted out of process (S3, GCS)
    Cloud {
        backend: CloudBackend,
        /// A URI-like root, e.g. s3://bucket/prefix, gcs://bucket/prefix
        root: String,
        /// Optional backend-specific options (endpoint, region, credentials, etc.)
        options: HashMap<String, String>,
    },
    /// Stores colocated with the process (fs, memory)
    Local {
        backend: LocalBackend,
        /// For fs: an absolute directory. For memory: a logical namespace used as virtual root.
        root: String,
    },
}

impl BackendConfig {
    pub fn provider(&self) -> &'static str {
        match self {
            BackendConfig::Local {
                backend: LocalBackend::Memory,
                ..
            } => "memory",
            BackendConfig::Local {
                backend: LocalBackend::Fs,
                ..
            } => "fs",
            BackendConfig::Cloud {
                backend: CloudBackend::S3,
                ..
            } => "s3",
            BackendConfig::Cloud {
                backend: CloudBackend::Gcs,
                ..
            } => "gcs",
        }
    }

    pub(crate) fn build_operator(&self) -> Result<Operator, ShipperError> {
        let op = match self {
            BackendConfig::Local {
                backend: LocalBackend::Memory,
                root,
            } => Operator::new(services::Memory::default().root(root))
                .map_err(remote_err)?
                .finish(),
            BackendConfig::Local {
                backend: LocalBackend::Fs,
                root,
            } => {
                let root = root.strip_prefix("file://").unwrap_or(root);
                Operator::new(services::Fs::default().root(root))
                    .map_err(remote_err)?
                    .finish()
            }
            BackendConfig::Cloud {
                backend: CloudBackend::S3,
                root,
                options,
            } => {
                let (bucket, prefix) = split_bucket_root(root, &["s3://"])?;
                let mut builder = services::S3::default().bucket(&bucket).root(&prefix);
                if let Some(v) = options.get("region") {
                    builder = builder.region(v);
                }
                if let Some(v) = options.get("endpoint") {
                    builder = builder.endpoint(v);
                }
                if let Some(v) = options.get("access_key") {
                    builder = builder.access_key_id(v);
                }
                if let Some(v) = options.get("secret_key") {
                    builder = builder.secret_access_key(v);
                }
                if let Some(v) = options.get("session_token") {
                    builder = builder.session_token(v);
                }
                if let Some(v) = options.get("role_arn") {
                    builder = builder.role_arn(v);
                }
                if options.get("anonymous").map(|v| v == "true").unwrap_or(false) {
                    builder = builder.allow_anonymous();
                }
                Operator::new(builder).map_err(remote_err)?.finish()
            }
            BackendConfig::Cloud {
                backend: CloudBackend::Gcs,
                root,
                options,
            } => {
                let (bucket, prefix) = split_bucket_root(root, &["gcs://", "gs://"])?;
                let mut builder = services::Gcs::default().bucket(&bucket).root(&prefix);
                if let Some(v) = options.get("endpoint") {
                    builder = builder.endpoint(v);
                }
                if let Some(v) = options.get("credentials_json") {
                    builder = builder.credential(v);
                }
                if let Some(v) = options.get("credentials_path") {
                    builder = builder.credential_path(v);
                }
                Operator::new(builder).map_err(remote_err)?.finish()
            }
        };
        Ok(op)
    }
}

fn remote_err(e: opendal::Error) -> ShipperError {
    ShipperError::Remote(format!("build operator: {}", e))
}

/// Split `scheme://bucket/prefix` into `(bucket, "/prefix")`.
pub(crate) fn split_bucket_root(
    root: &str,
    schemes: &[&str],
) -> Result<(String, String), ShipperError> {
    let rest = schemes
        .iter()
        .find_map(|s| root.strip_prefix(s))
        .ok_or_else(|| {
            ShipperError::Config(format!("root {} must start with one of {:?}", root, schemes))
        })?;
    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        return Err(ShipperError::Config(format!("root {} has no bucket", root)));
    }
    Ok((bucket.to_string(), format!("/{}", prefix)))
}
