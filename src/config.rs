//! Upload target configuration.
//!
//! The destination for published reports is fixed: one bucket on one
//! S3-compatible endpoint. [`UploadConfig`] carries those values as an
//! immutable value built once at startup and handed to the uploader.
//! [`Credentials`] holds the key pair read from the environment.

use std::fmt;

/// Bucket that receives published reports.
pub const DEFAULT_BUCKET: &str = "dx-test-results";

/// Object storage endpoint URL.
pub const DEFAULT_ENDPOINT: &str = "https://us-southeast-1.linodeobjects.com";

/// Region name passed to the S3 client.
pub const DEFAULT_REGION: &str = "us-southeast-1";

/// Environment variable holding the access key id.
pub const ACCESS_KEY_VAR: &str = "LINODE_CLI_OBJ_ACCESS_KEY";

/// Environment variable holding the secret access key.
pub const SECRET_KEY_VAR: &str = "LINODE_CLI_OBJ_SECRET_KEY";

/// Where and how reports are uploaded.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `bucket` | `dx-test-results` |
/// | `endpoint` | `https://us-southeast-1.linodeobjects.com` |
/// | `region` | `us-southeast-1` |
/// | `access_key_var` | `LINODE_CLI_OBJ_ACCESS_KEY` |
/// | `secret_key_var` | `LINODE_CLI_OBJ_SECRET_KEY` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Destination bucket.
    pub bucket: String,

    /// Endpoint URL of the S3-compatible service.
    pub endpoint: String,

    /// Region the endpoint belongs to.
    pub region: String,

    /// Name of the environment variable holding the access key id.
    pub access_key_var: String,

    /// Name of the environment variable holding the secret key.
    pub secret_key_var: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            region: DEFAULT_REGION.to_string(),
            access_key_var: ACCESS_KEY_VAR.to_string(),
            secret_key_var: SECRET_KEY_VAR.to_string(),
        }
    }
}

/// Access key pair for the object store.
///
/// Either half may be missing; the uploader treats an incomplete pair as
/// "credentials not available" rather than a fatal error.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl Credentials {
    /// Reads the key pair from the process environment.
    pub fn from_env(config: &UploadConfig) -> Self {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    /// Reads the key pair through `lookup`, which maps a variable name to
    /// its value. Empty values count as absent.
    pub fn from_lookup<F>(config: &UploadConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.is_empty());

        Self {
            access_key: read(&config.access_key_var),
            secret_key: read(&config.secret_key_var),
        }
    }

    /// Returns true when both the access key and the secret key are set.
    pub fn is_complete(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("access_key", &mask(&self.access_key))
            .field("secret_key", &mask(&self.secret_key))
            .finish()
    }
}
