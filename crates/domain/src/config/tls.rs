use super::errors::ConfigError;
use std::path::PathBuf;

/// Trust and identity settings applied to `tls://` upstreams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    pub cert_file: Option<PathBuf>,

    pub key_file: Option<PathBuf>,

    /// CA bundle replacing the built-in web PKI roots.
    pub ca_file: Option<PathBuf>,

    /// Name expected in the upstream certificate.
    pub server_name: Option<String>,
}

impl TlsOptions {
    /// Applies the `tls [CERT KEY CA]` arguments.
    ///
    /// No arguments keeps the system trust; one names a CA bundle; two name a
    /// client certificate and key; three name certificate, key and CA.
    pub fn set_files(&mut self, args: &[&str]) -> Result<(), ConfigError> {
        let (cert, key, ca) = match args {
            [] => (None, None, None),
            [ca] => (None, None, Some(*ca)),
            [cert, key] => (Some(*cert), Some(*key), None),
            [cert, key, ca] => (Some(*cert), Some(*key), Some(*ca)),
            _ => return Err(ConfigError::ArgumentCount("tls".to_string())),
        };
        self.cert_file = cert.map(PathBuf::from);
        self.key_file = key.map(PathBuf::from);
        self.ca_file = ca.map(PathBuf::from);
        Ok(())
    }

    pub fn has_client_auth(&self) -> bool {
        self.cert_file.is_some() && self.key_file.is_some()
    }
}
