//! Upload credentials and their interactive recovery

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

/// One browser cookie from the auth file
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Everything an upload request needs to authenticate
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub cookies: Vec<Cookie>,
    pub session_token: String,
    pub upload_url: String,
}

impl Credentials {
    /// Value for the `Cookie` request header
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn validate(&self) -> Result<(), CredentialError> {
        if self.cookies.is_empty() {
            return Err(CredentialError::Invalid("no cookies".into()));
        }
        if let Some(cookie) = self.cookies.iter().find(|c| c.name.trim().is_empty()) {
            return Err(CredentialError::Invalid(format!(
                "cookie with empty name (domain: {:?})",
                cookie.domain
            )));
        }
        if self.session_token.trim().is_empty() {
            return Err(CredentialError::Invalid("empty session token".into()));
        }
        if !(self.upload_url.starts_with("https://") || self.upload_url.starts_with("http://")) {
            return Err(CredentialError::Invalid(format!(
                "upload URL '{}' is not an http(s) URL",
                self.upload_url
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("cookies", &self.cookies)
            .field("session_token", &"<redacted>")
            .field("upload_url", &self.upload_url)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("can't read auth file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't parse auth file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid credentials: {0}")]
    Invalid(String),
}

/// Source of upload credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, CredentialError>;
}

/// Reads credentials from a JSON auth file
#[derive(Debug, Clone)]
pub struct FileCredentialProvider {
    path: PathBuf,
}

impl FileCredentialProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialProvider {
    async fn credentials(&self) -> Result<Credentials, CredentialError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| CredentialError::Read {
                path: self.path.clone(),
                source,
            })?;

        let credentials: Credentials =
            serde_json::from_str(&text).map_err(|source| CredentialError::Parse {
                path: self.path.clone(),
                source,
            })?;

        credentials.validate()?;
        Ok(credentials)
    }
}

/// Load credentials from `auth_file`, asking for another file on failure
///
/// Each failure asks the operator whether to try a different auth file.
/// Declining (or closing the input) is a fatal error.
pub async fn load_with_recovery<R>(auth_file: &Path, input: &mut R) -> Result<Credentials>
where
    R: AsyncBufRead + Unpin,
{
    let mut path = auth_file.to_path_buf();

    loop {
        let provider = FileCredentialProvider::new(&path);
        let error = match provider.credentials().await {
            Ok(credentials) => {
                info!("Loaded credentials from {}", path.display());
                return Ok(credentials);
            }
            Err(e) => e,
        };

        warn!("Can't use {} as auth file: {}", path.display(), error);
        println!("The uploader can't continue without valid credentials.");
        println!("Would you like to load credentials from a different auth file? [yes/no]");

        let answer = read_answer(input).await?;
        if !answer.to_ascii_lowercase().starts_with('y') {
            bail!("It's not possible to continue without valid credentials ({})", error);
        }

        println!("Path to the auth file:");
        let next = read_answer(input).await?;
        if next.is_empty() {
            bail!("No auth file given");
        }
        path = PathBuf::from(next);
    }
}

async fn read_answer<R>(input: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    input.read_line(&mut line).await?;
    Ok(line.trim().to_string())
}
