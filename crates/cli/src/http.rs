//! HTTP upload adapter

use crate::auth::Credentials;
use async_trait::async_trait;
use pipeline::{UploadError, UploadOperation};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use shutter_core::AlbumTarget;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

const SESSION_TOKEN_HEADER: &str = "X-Session-Token";
const FILE_NAME_HEADER: &str = "X-File-Name";
/// Longest response body kept in a rejection error
const MAX_ERROR_BODY: usize = 512;

/// Streams files to the upload endpoint named in the credentials
pub struct HttpUploader {
    client: reqwest::Client,
    credentials: Credentials,
}

impl HttpUploader {
    pub fn new(credentials: Credentials) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("shutter/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

#[async_trait]
impl UploadOperation for HttpUploader {
    async fn upload(&self, path: &Path, album: &AlbumTarget) -> Result<(), UploadError> {
        let io_error = |source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = tokio::fs::File::open(path).await.map_err(io_error)?;
        let len = file.metadata().await.map_err(io_error)?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut request = self
            .client
            .post(&self.credentials.upload_url)
            .header(COOKIE, self.credentials.cookie_header())
            .header(SESSION_TOKEN_HEADER, &self.credentials.session_token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, len)
            .header(FILE_NAME_HEADER, file_name);

        request = match album {
            AlbumTarget::None => request,
            AlbumTarget::Id(id) => request.query(&[("album_id", id)]),
            AlbumTarget::Name(name) => request.query(&[("album_name", name)]),
        };

        debug!("POST {} ({} bytes)", path.display(), len);
        let response = request
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        Err(UploadError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
