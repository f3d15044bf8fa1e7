//! Library half of the shutter binary, shared with the integration tests

pub mod auth;
pub mod cmd;
pub mod config;
pub mod http;
pub mod logging;
pub mod orchestrator;
pub mod util;

pub use auth::{CredentialProvider, Credentials, FileCredentialProvider};
pub use config::{Cli, Commands, FileConfig, Settings, UploadArgs};
pub use http::HttpUploader;
pub use orchestrator::{Orchestrator, Phase};
