//! Configuration surface: command-line flags layered over an optional TOML file

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use shutter_core::AlbumTarget;
use std::path::{Path, PathBuf};
use std::time::Duration;
use watcher::{IgnoreConfig, DEFAULT_EVENT_DELAY};

/// Shutter - upload photos and videos, then keep watching for new ones
#[derive(Debug, Parser)]
#[command(name = "shutter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub args: UploadArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show upload status counts and files that still need uploading
    Status {
        /// List every file that is not uploaded yet, not only failures
        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct UploadArgs {
    /// TOML file supplying defaults for every flag below
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Auth file with cookies, session token and upload URL (default: auth.json)
    #[arg(long, value_name = "FILE")]
    pub auth: Option<PathBuf>,

    /// File or directory to upload (repeatable)
    #[arg(long = "upload", value_name = "PATH")]
    pub uploads: Vec<PathBuf>,

    /// Add uploads to the album with this id
    #[arg(long = "album", value_name = "ID", conflicts_with = "album_name")]
    pub album_id: Option<String>,

    /// Add uploads to the album with this name
    #[arg(long = "album-name", value_name = "NAME")]
    pub album_name: Option<String>,

    /// Uploads in flight at once (default: 1)
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Directory to watch for new files (repeatable)
    #[arg(long = "watch", value_name = "DIR")]
    pub watch: Vec<PathBuf>,

    /// Also watch subdirectories (default: true)
    #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
    pub watch_recursively: Option<bool>,

    /// Seconds a file must stay quiet before it is uploaded (default: 3)
    #[arg(long, value_name = "SECS")]
    pub event_delay: Option<u64>,

    /// Regular expression; matching paths are skipped (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// Retry every known file that has not been uploaded successfully
    #[arg(long)]
    pub reupload: bool,

    /// Upload every file, not only images and videos
    #[arg(long)]
    pub all_files: bool,

    /// Status database directory
    #[arg(long, value_name = "DIR", global = true)]
    pub db: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,
}

/// Contents of the optional TOML config file
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub auth: Option<PathBuf>,
    pub uploads: Vec<PathBuf>,
    pub album_id: Option<String>,
    pub album_name: Option<String>,
    pub max_concurrent: Option<usize>,
    pub watch: Vec<PathBuf>,
    pub watch_recursively: Option<bool>,
    pub event_delay_secs: Option<u64>,
    pub ignore: Vec<String>,
    pub use_builtin_ignores: Option<bool>,
    pub reupload: Option<bool>,
    pub media_only: Option<bool>,
    pub db: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub auth_file: PathBuf,
    pub uploads: Vec<PathBuf>,
    pub album: AlbumTarget,
    pub max_concurrent: usize,
    pub watch: Vec<PathBuf>,
    pub watch_recursively: bool,
    pub event_delay: Duration,
    pub ignore: IgnoreConfig,
    pub reupload: bool,
    pub media_only: bool,
    pub db_dir: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    /// Read the config file named by `--config` (if any) and merge the flags over it
    pub fn resolve(args: &UploadArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    /// Flags win over file values; list flags are appended to the file's lists
    pub fn merge(args: &UploadArgs, file: FileConfig) -> Result<Self> {
        // An album given on the command line replaces the file's album entirely
        let album = if args.album_id.is_some() || args.album_name.is_some() {
            AlbumTarget::from_options(args.album_id.clone(), args.album_name.clone())
        } else {
            AlbumTarget::from_options(file.album_id, file.album_name)
        };

        let mut uploads = file.uploads;
        uploads.extend(args.uploads.iter().cloned());

        let mut watch = file.watch;
        watch.extend(args.watch.iter().cloned());

        let mut patterns = file.ignore;
        patterns.extend(args.ignore.iter().cloned());

        let max_concurrent = args.max_concurrent.or(file.max_concurrent).unwrap_or(1);
        if max_concurrent == 0 {
            bail!("max_concurrent must be at least 1");
        }

        let event_delay = args
            .event_delay
            .or(file.event_delay_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_EVENT_DELAY);

        let media_only = if args.all_files {
            false
        } else {
            file.media_only.unwrap_or(true)
        };

        Ok(Self {
            auth_file: args
                .auth
                .clone()
                .or(file.auth)
                .unwrap_or_else(|| PathBuf::from("auth.json")),
            uploads,
            album,
            max_concurrent,
            watch,
            watch_recursively: args
                .watch_recursively
                .or(file.watch_recursively)
                .unwrap_or(true),
            event_delay,
            ignore: IgnoreConfig {
                use_builtin: file.use_builtin_ignores.unwrap_or(true),
                patterns,
            },
            reupload: args.reupload || file.reupload.unwrap_or(false),
            media_only,
            db_dir: args
                .db
                .clone()
                .or(file.db)
                .unwrap_or_else(default_db_dir),
            log_file: args.log_file.clone().or(file.log_file),
        })
    }

    pub fn is_watching(&self) -> bool {
        !self.watch.is_empty()
    }
}

/// `<data dir>/shutter`, or `.shutter` when the platform has no data dir
pub fn default_db_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("shutter"))
        .unwrap_or_else(|| PathBuf::from(".shutter"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("shutter").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert!(cli.command.is_none());

        let settings = Settings::merge(&cli.args, FileConfig::default()).unwrap();
        assert_eq!(settings.auth_file, PathBuf::from("auth.json"));
        assert_eq!(settings.max_concurrent, 1);
        assert_eq!(settings.event_delay, Duration::from_secs(3));
        assert!(settings.watch_recursively);
        assert!(settings.media_only);
        assert!(!settings.reupload);
        assert!(!settings.is_watching());
        assert_eq!(settings.album, AlbumTarget::None);
        assert!(settings.ignore.use_builtin);
    }

    #[test]
    fn test_flags_parse() {
        let cli = parse(&[
            "--upload",
            "/photos/a.jpg",
            "--upload",
            "/photos/trip",
            "--album-name",
            "Trip",
            "--max-concurrent",
            "4",
            "--watch",
            "/photos/incoming",
            "--watch-recursively",
            "false",
            "--event-delay",
            "10",
            "--ignore",
            r"\.raw$",
            "--reupload",
        ]);

        let settings = Settings::merge(&cli.args, FileConfig::default()).unwrap();
        assert_eq!(settings.uploads.len(), 2);
        assert_eq!(settings.album, AlbumTarget::Name("Trip".into()));
        assert_eq!(settings.max_concurrent, 4);
        assert_eq!(settings.watch, vec![PathBuf::from("/photos/incoming")]);
        assert!(!settings.watch_recursively);
        assert_eq!(settings.event_delay, Duration::from_secs(10));
        assert_eq!(settings.ignore.patterns, vec![r"\.raw$".to_string()]);
        assert!(settings.reupload);
    }

    #[test]
    fn test_album_flags_conflict() {
        let result = Cli::try_parse_from(["shutter", "--album", "abc", "--album-name", "Trip"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_status_subcommand() {
        let cli = parse(&["--db", "/tmp/db", "status", "--all"]);
        assert!(matches!(cli.command, Some(Commands::Status { all: true })));
        assert_eq!(cli.args.db, Some(PathBuf::from("/tmp/db")));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            auth = "/etc/shutter/auth.json"
            album_id = "from-file"
            max_concurrent = 2
            event_delay_secs = 5
            watch = ["/photos/camera"]
            ignore = ['\.tmp\.jpg$']
            use_builtin_ignores = false
            "#,
        )
        .unwrap();

        let cli = parse(&[
            "--album-name",
            "Flag",
            "--max-concurrent",
            "8",
            "--watch",
            "/photos/phone",
            "--ignore",
            "/drafts/",
        ]);
        let settings = Settings::merge(&cli.args, file).unwrap();

        assert_eq!(settings.auth_file, PathBuf::from("/etc/shutter/auth.json"));
        assert_eq!(settings.album, AlbumTarget::Name("Flag".into()));
        assert_eq!(settings.max_concurrent, 8);
        assert_eq!(settings.event_delay, Duration::from_secs(5));
        assert_eq!(
            settings.watch,
            vec![PathBuf::from("/photos/camera"), PathBuf::from("/photos/phone")]
        );
        assert_eq!(
            settings.ignore.patterns,
            vec![r"\.tmp\.jpg$".to_string(), "/drafts/".to_string()]
        );
        assert!(!settings.ignore.use_builtin);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let cli = parse(&["--max-concurrent", "0"]);
        assert!(Settings::merge(&cli.args, FileConfig::default()).is_err());

        let file = FileConfig {
            max_concurrent: Some(0),
            ..Default::default()
        };
        assert!(Settings::merge(&UploadArgs::default(), file).is_err());
    }

    #[test]
    fn test_all_files_disables_media_filter() {
        let file = FileConfig {
            media_only: Some(true),
            ..Default::default()
        };
        let cli = parse(&["--all-files"]);
        assert!(!Settings::merge(&cli.args, file).unwrap().media_only);
    }

    #[test]
    fn test_resolve_reads_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = temp_dir.path().join("shutter.toml");
        std::fs::write(&config, "reupload = true\nmedia_only = false\n").unwrap();

        let cli = parse(&["--config", config.to_str().unwrap()]);
        let settings = Settings::resolve(&cli.args).unwrap();
        assert!(settings.reupload);
        assert!(!settings.media_only);
    }

    #[test]
    fn test_unknown_config_key_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = temp_dir.path().join("shutter.toml");
        std::fs::write(&config, "max_concurency = 3\n").unwrap();

        assert!(FileConfig::load(&config).is_err());
    }
}
