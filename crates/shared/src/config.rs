//! Application configuration management.

use std::path::PathBuf;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Storage backend configuration.
    pub storage: StorageSettings,
    /// Local cache configuration.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Image derivation configuration.
    #[serde(default)]
    pub image: ImageSettings,
    /// Upload validation configuration.
    #[serde(default)]
    pub upload: UploadSettings,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Which backend holds the bytes.
    pub provider: StorageProvider,
    /// Upper bound for a single remote backend call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

/// Storage provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageProvider {
    /// Local filesystem directory.
    LocalFs {
        /// Absolute root directory path.
        root: PathBuf,
    },
    /// Azure Blob Storage
    AzureBlob {
        /// Azure storage account name.
        account: String,
        /// Azure storage access key.
        access_key: String,
        /// Azure container name.
        container: String,
        /// Endpoint override (e.g. an Azurite emulator URL).
        #[serde(default)]
        endpoint: Option<String>,
    },
    /// S3-compatible storage: Cloudflare R2, Supabase, AWS S3, DigitalOcean Spaces
    S3 {
        /// S3 endpoint URL.
        endpoint: String,
        /// S3 bucket name.
        bucket: String,
        /// AWS access key ID.
        access_key_id: String,
        /// AWS secret access key.
        secret_access_key: String,
        /// AWS region.
        region: String,
    },
}

impl StorageProvider {
    /// Create local filesystem provider.
    #[must_use]
    pub fn local_fs(root: impl Into<PathBuf>) -> Self {
        Self::LocalFs { root: root.into() }
    }

    /// Get the provider name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::LocalFs { .. } => "local",
            Self::AzureBlob { .. } => "azure_blob",
            Self::S3 { .. } => "s3",
        }
    }
}

/// Local cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Root directory for downloaded originals and derived images.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Metadata cache entry lifetime in seconds.
    #[serde(default = "default_metadata_ttl")]
    pub metadata_ttl_secs: u64,
    /// Interval between metadata cache sweeps in seconds.
    #[serde(default = "default_metadata_sweep")]
    pub metadata_sweep_secs: u64,
    /// Maximum number of cached metadata records.
    #[serde(default = "default_metadata_capacity")]
    pub metadata_capacity: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/localcache")
}

fn default_metadata_ttl() -> u64 {
    600 // 10 minutes
}

fn default_metadata_sweep() -> u64 {
    60
}

fn default_metadata_capacity() -> u64 {
    10_000
}

impl CacheSettings {
    /// Directory holding materialized copies of remote objects.
    #[must_use]
    pub fn files_dir(&self) -> PathBuf {
        self.dir.join("files")
    }

    /// Directory holding derived image variants.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.dir.join("images")
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            metadata_ttl_secs: default_metadata_ttl(),
            metadata_sweep_secs: default_metadata_sweep(),
            metadata_capacity: default_metadata_capacity(),
        }
    }
}

/// Image derivation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageSettings {
    /// Largest width or height a derived image may have, in pixels.
    #[serde(default = "default_max_image_size")]
    pub max_size: u32,
    /// Directory containing `<type>.png` file-type icons.
    #[serde(default = "default_icons_dir")]
    pub icons_dir: PathBuf,
    /// Image served when a file does not exist or cannot be processed.
    #[serde(default)]
    pub no_image_path: Option<PathBuf>,
    /// Image served for files with no matching icon.
    #[serde(default)]
    pub blank_path: Option<PathBuf>,
}

fn default_max_image_size() -> u32 {
    1600
}

fn default_icons_dir() -> PathBuf {
    PathBuf::from("icons")
}

impl ImageSettings {
    /// Resolved path of the "no image" placeholder.
    #[must_use]
    pub fn no_image_path(&self) -> PathBuf {
        self.no_image_path
            .clone()
            .unwrap_or_else(|| self.icons_dir.join("_no-image.png"))
    }

    /// Resolved path of the "blank" placeholder.
    #[must_use]
    pub fn blank_path(&self) -> PathBuf {
        self.blank_path
            .clone()
            .unwrap_or_else(|| self.icons_dir.join("_blank.png"))
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            max_size: default_max_image_size(),
            icons_dir: default_icons_dir(),
            no_image_path: None,
            blank_path: None,
        }
    }
}

/// Upload validation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    /// Permitted file type tokens (lowercase extensions).
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    /// Maximum upload size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_file_size() -> u64 {
    20 * 1024 * 1024
}

/// Default upload allow-list: images, archives, media, office documents and text.
#[must_use]
pub fn default_allowed_types() -> Vec<String> {
    [
        // Images
        "jpeg", "jpg", "jfif", "png", "gif", "webp", "flif", "tif", "tiff", "bmp", "svg", "jp2",
        "jpm", "jpx", // Archives
        "zip", "tar", "gz", "bz2", "7z", // Media
        "mp4", "ogg", "mkv", "webm", "mov", "avi", "mp3", "wav", // Documents
        "pdf", "rtf", "docx", "pptx", "xlsx", "doc", "ppt", "xls", "odt", "ods", "odp",
        // Text
        "xml", "ics", "txt", "log", "json",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            allowed_types: default_allowed_types(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
    /// then `DEPOT__SECTION__KEY` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("DEPOT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("upload.allowed_types")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
