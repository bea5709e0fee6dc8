//! Depot command line front end.
//!
//! Runs one file service operation against the configured backend and prints
//! the result as JSON on stdout. Logs go to stderr.
//!
//! Usage: depot <command> [args]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use depot_core::types::sanitize_disposition_filename;
use depot_core::{
    DerivedImage, FileError, FileMetaResponse, FileService, FitMode, ProvidedFile,
    TransformOptions, UploadedFile,
};
use depot_shared::{AppConfig, AppError, FileId};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "depot=debug,depot_core=debug";

#[derive(Debug, Parser)]
#[command(name = "depot", version, about = "Store, fetch and derive files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a local file under a fresh id.
    Upload {
        /// File to store. It is copied, never moved.
        path: PathBuf,
        /// Name to record instead of the file name.
        #[arg(long)]
        name: Option<String>,
        /// Declared MIME type.
        #[arg(long, default_value = "")]
        mime: String,
    },
    /// Print the metadata of a file.
    Meta {
        /// File id.
        id: FileId,
    },
    /// Make a file available locally and print its path.
    Fetch {
        /// File id.
        id: FileId,
        /// Directory to copy the file into, under its original name.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Derive an image representation of a file.
    Image {
        /// File id.
        id: FileId,
        /// Target width in pixels.
        #[arg(long)]
        width: Option<u32>,
        /// Target height in pixels.
        #[arg(long)]
        height: Option<u32>,
        /// Background colour as `rrggbb`.
        #[arg(long)]
        bg: Option<String>,
        /// Fit mode: cover, contain, fill, inside or outside.
        #[arg(long, default_value = "contain")]
        fit: FitMode,
        /// Directory to copy the result into.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Duplicate a file under a fresh id.
    Copy {
        /// File id.
        id: FileId,
    },
    /// Delete a file.
    Delete {
        /// File id.
        id: FileId,
    },
    /// Check whether a file exists.
    Exists {
        /// File id.
        id: FileId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match execute(cli.command).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            let err = classify(err);
            eprintln!(
                "{}",
                json!({ "error": err.error_code(), "message": err.to_string() })
            );
            std::process::exit(1);
        }
    }
}

async fn execute(command: Command) -> anyhow::Result<serde_json::Value> {
    let config = AppConfig::load().map_err(|e| AppError::Configuration(e.to_string()))?;
    let service = FileService::from_config(&config).await?;
    run(&service, command).await
}

/// Maps a failure onto the boundary error reported to the operator.
fn classify(err: anyhow::Error) -> AppError {
    let err = match err.downcast::<FileError>() {
        Ok(err) => return AppError::from(err),
        Err(err) => err,
    };
    match err.downcast::<AppError>() {
        Ok(err) => err,
        Err(err) => AppError::Internal(format!("{err:#}")),
    }
}

async fn run(service: &FileService, command: Command) -> anyhow::Result<serde_json::Value> {
    let value = match command {
        Command::Upload { path, name, mime } => {
            let upload = stage(&path, name, mime).await?;
            let meta = service.create_file_from_upload(&upload).await?;
            info!(file_id = %meta.id, "stored {}", path.display());
            serde_json::to_value(&meta)?
        }
        Command::Meta { id } => {
            let meta = service.get_file_meta(id).await?;
            serde_json::to_value(FileMetaResponse::from(&meta))?
        }
        Command::Fetch { id, out } => {
            let file = service.provide_local_file(id).await?;
            let path = export(&file, out.as_deref()).await?;
            provided_json(&file, &path)
        }
        Command::Image {
            id,
            width,
            height,
            bg,
            fit,
            out,
        } => {
            let options = TransformOptions {
                width,
                height,
                background_color: bg,
                fit_mode: fit,
            };
            let derived = service.provide_local_image(id, &options).await?;
            let path = export(derived.file(), out.as_deref()).await?;
            let mut value = provided_json(derived.file(), &path);
            if let DerivedImage::Substituted { reason, .. } = &derived {
                value["substituted"] = json!(format!("{reason:?}"));
            }
            value
        }
        Command::Copy { id } => serde_json::to_value(service.copy_file(id).await?)?,
        Command::Delete { id } => {
            service.delete_file(id).await?;
            json!({ "deleted": id })
        }
        Command::Exists { id } => json!({ "id": id, "exists": service.exists(id).await? }),
    };
    Ok(value)
}

/// Copies `path` to a private staging file, which the service consumes.
async fn stage(path: &Path, name: Option<String>, mime: String) -> anyhow::Result<UploadedFile> {
    let original_name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("upload path has no file name")?,
    };

    let staged = std::env::temp_dir().join(format!("depot-upload-{}", FileId::new()));
    let size = tokio::fs::copy(path, &staged)
        .await
        .with_context(|| format!("cannot stage {}", path.display()))?;

    Ok(UploadedFile {
        path: staged,
        original_name,
        declared_mime: mime,
        declared_size: size,
    })
}

/// Copies a served file into `out` under a header-safe name, if requested.
async fn export(file: &ProvidedFile, out: Option<&Path>) -> anyhow::Result<PathBuf> {
    let Some(dir) = out else {
        return Ok(file.local_path.clone());
    };

    let mut name = sanitize_disposition_filename(&file.metadata.original_name);
    if name.is_empty() {
        name = file.metadata.id.to_string();
    }
    let target = dir.join(name);
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::copy(&file.local_path, &target)
        .await
        .with_context(|| format!("cannot write {}", target.display()))?;
    Ok(target)
}

fn provided_json(file: &ProvidedFile, path: &Path) -> serde_json::Value {
    json!({
        "metadata": FileMetaResponse::from(&file.metadata),
        "size": file.metadata.size,
        "iat": file.metadata.iat,
        "path": path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::EnvFilter;

    #[test]
    fn test_default_log_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert!(DEFAULT_LOG_FILTER.contains("depot_core=debug"));
    }

    #[test]
    fn test_image_arguments() {
        let cli = Cli::try_parse_from([
            "depot",
            "image",
            "6ba7b810-9dad-41d1-80b4-00c04fd430c8",
            "--width",
            "0",
            "--fit",
            "cover",
        ])
        .unwrap();
        let Command::Image { width, fit, .. } = cli.command else {
            panic!("expected the image command");
        };
        assert_eq!(width, Some(0));
        assert_eq!(fit, FitMode::Cover);
    }

    #[test]
    fn test_malformed_id_is_rejected() {
        assert!(Cli::try_parse_from(["depot", "meta", "../etc/passwd"]).is_err());
    }

    #[test]
    fn test_classify_maps_service_errors() {
        let not_found = classify(FileError::not_found(FileId::new()).into());
        assert_eq!(not_found.error_code(), "NOT_FOUND");

        let config = classify(AppError::Configuration("missing provider".to_string()).into());
        assert_eq!(config.error_code(), "CONFIGURATION_ERROR");

        let other = classify(anyhow::anyhow!("disk on fire"));
        assert_eq!(other.error_code(), "INTERNAL_ERROR");
    }
}
