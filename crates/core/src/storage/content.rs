//! Content inspection shared by the adapters.

use std::path::Path;

use md5::{Digest, Md5};
use tokio::fs;
use tokio::io::AsyncReadExt;

/// Bytes sampled from the head of a file for type sniffing.
pub const SNIFF_LEN: usize = 8 * 1024;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Computes the lowercase hex MD5 of a file, streaming it in 64KB chunks.
pub async fn md5_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Reads up to [`SNIFF_LEN`] bytes from the start of a file.
pub async fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(head)
}

/// Decides the MIME type to persist for uploaded content.
///
/// A recognized binary signature wins over the client's declaration, which
/// wins over a guess from the file name.
#[must_use]
pub fn resolve_mime(head: &[u8], declared: &str, original_name: &str) -> String {
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }

    let declared = declared.trim();
    if !declared.is_empty() && declared != FALLBACK_MIME {
        return declared.to_string();
    }

    mime_guess::from_path(original_name)
        .first_raw()
        .unwrap_or(FALLBACK_MIME)
        .to_string()
}
