//! Content-addressed image storage.
//!
//! Files are named `{unix_ts}_{sha256[:12]}.{ext}` where the extension is
//! sniffed from the bytes. Identical content deduplicates: if a file with
//! the same hash suffix already exists, its name is reused and nothing is
//! written.

use crossbar_tools::canonical::sha256_hex;
use std::io;
use std::path::Path;

/// Result of persisting one image.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub filename: String,
    /// Full lowercase hex SHA-256 of the bytes.
    pub sha256: String,
    pub mime: &'static str,
}

/// Sniff MIME type and extension from magic bytes.
#[must_use]
pub fn sniff_image(bytes: &[u8]) -> (&'static str, &'static str) {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        ("image/png", "png")
    } else if bytes.starts_with(b"\xff\xd8\xff") {
        ("image/jpeg", "jpg")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        ("image/webp", "webp")
    } else if looks_like_svg(bytes) {
        ("image/svg+xml", "svg")
    } else {
        ("application/octet-stream", "bin")
    }
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    let Ok(text) = std::str::from_utf8(head) else {
        return false;
    };
    let trimmed = text.trim_start();
    trimmed.starts_with("<svg") || trimmed.starts_with("<?xml")
}

/// Persist image bytes into `dir`, deduplicating on content hash.
pub fn store_image(dir: &Path, bytes: &[u8]) -> io::Result<StoredImage> {
    std::fs::create_dir_all(dir)?;

    let sha256 = sha256_hex(bytes);
    let (mime, ext) = sniff_image(bytes);
    let suffix = format!("_{}.{ext}", &sha256[..12]);

    // Same hash ⇒ same bytes; reuse the earlier file regardless of its
    // timestamp prefix.
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(&suffix) {
                    return Ok(StoredImage {
                        filename: name.to_string(),
                        sha256,
                        mime,
                    });
                }
            }
        }
    }

    let filename = format!("{}{suffix}", chrono::Utc::now().timestamp());
    std::fs::write(dir.join(&filename), bytes)?;
    Ok(StoredImage {
        filename,
        sha256,
        mime,
    })
}

/// MIME for serving a stored file, from its extension.
#[must_use]
pub fn mime_for_extension(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
