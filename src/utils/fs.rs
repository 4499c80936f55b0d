//! File system utilities.

use crate::models::record::MediaType;
use crate::Result;
use std::path::Path;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "wmv", "m4v", "mts", "m2ts", "mkv", "3gp", "webm", "mpg", "mpeg",
];
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "tiff", "tif", "bmp", "heic", "heif", "webp",
];
const RAW_EXTENSIONS: &[&str] = &[
    "arw", "raw", "cr2", "cr3", "nef", "orf", "rw2", "dng", "raf", "srw", "pef",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aac", "flac", "m4a", "ogg"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "txt", "doc", "docx", "xls", "xlsx", "md"];

/// Check if a path exists and is a directory.
pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(crate::Error::PathNotFound(path.display().to_string()));
    }
    if !path.is_dir() {
        return Err(crate::Error::NotADirectory(path.display().to_string()));
    }
    Ok(())
}

/// Split a file name into base name and extension (without the dot).
///
/// Dot files such as `.hidden` have no extension.
pub fn split_file_name(name: &str) -> (String, String) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => {
            (name[..idx].to_string(), name[idx + 1..].to_string())
        }
        _ => (name.to_string(), String::new()),
    }
}

/// Normalize an extension from configuration (`.JPG` -> `jpg`).
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Guess the media type from an extension.
pub fn guess_media_type(extension: &str) -> MediaType {
    let ext = normalize_extension(extension);
    let ext = ext.as_str();

    if VIDEO_EXTENSIONS.contains(&ext) {
        MediaType::Video
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        MediaType::Image
    } else if RAW_EXTENSIONS.contains(&ext) {
        MediaType::Raw
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        MediaType::Audio
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        MediaType::Document
    } else {
        MediaType::Unknown
    }
}

/// Guess the MIME type from an extension.
pub fn guess_mime_type(extension: &str) -> &'static str {
    match normalize_extension(extension).as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "webp" => "image/webp",
        "dng" => "image/x-adobe-dng",
        "cr2" => "image/x-canon-cr2",
        "nef" => "image/x-nikon-nef",
        "arw" => "image/x-sony-arw",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "mts" | "m2ts" => "video/mp2t",
        "3gp" => "video/3gpp",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "xmp" => "application/rdf+xml",
        _ => "application/octet-stream",
    }
}
