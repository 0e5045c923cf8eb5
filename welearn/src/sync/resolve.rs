use std::path::{Path, PathBuf};

use moodle_core::FileContent;
use thiserror::Error;

use super::paths::{PathError, join_segments};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{filename}: no extension and no known extension for mime type {mime_type:?}")]
    UnknownExtension {
        filename: String,
        mime_type: Option<String>,
    },
    #[error("{filename}: {source}")]
    Path {
        filename: String,
        #[source]
        source: PathError,
    },
}

/// One remote downloadable file, with the name and location it gets on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub filename: String,
    pub file_url: String,
    pub mime_type: Option<String>,
    pub last_modified: i64,
    pub course_name: String,
    pub subfolders: Vec<String>,
    /// Uppercased, without the dot. Never empty.
    pub extension: String,
    pub file_size: Option<u64>,
    relative_path: PathBuf,
}

impl ResourceDescriptor {
    /// Course + subfolders + filename, relative to the destination prefix.
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn short_path(&self) -> String {
        self.relative_path.display().to_string()
    }

    pub fn destination(&self, prefix: &Path) -> PathBuf {
        prefix.join(&self.relative_path)
    }
}

pub fn resolve(
    file: &FileContent,
    course: &str,
    subfolders: &[String],
) -> Result<ResourceDescriptor, ResolveError> {
    let mime_type = file
        .mimetype
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    let (filename, extension) = match split_extension(&file.filename) {
        Some(ext) => (file.filename.clone(), ext.to_uppercase()),
        None => {
            let guessed = mime_type
                .as_deref()
                .and_then(extension_for_mime)
                .ok_or_else(|| ResolveError::UnknownExtension {
                    filename: file.filename.clone(),
                    mime_type: mime_type.clone(),
                })?;
            (
                format!("{}.{guessed}", file.filename),
                guessed.to_uppercase(),
            )
        }
    };

    let subfolders: Vec<String> = subfolders
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let path_err = |source: PathError| ResolveError::Path {
        filename: filename.clone(),
        source,
    };
    let relative_path = join_segments(
        Path::new(""),
        std::iter::once(course)
            .chain(subfolders.iter().map(String::as_str))
            .chain(std::iter::once(filename.as_str())),
    )
    .map_err(path_err)?;

    Ok(ResourceDescriptor {
        file_url: file.fileurl.clone(),
        mime_type,
        last_modified: file.timemodified.unwrap_or_default(),
        course_name: course.to_string(),
        subfolders,
        extension,
        file_size: file.filesize.filter(|size| *size > 0),
        relative_path,
        filename,
    })
}

/// Text after the last dot of the file name, if any. Leading dots (`.bashrc`)
/// do not start an extension.
fn split_extension(filename: &str) -> Option<&str> {
    let stem_start = filename.len() - filename.trim_start_matches('.').len();
    let (_, ext) = filename[stem_start..].rsplit_once('.')?;
    Some(ext).filter(|ext| !ext.is_empty())
}

/// Canonical extension for a content type. Common types use a fixed preference
/// because `mime_guess` lists candidates alphabetically (`text/plain` -> `asc`).
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let preferred = match essence.as_str() {
        "application/pdf" => Some("pdf"),
        "text/plain" => Some("txt"),
        "text/html" => Some("html"),
        "text/csv" => Some("csv"),
        "application/zip" | "application/x-zip-compressed" => Some("zip"),
        "application/msword" => Some("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "application/vnd.ms-powerpoint" => Some("ppt"),
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            Some("pptx")
        }
        "application/vnd.ms-excel" => Some("xls"),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some("xlsx"),
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "video/mp4" => Some("mp4"),
        "audio/mpeg" => Some("mp3"),
        "application/x-ipynb+json" => Some("ipynb"),
        _ => None,
    };
    preferred.or_else(|| {
        mime_guess::get_mime_extensions_str(&essence).and_then(|exts| exts.first().copied())
    })
}
