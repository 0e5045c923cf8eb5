use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub fn is_archive(extension: &str) -> bool {
    extension.eq_ignore_ascii_case("zip")
}

/// `Week 1/slides.zip` -> `Week 1/slides/`.
pub fn expansion_dir(archive: &Path) -> PathBuf {
    archive.with_extension("")
}

/// Expands `archive` next to itself. Returns the directory and the number of
/// files written.
pub async fn expand(archive: &Path) -> Result<(PathBuf, usize), ArchiveError> {
    let archive = archive.to_path_buf();
    tokio::task::spawn_blocking(move || expand_blocking(&archive)).await?
}

fn expand_blocking(archive: &Path) -> Result<(PathBuf, usize), ArchiveError> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    let dest = expansion_dir(archive);
    std::fs::create_dir_all(&dest)?;

    let mut written = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(
                archive = %archive.display(),
                entry = entry.name(),
                "skipping archive entry outside the extraction directory"
            );
            continue;
        };
        let out = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;
        written += 1;
    }
    tracing::debug!(archive = %archive.display(), files = written, "archive expanded");
    Ok((dest, written))
}
