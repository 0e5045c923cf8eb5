use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path segment is empty")]
    Empty,
    #[error("path segment {0:?} contains unsupported component")]
    UnsupportedComponent(String),
}

/// Appends a single remote-supplied name (course, folder or file name) under `root`.
/// Names may contain `/`; each part becomes a directory level. Anything that would
/// leave `root` is rejected.
pub fn push_segment(root: &mut PathBuf, segment: &str) -> Result<(), PathError> {
    let segment = segment.trim();
    if segment.is_empty() {
        return Err(PathError::Empty);
    }
    let mut pushed = false;
    for component in Path::new(segment).components() {
        match component {
            Component::Normal(part) => {
                root.push(part);
                pushed = true;
            }
            Component::CurDir => continue,
            Component::RootDir | Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent(segment.to_string()));
            }
        }
    }
    if !pushed {
        return Err(PathError::Empty);
    }
    Ok(())
}

pub fn join_segments<'a, I>(root: &Path, segments: I) -> Result<PathBuf, PathError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = root.to_path_buf();
    for segment in segments {
        push_segment(&mut out, segment)?;
    }
    Ok(out)
}

/// `report.pdf` + `tmp` -> `report.pdf.tmp`, `.link_cache` + `tmp` -> `.link_cache.tmp`.
pub fn sibling_with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    target.with_file_name(name)
}

/// In-flight download file for `target`. `nonce` keeps concurrent writers to
/// the same destination apart.
pub fn partial_path(target: &Path, nonce: u64) -> PathBuf {
    sibling_with_suffix(target, &format!("{nonce:016x}.partial"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-flight download files directly inside `dir`.
    pub(crate) fn partials_in(dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "partial"))
            .collect()
    }

    #[test]
    fn joins_course_and_folder_under_root() {
        let root = PathBuf::from("/downloads");
        let mapped = join_segments(&root, ["MA1101", " Week 1 ", "notes.pdf"]).unwrap();
        assert_eq!(mapped, PathBuf::from("/downloads/MA1101/Week 1/notes.pdf"));
    }

    #[test]
    fn rejects_parent_dir() {
        let root = PathBuf::from("/downloads");
        assert!(matches!(
            join_segments(&root, ["MA1101", "../secret"]),
            Err(PathError::UnsupportedComponent(_))
        ));
        assert!(matches!(
            join_segments(&root, ["/etc"]),
            Err(PathError::UnsupportedComponent(_))
        ));
    }

    #[test]
    fn rejects_blank_segment() {
        let root = PathBuf::from("/downloads");
        assert_eq!(join_segments(&root, ["  "]), Err(PathError::Empty));
    }

    #[test]
    fn partial_path_keeps_full_name() {
        assert_eq!(
            partial_path(Path::new("/d/report.pdf"), 0xab),
            PathBuf::from("/d/report.pdf.00000000000000ab.partial")
        );
        assert_ne!(
            partial_path(Path::new("/d/report.pdf"), 1),
            partial_path(Path::new("/d/report.pdf"), 2)
        );
    }
}
