//! Mapping between corpus files and item ids.
//!
//! An item's id is its path relative to the corpus root, `/`-separated,
//! computed once at ingestion. The serving layer turns an id into a URL by
//! prefixing the static mount point, so ids never depend on where the corpus
//! happens to live on the build machine.

use crate::error::{Result, SearchError};
use crate::forest::ItemId;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// File extensions treated as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Whether `path` has one of [`IMAGE_EXTENSIONS`].
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// All image files under `root`, sorted by path for deterministic builds.
pub fn discover_images(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    tracing::debug!(root = %root.display(), found = paths.len(), "discovered images");
    Ok(paths)
}

/// `path` relative to `root`, as a `/`-separated string.
///
/// # Errors
///
/// [`SearchError::Config`] if `path` is not strictly inside `root`, contains
/// `..`, or is not valid UTF-8.
pub fn relative_asset_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        SearchError::config(format!(
            "{} is not under corpus root {}",
            path.display(),
            root.display()
        ))
    })?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                SearchError::config(format!("{} is not valid UTF-8", path.display()))
            })?),
            Component::CurDir => {}
            _ => {
                return Err(SearchError::config(format!(
                    "{} escapes corpus root {}",
                    path.display(),
                    root.display()
                )))
            }
        }
    }
    if parts.is_empty() {
        return Err(SearchError::config(format!(
            "{} names the corpus root itself",
            path.display()
        )));
    }
    Ok(parts.join("/"))
}

/// Item id for a corpus file.
pub fn item_id(root: &Path, path: &Path) -> Result<ItemId> {
    relative_asset_path(root, path).map(ItemId::from)
}

/// Public URL for an item id: `{static_prefix}/{relative path}`.
pub fn asset_url(static_prefix: &str, id: &ItemId) -> String {
    format!("{}/{}", static_prefix.trim_end_matches('/'), id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_uses_forward_slashes() {
        let root = Path::new("data").join("raw");
        let path = root.join("dogs").join("001.JPG");
        assert_eq!(relative_asset_path(&root, &path).unwrap(), "dogs/001.JPG");
    }

    #[test]
    fn root_depth_does_not_matter() {
        let shallow = Path::new("raw");
        let deep = Path::new("/srv/app/data/raw");
        assert_eq!(
            relative_asset_path(shallow, &shallow.join("a/b.png")).unwrap(),
            relative_asset_path(deep, &deep.join("a/b.png")).unwrap(),
        );
    }

    #[test]
    fn outside_root_is_rejected() {
        let err = relative_asset_path(Path::new("data/raw"), Path::new("data/other/x.png"));
        assert!(matches!(err, Err(SearchError::Config(_))));
        let err = relative_asset_path(Path::new("data/raw"), Path::new("data/raw"));
        assert!(matches!(err, Err(SearchError::Config(_))));
    }

    #[test]
    fn url_joins_prefix_once() {
        let id = ItemId::from("dogs/001.jpg");
        assert_eq!(asset_url("/static", &id), "/static/dogs/001.jpg");
        assert_eq!(asset_url("/static/", &id), "/static/dogs/001.jpg");
        assert_eq!(asset_url("", &id), "/dogs/001.jpg");
    }

    #[test]
    fn image_extension_check_ignores_case() {
        assert!(is_image(Path::new("a/b.PNG")));
        assert!(is_image(Path::new("b.Jpeg")));
        assert!(!is_image(Path::new("b.gif")));
        assert!(!is_image(Path::new("jpg")));
    }

    #[test]
    fn discovery_is_recursive_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::create_dir_all(root.join("a/nested")).unwrap();
        for name in ["b/2.png", "a/nested/1.JPG", "a/0.jpeg", "a/notes.txt"] {
            std::fs::write(root.join(name), b"").unwrap();
        }

        let ids: Vec<String> = discover_images(root)
            .unwrap()
            .iter()
            .map(|p| relative_asset_path(root, p).unwrap())
            .collect();
        assert_eq!(ids, vec!["a/0.jpeg", "a/nested/1.JPG", "b/2.png"]);
    }
}
