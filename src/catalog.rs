//! # Image Catalog
//!
//! Lists the images of a source directory. Names are kept in directory
//! listing order, without the extension after their last dot. A directory is
//! assumed to hold a single image format; the first listed file decides the
//! extension and files with another extension are skipped with a warning.

use crate::error::{InjectionError, Result};
use log::{debug, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq)]
pub struct ImageCatalog {
    /// Directory the catalog was read from
    pub directory: PathBuf,
    /// Base names in listing order
    pub names: Vec<String>,
    /// Shared extension including the leading dot, e.g. ".png"
    pub extension: String,
}

/// Split a file name at its last dot into base name and extension, so
/// `frame.0001.png` gives `frame.0001` and `.png`.
fn split_name(file_name: &str) -> (String, String) {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map_or_else(|| file_name.to_string(), |stem| stem.to_string_lossy().into_owned());
    let extension = path
        .extension()
        .map_or_else(String::new, |ext| format!(".{}", ext.to_string_lossy()));
    (stem, extension)
}

impl ImageCatalog {
    /// Build a catalog from names already known to exist in `directory`.
    pub fn new(directory: impl Into<PathBuf>, names: Vec<String>, extension: &str) -> Self {
        Self {
            directory: directory.into(),
            names,
            extension: extension.to_string(),
        }
    }

    /// Read the catalog of `directory`.
    ///
    /// # Errors
    ///
    /// * `IOFailure` if the directory cannot be listed.
    /// * `EmptyCatalog` if it holds no image files.
    pub fn read(directory: &Path) -> Result<Self> {
        let entries = fs::read_dir(directory).map_err(|e| InjectionError::io(directory, e))?;

        let mut names = Vec::new();
        let mut extension: Option<String> = None;
        for entry in entries {
            let entry = entry.map_err(|e| InjectionError::io(directory, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| InjectionError::io(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            // Hidden files are never images of the data set
            if file_name.starts_with('.') {
                continue;
            }
            let (name, ext) = split_name(&file_name);
            match &extension {
                None => extension = Some(ext),
                Some(shared) if *shared != ext => {
                    warn!(
                        "Skip {} in {}: expected extension {:?}",
                        file_name,
                        directory.display(),
                        shared
                    );
                    continue;
                }
                Some(_) => {}
            }
            names.push(name);
        }

        if names.is_empty() {
            return Err(InjectionError::EmptyCatalog(directory.to_path_buf()));
        }
        debug!("Catalog {}: {} images", directory.display(), names.len());

        Ok(Self {
            directory: directory.to_path_buf(),
            names,
            extension: extension.unwrap_or_default(),
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// File name of `name` inside this catalog
    pub fn file_name(&self, name: &str) -> String {
        format!("{}{}", name, self.extension)
    }

    /// Path of `name` inside the catalog directory
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.directory.join(self.file_name(name))
    }

    /// Keep only the names also found in `keep`, in catalog order.
    pub fn retain_names(&mut self, keep: &[String]) {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        self.names.retain(|name| keep.contains(name.as_str()));
    }
}

/// Remove every name of `right` from `left`, keeping the order of `left`.
pub fn subtract(left: &[String], right: &[String]) -> Vec<String> {
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    left.iter()
        .filter(|name| !right.contains(name.as_str()))
        .cloned()
        .collect()
}
