use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::document::{Document, EXTENSION_KEY, SOURCE_KEY};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Source directory does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reads every file under `root` whose extension is one of `extensions`.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
    extensions: Vec<String>,
    excluded_dirs: Vec<String>,
}

impl DirectoryLoader {
    pub fn new<P: AsRef<Path>>(root: P, extensions: Vec<String>) -> Self {
        Self {
            root: root.as_ref().to_owned(),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            excluded_dirs: default_excluded_dirs(),
        }
    }

    /// Replace the directory names skipped during the walk.
    pub fn with_excluded_dirs(mut self, excluded_dirs: Vec<String>) -> Self {
        self.excluded_dirs = excluded_dirs;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Load all extensions in order. An extension that fails is logged and
    /// contributes nothing; the others still load.
    pub fn load(&self) -> Vec<Document> {
        let mut documents = Vec::new();

        for ext in &self.extensions {
            info!("Loading .{} files from {:?}", ext, self.root);
            match self.load_extension(ext) {
                Ok(loaded) => {
                    info!("Loaded {} .{} documents", loaded.len(), ext);
                    documents.extend(loaded);
                }
                Err(e) => error!("Error loading .{} documents: {}", ext, e),
            }
        }

        documents
    }

    /// Load every file matching `**/*.{ext}` under the root.
    ///
    /// Directories that cannot be walked are logged and skipped. A missing
    /// root or a matching file that cannot be read fails the extension.
    pub fn load_extension(&self, ext: &str) -> Result<Vec<Document>, LoaderError> {
        if !self.root.exists() {
            return Err(LoaderError::MissingRoot(self.root.clone()));
        }

        let ext = ext.trim_start_matches('.').to_lowercase();
        let mut documents = Vec::new();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_skipped(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {:?}: {}", self.root, e);
                    continue;
                }
            };
            // Symlinks are read through; a dangling one fails the extension.
            if entry.file_type().is_dir() || !has_extension(entry.path(), &ext) {
                continue;
            }

            let bytes = std::fs::read(entry.path()).map_err(|source| LoaderError::Read {
                path: entry.path().to_path_buf(),
                source,
            })?;

            let mut metadata = HashMap::new();
            metadata.insert(
                SOURCE_KEY.to_string(),
                entry.path().to_string_lossy().into_owned(),
            );
            metadata.insert(EXTENSION_KEY.to_string(), ext.clone());

            documents.push(Document::new(
                String::from_utf8_lossy(&bytes).into_owned(),
                metadata,
            ));
        }

        Ok(documents)
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        // Never skip the root itself, even when it is a dot-directory.
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.excluded_dirs.iter().any(|d| *d == name)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

pub fn default_excluded_dirs() -> Vec<String> {
    ["target", "node_modules", "__pycache__"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
