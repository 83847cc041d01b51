//! Icon theme lookup.
//!
//! A theme is a directory tree with one subdirectory per resolution
//! (`512x512/`, `256x256/`, ...). Icons are looked up by base-name, the file
//! name without its extension, and the largest resolution wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Resolution subdirectories, scanned in priority order.
pub const RESOLUTIONS: [&str; 5] = ["512x512", "256x256", "96x96", "64x64", "48x48"];

/// Error types for icon operations
#[derive(Error, Debug)]
pub enum IconError {
    #[error("Failed to scan icon theme {theme}: {source}")]
    Walk {
        theme: String,
        #[source]
        source: walkdir::Error,
    },
}

/// Base-name to absolute path mapping for one theme.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IconCache {
    icons: HashMap<String, PathBuf>,
}

impl IconCache {
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.icons.get(name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }

    /// Keeps the first path seen for a name.
    fn insert_first(&mut self, name: String, path: PathBuf) -> bool {
        if self.icons.contains_key(&name) {
            return false;
        }
        debug!("Adding \"{}\" to icons list ({})", name, path.display());
        self.icons.insert(name, path);
        true
    }
}

fn is_directory(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir() || (entry.path_is_symlink() && entry.path().is_dir())
}

/// Scan `theme_path` and build its icon cache.
///
/// Missing resolution directories are skipped, so a theme path that does not
/// exist yields an empty cache.
pub fn get_icons(theme_path: impl AsRef<Path>) -> Result<IconCache, IconError> {
    let theme_path = theme_path.as_ref();
    let mut cache = IconCache::default();

    for res in RESOLUTIONS {
        let res_dir = theme_path.join(res);
        if !res_dir.exists() {
            continue;
        }

        for entry in WalkDir::new(&res_dir).sort_by_file_name() {
            let entry = entry.map_err(|source| IconError::Walk {
                theme: theme_path.display().to_string(),
                source,
            })?;
            if is_directory(&entry) {
                continue;
            }

            let Some(stem) = entry.path().file_stem() else {
                continue;
            };
            cache.insert_first(stem.to_string_lossy().into_owned(), entry.into_path());
        }
    }

    Ok(cache)
}

#[derive(Debug)]
struct ThemeCache {
    theme: String,
    icons: IconCache,
}

/// Caches the icons of the most recently requested theme.
///
/// The cache is rebuilt whenever a different theme path is passed in.
/// Checking the theme, rebuilding and reading happen under one lock, so
/// concurrent callers never observe a half-built or mismatched cache.
#[derive(Debug, Default)]
pub struct IconResolver {
    state: Mutex<Option<ThemeCache>>,
}

impl IconResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `icon_name` to a file of `theme`, or return it unchanged.
    pub fn resolve(&self, theme: &str, icon_name: &str) -> Result<String, IconError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let stale = state.as_ref().map_or(true, |cached| cached.theme != theme);
        if stale {
            let icons = get_icons(theme)?;
            info!("Loaded {} icons from theme {}", icons.len(), theme);
            *state = Some(ThemeCache {
                theme: theme.to_string(),
                icons,
            });
        }

        let resolved = state
            .as_ref()
            .and_then(|cached| cached.icons.get(icon_name))
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| icon_name.to_string());

        Ok(resolved)
    }

    /// Theme the current cache was built from.
    pub fn current_theme(&self) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.as_ref().map(|cached| cached.theme.clone())
    }
}
