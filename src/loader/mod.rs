//! # Provider loader
//!
//! Reads a providers directory laid out as
//! `<dir>/<identifier>/manifest.json` plus optional
//! `<dir>/<identifier>/i18n/<language>.json` files and produces one
//! [`LoadedProvider`] per valid manifest. Persisting the result is the
//! caller's concern (see [`crate::seeds`]).

pub mod manifest;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::catalog::Provider;
use crate::repositories::AdapterConfigs;
use crate::translations::TranslationBundle;

pub use manifest::{OperationManifest, PermissionRef, ProviderManifest};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const I18N_DIR: &str = "i18n";

/// Entries that never hold a provider.
const IGNORED_ENTRIES: [&str; 3] = ["__MACOSX", "Thumbs.db", "desktop.ini"];

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("provider '{identifier}' is invalid: {reason}")]
    Invalid { identifier: String, reason: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LoaderError + '_ {
    move |source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct LoadedProvider {
    pub provider: Provider,
    pub adapter: AdapterConfigs,
    /// Language code (file stem) to i18n payload
    pub translations: BTreeMap<String, Value>,
}

fn is_ignored(name: &str) -> bool {
    name.starts_with('.')
        || IGNORED_ENTRIES.contains(&name)
        || name.to_ascii_lowercase().starts_with("readme")
}

/// Loads every provider under `dir`. A missing directory yields no
/// providers; a broken provider is logged and skipped.
pub fn load_dir(dir: &Path) -> Result<Vec<LoadedProvider>, LoaderError> {
    if !dir.exists() {
        tracing::warn!(path = %dir.display(), "Providers directory does not exist");
        return Ok(Vec::new());
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_error(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| !is_ignored(name))
        })
        .collect();
    entries.sort();

    let mut loaded = Vec::new();
    for path in entries {
        match load_provider(&path) {
            Ok(Some(provider)) => {
                tracing::info!(
                    provider = %provider.provider.identifier,
                    operations = provider.provider.operations.len(),
                    languages = provider.translations.len(),
                    "Loaded provider manifest"
                );
                loaded.push(provider);
            }
            Ok(None) => {
                tracing::debug!(path = %path.display(), "No manifest; skipping directory");
            }
            Err(error) => {
                tracing::error!(path = %path.display(), %error, "Skipping provider");
            }
        }
    }
    Ok(loaded)
}

/// Loads one provider directory. `Ok(None)` when it has no manifest.
pub fn load_provider(dir: &Path) -> Result<Option<LoadedProvider>, LoaderError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&manifest_path).map_err(io_error(&manifest_path))?;
    let manifest: ProviderManifest =
        serde_json::from_str(&raw).map_err(|source| LoaderError::Manifest {
            path: manifest_path.clone(),
            source,
        })?;

    let provider = manifest.to_provider();
    provider.validate().map_err(|e| LoaderError::Invalid {
        identifier: provider.identifier.clone(),
        reason: e.to_string(),
    })?;

    Ok(Some(LoadedProvider {
        adapter: manifest.adapter_configs(),
        translations: load_translations(&dir.join(I18N_DIR), &provider.identifier)?,
        provider,
    }))
}

fn load_translations(dir: &Path, identifier: &str) -> Result<BTreeMap<String, Value>, LoaderError> {
    let mut translations = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(translations);
    }
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(language) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if is_ignored(language) {
            continue;
        }
        let raw = fs::read_to_string(&path).map_err(io_error(&path))?;
        let payload = match serde_json::from_str::<TranslationBundle>(&raw) {
            Ok(bundle) => serde_json::to_value(bundle).map_err(|source| LoaderError::Manifest {
                path: path.clone(),
                source,
            })?,
            Err(error) => {
                tracing::warn!(provider = identifier, path = %path.display(), %error, "Skipping undecodable translation file");
                continue;
            }
        };
        translations.insert(language.to_string(), payload);
    }
    Ok(translations)
}
