//! # Translation Store
//!
//! Resolves decoded translation bundles for `(provider identifier, language)`
//! pairs. Reads go through a bounded LRU with a time-to-live in front of the
//! [`TranslationRepository`](crate::repositories::TranslationRepository).

mod bundle;
mod store;

pub use bundle::{
    OperationTranslation, ParameterTranslation, PermissionTranslation, TranslationBundle,
};
pub use store::TranslationStore;

use thiserror::Error;

use crate::i18n::{ENGLISH, LanguageTag, SIMPLIFIED_CHINESE, TRADITIONAL_CHINESE};

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("no '{language}' translation for provider '{identifier}'")]
    NotFound { identifier: String, language: String },
    #[error("'{0}' is not a valid language tag")]
    InvalidLanguage(String),
    #[error("'{0}' does not match a supported language")]
    UnsupportedLanguage(String),
    #[error("translation payload is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("translation repository failure: {0}")]
    Repository(#[source] anyhow::Error),
}

/// Maps any language code onto the stored translation codes: English
/// variants to `en`, Simplified Chinese to `zh-CN`, Traditional Chinese to
/// `zh-TW`, everything else to `en`.
pub fn normalize_language_code(code: &str) -> &'static str {
    let Some(tag) = LanguageTag::parse(code) else {
        return ENGLISH;
    };
    match tag.language() {
        "zh" if tag.is_traditional_chinese() => TRADITIONAL_CHINESE,
        "zh" => SIMPLIFIED_CHINESE,
        _ => ENGLISH,
    }
}
