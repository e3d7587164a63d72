//! Language tags and `Accept-Language` negotiation.
//!
//! The gateway serves provider metadata in English, Simplified Chinese and
//! Traditional Chinese. Tags are kept in canonical BCP-47 casing
//! (`en`, `zh-CN`, `zh-Hant-TW`) and expose a parent chain used by the
//! translation fallback.

use std::convert::Infallible;
use std::fmt;

use axum::{
    extract::{FromRequestParts, Request},
    http::{header::ACCEPT_LANGUAGE, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};

pub const ENGLISH: &str = "en";
pub const SIMPLIFIED_CHINESE: &str = "zh-CN";
pub const TRADITIONAL_CHINESE: &str = "zh-TW";

/// Languages the matcher can resolve to, in preference order for ties.
pub const SUPPORTED_LANGUAGES: [&str; 3] = [ENGLISH, SIMPLIFIED_CHINESE, TRADITIONAL_CHINESE];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageTag(String);

impl LanguageTag {
    /// Parses and canonicalizes a tag. `_` separators are accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let mut canonical: Vec<String> = Vec::new();
        for (index, subtag) in raw.split(['-', '_']).enumerate() {
            if subtag.is_empty()
                || subtag.len() > 8
                || !subtag.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return None;
            }
            let formatted = if index == 0 {
                if !subtag.chars().all(|c| c.is_ascii_alphabetic()) {
                    return None;
                }
                subtag.to_ascii_lowercase()
            } else if subtag.len() == 2 && subtag.chars().all(|c| c.is_ascii_alphabetic()) {
                subtag.to_ascii_uppercase()
            } else if subtag.len() == 4 && subtag.chars().all(|c| c.is_ascii_alphabetic()) {
                let lower = subtag.to_ascii_lowercase();
                let mut chars = lower.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => lower,
                }
            } else {
                subtag.to_ascii_lowercase()
            };
            canonical.push(formatted);
        }

        Some(Self(canonical.join("-")))
    }

    pub fn english() -> Self {
        Self(ENGLISH.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary language subtag.
    pub fn language(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    fn script(&self) -> Option<&str> {
        self.0.split('-').skip(1).find(|s| s.len() == 4)
    }

    fn region(&self) -> Option<&str> {
        self.0
            .split('-')
            .skip(1)
            .find(|s| s.len() == 2 || (s.len() == 3 && s.chars().all(|c| c.is_ascii_digit())))
    }

    /// The tag with its last subtag removed, `None` for a bare language.
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once('-')
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// Ordered tags to try when resolving a translation: the tag itself,
    /// each parent, then English.
    pub fn fallback_chain(&self) -> Vec<Self> {
        let mut chain = vec![self.clone()];
        let mut current = self.parent();
        while let Some(tag) = current {
            current = tag.parent();
            chain.push(tag);
        }
        let english = Self::english();
        if !chain.contains(&english) {
            chain.push(english);
        }
        chain
    }

    pub fn is_traditional_chinese(&self) -> bool {
        self.language() == "zh"
            && (self.script() == Some("Hant")
                || matches!(self.region(), Some("TW") | Some("HK") | Some("MO")))
    }

    /// Maps the tag onto one of [`SUPPORTED_LANGUAGES`], if it is related.
    pub fn match_supported(&self) -> Option<Self> {
        match self.language() {
            "en" => Some(Self::english()),
            "zh" if self.is_traditional_chinese() => Some(Self(TRADITIONAL_CHINESE.to_string())),
            "zh" => Some(Self(SIMPLIFIED_CHINESE.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LanguageTag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid language tag '{value}'"))
    }
}

impl From<LanguageTag> for String {
    fn from(tag: LanguageTag) -> Self {
        tag.0
    }
}

/// Parses an `Accept-Language` header into tags ordered by descending
/// quality. Entries with `q=0`, wildcards and malformed tags are dropped.
pub fn parse_accept_language(header: &str) -> Vec<(LanguageTag, f32)> {
    let mut entries: Vec<(LanguageTag, f32)> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let tag = pieces.next()?.trim();
            if tag == "*" {
                return None;
            }
            let quality = pieces
                .filter_map(|param| param.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            if quality <= 0.0 {
                return None;
            }
            LanguageTag::parse(tag).map(|tag| (tag, quality.min(1.0)))
        })
        .collect();

    // Stable sort keeps header order among equal weights
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    entries
}

/// Picks the best supported language for a header, English when nothing
/// matches.
pub fn negotiate(header: Option<&str>) -> LanguageTag {
    header
        .map(parse_accept_language)
        .unwrap_or_default()
        .iter()
        .find_map(|(tag, _)| tag.match_supported())
        .unwrap_or_else(LanguageTag::english)
}

/// Language negotiated for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLanguage(pub LanguageTag);

impl Default for RequestLanguage {
    fn default() -> Self {
        Self(LanguageTag::english())
    }
}

/// Middleware storing the negotiated [`RequestLanguage`] on the request.
pub async fn language_middleware(mut request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok());
    let language = RequestLanguage(negotiate(header));
    tracing::trace!(language = %language.0, "Negotiated request language");
    request.extensions_mut().insert(language);
    next.run(request).await
}

impl<S> FromRequestParts<S> for RequestLanguage
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(language) = parts.extensions.get::<RequestLanguage>() {
            return Ok(language.clone());
        }
        let header = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok());
        Ok(RequestLanguage(negotiate(header)))
    }
}
