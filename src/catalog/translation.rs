//! Translated projections of a [`Provider`].
//!
//! A translation never changes identity: identifiers, parameter names,
//! scopes and types are copied from the raw provider and only display
//! strings are replaced.

use uuid::Uuid;

use crate::i18n::LanguageTag;
use crate::translations::TranslationBundle;

use super::domain::{AuthType, Operation, Permission, Provider, ProviderStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedProvider {
    pub id: Uuid,
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub icon_url: Option<String>,
    pub auth_type: AuthType,
    pub status: ProviderStatus,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub permissions: Vec<Permission>,
    pub operations: Vec<Operation>,
    pub api_doc_url: Option<String>,
    /// Language the strings are in; `en` for the raw fallback.
    pub language: LanguageTag,
}

const API_DOC_URLS: &[(&str, &str)] = &[
    ("github", "https://docs.github.com/en/rest"),
    ("gitlab", "https://docs.gitlab.com/ee/api/rest/"),
    ("notion", "https://developers.notion.com/reference/intro"),
    ("slack", "https://api.slack.com/methods"),
    ("google_drive", "https://developers.google.com/drive/api/reference/rest/v3"),
    ("gmail", "https://developers.google.com/gmail/api/reference/rest"),
    ("google_calendar", "https://developers.google.com/calendar/api/v3/reference"),
    ("jira", "https://developer.atlassian.com/cloud/jira/platform/rest/v3/"),
    ("linear", "https://developers.linear.app/docs/graphql/working-with-the-graphql-api"),
    ("openai", "https://platform.openai.com/docs/api-reference"),
    ("volcengine", "https://www.volcengine.com/docs"),
    (
        "filesystem",
        "https://github.com/modelcontextprotocol/servers/tree/main/src/filesystem",
    ),
];

pub fn api_doc_url(identifier: &str) -> Option<String> {
    API_DOC_URLS
        .iter()
        .find(|(id, _)| *id == identifier)
        .map(|(_, url)| (*url).to_string())
}

fn pick(translated: Option<&String>, raw: &str) -> String {
    match translated {
        Some(value) if !value.trim().is_empty() => value.clone(),
        _ => raw.to_string(),
    }
}

/// Builds the raw-field projection used when no translation matches.
pub fn untranslated(provider: &Provider) -> TranslatedProvider {
    TranslatedProvider {
        id: provider.id,
        identifier: provider.identifier.clone(),
        name: provider.name.clone(),
        description: provider.description.clone(),
        icon_url: provider.icon_url.clone(),
        auth_type: provider.auth_type,
        status: provider.status,
        categories: provider.categories.iter().cloned().collect(),
        tags: provider.tags.iter().cloned().collect(),
        permissions: provider.permissions.clone(),
        operations: provider.operations.clone(),
        api_doc_url: api_doc_url(&provider.identifier),
        language: LanguageTag::english(),
    }
}

fn translate_permission(permission: &Permission, bundle: &TranslationBundle) -> Permission {
    let mut permission = permission.clone();
    if let Some(tr) = bundle.permission(&permission.identifier) {
        permission.name = pick(tr.name.as_ref(), &permission.name);
        permission.description = pick(tr.description.as_ref(), &permission.description);
    }
    permission
}

/// Deep-copies the provider and overlays every string the bundle carries.
/// Empty translated strings fall back to the raw value.
pub fn overlay(
    provider: &Provider,
    bundle: &TranslationBundle,
    language: LanguageTag,
) -> TranslatedProvider {
    let mut translated = untranslated(provider);
    translated.language = language;
    translated.name = pick(bundle.name.as_ref(), &provider.name);
    translated.description = pick(bundle.description.as_ref(), &provider.description);

    let categories: Vec<String> = bundle
        .categories
        .iter()
        .filter(|c| !c.trim().is_empty())
        .cloned()
        .collect();
    if !categories.is_empty() {
        translated.categories = categories;
    }

    translated.permissions = provider
        .permissions
        .iter()
        .map(|p| translate_permission(p, bundle))
        .collect();

    translated.operations = provider
        .operations
        .iter()
        .map(|operation| {
            let mut operation = operation.clone();
            operation.required_permissions = operation
                .required_permissions
                .iter()
                .map(|p| translate_permission(p, bundle))
                .collect();
            if let Some(tr) = bundle.operation(&operation.identifier) {
                operation.name = pick(tr.name.as_ref(), &operation.name);
                operation.description = pick(tr.description.as_ref(), &operation.description);
                for parameter in &mut operation.parameters {
                    if let Some(ptr) = tr.parameter(&parameter.name) {
                        parameter.description =
                            pick(ptr.description.as_ref(), &parameter.description);
                    }
                }
            }
            operation
        })
        .collect();

    translated
}

impl Provider {
    /// Resolves the projection for `language`: the exact tag, each parent
    /// tag, English, then the raw provider fields.
    pub fn get_translation(&self, language: &LanguageTag) -> TranslatedProvider {
        language
            .fallback_chain()
            .iter()
            .find_map(|tag| self.translations.get(tag))
            .cloned()
            .unwrap_or_else(|| untranslated(self))
    }
}
