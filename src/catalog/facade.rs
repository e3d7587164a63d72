use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::contracts::{
    ContractError, OperationDto, ParameterDto, PermissionDto, ProviderContract, ProviderDto,
    ProviderListQuery, ProviderPageDto, ProviderSummaryDto,
};
use crate::error::ErrorKind;
use crate::i18n::LanguageTag;
use crate::repositories::ProviderFilter;

use super::domain::{AuthType, Operation, Parameter, Permission, ProviderStatus};
use super::permissions::PermissionSet;
use super::service::{
    CatalogError, DEFAULT_PAGE_SIZE, ProviderCatalog, ProviderQuery, SortField, SortOrder,
};
use super::translation::TranslatedProvider;

impl From<CatalogError> for ContractError {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::NotFound(identifier) => {
                ContractError::new(ErrorKind::NotFound, format!("provider '{identifier}' not found"))
            }
            CatalogError::Conflict(identifier) => ContractError::new(
                ErrorKind::Conflict,
                format!("provider '{identifier}' already exists"),
            ),
            CatalogError::Invalid(invariant) => {
                ContractError::new(ErrorKind::Validation, invariant.to_string())
            }
            CatalogError::Repository(source) => {
                tracing::error!(error = ?source, "Catalog repository failure");
                ContractError::internal("catalog unavailable")
            }
        }
    }
}

pub(crate) fn permission_dto(permission: &Permission) -> PermissionDto {
    PermissionDto {
        identifier: permission.identifier.clone(),
        name: permission.name.clone(),
        description: permission.description.clone(),
        oauth_scopes: permission.oauth_scopes.clone(),
    }
}

pub(crate) fn parameter_dto(parameter: &Parameter) -> ParameterDto {
    ParameterDto {
        name: parameter.name.clone(),
        param_type: parameter.param_type.as_str().to_string(),
        description: parameter.description.clone(),
        required: parameter.required,
        enum_values: parameter.enum_values.clone(),
        default: parameter.default.clone(),
    }
}

pub(crate) fn operation_dto(operation: &Operation) -> OperationDto {
    let permissions = PermissionSet::new(&operation.required_permissions);
    let identifiers: Vec<String> = operation
        .required_permissions
        .iter()
        .map(|p| p.identifier.clone())
        .collect();
    OperationDto {
        identifier: operation.identifier.clone(),
        name: operation.name.clone(),
        description: operation.description.clone(),
        category: operation.category.clone(),
        required_scopes: permissions.required_oauth_scopes(&identifiers),
        required_permissions: identifiers,
        parameters: operation.parameters.iter().map(parameter_dto).collect(),
    }
}

fn summary_dto(provider: &TranslatedProvider) -> ProviderSummaryDto {
    ProviderSummaryDto {
        id: provider.id,
        identifier: provider.identifier.clone(),
        name: provider.name.clone(),
        description: provider.description.clone(),
        icon_url: provider.icon_url.clone(),
        auth_type: provider.auth_type.as_str().to_string(),
        status: provider.status.as_str().to_string(),
        categories: provider.categories.clone(),
        tags: provider.tags.clone(),
        api_doc_url: provider.api_doc_url.clone(),
    }
}

fn provider_dto(provider: &TranslatedProvider) -> ProviderDto {
    ProviderDto {
        summary: summary_dto(provider),
        language: provider.language.to_string(),
        permissions: provider.permissions.iter().map(permission_dto).collect(),
        operations: provider.operations.iter().map(operation_dto).collect(),
    }
}

fn invalid(field: &str, value: &str) -> ContractError {
    ContractError::new(ErrorKind::Validation, format!("unsupported {field} '{value}'"))
}

fn to_query(dto: &ProviderListQuery) -> Result<ProviderQuery, ContractError> {
    dto.validate()?;
    let status = match dto.status.as_deref() {
        Some(raw) => Some(
            raw.parse::<ProviderStatus>()
                .map_err(|_| invalid("status", raw))?,
        ),
        None if dto.include_inactive => None,
        None => Some(ProviderStatus::Active),
    };
    let auth_type = dto
        .auth_type
        .as_deref()
        .map(|raw| raw.parse::<AuthType>().map_err(|_| invalid("auth_type", raw)))
        .transpose()?;
    let sort = dto
        .sort_field
        .as_deref()
        .map(|raw| SortField::parse(raw).ok_or_else(|| invalid("sort.field", raw)))
        .transpose()?
        .unwrap_or_default();
    let order = dto
        .sort_order
        .as_deref()
        .map(|raw| SortOrder::parse(raw).ok_or_else(|| invalid("sort.order", raw)))
        .transpose()?
        .unwrap_or_default();

    Ok(ProviderQuery {
        status,
        auth_type,
        tag: dto.tag.clone().filter(|t| !t.trim().is_empty()),
        name: dto.name.clone().filter(|n| !n.trim().is_empty()),
        listed_only: status.is_none(),
        sort,
        order,
        page: dto.page.unwrap_or(1),
        page_size: dto.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    })
}

/// [`ProviderContract`] over the in-process catalog.
#[derive(Clone)]
pub struct CatalogFacade {
    catalog: Arc<ProviderCatalog>,
}

impl CatalogFacade {
    pub fn new(catalog: Arc<ProviderCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ProviderContract for CatalogFacade {
    #[instrument(name = "ProviderContract.get_provider", skip(self))]
    async fn get_provider(
        &self,
        identifier: &str,
        language: &LanguageTag,
    ) -> Result<ProviderDto, ContractError> {
        let provider = self.catalog.get_by_identifier(identifier).await?;
        Ok(provider_dto(&provider.get_translation(language)))
    }

    #[instrument(name = "ProviderContract.list_providers", skip(self))]
    async fn list_providers(
        &self,
        query: &ProviderListQuery,
        language: &LanguageTag,
    ) -> Result<ProviderPageDto, ContractError> {
        let query = to_query(query)?;
        let page = self.catalog.list(&query).await?;
        Ok(ProviderPageDto {
            items: page
                .items
                .iter()
                .map(|provider| summary_dto(&provider.get_translation(language)))
                .collect(),
            total: page.total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    #[instrument(name = "ProviderContract.list_all", skip(self))]
    async fn list_all(&self, language: &LanguageTag) -> Result<Vec<ProviderDto>, ContractError> {
        let providers = self.catalog.list_all(&ProviderFilter::default()).await?;
        Ok(providers
            .iter()
            .map(|provider| provider_dto(&provider.get_translation(language)))
            .collect())
    }

    #[instrument(name = "ProviderContract.categories", skip(self))]
    async fn categories(&self) -> Result<Vec<String>, ContractError> {
        Ok(self.catalog.categories().await?.into_iter().collect())
    }

    #[instrument(name = "ProviderContract.permissions_for_scopes", skip(self))]
    async fn permissions_for_scopes(
        &self,
        identifier: &str,
        scopes: &[String],
    ) -> Result<Vec<PermissionDto>, ContractError> {
        let provider = self.catalog.get_by_identifier(identifier).await?;
        let set = PermissionSet::new(&provider.permissions);
        Ok(set
            .permissions_for_scopes(scopes)
            .iter()
            .map(permission_dto)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::domain::fixtures::{operation, permission};
    use uuid::Uuid;

    #[test]
    fn operation_dto_unions_required_scopes() {
        let op = operation(
            Uuid::new_v4(),
            "sync",
            vec![
                permission("read", &["repo:read", "user:read"]),
                permission("write", &["repo:write", "repo:read"]),
            ],
        );
        let dto = operation_dto(&op);
        assert_eq!(dto.required_permissions, vec!["read", "write"]);
        assert_eq!(dto.required_scopes, vec!["repo:read", "repo:write", "user:read"]);
        assert_eq!(dto.parameters[0].param_type, "string");
    }

    #[test]
    fn list_query_defaults_to_active_first_page() {
        let query = to_query(&ProviderListQuery::default()).unwrap();
        assert_eq!(query.status, Some(ProviderStatus::Active));
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(query.sort, SortField::Name);
        assert!(!query.listed_only);
    }

    #[test]
    fn list_query_parses_filters() {
        let query = to_query(&ProviderListQuery {
            auth_type: Some("none".into()),
            sort_field: Some("created_at".into()),
            sort_order: Some("desc".into()),
            tag: Some("  ".into()),
            include_inactive: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.auth_type, Some(AuthType::None));
        assert_eq!(query.sort, SortField::CreatedAt);
        assert_eq!(query.order, SortOrder::Desc);
        assert!(query.tag.is_none());
        assert!(query.status.is_none());
        // Deprecated providers are dropped in the query so totals match items
        assert!(query.listed_only);
    }
}
