/// Agency-scoped document CRUD
///
/// Every call takes the caller's [`AgencyId`] and routes through
/// [`guard_write`] / [`scoped_get`]; there is no unscoped entry point.

use super::query::ScopedQuery;
use super::{guard_write, scoped_get, AgencyId, TenantError};
use crate::access::code::generate_group_code;
use crate::models::document::{Collection, NewDocument, TenantDocument};
use crate::store::Store;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Payload field holding a group's join code
pub const GROUP_CODE_FIELD: &str = "groupCode";

#[derive(Clone)]
pub struct TenantDocuments {
    store: Arc<dyn Store>,
}

impl TenantDocuments {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Inserts a document owned by `agency_id`
    ///
    /// New groups without a `groupCode` get a generated one.
    pub async fn create(
        &self,
        collection: Collection,
        agency_id: AgencyId,
        mut data: JsonValue,
    ) -> Result<TenantDocument, TenantError> {
        guard_write(&mut data, agency_id)?;

        if collection == Collection::Groups {
            if let Some(object) = data.as_object_mut() {
                let missing = object
                    .get(GROUP_CODE_FIELD)
                    .map_or(true, |v| v.is_null() || v.as_str() == Some(""));
                if missing {
                    object.insert(
                        GROUP_CODE_FIELD.to_string(),
                        JsonValue::String(generate_group_code()),
                    );
                }
            }
        }

        let doc = self
            .store
            .insert_document(NewDocument {
                collection,
                agency_id: agency_id.as_uuid(),
                data,
            })
            .await?;

        info!(
            document_id = %doc.id,
            agency_id = %agency_id,
            collection = %collection,
            "Document created"
        );
        Ok(doc)
    }

    pub async fn get(
        &self,
        collection: Collection,
        id: Uuid,
        agency_id: AgencyId,
    ) -> Result<TenantDocument, TenantError> {
        scoped_get(self.store.as_ref(), collection, id, agency_id).await
    }

    pub async fn list(&self, query: &ScopedQuery) -> Result<Vec<TenantDocument>, TenantError> {
        let docs = self.store.query_documents(query).await?;
        debug!(
            agency_id = %query.agency_id(),
            collection = %query.collection(),
            count = docs.len(),
            "Documents listed"
        );
        Ok(docs)
    }

    /// Replaces a document's payload
    ///
    /// A group keeps its join code when the new payload omits it.
    pub async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        agency_id: AgencyId,
        mut data: JsonValue,
    ) -> Result<TenantDocument, TenantError> {
        let current = scoped_get(self.store.as_ref(), collection, id, agency_id).await?;
        guard_write(&mut data, agency_id)?;

        if let (Some(object), Some(code)) = (
            data.as_object_mut(),
            current.data.get(GROUP_CODE_FIELD).filter(|v| !v.is_null()),
        ) {
            object
                .entry(GROUP_CODE_FIELD.to_string())
                .or_insert_with(|| code.clone());
        }

        let doc = self
            .store
            .update_document(collection, id, agency_id.as_uuid(), data)
            .await?
            .ok_or(TenantError::NotFoundOrUnauthorized)?;

        info!(
            document_id = %id,
            agency_id = %agency_id,
            collection = %collection,
            "Document updated"
        );
        Ok(doc)
    }

    pub async fn delete(
        &self,
        collection: Collection,
        id: Uuid,
        agency_id: AgencyId,
    ) -> Result<(), TenantError> {
        if !self
            .store
            .delete_document(collection, id, agency_id.as_uuid())
            .await?
        {
            return Err(TenantError::NotFoundOrUnauthorized);
        }

        info!(
            document_id = %id,
            agency_id = %agency_id,
            collection = %collection,
            "Document deleted"
        );
        Ok(())
    }
}
