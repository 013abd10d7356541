use async_trait::async_trait;
use common::DocumentId;
use serde_json::Value;

use crate::document::{Document, from_body, to_body};
use crate::{FieldSummary, Filter, FindOptions, Patch, Result, StoreError, UniqueIndex, UpdateOptions};

/// Core trait for document store implementations.
///
/// Documents are JSON objects grouped into named collections. Each call is
/// atomic on its own; no call spans several documents transactionally
/// except `update_many`, which is atomic per document only.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document and returns its id.
    ///
    /// The document must carry its own `id`. Fails with `DuplicateKey` if
    /// the id or any unique index key is already taken.
    async fn insert(&self, collection: &str, doc: Value) -> Result<DocumentId>;

    /// Returns the first matching document in insertion order.
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    /// Returns the matching documents, sorted and paginated.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Value>>;

    /// Counts the matching documents.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Applies `patch` to every matching document and returns how many matched.
    async fn update_many(&self, collection: &str, filter: &Filter, patch: &Patch) -> Result<u64>;

    /// Applies `patch` to the first matching document and returns it as updated.
    ///
    /// With `options.upsert`, a missing document is inserted instead (see
    /// [`Patch::build_upsert`]). Concurrent upserts with the same filter
    /// never create two documents.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        options: UpdateOptions,
    ) -> Result<Option<Value>>;

    /// Deletes the first matching document; returns the number deleted (0 or 1).
    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Deletes every matching document; returns the number deleted.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Groups the matching documents and summarizes a numeric field:
    /// count, mean and every value.
    ///
    /// Returns None if nothing matches.
    async fn aggregate(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
    ) -> Result<Option<FieldSummary>>;

    /// Creates a unique index if it does not exist yet.
    async fn ensure_unique_index(&self, collection: &str, index: UniqueIndex) -> Result<()>;
}

/// Extension trait providing typed access for [`Document`] types.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Inserts a typed document.
    async fn insert_document<T: Document>(&self, doc: &T) -> Result<DocumentId> {
        self.insert(T::COLLECTION, to_body(doc)?).await
    }

    /// Finds the first matching typed document.
    async fn find_document<T: Document>(&self, filter: &Filter) -> Result<Option<T>> {
        self.find_one(T::COLLECTION, filter)
            .await?
            .map(from_body)
            .transpose()
    }

    /// Finds a typed document by id.
    async fn get_document<T: Document>(&self, id: DocumentId) -> Result<Option<T>> {
        self.find_document(&Filter::by_id(id)).await
    }

    /// Finds all matching typed documents.
    async fn find_documents<T: Document>(
        &self,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<T>> {
        self.find(T::COLLECTION, filter, options)
            .await?
            .into_iter()
            .map(from_body)
            .collect()
    }

    /// Updates the first matching typed document and returns it.
    async fn update_document<T: Document>(
        &self,
        filter: &Filter,
        patch: &Patch,
        options: UpdateOptions,
    ) -> Result<Option<T>> {
        self.update_one(T::COLLECTION, filter, patch, options)
            .await?
            .map(from_body)
            .transpose()
    }

    /// Checks whether any document matches.
    async fn exists(&self, collection: &str, filter: &Filter) -> Result<bool> {
        Ok(self.find_one(collection, filter).await?.is_some())
    }
}

// Blanket implementation for all DocumentStore implementations
impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}

/// Validates a collection, index or field name.
///
/// Names are restricted to ASCII identifiers so backends may embed them in
/// generated DDL.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidDocument(format!(
            "invalid {kind} name {name:?}"
        )))
    }
}

/// Validates a patch before applying it.
pub fn validate_patch(patch: &Patch) -> Result<()> {
    if patch.touches_id() {
        return Err(StoreError::InvalidDocument(
            "a patch may not change the document id".to_string(),
        ));
    }
    Ok(())
}
