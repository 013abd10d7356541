use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::DocumentId;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::document::document_id;
use crate::query::{Direction, SortKey, compare_values};
use crate::store::{DocumentStore, validate_name, validate_patch};
use crate::{FieldSummary, Filter, FindOptions, Patch, Result, StoreError, UniqueIndex, UpdateOptions};

#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    body: Value,
}

#[derive(Debug, Default)]
struct Collections {
    documents: HashMap<String, Vec<StoredDocument>>,
    indexes: HashMap<String, Vec<UniqueIndex>>,
    next_seq: u64,
}

impl Collections {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// In-memory document store implementation.
///
/// Stores every collection as an insertion-ordered vector behind a single
/// lock, which makes each call atomic. Unique indexes are enforced the
/// same way the PostgreSQL implementation enforces them.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<RwLock<Collections>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents in a collection.
    pub async fn document_count(&self, collection: &str) -> usize {
        self.inner
            .read()
            .await
            .documents
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Clears all documents, keeping index definitions.
    pub async fn clear(&self) {
        self.inner.write().await.documents.clear();
    }
}

/// Checks `candidate` against every other document for unique key clashes.
fn check_unique(
    documents: &[StoredDocument],
    indexes: &[UniqueIndex],
    candidate: &Value,
    skip_seq: Option<u64>,
) -> Result<()> {
    for index in indexes {
        let Some(key) = index.key_of(candidate) else {
            continue;
        };
        let clash = documents
            .iter()
            .filter(|doc| Some(doc.seq) != skip_seq)
            .any(|doc| index.key_of(&doc.body).as_ref() == Some(&key));
        if clash {
            return Err(StoreError::DuplicateKey {
                index: index.name.clone(),
            });
        }
    }
    Ok(())
}

/// Checks a whole collection for unique key clashes.
fn check_all_unique(documents: &[StoredDocument], indexes: &[UniqueIndex]) -> Result<()> {
    for index in indexes {
        let mut seen = HashSet::new();
        for doc in documents {
            if let Some(key) = index.key_of(&doc.body) {
                let key = Value::Array(key).to_string();
                if !seen.insert(key) {
                    return Err(StoreError::DuplicateKey {
                        index: index.name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, collection: &str, doc: Value) -> Result<DocumentId> {
        validate_name("collection", collection)?;
        let id = document_id(&doc)?;

        let mut inner = self.inner.write().await;
        let seq = inner.next_seq();
        let indexes = inner.indexes.get(collection).cloned().unwrap_or_default();
        let documents = inner.documents.entry(collection.to_string()).or_default();

        if documents.iter().any(|d| document_id(&d.body).ok() == Some(id)) {
            return Err(StoreError::DuplicateKey {
                index: format!("{collection}_pkey"),
            });
        }
        check_unique(documents, &indexes, &doc, None)?;

        documents.push(StoredDocument { seq, body: doc });
        Ok(id)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| filter.matches(&d.body)))
            .map(|d| d.body.clone()))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Value>> {
        let inner = self.inner.read().await;
        let mut matched: Vec<&StoredDocument> = inner
            .documents
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(&d.body)).collect())
            .unwrap_or_default();

        // Vectors are kept in insertion order, so a stable sort leaves ties
        // in insertion order.
        matched.sort_by(|a, b| {
            options
                .sort
                .iter()
                .map(|sort| {
                    let ordering = match &sort.key {
                        SortKey::Field(field) => {
                            compare_values(a.body.get(field), b.body.get(field))
                        }
                        SortKey::Inserted => a.seq.cmp(&b.seq),
                    };
                    match sort.direction {
                        Direction::Ascending => ordering,
                        Direction::Descending => ordering.reverse(),
                    }
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let skip = options.skip.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| d.body.clone())
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let inner = self.inner.read().await;
        let count = inner
            .documents
            .get(collection)
            .map_or(0, |docs| docs.iter().filter(|d| filter.matches(&d.body)).count());
        Ok(count as u64)
    }

    async fn update_many(&self, collection: &str, filter: &Filter, patch: &Patch) -> Result<u64> {
        validate_patch(patch)?;

        let mut inner = self.inner.write().await;
        let indexes = inner.indexes.get(collection).cloned().unwrap_or_default();
        let Some(documents) = inner.documents.get_mut(collection) else {
            return Ok(0);
        };

        let mut updated = documents.clone();
        let mut matched = 0u64;
        for doc in updated.iter_mut().filter(|d| filter.matches(&d.body)) {
            patch.apply(&mut doc.body);
            matched += 1;
        }
        if matched > 0 {
            check_all_unique(&updated, &indexes)?;
            *documents = updated;
        }
        Ok(matched)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        options: UpdateOptions,
    ) -> Result<Option<Value>> {
        validate_name("collection", collection)?;
        validate_patch(patch)?;

        let mut inner = self.inner.write().await;
        let seq = inner.next_seq();
        let indexes = inner.indexes.get(collection).cloned().unwrap_or_default();
        let documents = inner.documents.entry(collection.to_string()).or_default();

        if let Some(position) = documents.iter().position(|d| filter.matches(&d.body)) {
            let mut body = documents[position].body.clone();
            patch.apply(&mut body);
            check_unique(documents, &indexes, &body, Some(documents[position].seq))?;
            documents[position].body = body.clone();
            return Ok(Some(body));
        }

        if !options.upsert {
            return Ok(None);
        }

        let body = patch.build_upsert(filter, DocumentId::new());
        document_id(&body)?;
        check_unique(documents, &indexes, &body, None)?;
        documents.push(StoredDocument {
            seq,
            body: body.clone(),
        });
        Ok(Some(body))
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let Some(documents) = inner.documents.get_mut(collection) else {
            return Ok(0);
        };
        match documents.iter().position(|d| filter.matches(&d.body)) {
            Some(position) => {
                documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let Some(documents) = inner.documents.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|d| !filter.matches(&d.body));
        Ok((before - documents.len()) as u64)
    }

    async fn aggregate(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
    ) -> Result<Option<FieldSummary>> {
        let inner = self.inner.read().await;
        let matched: Vec<&StoredDocument> = inner
            .documents
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(&d.body)).collect())
            .unwrap_or_default();

        if matched.is_empty() {
            return Ok(None);
        }

        let values = matched
            .iter()
            .filter_map(|d| d.body.get(field).and_then(Value::as_f64))
            .collect();
        Ok(Some(FieldSummary::from_values(matched.len() as u64, values)))
    }

    async fn ensure_unique_index(&self, collection: &str, index: UniqueIndex) -> Result<()> {
        validate_name("collection", collection)?;
        validate_name("index", &index.name)?;
        for field in &index.fields {
            validate_name("field", field)?;
        }

        let mut inner = self.inner.write().await;
        let already_defined = inner
            .indexes
            .get(collection)
            .is_some_and(|existing| existing.iter().any(|i| i.name == index.name));
        if already_defined {
            return Ok(());
        }

        if let Some(documents) = inner.documents.get(collection) {
            check_all_unique(documents, std::slice::from_ref(&index))?;
        }
        inner
            .indexes
            .entry(collection.to_string())
            .or_default()
            .push(index);
        Ok(())
    }
}
