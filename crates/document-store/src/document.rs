use common::DocumentId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Result, StoreError};

/// A typed document persisted in a named collection.
///
/// The serialized form must be a JSON object carrying the document's
/// `id` as a UUID string.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// The collection this document type lives in.
    const COLLECTION: &'static str;

    /// Returns the document's identifier.
    fn id(&self) -> DocumentId;
}

/// Extracts and validates the `id` of a raw document body.
pub fn document_id(doc: &Value) -> Result<DocumentId> {
    let Value::Object(fields) = doc else {
        return Err(StoreError::InvalidDocument(
            "document must be a JSON object".to_string(),
        ));
    };

    let raw = fields
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidDocument("document has no string id".to_string()))?;

    raw.parse()
        .map_err(|e| StoreError::InvalidDocument(format!("malformed id {raw:?}: {e}")))
}

/// Serializes a typed document into a raw body.
pub fn to_body<T: Document>(doc: &T) -> Result<Value> {
    Ok(serde_json::to_value(doc)?)
}

/// Deserializes a raw body into a typed document.
pub fn from_body<T: Document>(body: Value) -> Result<T> {
    Ok(serde_json::from_value(body)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn document_id_reads_uuid_field() {
        let id = DocumentId::new();
        let doc = json!({"id": id.to_string(), "name": "x"});
        assert_eq!(document_id(&doc).unwrap(), id);
    }

    #[test]
    fn document_id_rejects_non_objects_and_bad_ids() {
        assert!(matches!(
            document_id(&json!([1, 2])),
            Err(StoreError::InvalidDocument(_))
        ));
        assert!(matches!(
            document_id(&json!({"name": "x"})),
            Err(StoreError::InvalidDocument(_))
        ));
        assert!(matches!(
            document_id(&json!({"id": "nope"})),
            Err(StoreError::InvalidDocument(_))
        ));
    }
}
