//! Read-only user display data.

use std::collections::HashMap;

use common::{DocumentId, UserId};
use document_store::{Document, DocumentStore, DocumentStoreExt, Filter, FindOptions};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::retry::ReadRetry;

/// Public profile of a user, owned by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
}

impl UserProfile {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

impl Document for UserProfile {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> DocumentId {
        self.id.into()
    }
}

/// Resolves usernames for the given users. Unknown users are absent.
pub(crate) async fn usernames<S: DocumentStore>(
    store: &S,
    retry: &ReadRetry,
    mut ids: Vec<UserId>,
) -> Result<HashMap<UserId, String>> {
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let filter = Filter::new().any_of("id", ids);
    let profiles = retry
        .run("usernames", || {
            store.find_documents::<UserProfile>(&filter, FindOptions::new())
        })
        .await?;

    Ok(profiles.into_iter().map(|p| (p.id, p.username)).collect())
}
