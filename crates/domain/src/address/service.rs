//! Address service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::Utc;
use common::{DocumentId, UserId};
use document_store::{
    Document, DocumentStore, DocumentStoreExt, Filter, FindOptions, Patch, Sort, StoreError,
    UpdateOptions,
};
use serde_json::json;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Address, AddressFields};
use crate::error::{CommerceError, Result};
use crate::retry::ReadRetry;

/// Service for managing a user's addresses.
///
/// Operations that may set a default address demote the user's other
/// defaults before writing. They hold a per-user lock while doing so, and
/// the store's `addresses_one_default` index rejects whatever slips past
/// the lock (for example, a second process).
#[derive(Clone)]
pub struct AddressService<S: DocumentStore> {
    store: S,
    retry: ReadRetry,
    locks: UserLocks,
}

type UserLocks = Arc<StdMutex<HashMap<UserId, Arc<Mutex<()>>>>>;

/// Exclusive hold on one user's default flags.
///
/// Dropping it releases the lock and forgets the user's entry once no other
/// task holds or waits on it.
struct UserLock {
    user: UserId,
    entry: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: UserLocks,
}

impl Drop for UserLock {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here.
        if Arc::strong_count(&self.entry) == 2 {
            locks.remove(&self.user);
        }
    }
}

impl<S: DocumentStore> AddressService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: ReadRetry::default(),
            locks: Arc::default(),
        }
    }

    pub fn with_read_retry(mut self, retry: ReadRetry) -> Self {
        self.retry = retry;
        self
    }

    async fn lock_user(&self, user: UserId) -> UserLock {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(user).or_default().clone()
        };
        let guard = entry.clone().lock_owned().await;
        UserLock {
            user,
            entry,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn owned(user: UserId, id: DocumentId) -> Filter {
        Filter::by_id(id).eq("user", user)
    }

    /// Clears `isDefault` on the user's addresses, except `keep`.
    async fn demote_defaults(&self, user: UserId, keep: Option<DocumentId>) -> Result<u64> {
        let mut filter = Filter::new().eq("user", user).eq("isDefault", true);
        if let Some(keep) = keep {
            filter = filter.ne("id", keep);
        }
        let patch = Patch::new()
            .set("isDefault", false)
            .set("updatedAt", json!(Utc::now()));
        let demoted = self
            .store
            .update_many(Address::COLLECTION, &filter, &patch)
            .await?;
        Ok(demoted)
    }

    async fn ensure_owned(&self, user: UserId, id: DocumentId) -> Result<()> {
        let filter = Self::owned(user, id);
        let exists = self
            .retry
            .run("address_exists", || {
                self.store.exists(Address::COLLECTION, &filter)
            })
            .await?;
        if exists {
            Ok(())
        } else {
            Err(CommerceError::not_found("address", id))
        }
    }

    /// Lists the user's addresses: the default first, then newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, user: UserId) -> Result<Vec<Address>> {
        let filter = Filter::new().eq("user", user);
        let addresses = self
            .retry
            .run("list_addresses", || {
                self.store.find_documents::<Address>(
                    &filter,
                    FindOptions::new()
                        .sort(Sort::desc("isDefault"))
                        .sort(Sort::newest_first()),
                )
            })
            .await?;
        Ok(addresses)
    }

    #[tracing::instrument(skip(self, fields))]
    pub async fn create(&self, user: UserId, fields: AddressFields) -> Result<Address> {
        fields.validate()?;
        let address = fields.into_address(user, Utc::now());

        if !address.is_default {
            self.store.insert_document(&address).await?;
            return Ok(address);
        }

        let _guard = self.lock_user(user).await;
        self.demote_defaults(user, None).await?;
        self.store
            .insert_document(&address)
            .await
            .map_err(default_conflict)?;

        metrics::counter!("address_default_changes_total").increment(1);
        tracing::info!(address_id = %address.id, "Default address created");
        Ok(address)
    }

    /// Replaces the fields of one of the user's addresses.
    #[tracing::instrument(skip(self, fields))]
    pub async fn update(
        &self,
        user: UserId,
        id: DocumentId,
        fields: AddressFields,
    ) -> Result<Address> {
        fields.validate()?;
        let _guard = if fields.is_default {
            Some(self.lock_user(user).await)
        } else {
            None
        };

        self.ensure_owned(user, id).await?;
        if fields.is_default {
            self.demote_defaults(user, Some(id)).await?;
        }

        let patch = Patch::new()
            .set("receiverName", fields.receiver_name.trim())
            .set("phoneNumber", fields.phone_number.trim())
            .set("province", fields.province.trim())
            .set("city", fields.city.trim())
            .set("district", fields.district.trim())
            .set("detailAddress", fields.detail_address.trim())
            .set("isDefault", fields.is_default)
            .set("updatedAt", json!(Utc::now()));

        let updated = self
            .store
            .update_document::<Address>(&Self::owned(user, id), &patch, UpdateOptions::new())
            .await
            .map_err(default_conflict)?
            .ok_or_else(|| CommerceError::not_found("address", id))?;

        if fields.is_default {
            metrics::counter!("address_default_changes_total").increment(1);
        }
        Ok(updated)
    }

    /// Deletes one of the user's addresses. No other address is promoted.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, user: UserId, id: DocumentId) -> Result<()> {
        let deleted = self
            .store
            .delete_one(Address::COLLECTION, &Self::owned(user, id))
            .await?;
        if deleted == 0 {
            return Err(CommerceError::not_found("address", id));
        }
        Ok(())
    }

    /// Makes `id` the user's only default address.
    ///
    /// Ownership is checked before anything is demoted, so a foreign id
    /// leaves every flag as it was.
    #[tracing::instrument(skip(self))]
    pub async fn set_default(&self, user: UserId, id: DocumentId) -> Result<Address> {
        let _guard = self.lock_user(user).await;

        self.ensure_owned(user, id).await?;
        self.demote_defaults(user, Some(id)).await?;

        let patch = Patch::new()
            .set("isDefault", true)
            .set("updatedAt", json!(Utc::now()));
        let address = self
            .store
            .update_document::<Address>(&Self::owned(user, id), &patch, UpdateOptions::new())
            .await
            .map_err(default_conflict)?
            .ok_or_else(|| CommerceError::not_found("address", id))?;

        metrics::counter!("address_default_changes_total").increment(1);
        tracing::info!(address_id = %id, "Default address changed");
        Ok(address)
    }
}

fn default_conflict(err: StoreError) -> CommerceError {
    match err.duplicate_index() {
        Some(_) => CommerceError::Conflict(
            "another default address was set concurrently".to_string(),
        ),
        None => err.into(),
    }
}
