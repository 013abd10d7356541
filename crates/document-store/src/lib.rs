pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::DocumentId;
pub use document::Document;
pub use error::{Result, StoreError};
pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use query::{
    Direction, FieldSummary, Filter, FindOptions, Patch, Sort, SortKey, UniqueIndex, UpdateOptions,
};
pub use store::{DocumentStore, DocumentStoreExt};
