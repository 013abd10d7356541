use async_trait::async_trait;
use common::DocumentId;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

use crate::document::document_id;
use crate::query::{Direction, SortKey};
use crate::store::{DocumentStore, validate_name, validate_patch};
use crate::{FieldSummary, Filter, FindOptions, Patch, Result, StoreError, UniqueIndex, UpdateOptions};

/// A bind parameter for a generated statement.
#[derive(Debug, Clone)]
enum Bind {
    Text(String),
    Json(Value),
    Int(i64),
}

/// Incrementally built WHERE clause with numbered parameters.
#[derive(Debug, Default)]
struct SqlBuilder {
    binds: Vec<Bind>,
}

impl SqlBuilder {
    fn push(&mut self, bind: Bind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len())
    }

    /// Renders `collection = $n AND ...` for a filter.
    fn where_clause(&mut self, collection: &str, filter: &Filter) -> String {
        let mut sql = format!("collection = {}", self.push(Bind::Text(collection.to_string())));

        if !filter.equals.is_empty() {
            let param = self.push(Bind::Json(Value::Object(filter.equals.clone())));
            sql.push_str(&format!(" AND body @> {param}::jsonb"));
        }
        for (field, value) in &filter.not_equals {
            let mut single = Map::new();
            single.insert(field.clone(), value.clone());
            let param = self.push(Bind::Json(Value::Object(single)));
            sql.push_str(&format!(" AND NOT (body @> {param}::jsonb)"));
        }
        for (field, candidates) in &filter.any_of {
            let field_param = self.push(Bind::Text(field.clone()));
            let values_param = self.push(Bind::Json(Value::Array(candidates.clone())));
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM jsonb_array_elements({values_param}::jsonb) AS candidate \
                 WHERE candidate = body -> {field_param}::text)"
            ));
        }
        sql
    }

    /// Renders the ORDER BY list; insertion order always breaks ties.
    fn order_by(&mut self, options: &FindOptions) -> String {
        let mut clauses: Vec<String> = options
            .sort
            .iter()
            .map(|sort| {
                let direction = match sort.direction {
                    Direction::Ascending => "ASC NULLS FIRST",
                    Direction::Descending => "DESC NULLS LAST",
                };
                match &sort.key {
                    SortKey::Field(field) => {
                        let param = self.push(Bind::Text(field.clone()));
                        format!("body -> {param}::text {direction}")
                    }
                    SortKey::Inserted => format!("seq {direction}"),
                }
            })
            .collect();
        clauses.push("seq ASC".to_string());
        clauses.join(", ")
    }

    fn bind<'q>(
        &self,
        mut query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        for bind in &self.binds {
            query = match bind {
                Bind::Text(text) => query.bind(text.clone()),
                Bind::Json(json) => query.bind(json.clone()),
                Bind::Int(int) => query.bind(*int),
            };
        }
        query
    }
}

/// Maps driver errors onto store errors, surfacing unique violations.
fn map_db_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            StoreError::DuplicateKey {
                index: db_err.constraint().unwrap_or("documents_pkey").to_string(),
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        other => StoreError::Database(other),
    }
}

/// Quotes a string as an SQL literal.
fn sql_literal(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

/// PostgreSQL-backed document store.
///
/// All collections share one `documents` table holding JSONB bodies.
/// Equality filters use JSONB containment; unique indexes become partial
/// expression indexes on the table.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_body(row: PgRow) -> Result<Value> {
        Ok(row.try_get("body")?)
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn insert(&self, collection: &str, doc: Value) -> Result<DocumentId> {
        validate_name("collection", collection)?;
        let id = document_id(&doc)?;

        sqlx::query("INSERT INTO documents (id, collection, body) VALUES ($1, $2, $3)")
            .bind(id.as_uuid())
            .bind(collection)
            .bind(&doc)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(id)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let mut builder = SqlBuilder::default();
        let sql = format!(
            "SELECT body FROM documents WHERE {} ORDER BY seq ASC LIMIT 1",
            builder.where_clause(collection, filter)
        );

        let row = builder
            .bind(sqlx::query(&sql))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        row.map(Self::row_to_body).transpose()
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Value>> {
        let mut builder = SqlBuilder::default();
        let mut sql = format!(
            "SELECT body FROM documents WHERE {}",
            builder.where_clause(collection, filter)
        );
        sql.push_str(&format!(" ORDER BY {}", builder.order_by(&options)));

        if let Some(skip) = options.skip {
            let param = builder.push(Bind::Int(i64::try_from(skip).unwrap_or(i64::MAX)));
            sql.push_str(&format!(" OFFSET {param}"));
        }
        if let Some(limit) = options.limit {
            let param = builder.push(Bind::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
            sql.push_str(&format!(" LIMIT {param}"));
        }

        let rows = builder
            .bind(sqlx::query(&sql))
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        rows.into_iter().map(Self::row_to_body).collect()
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut builder = SqlBuilder::default();
        let sql = format!(
            "SELECT COUNT(*) AS count FROM documents WHERE {}",
            builder.where_clause(collection, filter)
        );

        let row = builder
            .bind(sqlx::query(&sql))
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }

    async fn update_many(&self, collection: &str, filter: &Filter, patch: &Patch) -> Result<u64> {
        validate_patch(patch)?;

        let mut builder = SqlBuilder::default();
        let patch_param = builder.push(Bind::Json(Value::Object(patch.set.clone())));
        let sql = format!(
            "UPDATE documents SET body = body || {patch_param}::jsonb WHERE {}",
            builder.where_clause(collection, filter)
        );

        let result = builder
            .bind(sqlx::query(&sql))
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected())
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

        let mut builder = SqlBuilder::default();
        let patch_param = builder.push(Bind::Json(Value::Object(patch.set.clone())));
        let sql = format!(
            r#"
            UPDATE documents SET body = body || {patch_param}::jsonb
            WHERE id = (
                SELECT id FROM documents WHERE {} ORDER BY seq ASC LIMIT 1 FOR UPDATE
            )
            RETURNING body
            "#,
            builder.where_clause(collection, filter)
        );

        if !options.upsert {
            let row = builder
                .bind(sqlx::query(&sql))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;
            return row.map(Self::row_to_body).transpose();
        }

        // Upserts with the same filter serialize on a transaction-scoped
        // advisory lock, so only one of them can insert.
        let lock_key = format!("{collection}:{}", Value::Object(filter.equals.clone()));
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&lock_key)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        let updated = builder
            .bind(sqlx::query(&sql))
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?;

        let body = match updated {
            Some(row) => Self::row_to_body(row)?,
            None => {
                let body = patch.build_upsert(filter, DocumentId::new());
                let id = document_id(&body)?;
                sqlx::query("INSERT INTO documents (id, collection, body) VALUES ($1, $2, $3)")
                    .bind(id.as_uuid())
                    .bind(collection)
                    .bind(&body)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_db_error)?;
                body
            }
        };

        tx.commit().await.map_err(map_db_error)?;
        Ok(Some(body))
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut builder = SqlBuilder::default();
        let sql = format!(
            "DELETE FROM documents WHERE id = (SELECT id FROM documents WHERE {} ORDER BY seq ASC LIMIT 1)",
            builder.where_clause(collection, filter)
        );

        let result = builder
            .bind(sqlx::query(&sql))
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut builder = SqlBuilder::default();
        let sql = format!(
            "DELETE FROM documents WHERE {}",
            builder.where_clause(collection, filter)
        );

        let result = builder
            .bind(sqlx::query(&sql))
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected())
    }

    async fn aggregate(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
    ) -> Result<Option<FieldSummary>> {
        let mut builder = SqlBuilder::default();
        let field_param = builder.push(Bind::Text(field.to_string()));
        let numeric = format!("jsonb_typeof(body -> {field_param}::text) = 'number'");
        let value = format!("(body ->> {field_param}::text)::float8");
        let sql = format!(
            r#"
            SELECT
                COUNT(*) AS count,
                COALESCE(ARRAY_AGG({value} ORDER BY seq) FILTER (WHERE {numeric}), '{{}}') AS vals
            FROM documents
            WHERE {}
            "#,
            builder.where_clause(collection, filter)
        );

        let row = builder
            .bind(sqlx::query(&sql))
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        let count: i64 = row.try_get("count")?;
        if count == 0 {
            return Ok(None);
        }
        let values: Vec<f64> = row.try_get("vals")?;
        Ok(Some(FieldSummary::from_values(count as u64, values)))
    }

    async fn ensure_unique_index(&self, collection: &str, index: UniqueIndex) -> Result<()> {
        validate_name("collection", collection)?;
        validate_name("index", &index.name)?;
        if index.fields.is_empty() {
            return Err(StoreError::InvalidDocument(format!(
                "unique index {} has no fields",
                index.name
            )));
        }
        for field in &index.fields {
            validate_name("field", field)?;
        }
        if !index.partial.not_equals.is_empty() || !index.partial.any_of.is_empty() {
            return Err(StoreError::InvalidDocument(format!(
                "unique index {} may only use equality in its partial filter",
                index.name
            )));
        }

        let columns = index
            .fields
            .iter()
            .map(|field| format!("(body ->> {})", sql_literal(field)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut predicate = format!("collection = {}", sql_literal(collection));
        if !index.partial.equals.is_empty() {
            let partial = Value::Object(index.partial.equals.clone()).to_string();
            predicate.push_str(&format!(" AND body @> {}::jsonb", sql_literal(&partial)));
        }

        // DDL takes no bind parameters; every embedded name was validated above.
        let ddl = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON documents ({columns}) WHERE {predicate}",
            index.name
        );
        sqlx::raw_sql(&ddl)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        tracing::debug!(index = %index.name, %collection, "unique index ensured");
        Ok(())
    }
}
