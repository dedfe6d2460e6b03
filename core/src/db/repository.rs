// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Generic CRUD operations over any table described by a `Record`.
//!
//! Services wrap a `Repository<R>` in their own repository type and delegate to it explicitly,
//! adding domain-specific queries on top.  Every operation takes an `Executor` so that the caller
//! decides whether it runs directly on the pool or as part of a transaction.
//!
//! Operations are cancelled by dropping their futures, which aborts the in-flight query.

use crate::clocks::Clock;
use crate::db::{
    Db, DbError, DbResult, Executor, Filter, TxExecutor, Value, backend_name, build_timestamp,
    map_sqlx_error, unpack_timestamp,
};
use futures::future::BoxFuture;
use log::warn;
use serde::{Deserialize, Serialize};
use sqlx::any::{AnyArguments, AnyQueryResult, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, QueryBuilder, Row};
use std::marker::PhantomData;
use std::sync::Arc;
use time::OffsetDateTime;

/// Columns owned by the repository and present in every table it manages.
const META_COLUMNS: &str = "id, created_at, updated_at";

/// Persistence-owned part of a record: the identifier and the bookkeeping timestamps.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RowMeta {
    /// Identifier assigned by the database on insertion.
    pub id: i64,

    /// Time of insertion.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Time of the last update through the repository.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Returns the identifier assigned by the insertion that produced `done` on `ex`.
///
/// The `Any` driver only reports insertion identifiers for MySQL, so SQLite is asked directly.
/// The query must run on the same connection as the insertion.
async fn inserted_id(ex: &mut Executor, done: &AnyQueryResult) -> DbResult<i64> {
    let query = match (backend_name(ex).as_str(), done.last_insert_id()) {
        ("SQLite", _) => "SELECT last_insert_rowid() AS id",
        (_, Some(id)) => return Ok(id),
        (_, None) => "SELECT CAST(LAST_INSERT_ID() AS SIGNED) AS id",
    };
    let row = sqlx::query(query).fetch_one(ex.conn()).await.map_err(map_sqlx_error)?;
    row.try_get("id").map_err(map_sqlx_error)
}

/// Describes how a type maps to a table.
///
/// The table must have an auto-incremented integer `id` column plus `created_at` and `updated_at`
/// integer columns holding microseconds since the epoch.
pub trait Record: Sized + Send {
    /// Name of the table.
    const TABLE: &'static str;

    /// Names of the columns written from `values`, in the same order.
    const COLUMNS: &'static [&'static str];

    /// Returns the values of the columns in `COLUMNS`.
    fn values(&self) -> Vec<Value>;

    /// Builds a record from a `row` that contains all of `COLUMNS` plus its already-decoded `meta`.
    fn from_row(row: &AnyRow, meta: RowMeta) -> DbResult<Self>;

    /// Returns the persistence metadata, or `None` if this record was never stored.
    fn meta(&self) -> Option<&RowMeta>;

    /// Returns this record with its persistence metadata replaced by `meta`.
    fn with_meta(self, meta: RowMeta) -> Self;
}

/// Returns a mapper that wraps unexpected read errors with the failed operation.
fn query_failed(table: &'static str, op: &'static str) -> impl FnOnce(DbError) -> DbError {
    move |e| match e {
        DbError::BackendError(cause) => {
            DbError::QueryFailed(format!("{} on {} failed: {}", op, table, cause))
        }
        e => e,
    }
}

/// Returns a mapper that wraps unexpected write errors with the failed operation.
fn update_failed(table: &'static str, op: &'static str) -> impl FnOnce(DbError) -> DbError {
    move |e| match e {
        DbError::BackendError(cause) => {
            DbError::UpdateFailed(format!("{} on {} failed: {}", op, table, cause))
        }
        e => e,
    }
}

/// Binds `args` in order to the positional parameters of `query`.
fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    args: &[Value],
) -> Query<'q, Any, AnyArguments<'q>> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

/// Generic data access object for the table behind `R`.
pub struct Repository<R> {
    /// Database holding the table.
    db: Arc<dyn Db + Send + Sync>,

    /// Source of the timestamps stamped on rows.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Marker for the record type.
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), clock: self.clock.clone(), _record: PhantomData }
    }
}

impl<R: Record> Repository<R> {
    /// Creates a new repository backed by the given injected components.
    pub fn new(db: Arc<dyn Db + Send + Sync>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { db, clock, _record: PhantomData }
    }

    /// Obtains an executor for direct access to the pool.
    pub async fn ex(&self) -> DbResult<Executor> {
        self.db.ex().await
    }

    /// Begins a transaction that the caller must commit.
    pub async fn begin(&self) -> DbResult<TxExecutor> {
        self.db.begin().await
    }

    /// Runs `f` inside a transaction.
    ///
    /// The transaction is committed if `f` succeeds and rolled back if it fails, in which case the
    /// error from `f` is returned unchanged.
    pub async fn transaction<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Executor) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        let mut tx = self.db.begin().await?;
        let result = f(tx.ex()).await;
        match result {
            Ok(value) => {
                tx.commit().await.map_err(update_failed(R::TABLE, "commit"))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!("Rollback on {} failed after '{}': {}", R::TABLE, e, rollback_error);
                }
                Err(e)
            }
        }
    }

    /// Starts a `SELECT` of all columns of `R`.
    fn select() -> QueryBuilder<'static, Any> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(META_COLUMNS);
        for column in R::COLUMNS {
            qb.push(", ").push(*column);
        }
        qb.push(" FROM ").push(R::TABLE);
        qb
    }

    /// Decodes a row produced by a query started with `select`.
    fn decode(row: &AnyRow) -> DbResult<R> {
        let id: i64 = row.try_get("id").map_err(map_sqlx_error)?;
        let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
        let updated_at: i64 = row.try_get("updated_at").map_err(map_sqlx_error)?;
        let meta = RowMeta {
            id,
            created_at: build_timestamp(created_at)?,
            updated_at: build_timestamp(updated_at)?,
        };
        R::from_row(row, meta)
    }

    /// Fetches the record with `id`.
    pub async fn find_by_id(&self, ex: &mut Executor, id: i64) -> DbResult<R> {
        let mut qb = Self::select();
        qb.push(" WHERE id = ").push_bind(id);
        let row = qb
            .build()
            .fetch_optional(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(query_failed(R::TABLE, "find by id"))?;
        match row {
            Some(row) => Self::decode(&row),
            None => Err(DbError::NotFound),
        }
    }

    /// Fetches the first record that matches `filter`.
    pub async fn find_one(&self, ex: &mut Executor, filter: &Filter) -> DbResult<R> {
        let mut qb = Self::select();
        filter.push_where(&mut qb);
        if filter.is_ordered() {
            filter.push_order(&mut qb);
        } else {
            qb.push(" ORDER BY id");
        }
        qb.push(" LIMIT 1");
        let row = qb
            .build()
            .fetch_optional(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(query_failed(R::TABLE, "find one"))?;
        match row {
            Some(row) => Self::decode(&row),
            None => Err(DbError::NotFound),
        }
    }

    /// Fetches all records that match `filter`.
    pub async fn find_all(&self, ex: &mut Executor, filter: &Filter) -> DbResult<Vec<R>> {
        let mut qb = Self::select();
        filter.push_where(&mut qb);
        filter.push_order(&mut qb);
        let rows = qb
            .build()
            .fetch_all(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(query_failed(R::TABLE, "find all"))?;
        rows.iter().map(Self::decode).collect()
    }

    /// Fetches one page of the records that match `filter` plus the total number of matches.
    ///
    /// Pages are numbered from 1.  Records are sorted by the filter's ordering, or by `id` if it
    /// has none, so that consecutive pages do not overlap.
    pub async fn find_page(
        &self,
        ex: &mut Executor,
        filter: &Filter,
        page: u32,
        page_size: u32,
    ) -> DbResult<(Vec<R>, i64)> {
        if page == 0 {
            return Err(DbError::QueryFailed(format!(
                "find page on {} failed: pages are numbered from 1",
                R::TABLE
            )));
        }

        let total = self.count(ex, filter).await?;

        let mut qb = Self::select();
        filter.push_where(&mut qb);
        if filter.is_ordered() {
            filter.push_order(&mut qb);
        } else {
            qb.push(" ORDER BY id");
        }
        let offset = (i64::from(page) - 1) * i64::from(page_size);
        qb.push(" LIMIT ").push_bind(i64::from(page_size));
        qb.push(" OFFSET ").push_bind(offset);
        let rows = qb
            .build()
            .fetch_all(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(query_failed(R::TABLE, "find page"))?;
        let records = rows.iter().map(Self::decode).collect::<DbResult<Vec<R>>>()?;
        Ok((records, total))
    }

    /// Counts the records that match `filter`.
    pub async fn count(&self, ex: &mut Executor, filter: &Filter) -> DbResult<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) AS count FROM ");
        qb.push(R::TABLE);
        filter.push_where(&mut qb);
        let row = qb
            .build()
            .fetch_one(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(query_failed(R::TABLE, "count"))?;
        row.try_get("count").map_err(map_sqlx_error)
    }

    /// Checks if any record matches `filter` without counting all of them.
    pub async fn exists(&self, ex: &mut Executor, filter: &Filter) -> DbResult<bool> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) AS count FROM (SELECT 1 FROM ");
        qb.push(R::TABLE);
        filter.push_where(&mut qb);
        qb.push(" LIMIT 1) AS matches");
        let row = qb
            .build()
            .fetch_one(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(query_failed(R::TABLE, "exists"))?;
        let count: i64 = row.try_get("count").map_err(map_sqlx_error)?;
        Ok(count > 0)
    }

    /// Stores a new `record` and returns it with its assigned identifier and timestamps.
    pub async fn create(&self, ex: &mut Executor, record: R) -> DbResult<R> {
        if let Some(meta) = record.meta() {
            return Err(DbError::DataIntegrityError(format!(
                "Record {} in {} is already stored",
                meta.id,
                R::TABLE
            )));
        }

        let now = self.clock.now_utc();
        let now_us = unpack_timestamp(now)?;

        let mut qb = QueryBuilder::new("INSERT INTO ");
        qb.push(R::TABLE).push(" (created_at, updated_at");
        for column in R::COLUMNS {
            qb.push(", ").push(*column);
        }
        qb.push(") VALUES (").push_bind(now_us).push(", ").push_bind(now_us);
        for value in record.values() {
            qb.push(", ");
            value.push_bind(&mut qb);
        }
        qb.push(")");

        let done = qb
            .build()
            .execute(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(update_failed(R::TABLE, "create"))?;
        let id = inserted_id(ex, &done).await.map_err(update_failed(R::TABLE, "create"))?;
        Ok(record.with_meta(RowMeta { id, created_at: now, updated_at: now }))
    }

    /// Stores new `records` using multi-row inserts of up to `batch_size` rows each.
    ///
    /// A `batch_size` of zero inserts everything at once.  Returns the number of inserted rows;
    /// the assigned identifiers are not reported back.
    pub async fn create_in_batches(
        &self,
        ex: &mut Executor,
        records: &[R],
        batch_size: usize,
    ) -> DbResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let batch_size = if batch_size == 0 { records.len() } else { batch_size };

        let now_us = unpack_timestamp(self.clock.now_utc())?;

        let mut inserted = 0;
        for batch in records.chunks(batch_size) {
            let mut qb = QueryBuilder::new("INSERT INTO ");
            qb.push(R::TABLE).push(" (created_at, updated_at");
            for column in R::COLUMNS {
                qb.push(", ").push(*column);
            }
            qb.push(") VALUES ");
            for (i, record) in batch.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                qb.push("(").push_bind(now_us).push(", ").push_bind(now_us);
                for value in record.values() {
                    qb.push(", ");
                    value.push_bind(&mut qb);
                }
                qb.push(")");
            }
            let done = qb
                .build()
                .execute(ex.conn())
                .await
                .map_err(map_sqlx_error)
                .map_err(update_failed(R::TABLE, "create in batches"))?;
            inserted += done.rows_affected();
        }
        Ok(inserted)
    }

    /// Replaces all columns of a stored `record` and bumps its update time.
    pub async fn update(&self, ex: &mut Executor, record: R) -> DbResult<R> {
        let meta = match record.meta() {
            Some(meta) => meta.clone(),
            None => {
                return Err(DbError::DataIntegrityError(format!(
                    "Cannot update a record that is not stored in {}",
                    R::TABLE
                )));
            }
        };

        let now = self.clock.now_utc();

        let mut qb = QueryBuilder::new("UPDATE ");
        qb.push(R::TABLE).push(" SET updated_at = ").push_bind(unpack_timestamp(now)?);
        for (column, value) in R::COLUMNS.iter().zip(record.values()) {
            qb.push(", ").push(*column).push(" = ");
            value.push_bind(&mut qb);
        }
        qb.push(" WHERE id = ").push_bind(meta.id);

        let done = qb
            .build()
            .execute(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(update_failed(R::TABLE, "update"))?;
        if done.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(record.with_meta(RowMeta { updated_at: now, ..meta }))
    }

    /// Sets the given `fields` on all records that match `filter` and bumps their update time.
    ///
    /// Returns the number of affected records.
    pub async fn update_fields(
        &self,
        ex: &mut Executor,
        filter: &Filter,
        fields: &[(&'static str, Value)],
    ) -> DbResult<u64> {
        let now_us = unpack_timestamp(self.clock.now_utc())?;

        let mut qb = QueryBuilder::new("UPDATE ");
        qb.push(R::TABLE).push(" SET updated_at = ").push_bind(now_us);
        for (column, value) in fields {
            qb.push(", ").push(*column).push(" = ");
            value.push_bind(&mut qb);
        }
        filter.push_where(&mut qb);

        let done = qb
            .build()
            .execute(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(update_failed(R::TABLE, "update fields"))?;
        Ok(done.rows_affected())
    }

    /// Sets a single `column` on all records that match `filter`.
    ///
    /// Unlike `update_fields`, this leaves `updated_at` untouched.  Returns the number of affected
    /// records.
    pub async fn update_column<V: Into<Value>>(
        &self,
        ex: &mut Executor,
        filter: &Filter,
        column: &'static str,
        value: V,
    ) -> DbResult<u64> {
        let mut qb = QueryBuilder::new("UPDATE ");
        qb.push(R::TABLE).push(" SET ").push(column).push(" = ");
        value.into().push_bind(&mut qb);
        filter.push_where(&mut qb);

        let done = qb
            .build()
            .execute(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(update_failed(R::TABLE, "update column"))?;
        Ok(done.rows_affected())
    }

    /// Deletes the record with `id`.
    pub async fn delete(&self, ex: &mut Executor, id: i64) -> DbResult<()> {
        let mut qb = QueryBuilder::new("DELETE FROM ");
        qb.push(R::TABLE).push(" WHERE id = ").push_bind(id);
        let done = qb
            .build()
            .execute(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(update_failed(R::TABLE, "delete"))?;
        match done.rows_affected() {
            0 => Err(DbError::NotFound),
            1 => Ok(()),
            n => Err(DbError::DataIntegrityError(format!(
                "Deleting id {} from {} affected {} rows",
                id,
                R::TABLE,
                n
            ))),
        }
    }

    /// Deletes all records that match `filter` and returns how many there were.
    pub async fn delete_where(&self, ex: &mut Executor, filter: &Filter) -> DbResult<u64> {
        let mut qb = QueryBuilder::new("DELETE FROM ");
        qb.push(R::TABLE);
        filter.push_where(&mut qb);
        let done = qb
            .build()
            .execute(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(update_failed(R::TABLE, "delete where"))?;
        Ok(done.rows_affected())
    }

    /// Runs an arbitrary statement with positional `args` and returns the number of affected rows.
    pub async fn exec(&self, ex: &mut Executor, sql: &str, args: &[Value]) -> DbResult<u64> {
        let done = bind_all(sqlx::query(sql), args)
            .execute(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(update_failed(R::TABLE, "exec"))?;
        Ok(done.rows_affected())
    }

    /// Runs an arbitrary query with positional `args` and returns the raw rows.
    pub async fn raw(&self, ex: &mut Executor, sql: &str, args: &[Value]) -> DbResult<Vec<AnyRow>> {
        bind_all(sqlx::query(sql), args)
            .fetch_all(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .map_err(query_failed(R::TABLE, "raw"))
    }
}
