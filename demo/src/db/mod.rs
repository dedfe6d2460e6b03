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

//! Database abstraction in terms of the operations needed by the server.

use crate::model::*;
use bedrock_core::clocks::Clock;
use bedrock_core::db::{
    Db, DbError, DbResult, Executor, Filter, Order, Record, Repository, RowMeta, TxExecutor, Value,
    backend_name, map_sqlx_error, run_schema,
};
use futures::future::BoxFuture;
use sqlx::Row;
use sqlx::any::AnyRow;
use std::sync::Arc;


/// Schema to use to initialize a SQLite database.
const SQLITE_SCHEMA: &str = include_str!("sqlite.sql");

/// Schema to use to initialize a MySQL database.
const MYSQL_SCHEMA: &str = include_str!("mysql.sql");

/// Initializes the database schema for the engine behind `ex`.
pub async fn init_schema(ex: &mut Executor) -> DbResult<()> {
    let backend = backend_name(ex);
    let schema = match backend.as_str() {
        "MySQL" => MYSQL_SCHEMA,
        "SQLite" => SQLITE_SCHEMA,
        _ => return Err(DbError::BackendError(format!("Unsupported database {}", backend))),
    };
    run_schema(ex, schema).await
}

impl Record for Demo {
    const TABLE: &'static str = "demos";
    const COLUMNS: &'static [&'static str] = &["title", "content", "status"];

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(self.title().as_ref().as_str()),
            Value::from(self.content().as_str()),
            Value::from(self.status().as_i32()),
        ]
    }

    fn from_row(row: &AnyRow, meta: RowMeta) -> DbResult<Self> {
        let title: String = row.try_get("title").map_err(map_sqlx_error)?;
        let content: String = row.try_get("content").map_err(map_sqlx_error)?;
        let status: i64 = row.try_get("status").map_err(map_sqlx_error)?;
        let status = i32::try_from(status).map_err(|e| {
            DbError::DataIntegrityError(format!("Invalid status {}: {}", status, e))
        })?;

        let mut demo = Demo::new(Title::new(title)?, content, Status::new(status));
        demo.meta = Some(meta);
        Ok(demo)
    }

    fn meta(&self) -> Option<&RowMeta> {
        self.meta.as_ref()
    }

    fn with_meta(mut self, meta: RowMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Columns searched by keyword.
const KEYWORD_COLUMNS: &[&str] = &["title", "content"];

/// Builds the filter to search for demos, newest first.
///
/// An empty `keyword` is the same as no keyword.
fn search_filter(keyword: Option<&str>, status: Option<Status>) -> Filter {
    let mut filter = Filter::all();
    if let Some(keyword) = keyword.filter(|k| !k.is_empty()) {
        filter = filter.any_like(KEYWORD_COLUMNS, format!("%{}%", keyword));
    }
    if let Some(status) = status {
        filter = filter.eq("status", status.as_i32());
    }
    filter.order_by("created_at", Order::Desc).order_by("id", Order::Desc)
}

/// Data access to the `demos` table.
#[derive(Clone)]
pub struct DemoRepository {
    /// Generic operations on the table.
    base: Repository<Demo>,
}

impl DemoRepository {
    /// Creates a new repository backed by the given injected components.
    pub fn new(db: Arc<dyn Db + Send + Sync>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { base: Repository::new(db, clock) }
    }

    /// Obtains an executor for direct access to the pool.
    pub async fn ex(&self) -> DbResult<Executor> {
        self.base.ex().await
    }

    /// Begins a transaction that the caller must commit.
    pub async fn begin(&self) -> DbResult<TxExecutor> {
        self.base.begin().await
    }

    /// Runs `f` inside a transaction that is committed only if `f` succeeds.
    pub async fn transaction<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Executor) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        self.base.transaction(f).await
    }

    /// Gets the demo with `id`.
    pub async fn find_by_id(&self, ex: &mut Executor, id: i64) -> DbResult<Demo> {
        self.base.find_by_id(ex, id).await
    }

    /// Gets all demos sorted by identifier.
    pub async fn find_all(&self, ex: &mut Executor) -> DbResult<Vec<Demo>> {
        self.base.find_all(ex, &Filter::all().order_by("id", Order::Asc)).await
    }

    /// Gets all demos with `status`, newest first.
    pub async fn find_by_status(&self, ex: &mut Executor, status: Status) -> DbResult<Vec<Demo>> {
        self.base.find_all(ex, &search_filter(None, Some(status))).await
    }

    /// Counts the demos with `status`.
    pub async fn count_by_status(&self, ex: &mut Executor, status: Status) -> DbResult<i64> {
        self.base.count(ex, &Filter::all().eq("status", status.as_i32())).await
    }

    /// Checks if any demo is titled `title`.
    pub async fn exists_by_title(&self, ex: &mut Executor, title: &Title) -> DbResult<bool> {
        self.base.exists(ex, &Filter::all().eq("title", title.as_ref().as_str())).await
    }

    /// Gets all demos whose title or content contain `keyword` and that have `status`, newest
    /// first.  Both conditions are optional.
    pub async fn search_all(
        &self,
        ex: &mut Executor,
        keyword: Option<&str>,
        status: Option<Status>,
    ) -> DbResult<Vec<Demo>> {
        self.base.find_all(ex, &search_filter(keyword, status)).await
    }

    /// Same as `search_all` but returns only one `page` of results plus the total count.
    pub async fn search(
        &self,
        ex: &mut Executor,
        keyword: Option<&str>,
        status: Option<Status>,
        page: u32,
        page_size: u32,
    ) -> DbResult<(Vec<Demo>, i64)> {
        self.base.find_page(ex, &search_filter(keyword, status), page, page_size).await
    }

    /// Stores a new `demo`.
    pub async fn create(&self, ex: &mut Executor, demo: Demo) -> DbResult<Demo> {
        self.base.create(ex, demo).await
    }

    /// Stores new `demos` in groups of `batch_size` and returns how many were inserted.
    pub async fn create_many(
        &self,
        ex: &mut Executor,
        demos: &[Demo],
        batch_size: usize,
    ) -> DbResult<u64> {
        self.base.create_in_batches(ex, demos, batch_size).await
    }

    /// Saves all fields of an already-stored `demo`.
    pub async fn update(&self, ex: &mut Executor, demo: Demo) -> DbResult<Demo> {
        self.base.update(ex, demo).await
    }

    /// Sets the `status` of the demo with `id`.
    pub async fn update_status(&self, ex: &mut Executor, id: i64, status: Status) -> DbResult<()> {
        let filter = Filter::all().eq("id", id);
        let fields = [("status", Value::from(status.as_i32()))];
        match self.base.update_fields(ex, &filter, &fields).await? {
            0 => Err(DbError::NotFound),
            _ => Ok(()),
        }
    }

    /// Sets the `status` of all demos in `ids` and returns how many exist.
    ///
    /// This is a bulk maintenance operation so it leaves the update times untouched.
    pub async fn batch_update_status(
        &self,
        ex: &mut Executor,
        ids: &[i64],
        status: Status,
    ) -> DbResult<u64> {
        let filter = Filter::all().is_in("id", ids.iter().copied());
        self.base.update_column(ex, &filter, "status", status.as_i32()).await
    }

    /// Deletes the demo with `id`.
    pub async fn delete(&self, ex: &mut Executor, id: i64) -> DbResult<()> {
        self.base.delete(ex, id).await
    }
}
