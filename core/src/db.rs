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

//! Generic abstraction to access different database systems.
//!
//! The facilities in this module talk to the database through the sqlx `Any` driver, so the
//! engine is picked at runtime from the configuration.  MySQL is meant for production use and
//! SQLite is primarily intended to support unit tests.  Queries built by this module only use the
//! `?` placeholder syntax, which both engines understand.

use crate::config::{DatabaseDriver, DatabaseSettings};
use crate::model::ModelError;
use async_trait::async_trait;
use log::{debug, warn};
use sqlx::any::AnyPoolOptions;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, AnyPool, Transaction};
use std::time::Duration;
use time::OffsetDateTime;
use url::Url;

mod filter;
pub use filter::{Filter, Order, Value};
mod repository;
pub use repository::{Record, Repository, RowMeta};

/// Database errors.  Any unexpected errors that come from the database are classified as
/// `BackendError`, but errors we know about have more specific types.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DbError {
    /// Indicates that a request to create an entry failed because it already exists.
    #[error("Already exists")]
    AlreadyExists,

    /// Catch-all error type for unexpected database errors.
    #[error("Database error: {0}")]
    BackendError(String),

    /// Indicates a failure processing the data that already exists in the database.
    #[error("Data integrity error: {0}")]
    DataIntegrityError(String),

    /// Indicates that a requested entry does not exist.
    #[error("Entity not found")]
    NotFound,

    /// Indicates that a read query failed.  The message carries the operation that was attempted.
    #[error("{0}")]
    QueryFailed(String),

    /// Indicates that the database is not available (maybe because of too many active concurrent
    /// connections).
    #[error("Unavailable")]
    Unavailable,

    /// Indicates that a write query failed.  The message carries the operation that was attempted.
    #[error("{0}")]
    UpdateFailed(String),
}

impl From<ModelError> for DbError {
    fn from(e: ModelError) -> Self {
        DbError::DataIntegrityError(e.to_string())
    }
}

/// Result type for this module.
pub type DbResult<T> = Result<T, DbError>;

/// Takes a raw SQLx error `e` and converts it to our generic error type.
pub fn map_sqlx_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::ColumnDecode { source, .. } => DbError::DataIntegrityError(source.to_string()),
        sqlx::Error::ColumnNotFound(name) => {
            DbError::DataIntegrityError(format!("Missing column {}", name))
        }
        sqlx::Error::RowNotFound => DbError::NotFound,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => DbError::Unavailable,
        sqlx::Error::Database(ref db) if db.is_unique_violation() => DbError::AlreadyExists,
        e => DbError::BackendError(e.to_string()),
    }
}

/// A database executor backed by either a pool connection or an open transaction.
///
/// All operations in this crate take an `Executor` so that callers decide whether a sequence of
/// calls runs atomically or not.
pub enum Executor {
    /// An executor backed by a pool.  Consecutive operations issued via this executor aren't
    /// guaranteed to see a consistent view of the data.
    PoolExec(PoolConnection<Any>),

    /// An executor backed by a transaction.
    TxExec(Transaction<'static, Any>),
}

impl Executor {
    /// Returns the raw connection to issue `sqlx` queries against.
    pub fn conn(&mut self) -> &mut AnyConnection {
        match self {
            Executor::PoolExec(conn) => &mut **conn,
            Executor::TxExec(tx) => &mut **tx,
        }
    }
}

/// A wrapper for a database executor backed by an open transaction.
pub struct TxExecutor(Executor);

impl TxExecutor {
    /// Returns the executor wrapped by this transaction.
    ///
    /// This would be better called `executor` but this method is used so frequently that it makes
    /// call sites too verbose.
    pub fn ex(&mut self) -> &mut Executor {
        &mut self.0
    }

    /// Commits the transaction.
    pub async fn commit(self) -> DbResult<()> {
        match self.0 {
            Executor::PoolExec(_) => unreachable!("TxExecutor always wraps a transaction"),
            Executor::TxExec(tx) => tx.commit().await.map_err(map_sqlx_error),
        }
    }

    /// Rolls back the transaction.  Dropping the executor without committing has the same effect
    /// but without a way to observe errors.
    pub async fn rollback(self) -> DbResult<()> {
        match self.0 {
            Executor::PoolExec(_) => unreachable!("TxExecutor always wraps a transaction"),
            Executor::TxExec(tx) => tx.rollback().await.map_err(map_sqlx_error),
        }
    }
}

/// Abstraction over the database connection.
#[async_trait]
pub trait Db {
    /// Obtains an executor for direct access to the pool.
    ///
    /// This would be better called `executor` but this method is used so frequently that it makes
    /// call sites too verbose.
    async fn ex(&self) -> DbResult<Executor>;

    /// Begins a transaction.
    ///
    /// It is the responsibility of the caller to call `commit` on the returned executor.  Otherwise
    /// the transaction is rolled back on drop.
    async fn begin(&self) -> DbResult<TxExecutor>;

    /// Closes the connection pool, waiting for checked out connections to be returned.
    async fn close(&self);
}

/// A database backed by an `Any` connection pool.
pub struct PoolDb {
    /// Shared connection pool.  This is a cloneable type that all concurrent operations can use.
    pool: AnyPool,
}

impl Drop for PoolDb {
    fn drop(&mut self) {
        if !self.pool.is_closed() {
            warn!("Dropping connection without having called close() first");
        }
    }
}

#[async_trait]
impl Db for PoolDb {
    async fn ex(&self) -> DbResult<Executor> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        Ok(Executor::PoolExec(conn))
    }

    async fn begin(&self) -> DbResult<TxExecutor> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(TxExecutor(Executor::TxExec(tx)))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Name that selects a private in-memory SQLite database.
const SQLITE_IN_MEMORY: &str = ":memory:";

/// Builds the connection URL for `settings`.
fn connection_url(settings: &DatabaseSettings) -> DbResult<String> {
    match settings.driver {
        DatabaseDriver::Mysql => {
            let invalid = |what: &str| {
                DbError::BackendError(format!("Invalid MySQL {} in database settings", what))
            };
            let mut url = Url::parse("mysql://localhost").map_err(|e| {
                DbError::BackendError(format!("Cannot build MySQL URL: {}", e))
            })?;
            url.set_host(Some(&settings.host)).map_err(|_| invalid("host"))?;
            url.set_port(Some(settings.port)).map_err(|()| invalid("port"))?;
            url.set_username(&settings.username).map_err(|()| invalid("username"))?;
            if !settings.password.is_empty() {
                url.set_password(Some(&settings.password)).map_err(|()| invalid("password"))?;
            }
            url.set_path(&settings.database);
            if !settings.charset.is_empty() {
                url.query_pairs_mut().append_pair("charset", &settings.charset);
            }
            Ok(url.into())
        }
        DatabaseDriver::Sqlite if settings.database == SQLITE_IN_MEMORY => {
            Ok("sqlite::memory:".to_owned())
        }
        DatabaseDriver::Sqlite => Ok(format!("sqlite://{}?mode=rwc", settings.database)),
    }
}

/// Opens a connection pool to the database described by `settings`.
pub async fn connect(settings: &DatabaseSettings) -> DbResult<PoolDb> {
    sqlx::any::install_default_drivers();

    let url = connection_url(settings)?;
    let mut options = AnyPoolOptions::new()
        .max_connections(settings.max_open_conns)
        .min_connections(settings.max_idle_conns)
        .max_lifetime(Duration::from_secs(settings.conn_max_lifetime_secs));
    if settings.driver == DatabaseDriver::Sqlite && settings.database == SQLITE_IN_MEMORY {
        // The database lives as long as its only connection does.
        options =
            options.max_connections(1).min_connections(1).max_lifetime(None).idle_timeout(None);
    }

    let pool = options.connect(&url).await.map_err(map_sqlx_error)?;
    debug!("Connected to {:?} database {}", settings.driver, settings.database);
    Ok(PoolDb { pool })
}

/// Initializes the database with a `schema` consisting of `;`-separated statements.
pub async fn run_schema(ex: &mut Executor, schema: &str) -> DbResult<()> {
    for statement in schema.split(';') {
        if statement.trim().is_empty() {
            continue;
        }
        sqlx::raw_sql(statement).execute(ex.conn()).await.map_err(map_sqlx_error)?;
    }
    Ok(())
}

/// Returns the name of the engine behind `ex`, such as `MySQL` or `SQLite`.
pub fn backend_name(ex: &mut Executor) -> String {
    ex.conn().backend_name().to_owned()
}

/// Converts a timestamp as extracted from the database into an `OffsetDateTime`.
///
/// Timestamps are stored as microseconds since the epoch.  The input must be positive because
/// comparisons between timestamps happen in SQL and negative values would break their ordering.
pub fn build_timestamp(timestamp_us: i64) -> DbResult<OffsetDateTime> {
    if timestamp_us < 0 {
        return Err(DbError::DataIntegrityError(format!(
            "Timestamp cannot be negative: {}",
            timestamp_us
        )));
    }

    OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp_us) * 1000)
        .map_err(|e| DbError::DataIntegrityError(format!("Invalid timestamp: {}", e)))
}

/// Converts a timestamp into the microseconds representation needed by the database.
pub fn unpack_timestamp(ts: OffsetDateTime) -> DbResult<i64> {
    let nanos = ts.unix_timestamp_nanos();
    if nanos < 0 {
        return Err(DbError::DataIntegrityError(format!(
            "Cannot store a negative timestamp: {}",
            ts
        )));
    }
    i64::try_from(nanos / 1000)
        .map_err(|e| DbError::DataIntegrityError(format!("Timestamp out of range: {}", e)))
}

/// Macros and helpers to instantiate tests for multiple database systems.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    pub use paste::paste;

    /// Environment variable with the name of a scratch MySQL database for tests.
    pub const MYSQL_TEST_DATABASE: &str = "MYSQL_TEST_DATABASE";

    /// Connects to a fresh in-memory SQLite database.
    pub async fn setup_sqlite() -> PoolDb {
        let _can_fail = env_logger::builder().is_test(true).try_init();
        let settings = DatabaseSettings {
            driver: DatabaseDriver::Sqlite,
            database: SQLITE_IN_MEMORY.to_owned(),
            max_idle_conns: 1,
            max_open_conns: 1,
            ..Default::default()
        };
        connect(&settings).await.unwrap()
    }

    /// Connects to the MySQL database named by `MYSQL_TEST_DATABASE` on localhost.
    ///
    /// Tests using this must clean up any tables they create because the database is shared
    /// across runs.
    pub async fn setup_mysql() -> PoolDb {
        let _can_fail = env_logger::builder().is_test(true).try_init();
        let database = match std::env::var(MYSQL_TEST_DATABASE) {
            Ok(database) => database,
            Err(e) => panic!("{} must be set: {}", MYSQL_TEST_DATABASE, e),
        };
        let settings = DatabaseSettings {
            driver: DatabaseDriver::Mysql,
            database,
            max_idle_conns: 1,
            max_open_conns: 2,
            ..Default::default()
        };
        connect(&settings).await.unwrap()
    }

    /// Instantiates the `module::name` test for the database configured by `setup`.
    ///
    /// The `extra` metadata parameter can be used to tag the generated tests.
    #[macro_export]
    macro_rules! generate_one_test [
        ( $name:ident, $setup:expr, $module:path $(, #[$extra:meta] )? ) => {
            #[tokio::test]
            $(#[$extra])?
            async fn $name() {
                $crate::db::testutils::paste! {
                    $module :: [< $name >]($setup).await;
                }
            }
        }
    ];

    pub use generate_one_test;

    /// Instantiates a collection of tests for a specific database system.
    ///
    /// The database implementation to run the tests against is determined by the `setup`
    /// expression, which needs to return a database object.  The returned database should also
    /// have been initialized with the desired schema.
    ///
    /// The `extra` metadata parameter can be used to tag the generated tests.
    #[macro_export]
    macro_rules! generate_tests [
        ( #[$extra:meta], $setup:expr, $module:path $(, $name:ident)+ ) => {
            $(
                $crate::db::testutils::generate_one_test!($name, $setup, $module, #[$extra]);
            )+
        };

        ( $setup:expr, $module:path $(, $name:ident)+ ) => {
            $(
                $crate::db::testutils::generate_one_test!($name, $setup, $module);
            )+
        };
    ];

    pub use generate_tests;
}
