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

//! Redis cache backend.

use crate::{CacheError, CacheResult, CacheStore};
use ::redis::aio::ConnectionManager;
use ::redis::{Client, RedisError, cmd};
use async_trait::async_trait;
use bedrock_core::config::RedisSettings;
use log::{debug, warn};
use std::time::Duration;
use url::Url;

/// Maximum time to wait for the server to answer the initial connectivity check.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the connection URL for `settings`.
fn connection_url(settings: &RedisSettings) -> CacheResult<String> {
    let invalid = |what: &str| CacheError::ConfigError(format!("Invalid Redis {}", what));
    let mut url = Url::parse("redis://localhost")
        .map_err(|e| CacheError::ConfigError(format!("Cannot build Redis URL: {}", e)))?;
    url.set_host(Some(&settings.host)).map_err(|_| invalid("host"))?;
    url.set_port(Some(settings.port)).map_err(|()| invalid("port"))?;
    if !settings.password.is_empty() {
        url.set_password(Some(&settings.password)).map_err(|()| invalid("password"))?;
    }
    url.set_path(&settings.db.to_string());
    Ok(url.into())
}

/// Converts a Redis error into a backend error.
fn backend_error(e: RedisError) -> CacheError {
    CacheError::BackendError(e.to_string())
}

/// Cache backend that stores entries in a Redis database.
///
/// The connection manager multiplexes all operations over a single connection and reconnects
/// transparently, so clones of this store are cheap and share the connection.
#[derive(Clone)]
pub struct RedisStore {
    /// Connection to the server.
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to the server described by `settings` and verifies that it answers.
    pub async fn connect(settings: &RedisSettings) -> CacheResult<Self> {
        let url = connection_url(settings)?;
        let client = Client::open(url.as_str())
            .map_err(|e| CacheError::ConfigError(format!("Invalid Redis settings: {}", e)))?;

        let ping = async {
            let mut conn = client.get_connection_manager().await.map_err(backend_error)?;
            let pong: String = cmd("PING").query_async(&mut conn).await.map_err(backend_error)?;
            debug!("Redis at {}:{} answered {}", settings.host, settings.port, pong);
            Ok::<ConnectionManager, CacheError>(conn)
        };
        let conn = match tokio::time::timeout(CONNECT_TIMEOUT, ping).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CacheError::BackendError(format!(
                    "Redis at {}:{} did not answer within {}s",
                    settings.host,
                    settings.port,
                    CONNECT_TIMEOUT.as_secs()
                )));
            }
        };
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> CacheResult<String> {
        let mut conn = self.conn.clone();
        let value: Option<String> = cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::GetFailed(format!("GET {}: {}", key, e)))?;
        value.ok_or(CacheError::Miss)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let mut command = cmd("SET");
        command.arg(key).arg(value);
        if !ttl.is_zero() {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            command.arg("PX").arg(millis);
        }
        command
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::SetFailed(format!("SET {}: {}", key, e)))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        cmd("DEL").arg(key).query_async::<()>(&mut conn).await.map_err(backend_error)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        let millis: i64 = cmd("PTTL").arg(key).query_async(&mut conn).await.map_err(backend_error)?;
        match millis {
            -2 => Err(CacheError::Miss),
            -1 => Ok(None),
            millis => match u64::try_from(millis) {
                Ok(millis) => Ok(Some(Duration::from_millis(millis))),
                Err(_) => {
                    Err(CacheError::BackendError(format!("Invalid PTTL {} for {}", millis, key)))
                }
            },
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        cmd("FLUSHDB").query_async::<()>(&mut conn).await.map_err(backend_error)?;
        warn!("Flushed all Redis cache entries");
        Ok(())
    }
}
