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

//! Sample CRUD service that manages demo records.
//!
//! This crate doubles as the template that `scripts/new_project.sh` clones to start new services.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use bedrock_core::clocks::SystemClock;
use bedrock_core::config::Settings;
use bedrock_core::db::{self as core_db, Db};
use bedrock_core::rest::wrap;
use log::{info, warn};
use std::error::Error;
use std::future::IntoFuture;
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinError;

pub mod db;
use db::{DemoRepository, init_schema};
pub(crate) mod driver;
use driver::Driver;
pub mod model;
mod rest;

/// Waits until the process is asked to terminate.
async fn shutdown_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT; starting graceful shutdown");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM; starting graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C; starting graceful shutdown");
    }

    Ok(())
}

/// Collapses the outcome of the server task into a single result.
fn server_result(result: Result<io::Result<()>, JoinError>) -> Result<(), Box<dyn Error>> {
    Ok(result??)
}

/// Instantiates all resources to serve the application as described by `settings`.
///
/// Returns once the server has been asked to terminate and in-flight requests have completed, or
/// once the shutdown grace period expires, whichever comes first.
///
/// While it'd be nice to push this responsibility to `main`, doing so would force us to expose many
/// crate-internal types to the public, which in turn would make dead code detection harder.
pub async fn serve(settings: Settings) -> Result<(), Box<dyn Error>> {
    let db: Arc<dyn Db + Send + Sync> = Arc::new(core_db::connect(&settings.database).await?);
    init_schema(&mut db.ex().await?).await?;

    let cache = bedrock_cache::connect(&settings.cache, &settings.redis).await?;
    let demos = DemoRepository::new(db.clone(), Arc::new(SystemClock::default()));
    let driver = Driver::new(demos, cache);
    let app = wrap(rest::app(driver), &settings.server, &settings.cors);

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, settings.server.port)).await?;
    info!("Listening on {} in {:?} mode", listener.local_addr()?, settings.server.mode);

    let drain = Arc::new(Notify::new());
    let server = {
        let drain = drain.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { drain.notified().await })
            .into_future()
    };
    let mut server = tokio::spawn(server);

    let result: Result<(), Box<dyn Error>> = tokio::select! {
        result = &mut server => {
            // The server only stops on its own if it hit an error.
            server_result(result)
        }
        signal = shutdown_signal() => {
            signal?;
            drain.notify_one();
            match tokio::time::timeout(settings.server.shutdown_timeout(), &mut server).await {
                Ok(result) => server_result(result),
                Err(_) => {
                    warn!("In-flight requests did not finish in time; forcing shutdown");
                    server.abort();
                    Ok(())
                }
            }
        }
    };

    db.close().await;
    info!("Server stopped");
    result
}
