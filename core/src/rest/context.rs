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

//! Per-request context available to every handler.

use crate::driver::DriverError;
use crate::rest::RestError;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::Method;
use axum::http::request::Parts;
use log::error;
use std::convert::Infallible;
use std::fmt;

/// Identifier of a request, stored in the request extensions by the `request_id` middleware.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Details about the request being served that handlers need to log and report failures.
///
/// Handlers take a `Context` as their first argument so that business code never touches the
/// framework's request types directly.
#[derive(Clone, Debug)]
pub struct Context {
    /// Identifier of the request, or `-` if the `request_id` middleware did not run.
    request_id: RequestId,

    /// HTTP method of the request.
    method: Method,

    /// Path of the request, without the query.
    path: String,
}

impl Context {
    /// Returns the identifier of the request.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Returns the HTTP method of the request.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the path of the request.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Converts a business error into the error reported to the user.
    ///
    /// Not-found and invalid-input errors carry their own messages because they are meant for the
    /// user.  Any other error is logged together with the request details and replaced by the
    /// generic `message`.
    pub fn fail(&self, e: DriverError, message: &str) -> RestError {
        match e {
            DriverError::NotFound(_)
            | DriverError::InvalidInput(_)
            | DriverError::AlreadyExists(_) => e.into(),
            e => {
                error!("[{}] {} {}: {}: {}", self.request_id, self.method, self.path, message, e);
                RestError::InternalError(message.to_owned())
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Context
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = match parts.extensions.get::<RequestId>() {
            Some(request_id) => request_id.clone(),
            None => RequestId("-".to_owned()),
        };
        Ok(Context { request_id, method: parts.method.clone(), path: parts.uri.path().to_owned() })
    }
}
