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

//! High-level data types.

use bedrock_core::db::RowMeta;
use bedrock_core::model::{ModelError, ModelResult};
use derive_getters::Getters;
use derive_more::{AsRef, Display};
use serde::{Deserialize, Serialize};

/// Maximum number of characters in a demo title.
const MAX_TITLE_LENGTH: usize = 200;

/// Newtype pattern for the title of a demo.  Titles are never empty.
#[derive(AsRef, Clone, Debug, Deserialize, Display, PartialEq, Serialize)]
#[serde(into = "String", try_from = "String")]
pub struct Title(String);

impl Title {
    /// Creates a new title after validating its contents.
    pub fn new<S: Into<String>>(title: S) -> ModelResult<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ModelError("title cannot be empty".to_owned()));
        }
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(ModelError(format!(
                "title cannot be longer than {} characters",
                MAX_TITLE_LENGTH
            )));
        }
        Ok(Self(title))
    }
}

impl From<Title> for String {
    fn from(title: Title) -> Self {
        title.0
    }
}

impl TryFrom<String> for Title {
    type Error = ModelError;

    fn try_from(title: String) -> ModelResult<Self> {
        Title::new(title)
    }
}

/// Whether a demo is enabled or not.
///
/// Only `ENABLED` and `DISABLED` have a meaning, but any other value is stored as given so that
/// clients can define their own states.
#[derive(Clone, Copy, Debug, Deserialize, Display, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Status(i32);

impl Status {
    /// The demo is enabled.
    pub const ENABLED: Status = Status(1);

    /// The demo is disabled.
    pub const DISABLED: Status = Status(0);

    /// Creates a status from its raw value.
    pub fn new(status: i32) -> Self {
        Self(status)
    }

    /// Returns the raw value of the status.
    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::ENABLED
    }
}

/// The demo resource.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
pub struct Demo {
    /// Identifier and timestamps, present once the demo has been stored.
    #[getter(skip)]
    #[serde(flatten)]
    pub(crate) meta: Option<RowMeta>,

    /// Title of the demo.
    title: Title,

    /// Free-form content.  Empty if not provided.
    content: String,

    /// Whether the demo is enabled.
    status: Status,
}

impl Demo {
    /// Creates a new demo that has not been stored yet.
    pub fn new(title: Title, content: String, status: Status) -> Self {
        Self { meta: None, title, content, status }
    }

    /// Returns the identifier of the demo, or `None` if it has not been stored yet.
    pub fn id(&self) -> Option<i64> {
        self.meta.as_ref().map(|meta| meta.id)
    }

    /// Returns this demo with all of its user-editable fields replaced.
    pub fn with_fields(self, title: Title, content: String, status: Status) -> Self {
        Self { title, content, status, ..self }
    }
}
