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

//! Checksum-based request authentication.
//!
//! Clients sign each request by sending a `nonce`, a `timestamp` in seconds since the epoch and a
//! `checksum` computed as the hex-encoded SHA-1 of `secret + nonce + timestamp`.  The secret is
//! shared out of band and never travels on the wire.

use crate::clocks::Clock;
use http::HeaderMap;
use sha1::{Digest, Sha1};
use std::time::Duration;
use subtle::ConstantTimeEq;

/// Name of the header carrying the request nonce.
pub const HEADER_NONCE: &str = "nonce";

/// Name of the header carrying the request timestamp.
pub const HEADER_TIMESTAMP: &str = "timestamp";

/// Name of the header carrying the request checksum.
pub const HEADER_CHECKSUM: &str = "checksum";

/// Authentication errors.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SecurityError {
    /// Indicates that one of the authentication headers is missing or malformed.
    #[error("Missing authentication parameter {0}")]
    MissingAuthParams(&'static str),

    /// Indicates that the timestamp is not a number or is too far from the current time.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Indicates that the checksum does not match the request.
    #[error("Invalid checksum")]
    InvalidChecksum,
}

/// Result type for this module.
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Returns the hex-encoded SHA-1 digest of `data`.
pub fn sha1_hex(data: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes the checksum a client must send for the given parameters.
pub fn compute_checksum(secret: &str, nonce: &str, timestamp: &str) -> String {
    sha1_hex(&format!("{}{}{}", secret, nonce, timestamp))
}

/// Checks if `checksum` matches the parameters, comparing in constant time.
pub fn validate_checksum(checksum: &str, timestamp: &str, nonce: &str, secret: &str) -> bool {
    let expected = compute_checksum(secret, nonce, timestamp);
    let actual = checksum.to_ascii_lowercase();
    expected.as_bytes().ct_eq(actual.as_bytes()).into()
}

/// Extracts the textual value of header `name` from `headers`.
fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> SecurityResult<&'a str> {
    match headers.get(name).map(|v| v.to_str()) {
        Some(Ok(value)) if !value.is_empty() => Ok(value),
        _ => Err(SecurityError::MissingAuthParams(name)),
    }
}

/// Validates signed requests against a shared secret.
pub struct ChecksumAuth<C> {
    /// Shared secret used to sign requests.
    secret: String,

    /// Maximum allowed difference between the request timestamp and the current time.
    max_skew: Duration,

    /// Source of the current time.
    clock: C,
}

impl<C: Clock> ChecksumAuth<C> {
    /// Creates a new validator for `secret` that tolerates `max_skew` of clock drift.
    pub fn new<S: Into<String>>(secret: S, max_skew: Duration, clock: C) -> Self {
        Self { secret: secret.into(), max_skew, clock }
    }

    /// Verifies the authentication headers of a request.
    pub fn verify(&self, headers: &HeaderMap) -> SecurityResult<()> {
        let nonce = header(headers, HEADER_NONCE)?;
        let timestamp = header(headers, HEADER_TIMESTAMP)?;
        let checksum = header(headers, HEADER_CHECKSUM)?;

        let ts = timestamp
            .parse::<i64>()
            .map_err(|e| SecurityError::InvalidTimestamp(format!("{}: {}", timestamp, e)))?;
        let now = self.clock.now_utc().unix_timestamp();
        if ts.abs_diff(now) > self.max_skew.as_secs() {
            return Err(SecurityError::InvalidTimestamp(format!(
                "{} is more than {}s away from the server time",
                timestamp,
                self.max_skew.as_secs()
            )));
        }

        if !validate_checksum(checksum, timestamp, nonce, &self.secret) {
            return Err(SecurityError::InvalidChecksum);
        }
        Ok(())
    }
}
