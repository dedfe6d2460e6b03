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

//! Random string generators.

use rand::Rng;

/// Lowercase ASCII letters.
pub const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";

/// Uppercase ASCII letters.
pub const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// ASCII digits.
pub const DIGITS: &str = "0123456789";

/// Generates a string of `length` characters picked uniformly from `charset`.
///
/// Returns an empty string if `charset` is empty.
pub fn custom(length: usize, charset: &str) -> String {
    let chars = charset.chars().collect::<Vec<char>>();
    if chars.is_empty() {
        return String::new();
    }
    let mut rng = rand::rng();
    (0..length).map(|_| chars[rng.random_range(0..chars.len())]).collect()
}

/// Generates a string of `length` letters and digits.
pub fn alphanumeric(length: usize) -> String {
    custom(length, &format!("{}{}{}", LOWERCASE, UPPERCASE, DIGITS))
}

/// Generates a string of `length` lowercase letters.
pub fn lowercase(length: usize) -> String {
    custom(length, LOWERCASE)
}

/// Generates a string of `length` uppercase letters.
pub fn uppercase(length: usize) -> String {
    custom(length, UPPERCASE)
}

/// Generates a string of `length` digits.
pub fn digits(length: usize) -> String {
    custom(length, DIGITS)
}
