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

//! Operations on the collection of demos.

use crate::driver::Driver;
use crate::model::*;
use bedrock_core::driver::{DriverError, DriverResult};
use log::error;

/// Largest number of demos returned in a single page.
pub(crate) const MAX_PAGE_SIZE: u32 = 100;

impl Driver {
    /// Gets all demos whose title or content contain `keyword` and that have `status`, newest
    /// first.  Both conditions are optional.
    pub(crate) async fn get_demos(
        self,
        keyword: Option<String>,
        status: Option<Status>,
    ) -> DriverResult<Vec<Demo>> {
        let mut ex = self.demos.ex().await?;
        let demos =
            self.demos.search_all(&mut ex, keyword.as_deref(), status).await.map_err(|e| {
                error!("get demos failed for keyword {:?} and status {:?}: {}", keyword, status, e);
                e
            })?;
        Ok(demos)
    }

    /// Same as `get_demos` but returns only the 1-based `page` of `page_size` demos plus the total
    /// number of matches.
    pub(crate) async fn get_demos_page(
        self,
        keyword: Option<String>,
        status: Option<Status>,
        page: u32,
        page_size: u32,
    ) -> DriverResult<(Vec<Demo>, i64)> {
        if page == 0 {
            return Err(DriverError::InvalidInput("page must be at least 1".to_owned()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(DriverError::InvalidInput(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let mut ex = self.demos.ex().await?;
        let result = self
            .demos
            .search(&mut ex, keyword.as_deref(), status, page, page_size)
            .await
            .map_err(|e| {
                error!("get demos page {} failed for keyword {:?}: {}", page, keyword, e);
                e
            })?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;

    /// Returns the titles of `demos` in order.
    fn titles(demos: &[Demo]) -> Vec<String> {
        demos.iter().map(|d| d.title().to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_demos_none() {
        let context = TestContext::setup().await;

        let demos = context.driver().get_demos(None, None).await.unwrap();
        assert!(demos.is_empty());
    }

    #[tokio::test]
    async fn test_get_demos_filters() {
        let context = TestContext::setup().await;

        context.insert("first", "red", Status::ENABLED).await;
        context.insert("second", "blue", Status::DISABLED).await;
        context.insert("third", "reddish", Status::ENABLED).await;

        let demos = context.driver().get_demos(None, None).await.unwrap();
        assert_eq!(vec!["third", "second", "first"], titles(&demos));

        let demos = context.driver().get_demos(Some("red".to_owned()), None).await.unwrap();
        assert_eq!(vec!["third", "first"], titles(&demos));

        let demos = context.driver().get_demos(None, Some(Status::DISABLED)).await.unwrap();
        assert_eq!(vec!["second"], titles(&demos));

        let demos = context
            .driver()
            .get_demos(Some("blue".to_owned()), Some(Status::ENABLED))
            .await
            .unwrap();
        assert!(demos.is_empty());
    }

    #[tokio::test]
    async fn test_get_demos_page() {
        let context = TestContext::setup().await;

        context.insert("first", "", Status::ENABLED).await;
        context.insert("second", "", Status::ENABLED).await;
        context.insert("third", "", Status::ENABLED).await;

        let (demos, total) = context.driver().get_demos_page(None, None, 1, 2).await.unwrap();
        assert_eq!(3, total);
        assert_eq!(vec!["third", "second"], titles(&demos));

        let (demos, total) = context.driver().get_demos_page(None, None, 2, 2).await.unwrap();
        assert_eq!(3, total);
        assert_eq!(vec!["first"], titles(&demos));
    }

    #[tokio::test]
    async fn test_get_demos_page_invalid() {
        let context = TestContext::setup().await;

        assert_eq!(
            DriverError::InvalidInput("page must be at least 1".to_owned()),
            context.driver().get_demos_page(None, None, 0, 10).await.unwrap_err()
        );
        for page_size in [0, MAX_PAGE_SIZE + 1] {
            assert_eq!(
                DriverError::InvalidInput("page_size must be between 1 and 100".to_owned()),
                context.driver().get_demos_page(None, None, 1, page_size).await.unwrap_err()
            );
        }
        context.driver().get_demos_page(None, None, 1, MAX_PAGE_SIZE).await.unwrap();
    }
}
