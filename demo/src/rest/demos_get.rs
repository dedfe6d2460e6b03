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

//! API to list demos, optionally filtered and paginated.

use crate::driver::Driver;
use crate::model::{Demo, Status};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bedrock_core::rest::{Context, EmptyBody, Envelope, QueryParams, RestError};
use serde::{Deserialize, Serialize};

/// Number of demos per page when the request does not say.
const DEFAULT_PAGE_SIZE: u32 = 10;

/// Query parameters of the request.
#[derive(Deserialize)]
pub(crate) struct ListQuery {
    /// Text that the title or the content of the demos must contain.
    keyword: Option<String>,

    /// Status that the demos must have.
    status: Option<i32>,

    /// 1-based page to return.  All matches are returned if not given.
    page: Option<u32>,

    /// Number of demos per page.  Ignored unless `page` is given.
    page_size: Option<u32>,
}

/// One page of demos.
#[derive(Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub(crate) struct DemoPage {
    /// The demos in this page.
    items: Vec<Demo>,

    /// Number of demos across all pages.
    total: i64,

    /// Number of this page.
    page: u32,

    /// Maximum number of demos per page.
    page_size: u32,
}

/// API handler.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    context: Context,
    QueryParams(query): QueryParams<ListQuery>,
    _: EmptyBody,
) -> Result<Response, RestError> {
    let status = query.status.map(Status::new);
    match query.page {
        None => {
            let demos = driver
                .get_demos(query.keyword, status)
                .await
                .map_err(|e| context.fail(e, "get demos failed"))?;
            Ok(Envelope::ok(demos).into_response())
        }
        Some(page) => {
            let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
            let (items, total) = driver
                .get_demos_page(query.keyword, status, page, page_size)
                .await
                .map_err(|e| context.fail(e, "get demos failed"))?;
            Ok(Envelope::ok(DemoPage { items, total, page, page_size }).into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testutils::*;
    use axum::http;
    use bedrock_core::rest::testutils::*;

    fn route() -> (http::Method, String) {
        (http::Method::GET, "/api/v1/demos".to_owned())
    }

    /// Returns the titles of `demos` in order.
    fn titles(demos: &[Demo]) -> Vec<String> {
        demos.iter().map(|d| d.title().to_string()).collect()
    }

    /// Creates the demos used by the tests below, oldest first.
    async fn populate(context: &TestContext) {
        context.insert("first", "red", Status::ENABLED).await;
        context.insert("second", "blue", Status::DISABLED).await;
        context.insert("third", "dark red", Status::ENABLED).await;
    }

    #[tokio::test]
    async fn test_empty() {
        let context = TestContext::setup().await;

        let demos = OneShotBuilder::new(context.app(), route())
            .send_empty()
            .await
            .expect_data::<Vec<Demo>>()
            .await;
        assert!(demos.is_empty());
    }

    #[tokio::test]
    async fn test_all() {
        let context = TestContext::setup().await;
        populate(&context).await;

        let demos = OneShotBuilder::new(context.app(), route())
            .send_empty()
            .await
            .expect_data::<Vec<Demo>>()
            .await;
        assert_eq!(vec!["third", "second", "first"], titles(&demos));
    }

    #[tokio::test]
    async fn test_filters() {
        let context = TestContext::setup().await;
        populate(&context).await;

        let demos = OneShotBuilder::new(context.app(), route())
            .with_query([("keyword", "red")])
            .send_empty()
            .await
            .expect_data::<Vec<Demo>>()
            .await;
        assert_eq!(vec!["third", "first"], titles(&demos));

        let demos = OneShotBuilder::new(context.app(), route())
            .with_query([("status", "0")])
            .send_empty()
            .await
            .expect_data::<Vec<Demo>>()
            .await;
        assert_eq!(vec!["second"], titles(&demos));
    }

    #[tokio::test]
    async fn test_paged() {
        let context = TestContext::setup().await;
        populate(&context).await;

        let page = OneShotBuilder::new(context.app(), route())
            .with_query([("page", "1"), ("page_size", "2")])
            .send_empty()
            .await
            .expect_data::<DemoPage>()
            .await;
        assert_eq!(vec!["third", "second"], titles(&page.items));
        assert_eq!((3, 1, 2), (page.total, page.page, page.page_size));

        let page = OneShotBuilder::new(context.app(), route())
            .with_query([("page", "2"), ("page_size", "2")])
            .send_empty()
            .await
            .expect_data::<DemoPage>()
            .await;
        assert_eq!(vec!["first"], titles(&page.items));
        assert_eq!((3, 2, 2), (page.total, page.page, page.page_size));
    }

    #[tokio::test]
    async fn test_paged_default_size() {
        let context = TestContext::setup().await;
        populate(&context).await;

        let page = OneShotBuilder::new(context.app(), route())
            .with_query([("page", "1"), ("status", "1")])
            .send_empty()
            .await
            .expect_data::<DemoPage>()
            .await;
        assert_eq!(vec!["third", "first"], titles(&page.items));
        assert_eq!((2, DEFAULT_PAGE_SIZE), (page.total, page.page_size));
    }

    #[tokio::test]
    async fn test_invalid_paging() {
        let context = TestContext::setup().await;

        for (page, page_size, exp_re) in [
            ("0", "10", "^page must be at least 1$"),
            ("1", "0", "^page_size must be between 1 and 100$"),
            ("1", "101", "^page_size must be between 1 and 100$"),
        ] {
            OneShotBuilder::new(context.app(), route())
                .with_query([("page", page), ("page_size", page_size)])
                .send_empty()
                .await
                .expect_status(http::StatusCode::BAD_REQUEST)
                .expect_error(exp_re)
                .await;
        }
    }

    #[tokio::test]
    async fn test_bad_query() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route())
            .with_query([("status", "enabled")])
            .send_empty()
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("^invalid request: ")
            .await;
    }

    test_payload_must_be_empty!(TestContext::setup().await.into_app(), route());
}
