//! Fetcher trait for pulling transfer pages from the upstream API

pub mod http;
pub mod retry;

use async_trait::async_trait;
use std::sync::Arc;

use crate::etl::error::FetchError;
use crate::etl::transfer::{Page, QueryScope};

pub use http::{Credentials, FetcherConfig, HttpTransferFetcher};
pub use retry::RetryPolicy;

/// Issues one paginated request against the upstream API.
///
/// # Contract
///
/// - `cursor` is `None` at the start of a scope, otherwise a cursor previously
///   returned for the *same* scope.
/// - Exactly one network round trip per call; retrying is the caller's job.
/// - A page with zero transfers means the scope is exhausted.
#[async_trait]
pub trait TransferFetcher: Send + Sync {
    async fn fetch(&self, scope: &QueryScope, cursor: Option<&str>) -> Result<Page, FetchError>;
}

#[async_trait]
impl<T: TransferFetcher + ?Sized> TransferFetcher for Arc<T> {
    async fn fetch(&self, scope: &QueryScope, cursor: Option<&str>) -> Result<Page, FetchError> {
        (**self).fetch(scope, cursor).await
    }
}
