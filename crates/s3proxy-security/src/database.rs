//! Table-aware security decisions.
//!
//! Buckets that back database tables are authorized differently from plain
//! object storage. A [`S3DatabaseSecurityFacade`] first names the table a
//! request touches, then decides on either the table operation or the
//! non-table operation. [`S3DatabaseSecurityDecorator`] adapts such a facade
//! to the generic [`S3SecurityFacadeProvider`] chain and records every
//! decision into the request's logging session.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use s3proxy_core::{ParsedS3Request, ProxyResult, SigningMetadata};

use crate::facade::{S3SecurityFacade, S3SecurityFacadeProvider, SecurityResponse};
use crate::logging::RequestLoggingSession;

/// Per-request table-aware decision.
#[async_trait]
pub trait S3DatabaseSecurityFacade: Send + Sync {
    /// The table `request` operates on, if it touches one.
    async fn table_name(
        &self,
        request: &ParsedS3Request,
        action: Option<&str>,
    ) -> ProxyResult<Option<String>>;

    /// Decide on an operation against `table_name`.
    async fn table_operation(
        &self,
        request: &ParsedS3Request,
        table_name: &str,
        action: Option<&str>,
    ) -> ProxyResult<SecurityResponse>;

    /// Decide on an operation that does not touch a table.
    async fn non_table_operation(
        &self,
        request: &ParsedS3Request,
        action: Option<&str>,
    ) -> ProxyResult<SecurityResponse>;
}

/// Creates a table-aware facade for each request.
#[async_trait]
pub trait S3DatabaseSecurityFacadeProvider: Send + Sync + fmt::Debug {
    /// Build the facade deciding on `request`.
    async fn facade_for_request(
        &self,
        request: &ParsedS3Request,
        metadata: &SigningMetadata,
    ) -> ProxyResult<Box<dyn S3DatabaseSecurityFacade>>;
}

/// Adapts an [`S3DatabaseSecurityFacadeProvider`] to [`S3SecurityFacadeProvider`].
#[derive(Debug, Clone)]
pub struct S3DatabaseSecurityDecorator {
    delegate: Arc<dyn S3DatabaseSecurityFacadeProvider>,
}

impl S3DatabaseSecurityDecorator {
    /// Wrap `delegate`.
    #[must_use]
    pub fn new(delegate: Arc<dyn S3DatabaseSecurityFacadeProvider>) -> Self {
        Self { delegate }
    }
}

struct DecoratedFacade {
    inner: Box<dyn S3DatabaseSecurityFacade>,
    request: ParsedS3Request,
    session: Arc<dyn RequestLoggingSession>,
}

impl DecoratedFacade {
    async fn decide(&self, action: Option<&str>) -> ProxyResult<SecurityResponse> {
        let table = self.inner.table_name(&self.request, action).await?;
        match table {
            Some(table) => {
                self.session.log_property("security.table", &table);
                self.inner
                    .table_operation(&self.request, &table, action)
                    .await
            }
            None => self.inner.non_table_operation(&self.request, action).await,
        }
    }
}

#[async_trait]
impl S3SecurityFacade for DecoratedFacade {
    async fn apply(&self, action: Option<&str>) -> ProxyResult<SecurityResponse> {
        self.session
            .log_property("security.bucket", &self.request.bucket_name);
        self.session
            .log_property("security.key", &self.request.key_in_bucket);
        self.session
            .log_property("security.action", action.unwrap_or(""));

        match self.decide(action).await {
            Ok(SecurityResponse::Success) => {
                self.session.log_property("security.decision", "allow");
                Ok(SecurityResponse::Success)
            }
            Ok(SecurityResponse::Failure(reason)) => {
                self.session.log_property("security.decision", "deny");
                if let Some(reason) = reason.as_deref() {
                    self.session.log_property("security.reason", reason);
                }
                Ok(SecurityResponse::Failure(reason))
            }
            Err(e) => {
                self.session.log_error("security", &e.to_string());
                Err(e)
            }
        }
    }
}

#[async_trait]
impl S3SecurityFacadeProvider for S3DatabaseSecurityDecorator {
    async fn facade_for_request(
        &self,
        request: &ParsedS3Request,
        metadata: &SigningMetadata,
        session: Arc<dyn RequestLoggingSession>,
    ) -> ProxyResult<Box<dyn S3SecurityFacade>> {
        let inner = match self.delegate.facade_for_request(request, metadata).await {
            Ok(inner) => inner,
            Err(e) => {
                session.log_error("security", &e.to_string());
                return Err(e);
            }
        };
        Ok(Box::new(DecoratedFacade {
            inner,
            request: request.clone(),
            session,
        }))
    }
}

#[cfg(test)]
mod tests {
    use s3proxy_core::ProxyError;

    use super::*;
    use crate::facade::SecurityController;
    use crate::facade::tests::{metadata, request};
    use crate::logging::TracingLoggingSession;

    /// Buckets named `db-*` hold one table per top-level key prefix; tables
    /// are read-only.
    #[derive(Debug)]
    struct ReadOnlyTablesProvider;

    struct ReadOnlyTablesFacade;

    #[async_trait]
    impl S3DatabaseSecurityFacade for ReadOnlyTablesFacade {
        async fn table_name(
            &self,
            request: &ParsedS3Request,
            _action: Option<&str>,
        ) -> ProxyResult<Option<String>> {
            if request.bucket_name == "broken" {
                return Err(ProxyError::upstream("catalog unavailable"));
            }
            if !request.bucket_name.starts_with("db-") {
                return Ok(None);
            }
            Ok(request
                .key_in_bucket
                .split('/')
                .next()
                .filter(|t| !t.is_empty())
                .map(str::to_owned))
        }

        async fn table_operation(
            &self,
            request: &ParsedS3Request,
            table_name: &str,
            _action: Option<&str>,
        ) -> ProxyResult<SecurityResponse> {
            if request.http_verb == "GET" {
                Ok(SecurityResponse::Success)
            } else {
                Ok(SecurityResponse::failure(format!("{table_name} is read-only")))
            }
        }

        async fn non_table_operation(
            &self,
            _request: &ParsedS3Request,
            action: Option<&str>,
        ) -> ProxyResult<SecurityResponse> {
            if action == Some("acl") {
                Ok(SecurityResponse::Failure(None))
            } else {
                Ok(SecurityResponse::Success)
            }
        }
    }

    #[async_trait]
    impl S3DatabaseSecurityFacadeProvider for ReadOnlyTablesProvider {
        async fn facade_for_request(
            &self,
            _request: &ParsedS3Request,
            _metadata: &SigningMetadata,
        ) -> ProxyResult<Box<dyn S3DatabaseSecurityFacade>> {
            Ok(Box::new(ReadOnlyTablesFacade))
        }
    }

    fn controller() -> SecurityController {
        SecurityController::new(Arc::new(S3DatabaseSecurityDecorator::new(Arc::new(
            ReadOnlyTablesProvider,
        ))))
    }

    fn property(session: &TracingLoggingSession, name: &str) -> Option<String> {
        session
            .properties()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    #[tokio::test]
    async fn test_should_route_table_requests_to_table_operation() {
        let session = Arc::new(TracingLoggingSession::new("req-1"));
        let mut put = request("db-sales", "orders/part-0.parquet", None);
        put.http_verb = "PUT".to_owned();

        let response = controller()
            .apply(&put, &metadata(), session.clone())
            .await
            .unwrap();

        assert_eq!(response, SecurityResponse::failure("orders is read-only"));
        assert_eq!(property(&session, "security.table").as_deref(), Some("orders"));
        assert_eq!(property(&session, "security.decision").as_deref(), Some("deny"));
        assert_eq!(property(&session, "security.bucket").as_deref(), Some("db-sales"));
    }

    #[tokio::test]
    async fn test_should_route_plain_requests_to_non_table_operation() {
        let session = Arc::new(TracingLoggingSession::new("req-1"));

        let allowed = controller()
            .apply(&request("logs", "a.txt", None), &metadata(), session.clone())
            .await
            .unwrap();
        assert_eq!(allowed, SecurityResponse::Success);
        assert_eq!(property(&session, "security.table"), None);
        assert_eq!(property(&session, "security.decision").as_deref(), Some("allow"));

        let denied = controller()
            .apply(&request("logs", "a.txt", Some("acl")), &metadata(), session.clone())
            .await
            .unwrap();
        assert_eq!(denied, SecurityResponse::Failure(None));
        assert_eq!(property(&session, "security.action").as_deref(), Some("acl"));
    }

    #[tokio::test]
    async fn test_should_log_and_propagate_facade_errors() {
        let session = Arc::new(TracingLoggingSession::new("req-1"));
        let err = controller()
            .apply(&request("broken", "a", None), &metadata(), session.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::Upstream { .. }));
        assert_eq!(session.errors().len(), 1);
    }
}
