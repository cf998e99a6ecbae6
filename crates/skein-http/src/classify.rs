//! Response classification and the bounded auth retry decision

use std::fmt;
use std::sync::Arc;

use skein_common::http::{HttpResponseLike, HttpStatus};
use tracing::{debug, warn};

use crate::error::ResourceError;
use crate::filter::FilterChain;
use crate::response::Response;

/// What to do with a response.
#[derive(Debug)]
pub enum Outcome {
    Success(Response),
    /// Resend the same request; a filter refreshed its state
    Retry,
    Fail(ResourceError),
}

/// Extra say on whether a 401/403 is worth another attempt, consulted
/// alongside the filters.
pub trait ChallengePolicy: Send + Sync {
    fn should_retry(&self, response: &Response) -> bool;
}

impl fmt::Debug for dyn ChallengePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChallengePolicy")
    }
}

#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    max_auth_retries: u32,
    policy: Option<Arc<dyn ChallengePolicy>>,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ResponseClassifier {
    pub fn new(max_auth_retries: u32) -> Self {
        Self {
            max_auth_retries,
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ChallengePolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn max_auth_retries(&self) -> u32 {
        self.max_auth_retries
    }

    /// Map `response` to an [`Outcome`].
    ///
    /// `retries_so_far` counts auth retries already spent on this call. Once
    /// it reaches the ceiling, a challenge fails without consulting anyone.
    pub async fn classify(
        &self,
        mut response: Response,
        filters: &FilterChain,
        retries_so_far: u32,
    ) -> Outcome {
        let status = response.status();
        debug!(%status, retries_so_far, "classifying response");

        if !status.is_error() {
            return Outcome::Success(response);
        }

        if status == HttpStatus::NOT_FOUND {
            return Outcome::Fail(ResourceError::NotFound {
                body: response.take_error_body(),
            });
        }

        if status.is_auth_challenge() {
            if retries_so_far < self.max_auth_retries {
                // Every filter gets to see the challenge, then the policy
                let filters_retry = filters.on_unauthorized(&response).await;
                let policy_retry = self
                    .policy
                    .as_ref()
                    .is_some_and(|p| p.should_retry(&response));
                if filters_retry || policy_retry {
                    warn!(
                        %status,
                        attempt = retries_so_far + 1,
                        max = self.max_auth_retries,
                        "retrying after auth challenge"
                    );
                    return Outcome::Retry;
                }
            } else {
                debug!(%status, "auth retry ceiling reached");
            }
            return Outcome::Fail(ResourceError::Unauthorized {
                status: status.code(),
                body: response.take_error_body(),
            });
        }

        Outcome::Fail(ResourceError::RequestFailed {
            status: status.code(),
            body: response.take_error_body(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::response::ResponseBuilder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Refresher {
        asked: AtomicUsize,
        answer: bool,
    }

    #[async_trait]
    impl Filter for Refresher {
        fn name(&self) -> &str {
            "refresher"
        }

        async fn on_unauthorized(&self, _response: &Response) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    struct Always;

    impl ChallengePolicy for Always {
        fn should_retry(&self, _response: &Response) -> bool {
            true
        }
    }

    fn response(status: u16, body: &'static str) -> Response {
        ResponseBuilder::new().status_code(status).body(body).build()
    }

    fn chain_with(filter: Arc<Refresher>) -> FilterChain {
        std::iter::once(filter as Arc<dyn Filter>).collect()
    }

    #[tokio::test]
    async fn test_success_statuses() {
        let classifier = ResponseClassifier::default();
        for status in [200, 201, 204, 304] {
            let outcome = classifier
                .classify(response(status, "ok"), &FilterChain::new(), 0)
                .await;
            match outcome {
                Outcome::Success(mut r) => {
                    assert_eq!(r.status_code(), status);
                    // Body is untouched on success
                    assert_eq!(r.body_string().unwrap(), "ok");
                }
                other => panic!("expected success for {}, got {:?}", status, other),
            }
        }
    }

    #[tokio::test]
    async fn test_not_found_carries_body() {
        let outcome = ResponseClassifier::default()
            .classify(response(404, r#"{"error":"not_found"}"#), &FilterChain::new(), 0)
            .await;
        match outcome {
            Outcome::Fail(ResourceError::NotFound { body }) => {
                assert_eq!(body, r#"{"error":"not_found"}"#)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_errors_are_request_failed() {
        for status in [400, 409, 500, 503] {
            let outcome = ResponseClassifier::default()
                .classify(response(status, "boom"), &FilterChain::new(), 0)
                .await;
            match outcome {
                Outcome::Fail(ResourceError::RequestFailed { status: s, body }) => {
                    assert_eq!(s, status);
                    assert_eq!(body, "boom");
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_challenge_without_handler_fails() {
        for status in [401, 403] {
            let outcome = ResponseClassifier::default()
                .classify(response(status, "denied"), &FilterChain::new(), 0)
                .await;
            match outcome {
                Outcome::Fail(ResourceError::Unauthorized { status: s, body }) => {
                    assert_eq!(s, status);
                    assert_eq!(body, "denied");
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_challenge_retried_when_filter_can_handle_it() {
        let filter = Arc::new(Refresher {
            answer: true,
            ..Default::default()
        });
        let outcome = ResponseClassifier::default()
            .classify(response(401, ""), &chain_with(filter.clone()), 0)
            .await;
        assert!(matches!(outcome, Outcome::Retry));
        assert_eq!(filter.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ceiling_stops_retry_without_asking_filters() {
        let filter = Arc::new(Refresher {
            answer: true,
            ..Default::default()
        });
        let outcome = ResponseClassifier::default()
            .classify(response(401, "still no"), &chain_with(filter.clone()), 1)
            .await;
        assert!(matches!(
            outcome,
            Outcome::Fail(ResourceError::Unauthorized { status: 401, .. })
        ));
        assert_eq!(filter.asked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_policy_can_request_retry() {
        let classifier = ResponseClassifier::new(2).with_policy(Arc::new(Always));
        let outcome = classifier
            .classify(response(403, ""), &FilterChain::new(), 1)
            .await;
        assert!(matches!(outcome, Outcome::Retry));

        let outcome = classifier
            .classify(response(403, ""), &FilterChain::new(), 2)
            .await;
        assert!(matches!(outcome, Outcome::Fail(ResourceError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_zero_ceiling_never_retries() {
        let classifier = ResponseClassifier::new(0).with_policy(Arc::new(Always));
        let outcome = classifier
            .classify(response(401, ""), &FilterChain::new(), 0)
            .await;
        assert!(matches!(outcome, Outcome::Fail(ResourceError::Unauthorized { .. })));
    }
}
