//! Pre-authenticated retry transport
//!
//! Upload-session URLs and download URLs embed their own credentials. Requests
//! to them go through the same retry loop as authenticated calls but never
//! carry an `Authorization` header. The caller supplies a builder that is
//! invoked once per attempt, so request bodies are rebuilt from scratch and a
//! partially consumed body is never replayed.

use std::future::Future;

use reqwest::header::USER_AGENT;
use reqwest::{Client, RequestBuilder, Response};
use tokio_util::sync::CancellationToken;

use crate::client::GraphClient;
use crate::error::Result;
use crate::retry::send_with_retry;

impl GraphClient {
    /// Sends a request to a pre-authenticated URL through the retry loop.
    ///
    /// `what` labels the request in logs and must not contain the URL itself.
    /// `build` receives the shared HTTP client and resolves to a complete
    /// request. It may await (reading the chunk body, for instance); errors
    /// it returns end the operation without retrying.
    pub async fn execute_preauth<F, Fut>(
        &self,
        what: &str,
        build: F,
        cancel: &CancellationToken,
    ) -> Result<Response>
    where
        F: Fn(&Client) -> Fut,
        Fut: Future<Output = Result<RequestBuilder>>,
    {
        let http = self.http_client();
        let user_agent = self.user_agent();

        send_with_retry(self.retry_policy(), what, cancel, || {
            let request = build(http);
            async move { request.await.map(|r| r.header(USER_AGENT, user_agent)) }
        })
        .await
    }
}
