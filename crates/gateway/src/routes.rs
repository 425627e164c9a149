use std::sync::Arc;

use billing_cache::CacheLayer;
use billing_common::{config::BillingConfig, headers::names, time::now_ms, InboundHeaders};
use billing_core::{
    decorator::{HandlerFlags, HandlerSpec},
    error::PolicyError,
    pipeline::StageInputs,
    postprocessor::postprocess,
    preprocessor::preprocess,
};
use billing_writeback::WritebackEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use poem::{get, http::HeaderValue, post, web::Json, Endpoint, IntoResponse, Request, Response, Route};

use crate::handlers::{Authorize, Handler, SyncIds};

/// Renders the process's accumulated metrics on each scrape, the way the
/// teacher's `chronicle_graphql::health::Metrics` endpoint wraps a
/// `PrometheusHandle`.
pub struct Metrics(pub PrometheusHandle);

#[poem::async_trait]
impl Endpoint for Metrics {
    type Output = Response;

    async fn call(&self, _req: Request) -> poem::Result<Self::Output> {
        Ok(IntoResponse::into_response(self.0.render()))
    }
}

fn extract_headers(req: &Request) -> InboundHeaders {
    let get = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    InboundHeaders {
        app_id: get(names::APP_ID),
        app_publisher: get(names::APP_PUBLISHER),
        git_name: get(names::GIT_NAME),
        git_email: get(names::GIT_EMAIL),
        auth_key: get(names::AUTH_KEY),
        version: get(names::VERSION),
        profile_id: get(names::PROFILE_ID),
    }
}

fn policy_error_response(err: &PolicyError) -> Response {
    Response::builder()
        .status(poem::http::StatusCode::from_u16(err.status()).unwrap_or(poem::http::StatusCode::INTERNAL_SERVER_ERROR))
        .body(err.body())
}

/// One routing-table entry wired to a real `poem::Endpoint`: runs
/// Preprocessor, invokes `handler`, runs Postprocessor, then drains
/// writeback — the full request lifecycle through the pipeline.
pub struct BillingEndpoint {
    pub cache: Arc<CacheLayer>,
    pub config: Arc<BillingConfig>,
    pub writeback: Arc<WritebackEngine>,
    pub spec: HandlerSpec,
    pub handler: Arc<dyn Handler>,
}

#[poem::async_trait]
impl Endpoint for BillingEndpoint {
    type Output = Response;

    async fn call(&self, req: Request) -> poem::Result<Self::Output> {
        metrics::increment_counter!("billing_requests_total");
        let headers = extract_headers(&req);
        let now = now_ms();
        let inputs = StageInputs {
            app_id: headers.app_id.as_deref(),
            publisher: headers.app_publisher.as_deref(),
            git_email: headers.git_email.as_deref(),
            profile_id: headers.profile_id.as_deref(),
            now,
        };

        let preprocessed = match preprocess(&self.cache, &self.config, self.spec.flags, self.spec.moniker, &inputs).await {
            Ok(result) => result,
            Err(err) => return Ok(policy_error_response(&err)),
        };

        let body = self.handler.handle(preprocessed.billing.as_ref()).await;
        let outcome = postprocess(preprocessed.billing.as_ref(), &self.config, now, body);

        if let Some(billing) = &preprocessed.billing {
            self.writeback
                .run(billing, self.spec.flags, self.spec.moniker, headers.git_email.as_deref(), now)
                .await;
        }

        let mut response = IntoResponse::into_response(Json(outcome.response));
        if preprocessed.headers.dunning_warning {
            response.headers_mut().insert(names::DUNNING_WARNING, HeaderValue::from_static("true"));
        }
        if preprocessed.headers.subscription_missing {
            response.headers_mut().insert(names::SUBSCRIPTION_MISSING, HeaderValue::from_static("true"));
        }
        if outcome.claim_issue_header {
            response.headers_mut().insert(names::CLAIM_ISSUE, HeaderValue::from_static("true"));
        }
        Ok(response)
    }
}

/// Assembles the demonstration routing table: each entry pairs a path with
/// the decorator flags/moniker a real endpoint would carry, registered
/// against one `Route` the way a GraphQL/data route table would be.
pub fn build_app(
    cache: Arc<CacheLayer>,
    config: Arc<BillingConfig>,
    writeback: Arc<WritebackEngine>,
    prometheus: Option<PrometheusHandle>,
) -> Route {
    let endpoint = |spec: HandlerSpec, handler: Arc<dyn Handler>| {
        post(BillingEndpoint { cache: cache.clone(), config: config.clone(), writeback: writeback.clone(), spec, handler })
    };

    let mut app = Route::new()
        .at(
            "/authorize",
            endpoint(HandlerSpec::new(HandlerFlags::security(), "authorize"), Arc::new(Authorize)),
        )
        .at(
            "/sync-ids",
            endpoint(HandlerSpec::new(HandlerFlags::usage_logging(), "sync_ids"), Arc::new(SyncIds)),
        );
    if let Some(handle) = prometheus {
        app = app.at("/metrics", get(Metrics(handle)));
    }
    app
}
