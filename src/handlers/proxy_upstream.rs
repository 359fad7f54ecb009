use std::sync::LazyLock;

use actix_web::cookie::Cookie;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use log::{debug, info, warn};
use reqwest::Client;

use crate::authentication::{AuthOutcome, GatewayServices};
use crate::routes::{normalize_path, GatewayRoute};
use crate::session::Session;
use crate::utils::headers::{RequestHeaderProcessor, ResponseHeaderProcessor};
use crate::utils::responses::ResponseBuilder;

/// HTTP client for upstream requests; redirects are passed back to the client
static CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_else(|e| {
            warn!("Falling back to default HTTP client: {e}");
            Client::new()
        })
});

/// Authenticate the request for its route and forward it upstream.
///
/// The path is normalized once and that form is used for routing and for the
/// upstream URL. Answers 400 for a path that cannot be normalized, 404 when no
/// route matches, 405 for a method the route does not allow and 401 when the
/// route's policy rejects the request. Renewal cookies are attached to the
/// upstream response and every response of a route gets its header rules.
///
/// # Errors
///
/// Returns an error if reading the upstream response body fails
pub async fn proxy_upstream(
    req: HttpRequest,
    body: web::Bytes,
    services: web::Data<GatewayServices>,
) -> ActixResult<HttpResponse> {
    let path = match normalize_path(req.path()) {
        Ok(path) => path,
        Err(e) => {
            debug!("Rejecting request path {}: {e}", req.path());
            return Ok(ResponseBuilder::bad_request().build());
        }
    };

    let Some(route) = services.routes.match_path(&path) else {
        debug!("No route for {path}");
        return Ok(ResponseBuilder::not_found().build());
    };

    let mut response = route_response(&req, &path, &body, route, &services).await?;
    route.policy.apply_response_headers(response.headers_mut());
    Ok(response)
}

async fn route_response(
    req: &HttpRequest,
    path: &str,
    body: &web::Bytes,
    route: &GatewayRoute,
    services: &GatewayServices,
) -> ActixResult<HttpResponse> {
    if !route.policy.is_allowed_method(req.method()) {
        info!(
            "Route {} blocked {} {path}: method not allowed",
            route.name,
            req.method()
        );
        return Ok(ResponseBuilder::method_not_allowed().build());
    }

    let decision = services
        .pipeline
        .authenticate_with_body(req, body, &route.policy)
        .await;
    let session = match &decision.outcome {
        AuthOutcome::Rejected(reason) => {
            debug!("Route {} rejected {path}: {reason:?}", route.name);
            return Ok(ResponseBuilder::unauthorized().build());
        }
        AuthOutcome::Authenticated(session) => Some(session),
        AuthOutcome::Anonymous => None,
    };

    let upstream_response = match execute_upstream_request(req, path, body, route, session).await {
        Ok(response) => response,
        Err(err_response) => return Ok(err_response),
    };

    forward_response(upstream_response, decision.cookies).await
}

/// Build and send the upstream request
///
/// # Errors
///
/// Returns a ready-made error response if the URL or method cannot be
/// converted or the upstream cannot be reached
async fn execute_upstream_request(
    req: &HttpRequest,
    path: &str,
    body: &web::Bytes,
    route: &GatewayRoute,
    session: Option<&Session>,
) -> Result<reqwest::Response, HttpResponse> {
    let upstream_url = route
        .upstream_url(path, req.query_string())
        .map_err(|e| {
            warn!("Failed to build upstream URL for route {}: {e}", route.name);
            ResponseBuilder::bad_gateway().build()
        })?;

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| ResponseBuilder::bad_request().build())?;

    let mut request_builder = CLIENT.request(method, upstream_url);
    request_builder =
        RequestHeaderProcessor::for_proxy().forward_request_headers(req, request_builder);
    request_builder = RequestHeaderProcessor::add_identity_headers(request_builder, session);

    if !body.is_empty() {
        request_builder = request_builder.body(body.to_vec());
    }

    request_builder.send().await.map_err(|e| {
        warn!("Upstream request for route {} failed: {e}", route.name);
        ResponseBuilder::bad_gateway().build()
    })
}

/// Relay the upstream response, adding the pipeline's cookies
///
/// # Errors
///
/// Returns an error if reading the upstream response body fails
async fn forward_response(
    upstream_response: reqwest::Response,
    cookies: Vec<Cookie<'static>>,
) -> ActixResult<HttpResponse> {
    let actix_status = actix_web::http::StatusCode::from_u16(upstream_response.status().as_u16())
        .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);

    let mut response_builder = HttpResponse::build(actix_status);
    ResponseHeaderProcessor::for_proxy()
        .forward_response_headers(&upstream_response, &mut response_builder);

    for cookie in cookies {
        response_builder.cookie(cookie);
    }

    let response_body = upstream_response.bytes().await.map_err(|err| {
        actix_web::error::ErrorBadGateway(format!("Failed to read upstream response: {err}"))
    })?;

    Ok(response_builder.body(response_body))
}
