// HTTP-level tests of the gateway endpoints and the proxy
use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::http::Method;
use actix_web::{test, web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::{json, Value};
use tollgate::authentication::GatewayServices;
use tollgate::csrf::CSRF_PARAMETER_NAME;
use tollgate::clock::ManualClock;
use tollgate::handlers::configure_services;
use tollgate::models::{HealthResponse, SessionInformation, SessionState};
use tollgate::session::{CSRF_COOKIE_NAME, SESSION_COOKIE_NAME};
use tollgate::settings::TollgateSettings;
use tollgate::testing::constants::{TEST_BASE_URL, TEST_NOW};
use tollgate::testing::{
    assert_cookie_removed, assert_no_cookie, assert_redirect, assert_status, RequestBuilder,
    TestFixtures,
};

macro_rules! gateway_app {
    ($services:expr, $settings:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($services.clone()))
                .app_data(web::Data::new($settings.clone()))
                .configure(configure_services),
        )
        .await
    };
}

fn gateway(settings: &TollgateSettings) -> (Arc<ManualClock>, GatewayServices) {
    let clock = Arc::new(ManualClock::new(TEST_NOW));
    let ledger = TestFixtures::revocation_ledger(clock.clone());
    let services = TestFixtures::services_with(settings, clock.clone(), Arc::new(ledger));
    (clock, services)
}

fn login(services: &GatewayServices) -> Vec<Cookie<'static>> {
    services
        .pipeline
        .issue_session("local", TestFixtures::user(), &services.session_policy)
        .expect("session should be issued")
        .1
}

#[actix_web::test]
async fn test_ping() {
    let settings = TestFixtures::settings();
    let (_clock, services) = gateway(&settings);
    let app = gateway_app!(services, settings);

    let req = test::TestRequest::get().uri("/ping").to_request();
    let health: HealthResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(health.status, "ok");
    assert_eq!(health.service, "tollgate");
}

#[actix_web::test]
async fn test_session_endpoint_reports_state() {
    let settings = TestFixtures::settings();
    let (clock, services) = gateway(&settings);
    let app = gateway_app!(services, settings);

    let anonymous = test::TestRequest::get().uri("/auth/session").to_request();
    let info: SessionInformation = test::call_and_read_body_json(&app, anonymous).await;
    assert_eq!(info.state, SessionState::Anonymous);
    assert_eq!(info.expires_in, None);

    let cookies = login(&services);
    clock.advance(600);
    let authenticated = RequestBuilder::new()
        .uri("/auth/session")
        .with_cookies(&cookies)
        .into_test_request()
        .to_request();
    let info: SessionInformation = test::call_and_read_body_json(&app, authenticated).await;
    assert_eq!(info.state, SessionState::Authenticated);
    assert_eq!(info.expires_in, Some(3000));
}

#[actix_web::test]
async fn test_session_endpoint_renews_near_expiry() {
    let settings = TestFixtures::settings();
    let (clock, services) = gateway(&settings);
    let app = gateway_app!(services, settings);
    let cookies = login(&services);

    clock.advance(3400);
    let req = RequestBuilder::new()
        .uri("/auth/session")
        .with_cookies(&cookies)
        .into_test_request()
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_status(resp.response(), 200);
    let renewed = resp
        .response()
        .cookies()
        .find(|c| c.name() == SESSION_COOKIE_NAME)
        .expect("renewed session cookie");
    assert!(!renewed.value().is_empty());
    assert!(renewed.http_only().unwrap_or(false));
    assert_eq!(renewed.secure(), Some(true));
}

#[actix_web::test]
async fn test_logout_redirects_and_clears_cookies() {
    let settings = TestFixtures::settings();
    let (_clock, services) = gateway(&settings);
    let app = gateway_app!(services, settings);
    let cookies = login(&services);

    let req = RequestBuilder::new()
        .method(Method::POST)
        .uri("/auth/logout?returnUrl=https%3A%2F%2Fapp.example.com%2Fhome")
        .header("Origin", TEST_BASE_URL)
        .with_cookies(&cookies)
        .into_test_request()
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_redirect(resp.response(), "https://app.example.com/home");
    assert_cookie_removed(resp.response(), SESSION_COOKIE_NAME);
    assert_cookie_removed(resp.response(), CSRF_COOKIE_NAME);

    let after = RequestBuilder::new()
        .uri("/auth/session")
        .with_cookies(&cookies)
        .into_test_request()
        .to_request();
    let info: SessionInformation = test::call_and_read_body_json(&app, after).await;
    assert_eq!(info.state, SessionState::Anonymous);
}

#[actix_web::test]
async fn test_logout_ignores_untrusted_return_url() {
    let settings = TestFixtures::settings();
    let (_clock, services) = gateway(&settings);
    let app = gateway_app!(services, settings);

    for return_url in [
        "https%3A%2F%2Fevil.example.net%2F",
        "http%3A%2F%2Fapp.example.com%2F",
        "%2F%2Fapp.example.com",
        "javascript%3Aalert(1)",
    ] {
        let req = test::TestRequest::get()
            .uri(&format!("/auth/logout?returnUrl={return_url}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_redirect(resp.response(), "/signed-out");
        assert_cookie_removed(resp.response(), SESSION_COOKIE_NAME);
    }
}

#[actix_web::test]
async fn test_cross_site_logout_is_rejected() {
    let settings = TestFixtures::settings();
    let (_clock, services) = gateway(&settings);
    let app = gateway_app!(services, settings);
    let cookies = login(&services);
    let session_only: Vec<Cookie<'static>> = cookies
        .iter()
        .filter(|c| c.name() == SESSION_COOKIE_NAME)
        .cloned()
        .collect();

    let req = RequestBuilder::new()
        .uri("/auth/logout")
        .with_cookies(&session_only)
        .into_test_request()
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_status(resp.response(), 401);
    assert_no_cookie(resp.response(), SESSION_COOKIE_NAME);

    let still_live = RequestBuilder::new()
        .uri("/auth/session")
        .with_cookies(&cookies)
        .into_test_request()
        .to_request();
    let info: SessionInformation = test::call_and_read_body_json(&app, still_live).await;
    assert_eq!(info.state, SessionState::Authenticated);
}

#[actix_web::test]
async fn test_proxy_rejects_unknown_and_unauthenticated_requests() {
    let settings = TestFixtures::settings();
    let (_clock, services) = gateway(&settings);
    let app = gateway_app!(services, settings);

    let unknown = test::TestRequest::get().uri("/elsewhere").to_request();
    let resp = test::call_service(&app, unknown).await;
    assert_status(resp.response(), 404);

    let anonymous = test::TestRequest::get().uri("/api/orders").to_request();
    let resp = test::call_service(&app, anonymous).await;
    assert_status(resp.response(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unauthorized");

    let cookies = login(&services);
    let forged = RequestBuilder::new()
        .method(Method::POST)
        .uri("/api/orders")
        .with_cookies(&cookies)
        .into_test_request()
        .to_request();
    let resp = test::call_service(&app, forged).await;
    assert_status(resp.response(), 401);
}

#[actix_web::test]
async fn test_dot_segments_cannot_reach_protected_routes() {
    let settings = TestFixtures::settings();
    let (_clock, services) = gateway(&settings);
    let app = gateway_app!(services, settings);

    for path in [
        "/api/public/../orders",
        "/api/public/%2e%2e/orders",
        "/api/public/%2E./orders",
    ] {
        let req = test::TestRequest::get().uri(path).to_request();
        let resp = test::call_service(&app, req).await;
        assert_status(resp.response(), 401);
    }

    let escaped = test::TestRequest::get()
        .uri("/api/public%2F..%2Forders")
        .to_request();
    let resp = test::call_service(&app, escaped).await;
    assert_status(resp.response(), 400);
}

#[actix_web::test]
async fn test_route_method_allow_list_and_response_headers() {
    let mut settings = TestFixtures::settings();
    let public = &mut settings.security_profiles[1];
    public.allowed_methods = vec!["GET".to_string()];
    public
        .response_headers
        .insert("X-Frame-Options".to_string(), "DENY".to_string());
    let (_clock, services) = gateway(&settings);
    let app = gateway_app!(services, settings);

    let req = test::TestRequest::delete()
        .uri("/api/public/docs")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_status(resp.response(), 405);
    assert_eq!(
        resp.headers().get("X-Frame-Options").unwrap(),
        "DENY",
        "route header rules apply to gateway responses too"
    );
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "method_not_allowed");

    let other_route = test::TestRequest::delete().uri("/api/orders").to_request();
    let resp = test::call_service(&app, other_route).await;
    assert_status(resp.response(), 401);
    assert!(resp.headers().get("X-Frame-Options").is_none());
}

async fn echo(req: HttpRequest) -> HttpResponse {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    HttpResponse::Ok().insert_header(("X-Powered-By", "echo")).json(json!({
        "path": req.uri().to_string(),
        "method": req.method().as_str(),
        "user": header("X-Auth-Request-User"),
        "provider": header("X-Auth-Request-Provider"),
        "cookie": header("cookie"),
    }))
}

#[actix_web::test]
async fn test_proxy_forwards_identity_to_upstream() {
    let upstream = HttpServer::new(|| App::new().default_service(web::to(echo)))
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
    let address = upstream.addrs()[0];
    let upstream = upstream.run();
    let upstream_handle = upstream.handle();
    actix_web::rt::spawn(upstream);

    let mut settings = TestFixtures::settings();
    for route in &mut settings.routes {
        route.upstream_url = format!("http://{address}");
    }
    let api = &mut settings.security_profiles[0];
    api.response_headers
        .insert("X-Powered-By".to_string(), "<<remove>>".to_string());
    api.response_headers
        .insert("X-Content-Type-Options".to_string(), "nosniff".to_string());
    let (_clock, services) = gateway(&settings);
    let app = gateway_app!(services, settings);

    let cookies = login(&services);
    let req = RequestBuilder::new()
        .uri("/api/orders?page=2")
        .header("X-Auth-Request-User", "mallory")
        .with_cookies(&cookies)
        .with_cookie(Cookie::new("theme", "dark"))
        .into_test_request()
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_status(resp.response(), 200);
    assert!(resp.headers().get("X-Powered-By").is_none());
    assert_eq!(resp.headers().get("X-Content-Type-Options").unwrap(), "nosniff");
    let body: Value = test::read_body_json(resp).await;

    assert_eq!(body["path"], "/api/orders?page=2");
    assert_eq!(body["method"], "GET");
    assert_eq!(body["user"], "alice");
    assert_eq!(body["provider"], "local");
    assert_eq!(body["cookie"], "theme=dark");

    let anonymous = test::TestRequest::get()
        .uri("/api/public/docs")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, anonymous).await;
    assert_eq!(body["user"], Value::Null);

    let normalized = RequestBuilder::new()
        .uri("/api/public/../orders")
        .with_cookies(&cookies)
        .into_test_request()
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, normalized).await;
    assert_eq!(body["path"], "/api/orders");
    assert_eq!(body["user"], "alice");

    let csrf_token = cookies
        .iter()
        .find(|c| c.name() == CSRF_COOKIE_NAME)
        .expect("csrf cookie")
        .value()
        .to_string();
    let form_post = RequestBuilder::new()
        .method(Method::POST)
        .uri("/api/orders")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .with_cookies(&cookies)
        .into_test_request()
        .set_payload(format!("item=7&{CSRF_PARAMETER_NAME}={csrf_token}"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, form_post).await;
    assert_eq!(body["method"], "POST");
    assert_eq!(body["user"], "alice");

    upstream_handle.stop(false).await;
}
