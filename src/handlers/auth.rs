// Session endpoints: session status and logout
use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::{debug, info};
use serde::Deserialize;

use crate::authentication::{AuthOutcome, GatewayServices, LogoutOutcome};
use crate::models::{SessionInformation, SessionState};
use crate::settings::TollgateSettings;
use crate::utils::redirect_validator::validate_logout_redirect;
use crate::utils::responses::ResponseBuilder;

#[derive(Debug, Deserialize)]
pub struct LogoutQuery {
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
}

/// Report whether the caller holds a live session.
///
/// Never requires login. A session inside its renewal window is renewed here
/// like on any other request.
///
/// # Errors
///
/// Never fails; rejections are returned as responses
pub async fn session_info(
    req: HttpRequest,
    services: web::Data<GatewayServices>,
) -> Result<HttpResponse> {
    let decision = services
        .pipeline
        .authenticate(&req, &services.session_policy)
        .await;

    let information = match &decision.outcome {
        AuthOutcome::Authenticated(session) => SessionInformation {
            state: SessionState::Authenticated,
            expires_in: Some(session.remaining_seconds()),
        },
        AuthOutcome::Anonymous => SessionInformation {
            state: SessionState::Anonymous,
            expires_in: None,
        },
        AuthOutcome::Rejected(_) => return Ok(ResponseBuilder::unauthorized().build()),
    };

    Ok(ResponseBuilder::ok()
        .with_cookies(decision.cookies)
        .json(&information))
}

/// Log out: revoke the live session, clear its cookies and redirect.
///
/// The redirect goes to `returnUrl` when it passes validation, otherwise to
/// the configured logout redirect. A request that fails the logout CSRF
/// check gets a 401 and its session stays valid. A form-encoded body may
/// carry the CSRF parameter.
///
/// # Errors
///
/// Never fails; rejections are returned as responses
pub async fn logout(
    req: HttpRequest,
    body: web::Bytes,
    query: web::Query<LogoutQuery>,
    services: web::Data<GatewayServices>,
    settings: web::Data<TollgateSettings>,
) -> Result<HttpResponse> {
    let LogoutOutcome::LoggedOut { cookies, revoked } =
        services.pipeline.logout_with_body(&req, &body).await
    else {
        return Ok(ResponseBuilder::unauthorized().build());
    };

    let target = query
        .return_url
        .as_deref()
        .and_then(|url| {
            validate_logout_redirect(url, &settings.logout.allowed_return_hosts)
                .map_err(|e| debug!("Ignoring logout returnUrl: {e}"))
                .ok()
        })
        .map_or_else(|| settings.logout.redirect_url.clone(), String::from);

    info!("Logout complete (revoked: {revoked}), redirecting to {target}");
    Ok(ResponseBuilder::redirect(&target).with_cookies(cookies).build())
}
