//! This module holds the definition of the swagger declaration

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::server::handler;

struct CookieSecurity;

impl Modify for CookieSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("id"))),
            )
        }
    }
}

/// Helper struct for the openapi definitions.
#[derive(OpenApi)]
#[openapi(
    paths(
        handler::register_account,
        handler::get_me,
        handler::update_me,
        handler::set_push_token,
        handler::delete_me,
        handler::lookup_account_by_username,
        handler::login,
        handler::logout,
        handler::websocket,
        handler::create_partner_request,
        handler::get_pending_requests,
        handler::accept_partner_request,
        handler::reject_partner_request,
        handler::cancel_partner_request,
        handler::get_current_partner,
        handler::get_ex_partners,
        handler::initiate_breakup,
        handler::get_pending_breakup,
        handler::accept_breakup,
        handler::reject_breakup,
    ),
    components(schemas(
        handler::ApiErrorResponse,
        handler::ApiStatusCode,
        handler::AccountRegistrationRequest,
        handler::AccountResponse,
        handler::ProfileResponse,
        handler::UpdateAccountRequest,
        handler::SetPushTokenRequest,
        handler::LookupAccountUsernameRequest,
        handler::LoginRequest,
        handler::CreatePartnerRequestRequest,
        handler::PartnerRequestResponse,
        handler::PendingRequestResponse,
        handler::GetPendingRequestsResponse,
        handler::PartnerResponse,
        handler::CurrentPartnerResponse,
        handler::GetPartnerResponse,
        handler::ExPartnerResponse,
        handler::GetExPartnersResponse,
        handler::CreateBreakupRequest,
        handler::BreakupRequestResponse,
        handler::GetBreakupResponse,
    )),
    modifiers(&CookieSecurity)
)]
pub struct ApiDoc;

/// Helper struct for the admin openapi definitions.
#[derive(OpenApi)]
#[openapi(
    paths(
        handler::health,
    ),
    components(schemas(
        handler::ApiErrorResponse,
        handler::ApiStatusCode,
        handler::HealthResponse,
    )),
    modifiers(&CookieSecurity)
)]
pub struct AdminApiDoc;
