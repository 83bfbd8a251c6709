use actix_web::dev::ServiceResponse;
use actix_web::middleware::ErrorHandlerResponse;
use actix_web::HttpResponse;

use crate::server::handler::{ApiErrorResponse, ApiStatusCode};

/// Replace the default 404 page with the api's json error shape
pub(crate) fn handle_not_found<B>(
    res: ServiceResponse<B>,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    let (req, _) = res.into_parts();

    let response = HttpResponse::NotFound().json(ApiErrorResponse::new(
        ApiStatusCode::InvalidUuid,
        "The requested resource does not exist".to_string(),
    ));

    Ok(ErrorHandlerResponse::Response(
        ServiceResponse::new(req, response).map_into_right_body(),
    ))
}
