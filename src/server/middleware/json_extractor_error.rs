use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse};
use log::debug;

use crate::server::handler::{ApiErrorResponse, ApiStatusCode};

/// Turn json extractor failures into the api's json error shape
pub(crate) fn json_extractor_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!("Received invalid json: {err}");

    let response = HttpResponse::BadRequest().json(ApiErrorResponse::new(
        ApiStatusCode::InvalidJson,
        "Invalid json received".to_string(),
    ));

    InternalError::from_response(err, response).into()
}
