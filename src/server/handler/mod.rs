//! This module holds the handler of tandem

use std::fmt::{Display, Formatter};

use actix_toolbox::tb_middleware::actix_session;
use actix_web::body::BoxBody;
use actix_web::HttpResponse;
use log::{debug, error, info, trace, warn};
use rorm::{insert, Database};
use serde::{Deserialize, Serialize};
use serde_repr::Serialize_repr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit;
use crate::models::{ActivityLogInsert, AuditAction};

pub use crate::server::handler::accounts::*;
pub use crate::server::handler::auth::*;
pub use crate::server::handler::breakups::*;
pub use crate::server::handler::health::*;
pub use crate::server::handler::partners::*;
pub use crate::server::handler::requests::*;
pub use crate::server::handler::websocket::*;

pub mod accounts;
pub mod auth;
pub mod breakups;
pub mod health;
pub mod partners;
pub mod requests;
pub mod websocket;

/// The result that is used throughout the complete api.
pub type ApiResult<T> = Result<T, ApiError>;

/// Record that `actor` tried to mutate a record between `actor` and `target`
/// it is no party of.
///
/// Written on the database handle instead of the open transaction: the
/// request is about to abort and the entry must survive that.
pub(crate) async fn audit_no_party(db: &Database, actor: Uuid, target: Uuid, tried_to: &str) {
    if let Err(err) = insert!(db, ActivityLogInsert)
        .single(&audit::entry(
            actor,
            Some(target),
            AuditAction::AuthorizationFailed,
            format!("Tried to {tried_to} without being a party of it"),
        ))
        .await
    {
        error!("Could not write audit entry: {err}");
    }
}

/// A uuid in a path
#[derive(Deserialize, IntoParams)]
pub struct PathUuid {
    /// The uuid
    pub(crate) uuid: Uuid,
}

#[derive(Serialize_repr, ToSchema)]
#[repr(u16)]
pub(crate) enum ApiStatusCode {
    Unauthenticated = 1000,
    LoginFailed = 1001,
    UsernameAlreadyOccupied = 1002,
    InvalidUuid = 1003,
    SessionCorrupt = 1004,
    MissingPrivileges = 1005,
    EmptyJson = 1006,
    InvalidPassword = 1007,
    InvalidUsername = 1008,
    InvalidDisplayName = 1009,
    MessageTooLong = 1010,
    SelfReference = 1011,
    AlreadyPartnered = 1012,
    TargetAlreadyPartnered = 1013,
    RequestAlreadyPending = 1014,
    RequestNotPending = 1015,
    NoActivePartner = 1016,
    BreakupAlreadyPending = 1017,
    BreakupNotPending = 1018,

    InvalidJson = 1019,

    InternalServerError = 2000,
    DatabaseError = 2001,
    SessionError = 2002,
}

#[derive(Serialize, ToSchema)]
pub(crate) struct ApiErrorResponse {
    #[schema(example = "Error message is here")]
    message: String,
    #[schema(example = 1000)]
    status_code: ApiStatusCode,
}

impl ApiErrorResponse {
    pub(crate) fn new(status_code: ApiStatusCode, message: String) -> Self {
        Self {
            message,
            status_code,
        }
    }
}

/// This enum holds all possible error types that can occur in the API
#[derive(Debug)]
pub enum ApiError {
    /// The user is not allowed to access the resource
    Unauthenticated,
    /// Login was not successful. Can be caused by incorrect username / password
    LoginFailed,
    /// The username is already occupied
    UsernameAlreadyOccupied,
    /// The requested record was not found
    InvalidUuid,
    /// The session is in an invalid state
    SessionCorrupt,
    /// The executing user is no party of the record it tried to change
    MissingPrivileges,
    /// A json body without any usable field was received
    EmptyJson,
    /// The provided password is not acceptable
    InvalidPassword,
    /// The provided username is not acceptable
    InvalidUsername,
    /// The provided display name is not acceptable
    InvalidDisplayName,
    /// The request message exceeds the allowed length
    MessageTooLong,
    /// The executing user targeted itself
    SelfReference,
    /// The executing user already has an active partner
    AlreadyPartnered,
    /// The targeted user already has an active partner
    TargetAlreadyPartnered,
    /// There is already a pending partner request between the pair
    RequestAlreadyPending,
    /// The partner request is no longer pending
    RequestNotPending,
    /// The executing user has no active partner
    NoActivePartner,
    /// There is already a pending breakup request between the pair
    BreakupAlreadyPending,
    /// The breakup request is no longer pending
    BreakupNotPending,

    /// Unspecified internal error
    InternalServerError,
    /// All errors that are thrown by the database
    DatabaseError(rorm::Error),
    /// An invalid hash is retrieved from the database
    InvalidHash(argon2::password_hash::Error),
    /// An error occurred while retrieving data from a session
    SessionGet(actix_session::SessionGetError),
    /// An error occurred while inserting data into a session
    SessionInsert(actix_session::SessionInsertError),
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthenticated => write!(f, "Unauthenticated"),
            ApiError::LoginFailed => write!(f, "The login was not successful"),
            ApiError::UsernameAlreadyOccupied => write!(f, "Username is already occupied"),
            ApiError::InvalidUuid => write!(f, "The requested record was not found"),
            ApiError::SessionCorrupt => write!(f, "Session is corrupt, please login again"),
            ApiError::MissingPrivileges => write!(f, "You are no party of this record"),
            ApiError::EmptyJson => write!(f, "The request body misses a required field"),
            ApiError::InvalidPassword => write!(f, "Invalid password"),
            ApiError::InvalidUsername => write!(f, "Invalid username"),
            ApiError::InvalidDisplayName => write!(f, "Invalid display name"),
            ApiError::MessageTooLong => write!(f, "The message exceeds 500 characters"),
            ApiError::SelfReference => write!(f, "You can not target yourself"),
            ApiError::AlreadyPartnered => write!(f, "You already have a partner"),
            ApiError::TargetAlreadyPartnered => write!(f, "This user already has a partner"),
            ApiError::RequestAlreadyPending => {
                write!(f, "There is already a pending request between you two")
            }
            ApiError::RequestNotPending => write!(f, "This request was already answered"),
            ApiError::NoActivePartner => write!(f, "You have no active partner"),
            ApiError::BreakupAlreadyPending => {
                write!(f, "There is already a pending breakup request")
            }
            ApiError::BreakupNotPending => write!(f, "This breakup request was already answered"),
            ApiError::InternalServerError
            | ApiError::InvalidHash(_)
            | ApiError::SessionGet(_)
            | ApiError::SessionInsert(_) => write!(f, "Internal server error"),
            ApiError::DatabaseError(_) => write!(f, "Database error occurred"),
        }
    }
}

impl actix_web::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            ApiError::Unauthenticated => {
                trace!("Unauthenticated");

                HttpResponse::BadRequest().json(ApiErrorResponse::new(
                    ApiStatusCode::Unauthenticated,
                    self.to_string(),
                ))
            }
            ApiError::LoginFailed => {
                debug!("Login request failed");

                HttpResponse::BadRequest().json(ApiErrorResponse::new(
                    ApiStatusCode::LoginFailed,
                    self.to_string(),
                ))
            }
            ApiError::UsernameAlreadyOccupied => {
                debug!("Username is already occupied");

                HttpResponse::BadRequest().json(ApiErrorResponse::new(
                    ApiStatusCode::UsernameAlreadyOccupied,
                    self.to_string(),
                ))
            }
            ApiError::InvalidUuid => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::InvalidUuid,
                self.to_string(),
            )),
            ApiError::SessionCorrupt => {
                warn!("Corrupt session");

                HttpResponse::BadRequest().json(ApiErrorResponse::new(
                    ApiStatusCode::SessionCorrupt,
                    self.to_string(),
                ))
            }
            ApiError::MissingPrivileges => {
                info!("Missing privileges");

                HttpResponse::Forbidden().json(ApiErrorResponse::new(
                    ApiStatusCode::MissingPrivileges,
                    self.to_string(),
                ))
            }
            ApiError::EmptyJson => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::EmptyJson,
                self.to_string(),
            )),
            ApiError::InvalidPassword => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::InvalidPassword,
                self.to_string(),
            )),
            ApiError::InvalidUsername => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::InvalidUsername,
                self.to_string(),
            )),
            ApiError::InvalidDisplayName => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::InvalidDisplayName,
                self.to_string(),
            )),
            ApiError::MessageTooLong => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::MessageTooLong,
                self.to_string(),
            )),
            ApiError::SelfReference => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::SelfReference,
                self.to_string(),
            )),
            ApiError::AlreadyPartnered => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::AlreadyPartnered,
                self.to_string(),
            )),
            ApiError::TargetAlreadyPartnered => HttpResponse::BadRequest().json(
                ApiErrorResponse::new(ApiStatusCode::TargetAlreadyPartnered, self.to_string()),
            ),
            ApiError::RequestAlreadyPending => HttpResponse::BadRequest().json(
                ApiErrorResponse::new(ApiStatusCode::RequestAlreadyPending, self.to_string()),
            ),
            ApiError::RequestNotPending => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::RequestNotPending,
                self.to_string(),
            )),
            ApiError::NoActivePartner => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::NoActivePartner,
                self.to_string(),
            )),
            ApiError::BreakupAlreadyPending => HttpResponse::BadRequest().json(
                ApiErrorResponse::new(ApiStatusCode::BreakupAlreadyPending, self.to_string()),
            ),
            ApiError::BreakupNotPending => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::BreakupNotPending,
                self.to_string(),
            )),
            ApiError::InternalServerError => {
                HttpResponse::InternalServerError().json(ApiErrorResponse::new(
                    ApiStatusCode::InternalServerError,
                    self.to_string(),
                ))
            }
            ApiError::DatabaseError(err) => {
                error!("Database error: {err}");

                HttpResponse::InternalServerError().json(ApiErrorResponse::new(
                    ApiStatusCode::DatabaseError,
                    self.to_string(),
                ))
            }
            ApiError::InvalidHash(err) => {
                error!("Got invalid password hash from db: {err}");

                HttpResponse::InternalServerError().json(ApiErrorResponse::new(
                    ApiStatusCode::InternalServerError,
                    self.to_string(),
                ))
            }
            ApiError::SessionGet(err) => {
                error!("Could not retrieve data from session: {err}");

                HttpResponse::InternalServerError().json(ApiErrorResponse::new(
                    ApiStatusCode::SessionError,
                    self.to_string(),
                ))
            }
            ApiError::SessionInsert(err) => {
                error!("Could not insert data into session: {err}");

                HttpResponse::InternalServerError().json(ApiErrorResponse::new(
                    ApiStatusCode::SessionError,
                    self.to_string(),
                ))
            }
        }
    }
}

impl From<rorm::Error> for ApiError {
    fn from(value: rorm::Error) -> Self {
        Self::DatabaseError(value)
    }
}

impl From<argon2::password_hash::Error> for ApiError {
    fn from(value: argon2::password_hash::Error) -> Self {
        Self::InvalidHash(value)
    }
}

impl From<actix_session::SessionGetError> for ApiError {
    fn from(value: actix_session::SessionGetError) -> Self {
        Self::SessionGet(value)
    }
}

impl From<actix_session::SessionInsertError> for ApiError {
    fn from(value: actix_session::SessionInsertError) -> Self {
        Self::SessionInsert(value)
    }
}
