//! All handlers for the account endpoints live in here

use actix_toolbox::tb_middleware::Session;
use actix_web::web::{Data, Json};
use actix_web::{delete, get, post, put, HttpResponse};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, NaiveDate, Utc};
use log::error;
use rorm::{insert, query, update, Database, Model};
use rorm::FieldAccess;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::chan::{WsManagerChan, WsManagerMessage};
use crate::models::{Account, AccountInsert};
use crate::server::handler::{ApiError, ApiErrorResponse, ApiResult};

/// The content to register a new account
#[derive(Debug, Deserialize, ToSchema)]
pub struct AccountRegistrationRequest {
    #[schema(example = "user123")]
    username: String,
    #[schema(example = "Sam")]
    display_name: String,
    #[schema(example = "super-secure-password")]
    password: String,
    /// Optional birthdate, ISO 8601 date
    birthdate: Option<NaiveDate>,
    /// Optional self-chosen gender
    #[schema(example = "non-binary")]
    gender: Option<String>,
}

/// Register a new account
#[utoipa::path(
    tag = "Accounts",
    responses(
        (status = 200, description = "Account got created"),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    request_body = AccountRegistrationRequest,
)]
#[post("/api/v1/accounts/register")]
pub async fn register_account(
    req: Json<AccountRegistrationRequest>,
    db: Data<Database>,
) -> ApiResult<HttpResponse> {
    if req.username.is_empty() {
        return Err(ApiError::InvalidUsername);
    }

    if req.display_name.is_empty() {
        return Err(ApiError::InvalidDisplayName);
    }

    if req.password.is_empty() {
        return Err(ApiError::InvalidPassword);
    }

    let mut tx = db.start_transaction().await?;

    if query!(&mut tx, (Account::F.uuid,))
        .condition(Account::F.username.equals(&req.username))
        .optional()
        .await?
        .is_some()
    {
        return Err(ApiError::UsernameAlreadyOccupied);
    }

    let salt = SaltString::generate(&mut rand::thread_rng());
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)?
        .to_string();

    insert!(&mut tx, AccountInsert)
        .single(&AccountInsert {
            uuid: Uuid::new_v4(),
            username: req.username.clone(),
            display_name: req.display_name.clone(),
            password_hash,
            avatar_path: None,
            birthdate: req.birthdate,
            gender: req.gender.clone(),
            push_token: None,
            last_login: None,
        })
        .await?;

    tx.commit().await?;

    Ok(HttpResponse::Ok().finish())
}

/// The account data
#[derive(Serialize, Deserialize, ToSchema, Eq, Ord, PartialOrd, PartialEq, Clone, Debug)]
pub struct AccountResponse {
    pub(crate) uuid: Uuid,
    #[schema(example = "user123")]
    pub(crate) username: String,
    #[schema(example = "Sam")]
    pub(crate) display_name: String,
}

/// The full profile of the logged-in account
#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    uuid: Uuid,
    #[schema(example = "user123")]
    username: String,
    #[schema(example = "Sam")]
    display_name: String,
    avatar_path: Option<String>,
    birthdate: Option<NaiveDate>,
    #[schema(example = "non-binary")]
    gender: Option<String>,
    created_at: DateTime<Utc>,
}

/// Returns the account that is currently logged-in
#[utoipa::path(
    tag = "Accounts",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "Returns the account data of the current user", body = ProfileResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    security(("session_cookie" = []))
)]
#[get("/accounts/me")]
pub async fn get_me(db: Data<Database>, session: Session) -> ApiResult<Json<ProfileResponse>> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    let account = query!(db.as_ref(), Account)
        .condition(Account::F.uuid.equals(uuid))
        .optional()
        .await?
        .ok_or(ApiError::SessionCorrupt)?;

    Ok(Json(ProfileResponse {
        uuid: account.uuid,
        username: account.username,
        display_name: account.display_name,
        avatar_path: account.avatar_path,
        birthdate: account.birthdate,
        gender: account.gender,
        created_at: DateTime::from_utc(account.created_at, Utc),
    }))
}

/// Update account request data
///
/// All parameter are optional, but at least one of them is required.
#[derive(Deserialize, ToSchema)]
pub struct UpdateAccountRequest {
    #[schema(example = "Sammy")]
    display_name: Option<String>,
    birthdate: Option<NaiveDate>,
    #[schema(example = "female")]
    gender: Option<String>,
}

/// Updates the currently logged-in account
///
/// All parameter are optional, but at least one of them is required.
#[utoipa::path(
    tag = "Accounts",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "Account has been updated"),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    request_body = UpdateAccountRequest,
    security(("session_cookie" = []))
)]
#[put("/accounts/me")]
pub async fn update_me(
    req: Json<UpdateAccountRequest>,
    db: Data<Database>,
    session: Session,
) -> ApiResult<HttpResponse> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    if let Some(display_name) = &req.display_name {
        if display_name.is_empty() {
            return Err(ApiError::InvalidDisplayName);
        }
    }

    let mut tx = db.start_transaction().await?;

    update!(&mut tx, Account)
        .condition(Account::F.uuid.equals(uuid))
        .begin_dyn_set()
        .set_if(Account::F.display_name, req.display_name.clone())
        .set_if(Account::F.birthdate, req.birthdate.map(Some))
        .set_if(Account::F.gender, req.gender.clone().map(Some))
        .finish_dyn_set()
        .map_err(|_| ApiError::EmptyJson)?
        .exec()
        .await?;

    tx.commit().await?;

    Ok(HttpResponse::Ok().finish())
}

/// The request to register or revoke the push token of the current device
///
/// A `null` token revokes the registration.
#[derive(Deserialize, ToSchema)]
pub struct SetPushTokenRequest {
    #[schema(example = "fcm:dGFuZGVtLXRva2Vu")]
    token: Option<String>,
}

/// Registers the push token of the currently used device.
///
/// Notifications are delivered in-app regardless; the token only enables
/// push delivery.
#[utoipa::path(
    tag = "Accounts",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "Push token has been set"),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    request_body = SetPushTokenRequest,
    security(("session_cookie" = []))
)]
#[put("/accounts/me/pushToken")]
pub async fn set_push_token(
    req: Json<SetPushTokenRequest>,
    db: Data<Database>,
    session: Session,
) -> ApiResult<HttpResponse> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    update!(db.as_ref(), Account)
        .condition(Account::F.uuid.equals(uuid))
        .set(Account::F.push_token, req.token.clone())
        .exec()
        .await?;

    Ok(HttpResponse::Ok().finish())
}

/// Deletes the currently logged-in account
#[utoipa::path(
    tag = "Accounts",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "Deleted the currently logged-in account"),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    security(("session_cookie" = []))
)]
#[delete("/accounts/me")]
pub async fn delete_me(
    db: Data<Database>,
    session: Session,
    ws_manager_chan: Data<WsManagerChan>,
) -> ApiResult<HttpResponse> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    rorm::delete!(db.as_ref(), Account)
        .condition(Account::F.uuid.equals(uuid))
        .await?;

    // Clear the current session
    session.purge();

    // Close open websocket connections
    if let Err(err) = ws_manager_chan
        .send(WsManagerMessage::CloseSocket(uuid))
        .await
    {
        error!("Could not send to ws manager chan: {err}");
    }

    Ok(HttpResponse::Ok().finish())
}

/// The request to lookup an account by its username
#[derive(Deserialize, ToSchema)]
pub struct LookupAccountUsernameRequest {
    username: String,
}

/// Retrieve details for an account by its username
///
/// Usernames can be changed, so convert them to an uuid with this endpoint
/// before using them in other requests, e.g. for sending a partner request.
#[utoipa::path(
    tag = "Accounts",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "Returns the requested account data", body = AccountResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    request_body = LookupAccountUsernameRequest,
    security(("session_cookie" = []))
)]
#[post("/accounts/lookup")]
pub async fn lookup_account_by_username(
    req: Json<LookupAccountUsernameRequest>,
    db: Data<Database>,
) -> ApiResult<Json<AccountResponse>> {
    let account = query!(db.as_ref(), Account)
        .condition(Account::F.username.equals(&req.username))
        .optional()
        .await?
        .ok_or(ApiError::InvalidUsername)?;

    Ok(Json(AccountResponse {
        uuid: account.uuid,
        username: account.username,
        display_name: account.display_name,
    }))
}
