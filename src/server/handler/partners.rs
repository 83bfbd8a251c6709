//! Read endpoints for the current partner and the ex-partner history

use actix_toolbox::tb_middleware::Session;
use actix_web::get;
use actix_web::web::{Data, Json};
use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use log::error;
use rorm::{and, query, Database, Model};
use rorm::FieldAccess;
use serde::Serialize;
use tokio::sync::oneshot;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::chan::{WsManagerChan, WsManagerMessage};
use crate::models::{ExPartnerEntry, PartnerEntry, PartnerEntryStatus};
use crate::server::handler::{AccountResponse, ApiError, ApiErrorResponse, ApiResult};

/// The executing user's current partner
#[derive(Serialize, ToSchema)]
pub struct CurrentPartnerResponse {
    partner: AccountResponse,
    avatar_path: Option<String>,
    birthdate: Option<NaiveDate>,
    #[schema(example = "female")]
    gender: Option<String>,
    /// Start of the relationship, including restored time
    started_at: DateTime<Utc>,
    /// Whether the partner has an open websocket connection
    online: bool,
}

/// Wrapper around an optional current partner
#[derive(Serialize, ToSchema)]
pub struct GetPartnerResponse {
    partner: Option<CurrentPartnerResponse>,
}

/// Retrieve the current partner of the executing user
#[utoipa::path(
    tag = "Partners",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "The current partner, if any", body = GetPartnerResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    security(("session_cookie" = []))
)]
#[get("/partners/me")]
pub async fn get_current_partner(
    db: Data<Database>,
    session: Session,
    ws_manager_chan: Data<WsManagerChan>,
) -> ApiResult<Json<GetPartnerResponse>> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    let entry = query!(db.as_ref(), PartnerEntry)
        .condition(and!(
            PartnerEntry::F.account.equals(uuid.as_ref()),
            PartnerEntry::F.status.equals(PartnerEntryStatus::Active)
        ))
        .optional()
        .await?;

    let Some(entry) = entry else {
        return Ok(Json(GetPartnerResponse { partner: None }));
    };

    let (tx, rx) = oneshot::channel();

    if let Err(err) = ws_manager_chan
        .send(WsManagerMessage::RetrieveOnlineState(
            vec![entry.partner],
            tx,
        ))
        .await
    {
        error!("Could not send to ws manager chan: {err}");
        return Err(ApiError::InternalServerError);
    }

    let online = rx
        .await
        .map_err(|err| {
            error!("Error receiving message from ws manager chan: {err}");
            ApiError::InternalServerError
        })?
        .first()
        .copied()
        .unwrap_or(false);

    Ok(Json(GetPartnerResponse {
        partner: Some(CurrentPartnerResponse {
            partner: AccountResponse {
                uuid: entry.partner,
                username: entry.partner_username,
                display_name: entry.partner_display_name,
            },
            avatar_path: entry.partner_avatar_path,
            birthdate: entry.partner_birthdate,
            gender: entry.partner_gender,
            started_at: DateTime::from_utc(entry.started_at, Utc),
            online,
        }),
    }))
}

/// A terminated relationship of the executing user
#[derive(Serialize, ToSchema)]
pub struct ExPartnerResponse {
    ex_partner: AccountResponse,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    /// The user that accepted the breakup
    ended_by: Uuid,
    #[schema(example = "We grew apart")]
    ended_reason: Option<String>,
    breakup_date: DateTime<Utc>,
    /// True once the restoration window has elapsed
    data_archived: bool,
}

/// The ex-partner history of an account
#[derive(Serialize, ToSchema)]
pub struct GetExPartnersResponse {
    ex_partners: Vec<ExPartnerResponse>,
}

/// Retrieve the ex-partner history of the executing user
///
/// Entries whose `data_archived` is still false are within the restoration
/// window: re-pairing with that user continues the old relationship.
#[utoipa::path(
    tag = "Partners",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "The ex-partner history", body = GetExPartnersResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    security(("session_cookie" = []))
)]
#[get("/partners/former")]
pub async fn get_ex_partners(
    db: Data<Database>,
    session: Session,
) -> ApiResult<Json<GetExPartnersResponse>> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    let entries = query!(db.as_ref(), ExPartnerEntry)
        .condition(ExPartnerEntry::F.account.equals(uuid.as_ref()))
        .all()
        .await?;

    Ok(Json(GetExPartnersResponse {
        ex_partners: entries
            .into_iter()
            .sorted_by_key(|entry| std::cmp::Reverse(entry.breakup_date))
            .map(|entry| ExPartnerResponse {
                ex_partner: AccountResponse {
                    uuid: entry.ex_partner,
                    username: entry.ex_partner_username,
                    display_name: entry.ex_partner_display_name,
                },
                started_at: DateTime::from_utc(entry.started_at, Utc),
                ended_at: DateTime::from_utc(entry.ended_at, Utc),
                ended_by: entry.ended_by,
                ended_reason: entry.ended_reason,
                breakup_date: DateTime::from_utc(entry.breakup_date, Utc),
                data_archived: entry.data_archived,
            })
            .collect(),
    }))
}
