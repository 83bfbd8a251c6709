//! The breakup lifecycle: propose, accept and reject ending a relationship.
//!
//! Accepting a breakup moves both users' active slots into their ex-partner
//! history in one transaction. The history rows anchor the restoration
//! window: re-pairing within 30 days continues the old relationship.

use actix_toolbox::tb_middleware::Session;
use actix_web::web::{Data, Json, Path};
use actix_web::{get, post, HttpResponse};
use chrono::{DateTime, Utc};
use log::error;
use rorm::fields::types::ForeignModelByField;
use rorm::{and, insert, or, query, update, Database, Model};
use rorm::FieldAccess;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit;
use crate::chan::{
    PushDispatcherChan, PushDispatcherMessage, PushPayload, WsManagerChan, WsManagerMessage,
    WsMessage,
};
use crate::models::{
    Account, ActivityLogInsert, AuditAction, BreakupRequest, BreakupRequestInsert, BreakupStatus,
    ExPartnerEntryInsert, Partner, PartnerEntry, PartnerEntryStatus, PartnerHistoryInsert,
    PartnerRequest, PartnerStatus, RequestStatus,
};
use crate::server::handler::{
    audit_no_party, AccountResponse, ApiError, ApiErrorResponse, ApiResult, PathUuid,
};

/// The request to propose a breakup
#[derive(Deserialize, ToSchema)]
pub struct CreateBreakupRequest {
    /// An optional reason shown to the partner
    #[schema(example = "We grew apart")]
    reason: Option<String>,
}

/// A breakup request
#[derive(Serialize, ToSchema)]
pub struct BreakupRequestResponse {
    uuid: Uuid,
    from: AccountResponse,
    status: BreakupStatus,
    #[schema(example = "We grew apart")]
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

/// Propose to end the current relationship
///
/// Requires an active partner. The relationship stays active until the
/// partner accepts the proposal.
#[utoipa::path(
    tag = "Breakups",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "The created breakup request", body = BreakupRequestResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    request_body = CreateBreakupRequest,
    security(("session_cookie" = []))
)]
#[post("/breakups")]
pub async fn initiate_breakup(
    req: Json<CreateBreakupRequest>,
    db: Data<Database>,
    session: Session,
    ws_manager_chan: Data<WsManagerChan>,
    push_chan: Data<PushDispatcherChan>,
) -> ApiResult<Json<BreakupRequestResponse>> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    let mut tx = db.start_transaction().await?;

    let entry = query!(&mut tx, PartnerEntry)
        .condition(and!(
            PartnerEntry::F.account.equals(uuid.as_ref()),
            PartnerEntry::F.status.equals(PartnerEntryStatus::Active)
        ))
        .optional()
        .await?
        .ok_or(ApiError::NoActivePartner)?;

    let partner_uuid = entry.partner;

    // At most one pending breakup may exist per pair, in either direction
    if query!(&mut tx, (BreakupRequest::F.uuid,))
        .condition(or!(
            and!(
                BreakupRequest::F.from.equals(uuid.as_ref()),
                BreakupRequest::F.to.equals(partner_uuid.as_ref()),
                BreakupRequest::F.status.equals(BreakupStatus::Pending)
            ),
            and!(
                BreakupRequest::F.from.equals(partner_uuid.as_ref()),
                BreakupRequest::F.to.equals(uuid.as_ref()),
                BreakupRequest::F.status.equals(BreakupStatus::Pending)
            )
        ))
        .optional()
        .await?
        .is_some()
    {
        return Err(ApiError::BreakupAlreadyPending);
    }

    let me = query!(&mut tx, Account)
        .condition(Account::F.uuid.equals(uuid))
        .optional()
        .await?
        .ok_or(ApiError::SessionCorrupt)?;

    let breakup_uuid = Uuid::new_v4();

    insert!(&mut tx, BreakupRequestInsert)
        .single(&BreakupRequestInsert {
            uuid: breakup_uuid,
            from: ForeignModelByField::Key(uuid),
            to: ForeignModelByField::Key(partner_uuid),
            status: BreakupStatus::Pending,
            reason: req.reason.clone(),
            responded_at: None,
        })
        .await?;

    insert!(&mut tx, PartnerHistoryInsert)
        .single(&PartnerHistoryInsert {
            account: ForeignModelByField::Key(uuid),
            action: "breakup_requested".to_string(),
            details: format!("Proposed a breakup to {}", entry.partner_username),
        })
        .await?;

    insert!(&mut tx, ActivityLogInsert)
        .single(&audit::entry(
            uuid,
            Some(partner_uuid),
            AuditAction::BreakupRequested,
            "Breakup proposed",
        ))
        .await?;

    tx.commit().await?;

    let me_response = AccountResponse {
        uuid: me.uuid,
        username: me.username,
        display_name: me.display_name,
    };

    if let Err(err) = ws_manager_chan
        .send(WsManagerMessage::SendMessage(
            partner_uuid,
            WsMessage::IncomingBreakupRequest {
                breakup_uuid,
                from: me_response.clone(),
                reason: req.reason.clone(),
            },
        ))
        .await
    {
        error!("Could not send to ws manager chan: {err}");
    }

    if let Err(err) = push_chan
        .send(PushDispatcherMessage::Dispatch {
            account: partner_uuid,
            payload: PushPayload {
                title: "Breakup requested".to_string(),
                body: format!("{} wants to end the relationship", me_response.display_name),
                data: format!("{{\"breakupUuid\":\"{breakup_uuid}\"}}"),
            },
        })
        .await
    {
        error!("Could not send to push dispatcher chan: {err}");
    }

    Ok(Json(BreakupRequestResponse {
        uuid: breakup_uuid,
        from: me_response,
        status: BreakupStatus::Pending,
        reason: req.reason.clone(),
        created_at: Utc::now(),
    }))
}

/// The pending breakup of an account
#[derive(Serialize, ToSchema)]
pub struct GetBreakupResponse {
    breakup: Option<BreakupRequestResponse>,
}

/// Retrieve the pending breakup request involving the executing user, if any
#[utoipa::path(
    tag = "Breakups",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "The pending breakup, if any", body = GetBreakupResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    security(("session_cookie" = []))
)]
#[get("/breakups")]
pub async fn get_pending_breakup(
    db: Data<Database>,
    session: Session,
) -> ApiResult<Json<GetBreakupResponse>> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    let breakup = query!(
        db.as_ref(),
        (
            BreakupRequest::F.uuid,
            BreakupRequest::F.from.uuid,
            BreakupRequest::F.from.username,
            BreakupRequest::F.from.display_name,
            BreakupRequest::F.reason,
            BreakupRequest::F.created_at,
        )
    )
    .condition(and!(
        or!(
            BreakupRequest::F.from.equals(uuid.as_ref()),
            BreakupRequest::F.to.equals(uuid.as_ref())
        ),
        BreakupRequest::F.status.equals(BreakupStatus::Pending)
    ))
    .optional()
    .await?;

    Ok(Json(GetBreakupResponse {
        breakup: breakup.map(
            |(breakup_uuid, from_uuid, from_username, from_display_name, reason, created_at)| {
                BreakupRequestResponse {
                    uuid: breakup_uuid,
                    from: AccountResponse {
                        uuid: from_uuid,
                        username: from_username,
                        display_name: from_display_name,
                    },
                    status: BreakupStatus::Pending,
                    reason,
                    created_at: DateTime::from_utc(created_at, Utc),
                }
            },
        ),
    }))
}

/// Accept a pending breakup request
///
/// Only the partner the breakup was proposed to may accept it. Both users'
/// active slots are moved into their ex-partner history; the data stays
/// restorable for 30 days.
#[utoipa::path(
    tag = "Breakups",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "The relationship has ended"),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 403, description = "Not a party of this breakup", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    params(PathUuid),
    security(("session_cookie" = []))
)]
#[post("/breakups/{uuid}/accept")]
pub async fn accept_breakup(
    path: Path<PathUuid>,
    db: Data<Database>,
    session: Session,
    ws_manager_chan: Data<WsManagerChan>,
    push_chan: Data<PushDispatcherChan>,
) -> ApiResult<HttpResponse> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    let mut tx = db.start_transaction().await?;

    let breakup = query!(&mut tx, BreakupRequest)
        .condition(BreakupRequest::F.uuid.equals(path.uuid))
        .optional()
        .await?
        .ok_or(ApiError::InvalidUuid)?;

    if *breakup.to.key() != uuid {
        audit_no_party(&db, uuid, *breakup.from.key(), "accept breakup request").await;
        return Err(ApiError::MissingPrivileges);
    }

    if breakup.status != BreakupStatus::Pending {
        return Err(ApiError::BreakupNotPending);
    }

    let my_entry = query!(&mut tx, PartnerEntry)
        .condition(and!(
            PartnerEntry::F.account.equals(uuid.as_ref()),
            PartnerEntry::F.status.equals(PartnerEntryStatus::Active)
        ))
        .optional()
        .await?
        .ok_or(ApiError::NoActivePartner)?;

    if my_entry.partner != *breakup.from.key() {
        // The pending breakup refers to a relationship that no longer exists
        return Err(ApiError::BreakupNotPending);
    }

    let partner_record_uuid = *my_entry.partner_record.key();

    // Both users' slots, symmetric rows of the same relationship
    let entries = query!(&mut tx, PartnerEntry)
        .condition(PartnerEntry::F.partner_record.equals(partner_record_uuid.as_ref()))
        .all()
        .await?;

    let partner_record = query!(&mut tx, Partner)
        .condition(Partner::F.uuid.equals(partner_record_uuid))
        .optional()
        .await?
        .ok_or(ApiError::InternalServerError)?;

    let now = Utc::now().naive_utc();

    let ex_entries = entries
        .iter()
        .map(|entry| ExPartnerEntryInsert {
            account: ForeignModelByField::Key(*entry.account.key()),
            ex_partner: entry.partner,
            ex_partner_username: entry.partner_username.clone(),
            ex_partner_display_name: entry.partner_display_name.clone(),
            started_at: entry.started_at,
            ended_at: now,
            ended_by: uuid,
            ended_reason: breakup.reason.clone(),
            breakup_date: now,
            data_archived: false,
        })
        .collect::<Vec<_>>();

    insert!(&mut tx, ExPartnerEntryInsert)
        .bulk(&ex_entries)
        .await?;

    rorm::delete!(&mut tx, PartnerEntry)
        .condition(PartnerEntry::F.partner_record.equals(partner_record_uuid.as_ref()))
        .await?;

    update!(&mut tx, Partner)
        .condition(Partner::F.uuid.equals(partner_record_uuid))
        .set(Partner::F.status, PartnerStatus::Ended)
        .set(Partner::F.ended_at, Some(now))
        .set(Partner::F.ended_by, Some(uuid))
        .set(Partner::F.ended_reason, breakup.reason.clone())
        .exec()
        .await?;

    // The request that started this relationship no longer backs an active
    // one, mark it so it can not be confused with a live acceptance
    update!(&mut tx, PartnerRequest)
        .condition(
            PartnerRequest::F
                .uuid
                .equals(*partner_record.request.key()),
        )
        .set(PartnerRequest::F.status, RequestStatus::Superseded)
        .exec()
        .await?;

    update!(&mut tx, BreakupRequest)
        .condition(BreakupRequest::F.uuid.equals(breakup.uuid))
        .set(BreakupRequest::F.status, BreakupStatus::Accepted)
        .set(BreakupRequest::F.responded_at, Some(now))
        .exec()
        .await?;

    let history = entries
        .iter()
        .map(|entry| PartnerHistoryInsert {
            account: ForeignModelByField::Key(*entry.account.key()),
            action: "relationship_ended".to_string(),
            details: format!("The relationship with {} ended", entry.partner_username),
        })
        .collect::<Vec<_>>();

    insert!(&mut tx, PartnerHistoryInsert).bulk(&history).await?;

    insert!(&mut tx, ActivityLogInsert)
        .single(&audit::entry(
            uuid,
            Some(*breakup.from.key()),
            AuditAction::RelationshipEnded,
            "Breakup accepted, relationship ended",
        ))
        .await?;

    tx.commit().await?;

    let ended_at = DateTime::from_utc(now, Utc);

    for entry in &entries {
        if let Err(err) = ws_manager_chan
            .send(WsManagerMessage::SendMessage(
                *entry.account.key(),
                WsMessage::PartnerRemoved {
                    ex_partner: AccountResponse {
                        uuid: entry.partner,
                        username: entry.partner_username.clone(),
                        display_name: entry.partner_display_name.clone(),
                    },
                    ended_at,
                },
            ))
            .await
        {
            error!("Could not send to ws manager chan: {err}");
        }

        if let Err(err) = push_chan
            .send(PushDispatcherMessage::Dispatch {
                account: *entry.account.key(),
                payload: PushPayload {
                    title: "Relationship ended".to_string(),
                    body: "Your relationship has ended".to_string(),
                    data: format!("{{\"breakupUuid\":\"{}\"}}", breakup.uuid),
                },
            })
            .await
        {
            error!("Could not send to push dispatcher chan: {err}");
        }
    }

    Ok(HttpResponse::Ok().finish())
}

/// Reject a pending breakup request
///
/// Only the partner the breakup was proposed to may reject it. The
/// relationship is unchanged.
#[utoipa::path(
    tag = "Breakups",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "The breakup was rejected"),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 403, description = "Not a party of this breakup", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    params(PathUuid),
    security(("session_cookie" = []))
)]
#[post("/breakups/{uuid}/reject")]
pub async fn reject_breakup(
    path: Path<PathUuid>,
    db: Data<Database>,
    session: Session,
    ws_manager_chan: Data<WsManagerChan>,
) -> ApiResult<HttpResponse> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    let mut tx = db.start_transaction().await?;

    let breakup = query!(&mut tx, BreakupRequest)
        .condition(BreakupRequest::F.uuid.equals(path.uuid))
        .optional()
        .await?
        .ok_or(ApiError::InvalidUuid)?;

    if *breakup.to.key() != uuid {
        audit_no_party(&db, uuid, *breakup.from.key(), "reject breakup request").await;
        return Err(ApiError::MissingPrivileges);
    }

    if breakup.status != BreakupStatus::Pending {
        return Err(ApiError::BreakupNotPending);
    }

    update!(&mut tx, BreakupRequest)
        .condition(BreakupRequest::F.uuid.equals(breakup.uuid))
        .set(BreakupRequest::F.status, BreakupStatus::Rejected)
        .set(BreakupRequest::F.responded_at, Some(Utc::now().naive_utc()))
        .exec()
        .await?;

    insert!(&mut tx, PartnerHistoryInsert)
        .single(&PartnerHistoryInsert {
            account: ForeignModelByField::Key(uuid),
            action: "breakup_rejected".to_string(),
            details: "Rejected a breakup proposal".to_string(),
        })
        .await?;

    insert!(&mut tx, ActivityLogInsert)
        .single(&audit::entry(
            uuid,
            Some(*breakup.from.key()),
            AuditAction::BreakupRejected,
            "Breakup rejected, relationship continues",
        ))
        .await?;

    tx.commit().await?;

    // Both sides learn the relationship continues
    for account in [*breakup.from.key(), uuid] {
        if let Err(err) = ws_manager_chan
            .send(WsManagerMessage::SendMessage(
                account,
                WsMessage::BreakupRejected {
                    breakup_uuid: breakup.uuid,
                },
            ))
            .await
        {
            error!("Could not send to ws manager chan: {err}");
        }
    }

    Ok(HttpResponse::Ok().finish())
}
