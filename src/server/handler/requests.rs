//! The partner request lifecycle: send, list, accept, reject and cancel.
//!
//! Every mutation runs in a single transaction that re-checks its guards
//! right before the writes. Notifications and websocket events are only
//! dispatched after the commit and never influence the response.

use actix_toolbox::tb_middleware::Session;
use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, HttpResponse};
use chrono::{DateTime, Utc};
use itertools::Itertools;
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
    Account, ActivityLogInsert, AuditAction, PartnerEntryInsert, PartnerEntryStatus,
    PartnerHistoryInsert, PartnerInsert, PartnerRequest, PartnerRequestInsert, PartnerStatus,
    PendingRequestEntry, PendingRequestEntryInsert, RequestStatus,
};
use crate::pairing;
use crate::pairing::AssignmentCheck;
use crate::server::handler::{
    audit_no_party, AccountResponse, ApiError, ApiErrorResponse, ApiResult, PathUuid,
};

/// The maximum length of a partner request message
const MAX_MESSAGE_LEN: usize = 500;

/// The request to propose a partnership
#[derive(Deserialize, ToSchema)]
pub struct CreatePartnerRequestRequest {
    /// The user to pair up with
    to: Uuid,
    /// An optional message, at most 500 characters
    #[schema(example = "Will you be my partner?")]
    message: Option<String>,
}

/// A partner request as returned to its sender
#[derive(Serialize, ToSchema)]
pub struct PartnerRequestResponse {
    uuid: Uuid,
    from: AccountResponse,
    to: AccountResponse,
    status: RequestStatus,
    #[schema(example = "Will you be my partner?")]
    message: Option<String>,
    created_at: DateTime<Utc>,
}

/// Propose a partnership to another user
///
/// Fails if either user already has a partner or if there is already a
/// pending request between the two.
#[utoipa::path(
    tag = "Partner requests",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "The created request", body = PartnerRequestResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    request_body = CreatePartnerRequestRequest,
    security(("session_cookie" = []))
)]
#[post("/partners/requests")]
pub async fn create_partner_request(
    req: Json<CreatePartnerRequestRequest>,
    db: Data<Database>,
    session: Session,
    ws_manager_chan: Data<WsManagerChan>,
    push_chan: Data<PushDispatcherChan>,
) -> ApiResult<Json<PartnerRequestResponse>> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    if req.to == uuid {
        return Err(ApiError::SelfReference);
    }

    if let Some(message) = &req.message {
        if message.chars().count() > MAX_MESSAGE_LEN {
            return Err(ApiError::MessageTooLong);
        }
    }

    let mut tx = db.start_transaction().await?;

    let target = query!(&mut tx, Account)
        .condition(Account::F.uuid.equals(req.to))
        .optional()
        .await?
        .ok_or(ApiError::InvalidUuid)?;

    let me = query!(&mut tx, Account)
        .condition(Account::F.uuid.equals(uuid))
        .optional()
        .await?
        .ok_or(ApiError::SessionCorrupt)?;

    // At most one pending request may exist per pair, in either direction
    if query!(&mut tx, (PartnerRequest::F.uuid,))
        .condition(or!(
            and!(
                PartnerRequest::F.from.equals(uuid.as_ref()),
                PartnerRequest::F.to.equals(target.uuid.as_ref()),
                PartnerRequest::F.status.equals(RequestStatus::Pending)
            ),
            and!(
                PartnerRequest::F.from.equals(target.uuid.as_ref()),
                PartnerRequest::F.to.equals(uuid.as_ref()),
                PartnerRequest::F.status.equals(RequestStatus::Pending)
            )
        ))
        .optional()
        .await?
        .is_some()
    {
        return Err(ApiError::RequestAlreadyPending);
    }

    match pairing::check_assignment(&mut tx, uuid, target.uuid).await? {
        AssignmentCheck::Free => {}
        AssignmentCheck::CallerPartnered => return Err(ApiError::AlreadyPartnered),
        AssignmentCheck::TargetPartnered => return Err(ApiError::TargetAlreadyPartnered),
    }

    let request_uuid = Uuid::new_v4();
    let now = Utc::now().naive_utc();

    insert!(&mut tx, PartnerRequestInsert)
        .single(&PartnerRequestInsert {
            uuid: request_uuid,
            from: ForeignModelByField::Key(uuid),
            to: ForeignModelByField::Key(target.uuid),
            status: RequestStatus::Pending,
            message: req.message.clone(),
            created_at: now,
            responded_at: None,
        })
        .await?;

    insert!(&mut tx, PendingRequestEntryInsert)
        .single(&PendingRequestEntryInsert {
            request: ForeignModelByField::Key(request_uuid),
            recipient: ForeignModelByField::Key(target.uuid),
            sender: me.uuid,
            sender_username: me.username.clone(),
            sender_display_name: me.display_name.clone(),
            sender_avatar_path: me.avatar_path.clone(),
            created_at: now,
        })
        .await?;

    insert!(&mut tx, PartnerHistoryInsert)
        .bulk(&[
            PartnerHistoryInsert {
                account: ForeignModelByField::Key(uuid),
                action: "request_sent".to_string(),
                details: format!("Sent a partner request to {}", target.username),
            },
            PartnerHistoryInsert {
                account: ForeignModelByField::Key(target.uuid),
                action: "request_received".to_string(),
                details: format!("Received a partner request from {}", me.username),
            },
        ])
        .await?;

    insert!(&mut tx, ActivityLogInsert)
        .single(&audit::entry(
            uuid,
            Some(target.uuid),
            AuditAction::PartnerRequestSent,
            "Partner request created",
        ))
        .await?;

    tx.commit().await?;

    let sender = AccountResponse {
        uuid: me.uuid,
        username: me.username,
        display_name: me.display_name,
    };

    if let Err(err) = ws_manager_chan
        .send(WsManagerMessage::SendMessage(
            target.uuid,
            WsMessage::IncomingPartnerRequest {
                request_uuid,
                from: sender.clone(),
                message: req.message.clone(),
            },
        ))
        .await
    {
        error!("Could not send to ws manager chan: {err}");
    }

    if let Err(err) = push_chan
        .send(PushDispatcherMessage::Dispatch {
            account: target.uuid,
            payload: PushPayload {
                title: "New partner request".to_string(),
                body: format!("{} wants to pair up with you", sender.display_name),
                data: format!("{{\"requestUuid\":\"{request_uuid}\"}}"),
            },
        })
        .await
    {
        error!("Could not send to push dispatcher chan: {err}");
    }

    Ok(Json(PartnerRequestResponse {
        uuid: request_uuid,
        from: sender,
        to: AccountResponse {
            uuid: target.uuid,
            username: target.username,
            display_name: target.display_name,
        },
        status: RequestStatus::Pending,
        message: req.message.clone(),
        created_at: DateTime::from_utc(now, Utc),
    }))
}

/// A single inbound pending request
#[derive(Serialize, ToSchema)]
pub struct PendingRequestResponse {
    /// The request identifier, used to accept or reject it
    uuid: Uuid,
    from: AccountResponse,
    #[schema(example = "Will you be my partner?")]
    message: Option<String>,
    created_at: DateTime<Utc>,
}

/// The pending requests of an account
#[derive(Serialize, ToSchema)]
pub struct GetPendingRequestsResponse {
    requests: Vec<PendingRequestResponse>,
}

/// Retrieve all inbound pending partner requests of the executing user
#[utoipa::path(
    tag = "Partner requests",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "The pending requests", body = GetPendingRequestsResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    security(("session_cookie" = []))
)]
#[get("/partners/requests")]
pub async fn get_pending_requests(
    db: Data<Database>,
    session: Session,
) -> ApiResult<Json<GetPendingRequestsResponse>> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    let entries = query!(
        db.as_ref(),
        (
            PendingRequestEntry::F.request.uuid,
            PendingRequestEntry::F.request.message,
            PendingRequestEntry::F.sender,
            PendingRequestEntry::F.sender_username,
            PendingRequestEntry::F.sender_display_name,
            PendingRequestEntry::F.created_at,
        )
    )
    .condition(PendingRequestEntry::F.recipient.equals(uuid.as_ref()))
    .all()
    .await?;

    Ok(Json(GetPendingRequestsResponse {
        requests: entries
            .into_iter()
            .sorted_by_key(|(_, _, _, _, _, created_at)| *created_at)
            .map(
                |(request_uuid, message, sender, username, display_name, created_at)| {
                    PendingRequestResponse {
                        uuid: request_uuid,
                        from: AccountResponse {
                            uuid: sender,
                            username,
                            display_name,
                        },
                        message,
                        created_at: DateTime::from_utc(created_at, Utc),
                    }
                },
            )
            .collect(),
    }))
}

/// The relationship created by an acceptance
#[derive(Serialize, ToSchema)]
pub struct PartnerResponse {
    uuid: Uuid,
    partner: AccountResponse,
    /// Start of the relationship.
    ///
    /// Predates the acceptance if a prior relationship was restored.
    started_at: DateTime<Utc>,
    /// Whether the start date was restored from a recent prior relationship
    restored: bool,
}

/// Accept a pending partner request
///
/// Only the recipient of the request may accept it. If the two users were
/// partnered before and broke up within the last 30 days, the relationship
/// continues with its original start date.
#[utoipa::path(
    tag = "Partner requests",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "The created partnership", body = PartnerResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 403, description = "Not a party of this request", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    params(PathUuid),
    security(("session_cookie" = []))
)]
#[post("/partners/requests/{uuid}/accept")]
pub async fn accept_partner_request(
    path: Path<PathUuid>,
    db: Data<Database>,
    session: Session,
    ws_manager_chan: Data<WsManagerChan>,
    push_chan: Data<PushDispatcherChan>,
) -> ApiResult<Json<PartnerResponse>> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    let mut tx = db.start_transaction().await?;

    let request = query!(&mut tx, PartnerRequest)
        .condition(PartnerRequest::F.uuid.equals(path.uuid))
        .optional()
        .await?
        .ok_or(ApiError::InvalidUuid)?;

    if *request.to.key() != uuid {
        audit_no_party(&db, uuid, *request.from.key(), "accept partner request").await;
        return Err(ApiError::MissingPrivileges);
    }

    if request.status != RequestStatus::Pending {
        return Err(ApiError::RequestNotPending);
    }

    let sender_uuid = *request.from.key();

    // The slots may have been taken since the request was sent, check again
    // in this transaction
    match pairing::check_assignment(&mut tx, uuid, sender_uuid).await? {
        AssignmentCheck::Free => {}
        AssignmentCheck::CallerPartnered => return Err(ApiError::AlreadyPartnered),
        AssignmentCheck::TargetPartnered => return Err(ApiError::TargetAlreadyPartnered),
    }

    let now = Utc::now().naive_utc();
    let restoration = pairing::check_restoration(&mut tx, sender_uuid, uuid, now).await?;

    let sender = query!(&mut tx, Account)
        .condition(Account::F.uuid.equals(sender_uuid))
        .optional()
        .await?
        .ok_or(ApiError::InvalidUuid)?;

    let me = query!(&mut tx, Account)
        .condition(Account::F.uuid.equals(uuid))
        .optional()
        .await?
        .ok_or(ApiError::SessionCorrupt)?;

    let partner_uuid = Uuid::new_v4();

    insert!(&mut tx, PartnerInsert)
        .single(&PartnerInsert {
            uuid: partner_uuid,
            user1: ForeignModelByField::Key(sender.uuid),
            user2: ForeignModelByField::Key(me.uuid),
            request: ForeignModelByField::Key(request.uuid),
            status: PartnerStatus::Active,
            started_at: restoration.started_at,
            ended_at: None,
            ended_by: None,
            ended_reason: None,
        })
        .await?;

    // Mirror the slot into both users' read models with an identical start
    insert!(&mut tx, PartnerEntryInsert)
        .bulk(&[
            PartnerEntryInsert {
                account: ForeignModelByField::Key(sender.uuid),
                partner_record: ForeignModelByField::Key(partner_uuid),
                status: PartnerEntryStatus::Active,
                partner: me.uuid,
                partner_username: me.username.clone(),
                partner_display_name: me.display_name.clone(),
                partner_avatar_path: me.avatar_path.clone(),
                partner_birthdate: me.birthdate,
                partner_gender: me.gender.clone(),
                started_at: restoration.started_at,
            },
            PartnerEntryInsert {
                account: ForeignModelByField::Key(me.uuid),
                partner_record: ForeignModelByField::Key(partner_uuid),
                status: PartnerEntryStatus::Active,
                partner: sender.uuid,
                partner_username: sender.username.clone(),
                partner_display_name: sender.display_name.clone(),
                partner_avatar_path: sender.avatar_path.clone(),
                partner_birthdate: sender.birthdate,
                partner_gender: sender.gender.clone(),
                started_at: restoration.started_at,
            },
        ])
        .await?;

    rorm::delete!(&mut tx, PendingRequestEntry)
        .condition(PendingRequestEntry::F.request.equals(request.uuid.as_ref()))
        .await?;

    update!(&mut tx, PartnerRequest)
        .condition(PartnerRequest::F.uuid.equals(request.uuid))
        .set(PartnerRequest::F.status, RequestStatus::Accepted)
        .set(PartnerRequest::F.responded_at, Some(now))
        .exec()
        .await?;

    insert!(&mut tx, PartnerHistoryInsert)
        .bulk(&[
            PartnerHistoryInsert {
                account: ForeignModelByField::Key(me.uuid),
                action: "request_accepted".to_string(),
                details: format!("Accepted the partner request of {}", sender.username),
            },
            PartnerHistoryInsert {
                account: ForeignModelByField::Key(sender.uuid),
                action: "relationship_started".to_string(),
                details: format!("{} accepted the partner request", me.username),
            },
        ])
        .await?;

    insert!(&mut tx, ActivityLogInsert)
        .bulk(&[
            audit::entry(
                me.uuid,
                Some(sender.uuid),
                AuditAction::PartnerRequestAccepted,
                "Partner request accepted",
            ),
            audit::entry(
                me.uuid,
                Some(sender.uuid),
                AuditAction::RelationshipStarted,
                if restoration.restored {
                    "Relationship restored"
                } else {
                    "Relationship started"
                },
            ),
        ])
        .await?;

    tx.commit().await?;

    let me_response = AccountResponse {
        uuid: me.uuid,
        username: me.username,
        display_name: me.display_name,
    };
    let sender_response = AccountResponse {
        uuid: sender.uuid,
        username: sender.username,
        display_name: sender.display_name,
    };
    let started_at = DateTime::from_utc(restoration.started_at, Utc);

    for (account, partner) in [
        (sender.uuid, me_response.clone()),
        (me.uuid, sender_response.clone()),
    ] {
        if let Err(err) = ws_manager_chan
            .send(WsManagerMessage::SendMessage(
                account,
                WsMessage::PartnerAdded {
                    partner,
                    started_at,
                },
            ))
            .await
        {
            error!("Could not send to ws manager chan: {err}");
        }
    }

    if let Err(err) = push_chan
        .send(PushDispatcherMessage::Dispatch {
            account: sender.uuid,
            payload: PushPayload {
                title: "Request accepted".to_string(),
                body: format!("{} accepted your partner request", me_response.display_name),
                data: format!("{{\"partnerUuid\":\"{partner_uuid}\"}}"),
            },
        })
        .await
    {
        error!("Could not send to push dispatcher chan: {err}");
    }

    Ok(Json(PartnerResponse {
        uuid: partner_uuid,
        partner: sender_response,
        started_at,
        restored: restoration.restored,
    }))
}

/// Reject a pending partner request
///
/// Only the recipient of the request may reject it.
#[utoipa::path(
    tag = "Partner requests",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "Request has been rejected"),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 403, description = "Not a party of this request", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    params(PathUuid),
    security(("session_cookie" = []))
)]
#[post("/partners/requests/{uuid}/reject")]
pub async fn reject_partner_request(
    path: Path<PathUuid>,
    db: Data<Database>,
    session: Session,
    ws_manager_chan: Data<WsManagerChan>,
    push_chan: Data<PushDispatcherChan>,
) -> ApiResult<HttpResponse> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    let mut tx = db.start_transaction().await?;

    let request = query!(&mut tx, PartnerRequest)
        .condition(PartnerRequest::F.uuid.equals(path.uuid))
        .optional()
        .await?
        .ok_or(ApiError::InvalidUuid)?;

    if *request.to.key() != uuid {
        audit_no_party(&db, uuid, *request.from.key(), "reject partner request").await;
        return Err(ApiError::MissingPrivileges);
    }

    if request.status != RequestStatus::Pending {
        return Err(ApiError::RequestNotPending);
    }

    let sender_uuid = *request.from.key();

    update!(&mut tx, PartnerRequest)
        .condition(PartnerRequest::F.uuid.equals(request.uuid))
        .set(PartnerRequest::F.status, RequestStatus::Rejected)
        .set(PartnerRequest::F.responded_at, Some(Utc::now().naive_utc()))
        .exec()
        .await?;

    rorm::delete!(&mut tx, PendingRequestEntry)
        .condition(PendingRequestEntry::F.request.equals(request.uuid.as_ref()))
        .await?;

    insert!(&mut tx, PartnerHistoryInsert)
        .single(&PartnerHistoryInsert {
            account: ForeignModelByField::Key(uuid),
            action: "request_rejected".to_string(),
            details: "Rejected a partner request".to_string(),
        })
        .await?;

    insert!(&mut tx, ActivityLogInsert)
        .single(&audit::entry(
            uuid,
            Some(sender_uuid),
            AuditAction::PartnerRequestRejected,
            "Partner request rejected",
        ))
        .await?;

    tx.commit().await?;

    if let Err(err) = ws_manager_chan
        .send(WsManagerMessage::SendMessage(
            sender_uuid,
            WsMessage::PartnerRequestRejected {
                request_uuid: request.uuid,
            },
        ))
        .await
    {
        error!("Could not send to ws manager chan: {err}");
    }

    if let Err(err) = push_chan
        .send(PushDispatcherMessage::Dispatch {
            account: sender_uuid,
            payload: PushPayload {
                title: "Request rejected".to_string(),
                body: "Your partner request was rejected".to_string(),
                data: format!("{{\"requestUuid\":\"{}\"}}", request.uuid),
            },
        })
        .await
    {
        error!("Could not send to push dispatcher chan: {err}");
    }

    Ok(HttpResponse::Ok().finish())
}

/// Retract a pending partner request
///
/// Only the sender of the request may retract it.
#[utoipa::path(
    tag = "Partner requests",
    context_path = "/api/v1",
    responses(
        (status = 200, description = "Request has been cancelled"),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 403, description = "Not a party of this request", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    params(PathUuid),
    security(("session_cookie" = []))
)]
#[delete("/partners/requests/{uuid}")]
pub async fn cancel_partner_request(
    path: Path<PathUuid>,
    db: Data<Database>,
    session: Session,
    ws_manager_chan: Data<WsManagerChan>,
    push_chan: Data<PushDispatcherChan>,
) -> ApiResult<HttpResponse> {
    let uuid: Uuid = session.get("uuid")?.ok_or(ApiError::SessionCorrupt)?;

    let mut tx = db.start_transaction().await?;

    let request = query!(&mut tx, PartnerRequest)
        .condition(PartnerRequest::F.uuid.equals(path.uuid))
        .optional()
        .await?
        .ok_or(ApiError::InvalidUuid)?;

    if *request.from.key() != uuid {
        audit_no_party(&db, uuid, *request.to.key(), "cancel partner request").await;
        return Err(ApiError::MissingPrivileges);
    }

    if request.status != RequestStatus::Pending {
        return Err(ApiError::RequestNotPending);
    }

    let recipient_uuid = *request.to.key();

    update!(&mut tx, PartnerRequest)
        .condition(PartnerRequest::F.uuid.equals(request.uuid))
        .set(PartnerRequest::F.status, RequestStatus::Cancelled)
        .set(PartnerRequest::F.responded_at, Some(Utc::now().naive_utc()))
        .exec()
        .await?;

    rorm::delete!(&mut tx, PendingRequestEntry)
        .condition(PendingRequestEntry::F.request.equals(request.uuid.as_ref()))
        .await?;

    insert!(&mut tx, PartnerHistoryInsert)
        .single(&PartnerHistoryInsert {
            account: ForeignModelByField::Key(uuid),
            action: "request_cancelled".to_string(),
            details: "Retracted a partner request".to_string(),
        })
        .await?;

    insert!(&mut tx, ActivityLogInsert)
        .single(&audit::entry(
            uuid,
            Some(recipient_uuid),
            AuditAction::PartnerRequestCancelled,
            "Partner request cancelled",
        ))
        .await?;

    tx.commit().await?;

    if let Err(err) = ws_manager_chan
        .send(WsManagerMessage::SendMessage(
            recipient_uuid,
            WsMessage::PartnerRequestCancelled {
                request_uuid: request.uuid,
            },
        ))
        .await
    {
        error!("Could not send to ws manager chan: {err}");
    }

    if let Err(err) = push_chan
        .send(PushDispatcherMessage::Dispatch {
            account: recipient_uuid,
            payload: PushPayload {
                title: "Request retracted".to_string(),
                body: "A partner request addressed to you was retracted".to_string(),
                data: format!("{{\"requestUuid\":\"{}\"}}", request.uuid),
            },
        })
        .await
    {
        error!("Could not send to push dispatcher chan: {err}");
    }

    Ok(HttpResponse::Ok().finish())
}
