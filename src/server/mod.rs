//! This module holds the server definition

use std::net::SocketAddr;

use actix_toolbox::tb_middleware::{
    setup_logging_mw, DBSessionStore, LoggingMiddlewareConfig, PersistentSession,
    SessionMiddleware,
};
use actix_web::cookie::Key;
use actix_web::http::StatusCode;
use actix_web::middleware::{Compress, ErrorHandlers};
use actix_web::web::{scope, Data, JsonConfig, PayloadConfig};
use actix_web::{App, HttpServer};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use log::info;
use rorm::Database;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::chan::{PushDispatcherChan, WsManagerChan};
use crate::config::Config;
use crate::server::error::StartServerError;
use crate::server::handler::{
    accept_breakup, accept_partner_request, cancel_partner_request, create_partner_request,
    delete_me, get_current_partner, get_ex_partners, get_me, get_pending_breakup,
    get_pending_requests, health, initiate_breakup, login, logout, lookup_account_by_username,
    register_account, reject_breakup, reject_partner_request, set_push_token, update_me,
    websocket,
};
use crate::server::middleware::{handle_not_found, json_extractor_error, AuthenticationRequired};
use crate::server::swagger::{AdminApiDoc, ApiDoc};

pub mod error;
pub mod handler;
pub mod middleware;
pub mod swagger;

/// Start the tandem server
///
/// **Parameter**:
/// - `config`: Reference to a [Config] struct
/// - `db`: [Database]
/// - `ws_manager_chan`: [WsManagerChan] : The channel to manage websocket connections
/// - `push_chan`: [PushDispatcherChan] : The channel to the push dispatcher
pub async fn start_server(
    config: &Config,
    db: Database,
    ws_manager_chan: WsManagerChan,
    push_chan: PushDispatcherChan,
) -> Result<(), StartServerError> {
    let s_addr = SocketAddr::new(config.server.listen_address, config.server.listen_port);

    let key = Key::try_from(
        BASE64_STANDARD
            .decode(&config.server.secret_key)
            .map_err(|_| StartServerError::InvalidSecretKey)?
            .as_slice(),
    )
    .map_err(|_| StartServerError::InvalidSecretKey)?;

    info!("Starting to listen on {}", s_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(PayloadConfig::default())
            .app_data(JsonConfig::default().error_handler(json_extractor_error))
            .app_data(Data::new(db.clone()))
            .app_data(Data::new(ws_manager_chan.clone()))
            .app_data(Data::new(push_chan.clone()))
            .wrap(setup_logging_mw(LoggingMiddlewareConfig::default()))
            .wrap(
                SessionMiddleware::builder(DBSessionStore::new(db.clone()), key.clone())
                    .session_lifecycle(PersistentSession::default())
                    .build(),
            )
            .wrap(Compress::default())
            .wrap(ErrorHandlers::new().handler(StatusCode::NOT_FOUND, handle_not_found))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi())
                    .url("/api-doc/admin-openapi.json", AdminApiDoc::openapi()),
            )
            .service(register_account)
            .service(scope("/api/v1/auth").service(login).service(logout))
            .service(
                scope("/api/v1/admin")
                    .wrap(AuthenticationRequired)
                    .service(health),
            )
            .service(
                scope("/api/v1")
                    .wrap(AuthenticationRequired)
                    .service(websocket)
                    .service(get_me)
                    .service(update_me)
                    .service(set_push_token)
                    .service(delete_me)
                    .service(lookup_account_by_username)
                    .service(create_partner_request)
                    .service(get_pending_requests)
                    .service(accept_partner_request)
                    .service(reject_partner_request)
                    .service(cancel_partner_request)
                    .service(get_current_partner)
                    .service(get_ex_partners)
                    .service(initiate_breakup)
                    .service(get_pending_breakup)
                    .service(accept_breakup)
                    .service(reject_breakup),
            )
    })
    .bind(s_addr)?
    .run()
    .await?;

    Ok(())
}
