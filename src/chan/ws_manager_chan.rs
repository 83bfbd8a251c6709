use std::collections::HashMap;

use actix_toolbox::ws;
use actix_toolbox::ws::Message;
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio::sync::{mpsc, oneshot};
use tokio::task;
use uuid::Uuid;

use crate::server::handler::AccountResponse;

pub(crate) async fn start_ws_sender(tx: ws::Sender, mut rx: mpsc::Receiver<WsMessage>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            WsMessage::ServerQuitSocket => {
                if let Err(err) = tx.close().await {
                    error!("Error while closing ws sender: {err}");
                }
                break;
            }
            _ => {
                let txt = match serde_json::to_string(&msg) {
                    Ok(v) => v,
                    Err(err) => {
                        error!("Error serializing WsMessage: {err}");
                        continue;
                    }
                };

                if let Err(err) = tx.send(Message::Text(txt.into())).await {
                    error!("Error sending to client: {err}, closing socket");
                    if let Err(err) = tx.close().await {
                        error!("Error closing socket: {err}");
                    }
                }
            }
        }
    }
}

/// Message that is sent via websocket
///
/// The messages will get serialized and deserialized using JSON
#[derive(Deserialize, Serialize, Clone)]
#[serde(tag = "type", content = "content", rename_all = "camelCase")]
pub enum WsMessage {
    /// This variant is only used internally to signal a socket handler that it should
    /// shutdown
    #[serde(skip)]
    ServerQuitSocket,
    /// Response to the client if an invalid message was received.
    ///
    /// This can occur, if the server can not deserialize the message, the message has a wrong
    /// type or a message, that should only be sent from the server, is received
    InvalidMessage,
    /// Another user asked the client to become partners
    IncomingPartnerRequest {
        /// Identifier of the request
        request_uuid: Uuid,
        /// The user that sent the request
        from: AccountResponse,
        /// The message attached to the request
        message: Option<String>,
    },
    /// A request the client sent was rejected by its recipient
    PartnerRequestRejected {
        /// Identifier of the request
        request_uuid: Uuid,
    },
    /// A request addressed to the client was retracted by its sender
    PartnerRequestCancelled {
        /// Identifier of the request
        request_uuid: Uuid,
    },
    /// The client is in a relationship now.
    ///
    /// Sent to both users after an acceptance, including the accepting one.
    PartnerAdded {
        /// The new partner
        partner: AccountResponse,
        /// Start of the relationship.
        ///
        /// This predates the acceptance if a prior relationship was restored.
        started_at: DateTime<Utc>,
    },
    /// The client's partner asked to end the relationship
    IncomingBreakupRequest {
        /// Identifier of the breakup request
        breakup_uuid: Uuid,
        /// The partner that asked
        from: AccountResponse,
        /// The reason the partner gave
        reason: Option<String>,
    },
    /// A breakup request between the client and its partner was rejected
    BreakupRejected {
        /// Identifier of the breakup request
        breakup_uuid: Uuid,
    },
    /// The client's relationship has ended.
    ///
    /// Sent to both users after a breakup was accepted.
    PartnerRemoved {
        /// The now former partner
        ex_partner: AccountResponse,
        /// When the relationship ended
        ended_at: DateTime<Utc>,
    },
}

/// This type is a sender to the websocket manager
pub type WsManagerChan = Sender<WsManagerMessage>;

/// Messages to control the websocket manager
pub enum WsManagerMessage {
    /// Close the socket from the server side
    CloseSocket(Uuid),
    /// Client with given uuid initialized a websocket
    OpenedSocket(Uuid, ws::Sender),
    /// Send a message to given uuid
    SendMessage(Uuid, WsMessage),
    /// Retrieve the current websocket count by sending this
    /// message to the ws manager.
    ///
    /// It will respond through the provided channel
    RetrieveWsCount(oneshot::Sender<u64>),
    /// Retrieve the online state of the requested accounts by sending this
    /// message to the ws manager
    ///
    /// It will respond through the provided channel.
    RetrieveOnlineState(Vec<Uuid>, oneshot::Sender<Vec<bool>>),
}

/// Start the websocket manager
///
/// It will return a channel to this manager
pub async fn start_ws_manager() -> Result<WsManagerChan, String> {
    let mut lookup: HashMap<Uuid, Vec<Sender<WsMessage>>> = HashMap::new();

    let (tx, mut rx) = mpsc::channel(16);

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                WsManagerMessage::CloseSocket(uuid) => {
                    // Trigger close for all websockets associated with uuid
                    if let Some(sockets) = lookup.get(&uuid) {
                        for s in sockets {
                            if !s.is_closed() {
                                if let Err(err) = s.send(WsMessage::ServerQuitSocket).await {
                                    error!("Couldn't send close to ws sender: {err}");
                                }
                            }
                        }
                    }

                    lookup.remove(&uuid);
                }
                WsManagerMessage::OpenedSocket(uuid, ws_tx) => {
                    let (tx, rx) = mpsc::channel(16);
                    task::spawn(start_ws_sender(ws_tx, rx));

                    // Add new client connection to state
                    if let Some(sockets) = lookup.get_mut(&uuid) {
                        sockets.push(tx);
                    }
                    // Insert new client connection
                    else {
                        lookup.insert(uuid, vec![tx]);
                    }
                }
                WsManagerMessage::SendMessage(uuid, msg) => {
                    if let Some(sender) = lookup.get(&uuid) {
                        for tx in sender {
                            if let Err(err) = tx.send(msg.clone()).await {
                                error!("Could not send to ws sender: {err}");
                            }
                        }
                    }
                }
                WsManagerMessage::RetrieveWsCount(tx) => {
                    let sum = lookup.values().map(|s| s.len() as u64).sum();
                    if tx.send(sum).is_err() {
                        error!("Could not send through callback channel");
                    }
                }
                WsManagerMessage::RetrieveOnlineState(accounts, tx) => {
                    let online_state = accounts
                        .into_iter()
                        .map(|a| lookup.contains_key(&a))
                        .collect();

                    if tx.send(online_state).is_err() {
                        error!("Could not send through callback channel");
                    }
                }
            }
        }
    });

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_messages_are_tagged_by_type() {
        let msg = WsMessage::PartnerRequestRejected {
            request_uuid: Uuid::new_v4(),
        };

        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "partnerRequestRejected");
        assert!(value["content"]["request_uuid"].is_string());
    }

    #[test]
    fn invalid_message_has_no_content() {
        let value: serde_json::Value = serde_json::to_value(&WsMessage::InvalidMessage).unwrap();
        assert_eq!(value["type"], "invalidMessage");
        assert!(value.get("content").is_none());
    }
}
