use rorm::fields::types::ForeignModel;
use rorm::{Model, Patch};

use crate::models::Account;

/// A durable in-app notification.
///
/// One row is written for every dispatched notification, before any push
/// delivery is attempted. In-app delivery is at-least-once and independent of
/// push success.
#[derive(Model)]
pub struct Notification {
    /// Primary key of this notification
    #[rorm(id)]
    pub id: i64,

    /// The user the notification is addressed to
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub account: ForeignModel<Account>,

    /// The title shown to the user
    #[rorm(max_length = 255)]
    pub title: String,

    /// The body shown to the user
    #[rorm(max_length = 2048)]
    pub body: String,

    /// JSON encoded payload for the client
    #[rorm(max_length = 2048)]
    pub data: String,

    /// Whether the user has opened the notification
    pub read: bool,

    /// The point in time the notification was created
    #[rorm(auto_create_time)]
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Patch)]
#[rorm(model = "Notification")]
pub(crate) struct NotificationInsert {
    pub(crate) account: ForeignModel<Account>,
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) data: String,
    pub(crate) read: bool,
}
