use rorm::fields::types::BackRef;
use rorm::{field, Model, Patch};
use uuid::Uuid;

use crate::models::PendingRequestEntry;

/// A user account
#[derive(Model)]
pub struct Account {
    /// The primary key of a user.
    ///
    /// This will be a uuid.
    #[rorm(primary_key)]
    pub uuid: Uuid,

    /// The username of the client
    #[rorm(max_length = 255, unique)]
    pub username: String,

    /// The name that is displayed for this user
    #[rorm(max_length = 255)]
    pub display_name: String,

    /// The password hash of the user.
    #[rorm(max_length = 1024)]
    pub password_hash: String,

    /// Path to the avatar the user has uploaded
    #[rorm(max_length = 1024)]
    pub avatar_path: Option<String>,

    /// The birthdate of the user
    pub birthdate: Option<chrono::NaiveDate>,

    /// The self-chosen gender of the user
    #[rorm(max_length = 255)]
    pub gender: Option<String>,

    /// The push token of the user's current device.
    ///
    /// Unset if the user never registered a device or revoked the token.
    #[rorm(max_length = 1024)]
    pub push_token: Option<String>,

    /// The last time the user has logged in
    pub last_login: Option<chrono::NaiveDateTime>,

    /// The point in time the account was created
    #[rorm(auto_create_time)]
    pub created_at: chrono::NaiveDateTime,

    /// The partner requests this account has received and not answered yet
    pub pending_requests: BackRef<field!(PendingRequestEntry::F.recipient)>,
}

#[derive(Patch)]
#[rorm(model = "Account")]
pub(crate) struct AccountInsert {
    pub(crate) uuid: Uuid,
    pub(crate) username: String,
    pub(crate) display_name: String,
    pub(crate) password_hash: String,
    pub(crate) avatar_path: Option<String>,
    pub(crate) birthdate: Option<chrono::NaiveDate>,
    pub(crate) gender: Option<String>,
    pub(crate) push_token: Option<String>,
    pub(crate) last_login: Option<chrono::NaiveDateTime>,
}
