mod builder;
mod normalizer;
mod partition;
mod roles;

pub use builder::*;
pub use normalizer::*;
pub use partition::*;
pub use roles::*;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::table::TableEntity;

const ID_BYTES: usize = 16;

/// User as saved on the table.
///
/// The email doubles as the user name. An empty `row_key` means the user
/// has not been stored yet; one is generated on first write.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct User {
    pub partition_key: String,
    pub row_key: String,
    pub email: String,
    pub normalized_email: String,
    pub email_confirmed: bool,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "RolesStr")]
    pub roles: RoleSet,
    pub password_hash: Option<String>,
    pub phone_number: Option<String>,
    pub two_factor_enabled: bool,
}

impl User {
    /// Identifier of the user, empty until first stored.
    #[inline]
    pub fn id(&self) -> &str {
        &self.row_key
    }

    /// User name, which is the email.
    #[inline]
    pub fn user_name(&self) -> &str {
        &self.email
    }

    /// "First Last", either part optional.
    pub fn full_name(&self) -> String {
        join_name(&self.first_name, &self.last_name)
    }
}

impl TableEntity for User {
    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> &str {
        &self.row_key
    }
}

/// Generate a new random user identifier.
pub fn generate_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn join_name(first: &str, last: &str) -> String {
    match (first.is_empty(), last.is_empty()) {
        (false, false) => format!("{first} {last}"),
        (false, true) => first.to_owned(),
        (true, false) => last.to_owned(),
        (true, true) => String::new(),
    }
}
