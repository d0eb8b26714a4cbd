//! Identity claims issued for a signed-in user.

use serde::{Deserialize, Serialize};

use crate::user::{User, join_name};

/// Claims describing a [`User`] to the rest of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    #[serde(rename = "sub")]
    pub subject: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    #[serde(rename = "role", default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
}

impl UserClaims {
    /// Build claims from a stored user.
    pub fn from_user(user: &User) -> Self {
        Self {
            subject: user.id().to_owned(),
            name: user.user_name().to_owned(),
            email: user.email.clone(),
            email_verified: user.email_confirmed,
            roles: user.roles.to_vec(),
            given_name: user.first_name.clone(),
            family_name: user.last_name.clone(),
        }
    }

    /// "Given Family", either part optional.
    pub fn full_name(&self) -> String {
        join_name(&self.given_name, &self.family_name)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl From<&User> for UserClaims {
    fn from(user: &User) -> Self {
        Self::from_user(user)
    }
}
