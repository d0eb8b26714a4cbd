//! Capabilities a consuming authentication layer expects from a user store.
//!
//! Each trait is a narrow contract; [`UserDirectory`] implements all of
//! them and consumers bound on the ones they need. Field getters are plain
//! synchronous accessors. Every operation touching storage is `async`.
//!
//! Dropping a future before its first poll does nothing. Once polled, a
//! write runs to completion even if the future is then dropped, and only
//! awaiting it reports the outcome. A caller that gives up on a write must
//! read the user back to learn whether it landed.

mod directory;

pub use directory::*;

use async_trait::async_trait;

use crate::error::{IdentityResult, Result};
use crate::table::{ContinuationToken, Segment};
use crate::user::User;

/// Basic user persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    fn user_id<'a>(&self, user: &'a User) -> &'a str {
        user.id()
    }

    /// User name, which is the email.
    fn user_name<'a>(&self, user: &'a User) -> &'a str {
        user.user_name()
    }

    fn normalized_user_name<'a>(&self, user: &'a User) -> &'a str {
        &user.normalized_email
    }

    async fn set_user_name(&self, user: &mut User, user_name: &str) -> Result<()>;

    async fn set_normalized_user_name(
        &self,
        user: &mut User,
        normalized_name: &str,
    ) -> Result<()>;

    /// Store a new user, assigning an id when it has none.
    async fn create(&self, user: &mut User) -> IdentityResult;

    /// Write the user. Creates the row when it does not exist yet.
    async fn update(&self, user: &mut User) -> IdentityResult;

    async fn delete(&self, user: &User) -> IdentityResult;

    /// `Ok(None)` when no user has this id.
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>>;

    /// Names and emails are the same attribute, so this is a lookup on the
    /// normalized email.
    async fn find_by_name(&self, normalized_user_name: &str)
    -> Result<Option<User>>;
}

/// Role membership of users.
#[async_trait]
pub trait UserRoleStore: UserStore {
    /// Fails with [`DirectoryError::InvalidArgument`](crate::DirectoryError)
    /// when `role_name` is empty.
    async fn add_to_role(&self, user: &mut User, role_name: &str) -> Result<()>;

    /// Removing an absent role still writes the user; an empty name does
    /// nothing.
    async fn remove_from_role(&self, user: &mut User, role_name: &str)
    -> Result<()>;

    fn roles(&self, user: &User) -> Vec<String> {
        user.roles.to_vec()
    }

    /// Exact role name match.
    fn is_in_role(&self, user: &User, role_name: &str) -> bool {
        user.roles.contains(role_name)
    }

    async fn users_in_role(&self, role_name: &str) -> Result<Vec<User>>;
}

/// Password hash storage.
#[async_trait]
pub trait UserPasswordStore: UserStore {
    async fn set_password_hash(
        &self,
        user: &mut User,
        password_hash: Option<&str>,
    ) -> Result<()>;

    fn password_hash<'a>(&self, user: &'a User) -> Option<&'a str> {
        user.password_hash.as_deref()
    }

    /// `true` iff the stored hash is non-empty.
    fn has_password(&self, user: &User) -> bool {
        user.password_hash.as_deref().is_some_and(|hash| !hash.is_empty())
    }
}

/// Email and email confirmation storage.
#[async_trait]
pub trait UserEmailStore: UserStore {
    async fn set_email(&self, user: &mut User, email: &str) -> Result<()>;

    fn email<'a>(&self, user: &'a User) -> &'a str {
        &user.email
    }

    async fn set_email_confirmed(&self, user: &mut User, confirmed: bool)
    -> Result<()>;

    fn email_confirmed(&self, user: &User) -> bool {
        user.email_confirmed
    }

    /// An empty value is never stored: every write refills it from the
    /// current email.
    async fn set_normalized_email(
        &self,
        user: &mut User,
        normalized_email: &str,
    ) -> Result<()>;

    fn normalized_email<'a>(&self, user: &'a User) -> &'a str {
        &user.normalized_email
    }

    /// First user whose normalized email equals `normalized_email`.
    async fn find_by_email(&self, normalized_email: &str) -> Result<Option<User>>;
}

/// Enumeration of every user.
#[async_trait]
pub trait QueryableUserStore: UserStore {
    /// Every user, fetched segment by segment.
    async fn users(&self) -> Result<Vec<User>>;

    /// One page of users in key order.
    async fn users_page(
        &self,
        continuation: Option<&ContinuationToken>,
        limit: usize,
    ) -> Result<Segment<User>>;
}
