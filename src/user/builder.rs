//! Typed builder for User.

use crate::user::{RoleSet, User};

/// [`User`] builder.
#[derive(Debug, Clone)]
pub struct UserBuilder<Email> {
    id: String,
    email: Email,
    first_name: String,
    last_name: String,
    phone_number: Option<String>,
    password_hash: Option<String>,
    roles: RoleSet,
}

/// Value is missing on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

impl UserBuilder<Missing> {
    /// Create a new [`UserBuilder`].
    pub fn new() -> Self {
        Self {
            id: String::default(),
            email: Missing,
            first_name: String::default(),
            last_name: String::default(),
            phone_number: None,
            password_hash: None,
            roles: RoleSet::new(),
        }
    }

    /// Update `email` field on [`UserBuilder`].
    pub fn email(self, email: impl Into<String>) -> UserBuilder<Present<String>> {
        UserBuilder {
            id: self.id,
            email: Present(email.into()),
            first_name: self.first_name,
            last_name: self.last_name,
            phone_number: self.phone_number,
            password_hash: self.password_hash,
            roles: self.roles,
        }
    }
}

impl Default for UserBuilder<Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Email> UserBuilder<Email> {
    /// Use a known `id` instead of a generated one.
    pub fn id(mut self, id: impl ToString) -> Self {
        self.id = id.to_string();
        self
    }

    /// Update `first_name` field on [`UserBuilder`].
    pub fn first_name(mut self, first_name: impl ToString) -> Self {
        self.first_name = first_name.to_string();
        self
    }

    /// Update `last_name` field on [`UserBuilder`].
    pub fn last_name(mut self, last_name: impl ToString) -> Self {
        self.last_name = last_name.to_string();
        self
    }

    pub fn phone_number(mut self, phone_number: Option<String>) -> Self {
        self.phone_number = phone_number;
        self
    }

    /// Set an already hashed password.
    pub fn password_hash(mut self, hash: impl ToString) -> Self {
        self.password_hash = Some(hash.to_string());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role);
        self
    }
}

impl UserBuilder<Present<String>> {
    /// Build a [`User`].
    ///
    /// Partition key and normalized email are filled when the user is
    /// stored.
    pub fn build(self) -> User {
        User {
            row_key: self.id,
            email: self.email.0,
            first_name: self.first_name,
            last_name: self.last_name,
            phone_number: self.phone_number,
            password_hash: self.password_hash,
            roles: self.roles,
            ..Default::default()
        }
    }
}
