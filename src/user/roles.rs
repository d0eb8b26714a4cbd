//! Role membership of a user.
//!
//! Roles are kept as an ordered set of names and stored in a single string
//! attribute, joined with `,`. A `\` escapes a literal `,` or `\` inside a
//! role name, so any name survives a round trip. A `\` followed by
//! anything else is kept as is, so strings written without escapes decode
//! exactly as a plain comma split.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const DELIMITER: char = ',';
const ESCAPE: char = '\\';

/// Ordered, de-duplicated set of role names.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoleSet(Vec<String>);

impl RoleSet {
    /// Create an empty [`RoleSet`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the stored role string. Empty names are dropped, duplicates
    /// keep their first position.
    pub fn parse(raw: &str) -> Self {
        let mut roles = Self::new();
        let mut current = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                ESCAPE => {
                    let escaped = chars
                        .next_if(|&next| next == DELIMITER || next == ESCAPE);
                    current.push(escaped.unwrap_or(ESCAPE));
                },
                DELIMITER => {
                    roles.insert(std::mem::take(&mut current));
                },
                c => current.push(c),
            }
        }
        roles.insert(current);

        roles
    }

    /// Encode into the stored role string.
    pub fn encode(&self) -> String {
        let mut out = String::new();

        for (i, role) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(DELIMITER);
            }
            for c in role.chars() {
                if c == DELIMITER || c == ESCAPE {
                    out.push(ESCAPE);
                }
                out.push(c);
            }
        }

        out
    }

    /// Add a role. Returns `false` if it was already present or empty.
    pub fn insert(&mut self, role: impl Into<String>) -> bool {
        let role = role.into();
        if role.is_empty() || self.contains(&role) {
            return false;
        }

        self.0.push(role);
        true
    }

    /// Remove a role. Returns `false` if it was absent.
    pub fn remove(&mut self, role: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|r| r != role);
        self.0.len() != before
    }

    /// Exact membership test.
    pub fn contains(&self, role: &str) -> bool {
        self.0.iter().any(|r| r == role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl<S: Into<String>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut roles = Self::new();
        for role in iter {
            roles.insert(role);
        }
        roles
    }
}

impl Serialize for RoleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|raw| Self::parse(&raw)).unwrap_or_default())
    }
}
