//! Table-backed implementation of every store capability.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::crypto::PasswordManager;
use crate::error::{DirectoryError, IdentityResult, Result};
use crate::store::{
    QueryableUserStore, UserEmailStore, UserPasswordStore, UserRoleStore,
    UserStore,
};
use crate::table::{
    ContinuationToken, DEFAULT_SEGMENT_SIZE, Filter, PartitionedTable, Segment,
};
use crate::telemetry;
use crate::user::{
    LookupNormalizer, PartitionStrategy, UpperInvariantNormalizer, User,
    generate_id,
};

/// Serialized name of the attribute lookups by name or email use.
const NORMALIZED_EMAIL: &str = "NormalizedEmail";

/// User directory over a [`PartitionedTable`].
///
/// Holds no user state of its own: every call goes to the table, so
/// concurrent callers only share what the table shares. Role updates are
/// read-modify-write on the caller's copy of the user; two callers
/// changing roles of the same user concurrently can overwrite each other.
pub struct UserDirectory<T> {
    table: T,
    partitions: PartitionStrategy,
    normalizer: Arc<dyn LookupNormalizer>,
    page_size: usize,
}

impl<T> std::fmt::Debug for UserDirectory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory")
            .field("partitions", &self.partitions)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl<T: PartitionedTable<User>> UserDirectory<T> {
    /// Create a new [`UserDirectory`] storing every user in the `Users`
    /// partition.
    pub fn new(table: T) -> Self {
        Self {
            table,
            partitions: PartitionStrategy::default(),
            normalizer: Arc::new(UpperInvariantNormalizer),
            page_size: DEFAULT_SEGMENT_SIZE,
        }
    }

    /// Update partition strategy.
    pub fn partitions(mut self, partitions: PartitionStrategy) -> Self {
        self.partitions = partitions;
        self
    }

    /// Update lookup normalizer.
    pub fn normalizer(mut self, normalizer: impl LookupNormalizer + 'static) -> Self {
        self.normalizer = Arc::new(normalizer);
        self
    }

    /// Update rows fetched per segment while scanning.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Normalize a user name or email the way lookups expect it.
    pub fn normalize(&self, email: &str) -> String {
        self.normalizer.normalize_email(email)
    }

    /// Hash `password` and store it on the user.
    pub async fn change_password(
        &self,
        user: &mut User,
        password: &str,
        passwords: &PasswordManager,
    ) -> Result<()> {
        let hash = passwords.hash_password(password)?;
        self.set_password_hash(user, Some(&hash)).await
    }

    /// Check `password` against the stored hash. A user without password
    /// never matches.
    pub fn check_password(
        &self,
        user: &User,
        password: &str,
        passwords: &PasswordManager,
    ) -> Result<bool> {
        match user.password_hash.as_deref().filter(|hash| !hash.is_empty()) {
            Some(hash) => Ok(passwords.verify_password(password, hash)?),
            None => Ok(false),
        }
    }

    /// Fill id, partition key and normalized email before a write.
    fn prepare(&self, user: &mut User) {
        if user.row_key.is_empty() {
            user.row_key = generate_id();
        }

        user.partition_key = self.partitions.partition_for(&user.row_key);

        if user.normalized_email.is_empty() && !user.email.is_empty() {
            user.normalized_email = self.normalizer.normalize_email(&user.email);
        }
    }

    /// Prepare and upsert the whole user.
    async fn persist(&self, operation: &'static str, user: &mut User) -> Result<()> {
        let start = Instant::now();
        self.prepare(user);

        let result = self.table.insert_or_merge(user).await;
        if result.is_ok() {
            tracing::debug!(
                operation,
                user_id = %user.row_key,
                partition = %user.partition_key,
                "user written"
            );
        }
        observed(operation, start, result.map_err(DirectoryError::from))
    }

    fn scope(&self) -> Filter {
        Filter::partitions(self.partitions.partitions())
    }

    /// Scan users matching `filter`, keeping those accepted by `keep`.
    async fn scan(
        &self,
        filter: &Filter,
        keep: impl Fn(&User) -> bool + Send + Sync,
    ) -> Result<Vec<User>> {
        let mut users = Vec::new();
        let mut continuation: Option<ContinuationToken> = None;

        loop {
            let segment = self
                .table
                .query_segment(filter, continuation.as_ref(), self.page_size)
                .await?;
            users.extend(segment.items.into_iter().filter(|user| keep(user)));

            match segment.continuation {
                Some(token) => continuation = Some(token),
                None => return Ok(users),
            }
        }
    }
}

/// Log a failed operation and record its outcome and latency.
fn observed<R>(
    operation: &'static str,
    start: Instant,
    result: Result<R>,
) -> Result<R> {
    if let Err(err) = &result {
        tracing::warn!(operation, code = err.code(), %err, "directory operation failed");
    }
    telemetry::track(operation, start, result.is_ok());

    result
}

#[async_trait]
impl<T: PartitionedTable<User>> UserStore for UserDirectory<T> {
    async fn set_user_name(&self, user: &mut User, user_name: &str) -> Result<()> {
        self.set_email(user, user_name).await
    }

    async fn set_normalized_user_name(
        &self,
        user: &mut User,
        normalized_name: &str,
    ) -> Result<()> {
        self.set_normalized_email(user, normalized_name).await
    }

    async fn create(&self, user: &mut User) -> IdentityResult {
        let result = self.persist("create", user).await;
        if result.is_ok() {
            tracing::info!(user_id = %user.row_key, "user created");
        }
        IdentityResult::from(result)
    }

    async fn update(&self, user: &mut User) -> IdentityResult {
        IdentityResult::from(self.persist("update", user).await)
    }

    async fn delete(&self, user: &User) -> IdentityResult {
        let start = Instant::now();
        let partition = self.partitions.partition_for(user.id());

        let result = self.table.delete(&partition, user.id()).await;
        if result.is_ok() {
            tracing::info!(user_id = %user.row_key, "user deleted");
        }

        IdentityResult::from(observed(
            "delete",
            start,
            result.map_err(DirectoryError::from),
        ))
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        if user_id.is_empty() {
            return Ok(None);
        }
        let start = Instant::now();
        let partition = self.partitions.partition_for(user_id);

        let result = self.table.get(&partition, user_id).await;
        observed("find_by_id", start, result.map_err(DirectoryError::from))
    }

    async fn find_by_name(
        &self,
        normalized_user_name: &str,
    ) -> Result<Option<User>> {
        self.find_by_email(normalized_user_name).await
    }
}

#[async_trait]
impl<T: PartitionedTable<User>> UserRoleStore for UserDirectory<T> {
    async fn add_to_role(&self, user: &mut User, role_name: &str) -> Result<()> {
        if role_name.is_empty() {
            return Err(DirectoryError::invalid_argument(
                "role_name",
                "role name must not be empty",
            ));
        }

        user.roles.insert(role_name);
        self.persist("add_to_role", user).await
    }

    async fn remove_from_role(
        &self,
        user: &mut User,
        role_name: &str,
    ) -> Result<()> {
        if role_name.is_empty() {
            return Ok(());
        }

        user.roles.remove(role_name);
        self.persist("remove_from_role", user).await
    }

    async fn users_in_role(&self, role_name: &str) -> Result<Vec<User>> {
        if role_name.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let result = self
            .scan(&self.scope(), |user| user.roles.contains(role_name))
            .await;

        observed("users_in_role", start, result)
    }
}

#[async_trait]
impl<T: PartitionedTable<User>> UserPasswordStore for UserDirectory<T> {
    async fn set_password_hash(
        &self,
        user: &mut User,
        password_hash: Option<&str>,
    ) -> Result<()> {
        user.password_hash = password_hash.map(ToOwned::to_owned);
        self.persist("set_password_hash", user).await
    }
}

#[async_trait]
impl<T: PartitionedTable<User>> UserEmailStore for UserDirectory<T> {
    /// Also refreshes the normalized email so lookups follow the new
    /// address.
    async fn set_email(&self, user: &mut User, email: &str) -> Result<()> {
        user.email = email.to_owned();
        user.normalized_email = self.normalizer.normalize_email(email);
        self.persist("set_email", user).await
    }

    async fn set_email_confirmed(
        &self,
        user: &mut User,
        confirmed: bool,
    ) -> Result<()> {
        user.email_confirmed = confirmed;
        self.persist("set_email_confirmed", user).await
    }

    async fn set_normalized_email(
        &self,
        user: &mut User,
        normalized_email: &str,
    ) -> Result<()> {
        user.normalized_email = normalized_email.to_owned();
        self.persist("set_normalized_email", user).await
    }

    async fn find_by_email(&self, normalized_email: &str) -> Result<Option<User>> {
        let start = Instant::now();
        let filter = self.scope().and_eq(NORMALIZED_EMAIL, normalized_email);

        let result = self
            .table
            .query_segment(&filter, None, 1)
            .await
            .map(|segment| segment.items.into_iter().next());
        observed("find_by_email", start, result.map_err(DirectoryError::from))
    }
}

#[async_trait]
impl<T: PartitionedTable<User>> QueryableUserStore for UserDirectory<T> {
    async fn users(&self) -> Result<Vec<User>> {
        let start = Instant::now();
        let result = self.scan(&self.scope(), |_| true).await;

        observed("users", start, result)
    }

    async fn users_page(
        &self,
        continuation: Option<&ContinuationToken>,
        limit: usize,
    ) -> Result<Segment<User>> {
        let start = Instant::now();
        let result = self
            .table
            .query_segment(&self.scope(), continuation, limit)
            .await;

        observed("users_page", start, result.map_err(DirectoryError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{MemoryTable, TableError, TableResult};
    use crate::user::UserBuilder;

    fn directory() -> UserDirectory<MemoryTable<User>> {
        UserDirectory::new(MemoryTable::new())
    }

    /// Table whose every call fails.
    struct BrokenTable;

    #[async_trait]
    impl PartitionedTable<User> for BrokenTable {
        async fn get(&self, _: &str, _: &str) -> TableResult<Option<User>> {
            Err(TableError::Storage("unreachable".into()))
        }

        async fn query_segment(
            &self,
            _: &Filter,
            _: Option<&ContinuationToken>,
            _: usize,
        ) -> TableResult<Segment<User>> {
            Err(TableError::Storage("unreachable".into()))
        }

        async fn insert_or_merge(&self, _: &User) -> TableResult<()> {
            Err(TableError::Storage("unreachable".into()))
        }

        async fn delete(&self, _: &str, _: &str) -> TableResult<()> {
            Err(TableError::Storage("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_partition() {
        let dir = directory();
        let mut user = UserBuilder::new().email("a@x.com").build();

        assert!(dir.create(&mut user).await.succeeded());
        assert!(!user.id().is_empty());
        assert_eq!(user.partition_key, "Users");
        assert_eq!(user.normalized_email, "A@X.COM");

        let found = dir.find_by_id(user.id()).await.unwrap();
        assert_eq!(found, Some(user));
    }

    #[tokio::test]
    async fn test_create_keeps_given_id() {
        let dir = directory();
        let mut user = UserBuilder::new().id("admin").email("a@x.com").build();

        assert!(dir.create(&mut user).await.succeeded());
        assert_eq!(user.id(), "admin");
    }

    #[tokio::test]
    async fn test_storage_failures_are_results() {
        let dir = UserDirectory::new(BrokenTable);
        let mut user = UserBuilder::new().email("a@x.com").build();

        let result = dir.create(&mut user).await;
        assert!(!result.succeeded());
        assert_eq!(result.errors()[0].code, "StorageError");

        assert!(!dir.update(&mut user).await.succeeded());
        assert!(!dir.delete(&user).await.succeeded());

        // Reads propagate the error.
        assert!(dir.find_by_id(user.id()).await.is_err());
        assert!(dir.find_by_email("A@X.COM").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_missing_user() {
        let dir = directory();
        let user = UserBuilder::new().id("ghost").email("g@x.com").build();

        let result = dir.delete(&user).await;
        assert_eq!(result.errors()[0].code, "ResourceNotFound");
    }

    #[tokio::test]
    async fn test_empty_role_is_rejected() {
        let dir = directory();
        let mut user = UserBuilder::new().email("a@x.com").role("Editor").build();
        assert!(dir.create(&mut user).await.succeeded());

        let err = dir.add_to_role(&mut user, "").await.unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidArgument { .. }));
        assert_eq!(user.roles.encode(), "Editor");

        dir.remove_from_role(&mut user, "").await.unwrap();
        assert_eq!(dir.roles(&user), vec!["Editor"]);
    }

    #[tokio::test]
    async fn test_role_match_is_exact() {
        let dir = directory();
        let mut user = UserBuilder::new().email("a@x.com").build();
        assert!(dir.create(&mut user).await.succeeded());
        dir.add_to_role(&mut user, "SuperAdmin").await.unwrap();

        assert!(dir.is_in_role(&user, "SuperAdmin"));
        assert!(!dir.is_in_role(&user, "Admin"));
        assert!(dir.users_in_role("Admin").await.unwrap().is_empty());
        assert_eq!(dir.users_in_role("SuperAdmin").await.unwrap().len(), 1);
        assert!(dir.users_in_role("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_email_refreshes_lookup() {
        let dir = directory();
        let mut user = UserBuilder::new().email("old@x.com").build();
        assert!(dir.create(&mut user).await.succeeded());

        dir.set_email(&mut user, "New@X.com").await.unwrap();

        assert_eq!(dir.email(&user), "New@X.com");
        assert_eq!(dir.normalized_email(&user), "NEW@X.COM");
        assert!(dir.find_by_email("OLD@X.COM").await.unwrap().is_none());
        assert_eq!(
            dir.find_by_name("NEW@X.COM").await.unwrap().map(|u| u.row_key),
            Some(user.row_key.clone())
        );
    }

    #[tokio::test]
    async fn test_empty_normalized_email_is_refilled() {
        let dir = directory();
        let mut user = UserBuilder::new().email("a@x.com").build();
        assert!(dir.create(&mut user).await.succeeded());

        dir.set_normalized_email(&mut user, "CUSTOM").await.unwrap();
        assert!(dir.find_by_email("CUSTOM").await.unwrap().is_some());

        dir.set_normalized_email(&mut user, "").await.unwrap();
        assert_eq!(dir.normalized_email(&user), "A@X.COM");

        let stored = dir.find_by_id(user.id()).await.unwrap().unwrap();
        assert_eq!(stored.normalized_email, "A@X.COM");
        assert!(dir.find_by_email("CUSTOM").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_email_confirmation() {
        let dir = directory();
        let mut user = UserBuilder::new().email("a@x.com").build();
        assert!(dir.create(&mut user).await.succeeded());
        assert!(!dir.email_confirmed(&user));

        dir.set_email_confirmed(&mut user, true).await.unwrap();

        let stored = dir.find_by_id(user.id()).await.unwrap().unwrap();
        assert!(dir.email_confirmed(&stored));
    }

    #[tokio::test]
    async fn test_user_name_is_email() {
        let dir = directory();
        let mut user = UserBuilder::new().email("a@x.com").build();

        dir.set_user_name(&mut user, "b@x.com").await.unwrap();
        assert_eq!(dir.user_name(&user), "b@x.com");
        assert_eq!(dir.email(&user), "b@x.com");

        dir.set_normalized_user_name(&mut user, "CUSTOM").await.unwrap();
        assert_eq!(dir.normalized_user_name(&user), "CUSTOM");
        assert!(dir.find_by_name("CUSTOM").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_password_hash() {
        let dir = directory();
        let mut user = UserBuilder::new().email("a@x.com").build();
        assert!(!dir.has_password(&user));

        dir.set_password_hash(&mut user, Some("")).await.unwrap();
        assert!(!dir.has_password(&user));

        dir.set_password_hash(&mut user, Some("h1")).await.unwrap();
        assert_eq!(dir.password_hash(&user), Some("h1"));
        assert!(dir.has_password(&user));

        dir.set_password_hash(&mut user, None).await.unwrap();
        let stored = dir.find_by_id(user.id()).await.unwrap().unwrap();
        assert!(!dir.has_password(&stored));
    }

    #[tokio::test]
    async fn test_change_and_check_password() {
        let dir = directory();
        let passwords = PasswordManager::new(Some(crate::config::Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap();
        let mut user = UserBuilder::new().email("a@x.com").build();

        assert!(!dir.check_password(&user, "secret", &passwords).unwrap());

        dir.change_password(&mut user, "secret", &passwords).await.unwrap();
        let stored = dir.find_by_id(user.id()).await.unwrap().unwrap();

        assert!(dir.check_password(&stored, "secret", &passwords).unwrap());
        assert!(!dir.check_password(&stored, "guess", &passwords).unwrap());
    }

    #[tokio::test]
    async fn test_sharded_directory() {
        let dir = directory()
            .partitions(PartitionStrategy::Sharded {
                prefix: "Users".into(),
                shards: 4,
            })
            .page_size(2);

        let mut ids = Vec::new();
        for i in 0..9 {
            let mut user = UserBuilder::new().email(format!("u{i}@x.com")).build();
            assert!(dir.create(&mut user).await.succeeded());
            assert!(user.partition_key.starts_with("Users-"));
            ids.push(user.row_key.clone());
        }

        for id in &ids {
            assert!(dir.find_by_id(id).await.unwrap().is_some());
        }
        assert_eq!(dir.users().await.unwrap().len(), 9);
        assert!(dir.find_by_email("U7@X.COM").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_users_page() {
        let dir = directory();
        for i in 0..5 {
            let mut user = UserBuilder::new().email(format!("u{i}@x.com")).build();
            assert!(dir.create(&mut user).await.succeeded());
        }

        let first = dir.users_page(None, 3).await.unwrap();
        assert_eq!(first.items.len(), 3);
        let token = first.continuation.expect("more users");

        let second = dir.users_page(Some(&token), 3).await.unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.continuation.is_none());
    }
}
