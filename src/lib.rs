//! User directory with role membership, backed by a partitioned key-value
//! table.
//!
//! [`UserDirectory`] owns user records and implements the store capabilities
//! an authentication layer expects ([`UserStore`], [`UserRoleStore`],
//! [`UserPasswordStore`], [`UserEmailStore`], [`QueryableUserStore`]) on top
//! of any [`PartitionedTable`].
//!
//! ```no_run
//! use user_directory::{
//!     MemoryTable, UserBuilder, UserDirectory, UserEmailStore, UserRoleStore,
//!     UserStore,
//! };
//!
//! # async fn example() -> user_directory::Result<()> {
//! let directory = UserDirectory::new(MemoryTable::new());
//!
//! let mut user = UserBuilder::new().email("a@x.com").build();
//! assert!(directory.create(&mut user).await.succeeded());
//! directory.add_to_role(&mut user, "Admin").await?;
//!
//! let found = directory.find_by_email(&directory.normalize("a@x.com")).await?;
//! assert!(found.is_some_and(|u| directory.is_in_role(&u, "Admin")));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(unused_mut)]

pub mod claims;
pub mod config;
pub mod crypto;
pub mod error;
pub mod store;
pub mod table;
pub mod telemetry;
pub mod user;

pub use claims::UserClaims;
pub use config::Configuration;
pub use error::{DirectoryError, IdentityError, IdentityResult, Result};
pub use store::{
    QueryableUserStore, UserDirectory, UserEmailStore, UserPasswordStore,
    UserRoleStore, UserStore,
};
pub use table::{
    ContinuationToken, Filter, MemoryTable, PartitionedTable, RedbTable,
    Segment, TableBackend, TableEntity, TableError,
};
pub use user::{RoleSet, User, UserBuilder};

/// Build the directory described by `config`.
pub fn initialize(
    config: &Configuration,
) -> Result<UserDirectory<TableBackend<User>>> {
    let table = TableBackend::from_config(&config.table)?;
    let partitions = config.partition.strategy();

    tracing::info!(
        table = %config.table.name,
        memory = table.is_memory(),
        ?partitions,
        "user directory initialized"
    );

    Ok(UserDirectory::new(table)
        .partitions(partitions)
        .page_size(config.page_size))
}
