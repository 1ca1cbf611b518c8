//! Infrastructure layer: collaborator adapters for the authorization engine.

pub mod in_memory;
pub mod postgres;
pub mod remote_identity;

pub use in_memory::InMemoryPermissionSource;
pub use postgres::PgPermissionSource;
pub use remote_identity::RemoteIdentityProvider;
