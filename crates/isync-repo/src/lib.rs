//! Repository plumbing: git command execution, repository-root discovery,
//! the Repository Driver, and the reference File Serializer.

pub mod commands;
pub mod driver;
pub mod gitdir;
pub mod serializer;

pub use driver::{DriverError, GitRepositoryDriver, RepositoryDriver};
pub use serializer::{FileSerializer, SerializeError, YamlFileSerializer};
