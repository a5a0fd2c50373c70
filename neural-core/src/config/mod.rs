//! Configuration management
//!
//! Two layers live here: the application settings file (loaded once, with
//! environment overrides) and the [`ConfigResolver`] that resolves named
//! secrets through the remote store at runtime.

pub mod loader;
pub mod resolver;
pub mod schema;
pub mod validate;

pub use loader::ConfigLoader;
pub use resolver::{decide, ConfigResolver, RemoteLookup, Resolution};
pub use schema::*;
