//! # Ephemera Auth
//!
//! Single-use verification codes for registration and password reset,
//! built on [`ephemera_core::Store`].
//!
//! Every storage call, ephemeral or durable, goes through
//! [`dispatch::dispatch`]: the operation runs on its own task and hands back
//! exactly one result through a [`dispatch::Completion`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use ephemera_auth::repository::MemoryTokenStore;
//! use ephemera_auth::verification::{CodeIntent, Verifier};
//! use ephemera_core::Store;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ephemera_auth::Error> {
//!     let store = Store::new();
//!     let verifier = Verifier::new(Arc::new(MemoryTokenStore::new(store.clone())));
//!
//!     let code = verifier.issue("a@b.com", CodeIntent::Registration).await?;
//!     let record = verifier.consume(&code).await?;
//!     assert_eq!(record.identity, "a@b.com");
//!
//!     // A code works once
//!     assert!(verifier.consume(&code).await.unwrap_err().is_invalid_code());
//!
//!     store.close();
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod config;
pub mod dispatch;
mod error;
pub mod repository;
pub mod verification;

pub use accounts::{AccountService, CredentialHasher};
pub use config::{ConfigError, ServiceConfig};
pub use error::{
    CredentialError, Error, RepositoryError, Result, ValidationError, ValidationKind,
};
