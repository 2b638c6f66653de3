//! Storage collaborators.
//!
//! Both the ephemeral store and the durable user store are reached through
//! these types. Each call is dispatched as its own unit of work and hands
//! back a [`Completion`](crate::dispatch::Completion).

mod token;
mod user;

pub use token::{MemoryTokenStore, TokenStore};
pub use user::{AccountStore, InMemoryUserRepository, User, UserRepository};

pub(crate) use token::truncate_key_for_log;
