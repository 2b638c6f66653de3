use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::dispatch::{dispatch, Completion};
use crate::error::{Error, RepositoryError};

/// A persisted account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub nickname: String,
    pub email: String,
    pub password_hash: String,
}

impl User {
    /// Builds a new account with a fresh id
    ///
    /// The nickname defaults to the local part of the email address.
    pub fn new(email: &str, name: &str, password_hash: String) -> Self {
        let nickname = email.split('@').next().unwrap_or_default();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            nickname: nickname.to_string(),
            email: email.to_string(),
            password_hash,
        }
    }
}

/// The durable user store.
///
/// Implementations own their connection handling and concurrency.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Number of accounts registered under `email`
    async fn count_by_email(&self, email: &str) -> Result<u64, RepositoryError>;

    /// Inserts a new account
    async fn insert(&self, user: &User) -> Result<(), RepositoryError>;

    /// Looks an account up by email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Replaces the stored password hash of account `id`
    async fn update_password(&self, id: &str, password_hash: &str) -> Result<(), RepositoryError>;
}

/// Runs [`UserRepository`] operations through one-shot dispatch.
///
/// Every operation returns after sending its first outcome.
#[derive(Clone)]
pub struct AccountStore {
    repository: Arc<dyn UserRepository>,
}

impl AccountStore {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }

    /// Saves a new account unless its email is already taken
    pub fn save(&self, user: User) -> Completion<(), Error> {
        let repository = Arc::clone(&self.repository);
        dispatch(async move {
            let count = repository.count_by_email(&user.email).await?;
            if count > 0 {
                return Err(Error::from(RepositoryError::AlreadyExists));
            }
            repository.insert(&user).await?;
            tracing::debug!(user_id = %user.id, "account saved");
            Ok(())
        })
    }

    /// Loads an account; a missing account is `RepositoryError::NotFound`
    pub fn find_by_email(&self, email: &str) -> Completion<User, Error> {
        let repository = Arc::clone(&self.repository);
        let email = email.to_owned();
        dispatch(async move {
            repository
                .find_by_email(&email)
                .await?
                .ok_or_else(|| Error::from(RepositoryError::NotFound))
        })
    }

    /// Persists the password hash currently held by `user`
    pub fn update_password(&self, user: &User) -> Completion<(), Error> {
        let repository = Arc::clone(&self.repository);
        let id = user.id.clone();
        let password_hash = user.password_hash.clone();
        dispatch(async move {
            repository.update_password(&id, &password_hash).await?;
            Ok(())
        })
    }
}

impl std::fmt::Debug for AccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStore").finish_non_exhaustive()
    }
}

/// Process-local [`UserRepository`], keyed by email.
///
/// Stands in for the relational store in tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts
    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no account is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn count_by_email(&self, email: &str) -> Result<u64, RepositoryError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(u64::from(users.contains_key(email)))
    }

    async fn insert(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.contains_key(&user.email) {
            return Err(RepositoryError::Backend(format!(
                "unique constraint violated for {}",
                user.email
            )));
        }
        users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(email).cloned())
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<(), RepositoryError> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let user = users
            .values_mut()
            .find(|user| user.id == id)
            .ok_or(RepositoryError::NotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Repository whose calls fail on demand and are counted
    #[derive(Default)]
    struct FlakyRepository {
        fail_count: bool,
        fail_insert: bool,
        existing: u64,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl UserRepository for FlakyRepository {
        async fn count_by_email(&self, _email: &str) -> Result<u64, RepositoryError> {
            if self.fail_count {
                return Err(RepositoryError::Backend("count query failed".into()));
            }
            Ok(self.existing)
        }

        async fn insert(&self, _user: &User) -> Result<(), RepositoryError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_insert {
                return Err(RepositoryError::Backend("insert failed".into()));
            }
            Ok(())
        }

        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, RepositoryError> {
            Ok(None)
        }

        async fn update_password(&self, _id: &str, _hash: &str) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    fn user() -> User {
        User::new("a@b.com", "Alice", "hash".to_string())
    }

    fn repository_error(err: Error) -> RepositoryError {
        match err {
            Error::Repository(err) => err,
            other => panic!("expected repository error, got {other:?}"),
        }
    }

    #[test]
    fn test_new_user_derives_nickname() {
        let user = user();
        assert_eq!(user.nickname, "a");
        assert_eq!(user.email, "a@b.com");
        assert!(uuid::Uuid::parse_str(&user.id).is_ok());
    }

    #[tokio::test]
    async fn test_save_stops_at_failed_count() {
        let repository = Arc::new(FlakyRepository {
            fail_count: true,
            ..Default::default()
        });
        let accounts = AccountStore::new(repository.clone());

        let err = accounts.save(user()).wait().await.unwrap_err();

        assert_eq!(
            repository_error(err),
            RepositoryError::Backend("count query failed".into())
        );
        assert_eq!(repository.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_save_rejects_existing_account() {
        let repository = Arc::new(FlakyRepository {
            existing: 1,
            ..Default::default()
        });
        let accounts = AccountStore::new(repository.clone());

        let err = accounts.save(user()).wait().await.unwrap_err();

        assert_eq!(repository_error(err), RepositoryError::AlreadyExists);
        assert_eq!(repository.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_save_reports_failed_insert() {
        let repository = Arc::new(FlakyRepository {
            fail_insert: true,
            ..Default::default()
        });
        let accounts = AccountStore::new(repository.clone());

        let err = accounts.save(user()).wait().await.unwrap_err();

        assert_eq!(
            repository_error(err),
            RepositoryError::Backend("insert failed".into())
        );
        assert_eq!(repository.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_save_find_and_update_in_memory() {
        let repository = Arc::new(InMemoryUserRepository::new());
        let accounts = AccountStore::new(repository.clone());

        let mut saved = user();
        accounts.save(saved.clone()).wait().await.unwrap();
        assert_eq!(repository.len(), 1);

        let err = accounts.save(user()).wait().await.unwrap_err();
        assert_eq!(repository_error(err), RepositoryError::AlreadyExists);

        saved.password_hash = "new-hash".to_string();
        accounts.update_password(&saved).wait().await.unwrap();

        let found = accounts.find_by_email("a@b.com").wait().await.unwrap();
        assert_eq!(found, saved);

        let err = accounts.find_by_email("nobody@b.com").wait().await.unwrap_err();
        assert_eq!(repository_error(err), RepositoryError::NotFound);
    }
}
