//! Registration and password-reset workflows.
//!
//! Both flows start with [`AccountService::send_verification_code`] and
//! finish by consuming the code. All input checks run before the code is
//! consumed, so a rejected request leaves the code usable.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::{CredentialError, Result, ValidationError, ValidationKind};
use crate::repository::{AccountStore, User};
use crate::verification::{is_well_formed, CodeIntent, Verifier};

/// Minimum accepted password length, in characters
pub const MIN_PASSWORD_LENGTH: usize = 6;

static MAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,4}$").expect("email pattern is valid")
});

/// Turns a plaintext password into its stored form.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> std::result::Result<String, CredentialError>;
}

fn check_email(email: &str) -> std::result::Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::new("email", ValidationKind::EmailEmpty));
    }
    if !MAIL_REGEX.is_match(email) {
        return Err(ValidationError::new("email", ValidationKind::EmailInvalid));
    }
    Ok(())
}

fn check_code(code: &str) -> std::result::Result<(), ValidationError> {
    if !is_well_formed(code) {
        return Err(ValidationError::invalid_code());
    }
    Ok(())
}

fn check_password(field: &'static str, password: &str) -> std::result::Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::new(field, ValidationKind::PasswordEmpty));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::new(field, ValidationKind::PasswordTooShort));
    }
    Ok(())
}

/// Account workflows backed by verification codes
#[derive(Clone)]
pub struct AccountService {
    verifier: Verifier,
    accounts: AccountStore,
    hasher: Arc<dyn CredentialHasher>,
}

impl AccountService {
    pub fn new(verifier: Verifier, accounts: AccountStore, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            verifier,
            accounts,
            hasher,
        }
    }

    /// Issues a code for `email` and returns it for delivery
    ///
    /// The code itself is never logged.
    pub async fn send_verification_code(&self, email: &str, intent: CodeIntent) -> Result<String> {
        check_email(email)?;
        self.verifier.issue(email, intent).await
    }

    /// Creates the account a registration code was issued for
    pub async fn register(&self, code: &str, name: &str, password: &str) -> Result<User> {
        check_code(code)?;
        if name.is_empty() {
            return Err(ValidationError::new("name", ValidationKind::NameEmpty).into());
        }
        check_password("password", password)?;

        let record = self
            .verifier
            .consume_for(code, CodeIntent::Registration)
            .await?;

        let user = User::new(&record.identity, name, self.hasher.hash(password)?);
        self.accounts.save(user.clone()).wait().await?;

        tracing::info!(user_id = %user.id, "account registered");
        Ok(user)
    }

    /// Sets a new password for the account a reset code was issued for
    pub async fn reset_password(&self, code: &str, new_password: &str, confirm_password: &str) -> Result<()> {
        check_code(code)?;
        check_password("new password", new_password)?;
        check_password("new confirm password", confirm_password)?;
        if new_password != confirm_password {
            return Err(ValidationError::new("password", ValidationKind::PasswordMismatch).into());
        }

        let record = self
            .verifier
            .consume_for(code, CodeIntent::ResetPassword)
            .await?;

        let mut user = self.accounts.find_by_email(&record.identity).wait().await?;
        user.password_hash = self.hasher.hash(new_password)?;
        self.accounts.update_password(&user).wait().await?;

        tracing::info!(user_id = %user.id, "password reset");
        Ok(())
    }
}

impl std::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountService").finish_non_exhaustive()
    }
}
