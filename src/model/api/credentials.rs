use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    common::password::{hash_password, MIN_PASSWORD_LENGTH},
    db::{admin::NewAdmin, user::NewUser},
};

pub const MAX_USERNAME_LENGTH: usize = 150;

/// Why a set of credentials cannot become an account.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error(
        "Usernames must be 1 to {} letters, digits or @/./+/-/_ characters.",
        MAX_USERNAME_LENGTH
    )]
    BadUsername,
    #[error("Passwords must be at least {} characters.", MIN_PASSWORD_LENGTH)]
    ShortPassword,
    #[error("The two password fields didn't match.")]
    PasswordMismatch,
    #[error(transparent)]
    Hash(#[from] argon2::Error),
}

/// Check a prospective username and password, returning the password hash.
fn validate_and_hash(username: &str, password: &str) -> Result<String, CredentialsError> {
    let username_ok = (1..=MAX_USERNAME_LENGTH).contains(&username.chars().count())
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || "@.+-_".contains(c));
    if !username_ok {
        return Err(CredentialsError::BadUsername);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CredentialsError::ShortPassword);
    }
    Ok(hash_password(password)?)
}

/// Raw admin credentials, received from a user. These are never stored directly,
/// since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl TryFrom<AdminCredentials> for NewAdmin {
    type Error = CredentialsError;

    /// Convert [`AdminCredentials`] to a new admin by hashing the password.
    fn try_from(cred: AdminCredentials) -> Result<Self, Self::Error> {
        let password_hash = validate_and_hash(&cred.username, &cred.password)?;
        Ok(Self {
            username: cred.username,
            password_hash,
        })
    }
}

/// Site user login credentials, submitted as a form.
#[derive(Clone, FromForm, Deserialize, Serialize)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

impl TryFrom<UserCredentials> for NewUser {
    type Error = CredentialsError;

    fn try_from(cred: UserCredentials) -> Result<Self, Self::Error> {
        let password_hash = validate_and_hash(&cred.username, &cred.password)?;
        Ok(Self {
            username: cred.username,
            password_hash,
            date_joined: Utc::now(),
        })
    }
}

/// The signup form: a username plus the password entered twice.
#[derive(Clone, FromForm, Deserialize, Serialize)]
pub struct SignupForm {
    pub username: String,
    pub password1: String,
    pub password2: String,
}

impl SignupForm {
    pub fn into_credentials(self) -> Result<UserCredentials, CredentialsError> {
        if self.password1 != self.password2 {
            return Err(CredentialsError::PasswordMismatch);
        }
        Ok(UserCredentials {
            username: self.username,
            password: self.password1,
        })
    }
}
