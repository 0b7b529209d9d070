use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    common::password::verify_password,
    mongodb::{Coll, Id},
};

/// Core site user data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCore {
    pub username: String,
    pub password_hash: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date_joined: DateTime<Utc>,
}

impl UserCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        verify_password(&self.password_hash, password)
    }
}

/// A user without an ID.
pub type NewUser = UserCore;

/// A user from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl User {
    /// Find the user with the given username whose password matches.
    pub async fn authenticate(
        users: &Coll<User>,
        username: &str,
        password: &str,
    ) -> Result<Option<User>> {
        let user = users
            .find_one(doc! { "username": username }, None)
            .await?
            .filter(|user| user.verify_password(password));
        Ok(user)
    }
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use crate::model::api::credentials::UserCredentials;

    impl UserCore {
        pub fn example() -> Self {
            UserCredentials::example().try_into().unwrap()
        }

        pub fn example2() -> Self {
            UserCredentials::example2().try_into().unwrap()
        }
    }
}
