use std::ops::{Deref, DerefMut};

use log::{info, warn};
use mongodb::bson::doc;
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::credentials::AdminCredentials, common::password::verify_password, mongodb::Coll,
    mongodb::Id,
};

/// Core admin user data.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCore {
    pub username: String,
    pub password_hash: String,
}

impl AdminCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        verify_password(&self.password_hash, password)
    }
}

/// An admin without an ID.
pub type NewAdmin = AdminCore;

/// An admin user from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Admin {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub admin: AdminCore,
}

impl Deref for Admin {
    type Target = AdminCore;

    fn deref(&self) -> &Self::Target {
        &self.admin
    }
}

impl DerefMut for Admin {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.admin
    }
}

/// Ensure that at least one admin exists, creating one from the given
/// credentials if not.
pub async fn ensure_admin_exists(admins: &Coll<NewAdmin>, default: AdminCredentials) -> Result<()> {
    let count = admins.count_documents(None, None).await?;
    if count > 0 {
        return Ok(());
    }

    let username = default.username.clone();
    let admin: NewAdmin = default.try_into().map_err(|_| {
        Error::Status(
            Status::InternalServerError,
            "Default admin credentials are not acceptable".to_string(),
        )
    })?;
    admins.insert_one(admin, None).await?;
    info!("Created default admin {username}");
    warn!("Change the default admin password before going live");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_password_verifies() {
        let admin = AdminCore::example();
        assert!(admin.verify_password(AdminCredentials::example().password));
        assert!(!admin.verify_password("wrong password"));
    }

    #[backend_test]
    async fn default_admin_created_once(admins: Coll<NewAdmin>) {
        ensure_admin_exists(&admins, AdminCredentials::example())
            .await
            .unwrap();
        ensure_admin_exists(&admins, AdminCredentials::example())
            .await
            .unwrap();
        assert_eq!(admins.count_documents(None, None).await.unwrap(), 1);
        let admin = admins
            .find_one(doc! { "username": AdminCredentials::example().username }, None)
            .await
            .unwrap()
            .unwrap();
        assert!(admin.verify_password(AdminCredentials::example().password));
    }

    #[backend_test]
    async fn unacceptable_default_admin_is_rejected(admins: Coll<NewAdmin>) {
        let result = ensure_admin_exists(&admins, AdminCredentials::empty()).await;
        assert!(matches!(
            result,
            Err(Error::Status(status, _)) if status == Status::InternalServerError
        ));
        assert_eq!(admins.count_documents(None, None).await.unwrap(), 0);
    }
}
