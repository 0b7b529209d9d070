use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::mongodb::{Coll, Id, MongoCollection};

use super::user::{Account, Rights};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific account with specific rights.
#[derive(Serialize, Deserialize)]
pub struct AuthToken<U> {
    pub id: Id,
    #[serde(rename = "rgt")]
    pub rights: Rights,
    #[serde(skip)]
    phantom: PhantomData<U>,
}

impl<U> AuthToken<U> {
    /// Does this token permit the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights == target
    }
}

impl<U> AuthToken<U>
where
    U: Account,
{
    /// Create a new [`AuthToken`] for the given account, with the correct rights for that type.
    pub fn new(account: &U) -> Self {
        Self {
            id: account.id(),
            rights: U::RIGHTS,
            phantom: PhantomData,
        }
    }

    #[allow(clippy::missing_panics_doc)]
    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .finish()
    }

    /// Deserialize a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<U>>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<U> {
    #[serde(flatten, bound = "")]
    token: AuthToken<U>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r, U> FromRequest<'r> for AuthToken<U>
where
    U: Account + MongoCollection + DeserializeOwned + Unpin + Send + Sync,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie and verify that it has the correct rights for this
    /// account type, and that the account still exists.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        // Forward to any routes that do not require an authentication token.
        let cookie = try_outcome!(req.cookies().get(AUTH_TOKEN_COOKIE).or_forward(()));

        // Decode the token.
        let token: Self = try_outcome!(Self::from_cookie(cookie, config).or_forward(()));

        // Check it represents the correct rights.
        if !token.permits(U::RIGHTS) {
            return Outcome::Forward(());
        }

        // Check the account actually exists.
        let db = req.guard::<&State<mongodb::Database>>().await.unwrap();
        match Coll::<U>::from_db(db).find_one(token.id.as_doc(), None).await {
            Ok(Some(_)) => Outcome::Success(token),
            Ok(None) => Outcome::Forward(()),
            Err(e) => Outcome::Failure((Status::InternalServerError, e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration as ChronoDuration;

    use crate::model::db::{admin::Admin, user::User};

    fn config() -> Config {
        Config::example()
    }

    #[test]
    fn token_round_trips_through_cookie() {
        let id = Id::new();
        let token = AuthToken::<User> {
            id,
            rights: Rights::User,
            phantom: PhantomData,
        };
        let cookie = token.into_cookie(&config());
        assert_eq!(cookie.name(), AUTH_TOKEN_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));

        let decoded = AuthToken::<User>::from_cookie(&cookie, &config()).unwrap();
        assert_eq!(decoded.id, id);
        assert!(decoded.permits(Rights::User));
        assert!(!decoded.permits(Rights::Admin));
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let token = AuthToken::<Admin> {
            id: Id::new(),
            rights: Rights::Admin,
            phantom: PhantomData,
        };
        let cookie = token.into_cookie(&config());
        let other = Config::example_with_secret("a different secret");
        assert!(AuthToken::<Admin>::from_cookie(&cookie, &other).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims::<User> {
            token: AuthToken {
                id: Id::new(),
                rights: Rights::User,
                phantom: PhantomData,
            },
            expire_at: Utc::now() - ChronoDuration::hours(1),
        };
        let encoded = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config().jwt_secret()),
        )
        .unwrap();
        let cookie = Cookie::new(AUTH_TOKEN_COOKIE, encoded);
        let result = AuthToken::<User>::from_cookie(&cookie, &config());
        assert_eq!(result.err().map(|e| e.status()), Some(Status::Unauthorized));
    }
}
