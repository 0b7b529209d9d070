use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use log::{debug, error};
use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder, Request};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// A `404` for the named resource.
    pub fn not_found(what: impl AsRef<str>) -> Self {
        Self::Status(Status::NotFound, format!("{} not found", what.as_ref()))
    }

    /// The status code this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Self::Status(status, _) => *status,
            Self::Db(_) | Self::Argon2(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{} {}: {self}", req.method(), req.uri());
        } else {
            debug!("{} {}: {self}", req.method(), req.uri());
        }
        Err(status)
    }
}

/// Reasons a vote cannot be recorded.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("This poll does not allow voting.")]
    VotingClosed,
    #[error("Please select a choice before submitting your vote.")]
    NoSuchChoice,
    #[error(transparent)]
    Internal(#[from] Error),
}

impl From<DbError> for VoteError {
    fn from(err: DbError) -> Self {
        Self::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            Error::not_found("Question 4").status(),
            Status::NotFound
        );
        assert_eq!(Error::not_found("Question 4").to_string(), "Question 4 not found");
        assert_eq!(
            Error::Status(Status::BadRequest, "nope".to_string()).status(),
            Status::BadRequest
        );
    }

    #[test]
    fn expired_jwt_is_unauthorized() {
        let err: JwtError = JwtErrorKind::ExpiredSignature.into();
        assert_eq!(Error::from(err).status(), Status::Unauthorized);

        let err: JwtError = JwtErrorKind::InvalidToken.into();
        assert_eq!(Error::from(err).status(), Status::BadRequest);
    }
}
