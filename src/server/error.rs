use crate::common::protocol::{ErrorKind, ServerMessage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    /// Stato che la logica di transizione dichiara impossibile
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("database error: {0}")]
    Internal(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unauthorized => ErrorKind::Unauthorized,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::InvariantViolation(_)
            | ServiceError::Internal(_)
            | ServiceError::PasswordHash(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    /// Messaggio per il client. Gli errori interni non escono dal server.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    pub fn into_message(self) -> ServerMessage {
        ServerMessage::Error {
            kind: self.kind(),
            code: self.status_code(),
            message: self.public_message(),
        }
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_details() {
        let err = ServiceError::Internal(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "Internal server error");

        let err = ServiceError::InvariantViolation("no successor".into());
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn each_domain_error_has_its_own_code() {
        let codes: Vec<u16> = [
            ServiceError::Validation("x".into()),
            ServiceError::Unauthorized,
            ServiceError::Forbidden("x".into()),
            ServiceError::NotFound("x".into()),
            ServiceError::Conflict("x".into()),
        ]
        .iter()
        .map(|e| e.status_code())
        .collect();
        assert_eq!(codes, vec![400, 401, 403, 404, 409]);
    }

    #[test]
    fn error_message_keeps_domain_text() {
        let msg = ServiceError::Conflict("You are already a member of this group".into()).into_message();
        assert_eq!(
            msg,
            ServerMessage::Error {
                kind: ErrorKind::Conflict,
                code: 409,
                message: "You are already a member of this group".into(),
            }
        );
    }
}
