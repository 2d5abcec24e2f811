//! Conversions from external infrastructure errors into domain errors.

use orderlink_domain::OrderLinkError;
use r2d2::Error as PoolError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use serde_json::Error as JsonError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub OrderLinkError);

impl From<InfraError> for OrderLinkError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<OrderLinkError> for InfraError {
    fn from(value: OrderLinkError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoOrderLinkError {
    fn into_orderlink(self) -> OrderLinkError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → OrderLinkError */
/* -------------------------------------------------------------------------- */

impl IntoOrderLinkError for SqlError {
    fn into_orderlink(self) -> OrderLinkError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        OrderLinkError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        OrderLinkError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        OrderLinkError::Database(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        OrderLinkError::Database("foreign key constraint violation".into())
                    }
                    _ => OrderLinkError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => OrderLinkError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                OrderLinkError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                OrderLinkError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                OrderLinkError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidPath(path) => OrderLinkError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => OrderLinkError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_orderlink())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → OrderLinkError */
/* -------------------------------------------------------------------------- */

impl IntoOrderLinkError for PoolError {
    fn into_orderlink(self) -> OrderLinkError {
        OrderLinkError::Database(format!("connection pool unavailable: {self}"))
    }
}

impl From<PoolError> for InfraError {
    fn from(value: PoolError) -> Self {
        InfraError(value.into_orderlink())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → OrderLinkError */
/* -------------------------------------------------------------------------- */

impl IntoOrderLinkError for JsonError {
    fn into_orderlink(self) -> OrderLinkError {
        OrderLinkError::Internal(format!("stored JSON is invalid: {self}"))
    }
}

impl From<JsonError> for InfraError {
    fn from(value: JsonError) -> Self {
        InfraError(value.into_orderlink())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → OrderLinkError */
/* -------------------------------------------------------------------------- */

impl IntoOrderLinkError for HttpError {
    fn into_orderlink(self) -> OrderLinkError {
        if self.is_timeout() {
            return OrderLinkError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return OrderLinkError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => OrderLinkError::Unauthorized(message),
                404 => OrderLinkError::NotFound(message),
                429 => OrderLinkError::RateLimited(message),
                400..=499 => OrderLinkError::InvalidInput(message),
                _ => OrderLinkError::Network(message),
            };
        }

        if self.is_decode() {
            return OrderLinkError::Internal(format!("invalid response body: {self}"));
        }

        OrderLinkError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_orderlink())
    }
}

/// Shorthand for `OrderLinkError::from(InfraError::from(err))`.
pub(crate) fn to_domain<E>(err: E) -> OrderLinkError
where
    InfraError: From<E>,
{
    InfraError::from(err).into()
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
