use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("No resource found")]
    NoResource,

    #[error("{0}")]
    DatabaseError(#[from] mongodb::error::Error),

    #[error("{0}")]
    UpstreamError(#[from] stripe::StripeError),

    #[error("{0}")]
    Unauthorized(UnauthorizedType),

    #[error("forbidden access")]
    Forbidden,
}

#[derive(Debug, thiserror::Error)]
pub enum UnauthorizedType {
    #[error("Missing authorization token")]
    MissingToken,

    #[error("Invalid access token")]
    InvalidToken,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<serde_json::Value>,
    r#type: String,
    message: String,
}

impl From<Error> for ErrorJson {
    fn from(err: Error) -> Self {
        let message = err.to_string();

        let r#type = err.to_string_variant();

        let errors = match err {
            Error::ValidationError(err) => serde_json::to_value(err).ok(),
            Error::NoResource
            | Error::DatabaseError(..)
            | Error::UpstreamError(..)
            | Error::Unauthorized(..)
            | Error::Forbidden => None,
        };

        Self {
            errors,
            message,
            r#type,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("error: {:?}", self);
        let status = match self {
            Self::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            Self::ValidationError(..) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NoResource => StatusCode::NOT_FOUND,
            Self::DatabaseError(..) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamError(..) => StatusCode::BAD_GATEWAY,
        };

        let error = ErrorJson::from(self);

        (status, Json(error)).into_response()
    }
}

impl Error {
    pub fn to_string_variant(&self) -> String {
        macro_rules! match_var {
            ($id:ident !) => {
                Self::$id
            };
            ($id:ident (..)) => {
                Self::$id(..)
            };
        }

        macro_rules! variant {
            ($($name:ident $tt:tt),+) => {
                match self {
                    $(
                        match_var!($name $tt) => {
                            stringify!($name)
                       }
                    )+
                }
            };
        }

        variant! {
            ValidationError(..),
            NoResource!,
            DatabaseError(..),
            UpstreamError(..),
            Unauthorized(..),
            Forbidden!
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names_are_stable() {
        assert_eq!(Error::Forbidden.to_string_variant(), "Forbidden");
        assert_eq!(
            Error::Unauthorized(UnauthorizedType::InvalidToken).to_string_variant(),
            "Unauthorized"
        );
        assert_eq!(Error::NoResource.to_string_variant(), "NoResource");
    }

    #[test]
    fn forbidden_body_has_message() {
        let json = ErrorJson::from(Error::Forbidden);
        let value = serde_json::to_value(json).unwrap();
        assert_eq!(value["message"], "forbidden access");
        assert_eq!(value["type"], "Forbidden");
        assert!(value.get("errors").is_none());
    }
}
