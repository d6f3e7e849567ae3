use axum::{
    extract::{FromRef, FromRequestParts},
    headers::{authorization::Bearer, Authorization},
    http::request::Parts,
    RequestPartsExt, TypedHeader,
};
use jsonwebtoken::TokenData;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::{Duration, OffsetDateTime};

use crate::error::{Error, UnauthorizedType};

use super::user::{UserCollection, UserRole};

/// Keys and validation settings for the external identity verifier's
/// bearer tokens. Process-lifetime, cloned into every handler state.
#[derive(Clone)]
pub struct JwtState {
    validation: jsonwebtoken::Validation,
    header: jsonwebtoken::Header,

    encoding_key: jsonwebtoken::EncodingKey,
    decoding_key: jsonwebtoken::DecodingKey,
}

impl JwtState {
    pub fn new(secret: &[u8]) -> Self {
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = false;

        Self {
            header,
            validation,

            encoding_key: jsonwebtoken::EncodingKey::from_secret(secret),
            decoding_key: jsonwebtoken::DecodingKey::from_secret(secret),
        }
    }

}

pub fn current_timestamp() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AccessClaims {
    pub email: String,
    pub exp: i64,
}

impl AccessClaims {
    pub fn is_expired(&self) -> bool {
        self.exp < current_timestamp().unix_timestamp()
    }
}

pub fn generate_access_token(jwt_state: &JwtState, email: &str) -> Result<String, Error> {
    let expired_at = current_timestamp() + Duration::hours(1);
    generate_access_token_with_exp(jwt_state, email, expired_at.unix_timestamp())
}

pub fn generate_access_token_with_exp(
    jwt_state: &JwtState,
    email: &str,
    exp: i64,
) -> Result<String, Error> {
    jsonwebtoken::encode(
        &jwt_state.header,
        &AccessClaims {
            email: email.to_string(),
            exp,
        },
        &jwt_state.encoding_key,
    )
    .map_err(|_| Error::Unauthorized(UnauthorizedType::InvalidToken))
}

pub fn decode_access_token(
    jwt_state: &JwtState,
    token: &str,
) -> Result<TokenData<AccessClaims>, Error> {
    jsonwebtoken::decode(token, &jwt_state.decoding_key, &jwt_state.validation)
        .map_err(|_| Error::Unauthorized(UnauthorizedType::InvalidToken))
}

/// The principal's email as vouched for by the identity verifier.
#[derive(Debug, Clone)]
pub struct VerifiedEmail(pub String);

impl VerifiedEmail {
    pub fn from_token(jwt_state: &JwtState, token: &str) -> Result<Self, Error> {
        let token = decode_access_token(jwt_state, token)?;

        if token.claims.is_expired() {
            return Err(Error::Unauthorized(UnauthorizedType::InvalidToken));
        }

        Ok(Self(token.claims.email))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for VerifiedEmail
where
    JwtState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(token)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| Error::Unauthorized(UnauthorizedType::MissingToken))?;

        let jwt = JwtState::from_ref(state);

        Self::from_token(&jwt, token.token())
    }
}

/// Verified principal whose user record carries the Admin role.
/// Composes on top of [`VerifiedEmail`]; non-admins get `Forbidden`.
#[derive(Debug, Clone)]
pub struct AdminAccess {
    pub email: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminAccess
where
    JwtState: FromRef<S>,
    UserCollection: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let VerifiedEmail(email) = parts.extract_with_state::<VerifiedEmail, _>(state).await?;

        let users = UserCollection::from_ref(state);
        let user = users
            .find_one(
                bson::doc! {
                    "email": &email
                },
                None,
            )
            .await?;

        match user {
            Some(user) if matches!(user.role, UserRole::Admin) => Ok(Self { email }),
            _ => Err(Error::Forbidden)
                .tap_err(|_| tracing::debug!("non-admin tried a gated operation")),
        }
    }
}
