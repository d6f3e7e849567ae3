use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    error::Error,
    mongo_ext::Collection,
    util::{FormattedDateTime, ObjectIdString, UpdateSummary},
};

use super::auth::{AdminAccess, VerifiedEmail};

#[derive(Clone)]
pub struct UserCollection(pub Collection<UserModel>);

impl std::ops::Deref for UserCollection {
    type Target = Collection<UserModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub email: String,
    pub display_name: String,
    pub role: UserRole,

    pub created_at: bson::DateTime,
}

/// Role strings as stored: `"User"`, `"Admin"` and lowercase `"rider"`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UserRole {
    #[default]
    User,
    Admin,
    #[serde(rename = "rider")]
    Rider,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Admin => "Admin",
            Self::Rider => "rider",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: ObjectIdString,

    pub email: String,
    pub display_name: String,
    pub role: UserRole,

    pub created_at: FormattedDateTime,
}

impl From<UserModel> for UserResponse {
    fn from(value: UserModel) -> Self {
        Self {
            id: value.id.into(),
            email: value.email,
            display_name: value.display_name,
            role: value.role,

            created_at: value.created_at.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IndexQuery {
    pub search_text: Option<String>,
}

pub(crate) fn search_filter(search_text: Option<&str>) -> bson::Document {
    match search_text {
        Some(text) if !text.is_empty() => bson::doc! {
            "$or": [
                { "displayName": { "$regex": text, "$options": "i" } },
                { "email": { "$regex": text, "$options": "i" } },
            ]
        },
        _ => bson::doc! {},
    }
}

pub async fn index(
    _caller: VerifiedEmail,
    State(users): State<UserCollection>,
    Query(query): Query<IndexQuery>,
) -> Result<Json<Vec<UserResponse>>, Error> {
    let mut cursor = users
        .find(search_filter(query.search_text.as_deref()), None)
        .await?;

    let mut out = vec![];

    while cursor.advance().await? {
        let user = cursor.deserialize_current()?;

        out.push(user.into());
    }

    Ok(Json(out))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 124))]
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterResponse {
    pub created: bool,
    pub user: UserResponse,
}

/// Idempotent first-registration call: an already-known email is a plain
/// lookup and `created` comes back false.
pub async fn register(
    State(users): State<UserCollection>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, Error> {
    request.validate()?;

    let existing = users
        .find_one(
            bson::doc! {
                "email": &request.email
            },
            None,
        )
        .await?;

    if let Some(existing) = existing {
        return Ok(Json(RegisterResponse {
            created: false,
            user: existing.into(),
        }));
    }

    let model = UserModel {
        id: ObjectId::new(),
        email: request.email,
        display_name: request.display_name,
        role: UserRole::User,
        created_at: OffsetDateTime::now_utc().into(),
    };
    users.insert_one(&model, None).await?;

    Ok(Json(RegisterResponse {
        created: true,
        user: model.into(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

#[tracing::instrument(skip_all, fields(id = %user_id))]
pub async fn update_role(
    _admin: AdminAccess,
    State(users): State<UserCollection>,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<UpdateSummary>, Error> {
    let user_id = ObjectId::from_str(&user_id).map_err(|_| Error::NoResource)?;

    let result = users
        .update_one(
            bson::doc! {
                "_id": user_id
            },
            bson::doc! {
                "$set": {
                    "role": request.role.as_str()
                }
            },
            None,
        )
        .await?;

    Ok(Json(result.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoleResponse {
    pub role: UserRole,
}

/// Role lookup by email; unknown emails read as plain users.
pub async fn role_of(
    State(users): State<UserCollection>,
    Path(email): Path<String>,
) -> Result<Json<RoleResponse>, Error> {
    let user = users
        .find_one(
            bson::doc! {
                "email": &email
            },
            None,
        )
        .await?;

    Ok(Json(RoleResponse {
        role: user.map(|user| user.role).unwrap_or_default(),
    }))
}
