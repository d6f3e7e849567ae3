use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    error::Error,
    mongo_ext::Collection,
    util::{FormattedDateTime, ObjectIdString, UpdateSummary},
};

use super::{
    auth::AdminAccess,
    user::{UserCollection, UserRole},
};

#[derive(Clone)]
pub struct RiderCollection(pub Collection<RiderModel>);

impl std::ops::Deref for RiderCollection {
    type Target = Collection<RiderModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiderModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub name: String,
    pub email: String,
    pub phone: String,
    pub region: String,
    pub district: String,
    pub bike_registration: String,

    pub status: RiderStatus,
    pub work_status: WorkStatus,

    pub created_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiderStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RiderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Workload strings as stored: capitalised `"Available"`, snake
/// `"in_delivery"`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkStatus {
    #[default]
    Available,
    #[serde(rename = "in_delivery")]
    InDelivery,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::InDelivery => "in_delivery",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RiderResponse {
    pub id: ObjectIdString,

    pub name: String,
    pub email: String,
    pub phone: String,
    pub region: String,
    pub district: String,
    pub bike_registration: String,

    pub status: RiderStatus,
    pub work_status: WorkStatus,

    pub created_at: FormattedDateTime,
}

impl From<RiderModel> for RiderResponse {
    fn from(value: RiderModel) -> Self {
        Self {
            id: value.id.into(),
            name: value.name,
            email: value.email,
            phone: value.phone,
            region: value.region,
            district: value.district,
            bike_registration: value.bike_registration,

            status: value.status,
            work_status: value.work_status,

            created_at: value.created_at.into(),
        }
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    #[validate(length(min = 1, max = 124))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 32))]
    pub phone: String,

    #[validate(length(min = 1, max = 124))]
    pub region: String,

    #[validate(length(min = 1, max = 124))]
    pub district: String,

    #[validate(length(min = 1, max = 64))]
    pub bike_registration: String,
}

/// Rider application; every application starts out pending review.
pub async fn apply(
    State(riders): State<RiderCollection>,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<RiderResponse>, Error> {
    request.validate()?;

    let model = RiderModel {
        id: ObjectId::new(),
        name: request.name,
        email: request.email,
        phone: request.phone,
        region: request.region,
        district: request.district,
        bike_registration: request.bike_registration,

        status: RiderStatus::Pending,
        work_status: WorkStatus::Available,

        created_at: OffsetDateTime::now_utc().into(),
    };
    riders.insert_one(&model, None).await?;

    Ok(Json(model.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IndexQuery {
    pub status: Option<RiderStatus>,
    pub district: Option<String>,
    pub work_status: Option<WorkStatus>,
}

pub(crate) fn rider_filter(query: &IndexQuery) -> bson::Document {
    let mut filter = bson::doc! {};

    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    if let Some(district) = query.district.as_deref() {
        filter.insert("district", district);
    }
    if let Some(work_status) = query.work_status {
        filter.insert("workStatus", work_status.as_str());
    }

    filter
}

pub async fn index(
    State(riders): State<RiderCollection>,
    Query(query): Query<IndexQuery>,
) -> Result<Json<Vec<RiderResponse>>, Error> {
    let mut cursor = riders.find(rider_filter(&query), None).await?;

    let mut out = vec![];

    while cursor.advance().await? {
        let rider = cursor.deserialize_current()?;

        out.push(rider.into());
    }

    Ok(Json(out))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SetStatusRequest {
    pub status: RiderStatus,
    pub email: String,
}

/// Admin-gated status transition. Approval also promotes the user record
/// sharing the rider's email to the rider role; the two writes are
/// independent, with no rollback if the second fails.
#[tracing::instrument(skip_all, fields(id = %rider_id))]
pub async fn set_status(
    _admin: AdminAccess,
    State(riders): State<RiderCollection>,
    State(users): State<UserCollection>,
    Path(rider_id): Path<String>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<UpdateSummary>, Error> {
    let rider_id = ObjectId::from_str(&rider_id).map_err(|_| Error::NoResource)?;

    let result = riders
        .update_one(
            bson::doc! {
                "_id": rider_id
            },
            bson::doc! {
                "$set": {
                    "status": request.status.as_str(),
                    "workStatus": WorkStatus::Available.as_str(),
                }
            },
            None,
        )
        .await?;

    if matches!(request.status, RiderStatus::Approved) {
        let user_result = users
            .update_one(
                bson::doc! {
                    "email": &request.email
                },
                bson::doc! {
                    "$set": {
                        "role": UserRole::Rider.as_str()
                    }
                },
                None,
            )
            .await
            .tap_err(|_| tracing::debug!("rider approved but user promotion failed"))?;

        tracing::debug!("promoted {} user record(s) to rider", user_result.modified_count);
    }

    Ok(Json(result.into()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::{extract::Path, Json};

    use crate::api::{
        tests::bootstrap,
        user::{RegisterRequest, UserRole},
    };

    use super::*;

    fn application(email: &str, district: &str) -> ApplyRequest {
        ApplyRequest {
            name: "Rider".to_string(),
            email: email.to_string(),
            phone: "01700000000".to_string(),
            region: "Dhaka".to_string(),
            district: district.to_string(),
            bike_registration: "DHK-1234".to_string(),
        }
    }

    #[test]
    fn status_wire_strings() {
        for status in [
            RiderStatus::Pending,
            RiderStatus::Approved,
            RiderStatus::Rejected,
        ] {
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::json!(status.as_str())
            );
        }

        for status in [WorkStatus::Available, WorkStatus::InDelivery] {
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::json!(status.as_str())
            );
        }
    }

    #[test]
    fn filter_combines_given_fields() {
        let query = IndexQuery {
            status: Some(RiderStatus::Pending),
            district: None,
            work_status: None,
        };
        assert_eq!(rider_filter(&query), bson::doc! { "status": "pending" });

        let query = IndexQuery {
            status: Some(RiderStatus::Approved),
            district: Some("Bogra".to_string()),
            work_status: Some(WorkStatus::Available),
        };
        assert_eq!(
            rider_filter(&query),
            bson::doc! {
                "status": "approved",
                "district": "Bogra",
                "workStatus": "Available",
            }
        );

        let query = IndexQuery {
            status: None,
            district: None,
            work_status: None,
        };
        assert_eq!(rider_filter(&query), bson::doc! {});
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB"]
    async fn test_approval_promotes_user() {
        let bootstrap = bootstrap().await;

        let _ = crate::api::user::register(
            bootstrap.users(),
            Json(RegisterRequest {
                email: "rider@example.com".to_string(),
                display_name: "Rider".to_string(),
            }),
        )
        .await
        .unwrap();

        let Json(rider) = super::apply(
            bootstrap.riders(),
            Json(application("rider@example.com", "Bogra")),
        )
        .await
        .unwrap();
        assert_matches!(rider.status, RiderStatus::Pending);

        let Json(result) = super::set_status(
            bootstrap.admin("admin@example.com"),
            bootstrap.riders(),
            bootstrap.users(),
            Path(rider.id.to_string()),
            Json(SetStatusRequest {
                status: RiderStatus::Approved,
                email: "rider@example.com".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(result.modified_count, 1);

        let model = bootstrap
            .app_state
            .rider_collection
            .get_one_by_id(*rider.id)
            .await
            .unwrap()
            .unwrap();
        assert_matches!(model.status, RiderStatus::Approved);
        assert_matches!(model.work_status, WorkStatus::Available);

        let user = bootstrap
            .app_state
            .user_collection
            .find_one(bson::doc! { "email": "rider@example.com" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_matches!(user.role, UserRole::Rider);
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB"]
    async fn test_rejection_leaves_user_untouched() {
        let bootstrap = bootstrap().await;

        let _ = crate::api::user::register(
            bootstrap.users(),
            Json(RegisterRequest {
                email: "rider@example.com".to_string(),
                display_name: "Rider".to_string(),
            }),
        )
        .await
        .unwrap();

        let Json(rider) = super::apply(
            bootstrap.riders(),
            Json(application("rider@example.com", "Bogra")),
        )
        .await
        .unwrap();

        let _ = super::set_status(
            bootstrap.admin("admin@example.com"),
            bootstrap.riders(),
            bootstrap.users(),
            Path(rider.id.to_string()),
            Json(SetStatusRequest {
                status: RiderStatus::Rejected,
                email: "rider@example.com".to_string(),
            }),
        )
        .await
        .unwrap();

        let user = bootstrap
            .app_state
            .user_collection
            .find_one(bson::doc! { "email": "rider@example.com" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_matches!(user.role, UserRole::User);
    }
}
