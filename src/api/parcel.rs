use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use bson::oid::ObjectId;
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    error::Error,
    mongo_ext::Collection,
    util::{DeleteSummary, FormattedDateTime, ObjectIdString, UpdateSummary},
};

use super::rider::{RiderCollection, WorkStatus};

#[derive(Clone)]
pub struct ParcelCollection(pub Collection<ParcelModel>);

impl std::ops::Deref for ParcelCollection {
    type Target = Collection<ParcelModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParcelModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub parcel_name: String,
    pub cost: i64,

    pub sender_email: String,
    pub receiver_name: String,
    pub receiver_address: String,

    pub delivery_status: DeliveryStatus,
    pub payment_status: PaymentStatus,

    #[serde(default)]
    pub rider_id: Option<ObjectId>,
    #[serde(default)]
    pub rider_name: Option<String>,
    #[serde(default)]
    pub rider_email: Option<String>,

    /// Minted on successful payment, null until then.
    #[serde(default)]
    pub tracking_id: Option<String>,

    pub created_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryStatus {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "pending-pickup")]
    PendingPickup,
    #[serde(rename = "driver_assigned")]
    DriverAssigned,
    #[serde(rename = "in_transit")]
    InTransit,
    #[serde(rename = "delivered")]
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingPickup => "pending-pickup",
            Self::DriverAssigned => "driver_assigned",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ParcelResponse {
    pub id: ObjectIdString,

    pub parcel_name: String,
    pub cost: i64,

    pub sender_email: String,
    pub receiver_name: String,
    pub receiver_address: String,

    pub delivery_status: DeliveryStatus,
    pub payment_status: PaymentStatus,

    pub rider_id: Option<ObjectIdString>,
    pub rider_name: Option<String>,
    pub rider_email: Option<String>,

    pub tracking_id: Option<String>,

    pub created_at: FormattedDateTime,
}

impl From<ParcelModel> for ParcelResponse {
    fn from(value: ParcelModel) -> Self {
        Self {
            id: value.id.into(),
            parcel_name: value.parcel_name,
            cost: value.cost,

            sender_email: value.sender_email,
            receiver_name: value.receiver_name,
            receiver_address: value.receiver_address,

            delivery_status: value.delivery_status,
            payment_status: value.payment_status,

            rider_id: value.rider_id.map(Into::into),
            rider_name: value.rider_name,
            rider_email: value.rider_email,

            tracking_id: value.tracking_id,

            created_at: value.created_at.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IndexQuery {
    pub email: Option<String>,
    pub delivery_status: Option<DeliveryStatus>,
}

pub(crate) fn parcel_filter(query: &IndexQuery) -> bson::Document {
    let mut filter = bson::doc! {};

    if let Some(email) = query.email.as_deref() {
        filter.insert("senderEmail", email);
    }
    if let Some(status) = query.delivery_status {
        filter.insert("deliveryStatus", status.as_str());
    }

    filter
}

/// Newest parcels first; no other ordering guarantee exists.
pub async fn index(
    State(parcels): State<ParcelCollection>,
    Query(query): Query<IndexQuery>,
) -> Result<Json<Vec<ParcelResponse>>, Error> {
    let options = FindOptions::builder()
        .sort(bson::doc! { "createdAt": -1 })
        .build();

    let mut cursor = parcels.find(parcel_filter(&query), options).await?;

    let mut out = vec![];

    while cursor.advance().await? {
        let parcel = cursor.deserialize_current()?;

        out.push(parcel.into());
    }

    Ok(Json(out))
}

/// An unknown id is an empty success body (JSON null), not a 404.
pub async fn show(
    State(parcels): State<ParcelCollection>,
    Path(parcel_id): Path<String>,
) -> Result<Json<Option<ParcelResponse>>, Error> {
    let parcel_id = ObjectId::from_str(&parcel_id).map_err(|_| Error::NoResource)?;

    let parcel = parcels.get_one_by_id(parcel_id).await?;

    Ok(Json(parcel.map(Into::into)))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[validate(length(min = 1, max = 124))]
    pub parcel_name: String,

    #[validate(range(min = 1))]
    pub cost: i64,

    #[validate(email)]
    pub sender_email: String,

    #[validate(length(min = 1, max = 124))]
    pub receiver_name: String,

    #[validate(length(min = 1, max = 256))]
    pub receiver_address: String,
}

pub async fn create(
    State(parcels): State<ParcelCollection>,
    Json(request): Json<CreateRequest>,
) -> Result<Json<ParcelResponse>, Error> {
    request.validate()?;

    let model = ParcelModel {
        id: ObjectId::new(),
        parcel_name: request.parcel_name,
        cost: request.cost,

        sender_email: request.sender_email,
        receiver_name: request.receiver_name,
        receiver_address: request.receiver_address,

        delivery_status: DeliveryStatus::Pending,
        payment_status: PaymentStatus::Unpaid,

        rider_id: None,
        rider_name: None,
        rider_email: None,

        tracking_id: None,

        created_at: OffsetDateTime::now_utc().into(),
    };
    parcels.insert_one(&model, None).await?;

    Ok(Json(model.into()))
}

pub async fn delete(
    State(parcels): State<ParcelCollection>,
    Path(parcel_id): Path<String>,
) -> Result<Json<DeleteSummary>, Error> {
    let parcel_id = ObjectId::from_str(&parcel_id).map_err(|_| Error::NoResource)?;

    let result = parcels
        .delete_one(
            bson::doc! {
                "_id": parcel_id
            },
            None,
        )
        .await?;

    Ok(Json(result.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssignRiderRequest {
    pub rider_id: ObjectIdString,
    pub rider_name: String,
    pub rider_email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssignRiderResponse {
    pub parcel: UpdateSummary,
    pub rider: UpdateSummary,
}

/// Attaches a rider to a parcel and marks the rider in-delivery. Two
/// independent document writes; the rider write is not rolled back if the
/// parcel write already succeeded.
#[tracing::instrument(skip_all, fields(id = %parcel_id))]
pub async fn assign_rider(
    State(parcels): State<ParcelCollection>,
    State(riders): State<RiderCollection>,
    Path(parcel_id): Path<String>,
    Json(request): Json<AssignRiderRequest>,
) -> Result<Json<AssignRiderResponse>, Error> {
    let parcel_id = ObjectId::from_str(&parcel_id).map_err(|_| Error::NoResource)?;

    let parcel_result = parcels
        .update_one(
            bson::doc! {
                "_id": parcel_id
            },
            bson::doc! {
                "$set": {
                    "deliveryStatus": DeliveryStatus::DriverAssigned.as_str(),
                    "riderId": *request.rider_id,
                    "riderName": &request.rider_name,
                    "riderEmail": &request.rider_email,
                }
            },
            None,
        )
        .await?;

    let rider_result = riders
        .update_one(
            bson::doc! {
                "_id": *request.rider_id
            },
            bson::doc! {
                "$set": {
                    "workStatus": WorkStatus::InDelivery.as_str()
                }
            },
            None,
        )
        .await?;

    Ok(Json(AssignRiderResponse {
        parcel: parcel_result.into(),
        rider: rider_result.into(),
    }))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::{
        extract::{Path, Query},
        Json,
    };

    use crate::api::{
        rider::{ApplyRequest, WorkStatus},
        tests::bootstrap,
    };

    use super::*;

    pub(crate) fn create_request(sender_email: &str) -> CreateRequest {
        CreateRequest {
            parcel_name: "Books".to_string(),
            cost: 120,
            sender_email: sender_email.to_string(),
            receiver_name: "Receiver".to_string(),
            receiver_address: "12 Station Road".to_string(),
        }
    }

    #[test]
    fn delivery_status_wire_strings() {
        let cases = [
            (DeliveryStatus::Pending, "pending"),
            (DeliveryStatus::PendingPickup, "pending-pickup"),
            (DeliveryStatus::DriverAssigned, "driver_assigned"),
            (DeliveryStatus::InTransit, "in_transit"),
            (DeliveryStatus::Delivered, "delivered"),
        ];
        for (status, expected) in cases {
            assert_eq!(status.as_str(), expected);
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::json!(expected)
            );
        }

        for status in [PaymentStatus::Unpaid, PaymentStatus::Paid] {
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::json!(status.as_str())
            );
        }
    }

    #[test]
    fn filter_combines_given_fields() {
        let query = IndexQuery {
            email: None,
            delivery_status: None,
        };
        assert_eq!(parcel_filter(&query), bson::doc! {});

        let query = IndexQuery {
            email: Some("sender@example.com".to_string()),
            delivery_status: Some(DeliveryStatus::PendingPickup),
        };
        assert_eq!(
            parcel_filter(&query),
            bson::doc! {
                "senderEmail": "sender@example.com",
                "deliveryStatus": "pending-pickup",
            }
        );
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB"]
    async fn test_assign_rider_updates_both_documents() {
        let bootstrap = bootstrap().await;

        let Json(parcel) = super::create(
            bootstrap.parcels(),
            Json(create_request("sender@example.com")),
        )
        .await
        .unwrap();
        assert_matches!(parcel.delivery_status, DeliveryStatus::Pending);

        let Json(rider) = crate::api::rider::apply(
            bootstrap.riders(),
            Json(ApplyRequest {
                name: "Rider".to_string(),
                email: "rider@example.com".to_string(),
                phone: "01700000000".to_string(),
                region: "Dhaka".to_string(),
                district: "Bogra".to_string(),
                bike_registration: "DHK-1234".to_string(),
            }),
        )
        .await
        .unwrap();

        let Json(result) = super::assign_rider(
            bootstrap.parcels(),
            bootstrap.riders(),
            Path(parcel.id.to_string()),
            Json(AssignRiderRequest {
                rider_id: rider.id,
                rider_name: rider.name.clone(),
                rider_email: rider.email.clone(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(result.parcel.modified_count, 1);
        assert_eq!(result.rider.modified_count, 1);

        let model = bootstrap
            .app_state
            .parcel_collection
            .get_one_by_id(*parcel.id)
            .await
            .unwrap()
            .unwrap();
        assert_matches!(model.delivery_status, DeliveryStatus::DriverAssigned);
        assert_eq!(model.rider_email.as_deref(), Some("rider@example.com"));

        let rider_model = bootstrap
            .app_state
            .rider_collection
            .get_one_by_id(*rider.id)
            .await
            .unwrap()
            .unwrap();
        assert_matches!(rider_model.work_status, WorkStatus::InDelivery);
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB"]
    async fn test_show_unknown_parcel_is_null() {
        let bootstrap = bootstrap().await;

        let Json(parcel) = super::show(
            bootstrap.parcels(),
            Path(bson::oid::ObjectId::new().to_string()),
        )
        .await
        .unwrap();
        assert!(parcel.is_none());

        // a malformed id is a 404, not an empty body
        let error = super::show(bootstrap.parcels(), Path("not-an-id".to_string()))
            .await
            .unwrap_err();
        assert_matches!(error, Error::NoResource);
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB"]
    async fn test_index_filters_by_sender() {
        let bootstrap = bootstrap().await;

        for email in ["a@example.com", "a@example.com", "b@example.com"] {
            let _ = super::create(bootstrap.parcels(), Json(create_request(email)))
                .await
                .unwrap();
        }

        let Json(parcels) = super::index(
            bootstrap.parcels(),
            Query(IndexQuery {
                email: Some("a@example.com".to_string()),
                delivery_status: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(parcels.len(), 2);
        assert!(parcels.iter().all(|p| p.sender_email == "a@example.com"));
    }
}
