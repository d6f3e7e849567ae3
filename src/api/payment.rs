use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use bson::oid::ObjectId;
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};
use stripe::{
    CheckoutSession, CheckoutSessionId, CheckoutSessionMode, CheckoutSessionPaymentStatus, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, CreateCheckoutSessionPaymentMethodTypes,
    Currency,
};
use tap::TapFallible;
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    app::SiteUrls,
    error::Error,
    mongo_ext::Collection,
    tracking::generate_tracking_id,
    util::{FormattedDateTime, ObjectIdString, UpdateSummary},
};

use super::{
    auth::VerifiedEmail,
    parcel::{DeliveryStatus, ParcelCollection, PaymentStatus},
};

#[derive(Clone)]
pub struct PaymentCollection(pub Collection<PaymentModel>);

impl std::ops::Deref for PaymentCollection {
    type Target = Collection<PaymentModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Major currency units, as reported by the processor.
    pub amount: f64,
    pub currency: Option<String>,
    pub customer_email: Option<String>,

    pub parcel_id: ObjectId,
    pub parcel_name: Option<String>,

    /// Processor-issued payment-intent id; the idempotency key. Looked up
    /// before insert but not index-enforced, so two truly concurrent
    /// replays can still double-insert.
    pub transaction_id: String,

    pub payment_status: PaymentStatus,
    pub tracking_id: String,
    pub paid_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: ObjectIdString,

    pub amount: f64,
    pub currency: Option<String>,
    pub customer_email: Option<String>,

    pub parcel_id: ObjectIdString,
    pub parcel_name: Option<String>,

    pub transaction_id: String,

    pub payment_status: PaymentStatus,
    pub tracking_id: String,
    pub paid_at: FormattedDateTime,
}

impl From<PaymentModel> for PaymentResponse {
    fn from(value: PaymentModel) -> Self {
        Self {
            id: value.id.into(),
            amount: value.amount,
            currency: value.currency,
            customer_email: value.customer_email,

            parcel_id: value.parcel_id.into(),
            parcel_name: value.parcel_name,

            transaction_id: value.transaction_id,

            payment_status: value.payment_status,
            tracking_id: value.tracking_id,
            paid_at: value.paid_at.into(),
        }
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSessionRequest {
    pub parcel_id: String,

    #[validate(length(min = 1, max = 124))]
    pub parcel_name: String,

    #[validate(email)]
    pub sender_email: String,

    #[validate(range(min = 1))]
    pub cost: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckoutSessionResponse {
    pub url: Option<String>,
}

/// Opens a hosted checkout page for a parcel. The parcel id and name ride
/// along as session metadata so the confirmation flow can find its way
/// back.
pub async fn create_checkout_session(
    State(stripe): State<Arc<Client>>,
    State(site): State<SiteUrls>,
    Json(request): Json<CreateCheckoutSessionRequest>,
) -> Result<Json<CheckoutSessionResponse>, Error> {
    request.validate()?;

    let amount = request.cost * 100;

    let success_url = format!(
        "{}/dashboard/payment-success?session_id={{CHECKOUT_SESSION_ID}}",
        site.site_domain
    );
    let cancel_url = format!("{}/dashboard/payment-cancelled", site.site_domain);

    let metadata = stripe::Metadata::from([
        ("parcelId".to_string(), request.parcel_id.clone()),
        ("parcelName".to_string(), request.parcel_name.clone()),
    ]);

    let session = CheckoutSession::create(
        &stripe,
        CreateCheckoutSession {
            payment_method_types: Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                    currency: Currency::USD,
                    unit_amount: Some(amount),
                    product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                        name: format!("Please Pay For: {}", request.parcel_name),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                quantity: Some(1),
                ..Default::default()
            }]),
            mode: Some(CheckoutSessionMode::Payment),
            customer_email: Some(&request.sender_email),
            metadata: Some(metadata),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            ..Default::default()
        },
    )
    .await?;

    Ok(Json(CheckoutSessionResponse { url: session.url }))
}

/// What the confirmation flow needs out of a retrieved checkout session.
#[derive(Debug, Clone)]
pub struct SessionDetails {
    pub transaction_id: Option<String>,
    pub paid: bool,
    pub amount_total: i64,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
    pub parcel_id: Option<String>,
    pub parcel_name: Option<String>,
}

impl SessionDetails {
    pub fn from_session(session: &CheckoutSession) -> Self {
        Self {
            transaction_id: session
                .payment_intent
                .as_ref()
                .map(|intent| intent.id().to_string()),
            paid: matches!(session.payment_status, CheckoutSessionPaymentStatus::Paid),
            amount_total: session.amount_total.unwrap_or(0),
            currency: session.currency.map(|currency| currency.to_string()),
            customer_email: session.customer_email.clone(),
            parcel_id: session
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.get("parcelId"))
                .cloned(),
            parcel_name: session
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.get("parcelName"))
                .cloned(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PaymentConfirmation {
    Completed {
        parcel: UpdateSummary,
        payment_id: ObjectId,
        tracking_id: String,
        transaction_id: String,
    },
    AlreadyProcessed {
        tracking_id: String,
        transaction_id: String,
    },
    NotPaid,
}

/// Records a completed payment exactly once and transitions the parcel.
///
/// The replay guard is a read-then-write lookup on the transaction id, not
/// a store-level constraint, and the parcel update plus payment insert are
/// not one atomic transaction. Both gaps are deliberate; see DESIGN.md.
pub async fn confirm_payment(
    parcels: &ParcelCollection,
    payments: &PaymentCollection,
    details: SessionDetails,
) -> Result<PaymentConfirmation, Error> {
    let transaction_id = match details.transaction_id {
        Some(it) => it,
        None => return Ok(PaymentConfirmation::NotPaid),
    };

    let existing = payments
        .find_one(
            bson::doc! {
                "transactionId": &transaction_id
            },
            None,
        )
        .await?;

    if let Some(existing) = existing {
        tracing::debug!(%transaction_id, "replayed payment confirmation");
        return Ok(PaymentConfirmation::AlreadyProcessed {
            tracking_id: existing.tracking_id,
            transaction_id,
        });
    }

    if !details.paid {
        return Ok(PaymentConfirmation::NotPaid);
    }

    let parcel_id = details
        .parcel_id
        .as_deref()
        .and_then(|id| ObjectId::from_str(id).ok())
        .ok_or(Error::NoResource)
        .tap_err(|_| tracing::debug!("paid session carries no usable parcelId metadata"))?;

    let tracking_id = generate_tracking_id();

    let parcel_result = parcels
        .update_one(
            bson::doc! {
                "_id": parcel_id
            },
            bson::doc! {
                "$set": {
                    "paymentStatus": PaymentStatus::Paid.as_str(),
                    "deliveryStatus": DeliveryStatus::PendingPickup.as_str(),
                    "trackingId": &tracking_id,
                }
            },
            None,
        )
        .await?;

    if parcel_result.matched_count == 0 {
        tracing::warn!(%parcel_id, "confirmed payment references an unknown parcel");
    }

    let model = PaymentModel {
        id: ObjectId::new(),
        amount: details.amount_total as f64 / 100.0,
        currency: details.currency,
        customer_email: details.customer_email,

        parcel_id,
        parcel_name: details.parcel_name,

        transaction_id: transaction_id.clone(),

        payment_status: PaymentStatus::Paid,
        tracking_id: tracking_id.clone(),
        paid_at: OffsetDateTime::now_utc().into(),
    };
    payments.insert_one(&model, None).await?;

    Ok(PaymentConfirmation::Completed {
        parcel: parcel_result.into(),
        payment_id: model.id,
        tracking_id,
        transaction_id,
    })
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConfirmQuery {
    pub session_id: String,
}

fn is_false(value: &bool) -> bool {
    !value
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfirmPaymentResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub already_processed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_parcel: Option<UpdateSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<ObjectIdString>,
}

impl From<PaymentConfirmation> for ConfirmPaymentResponse {
    fn from(value: PaymentConfirmation) -> Self {
        match value {
            PaymentConfirmation::Completed {
                parcel,
                payment_id,
                tracking_id,
                transaction_id,
            } => Self {
                success: true,
                already_processed: false,
                tracking_id: Some(tracking_id),
                transaction_id: Some(transaction_id),
                modified_parcel: Some(parcel),
                payment_id: Some(payment_id.into()),
            },
            PaymentConfirmation::AlreadyProcessed {
                tracking_id,
                transaction_id,
            } => Self {
                success: true,
                already_processed: true,
                tracking_id: Some(tracking_id),
                transaction_id: Some(transaction_id),
                ..Default::default()
            },
            PaymentConfirmation::NotPaid => Self::default(),
        }
    }
}

/// Payment-success callback: retrieves the session from the processor and
/// runs [`confirm_payment`]. A session that never got paid is reported as
/// `{"success": false}` with no side effects.
#[tracing::instrument(skip_all)]
pub async fn confirm(
    State(parcels): State<ParcelCollection>,
    State(payments): State<PaymentCollection>,
    State(stripe): State<Arc<Client>>,
    Query(query): Query<ConfirmQuery>,
) -> Result<Json<ConfirmPaymentResponse>, Error> {
    let session_id = CheckoutSessionId::from_str(&query.session_id)
        .map_err(|_| Error::NoResource)
        .tap_err(|_| tracing::debug!("malformed checkout session id"))?;

    let session = CheckoutSession::retrieve(&stripe, &session_id, &[]).await?;

    let details = SessionDetails::from_session(&session);
    let confirmation = confirm_payment(&parcels, &payments, details).await?;

    Ok(Json(confirmation.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexQuery {
    pub email: Option<String>,
}

/// A caller may only filter on their own email; any other email filter is
/// forbidden outright.
pub(crate) fn payment_filter(
    requested: Option<&str>,
    verified: &str,
) -> Result<bson::Document, Error> {
    match requested {
        Some(requested) if requested != verified => Err(Error::Forbidden),
        Some(requested) => Ok(bson::doc! { "customerEmail": requested }),
        None => Ok(bson::doc! {}),
    }
}

/// Newest payments first by `paidAt`.
pub async fn index(
    VerifiedEmail(email): VerifiedEmail,
    State(payments): State<PaymentCollection>,
    Query(query): Query<IndexQuery>,
) -> Result<Json<Vec<PaymentResponse>>, Error> {
    let filter = payment_filter(query.email.as_deref(), &email)
        .tap_err(|_| tracing::debug!("tried listing another user's payments"))?;

    let options = FindOptions::builder()
        .sort(bson::doc! { "paidAt": -1 })
        .build();

    let mut cursor = payments.find(filter, options).await?;

    let mut out = vec![];

    while cursor.advance().await? {
        let payment = cursor.deserialize_current()?;

        out.push(payment.into());
    }

    Ok(Json(out))
}
