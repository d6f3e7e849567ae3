use std::sync::Arc;

use axum::extract::FromRef;
use mongodb::options::ClientOptions;

use crate::api::{
    auth::JwtState, parcel::ParcelCollection, payment::PaymentCollection, rider::RiderCollection,
    user::UserCollection,
};

/// Frontend origin the checkout flow redirects back to.
#[derive(Clone)]
pub struct SiteUrls {
    pub site_domain: String,
}

impl SiteUrls {
    pub fn init() -> Self {
        let site_domain = std::env::var("SITE_DOMAIN")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        Self { site_domain }
    }
}

#[derive(FromRef, Clone)]
pub struct AppState {
    pub jwt_state: JwtState,
    pub stripe_client: Arc<stripe::Client>,
    pub site_urls: SiteUrls,

    pub mongo_client: mongodb::Client,
    pub user_collection: UserCollection,
    pub rider_collection: RiderCollection,
    pub parcel_collection: ParcelCollection,
    pub payment_collection: PaymentCollection,
}

impl AppState {
    pub async fn new(
        mongo_url: &str,
        database_name: &str,
        stripe_secret: &str,
        jwt_secret: &[u8],
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let options = ClientOptions::parse(mongo_url).await?;
        let mongo_client = mongodb::Client::with_options(options)?;

        let database = mongo_client.database(database_name);

        Ok(Self {
            jwt_state: JwtState::new(jwt_secret),
            stripe_client: Arc::new(stripe::Client::new(stripe_secret)),
            site_urls: SiteUrls::init(),

            user_collection: UserCollection(database.collection("users").into()),
            rider_collection: RiderCollection(database.collection("riders").into()),
            parcel_collection: ParcelCollection(database.collection("parcels").into()),
            payment_collection: PaymentCollection(database.collection("payments").into()),

            mongo_client,
        })
    }

    pub async fn new_from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mongo_url = std::env::var("MONGODB_URI")
            .expect("Cannot retrieve MONGODB_URI from environment variable.");
        let stripe_secret = std::env::var("STRIPE_SECRET_KEY")
            .expect("Cannot retrieve STRIPE_SECRET_KEY from environment variable.");
        let jwt_secret = std::env::var("AUTH_JWT_SECRET")
            .expect("Cannot retrieve AUTH_JWT_SECRET from environment variable.");

        Self::new(
            &mongo_url,
            "zap-shift-db",
            &stripe_secret,
            jwt_secret.as_bytes(),
        )
        .await
    }
}
