pub mod auth;
pub mod parcel;
pub mod payment;
pub mod rider;
pub mod user;

#[cfg(test)]
pub mod tests {
    use axum::extract::State;
    use bson::oid::ObjectId;

    use crate::app::AppState;

    use super::{
        auth::{AdminAccess, VerifiedEmail},
        parcel::ParcelCollection,
        payment::PaymentCollection,
        rider::RiderCollection,
        user::UserCollection,
    };

    pub struct Bootstrap {
        pub app_state: AppState,
    }

    impl Bootstrap {
        pub fn users(&self) -> State<UserCollection> {
            State(self.app_state.user_collection.clone())
        }

        pub fn riders(&self) -> State<RiderCollection> {
            State(self.app_state.rider_collection.clone())
        }

        pub fn parcels(&self) -> State<ParcelCollection> {
            State(self.app_state.parcel_collection.clone())
        }

        pub fn payments(&self) -> State<PaymentCollection> {
            State(self.app_state.payment_collection.clone())
        }

        /// Stand-in for a verified admin principal. The tests call handlers
        /// directly, so nothing checks the user record behind it.
        pub fn admin(&self, email: &str) -> AdminAccess {
            AdminAccess {
                email: email.to_string(),
            }
        }

        pub fn verified_email(&self, email: &str) -> VerifiedEmail {
            VerifiedEmail(email.to_string())
        }
    }

    /// Every test run gets its own uniquely named database.
    pub async fn bootstrap() -> Bootstrap {
        let _ = dotenvy::dotenv();

        let mongo_url = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let database_name = format!("zapshift-test-{}", ObjectId::new());

        let app_state = AppState::new(
            &mongo_url,
            &database_name,
            "sk_test_unused",
            b"test-jwt-secret",
        )
        .await
        .unwrap();

        Bootstrap { app_state }
    }
}
