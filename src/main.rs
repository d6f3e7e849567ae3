use std::net::SocketAddr;

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zapshift::{
    api::{parcel, payment, rider, user},
    app::AppState,
};

async fn banner() -> &'static str {
    "zapshift server is running"
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zapshift=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_state = AppState::new_from_env().await.unwrap();

    let app = Router::new()
        .route("/", get(banner))
        .route("/users", get(user::index).post(user::register))
        .route("/users/:id/role", get(user::role_of).patch(user::update_role))
        .route("/riders", get(rider::index).post(rider::apply))
        .route("/riders/:id", patch(rider::set_status))
        .route(
            "/parcels",
            get(parcel::index).post(parcel::create),
        )
        .route(
            "/parcels/:id",
            get(parcel::show)
                .patch(parcel::assign_rider)
                .delete(parcel::delete),
        )
        .route(
            "/create-checkout-session",
            post(payment::create_checkout_session),
        )
        .route("/payment-success", patch(payment::confirm))
        .route("/payments", get(payment::index))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(3000u16);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
