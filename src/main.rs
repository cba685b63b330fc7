use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use boxoffice_server::config::Config;
use boxoffice_server::gateway::{MockGateway, SignatureScheme};
use boxoffice_server::handlers::AppState;
use boxoffice_server::routes::create_routes;
use boxoffice_server::services::{
    CancellationService, ExpirySweeper, PaymentService, ReservationService,
};
use boxoffice_server::store::PgStore;
use boxoffice_server::wallet::PgWallet;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let store = Arc::new(PgStore::new(pool.clone()));
    let wallet = Arc::new(PgWallet::new(pool));
    // Development gateway; a real integration plugs in behind the same trait.
    let gateway = Arc::new(MockGateway::new());
    let signatures = SignatureScheme::new(config.gateway_secret.clone());

    let state = AppState {
        reservations: ReservationService::new(
            store.clone(),
            gateway.clone(),
            config.hold_duration,
        ),
        payments: PaymentService::new(store.clone(), wallet.clone(), signatures),
        cancellations: CancellationService::new(store.clone(), wallet),
        store: store.clone(),
    };

    let sweeper = ExpirySweeper::new(store, config.sweep_interval);
    tokio::spawn(sweeper.run());
    tracing::info!(
        interval_secs = config.sweep_interval.as_secs(),
        "Expiry sweeper started"
    );

    let app = create_routes(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
