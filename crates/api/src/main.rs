#[tokio::main]
async fn main() {
    kata_observability::init();

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });

    // No DATABASE_URL selects the in-memory store (dev mode).
    let database_url = std::env::var("DATABASE_URL").ok();
    if database_url.is_none() {
        tracing::warn!("DATABASE_URL not set; using in-memory store");
    }

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let app = kata_api::app::build_app(kata_api::app::ApiConfig {
        jwt_secret,
        database_url,
    })
    .await;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
