use anyhow::Result;
use meteoproxy::{Settings, telemetry, web};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    telemetry::init(&settings)?;

    tracing::info!("meteoproxy {} starting", meteoproxy::VERSION);
    tracing::info!("Upstream: {}", settings.upstream.forecast_url);
    tracing::info!(
        "Cache: {} (ttl {}s)",
        settings.cache.path,
        settings.cache.ttl_seconds
    );
    if let Some(extra) = settings.describe_extra_fields() {
        tracing::info!("{}", extra);
    }

    web::run(settings).await
}
