use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use rest_resource::config::AppConfig;
use rest_resource::model::{Field, MemoryModel, Schema};
use rest_resource::{App, CompiledResource, ResourceBuilder, ResourceOptions, Route};

#[derive(Parser, Debug)]
#[command(name = "rest-resource", about = "Serve the example resource")]
struct Args {
    /// Port to listen on (overrides API_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Include error detail in 500 responses
    #[arg(long)]
    debug: bool,

    /// Open every route that has no permissions
    #[arg(long)]
    unsecure: bool,

    /// Log a signed token for this user id before serving
    #[arg(long, value_name = "USER_ID")]
    issue_token: Option<String>,
}

fn example_resource(config: &AppConfig) -> anyhow::Result<CompiledResource> {
    let schema = Schema::new()
        .field("title", Field::string().required().trim())
        .field("comments", Field::number().required().default(0))
        .field("magic.wands", Field::number().min(1000.0));
    let model = Arc::new(MemoryModel::new("Example", schema));

    let options = ResourceOptions {
        unsecure: config.resource.unsecure,
        debug: config.api.debug_errors,
        body_limit: config.api.max_request_size_bytes,
        ..ResourceOptions::default()
    };
    let mut resource = ResourceBuilder::with_options("example", model, options)?;
    resource.add_endpoint(
        Route::new("smacktalk", "get", "/smacktalk", |_ctx| async {
            Ok(json!({ "attach": "hello" }))
        })?
        .open(),
    );
    Ok(resource.compile()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up JWT_SECRET, APP_ENV, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.api.port = port;
    }
    config.api.debug_errors |= args.debug;
    config.resource.unsecure |= args.unsecure;
    tracing::info!("Starting in {} mode", config.environment);

    let secret = config
        .security
        .jwt_secret
        .clone()
        .context("JWT_SECRET must be set to verify request tokens")?;

    if let Some(user_id) = args.issue_token {
        let token = config
            .security
            .issue_token(uuid::Uuid::new_v4().to_string(), Some(user_id.clone()))
            .context("failed to issue token")?;
        tracing::info!(
            "Token for {} (valid {}h): {}",
            user_id,
            config.security.jwt_expiry_hours,
            token
        );
    }

    let app = App::builder(secret)
        .config(&config)
        .resource(example_resource(&config)?)
        .build()?;

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
