#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use reqwest::StatusCode;
use serde_json::{json, Value};

use rest_resource::model::{Field, MemoryModel, Schema};
use rest_resource::{CompiledResource, ResourceBuilder, ResourceOptions, Route};

pub const SECRET: &str = "integration-secret";

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
}

impl TestServer {
    /// Serve `app` on an unused port for the rest of the test
    pub async fn spawn(app: Router) -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind port {}", port))?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let server = Self { port, base_url };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            if let Ok(resp) = client.get(&self.base_url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub fn example_model() -> Arc<MemoryModel> {
    let schema = Schema::new()
        .field("title", Field::string().required().trim())
        .field("comments", Field::number().required().default(0))
        .field("magic.wands", Field::number().min(1000.0));
    Arc::new(MemoryModel::new("Example", schema))
}

/// The example resource with the `smacktalk` route, open to everyone
pub fn example_resource(model: Arc<MemoryModel>, unsecure: bool) -> Result<CompiledResource> {
    let options = ResourceOptions {
        unsecure,
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

/// POST a document and return its envelope data
pub async fn create(server: &TestServer, body: Value) -> Result<Value> {
    let res = reqwest::Client::new()
        .post(server.url("/examples"))
        .json(&body)
        .send()
        .await?;
    anyhow::ensure!(res.status() == StatusCode::OK, "create failed: {}", res.status());
    let payload = res.json::<Value>().await?;
    Ok(payload["data"]["example"].clone())
}
