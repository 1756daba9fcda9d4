mod common;

use std::sync::Arc;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::TestServer;
use rest_resource::auth::{generate_token, Claims};
use rest_resource::model::{Field, MemoryModel, Model, Schema};
use rest_resource::resource::{is_anyone, is_owner, is_tokenized, is_user};
use rest_resource::{App, RequestContext, ResourceBuilder};

// A secured resource: reads need a token, writes need the owning user

struct Fixture {
    server: TestServer,
    user_id: String,
    token: String,
}

async fn fixture() -> Result<Fixture> {
    let users = Arc::new(MemoryModel::new("User", Schema::new().field("name", Field::string())));
    let user = users.create(json!({ "name": "ada" })).await?;
    let user_id = user["id"].as_str().unwrap_or_default().to_string();

    let notes = Arc::new(MemoryModel::new(
        "Note",
        Schema::new()
            .field("text", Field::string().required())
            .field("user", Field::string()),
    ));
    let mut resource = ResourceBuilder::new("notes", notes)?;
    resource
        .add_permission("find", is_tokenized())?
        .add_permission("count", is_anyone())?
        .add_permission("create", is_owner("user"))?
        .add_pre_hook("create", |ctx: Arc<RequestContext>| async move {
            ctx.context.insert("by", ctx.user.as_ref().and_then(|u| u.get("name")).cloned().unwrap_or(Value::Null));
            Ok(())
        })?
        .add_post_hook("create", |ctx: Arc<RequestContext>| async move {
            anyhow::ensure!(ctx.context.get("by") == Some(json!("ada")), "user was not loaded");
            Ok(())
        })?;
    resource.add_permission("remove", is_user())?;

    let app = App::builder(common::SECRET)
        .resource(resource.compile()?)
        .user_model(users)
        .build()?;
    let server = TestServer::spawn(app).await?;

    let token = generate_token(&Claims::new("token-1", Some(user_id.clone()), 1), common::SECRET)?;
    Ok(Fixture { server, user_id, token })
}

#[tokio::test]
async fn reads_need_a_token() -> Result<()> {
    let f = fixture().await?;
    let client = reqwest::Client::new();

    let res = client.get(f.server.url("/notes")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let payload = res.json::<Value>().await?;
    assert_eq!(
        payload,
        json!({ "status": "fail", "code": 401, "message": "Permission denied to access route." })
    );

    let res = client
        .get(f.server.url("/notes"))
        .header("Authorization", format!("Bearer {}", f.token))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await?["data"], json!({ "notes": [] }));

    // the raw token without the Bearer prefix is accepted too
    let res = client
        .get(f.server.url("/notes"))
        .header("Authorization", f.token.clone())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn routes_without_permissions_stay_closed() -> Result<()> {
    let f = fixture().await?;
    let client = reqwest::Client::new();

    let res = client.get(f.server.url("/notes/count")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(f.server.url("/notes/one"))
        .header("Authorization", format!("Bearer {}", f.token))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn invalid_tokens_are_rejected() -> Result<()> {
    let f = fixture().await?;
    let forged = generate_token(&Claims::new("token-2", Some(f.user_id.clone()), 1), "another-secret")?;

    let res = reqwest::Client::new()
        .get(f.server.url("/notes/count"))
        .header("Authorization", format!("Bearer {}", forged))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.json::<Value>().await?["status"], json!("fail"));
    Ok(())
}

#[tokio::test]
async fn owners_create_and_users_remove() -> Result<()> {
    let f = fixture().await?;
    let client = reqwest::Client::new();
    let auth = format!("Bearer {}", f.token);

    let res = client
        .post(f.server.url("/notes"))
        .header("Authorization", &auth)
        .json(&json!({ "text": "not mine", "user": "someone-else" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(f.server.url("/notes"))
        .header("Authorization", &auth)
        .json(&json!({ "text": "mine", "user": f.user_id }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let note = res.json::<Value>().await?["data"]["note"].clone();
    let id = note["id"].as_str().unwrap_or_default().to_string();

    let res = client.delete(f.server.url(&format!("/notes/{}", id))).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .delete(f.server.url(&format!("/notes/{}", id)))
        .header("Authorization", &auth)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await?["data"], json!({ "note": null }));
    Ok(())
}
