//! In-process HTTP tests against a fresh migrated database per test.

use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use smartsync_db::{
    create_retailer, create_retailer_session, get_catalog_product, list_sync_batches, DbError,
};
use smartsync_engine::{
    keys::{hash_secret, mint_session_token, mint_webhook_key},
    sign_payload, EngineSettings,
};
use tower::ServiceExt;
use uuid::Uuid;

use super::{build_app, AppState};
use crate::middleware::RateLimitState;

const SALT: &str = "test-salt";

struct Tenant {
    retailer_id: Uuid,
    webhook_key: String,
    session_token: String,
}

fn app(pool: sqlx::PgPool) -> Router {
    app_with_limit(pool, 1_000)
}

fn app_with_limit(pool: sqlx::PgPool, max_requests: usize) -> Router {
    let state = AppState {
        pool,
        settings: Arc::new(EngineSettings {
            max_upload_bytes: 1024 * 1024,
            profile_cas_retries: 3,
            api_key_hash_salt: SALT.to_string(),
        }),
        replay_window_secs: 300,
    };
    build_app(state, RateLimitState::new(max_requests, Duration::from_secs(60)))
}

async fn tenant(pool: &sqlx::PgPool) -> Tenant {
    let webhook_key = mint_webhook_key();
    let retailer = create_retailer(pool, "Corner Store", &webhook_key)
        .await
        .expect("create retailer");
    let session_token = mint_session_token();
    create_retailer_session(pool, retailer.id, &hash_secret(SALT, &session_token), None)
        .await
        .expect("create session");
    Tenant {
        retailer_id: retailer.id,
        webhook_key,
        session_token,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn session_json(method: &str, uri: &str, token: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn agent_json(method: &str, uri: &str, key: &str, body: Option<&Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-agent-key", key);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request")
}

fn webhook(key: &str, body: &str, signature: Option<(&str, &str)>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/sync/webhook")
        .header("x-api-key", key)
        .header("content-type", "application/json");
    if let Some((sig, ts)) = signature {
        builder = builder.header("x-signature", sig).header("x-timestamp", ts);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

async fn assert_untouched(pool: &sqlx::PgPool, retailer_id: Uuid, sku: &str) {
    assert!(matches!(
        get_catalog_product(pool, retailer_id, sku).await,
        Err(DbError::NotFound)
    ));
    let history = list_sync_batches(pool, retailer_id, 10)
        .await
        .expect("history");
    assert!(history.is_empty());
}

// ---------------------------------------------------------------------------
// Health and session auth
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn health_reports_database_ok(pool: sqlx::PgPool) {
    let (status, body) = send(
        &app(pool),
        Request::builder()
            .uri("/api/v1/health")
            .header("x-request-id", "req-health")
            .body(Body::empty())
            .expect("request"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["meta"]["request_id"], "req-health");
}

#[sqlx::test(migrations = "../../migrations")]
async fn ingest_requires_a_known_session(pool: sqlx::PgPool) {
    let app = app(pool);
    let payload = json!({"payload": [{"sku": "A", "qty": 1}]});

    let (status, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/v1/sync/ingest")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _) = send(
        &app,
        session_json("POST", "/api/v1/sync/ingest", "sst_forged", &payload),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn json_ingest_learns_mapping_and_upserts(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let app = app(pool.clone());

    let (status, body) = send(
        &app,
        session_json(
            "POST",
            "/api/v1/sync/ingest",
            &t.session_token,
            &json!({"payload": [
                {"ItemCode": "SKU001", "QOH": "50", "MRP": "19.99", "Description": "Cola Zero"}
            ]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Sync completed");
    assert_eq!(body["stats"]["processed"], 1);
    assert_eq!(body["stats"]["failed"], 0);
    assert_eq!(body["mappingUsed"]["sku"], "ItemCode");
    assert!(body["batchId"].is_string());

    let product = get_catalog_product(&pool, t.retailer_id, "SKU001")
        .await
        .expect("product");
    assert_eq!(product.stock, Decimal::from(50));
    assert_eq!(product.price, Decimal::new(1999, 2));
    assert_eq!(product.name, "Cola Zero");
}

#[sqlx::test(migrations = "../../migrations")]
async fn non_array_payload_is_rejected(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let (status, body) = send(
        &app(pool),
        session_json(
            "POST",
            "/api/v1/sync/ingest",
            &t.session_token,
            &json!({"payload": {"sku": "A"}}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[sqlx::test(migrations = "../../migrations")]
async fn multipart_csv_upload_is_ingested(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let csv = "SKU,Qty,Price,Product Name\nA-1,5,2.50,Tea\n,3,1.00,No Sku\nA-2,7,3.00,Coffee\n";
    let multipart = format!(
        "--XBOUNDARY\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"stock.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {csv}\r\n\
         --XBOUNDARY--\r\n"
    );

    let (status, body) = send(
        &app(pool.clone()),
        Request::builder()
            .method("POST")
            .uri("/api/v1/sync/ingest")
            .header("authorization", format!("Bearer {}", t.session_token))
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(multipart))
            .expect("request"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Sync completed with errors");
    assert_eq!(body["stats"]["processed"], 2);
    assert_eq!(body["stats"]["failed"], 1);
    assert!(body["errors"][0]
        .as_str()
        .is_some_and(|e| e.starts_with("Row 2: Missing SKU")));

    let coffee = get_catalog_product(&pool, t.retailer_id, "A-2")
        .await
        .expect("product");
    assert_eq!(coffee.stock, Decimal::from(7));

    let history = list_sync_batches(&pool, t.retailer_id, 10)
        .await
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source_type, "FILE_UPLOAD");
}

#[sqlx::test(migrations = "../../migrations")]
async fn history_lists_newest_first(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let app = app(pool);
    for qty in ["1", "2"] {
        let (status, _) = send(
            &app,
            session_json(
                "POST",
                "/api/v1/sync/ingest",
                &t.session_token,
                &json!({"payload": [{"sku": "A", "qty": qty}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/api/v1/sync/history?limit=1")
            .header("authorization", format!("Bearer {}", t.session_token))
            .body(Body::empty())
            .expect("request"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let batches = body["batches"].as_array().expect("batches");
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0]["sourceType"], "API_PUSH");
    assert_eq!(batches[0]["recordsProcessed"], 1);
    assert_eq!(batches[0]["status"], "SUCCESS");
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn webhook_rejects_missing_and_unknown_keys(pool: sqlx::PgPool) {
    let app = app(pool);
    let body = json!({"payload": [{"sku": "A", "qty": 1}]}).to_string();

    let (status, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/v1/sync/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.clone()))
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, resp) = send(&app, webhook("whk_unknown", &body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp["error"]["code"], "unauthorized");
}

#[sqlx::test(migrations = "../../migrations")]
async fn signed_webhook_is_accepted(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let body = json!({"payload": [{"sku": "W-1", "qty": "9", "price": "4.00"}]}).to_string();
    let ts = chrono::Utc::now().timestamp_millis().to_string();
    let sig = sign_payload(&t.webhook_key, body.as_bytes(), &ts).expect("sign");

    let (status, resp) = send(
        &app(pool.clone()),
        webhook(&t.webhook_key, &body, Some((&sig, &ts))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["stats"]["processed"], 1);
    let product = get_catalog_product(&pool, t.retailer_id, "W-1")
        .await
        .expect("product");
    assert_eq!(product.stock, Decimal::from(9));

    let history = list_sync_batches(&pool, t.retailer_id, 10)
        .await
        .expect("history");
    assert_eq!(history[0].source_type, "WEBHOOK");
}

#[sqlx::test(migrations = "../../migrations")]
async fn key_only_webhook_is_accepted(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let body = json!({"payload": [{"sku": "W-2", "qty": 3}]}).to_string();

    let (status, resp) = send(&app(pool), webhook(&t.webhook_key, &body, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["stats"]["processed"], 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_signed_webhook_changes_nothing(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let body = json!({"payload": [{"sku": "W-3", "qty": 1}]}).to_string();
    let ts = (chrono::Utc::now().timestamp_millis() - 600_000).to_string();
    let sig = sign_payload(&t.webhook_key, body.as_bytes(), &ts).expect("sign");

    let (status, resp) = send(
        &app(pool.clone()),
        webhook(&t.webhook_key, &body, Some((&sig, &ts))),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp["error"]["code"], "unauthorized");
    assert_untouched(&pool, t.retailer_id, "W-3").await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn tampered_webhook_changes_nothing(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let signed = json!({"payload": [{"sku": "W-4", "qty": 1}]}).to_string();
    let sent = json!({"payload": [{"sku": "W-4", "qty": 1000}]}).to_string();
    let ts = chrono::Utc::now().timestamp_millis().to_string();
    let sig = sign_payload(&t.webhook_key, signed.as_bytes(), &ts).expect("sign");

    let (status, _) = send(
        &app(pool.clone()),
        webhook(&t.webhook_key, &sent, Some((&sig, &ts))),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_untouched(&pool, t.retailer_id, "W-4").await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn signature_without_timestamp_is_rejected(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let body = json!({"payload": [{"sku": "W-5", "qty": 1}]}).to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/sync/webhook")
        .header("x-api-key", &t.webhook_key)
        .header("x-signature", "00".repeat(32))
        .header("content-type", "application/json")
        .body(Body::from(body))
        .expect("request");
    let (status, _) = send(&app(pool.clone()), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_untouched(&pool, t.retailer_id, "W-5").await;
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

async fn register(app: &Router, token: &str) -> (Uuid, String) {
    let (status, body) = send(
        app,
        session_json(
            "POST",
            "/api/v1/agents/register",
            token,
            &json!({"name": "Back office PC"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let agent_id = body["agentId"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("agentId");
    let key = body["agentKey"].as_str().expect("agentKey").to_string();
    (agent_id, key)
}

#[sqlx::test(migrations = "../../migrations")]
async fn registered_agent_heartbeats_online(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let app = app(pool);
    let (_, key) = register(&app, &t.session_token).await;
    assert!(key.starts_with("ssa_"));

    let (status, body) = send(
        &app,
        agent_json("POST", "/api/v1/agent/heartbeat", &key, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/api/v1/agents")
            .header("authorization", format!("Bearer {}", t.session_token))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agents"][0]["status"], "ONLINE");

    let (status, _) = send(
        &app,
        agent_json("POST", "/api/v1/agent/heartbeat", "ssa_forged", None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../migrations")]
async fn agent_snapshot_and_delta_flow(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let app = app(pool.clone());
    let (_, key) = register(&app, &t.session_token).await;

    let (status, body) = send(
        &app,
        agent_json(
            "POST",
            "/api/v1/agent/inventory/snapshot",
            &key,
            Some(&json!({"products": [
                {"externalProductId": "P-1", "quantity": 10, "sellingPrice": 5, "name": "Soap"}
            ]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["processed"], 1);

    let (status, body) = send(
        &app,
        agent_json(
            "POST",
            "/api/v1/agent/inventory/delta",
            &key,
            Some(&json!({"sales": [
                {"sku": "P-1", "qtyDelta": -3},
                {"sku": "NOPE", "qtyDelta": -1},
                42
            ]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["processed"], 1);
    assert_eq!(body["stats"]["failed"], 2);

    let soap = get_catalog_product(&pool, t.retailer_id, "P-1")
        .await
        .expect("product");
    assert_eq!(soap.stock, Decimal::from(7));
}

fn raw_request(method: &str, uri: &str, auth: (&str, String), body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(auth.0, auth.1)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn assert_bad_request(status: StatusCode, body: &Value) {
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["meta"]["request_id"].is_string(), "{body}");
}

#[sqlx::test(migrations = "../../migrations")]
async fn malformed_bodies_get_the_error_envelope(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let app = app(pool);
    let (agent_id, key) = register(&app, &t.session_token).await;
    let bearer = || ("authorization", format!("Bearer {}", t.session_token));
    let agent = || ("x-agent-key", key.clone());

    for (uri, body) in [
        ("/api/v1/agent/inventory/snapshot", "{\"products\": ["),
        ("/api/v1/agent/inventory/delta", "not json"),
        ("/api/v1/agent/commands/ack", "{\"status\": \"SUCCESS\"}"),
    ] {
        let (status, body) = send(&app, raw_request("POST", uri, agent(), body)).await;
        assert_bad_request(status, &body);
    }

    let (status, body) = send(
        &app,
        raw_request("POST", "/api/v1/agents/register", bearer(), "{}"),
    )
    .await;
    assert_bad_request(status, &body);

    let (status, body) = send(
        &app,
        raw_request(
            "PUT",
            &format!("/api/v1/agents/{agent_id}/permissions"),
            bearer(),
            "{\"allowedWriteBack\": \"yes\"}",
        ),
    )
    .await;
    assert_bad_request(status, &body);

    let (status, body) = send(
        &app,
        raw_request(
            "PUT",
            "/api/v1/agents/not-a-uuid/permissions",
            bearer(),
            "{\"allowedWriteBack\": true}",
        ),
    )
    .await;
    assert_bad_request(status, &body);
}

#[sqlx::test(migrations = "../../migrations")]
async fn command_queue_requires_write_back(pool: sqlx::PgPool) {
    let t = tenant(&pool).await;
    let app = app(pool);
    let (agent_id, key) = register(&app, &t.session_token).await;
    let command = json!({"commandType": "UPDATE_PRICE", "payload": {"sku": "A", "price": "2.00"}});
    let enqueue_uri = format!("/api/v1/agents/{agent_id}/commands");

    let (status, body) = send(
        &app,
        session_json("POST", &enqueue_uri, &t.session_token, &command),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");

    let (status, body) = send(
        &app,
        session_json(
            "PUT",
            &format!("/api/v1/agents/{agent_id}/permissions"),
            &t.session_token,
            &json!({"allowedWriteBack": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowedWriteBack"], true);

    let (status, body) = send(
        &app,
        session_json("POST", &enqueue_uri, &t.session_token, &command),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let command_id = body["commandId"].as_str().expect("commandId").to_string();

    let (status, body) = send(
        &app,
        agent_json("GET", "/api/v1/agent/commands", &key, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["commands"][0]["commandId"], command_id.as_str());
    assert_eq!(body["commands"][0]["status"], "DELIVERED");

    let ack = json!({"commandId": command_id, "status": "SUCCESS", "message": "applied"});
    let (status, body) = send(
        &app,
        agent_json("POST", "/api/v1/agent/commands/ack", &key, Some(&ack)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");

    let (status, _) = send(
        &app,
        agent_json("POST", "/api/v1/agent/commands/ack", &key, Some(&ack)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn foreign_agent_is_not_found(pool: sqlx::PgPool) {
    let owner = tenant(&pool).await;
    let other = tenant(&pool).await;
    let app = app(pool);
    let (agent_id, _) = register(&app, &owner.session_token).await;

    let (status, _) = send(
        &app,
        session_json(
            "PUT",
            &format!("/api/v1/agents/{agent_id}/permissions"),
            &other.session_token,
            &json!({"allowedWriteBack": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn rate_limit_rejects_excess_requests(pool: sqlx::PgPool) {
    let app = app_with_limit(pool, 1);

    let (first, _) = send(&app, webhook("whk_unknown", "{}", None)).await;
    assert_eq!(first, StatusCode::UNAUTHORIZED);

    let (second, body) = send(&app, webhook("whk_unknown", "{}", None)).await;
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "rate_limited");
}
