//! Integration tests for the API server.

use std::sync::Arc;
use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use delivery::DeliveryConfig;
use domain::Money;
use futures_util::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, OrderStore};
use saga::{InMemoryPaymentGateway, InMemoryProductCatalog};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    state: Arc<api::routes::orders::AppState<InMemoryOrderStore>>,
    catalog: InMemoryProductCatalog,
    payment: InMemoryPaymentGateway,
}

fn setup_with(delivery_config: DeliveryConfig) -> TestApp {
    let store = InMemoryOrderStore::new();
    let (state, catalog, payment) = api::create_default_state(store, delivery_config);

    catalog.add_product("A", "Banh mi", Money::from_decimal(5.0), 10, Some("r-1"));
    catalog.add_product("B", "Ca phe", Money::from_decimal(2.5), 1, Some("r-1"));

    let app = api::create_app(state.clone(), get_metrics_handle());
    TestApp {
        app,
        state,
        catalog,
        payment,
    }
}

fn setup() -> TestApp {
    setup_with(DeliveryConfig::default())
}

fn order_body(items: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "items": items,
        "shipping": {
            "name": "Lan",
            "phone": "0900000002",
            "address": "12 Le Loi"
        },
        "payment": { "method": "card" },
        "userEmail": "lan@example.com"
    })
}

fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Places an order for two of product A and returns its id.
async fn place_order(app: &axum::Router) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/orders",
            &order_body(serde_json::json!([{ "productId": "A", "qty": 2 }])),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    body_json(response).await["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let TestApp { app, .. } = setup();

    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_create_order() {
    let TestApp {
        app,
        catalog,
        payment,
        ..
    } = setup();

    let response = app
        .oneshot(json_request(
            "POST",
            "/orders",
            &order_body(serde_json::json!([{ "productId": "A", "qty": 2 }])),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["total"], 10.0);
    assert_eq!(json["status"], "drone dispatched to restaurant");
    assert_eq!(json["items"][0]["productId"], "A");
    assert_eq!(json["items"][0]["qty"], 2);
    assert_eq!(json["items"][0]["unitPrice"], 5.0);
    assert_eq!(json["userEmail"], "lan@example.com");
    assert_eq!(json["shippingAddress"], "12 Le Loi");
    assert_eq!(json["paymentMethod"], "card");
    assert_eq!(json["transactionId"], "PAY-0001");
    assert!(json["shippingLat"].is_number());

    assert_eq!(catalog.stock("A"), Some(8));
    assert_eq!(payment.charge_count(), 1);
}

#[tokio::test]
async fn test_create_order_insufficient_stock() {
    let TestApp {
        app,
        catalog,
        payment,
        ..
    } = setup();

    let response = app
        .oneshot(json_request(
            "POST",
            "/orders",
            &order_body(serde_json::json!([
                { "productId": "A", "qty": 1 },
                { "productId": "B", "qty": 2 }
            ])),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("B"));

    assert_eq!(catalog.reserve_count(), 0);
    assert_eq!(payment.charge_count(), 0);
}

#[tokio::test]
async fn test_create_order_payment_failure_restores_stock() {
    let TestApp {
        app,
        state,
        catalog,
        payment,
    } = setup();
    payment.set_fail_on_charge(true);

    let response = app
        .oneshot(json_request(
            "POST",
            "/orders",
            &order_body(serde_json::json!([{ "productId": "A", "qty": 3 }])),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body_json(response).await["error"], "Payment failed");
    assert_eq!(catalog.stock("A"), Some(10));
    assert_eq!(state.store.order_count().await, 0);
}

#[tokio::test]
async fn test_create_order_payment_service_down() {
    let TestApp {
        app,
        state,
        catalog,
        payment,
    } = setup();
    payment.set_unavailable(true);

    let response = app
        .oneshot(json_request(
            "POST",
            "/orders",
            &order_body(serde_json::json!([{ "productId": "A", "qty": 3 }])),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        body_json(response).await["error"],
        "Payment service unavailable"
    );
    assert_eq!(catalog.stock("A"), Some(10));
    assert_eq!(state.store.order_count().await, 0);
}

#[tokio::test]
async fn test_create_order_product_service_down() {
    let TestApp { app, catalog, .. } = setup();
    catalog.set_unavailable(true);

    let response = app
        .oneshot(json_request(
            "POST",
            "/orders",
            &order_body(serde_json::json!([{ "productId": "A", "qty": 1 }])),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        body_json(response).await["error"],
        "Product service unavailable"
    );
}

#[tokio::test]
async fn test_create_order_validation_errors() {
    let TestApp { app, .. } = setup();

    let cases = [
        order_body(serde_json::json!([])),
        order_body(serde_json::json!([{ "productId": "A", "qty": 0 }])),
        order_body(serde_json::json!([{ "productId": " ", "qty": 1 }])),
        serde_json::json!({ "items": "not a list" }),
    ];

    for body in cases {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/orders", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        assert!(body_json(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn test_create_order_malformed_json() {
    let TestApp { app, .. } = setup();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_and_get_order() {
    let TestApp { app, .. } = setup();
    let order_id = place_order(&app).await;

    let response = app
        .oneshot(empty_request("GET", &format!("/orders/{order_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], order_id.as_str());
    assert_eq!(json["total"], 10.0);
}

#[tokio::test]
async fn test_get_nonexistent_order() {
    let TestApp { app, .. } = setup();

    let response = app
        .oneshot(empty_request(
            "GET",
            &format!("/orders/{}", uuid::Uuid::new_v4()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_order_id_format() {
    let TestApp { app, .. } = setup();

    let response = app
        .oneshot(empty_request("GET", "/orders/not-a-uuid"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_orders_by_email() {
    let TestApp { app, .. } = setup();
    place_order(&app).await;

    let mut other = order_body(serde_json::json!([{ "productId": "A", "qty": 1 }]));
    other["userEmail"] = serde_json::json!("binh@example.com");
    let response = app
        .clone()
        .oneshot(json_request("POST", "/orders", &other))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/orders"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);

    let response = app
        .oneshot(empty_request("GET", "/orders?email=binh@example.com"))
        .await
        .unwrap();
    let json = body_json(response).await;
    let orders = json.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["userEmail"], "binh@example.com");
}

#[tokio::test]
async fn test_patch_status_override() {
    let TestApp { app, .. } = setup();
    let order_id = place_order(&app).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/orders/{order_id}"),
            &serde_json::json!({ "status": "Delivered To Home" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "delivered to home");
}

#[tokio::test]
async fn test_patch_status_rejects_bad_values() {
    let TestApp { app, .. } = setup();
    let order_id = place_order(&app).await;

    for body in [
        serde_json::json!({}),
        serde_json::json!({ "status": "" }),
        serde_json::json!({ "status": "teleported" }),
    ] {
        let response = app
            .clone()
            .oneshot(json_request("PATCH", &format!("/orders/{order_id}"), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
    }
}

#[tokio::test]
async fn test_patch_status_disabled() {
    let TestApp { app, .. } = setup_with(DeliveryConfig {
        allow_status_override: false,
        ..DeliveryConfig::default()
    });
    let order_id = place_order(&app).await;

    let response = app
        .oneshot(json_request(
            "PATCH",
            &format!("/orders/{order_id}"),
            &serde_json::json!({ "status": "delivered to home" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_patch_status_unknown_order() {
    let TestApp { app, .. } = setup();

    let response = app
        .oneshot(json_request(
            "PATCH",
            &format!("/orders/{}", uuid::Uuid::new_v4()),
            &serde_json::json!({ "status": "pickup started" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_order() {
    let TestApp { app, state, .. } = setup();
    let order_id = place_order(&app).await;

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/orders/{order_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ok"], true);
    assert_eq!(state.store.order_count().await, 0);

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/orders/{order_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(empty_request("DELETE", &format!("/orders/{order_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_arm_drone() {
    let TestApp { app, state, .. } = setup();
    let order_id = place_order(&app).await;

    let response = app
        .oneshot(empty_request(
            "POST",
            &format!("/orders/{order_id}/drone/arm"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["status"], "pickup started");

    let id = order_id.parse().unwrap();
    assert!(state.delivery.arm_pending(id).await);
}

#[tokio::test]
async fn test_start_drone() {
    let TestApp { app, state, .. } = setup();
    let order_id = place_order(&app).await;

    let response = app
        .clone()
        .oneshot(empty_request(
            "POST",
            &format!("/orders/{order_id}/drone/start"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ok"], true);

    let id = order_id.parse().unwrap();
    let order = state.store.get(id).await.unwrap().unwrap();
    assert_eq!(order.status().as_str(), "delivering by drone");
    assert!(state.delivery.session(id).await.is_some());
}

#[tokio::test]
async fn test_start_after_delivery_conflicts() {
    let TestApp { app, .. } = setup();
    let order_id = place_order(&app).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/orders/{order_id}"),
            &serde_json::json!({ "status": "delivered to home" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(empty_request(
            "POST",
            &format!("/orders/{order_id}/drone/start"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_drone_endpoints_unknown_order() {
    let TestApp { app, .. } = setup();
    let unknown = uuid::Uuid::new_v4();

    for path in ["arm", "start"] {
        let response = app
            .clone()
            .oneshot(empty_request(
                "POST",
                &format!("/orders/{unknown}/drone/{path}"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "drone/{path}");
    }
}

#[tokio::test]
async fn test_event_stream_sends_current_status_first() {
    let TestApp { app, .. } = setup();
    let order_id = place_order(&app).await;

    let response = app
        .oneshot(empty_request("GET", &format!("/orders/{order_id}/events")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));

    let mut stream = response.into_body().into_data_stream();
    let chunk = stream.next().await.unwrap().unwrap();
    let frame = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(frame.contains("event: status"), "frame {frame}");
    assert!(frame.contains("drone dispatched to restaurant"), "frame {frame}");
    assert!(frame.contains(&order_id), "frame {frame}");
}

#[tokio::test]
async fn test_shutdown_ends_event_streams() {
    let TestApp { app, state, .. } = setup();
    let order_id = place_order(&app).await;
    let uri = format!("/orders/{order_id}/events");

    let response = app.clone().oneshot(empty_request("GET", &uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut stream = response.into_body().into_data_stream();
    assert!(stream.next().await.unwrap().is_ok());

    assert_eq!(state.delivery.shutdown().await, 1);

    let end = tokio::time::timeout(std::time::Duration::from_secs(5), stream.next())
        .await
        .expect("event stream stayed open after shutdown");
    assert!(end.is_none());

    let response = app.oneshot(empty_request("GET", &uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Server is shutting down");
}

#[tokio::test]
async fn test_event_stream_unknown_order() {
    let TestApp { app, .. } = setup();

    let response = app
        .oneshot(empty_request(
            "GET",
            &format!("/orders/{}/events", uuid::Uuid::new_v4()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let TestApp { app, .. } = setup();
    place_order(&app).await;

    let response = app
        .oneshot(empty_request("GET", "/metrics"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}
