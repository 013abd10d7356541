//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::UserId;
use document_store::InMemoryDocumentStore;
use domain::ReadRetry;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
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

const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

struct TestApp {
    app: Router,
    store: InMemoryDocumentStore,
}

async fn setup() -> TestApp {
    setup_with_tokens(&[]).await
}

/// Alice and Bob always exist; `extra` adds more token holders.
async fn setup_with_tokens(extra: &[&str]) -> TestApp {
    let store = InMemoryDocumentStore::new();
    let mut resolver = api::StaticTokenResolver::default()
        .with_token(ALICE, UserId::new())
        .with_token(BOB, UserId::new());
    for token in extra {
        resolver = resolver.with_token(*token, UserId::new());
    }

    let state = api::create_state(store.clone(), Arc::new(resolver), ReadRetry::none())
        .await
        .unwrap();
    let app = api::create_app(state, get_metrics_handle(), api::cors_layer("*"));
    TestApp { app, store }
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.send_with_headers(method, uri, token, body, &[]).await
    }

    async fn send_with_headers(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(body) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&body).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn product(&self, name: &str, price: i64) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/products",
                Some(ALICE),
                Some(json!({ "name": name, "price": price })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn add_to_cart(&self, token: &str, product: &str, quantity: i64) {
        let (status, _) = self
            .send(
                "POST",
                "/cart/add",
                Some(token),
                Some(json!({ "productId": product, "quantity": quantity })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

fn address(name: &str, is_default: bool) -> Value {
    json!({
        "receiverName": name,
        "phoneNumber": "13900000000",
        "province": "Guangdong",
        "city": "Shenzhen",
        "district": "Nanshan",
        "detailAddress": "8 Science Park Road",
        "isDefault": is_default,
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;
    let (status, body) = app.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_unknown_token_is_rejected_without_side_effects() {
    let app = setup().await;
    let product = app.product("Notebook", 1000).await;

    let (status, body) = app
        .send(
            "POST",
            "/cart/add",
            None,
            Some(json!({ "productId": product, "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, _) = app
        .send(
            "POST",
            "/cart/add",
            Some("forged"),
            Some(json!({ "productId": product })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            "POST",
            "/products",
            None,
            Some(json!({ "name": "Counterfeit", "price": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
    let (status, _) = app
        .send(
            "POST",
            "/products",
            Some("forged"),
            Some(json!({ "name": "Counterfeit", "price": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    for (method, uri) in [
        ("POST", "/orders/checkout"),
        ("GET", "/address"),
        ("DELETE", "/cart/clear"),
        ("GET", "/reviews/check/whatever"),
    ] {
        let (status, _) = app.send(method, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }

    assert_eq!(app.store.document_count("carts").await, 0);
    assert_eq!(app.store.document_count("orders").await, 0);
    assert_eq!(app.store.document_count("products").await, 1);
}

#[tokio::test]
async fn test_cart_and_checkout_flow() {
    let app = setup().await;
    let notebook = app.product("Notebook", 1000).await;
    let eraser = app.product("Eraser", 500).await;

    app.add_to_cart(ALICE, &notebook, 1).await;
    app.add_to_cart(ALICE, &notebook, 1).await;
    app.add_to_cart(ALICE, &eraser, 1).await;

    let (status, cart) = app.send("GET", "/cart", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let notebook_line = items
        .iter()
        .find(|line| line["productId"] == notebook.as_str())
        .unwrap();
    assert_eq!(notebook_line["quantity"], 2);
    assert_eq!(notebook_line["product"]["price"], 1000);

    let (status, order) = app
        .send("POST", "/orders/checkout", Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["total"], 2500);
    assert_eq!(order["status"], "Pending");

    let (_, cart) = app.send("GET", "/cart", Some(ALICE), None).await;
    assert_eq!(cart["items"], json!([]));

    let (status, orders) = app.send("GET", "/orders", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders[0]["id"], order["id"]);

    let uri = format!("/orders/{}", order["id"].as_str().unwrap());
    let (status, _) = app.send("GET", &uri, Some(BOB), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, bob_orders) = app.send("GET", "/orders", Some(BOB), None).await;
    assert_eq!(bob_orders, json!([]));
}

#[tokio::test]
async fn test_cart_update_remove_and_clear() {
    let app = setup().await;
    let pen = app.product("Pen", 150).await;
    let ink = app.product("Ink", 300).await;
    app.add_to_cart(ALICE, &pen, 3).await;
    app.add_to_cart(ALICE, &ink, 1).await;

    let (status, cart) = app
        .send(
            "PUT",
            "/cart/update",
            Some(ALICE),
            Some(json!({ "productId": pen, "quantity": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);

    let (status, cart) = app
        .send("DELETE", &format!("/cart/remove/{ink}"), Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"], json!([]));

    app.add_to_cart(ALICE, &pen, 1).await;
    let (status, body) = app.send("DELETE", "/cart/clear", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "msg": "Cart cleared" }));
    assert_eq!(app.store.document_count("carts").await, 0);
}

#[tokio::test]
async fn test_checkout_replays_with_idempotency_key() {
    let app = setup().await;
    let notebook = app.product("Notebook", 1000).await;
    app.add_to_cart(ALICE, &notebook, 1).await;

    let key = [("idempotency-key", "tab-42")];
    let (status, first) = app
        .send_with_headers("POST", "/orders/checkout", Some(ALICE), None, &key)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, replay) = app
        .send_with_headers("POST", "/orders/checkout", Some(ALICE), None, &key)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(replay["id"], first["id"]);
    assert_eq!(app.store.document_count("orders").await, 1);

    let (status, body) = app
        .send("POST", "/orders/checkout", Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "EMPTY_CART");
}

#[tokio::test]
async fn test_address_default_flow() {
    let app = setup().await;

    let (status, home) = app
        .send("POST", "/address", Some(ALICE), Some(address("home", true)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, office) = app
        .send("POST", "/address", Some(ALICE), Some(address("office", true)))
        .await;

    let (_, list) = app.send("GET", "/address", Some(ALICE), None).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], office["id"]);
    assert_eq!(list[0]["isDefault"], true);
    assert_eq!(list[1]["isDefault"], false);

    let home_id = home["id"].as_str().unwrap();
    let (status, _) = app
        .send("PATCH", &format!("/address/{home_id}/default"), Some(BOB), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, promoted) = app
        .send("PATCH", &format!("/address/{home_id}/default"), Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["isDefault"], true);

    let (_, list) = app.send("GET", "/address", Some(ALICE), None).await;
    let defaults = list
        .as_array()
        .unwrap()
        .iter()
        .filter(|a| a["isDefault"] == true)
        .count();
    assert_eq!(defaults, 1);

    let (status, updated) = app
        .send(
            "PUT",
            &format!("/address/{home_id}"),
            Some(ALICE),
            Some(address("home renamed", true)),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["receiverName"], "home renamed");

    let office_id = office["id"].as_str().unwrap();
    let (status, body) = app
        .send("DELETE", &format!("/address/{office_id}"), Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "msg": "Address deleted" }));

    let (status, body) = app
        .send(
            "POST",
            "/address",
            Some(ALICE),
            Some(json!({ "receiverName": "incomplete" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_review_stats_and_duplicates() {
    let reviewers = ["r0", "r1", "r2", "r3"];
    let app = setup_with_tokens(&reviewers).await;
    let lamp = app.product("Lamp", 2500).await;

    for (token, rating) in reviewers.iter().zip([0.5, 3.5, 5.0, 5.0]) {
        let (status, _) = app
            .send(
                "POST",
                "/reviews",
                Some(*token),
                Some(json!({ "productId": lamp, "rating": rating, "comment": "ok" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .send(
            "POST",
            "/reviews",
            Some("r0"),
            Some(json!({ "productId": lamp, "rating": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_REVIEWED");

    let (status, stats) = app
        .send(
            "GET",
            &format!("/reviews/product/{lamp}?page=abc&limit=2"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["page"], 1);
    assert_eq!(stats["pages"], 2);
    assert_eq!(stats["avgRating"], 3.5);
    assert_eq!(stats["reviews"].as_array().unwrap().len(), 2);
    assert_eq!(
        stats["ratingDistribution"],
        json!({ "1": 1, "2": 0, "3": 1, "4": 0, "5": 2 })
    );

    let (_, check) = app
        .send("GET", &format!("/reviews/check/{lamp}"), Some("r1"), None)
        .await;
    assert_eq!(check["hasReviewed"], true);
    let (_, check) = app
        .send("GET", &format!("/reviews/check/{lamp}"), Some(ALICE), None)
        .await;
    assert_eq!(check["hasReviewed"], false);
}

#[tokio::test]
async fn test_review_ownership() {
    let app = setup().await;
    let lamp = app.product("Lamp", 2500).await;
    let (_, review) = app
        .send(
            "POST",
            "/reviews",
            Some(ALICE),
            Some(json!({ "productId": lamp, "rating": 4, "comment": "nice" })),
        )
        .await;
    let uri = format!("/reviews/{}", review["id"].as_str().unwrap());

    let (status, body) = app
        .send("PUT", &uri, Some(BOB), Some(json!({ "rating": 1 })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, updated) = app
        .send(
            "PUT",
            &uri,
            Some(ALICE),
            Some(json!({ "rating": 4.5, "comment": "great" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["rating"], 4.5);

    let (status, body) = app.send("DELETE", &uri, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Review deleted" }));
}

#[tokio::test]
async fn test_error_codes() {
    let app = setup().await;
    let pen = app.product("Pen", 150).await;

    let (status, body) = app
        .send(
            "POST",
            "/cart/add",
            Some(ALICE),
            Some(json!({ "productId": pen, "quantity": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .send("GET", "/orders/not-a-uuid", Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, body) = app
        .send(
            "POST",
            "/cart/add",
            Some(ALICE),
            Some(json!({ "productId": UserId::new().to_string() })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = app
        .send("POST", "/products", Some(ALICE), Some(json!({ "name": " ", "price": 10 })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .send(
            "POST",
            "/cart/add",
            Some(ALICE),
            Some(json!({ "productId": pen, "quantity": 10_001 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .send("POST", "/cart/add", Some(ALICE), Some(json!({ "quantity": 1 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_area_lookups_are_public_and_sorted() {
    let app = setup().await;
    domain::AreaService::new(app.store.clone())
        .import(domain::core_areas())
        .await
        .unwrap();

    let (status, provinces) = app.send("GET", "/areas/provinces", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let provinces = provinces.as_array().unwrap();
    assert_eq!(provinces.len(), 34);
    assert_eq!(provinces[0]["code"], "110000");
    assert_eq!(provinces[0]["level"], 1);
    assert!(provinces[0]["parentCode"].is_null());

    let (status, districts) = app
        .send("GET", "/areas/children/440300", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = districts
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["440304", "440305"]);
    assert_eq!(districts[0]["parentCode"], "440300");

    let (status, none) = app.send("GET", "/areas/children/000000", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(none, json!([]));

    let (status, tree) = app.send("GET", "/areas/tree", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    let tree = tree.as_array().unwrap();
    assert_eq!(tree.len(), 43);
    assert!(tree.iter().all(|a| a["level"].as_u64().unwrap() <= 2));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;
    let pen = app.product("Pen", 150).await;
    app.add_to_cart(ALICE, &pen, 1).await;
    let (status, _) = app
        .send("POST", "/orders/checkout", Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_completed_total"));
    assert!(text.contains("cart_mutations_total"));
}
