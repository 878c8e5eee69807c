use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use boxoffice_api::app::build_router;
use boxoffice_api::app::services::AppServices;
use boxoffice_api::identity::{BuyerClaims, Hs256Identity, Role};
use boxoffice_core::UserId;
use boxoffice_infra::store::InMemoryStore;
use boxoffice_infra::RetryPolicy;

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over the in-memory backend, bound to an ephemeral port.
        let services = AppServices::in_memory(InMemoryStore::new(), RetryPolicy::default());
        let app = build_router(services, Arc::new(Hs256Identity::new(JWT_SECRET.as_bytes())));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).bearer_auth(token).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Create an event with the given `(name, price, quantity)` ticket types;
    /// returns the ticket type ids in request order.
    async fn seed_event(&self, slug: &str, ticket_types: &[(&str, &str, u32)]) -> Vec<String> {
        let start = Utc::now() + ChronoDuration::days(7);
        let (status, body) = self
            .post(
                &mint_admin_jwt(),
                "/events",
                json!({
                    "name": "Spring Gala",
                    "slug": slug,
                    "location": "Main Hall",
                    "start_time": start,
                    "end_time": start + ChronoDuration::hours(3),
                    "ticket_types": ticket_types
                        .iter()
                        .map(|(name, price, qty)| json!({
                            "name": name,
                            "price": price,
                            "initial_quantity": qty,
                        }))
                        .collect::<Vec<_>>(),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create event failed: {body}");

        let created = body["ticket_types"].as_array().unwrap();
        ticket_types
            .iter()
            .map(|(name, _, _)| {
                created
                    .iter()
                    .find(|tt| tt["name"] == *name)
                    .and_then(|tt| tt["id"].as_str())
                    .unwrap()
                    .to_string()
            })
            .collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(buyer: UserId) -> String {
    mint_jwt_with_role(buyer, Role::User)
}

fn mint_admin_jwt() -> String {
    mint_jwt_with_role(UserId::new(), Role::Admin)
}

fn mint_jwt_with_role(sub: UserId, role: Role) -> String {
    let now = Utc::now();
    Hs256Identity::new(JWT_SECRET.as_bytes())
        .issue(&BuyerClaims {
            sub,
            role,
            issued_at: now,
            expires_at: now + ChronoDuration::minutes(10),
        })
        .expect("failed to encode jwt")
}

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal encoded as string")).unwrap()
}

fn order_body(lines: &[(&str, i64)]) -> Value {
    json!({
        "items": lines
            .iter()
            .map(|(id, qty)| json!({ "ticket_type_id": id, "quantity": qty }))
            .collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn health_is_public_and_orders_require_a_token() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.client.get(srv.url("/orders")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .get(srv.url("/orders"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_or_foreign_tokens_are_rejected() {
    let srv = TestServer::spawn().await;
    let now = Utc::now();

    let expired = Hs256Identity::new(JWT_SECRET.as_bytes())
        .issue(&BuyerClaims {
            sub: UserId::new(),
            role: Role::User,
            issued_at: now - ChronoDuration::minutes(20),
            expires_at: now - ChronoDuration::minutes(10),
        })
        .unwrap();
    let (status, _) = srv.get(&expired, "/orders").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let foreign = Hs256Identity::new(b"some-other-secret")
        .issue(&BuyerClaims {
            sub: UserId::new(),
            role: Role::Admin,
            issued_at: now,
            expires_at: now + ChronoDuration::minutes(10),
        })
        .unwrap();
    let (status, _) = srv.get(&foreign, "/orders").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_reports_the_token_subject() {
    let srv = TestServer::spawn().await;
    let buyer = UserId::new();

    let (status, body) = srv.get(&mint_jwt(buyer), "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"].as_str().unwrap(), buyer.to_string());
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn order_lifecycle_place_get_list() {
    let srv = TestServer::spawn().await;
    let buyer = UserId::new();
    let token = mint_jwt(buyer);
    let ids = srv
        .seed_event("gala", &[("GA", "49.99", 100), ("VIP", "100.00", 10)])
        .await;

    let (status, order) = srv
        .post(&token, "/orders", order_body(&[(&ids[0], 3), (&ids[1], 1), (&ids[0], 1)]))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["user_id"].as_str().unwrap(), buyer.to_string());
    assert_eq!(order["status"], "PENDING");
    assert_eq!(decimal(&order["total_amount"]), Decimal::from_str("299.96").unwrap());
    let items = order["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["ticket_type_id"].as_str().unwrap(), ids[0]);
    assert_eq!(items[0]["quantity"], 3);
    assert_eq!(items[1]["ticket_type_id"].as_str().unwrap(), ids[1]);
    assert_eq!(items[2]["quantity"], 1);

    let order_id = order["id"].as_str().unwrap();
    let (status, fetched) = srv.get(&token, &format!("/orders/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, order);

    let (status, listed) = srv.get(&token, "/orders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], order["id"]);

    let (_, ga) = srv.get(&token, &format!("/ticket-types/{}", ids[0])).await;
    assert_eq!(ga["remaining_quantity"], 96);
}

#[tokio::test]
async fn orders_of_other_buyers_are_not_visible() {
    let srv = TestServer::spawn().await;
    let owner = mint_jwt(UserId::new());
    let other = mint_jwt(UserId::new());
    let ids = srv.seed_event("private", &[("GA", "10.00", 5)]).await;

    let (status, order) = srv.post(&owner, "/orders", order_body(&[(&ids[0], 1)])).await;
    assert_eq!(status, StatusCode::CREATED);
    let path = format!("/orders/{}", order["id"].as_str().unwrap());

    let (status, body) = srv.get(&other, &path).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, listed) = srv.get(&other, "/orders").await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn short_stock_is_a_conflict_and_changes_nothing() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(UserId::new());
    let ids = srv
        .seed_event("short", &[("A", "10.00", 5), ("B", "10.00", 1)])
        .await;

    let (status, body) = srv
        .post(&token, "/orders", order_body(&[(&ids[0], 2), (&ids[1], 2)]))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["ticket_type"], "B");
    assert_eq!(body["remaining"], 1);
    assert_eq!(body["requested"], 2);

    let (_, a) = srv.get(&token, &format!("/ticket-types/{}", ids[0])).await;
    assert_eq!(a["remaining_quantity"], 5);
    let (_, listed) = srv.get(&token, "/orders").await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_ticket_type_is_not_found() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(UserId::new());
    let missing = boxoffice_core::TicketTypeId::new().to_string();

    let (status, body) = srv.post(&token, "/orders", order_body(&[(&missing, 1)])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["ticket_type_id"].as_str().unwrap(), missing);
}

#[tokio::test]
async fn malformed_orders_are_bad_requests() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(UserId::new());
    let ids = srv.seed_event("bad-input", &[("GA", "10.00", 5)]).await;

    let (status, body) = srv.post(&token, "/orders", order_body(&[("nope", 1)])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, body) = srv.post(&token, "/orders", json!({ "items": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = srv.post(&token, "/orders", order_body(&[(&ids[0], 0)])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv.get(&token, "/orders/not-an-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, ga) = srv.get(&token, &format!("/ticket-types/{}", ids[0])).await;
    assert_eq!(ga["remaining_quantity"], 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_http_orders_never_oversell() {
    let srv = Arc::new(TestServer::spawn().await);
    let token = mint_jwt(UserId::new());
    let ids = srv.seed_event("rush", &[("GA", "25.00", 10)]).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let srv = Arc::clone(&srv);
        let ga = ids[0].clone();
        handles.push(tokio::spawn(async move {
            let token = mint_jwt(UserId::new());
            srv.post(&token, "/orders", order_body(&[(&ga, 1)])).await.0
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!((created, conflicts), (10, 10));
    let (_, ga) = srv.get(&token, &format!("/ticket-types/{}", ids[0])).await;
    assert_eq!(ga["remaining_quantity"], 0);
}

#[tokio::test]
async fn events_are_listed_and_found_by_id_and_slug() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(UserId::new());
    srv.seed_event("first", &[("GA", "10.00", 5)]).await;
    srv.seed_event("second", &[]).await;

    let (status, events) = srv.get(&token, "/events?limit=10&offset=0").await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 2);

    let (status, by_slug) = srv.get(&token, "/events/slug/first").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_slug["status"], "DRAFT");
    assert_eq!(by_slug["ticket_types"].as_array().unwrap().len(), 1);

    let id = by_slug["id"].as_str().unwrap();
    let (status, by_id) = srv.get(&token, &format!("/events/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_id, by_slug);

    let (status, _) = srv.get(&token, "/events/slug/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_slug_and_invalid_event_are_rejected() {
    let srv = TestServer::spawn().await;
    let token = mint_admin_jwt();
    srv.seed_event("taken", &[]).await;

    let start = Utc::now();
    let (status, body) = srv
        .post(
            &token,
            "/events",
            json!({
                "name": "Again",
                "slug": "taken",
                "location": "Hall",
                "start_time": start,
                "end_time": start + ChronoDuration::hours(1),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "slug_taken");

    let (status, body) = srv
        .post(
            &token,
            "/events",
            json!({
                "name": "Backwards",
                "slug": "backwards",
                "location": "Hall",
                "start_time": start,
                "end_time": start - ChronoDuration::hours(1),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn price_change_applies_to_later_orders_only() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(UserId::new());
    let ids = srv.seed_event("repriced", &[("GA", "20.00", 10)]).await;

    let (_, first) = srv.post(&token, "/orders", order_body(&[(&ids[0], 2)])).await;
    assert_eq!(decimal(&first["total_amount"]), Decimal::from_str("40.00").unwrap());

    let admin = mint_admin_jwt();
    let (status, updated) = srv
        .put(&admin, &format!("/ticket-types/{}/price", ids[0]), json!({ "price": "35.00" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&updated["price"]), Decimal::from_str("35.00").unwrap());

    let (_, second) = srv.post(&token, "/orders", order_body(&[(&ids[0], 1)])).await;
    assert_eq!(decimal(&second["total_amount"]), Decimal::from_str("35.00").unwrap());

    let (_, refetched) = srv
        .get(&token, &format!("/orders/{}", first["id"].as_str().unwrap()))
        .await;
    assert_eq!(decimal(&refetched["items"][0]["unit_price"]), Decimal::from_str("20.00").unwrap());
    assert_eq!(decimal(&refetched["total_amount"]), Decimal::from_str("40.00").unwrap());

    for bad in ["0", "0.001", "10.005", "123456789012.00"] {
        let (status, body) = srv
            .put(&admin, &format!("/ticket-types/{}/price", ids[0]), json!({ "price": bad }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{bad}");
        assert_eq!(body["error"], "validation_error");
    }
}

#[tokio::test]
async fn buyers_cannot_create_events_or_reprice_tickets() {
    let srv = TestServer::spawn().await;
    let buyer = mint_jwt(UserId::new());
    let ids = srv.seed_event("guarded", &[("GA", "20.00", 10)]).await;

    let (status, body) = srv
        .put(&buyer, &format!("/ticket-types/{}/price", ids[0]), json!({ "price": "0.01" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let start = Utc::now();
    let (status, _) = srv
        .post(
            &buyer,
            "/events",
            json!({
                "name": "Pirate show",
                "slug": "pirate",
                "location": "Basement",
                "start_time": start,
                "end_time": start + ChronoDuration::hours(1),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, order) = srv.post(&buyer, "/orders", order_body(&[(&ids[0], 10)])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&order["total_amount"]), Decimal::from_str("200.00").unwrap());

    let res = srv.client.get(srv.url("/events/slug/pirate")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn catalog_reads_need_no_token() {
    let srv = TestServer::spawn().await;
    let ids = srv.seed_event("open-doors", &[("GA", "15.00", 3)]).await;

    let res = srv.client.get(srv.url("/events")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let events: Value = res.json().await.unwrap();
    assert_eq!(events.as_array().unwrap().len(), 1);

    let res = srv.client.get(srv.url("/events/slug/open-doors")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let event: Value = res.json().await.unwrap();

    let res = srv
        .client
        .get(srv.url(&format!("/events/{}", event["id"].as_str().unwrap())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .get(srv.url(&format!("/ticket-types/{}", ids[0])))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .post(srv.url("/events"))
        .json(&json!({ "name": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}
