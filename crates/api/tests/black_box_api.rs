use chrono::{Duration as ChronoDuration, Utc};
use farmstand_auth::SessionClaims;
use farmstand_core::PrincipalId;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = farmstand_api::app::build_app(jwt_secret.to_string());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, principal: PrincipalId) -> String {
    let now = Utc::now();
    let claims = SessionClaims {
        sub: principal,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn get_json_eventually(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    matches: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    // The API is intentionally eventual-consistent (command path vs projection
    // update). Poll briefly until the projection catches up.
    let mut last = serde_json::Value::Null;
    for _ in 0..50 {
        let res = client.get(url).bearer_auth(token).send().await.unwrap();

        if res.status() == StatusCode::OK {
            let body: serde_json::Value = res.json().await.unwrap();
            if matches(&body) {
                return body;
            }
            last = body;
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("read model did not converge within timeout; last seen: {last}");
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn caller_identity_is_derived_from_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let principal = PrincipalId::new();
    let token = mint_jwt(jwt_secret, principal);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["principal_id"].as_str().unwrap(), principal.to_string());
}

#[tokio::test]
async fn listing_purchase_and_withdrawal_roundtrip() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let seller = PrincipalId::new();
    let buyer = PrincipalId::new();
    let seller_token = mint_jwt(jwt_secret, seller);
    let buyer_token = mint_jwt(jwt_secret, buyer);

    let client = reqwest::Client::new();

    // List (seller)
    let res = client
        .post(format!("{}/market/items", srv.base_url))
        .bearer_auth(&seller_token)
        .json(&json!({
            "name": "Oranges",
            "description": "Juicy oranges",
            "image_url": "https://example.com/oranges.jpg",
            "price": 200,
            "quantity": 5
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let item_id = created["item_id"].as_u64().unwrap();
    assert_eq!(item_id, 1);

    // Buy every unit (buyer, native currency)
    let res = client
        .post(format!("{}/market/items/{}/purchases", srv.base_url, item_id))
        .bearer_auth(&buyer_token)
        .json(&json!({ "quantity": 5, "currency": "native" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["ok"], true);

    // Item drains to zero and deactivates (eventually consistent read).
    let item = get_json_eventually(
        &client,
        &format!("{}/market/items/{}", srv.base_url, item_id),
        &seller_token,
        |v| v["quantity"] == 0,
    )
    .await;
    assert_eq!(item["active"], false);

    // Seller earnings reflect the sale in the chosen currency only.
    let earnings = get_json_eventually(
        &client,
        &format!("{}/market/sellers/{}/earnings", srv.base_url, seller),
        &seller_token,
        |v| v["native"] == 1000,
    )
    .await;
    assert_eq!(earnings["stable"], 0);

    // Withdraw (seller); the full balance comes back.
    let res = client
        .post(format!("{}/market/withdrawals/native", srv.base_url))
        .bearer_auth(&seller_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["amount"], 1000);

    // Balance zeroes out.
    get_json_eventually(
        &client,
        &format!("{}/market/sellers/{}/earnings", srv.base_url, seller),
        &seller_token,
        |v| v["native"] == 0,
    )
    .await;
}

#[tokio::test]
async fn buying_a_missing_item_is_not_found_with_ledger_code() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let token = mint_jwt(jwt_secret, PrincipalId::new());
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/market/items/42/purchases", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "quantity": 1, "currency": "native" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], 101);
}

#[tokio::test]
async fn sold_out_item_reports_unavailable_with_ledger_code() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let seller_token = mint_jwt(jwt_secret, PrincipalId::new());
    let buyer_token = mint_jwt(jwt_secret, PrincipalId::new());
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/market/items", srv.base_url))
        .bearer_auth(&seller_token)
        .json(&json!({ "name": "Single Apple", "price": 100, "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let buy = |qty: u64| {
        client
            .post(format!("{}/market/items/1/purchases", srv.base_url))
            .bearer_auth(&buyer_token)
            .json(&json!({ "quantity": qty, "currency": "native" }))
            .send()
    };

    assert_eq!(buy(1).await.unwrap().status(), StatusCode::OK);

    let res = buy(1).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], 102);
}

#[tokio::test]
async fn withdrawing_with_no_earnings_reports_ledger_code() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let token = mint_jwt(jwt_secret, PrincipalId::new());
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/market/withdrawals/stable", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], 104);
}

#[tokio::test]
async fn invalid_listing_is_rejected_with_validation_code() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let token = mint_jwt(jwt_secret, PrincipalId::new());
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/market/items", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "name": "", "price": 100, "quantity": 1 }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], 100);
}

#[tokio::test]
async fn next_item_id_tracks_listings() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let token = mint_jwt(jwt_secret, PrincipalId::new());
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/market/items/next-id", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["next_item_id"], 1);

    for _ in 0..2 {
        let res = client
            .post(format!("{}/market/items", srv.base_url))
            .bearer_auth(&token)
            .json(&json!({ "name": "Grapes", "price": 100, "quantity": 9 }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    get_json_eventually(
        &client,
        &format!("{}/market/items/next-id", srv.base_url),
        &token,
        |v| v["next_item_id"] == 3,
    )
    .await;
}
