//! End-to-end request pipeline tests: extraction, validation, handler
//! dispatch and error mapping over real HTTP.

use arpia::prelude::*;
use arpia::testing::TestClient;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// -- Login: body extraction and input validation --

#[derive(Debug, Serialize, Deserialize, ApiType)]
struct LoginRequest {
    #[validate("required,email")]
    email: String,
    #[validate("required,min=6")]
    password: String,
}

#[derive(Debug, Serialize, Deserialize, ApiType)]
struct LoginResponse {
    token: String,
}

async fn login(_ctx: Ctx, req: LoginRequest) -> Result<LoginResponse> {
    if req.password == "letmein" {
        return Err(Error::unauthorized("bad credentials"));
    }
    Ok(LoginResponse {
        token: format!("token-for-{}", req.email),
    })
}

fn login_app() -> Arpia {
    Arpia::new().post(
        "/auth/login",
        login,
        RouteOpts::new().response::<LoginResponse>(),
    )
}

#[tokio::test]
async fn test_login_valid_body_returns_200() {
    let client = TestClient::new(login_app()).await;
    let response = client
        .post("/auth/login")
        .json(&json!({"email": "ada@example.com", "password": "hunter22"}))
        .send()
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["token"], "token-for-ada@example.com");
}

#[tokio::test]
async fn test_login_invalid_fields_return_422_with_details() {
    let client = TestClient::new(login_app()).await;
    let response = client
        .post("/auth/login")
        .json(&json!({"email": "not-an-email", "password": "abc"}))
        .send()
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error"], "Validation failed");
    let details = body["details"].as_array().unwrap();
    assert_eq!(details.len(), 2);
    assert!(details.iter().any(|d| d["field"] == "email" && d["tag"] == "email"));
    assert!(details.iter().any(|d| d["field"] == "password" && d["tag"] == "min"));
}

#[tokio::test]
async fn test_login_missing_json_body_returns_400() {
    let client = TestClient::new(login_app()).await;
    let response = client
        .post("/auth/login")
        .header("content-type", "application/json")
        .send()
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Invalid request");
    assert_eq!(body["details"][0]["field"], "body");
}

#[tokio::test]
async fn test_login_malformed_json_returns_400() {
    let client = TestClient::new(login_app()).await;
    let response = client
        .post("/auth/login")
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_handler_error_keeps_status_and_message() {
    let client = TestClient::new(login_app()).await;
    let response = client
        .post("/auth/login")
        .json(&json!({"email": "ada@example.com", "password": "letmein"}))
        .send()
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "bad credentials");
}

// -- Multi-source extraction: path, query, header --

#[derive(Debug, Serialize, Deserialize, ApiType)]
struct FetchUserRequest {
    #[bind("path:user_id")]
    user_id: i64,
    #[bind("query:verbose,default:false")]
    verbose: bool,
    #[bind("header:Authorization,required")]
    token: String,
}

async fn fetch_user(_ctx: Ctx, req: FetchUserRequest) -> Result<Value> {
    Ok(json!({
        "user_id": req.user_id,
        "verbose": req.verbose,
        "token": req.token,
    }))
}

fn users_app() -> Arpia {
    Arpia::new().get("/users/:user_id", fetch_user, RouteOpts::new())
}

#[tokio::test]
async fn test_path_and_header_extraction_with_query_default() {
    let client = TestClient::new(users_app()).await;
    let response = client
        .get("/users/42")
        .header("Authorization", "Bearer abc")
        .send()
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["user_id"], 42);
    assert_eq!(body["verbose"], false);
    assert_eq!(body["token"], "Bearer abc");
}

#[tokio::test]
async fn test_query_value_overrides_default() {
    let client = TestClient::new(users_app()).await;
    let response = client
        .get("/users/42?verbose=true")
        .header("Authorization", "Bearer abc")
        .send()
        .await;

    let body: Value = response.json();
    assert_eq!(body["verbose"], true);
}

#[tokio::test]
async fn test_missing_required_header_returns_400() {
    let client = TestClient::new(users_app()).await;
    let response = client.get("/users/42").send().await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["details"][0]["field"], "token");
}

#[tokio::test]
async fn test_uncoercible_path_param_returns_400() {
    let client = TestClient::new(users_app()).await;
    let response = client
        .get("/users/forty-two")
        .header("Authorization", "Bearer abc")
        .send()
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["details"][0]["field"], "user_id");
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let client = TestClient::new(users_app()).await;
    let response = client.get("/nope").send().await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Cookie extraction --

#[derive(Debug, Serialize, Deserialize, ApiType)]
struct SessionRequest {
    #[bind("cookie:session_id,required")]
    session_id: String,
    #[bind("cookie:theme,default:light")]
    theme: String,
}

async fn session_info(_ctx: Ctx, req: SessionRequest) -> Result<Value> {
    Ok(json!({"session_id": req.session_id, "theme": req.theme}))
}

fn session_app() -> Arpia {
    Arpia::new().get("/session", session_info, RouteOpts::new())
}

#[tokio::test]
async fn test_cookie_extraction_with_default() {
    let client = TestClient::new(session_app()).await;
    let response = client
        .get("/session")
        .header("cookie", "other=x; session_id=abc123")
        .send()
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["session_id"], "abc123");
    assert_eq!(body["theme"], "light");
}

#[tokio::test]
async fn test_missing_required_cookie_returns_400() {
    let client = TestClient::new(session_app()).await;
    let response = client.get("/session").send().await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["details"][0]["field"], "session_id");
}

// -- Query binding survives re-encoding --

#[derive(Debug, PartialEq, Serialize, Deserialize, ApiType)]
struct SearchRequest {
    #[bind("query:term")]
    term: String,
    #[bind("query:page")]
    page: i64,
    #[bind("query:exact")]
    exact: bool,
    #[bind("query:boost")]
    boost: f64,
}

async fn search(_ctx: Ctx, req: SearchRequest) -> Result<SearchRequest> {
    Ok(req)
}

#[tokio::test]
async fn test_query_record_survives_reencoding() {
    let app = Arpia::new().get("/search", search, RouteOpts::new());
    let client = TestClient::new(app).await;

    let first: SearchRequest = client
        .get("/search?term=rust%20web&page=3&exact=true&boost=1.5")
        .send()
        .await
        .json();
    assert_eq!(first.term, "rust web");
    assert_eq!(first.page, 3);
    assert!(first.exact);
    assert_eq!(first.boost, 1.5);

    // Re-emitting the bound values as a query string and binding again
    // yields the same record.
    let requery = serde_urlencoded::to_string(&first).unwrap();
    let second: SearchRequest = client
        .get(&format!("/search?{}", requery))
        .send()
        .await
        .json();
    assert_eq!(first, second);
}

// -- Form-encoded bodies --

#[derive(Debug, Serialize, Deserialize, ApiType)]
struct SubscribeRequest {
    #[bind("form:email")]
    #[validate("required,email")]
    email: String,
}

async fn subscribe(_ctx: Ctx, req: SubscribeRequest) -> Result<Value> {
    Ok(json!({"subscribed": req.email}))
}

#[tokio::test]
async fn test_form_encoded_body_extraction() {
    let app = Arpia::new().post("/subscribe", subscribe, RouteOpts::new());
    let client = TestClient::new(app).await;
    let response = client
        .post("/subscribe")
        .header("content-type", "application/x-www-form-urlencoded")
        .body("email=ada%40example.com")
        .send()
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["subscribed"], "ada@example.com");
}

// -- Custom rules --

#[derive(Debug, Serialize, Deserialize, ApiType)]
struct SeatRequest {
    #[validate("required,even")]
    seats: i64,
}

async fn reserve(_ctx: Ctx, req: SeatRequest) -> Result<Value> {
    Ok(json!({"seats": req.seats}))
}

#[tokio::test]
async fn test_custom_rule_rejects_and_accepts() {
    let app = Arpia::new()
        .rule("even", |value, _| {
            value.as_i64().is_some_and(|n| n % 2 == 0)
        })
        .post("/reserve", reserve, RouteOpts::new());
    let client = TestClient::new(app).await;

    let response = client
        .post("/reserve")
        .json(&json!({"seats": 3}))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["details"][0]["tag"], "even");

    let response = client
        .post("/reserve")
        .json(&json!({"seats": 4}))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// -- Response validation --

#[derive(Debug, Serialize, Deserialize, ApiType)]
struct Profile {
    #[validate("required,min=1")]
    name: String,
}

async fn broken_profile(_ctx: Ctx) -> Result<Profile> {
    // Violates the declared response contract on purpose.
    Ok(Profile {
        name: String::new(),
    })
}

#[tokio::test]
async fn test_invalid_response_is_replaced_by_500() {
    let app = Arpia::new().get(
        "/profile",
        broken_profile,
        RouteOpts::new().response::<Profile>(),
    );
    let client = TestClient::new(app).await;
    let response = client.get("/profile").send().await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"], "Response validation failed");
    assert_eq!(body["details"][0]["field"], "name");
}

// -- Handlers without an input record --

async fn health(_ctx: Ctx) -> Result<Value> {
    Ok(json!({"status": "ok"}))
}

#[tokio::test]
async fn test_context_only_handler() {
    let app = Arpia::new().get("/health", health, RouteOpts::new());
    let client = TestClient::new(app).await;
    let response = client.get("/health").send().await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
}

// -- Middleware --

#[tokio::test]
async fn test_middleware_can_reject_before_handler() {
    let deny = |ctx: Ctx, next: Next| -> arpia::BoxFuture {
        Box::pin(async move {
            if ctx.header("x-api-key") != Some("secret") {
                return Error::unauthorized("missing api key").into_response();
            }
            next.run(ctx).await
        })
    };
    let app = Arpia::new()
        .middleware(deny)
        .get("/health", health, RouteOpts::new());
    let client = TestClient::new(app).await;

    let response = client.get("/health").send().await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get("/health")
        .header("x-api-key", "secret")
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// -- Route groups --

#[tokio::test]
async fn test_group_routes_resolve_under_prefix() {
    let app = Arpia::new().group("/api", |g| g.get("/health", health, RouteOpts::new()));
    let client = TestClient::new(app).await;

    assert_eq!(client.get("/api/health").send().await.status(), StatusCode::OK);
    assert_eq!(client.get("/health").send().await.status(), StatusCode::NOT_FOUND);
}
