use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use reqwest::StatusCode;
use serde_json::json;

use rolegate_api::app::{AppState, build_app};
use rolegate_auth::{KeyIdScheme, KeyStore, Role, RoleHierarchy, TokenConfig};
use rolegate_core::{ApplicationName, Username};
use rolegate_infra::InMemoryDirectory;
use rolegate_infra::password::hash_password;

const PRIMARY_PRIVATE: &str = include_str!("../../auth/testdata/primary_private.pem");
const PRIMARY_PUBLIC: &str = include_str!("../../auth/testdata/primary_public.pem");

const ISSUER: &str = "https://id.rolegate.test";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = build_app(test_state());
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

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn user(name: &str) -> Username {
    Username::new(name).unwrap()
}

fn app(name: &str) -> ApplicationName {
    ApplicationName::new(name).unwrap()
}

/// alice: SYSTEM in portal; bob: USER in portal; carol: only in the inactive archive.
fn test_state() -> AppState {
    let keys = KeyStore::load(
        PRIMARY_PRIVATE.as_bytes(),
        PRIMARY_PUBLIC.as_bytes(),
        &KeyIdScheme::Thumbprint,
        Utc::now(),
    )
    .unwrap();

    let directory = InMemoryDirectory::new();
    for name in ["alice", "bob", "carol"] {
        directory
            .upsert_user(user(name), hash_password(&format!("{name}-pw")).unwrap())
            .unwrap();
    }
    directory.upsert_application(app("portal"), true).unwrap();
    directory.upsert_application(app("archive"), false).unwrap();
    directory.grant(&app("portal"), &user("alice"), Role::SYSTEM).unwrap();
    directory.grant(&app("portal"), &user("bob"), Role::USER).unwrap();
    directory.grant(&app("archive"), &user("carol"), Role::ADMIN).unwrap();

    let tokens = TokenConfig {
        issuer: ISSUER.to_string(),
        ..TokenConfig::default()
    };

    AppState::with_directory(keys, tokens, Arc::new(directory), RoleHierarchy::standard())
}

async fn login(
    client: &reqwest::Client,
    srv: &TestServer,
    username: &str,
    password: &str,
    application: &str,
) -> reqwest::Response {
    client
        .post(srv.url("/auth/login"))
        .basic_auth(username, Some(password))
        .header("X-Application-Name", application)
        .send()
        .await
        .unwrap()
}

async fn login_ok(client: &reqwest::Client, srv: &TestServer, username: &str) -> serde_json::Value {
    let res = login(client, srv, username, &format!("{username}-pw"), "portal").await;
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

async fn fetch_jwks(client: &reqwest::Client, srv: &TestServer) -> serde_json::Value {
    client
        .get(srv.url("/.well-known/jwks.json"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Verify a token the way a downstream service would: key from JWKS by `kid`.
fn verify_with_jwks(jwks: &serde_json::Value, token: &str) -> serde_json::Value {
    let header = jsonwebtoken::decode_header(token).unwrap();
    assert_eq!(header.alg, Algorithm::RS256);
    let kid = header.kid.expect("token header carries a kid");

    let jwk = jwks["keys"]
        .as_array()
        .unwrap()
        .iter()
        .find(|k| k["kid"] == kid.as_str())
        .expect("kid is published in the JWKS");
    let key = DecodingKey::from_rsa_components(
        jwk["n"].as_str().unwrap(),
        jwk["e"].as_str().unwrap(),
    )
    .unwrap();

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_aud = false;
    jsonwebtoken::decode::<serde_json::Value>(token, &key, &validation)
        .unwrap()
        .claims
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_issues_tokens_with_expanded_roles() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let body = login_ok(&client, &srv, "alice").await;
    assert_eq!(body["expiresIn"], 3600);
    let access = body["accessToken"].as_str().unwrap();
    let refresh = body["refreshToken"].as_str().unwrap();

    let jwks = fetch_jwks(&client, &srv).await;
    let claims = verify_with_jwks(&jwks, access);
    assert_eq!(claims["sub"], "alice");
    assert_eq!(claims["aud"], "portal");
    assert_eq!(claims["roles"], json!(["ADMIN", "SYSTEM", "USER"]));
    assert!(claims.get("type").is_none());

    let refresh_claims = verify_with_jwks(&jwks, refresh);
    assert_eq!(refresh_claims["type"], "refresh");
    assert!(refresh_claims.get("roles").is_none());
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let cases = [
        ("alice", "wrong", "portal"),
        ("mallory", "mallory-pw", "portal"),
        ("carol", "carol-pw", "archive"),
        ("mallory", "mallory-pw", "archive"),
        ("alice", "alice-pw", "nowhere"),
        ("carol", "carol-pw", "portal"),
    ];

    let mut bodies = Vec::new();
    for (username, password, application) in cases {
        let res = login(&client, &srv, username, password, application).await;
        assert_eq!(
            res.status(),
            StatusCode::UNAUTHORIZED,
            "{username}@{application}"
        );
        bodies.push(res.json::<serde_json::Value>().await.unwrap());
    }
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn login_requires_application_header_and_basic_auth() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/login"))
        .basic_auth("alice", Some("alice-pw"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/auth/login"))
        .header("X-Application-Name", "portal")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_rotates_the_pair() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let first = login_ok(&client, &srv, "bob").await;
    let res = client
        .post(srv.url("/auth/refresh"))
        .json(&json!({ "refreshToken": first["refreshToken"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let second: serde_json::Value = res.json().await.unwrap();
    assert_ne!(second["accessToken"], first["accessToken"]);
    assert_ne!(second["refreshToken"], first["refreshToken"]);

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(second["accessToken"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: serde_json::Value = res.json().await.unwrap();
    assert_eq!(me["subject"], "bob");
    assert_eq!(me["roles"], json!(["USER"]));
}

#[tokio::test]
async fn refresh_rejects_access_tokens_and_garbage() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let pair = login_ok(&client, &srv, "bob").await;

    let res = client
        .post(srv.url("/auth/refresh"))
        .json(&json!({ "refreshToken": pair["accessToken"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/auth/refresh"))
        .json(&json!({ "refreshToken": "not.a.token" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/auth/refresh"))
        .json(&json!({ "token": "missing field" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn jwks_is_cacheable_and_conditional() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/.well-known/jwks.json"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()["cache-control"].to_str().unwrap(),
        "public, max-age=3600"
    );
    let etag = res.headers()["etag"].to_str().unwrap().to_string();

    let body: serde_json::Value = res.json().await.unwrap();
    let keys = body["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    let key = &keys[0];
    assert_eq!(key["kty"], "RSA");
    assert_eq!(key["use"], "sig");
    assert_eq!(key["alg"], "RS256");
    assert_eq!(key["e"], "AQAB");
    assert!(!key["kid"].as_str().unwrap().is_empty());

    // kid is stable across calls.
    let again = fetch_jwks(&client, &srv).await;
    assert_eq!(again["keys"][0]["kid"], key["kid"]);

    let res = client
        .get(srv.url("/.well-known/jwks.json"))
        .header("If-None-Match", &etag)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(res.headers()["etag"].to_str().unwrap(), etag);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let pair = login_ok(&client, &srv, "bob").await;
    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(pair["refreshToken"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn application_header_must_match_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let pair = login_ok(&client, &srv, "bob").await;
    let token = pair["accessToken"].as_str().unwrap();

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .header("X-Application-Name", "portal")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .header("X-Application-Name", "archive")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn person_access_follows_capabilities() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let bob = login_ok(&client, &srv, "bob").await;
    let bob_token = bob["accessToken"].as_str().unwrap();
    let alice = login_ok(&client, &srv, "alice").await;
    let alice_token = alice["accessToken"].as_str().unwrap();

    // Own record.
    let res = client
        .get(srv.url("/persons/bob"))
        .bearer_auth(bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Someone else's record without ADMIN.
    let res = client
        .get(srv.url("/persons/alice"))
        .bearer_auth(bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    // SYSTEM implies ADMIN.
    let res = client
        .get(srv.url("/persons/bob"))
        .bearer_auth(alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["username"], "bob");
    assert_eq!(body["requestedBy"], "alice");
}
