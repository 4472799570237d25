//! Integration tests for the Firebase REST adapters using a wiremock server

use std::sync::Arc;

use serde_json::json;
use student_portal::auth::{
    AuthBackend, AuthError, AuthService, FirebaseIdentityProvider, FirestoreProfileStore, IdentityProvider,
    ProfileDocument, ProfileStore,
};
use student_portal::session::ClientInfo;
use student_portal::{Config, UserRole};
use wiremock::{
    matchers::{body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const DOC_PATH: &str = "/projects/portal-test/databases/(default)/documents/users/uid-1";

fn account(uid: &str, email: &str) -> serde_json::Value {
    json!({
        "kind": "identitytoolkit#VerifyPasswordResponse",
        "localId": uid,
        "email": email,
        "displayName": "",
        "idToken": "id-token-1",
        "registered": true,
        "refreshToken": "refresh-1",
        "expiresIn": "3600"
    })
}

#[tokio::test]
async fn test_sign_in_with_password_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signInWithPassword"))
        .and(query_param("key", "test-key"))
        .and(body_string_contains("\"returnSecureToken\":true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(account("uid-1", "t@school.edu")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = FirebaseIdentityProvider::new(server.uri(), "test-key");
    let user = provider.sign_in_with_password("t@school.edu", "secret1").await.unwrap();

    assert_eq!(user.uid, "uid-1");
    assert_eq!(user.email.as_deref(), Some("t@school.edu"));
    assert_eq!(user.display_name, None);
    assert_eq!(user.id_token, "id-token-1");
}

#[tokio::test]
async fn test_sign_in_wrong_password_is_invalid_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "INVALID_LOGIN_CREDENTIALS", "errors": []}
        })))
        .mount(&server)
        .await;

    let provider = FirebaseIdentityProvider::new(server.uri(), "test-key");
    let err = provider.sign_in_with_password("t@school.edu", "nope").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_sign_up_existing_email_is_provider_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signUp"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "EMAIL_EXISTS"}
        })))
        .mount(&server)
        .await;

    let provider = FirebaseIdentityProvider::new(server.uri(), "test-key");
    match provider.sign_up("t@school.edu", "secret1").await.unwrap_err() {
        AuthError::Provider { code, .. } => assert_eq!(code, "EMAIL_EXISTS"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_provider() {
    let provider = FirebaseIdentityProvider::new("http://127.0.0.1:9", "test-key");
    let err = provider.sign_in_with_password("t@school.edu", "secret1").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnavailable(_)));
}

#[tokio::test]
async fn test_idp_sign_in_sends_post_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signInWithIdp"))
        .and(body_string_contains("id_token=google-jwt&providerId=google.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "uid-g",
            "email": "alex@gmail.com",
            "displayName": "Alex",
            "photoUrl": "https://lh3/alex.png",
            "idToken": "id-token-g",
            "refreshToken": "refresh-g"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = FirebaseIdentityProvider::new(server.uri(), "test-key");
    let user = provider.sign_in_with_idp("google-jwt", "google.com").await.unwrap();
    assert_eq!(user.display_name.as_deref(), Some("Alex"));
    assert_eq!(user.photo_url.as_deref(), Some("https://lh3/alex.png"));
}

#[tokio::test]
async fn test_firestore_missing_document_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DOC_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "status": "NOT_FOUND"}
        })))
        .mount(&server)
        .await;

    let store = FirestoreProfileStore::new(server.uri(), "portal-test");
    assert!(store.get_profile("uid-1", None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_firestore_merge_uses_update_mask() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(DOC_PATH))
        .and(query_param("updateMask.fieldPaths", "displayName"))
        .and(header("authorization", "Bearer id-token-1"))
        .and(body_string_contains("\"stringValue\":\"Ms. T\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "doc"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = FirestoreProfileStore::new(server.uri(), "portal-test");
    let doc = ProfileDocument {
        display_name: Some("Ms. T".into()),
        ..Default::default()
    };
    store.merge_profile("uid-1", &doc, Some("id-token-1")).await.unwrap();
}

#[tokio::test]
async fn test_firestore_write_failure_is_profile_error() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(DOC_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
        .mount(&server)
        .await;

    let store = FirestoreProfileStore::new(server.uri(), "portal-test");
    let err = store
        .set_profile("uid-1", &ProfileDocument::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Profile(ref msg) if msg.contains("403")));
}

#[tokio::test]
async fn test_provider_sign_in_flow_end_to_end() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(account("uid-1", "t@school.edu")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DOC_PATH))
        .and(header("authorization", "Bearer id-token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/portal-test/databases/(default)/documents/users/uid-1",
            "fields": {
                "email": {"stringValue": "t@school.edu"},
                "displayName": {"stringValue": "Ms. Teacher"},
                "role": {"stringValue": "teacher"},
                "createdAt": {"timestampValue": "2023-09-01T08:30:00Z"}
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(DOC_PATH))
        .and(query_param("updateMask.fieldPaths", "lastLogin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.identity.demo_mode = false;
    let backend = AuthBackend::Provider {
        identity: Arc::new(FirebaseIdentityProvider::new(server.uri(), "test-key")),
        profiles: Arc::new(FirestoreProfileStore::new(server.uri(), "portal-test")),
    };
    let auth = AuthService::new(backend, &config, "test-secret");
    let mut ctx = auth.new_context(ClientInfo::default());

    let user = auth.sign_in(&mut ctx, "t@school.edu", "secret1").await.unwrap();
    assert_eq!(user.role, UserRole::Teacher);
    assert_eq!(user.display_name, "Ms. Teacher");
    assert_eq!(user.created_at.map(|t| t.to_rfc3339()), Some("2023-09-01T08:30:00+00:00".to_string()));
    assert!(auth.is_session_valid(&ctx));

    auth.sign_out(&mut ctx).await.unwrap();
    assert!(!auth.is_session_valid(&ctx));
}
