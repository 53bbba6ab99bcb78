//! End-to-end tests over the router: configuration validation, the auth
//! gate, and full encrypt-then-decrypt round trips.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use http_body_util::BodyExt as _;
use sealpost_pgp::{
    DecryptionKey, VerifierKey, decrypt_and_verify, testkeys::TestKeyBuilder,
};
use sealpost_server::{
    AppState, build_router,
    config::{FUNCTION_KEY, PASSPHRASE_SIGN, PRIVATE_KEY_SIGN, PUBLIC_KEY, StaticSecrets},
};
use tower::ServiceExt as _;

struct Harness {
    router: Router,
    decryption: DecryptionKey,
    verifier: VerifierKey,
}

fn harness_with(configure: impl FnOnce(StaticSecrets) -> StaticSecrets) -> Harness {
    let pair = TestKeyBuilder::from_seed(60).build();
    let secrets = configure(
        StaticSecrets::new()
            .with(PUBLIC_KEY, &STANDARD.encode(&pair.public_binary))
            .with(PRIVATE_KEY_SIGN, &STANDARD.encode(&pair.secret_binary)),
    );

    let state = AppState::new(Arc::new(secrets));
    Harness {
        router: build_router(Arc::new(state)),
        decryption: DecryptionKey::from_bytes(&pair.secret_binary, None).expect("decryption"),
        verifier: VerifierKey::from_bytes(&pair.public_binary).expect("verifier"),
    }
}

fn harness() -> Harness {
    harness_with(|secrets| secrets)
}

async fn post_encrypt(router: &Router, uri: &str, body: &[u8]) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::from(body.to_vec()))
        .expect("request");
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn encrypts_and_round_trips() {
    let harness = harness();
    let plaintext = b"the cargo arrives tuesday";

    let (status, message) = post_encrypt(&harness.router, "/encrypt", plaintext).await;
    assert_eq!(status, StatusCode::OK);
    assert!(message.starts_with(b"-----BEGIN PGP MESSAGE-----"));

    let mut recovered = Vec::new();
    decrypt_and_verify(
        &mut message.as_slice(),
        &mut recovered,
        &harness.decryption,
        &harness.verifier,
    )
    .expect("round trip");
    assert_eq!(recovered, plaintext);
}

#[tokio::test]
async fn empty_body_yields_a_valid_message() {
    let harness = harness();

    let (status, message) = post_encrypt(&harness.router, "/encrypt", b"").await;
    assert_eq!(status, StatusCode::OK);

    let mut recovered = Vec::new();
    decrypt_and_verify(
        &mut message.as_slice(),
        &mut recovered,
        &harness.decryption,
        &harness.verifier,
    )
    .expect("empty round trip");
    assert!(recovered.is_empty());
}

#[tokio::test]
async fn identical_requests_produce_different_messages() {
    let harness = harness();

    let (_, first) = post_encrypt(&harness.router, "/encrypt", b"same input").await;
    let (_, second) = post_encrypt(&harness.router, "/encrypt", b"same input").await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn json_body_is_protected_verbatim() {
    // A JSON envelope is still arbitrary content to protect; the
    // passPhrase field is read but the payload round-trips byte-for-byte
    let harness = harness();
    let body = br#"{"passPhrase": "ignored", "data": 7}"#;

    let (status, message) = post_encrypt(&harness.router, "/encrypt", body).await;
    assert_eq!(status, StatusCode::OK);

    let mut recovered = Vec::new();
    decrypt_and_verify(
        &mut message.as_slice(),
        &mut recovered,
        &harness.decryption,
        &harness.verifier,
    )
    .expect("round trip");
    assert_eq!(recovered, body);
}

#[tokio::test]
async fn missing_public_key_is_a_client_error() {
    let pair = TestKeyBuilder::from_seed(61).build();
    let secrets =
        StaticSecrets::new().with(PRIVATE_KEY_SIGN, &STANDARD.encode(&pair.secret_binary));
    let router = build_router(Arc::new(AppState::new(Arc::new(secrets))));

    let (status, body) = post_encrypt(&router, "/encrypt", b"payload").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).contains("pgp-public-key"));
}

#[tokio::test]
async fn missing_private_key_is_a_client_error() {
    let pair = TestKeyBuilder::from_seed(62).build();
    let secrets = StaticSecrets::new().with(PUBLIC_KEY, &STANDARD.encode(&pair.public_binary));
    let router = build_router(Arc::new(AppState::new(Arc::new(secrets))));

    let (status, body) = post_encrypt(&router, "/encrypt", b"payload").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).contains("pgp-private-key-sign"));
}

#[tokio::test]
async fn invalid_base64_configuration_is_a_client_error() {
    let pair = TestKeyBuilder::from_seed(63).build();
    let secrets = StaticSecrets::new()
        .with(PUBLIC_KEY, "%%% definitely not base64 %%%")
        .with(PRIVATE_KEY_SIGN, &STANDARD.encode(&pair.secret_binary));
    let router = build_router(Arc::new(AppState::new(Arc::new(secrets))));

    let (status, body) = post_encrypt(&router, "/encrypt", b"payload").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).contains("pgp-public-key"));
}

#[tokio::test]
async fn wrong_passphrase_is_a_client_error() {
    let pair = TestKeyBuilder::from_seed(64).passphrase("right").build();
    let secrets = StaticSecrets::new()
        .with(PUBLIC_KEY, &STANDARD.encode(&pair.public_binary))
        .with(PRIVATE_KEY_SIGN, &STANDARD.encode(&pair.secret_binary))
        .with(PASSPHRASE_SIGN, "wrong");
    let router = build_router(Arc::new(AppState::new(Arc::new(secrets))));

    let (status, body) = post_encrypt(&router, "/encrypt", b"payload").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).contains("passphrase"));
}

#[tokio::test]
async fn passphrase_protected_key_works_end_to_end() {
    let pair = TestKeyBuilder::from_seed(65).passphrase("correct horse").build();
    let secrets = StaticSecrets::new()
        .with(PUBLIC_KEY, &STANDARD.encode(&pair.public_binary))
        .with(PRIVATE_KEY_SIGN, &STANDARD.encode(&pair.secret_binary))
        .with(PASSPHRASE_SIGN, "correct horse");
    let router = build_router(Arc::new(AppState::new(Arc::new(secrets))));

    let (status, message) = post_encrypt(&router, "/encrypt", b"locked signer").await;
    assert_eq!(status, StatusCode::OK);

    let decryption =
        DecryptionKey::from_bytes(&pair.secret_binary, Some("correct horse")).expect("decryption");
    let verifier = VerifierKey::from_bytes(&pair.public_binary).expect("verifier");
    let mut recovered = Vec::new();
    decrypt_and_verify(&mut message.as_slice(), &mut recovered, &decryption, &verifier)
        .expect("round trip");
    assert_eq!(recovered, b"locked signer");
}

#[tokio::test]
async fn function_key_gate_rejects_without_key() {
    let harness = harness_with(|secrets| secrets.with(FUNCTION_KEY, "gatekeeper"));

    let (status, _) = post_encrypt(&harness.router, "/encrypt", b"payload").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn function_key_gate_accepts_header() {
    let harness = harness_with(|secrets| secrets.with(FUNCTION_KEY, "gatekeeper"));

    let request = Request::builder()
        .method("POST")
        .uri("/encrypt")
        .header("x-functions-key", "gatekeeper")
        .body(Body::from("payload"))
        .expect("request");
    let response = harness.router.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn function_key_gate_accepts_code_parameter() {
    let harness = harness_with(|secrets| secrets.with(FUNCTION_KEY, "gatekeeper"));

    let (status, _) = post_encrypt(&harness.router, "/encrypt?code=gatekeeper", b"payload").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let harness = harness_with(|secrets| secrets.with(FUNCTION_KEY, "gatekeeper"));

    let request =
        Request::builder().method("GET").uri("/health").body(Body::empty()).expect("request");
    let response = harness.router.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn tampered_response_fails_verification() {
    let harness = harness();

    let (_, message) = post_encrypt(&harness.router, "/encrypt", b"sensitive").await;

    // Corrupt one base64 character inside the armored body
    let text = String::from_utf8(message).expect("armored output is text");
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let body_line = lines.iter().position(|l| l.len() == 64).expect("a full base64 line");
    let flipped = if lines[body_line].starts_with('A') { 'B' } else { 'A' };
    lines[body_line].replace_range(0..1, &flipped.to_string());
    let tampered = lines.join("\n");

    let mut out = Vec::new();
    let result = decrypt_and_verify(
        &mut tampered.as_bytes(),
        &mut out,
        &harness.decryption,
        &harness.verifier,
    );
    assert!(result.is_err());
    assert!(out.is_empty());
}
