//! API endpoint integration tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::{
    FakeGenerator, authed, authed_json, body_bytes, body_json, build_test_router, setup_test_db,
};

fn plan_body(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "income": "5000",
        "expenses": [
            {"id": "e1", "category": "Rent", "amount": "1200"},
            {"id": "e2", "category": "Groceries", "amount": "400"}
        ],
        "plan_text": "Keep rent below a third of income.",
        "notes": ""
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_router(setup_test_db(), FakeGenerator::ok("unused"));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_ready_endpoint() {
    let app = build_test_router(setup_test_db(), FakeGenerator::ok("unused"));

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["checks"]["database"]["status"], "ok");
    assert_eq!(json["checks"]["generator"]["status"], "ok");
}

#[tokio::test]
async fn test_plans_require_authentication() {
    let app = build_test_router(setup_test_db(), FakeGenerator::ok("unused"));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/plans").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "unauthenticated");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/plans")
                .header("authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_plan_crud_round() {
    let app = build_test_router(setup_test_db(), FakeGenerator::ok("unused"));

    // Create
    let response = app
        .clone()
        .oneshot(authed_json("POST", "/api/plans", &plan_body("March")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["name"], "March");
    assert!(created["created_at"].is_string());

    // List
    let response = app
        .clone()
        .oneshot(authed("GET", "/api/plans").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());

    // Update replaces the whole record but keeps id and timestamp
    let mut replacement = plan_body("March (revised)");
    replacement["income"] = json!("5500");
    let response = app
        .clone()
        .oneshot(authed_json("PUT", &format!("/api/plans/{id}"), &replacement))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["id"], id.as_str());
    assert_eq!(updated["created_at"], created["created_at"]);
    assert_eq!(updated["income"], "5500");

    // Get
    let response = app
        .clone()
        .oneshot(authed("GET", &format!("/api/plans/{id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await["name"], "March (revised)");

    // Delete, twice: absent ids are a no-op
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(authed("DELETE", &format!("/api/plans/{id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = app
        .oneshot(authed("GET", &format!("/api/plans/{id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_missing_plan_is_not_found() {
    let app = build_test_router(setup_test_db(), FakeGenerator::ok("unused"));

    let response = app
        .oneshot(authed_json("PUT", "/api/plans/does-not-exist", &plan_body("x")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_generate_plan() {
    let generator = FakeGenerator::ok("Save <10%> & invest.\nCook at home.");
    let app = build_test_router(setup_test_db(), generator.clone());

    let request = json!({
        "income": 5000,
        "expenses": [
            {"category": "Rent", "amount": 1200},
            {"category": "Groceries", "amount": "400"}
        ],
        "notes": ""
    });
    let response = app
        .oneshot(authed_json("POST", "/api/plans/generate", &request))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let text = json["plan_text"].as_str().unwrap();
    assert!(text.contains("5000"));
    assert!(text.contains("1600"));

    let html = json["plan_html"].as_str().unwrap();
    assert!(html.contains("&lt;10%&gt; &amp; invest.<br>Cook"));
    assert!(!html.contains("<10%>"));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_generate_rejects_invalid_form_before_calling_provider() {
    let generator = FakeGenerator::ok("unused");
    let app = build_test_router(setup_test_db(), generator.clone());

    let request = json!({
        "income": "lots",
        "expenses": [{"category": "Rent", "amount": 1200}]
    });
    let response = app
        .clone()
        .oneshot(authed_json("POST", "/api/plans/generate", &request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"]["code"], "invalid_input");

    let request = json!({"income": 5000, "expenses": [{"category": "", "amount": 10}]});
    let response = app
        .oneshot(authed_json("POST", "/api/plans/generate", &request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_generate_rejects_total_beyond_decimal_range() {
    let generator = FakeGenerator::ok("unused");
    let app = build_test_router(setup_test_db(), generator.clone());

    let request = json!({
        "income": "1000",
        "expenses": [
            {"category": "Rent", "amount": "79228162514264337593543950335"},
            {"category": "Tax", "amount": "79228162514264337593543950335"}
        ]
    });
    let response = app
        .oneshot(authed_json("POST", "/api/plans/generate", &request))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert!(json["error"]["message"].as_str().unwrap().contains("too large"));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_generation_failure_creates_nothing() {
    let app = build_test_router(setup_test_db(), FakeGenerator::failing("upstream returned 500"));

    let request = json!({
        "income": 5000,
        "expenses": [{"category": "Rent", "amount": 1200}]
    });
    let response = app
        .clone()
        .oneshot(authed_json("POST", "/api/plans/generate", &request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "generation_failed");
    assert!(json["error"]["message"].as_str().unwrap().contains("500"));

    let response = app
        .oneshot(authed("GET", "/api/plans").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(body_json(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_voice_capabilities_without_auth() {
    let app = build_test_router(setup_test_db(), FakeGenerator::ok("unused"));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/voice/capabilities")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["stt_available"], true);
    assert_eq!(json["tts_available"], true);
}

#[tokio::test]
async fn test_synthesize_buffered_and_streamed() {
    let app = build_test_router(setup_test_db(), FakeGenerator::ok("unused"));

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            "/api/voice/synthesize",
            &json!({"text": "Hello", "voice": "nova"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");
    assert_eq!(&body_bytes(response).await[..], b"mp3:nova");

    let response = app
        .oneshot(authed_json(
            "POST",
            "/api/voice/synthesize",
            &json!({"text": "Hello", "stream": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("audio/L16")
    );
    assert_eq!(&body_bytes(response).await[..], &[1, 0, 2, 0, 3, 0]);
}

#[tokio::test]
async fn test_synthesize_rejects_empty_text() {
    let app = build_test_router(setup_test_db(), FakeGenerator::ok("unused"));

    let response = app
        .oneshot(authed_json("POST", "/api/voice/synthesize", &json!({"text": "  "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_transcribe_normalizes_for_target() {
    let app = build_test_router(setup_test_db(), FakeGenerator::ok("unused"));

    let response = app
        .clone()
        .oneshot(
            authed("POST", "/api/voice/transcribe?target=expense_amount")
                .header("content-type", "audio/webm")
                .body(Body::from(vec![0u8; 32]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["text"], "about 250 dollars");
    assert_eq!(json["value"], "250");

    let response = app
        .oneshot(
            authed("POST", "/api/voice/transcribe?target=notes")
                .body(Body::from(vec![0u8; 32]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await["value"], "about 250 dollars");
}

#[tokio::test]
async fn test_plans_are_scoped_to_token_user() {
    use budget_assistant::{Identity, PlanStore, SqlitePlanStore};

    let db = setup_test_db();
    let store = SqlitePlanStore::new(db.clone());
    let other = Identity::new("someone-else").unwrap();
    let foreign = store
        .create(Some(&other), serde_json::from_value(plan_body("Theirs")).unwrap())
        .unwrap();

    let app = build_test_router(db, FakeGenerator::ok("unused"));
    let response = app
        .clone()
        .oneshot(authed("GET", "/api/plans").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(body_json(response).await.as_array().unwrap().is_empty());

    let response = app
        .oneshot(
            authed("GET", &format!("/api/plans/{}", foreign.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

}
