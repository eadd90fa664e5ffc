//! HTTP surface driven through the router.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_health() {
    let t = test_checkout(FailureMode::Healthy);
    let response = t.app().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["remote_store"], true);
}

#[tokio::test]
async fn test_plans_lists_catalog() {
    let t = test_checkout(FailureMode::Healthy);
    let response = t.app().oneshot(get("/plans")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let plans = json.as_array().unwrap();
    assert_eq!(plans.len(), 3);
    let monthly = plans.iter().find(|p| p["plan_type"] == "mensual").unwrap();
    assert_eq!(monthly["price"], "$2.99");
    assert_eq!(monthly["days"], 30);
    assert_eq!(monthly["provider_plan_id"], "P-18381349AF867540CNEVSH5I");
}

#[tokio::test]
async fn test_approve_returns_code_and_events() {
    let t = test_checkout(FailureMode::Healthy);
    t.pay(SUBSCRIPTION_ID, "year");
    let response = t
        .app()
        .oneshot(post_json(
            "/approve",
            &json!({
                "plan_type": "year",
                "subscription_id": SUBSCRIPTION_ID,
                "client_info": { "userAgent": "Mozilla/5.0", "language": "es-ES" }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let code = json["code"].as_str().unwrap();
    assert!(code.starts_with("ANIM1Y-"));
    assert_eq!(json["persistence"], "remote");
    assert_eq!(json["plan"]["days"], 365);
    assert!(json.get("notice").is_none());

    let events = json["events"].as_array().unwrap();
    assert_eq!(events.last().unwrap()["kind"], "code");
    assert_eq!(events.last().unwrap()["message"], code);

    let stored = t
        .remote
        .get(&activation_code_path(code))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["ClientInfo"]["language"], "es-ES");
}

#[tokio::test]
async fn test_approve_unpaid_subscription_is_refused() {
    let t = test_checkout(FailureMode::Healthy);
    let request = json!({ "plan_type": "year", "subscription_id": "I-NEVER-PAID" });

    for _ in 0..3 {
        let response = t.app().oneshot(post_json("/approve", &request)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["details"], msg::SUBSCRIPTION_NOT_APPROVED);
        assert!(json.get("code").is_none());
    }
    assert_eq!(t.remote.count_under(""), 0);
}

#[tokio::test]
async fn test_approve_replay_is_conflict() {
    let t = test_checkout(FailureMode::Healthy);
    t.pay(SUBSCRIPTION_ID, "year");
    let request = json!({ "plan_type": "year", "subscription_id": SUBSCRIPTION_ID });

    let response = t.app().oneshot(post_json("/approve", &request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = t.app().oneshot(post_json("/approve", &request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["details"], msg::ALREADY_ISSUED);
    assert_eq!(t.remote.count_under(ACTIVATION_CODES), 1);
}

#[tokio::test]
async fn test_approve_hashes_each_client_address() {
    let t = test_checkout_with(FailureMode::Healthy, FakeWidget::ready(), IpHasher::new("salt"));
    t.pay("I-FIRST", "mensual");
    t.pay("I-SECOND", "mensual");

    let mut hashes = Vec::new();
    let buyers = [
        ("I-FIRST", "203.0.113.7:51000"),
        ("I-SECOND", "198.51.100.23:51000"),
    ];
    for (subscription_id, peer) in buyers {
        let request = post_json(
            "/approve",
            &json!({ "plan_type": "mensual", "subscription_id": subscription_id }),
        );
        let response = t.app().oneshot(from_peer(request, peer)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let code = body_json(response).await["code"].as_str().unwrap().to_string();
        let stored = t
            .remote
            .get(&activation_code_path(&code))
            .await
            .unwrap()
            .unwrap();
        hashes.push(stored["IPHash"].as_str().unwrap().to_string());
    }

    assert_eq!(hashes[0], hash_ip("203.0.113.7", "salt"));
    assert_ne!(hashes[0], hashes[1]);
}

#[tokio::test]
async fn test_forwarded_for_used_only_behind_trusted_proxy() {
    let t = test_checkout_with(FailureMode::Healthy, FakeWidget::ready(), IpHasher::new("salt"));
    t.pay("I-DIRECT", "year");
    t.pay("I-PROXIED", "year");

    let approve = |subscription_id: &str| {
        let mut request = post_json(
            "/approve",
            &json!({ "plan_type": "year", "subscription_id": subscription_id }),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        from_peer(request, "10.0.0.1:40000")
    };

    let direct = t.app().oneshot(approve("I-DIRECT")).await.unwrap();
    let proxied = test_app_behind_proxy(t.checkout.clone())
        .oneshot(approve("I-PROXIED"))
        .await
        .unwrap();

    let mut stored = Vec::new();
    for response in [direct, proxied] {
        assert_eq!(response.status(), StatusCode::OK);
        let code = body_json(response).await["code"].as_str().unwrap().to_string();
        stored.push(t.remote.get(&activation_code_path(&code)).await.unwrap().unwrap());
    }

    assert_eq!(stored[0]["IPHash"], hash_ip("10.0.0.1", "salt"));
    assert_eq!(stored[1]["IPHash"], hash_ip("203.0.113.7", "salt"));
}

#[tokio::test]
async fn test_approve_without_subscription_id_is_bad_request() {
    let t = test_checkout(FailureMode::Healthy);
    let response = t
        .app()
        .oneshot(post_json(
            "/approve",
            &json!({ "plan_type": "year", "subscription_id": "" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["details"], msg::MISSING_SUBSCRIPTION_ID);
    assert_eq!(t.remote.count_under(""), 0);
}

#[tokio::test]
async fn test_malformed_body_is_json_error() {
    let t = test_checkout(FailureMode::Healthy);
    let response = t
        .app()
        .oneshot(post_json("/approve", &json!({ "plan": "year" })))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    let json = body_json(response).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_approve_local_only_carries_notice() {
    let bare = local_only_checkout();
    bare.widget.pay(SUBSCRIPTION_ID, "mensual");
    let response = test_app(bare.checkout)
        .oneshot(post_json(
            "/approve",
            &json!({ "plan_type": "mensual", "subscription_id": SUBSCRIPTION_ID }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["persistence"], "local_only");
    assert!(json["notice"].as_str().unwrap().contains("support@example.com"));
    assert_eq!(bare.ledger.len(), 1);
}

#[tokio::test]
async fn test_subscribe_endpoint() {
    let t = test_checkout(FailureMode::Healthy);
    let response = t
        .app()
        .oneshot(post_json("/subscribe", &json!({ "plan_type": "3meses" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["subscription_id"], "I-TEST000001");
    assert_eq!(json["status"], "APPROVAL_PENDING");
}

#[tokio::test]
async fn test_subscribe_without_widget_is_unavailable() {
    let checkout = Checkout::new(
        PlanCatalog::default(),
        IssuerOptions::default(),
        None,
        Arc::new(OfflineLedger::in_memory()),
        None,
        CheckoutSettings::default(),
    );
    let response = test_app(Arc::new(checkout))
        .oneshot(post_json("/subscribe", &json!({ "plan_type": "3meses" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["details"], msg::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_code_status_remote_offline_and_missing() {
    let t = test_checkout(FailureMode::Healthy);
    t.pay(SUBSCRIPTION_ID, "mensual");
    t.pay("I-OFFLINE", "mensual");
    let (mut session, _) = t.session();
    let remote_code = session
        .approve("mensual", SUBSCRIPTION_ID, None)
        .await
        .unwrap()
        .code;

    t.remote.set_failure(FailureMode::FailWritesUnder(ACTIVATION_CODES.to_string()));
    let offline_code = session
        .approve("mensual", "I-OFFLINE", None)
        .await
        .unwrap()
        .code;
    t.remote.set_failure(FailureMode::Healthy);

    let response = t
        .app()
        .oneshot(get(&format!("/codes/{}", remote_code)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["source"], "remote");
    assert_eq!(json["is_used"], false);
    assert_eq!(json["plan"], "1 Mes");

    let response = t
        .app()
        .oneshot(get(&format!("/codes/{}", offline_code)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["source"], "offline");

    let response = t
        .app()
        .oneshot(get("/codes/ANIM1M-LOYW3V28-ZZZZ"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = t.app().oneshot(get("/codes/not-a-code")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
