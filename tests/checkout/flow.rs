//! Session flow: subscribe, approve, fallbacks and what the buyer sees.

use std::sync::Arc;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_approve_stores_logs_and_displays() {
    let t = test_checkout(FailureMode::Healthy);
    t.pay(SUBSCRIPTION_ID, "mensual");
    let (mut session, presenter) = t.session();

    let outcome = session
        .approve("mensual", SUBSCRIPTION_ID, None)
        .await
        .unwrap();

    assert_eq!(outcome.persistence, Persistence::Remote);
    assert_eq!(outcome.plan_type, "mensual");
    assert!(outcome.code.as_str().starts_with("ANIM1M-"));
    assert_eq!(outcome.session_id, session.id());
    assert_eq!(t.remote.count_under(ACTIVATION_CODES), 1);
    assert_eq!(t.remote.count_under(TRANSACTION_LOGS), 1);
    assert_eq!(t.remote.count_under(ISSUED_SUBSCRIPTIONS), 1);
    assert!(t.ledger.is_empty());

    let events = presenter.events();
    assert_eq!(events.first(), Some(&PresenterEvent::Loading(msg::GENERATING_CODE.to_string())));
    assert_eq!(events.last(), Some(&PresenterEvent::Code(outcome.code.to_string())));
    assert!(presenter.errors().is_empty());
}

#[tokio::test]
async fn test_transient_failure_still_delivers_code() {
    let t = test_checkout(FailureMode::Unreachable);
    t.pay(SUBSCRIPTION_ID, "year");
    let (mut session, presenter) = t.session();

    let outcome = session
        .approve("year", SUBSCRIPTION_ID, None)
        .await
        .unwrap();

    assert_eq!(outcome.persistence, Persistence::Offline);
    assert!(outcome.notice.is_none());
    assert!(!session.is_local_only(), "transient errors keep the remote store in play");
    assert_eq!(t.ledger.len(), 1);
    assert!(t.ledger.contains(outcome.code.as_str()));
    assert!(presenter.errors().is_empty());
}

#[tokio::test]
async fn test_configuration_error_falls_back_for_rest_of_session() {
    let t = test_checkout(FailureMode::Unauthorized);
    t.pay(SUBSCRIPTION_ID, "mensual");
    t.pay("I-SECOND", "mensual");
    let (mut session, presenter) = t.session();

    let first = session
        .approve("mensual", SUBSCRIPTION_ID, None)
        .await
        .unwrap();
    assert_eq!(first.persistence, Persistence::LocalOnly);
    assert!(session.is_local_only());

    let notice = first.notice.clone().unwrap();
    assert!(notice.contains("support@example.com"));
    assert!(notice.contains(SUBSCRIPTION_ID));
    assert_eq!(presenter.errors(), vec![notice]);

    // Remote recovers, but this session no longer uses it
    t.remote.set_failure(FailureMode::Healthy);
    let second = session
        .approve("mensual", "I-SECOND", None)
        .await
        .unwrap();
    assert_eq!(second.persistence, Persistence::LocalOnly);
    assert_eq!(t.remote.count_under(""), 0);
    assert_eq!(t.ledger.len(), 2);
}

#[tokio::test]
async fn test_collisions_are_regenerated() {
    let bare = checkout_over(Arc::new(CollidingStore::new(2)));
    bare.widget.pay(SUBSCRIPTION_ID, "3meses");
    let presenter = Arc::new(RecordingPresenter::new());
    let mut session = bare.checkout.session(presenter.clone());

    let outcome = session
        .approve("3meses", SUBSCRIPTION_ID, None)
        .await
        .unwrap();

    assert_eq!(outcome.persistence, Persistence::Remote);
    assert_eq!(session.attempts(), 3);
}

#[tokio::test]
async fn test_endless_collisions_give_up() {
    let bare = checkout_over(Arc::new(CollidingStore::new(usize::MAX)));
    bare.widget.pay(SUBSCRIPTION_ID, "3meses");
    let presenter = Arc::new(RecordingPresenter::new());
    let mut session = bare.checkout.session(presenter.clone());

    let err = session
        .approve("3meses", SUBSCRIPTION_ID, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::GenerationCollision(_)));
    assert_eq!(session.attempts(), 5);
    assert!(bare.ledger.is_empty());

    let errors = presenter.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with(msg::ISSUANCE_FAILED));
    assert!(errors[0].contains("support@example.com"));
}

#[tokio::test]
async fn test_validation_errors_store_nothing() {
    let t = test_checkout(FailureMode::Healthy);
    t.pay(SUBSCRIPTION_ID, "mensual");
    let (mut session, presenter) = t.session();

    let err = session
        .approve("lifetime", SUBSCRIPTION_ID, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));

    let err = session.approve("mensual", "  ", None).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));

    let err = session
        .approve("mensual", "I-1/../ActivationCodes", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));

    assert_eq!(t.remote.count_under(""), 0);
    assert!(t.ledger.is_empty());
    assert_eq!(
        presenter.errors(),
        vec![
            msg::UNKNOWN_PLAN.to_string(),
            msg::MISSING_SUBSCRIPTION_ID.to_string(),
            msg::INVALID_SUBSCRIPTION_ID.to_string(),
        ]
    );
    // Loading is always hidden again
    let hidden = presenter
        .events()
        .into_iter()
        .filter(|e| *e == PresenterEvent::LoadingHidden)
        .count();
    assert_eq!(hidden, 3);
}

#[tokio::test]
async fn test_fabricated_subscription_gets_no_code() {
    let t = test_checkout(FailureMode::Healthy);
    let (mut session, presenter) = t.session();

    let err = session
        .approve("year", "I-NEVER-PAID", None)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(ref m) if m == msg::SUBSCRIPTION_NOT_APPROVED));
    assert_eq!(session.attempts(), 0);
    assert_eq!(t.remote.count_under(""), 0);
    assert!(t.ledger.is_empty());
    assert_eq!(presenter.errors(), vec![msg::SUBSCRIPTION_NOT_APPROVED.to_string()]);
}

#[tokio::test]
async fn test_pending_subscription_gets_no_code() {
    let t = test_checkout_with(FailureMode::Healthy, FakeWidget::ready(), IpHasher::disabled());
    let (mut session, _) = t.session();

    // Created but never approved by the buyer
    let subscription = session.subscribe("mensual").await.unwrap().unwrap();
    let err = session
        .approve("mensual", &subscription.id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(ref m) if m == msg::SUBSCRIPTION_NOT_APPROVED));
    assert_eq!(t.remote.count_under(ACTIVATION_CODES), 0);
}

#[tokio::test]
async fn test_subscription_for_another_plan_gets_no_code() {
    let t = test_checkout(FailureMode::Healthy);
    t.pay(SUBSCRIPTION_ID, "mensual");
    let (mut session, _) = t.session();

    let err = session
        .approve("year", SUBSCRIPTION_ID, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(ref m) if m == msg::SUBSCRIPTION_PLAN_MISMATCH));
    assert_eq!(t.remote.count_under(""), 0);
}

#[tokio::test]
async fn test_replayed_subscription_gets_one_code() {
    let t = test_checkout(FailureMode::Healthy);
    t.pay(SUBSCRIPTION_ID, "year");

    let (mut first, _) = t.session();
    first.approve("year", SUBSCRIPTION_ID, None).await.unwrap();

    // A fresh session, as a second request would get
    let (mut second, presenter) = t.session();
    let err = second
        .approve("year", SUBSCRIPTION_ID, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Conflict(_)));
    assert_eq!(presenter.errors(), vec![msg::ALREADY_ISSUED.to_string()]);
    assert_eq!(t.remote.count_under(ACTIVATION_CODES), 1);
}

#[tokio::test]
async fn test_replay_of_offline_code_is_refused() {
    let t = test_checkout(FailureMode::Unreachable);
    t.pay(SUBSCRIPTION_ID, "mensual");

    let (mut session, _) = t.session();
    let outcome = session
        .approve("mensual", SUBSCRIPTION_ID, None)
        .await
        .unwrap();
    assert_eq!(outcome.persistence, Persistence::Offline);

    t.remote.set_failure(FailureMode::Healthy);
    let (mut session, _) = t.session();
    let err = session
        .approve("mensual", SUBSCRIPTION_ID, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Conflict(_)));
    assert_eq!(t.ledger.len(), 1);
    assert_eq!(t.remote.count_under(ACTIVATION_CODES), 0);
}

#[tokio::test]
async fn test_without_remote_store_session_starts_local_only() {
    let bare = local_only_checkout();
    bare.widget.pay(SUBSCRIPTION_ID, "year");
    let presenter = Arc::new(RecordingPresenter::new());
    let mut session = bare.checkout.session(presenter.clone());
    assert!(session.is_local_only());

    let outcome = session
        .approve("year", SUBSCRIPTION_ID, None)
        .await
        .unwrap();
    assert_eq!(outcome.persistence, Persistence::LocalOnly);
    assert!(outcome.notice.is_some());

    let entries = bare.ledger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].record.subscription_id, SUBSCRIPTION_ID);
    assert_eq!(entries[0].record.duration_days, 365);
}

#[tokio::test]
async fn test_subscribe_creates_subscription_and_debounces() {
    let t = test_checkout(FailureMode::Healthy);
    let (mut session, presenter) = t.session();

    let subscription = session.subscribe("year").await.unwrap().unwrap();
    assert_eq!(subscription.id, "I-TEST000001");
    assert!(subscription
        .approve_url
        .unwrap()
        .contains("P-3E203769WC9540323NEVSJ5Q"));
    assert_eq!(session.current_transaction(), Some("I-TEST000001"));
    assert_eq!(
        presenter.events(),
        vec![
            PresenterEvent::Loading(msg::CREATING_SUBSCRIPTION.to_string()),
            PresenterEvent::LoadingHidden,
        ]
    );

    // Double click
    assert!(session.subscribe("year").await.unwrap().is_none());
    assert_eq!(t.widget.created(), 1);
}

#[tokio::test]
async fn test_subscribe_unknown_plan() {
    let t = test_checkout(FailureMode::Healthy);
    let (mut session, _) = t.session();

    let err = session.subscribe("lifetime").await.unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));
    assert_eq!(t.widget.created(), 0);
}

#[tokio::test]
async fn test_widget_that_never_loads_times_out() {
    let widget = FakeWidget::never_ready();
    let checkout = Arc::new(Checkout::new(
        PlanCatalog::default(),
        IssuerOptions::default(),
        None,
        Arc::new(OfflineLedger::in_memory()),
        Some(widget.clone() as Arc<dyn PaymentWidget>),
        CheckoutSettings {
            widget_timeout: Duration::from_millis(200),
            ..Default::default()
        },
    ));
    let presenter = Arc::new(RecordingPresenter::new());
    let mut session = checkout.session(presenter.clone());

    let err = session.subscribe("mensual").await.unwrap_err();
    assert!(matches!(err, CheckoutError::Configuration(_)));
    assert_eq!(presenter.errors(), vec![msg::SERVICE_UNAVAILABLE.to_string()]);
    assert_eq!(widget.created(), 0);
}
