//! Login guard behaviour through the service facade

use std::sync::Arc;
use std::time::Duration;

use agencyos_config::AgencyConfig;
use agencyos_errors::ErrorKind;
use agencyos_rbac::{ManualClock, User};
use agencyos_security::{InMemoryCredentialVerifier, LoginRequest, SecurityService, SecurityStores};

async fn service() -> (SecurityService, InMemoryCredentialVerifier, Arc<ManualClock>) {
    let verifier = InMemoryCredentialVerifier::new();
    let clock = ManualClock::starting_now();
    let service = SecurityService::new(
        AgencyConfig::default(),
        SecurityStores::in_memory(),
        Arc::new(verifier.clone()),
        clock.clone(),
    )
    .await
    .unwrap();
    (service, verifier, clock)
}

#[tokio::test]
async fn test_ip_counter_survives_other_accounts_success() {
    let (service, verifier, _clock) = service().await;
    let b = service
        .permission_store()
        .put_user(User::new("b@x.com"))
        .await
        .unwrap();
    verifier.insert("b@x.com", "correct", b.id);

    for _ in 0..5 {
        service
            .record_failed_login("a@x.com", Some("1.2.3.4"), None)
            .await
            .unwrap();
    }

    let decision = service
        .check_rate_limit("a@x.com", Some("1.2.3.4"))
        .await
        .unwrap();
    assert!(decision.blocked);
    assert_eq!(decision.email_attempts, 5);
    assert_eq!(decision.lockout_minutes, 15);

    // The IP is locked too, so b@x.com from the same origin is refused
    let err = service
        .login(LoginRequest::new("b@x.com", "correct").from_ip("1.2.3.4"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimit);

    // From elsewhere b@x.com logs in; the shared IP counter is untouched
    service
        .login(LoginRequest::new("b@x.com", "correct").from_ip("5.6.7.8"))
        .await
        .unwrap();
    let after = service
        .check_rate_limit("someone@x.com", Some("1.2.3.4"))
        .await
        .unwrap();
    assert!(after.blocked);
    assert_eq!(after.ip_attempts, 5);
}

#[tokio::test]
async fn test_lockout_expires_without_writes() {
    let (service, _verifier, clock) = service().await;
    for _ in 0..5 {
        service
            .record_failed_login("a@x.com", None, None)
            .await
            .unwrap();
    }

    clock.advance(Duration::from_secs(14 * 60));
    let still_locked = service.check_rate_limit("a@x.com", None).await.unwrap();
    assert!(still_locked.blocked);
    assert_eq!(still_locked.remaining_lockout_seconds, 60);

    clock.advance(Duration::from_secs(61));
    let open = service.check_rate_limit("a@x.com", None).await.unwrap();
    assert!(!open.blocked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_all_count() {
    let (service, _verifier, _clock) = service().await;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .record_failed_login("race@x.com", Some("9.9.9.9"), None)
                    .await
                    .unwrap()
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let decision = service
        .check_rate_limit("race@x.com", Some("9.9.9.9"))
        .await
        .unwrap();
    assert_eq!(decision.email_attempts, 4);
    assert_eq!(decision.ip_attempts, 4);
    assert!(!decision.blocked);
}
