//! Architectural Contract Test: Domain Lifecycle
//!
//! This test verifies the domain reconciler end to end against a fake region:
//! - Create returns the domain as Mailgun reports it, DNS records included
//! - Creation-time options are applied after the domain exists
//! - Delete is confirmed before it returns, after which reads see nothing
//! - The data source treats absence as an error

mod common;

use common::*;
use mailgun_core::error::Error;
use mailgun_core::model::{DomainSpec, Region, SpamAction};
use mailgun_core::poll::PollPolicy;
use mailgun_core::resources::{DomainDataSource, DomainResource, Reconcile};
use std::time::Duration;

fn resource() -> DomainResource {
    DomainResource::new(PollPolicy::fixed(Duration::from_secs(300), Duration::from_secs(1)))
}

#[tokio::test]
async fn test_create_reads_back_remote_state() {
    let regions = fake_regions();
    let spec = DomainSpec::new("example.com")
        .with_wildcard(true)
        .with_spam_action(SpamAction::Disabled)
        .with_smtp_password("initial-smtp-password");

    let state = resource().create(&regions.clients, &spec).await.unwrap();

    assert_eq!(state.name, "example.com");
    assert_eq!(state.region, Region::Us);
    assert!(state.wildcard);
    assert_eq!(state.spam_action, SpamAction::Disabled);
    assert_eq!(state.smtp_login, "postmaster@example.com");
    assert_eq!(state.smtp_password.as_deref(), Some("initial-smtp-password"));
    assert!(!state.open_tracking);

    assert!(!state.sending_records.is_empty());
    let sending: Vec<&str> = state.sending_records.iter().map(|r| r.id.as_str()).collect();
    assert!(sending.contains(&"_domainkey.example.com"), "ids: {:?}", sending);

    let receiving: Vec<&str> = state.receiving_records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(receiving, vec!["mxa.mailgun.org", "mxb.mailgun.org"]);

    assert_eq!(regions.us.calls("update_dkim_selector"), 0);
    assert_eq!(regions.us.calls("update_open_tracking"), 0);
}

#[tokio::test]
async fn test_creation_options_applied_after_create() {
    let regions = fake_regions();
    let spec = DomainSpec::new("example.com")
        .with_dkim_selector("s1")
        .with_open_tracking(true)
        .with_dkim_key_size(2048);

    let state = resource().create(&regions.clients, &spec).await.unwrap();

    assert_eq!(regions.us.calls("create_domain"), 1);
    assert_eq!(regions.us.calls("update_dkim_selector"), 1);
    assert_eq!(regions.us.calls("update_open_tracking"), 1);
    assert!(state.open_tracking);
    assert_eq!(state.dkim_selector.as_deref(), Some("s1"));
    assert_eq!(state.dkim_key_size, Some(2048));

    let dkim = state
        .sending_records
        .iter()
        .find(|r| r.id == "_domainkey.example.com")
        .expect("DKIM record");
    assert_eq!(dkim.name, "s1._domainkey.example.com");

    // Carried forward on refresh even though Mailgun does not echo it
    let refreshed = resource()
        .read(&regions.clients, &state)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed, state);
}

#[tokio::test]
async fn test_create_in_eu_uses_eu_handle() {
    let regions = fake_regions();
    let spec = DomainSpec::new("example.eu").with_region(Region::Eu);

    let state = resource().create(&regions.clients, &spec).await.unwrap();

    assert_eq!(state.region, Region::Eu);
    assert!(regions.eu.has_domain("example.eu"));
    assert!(!regions.us.has_domain("example.eu"));
}

#[tokio::test]
async fn test_failed_create_reports_operation() {
    let regions = fake_regions();
    regions.us.fail_next("create_domain", "domain limit reached");

    let err = resource()
        .create(&regions.clients, &DomainSpec::new("example.com"))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "creating domain example.com: Mailgun API error: domain limit reached"
    );
    assert_eq!(regions.us.calls("get_domain"), 0);
}

#[tokio::test]
async fn test_invalid_spec_rejected_before_remote_call() {
    let regions = fake_regions();
    let spec = DomainSpec::new("example.com").with_dkim_key_size(4096);

    let err = resource().create(&regions.clients, &spec).await.unwrap_err();

    assert!(matches!(err, Error::Validation { .. }));
    assert_eq!(regions.us.calls("create_domain"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delete_then_absent() {
    let regions = fake_regions();
    let domains = resource();
    let state = domains
        .create(&regions.clients, &DomainSpec::new("example.com"))
        .await
        .unwrap();

    regions.us.linger_after_delete(2);
    let outcome = domains.delete(&regions.clients, &state, None).await.unwrap();

    assert_eq!(outcome.checks, 3);
    assert_eq!(outcome.elapsed, Duration::from_secs(2));
    assert!(domains.read(&regions.clients, &state).await.unwrap().is_none());
    assert!(!regions.us.has_domain("example.com"));
}

#[tokio::test]
async fn test_data_source_requires_existing_domain() {
    let regions = fake_regions();
    regions.us.seed_domain("example.com");

    let state = DomainDataSource
        .read(&regions.clients, "example.com", Region::Us)
        .await
        .unwrap();
    assert_eq!(state.smtp_login, "postmaster@example.com");
    assert_eq!(state.smtp_password, None);

    let err = DomainDataSource
        .read(&regions.clients, "missing.com", Region::Us)
        .await
        .unwrap_err();
    assert!(matches!(err.root(), Error::NotFound(_)));
    assert!(err.to_string().contains("missing.com"));
}
