//! Activation engine tests against an in-memory SQLite store.

#![cfg(all(feature = "server", feature = "sqlite"))]

mod common;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::{count, file_db, pool, seed, service, Fixture, LICENSE_EXPIRES, LICENSE_KEY, MAINT_EXPIRES, SECRET};
use regserver::client::entitlement::verify_registration;
use regserver::errors::{LicenseError, LicenseResult};
use regserver::features::FeatureType;
use regserver::registration_hash::RegistrationData;
use regserver::server::machines::{self, MachineChange};
use regserver::server::ActivationService;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn activate(svc: &ActivationService, f: Fixture, code: &str) -> LicenseResult<String> {
    svc.activate(f.customer_id, f.product_id, code, "alice")
        .await
        .map(|e| e.registration_hash)
}

#[tokio::test]
async fn seat_limit_scenario() -> LicenseResult<()> {
    let (svc, f) = service(2).await;

    activate(&svc, f, "M1").await?;
    activate(&svc, f, "M2").await?;

    let err = activate(&svc, f, "M3").await.unwrap_err();
    match err {
        LicenseError::SeatLimitExceeded { in_use, seat_count } => {
            assert_eq!(in_use, 2);
            assert_eq!(seat_count, 2);
        }
        other => panic!("expected SeatLimitExceeded, got {other:?}"),
    }
    assert!(err_message(&svc, f, "M3").await.contains("2 of 2"));

    // Re-activation at the limit still succeeds.
    activate(&svc, f, "M1").await?;

    assert_eq!(count(svc.db(), "SELECT COUNT(*) FROM machine").await, 2);
    assert_eq!(count(svc.db(), "SELECT COUNT(*) FROM registration").await, 2);
    Ok(())
}

async fn err_message(svc: &ActivationService, f: Fixture, code: &str) -> String {
    activate(svc, f, code).await.unwrap_err().to_string()
}

#[tokio::test]
async fn reactivation_does_not_consume_a_seat() -> LicenseResult<()> {
    let (svc, f) = service(3).await;

    activate(&svc, f, "M1").await?;
    activate(&svc, f, "M1").await?;
    activate(&svc, f, "M1").await?;

    let info = svc.license_info(LICENSE_KEY).await?;
    assert_eq!(info.license_count, 3);
    assert_eq!(info.seats_available, 2);
    Ok(())
}

#[tokio::test]
async fn expired_registration_frees_its_seat() -> LicenseResult<()> {
    let (svc, f) = service(1).await;

    activate(&svc, f, "M1").await?;
    sqlx::query("UPDATE registration SET expiration_date = '2020-01-01'")
        .execute(pool(svc.db()))
        .await?;

    // M1 no longer holds a seat, so a new machine fits.
    activate(&svc, f, "M2").await?;

    // And M1 is now the newcomer.
    let err = activate(&svc, f, "M1").await.unwrap_err();
    assert!(matches!(
        err,
        LicenseError::SeatLimitExceeded {
            in_use: 1,
            seat_count: 1
        }
    ));
    Ok(())
}

#[tokio::test]
async fn first_registration_date_survives_reactivation() -> LicenseResult<()> {
    let (svc, f) = service(1).await;

    svc.activate_on(f.customer_id, f.product_id, "M1", "alice", day(2025, 1, 15))
        .await?;
    svc.activate_on(f.customer_id, f.product_id, "M1", "alice", day(2025, 3, 2))
        .await?;

    let (first, last, expiration): (String, String, String) = sqlx::query_as(
        "SELECT first_registration_date, last_registration_date, expiration_date FROM registration",
    )
    .fetch_one(pool(svc.db()))
    .await?;
    assert_eq!(first, "2025-01-15");
    assert_eq!(last, "2025-03-02");
    assert_eq!(expiration, LICENSE_EXPIRES);
    Ok(())
}

#[tokio::test]
async fn entitlement_carries_merged_features_and_a_verifiable_hash() -> LicenseResult<()> {
    let (svc, f) = service(1).await;

    let e = svc
        .activate(f.customer_id, f.product_id, "M1", "alice")
        .await?;

    let expected_features = BTreeMap::from([
        ("Edition".to_string(), "Pro".to_string()),
        ("MaxProjects".to_string(), "5".to_string()),
    ]);
    assert_eq!(e.features, expected_features);
    assert_eq!(e.user_name, "alice");
    assert_eq!(e.user_company, "Acme Corp");
    assert_eq!(e.machine_code, "M1");
    assert_eq!(e.expiration_date, LICENSE_EXPIRES);
    assert_eq!(e.maint_expiration_date, MAINT_EXPIRES);
    assert_eq!(e.max_product_version, "2.0.0");
    assert_eq!(e.latest_version, "1.4.0");
    assert_eq!(e.license_key, LICENSE_KEY);

    let expected_hash = RegistrationData {
        machine_code: "M1",
        expiration_date: LICENSE_EXPIRES,
        maint_expiration_date: MAINT_EXPIRES,
        max_product_version: "2.0.0",
        features: &expected_features,
    }
    .hash(SECRET);
    assert_eq!(e.registration_hash, expected_hash);
    assert!(verify_registration(&e, SECRET));
    assert!(!e.registration_hash.contains(SECRET));

    let stored: String = sqlx::query_scalar("SELECT registration_hash FROM registration")
        .fetch_one(pool(svc.db()))
        .await?;
    assert_eq!(stored, e.registration_hash);
    Ok(())
}

#[tokio::test]
async fn feature_definitions_decode_their_type() -> LicenseResult<()> {
    let (svc, f) = service(1).await;

    let defs = svc.db().get_features_for_product(f.product_id).await?;
    let types: Vec<_> = defs
        .iter()
        .map(|d| (d.feature_name.as_str(), d.feature_type))
        .collect();
    assert_eq!(
        types,
        vec![
            ("Edition", FeatureType::Values),
            ("MaxProjects", FeatureType::Integer),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn changed_override_changes_the_hash() -> LicenseResult<()> {
    let (svc, f) = service(1).await;

    let before = activate(&svc, f, "M1").await?;
    sqlx::query("UPDATE license_feature SET feature_value = 'Standard' WHERE feature_id = ?")
        .bind(f.edition_feature_id)
        .execute(pool(svc.db()))
        .await?;
    let after = activate(&svc, f, "M1").await?;

    assert_ne!(before, after);
    let stored: String = sqlx::query_scalar("SELECT registration_hash FROM registration")
        .fetch_one(pool(svc.db()))
        .await?;
    assert_eq!(stored, after);
    Ok(())
}

#[tokio::test]
async fn stale_override_is_ignored() -> LicenseResult<()> {
    let (svc, f) = service(1).await;

    sqlx::query(
        "INSERT INTO license_feature (customer_id, product_id, feature_id, feature_value) \
         VALUES (?, ?, 9999, 'orphan')",
    )
    .bind(f.customer_id)
    .bind(f.product_id)
    .execute(pool(svc.db()))
    .await?;

    let e = svc
        .activate(f.customer_id, f.product_id, "M1", "alice")
        .await?;
    assert_eq!(e.features.len(), 2);
    assert!(!e.features.values().any(|v| v == "orphan"));
    Ok(())
}

#[tokio::test]
async fn reactivation_replaces_user_name() -> LicenseResult<()> {
    let (svc, f) = service(1).await;

    svc.activate(f.customer_id, f.product_id, "M1", "alice")
        .await?;
    let e = svc
        .activate(f.customer_id, f.product_id, "M1", "bob")
        .await?;
    assert_eq!(e.user_name, "bob");

    let names: Vec<String> = sqlx::query_scalar("SELECT user_name FROM machine")
        .fetch_all(pool(svc.db()))
        .await?;
    assert_eq!(names, vec!["bob".to_string()]);
    Ok(())
}

#[tokio::test]
async fn missing_license_writes_nothing() -> LicenseResult<()> {
    let (svc, f) = service(1).await;

    let err = svc
        .activate(f.customer_id, f.product_id + 100, "M1", "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::NotFound(_)));
    assert_eq!(count(svc.db(), "SELECT COUNT(*) FROM machine").await, 0);
    Ok(())
}

#[tokio::test]
async fn invalid_license_fails_before_any_write() -> LicenseResult<()> {
    let (svc, f) = service(1).await;

    sqlx::query("UPDATE license SET license_count = 0")
        .execute(pool(svc.db()))
        .await?;
    let err = activate(&svc, f, "M1").await.unwrap_err();
    assert!(matches!(err, LicenseError::ValidationError(_)));

    sqlx::query("UPDATE license SET license_count = 1, max_product_version = '2.x'")
        .execute(pool(svc.db()))
        .await?;
    let err = activate(&svc, f, "M1").await.unwrap_err();
    assert!(matches!(err, LicenseError::ValidationError(_)));

    assert_eq!(count(svc.db(), "SELECT COUNT(*) FROM machine").await, 0);
    assert_eq!(count(svc.db(), "SELECT COUNT(*) FROM registration").await, 0);
    Ok(())
}

#[tokio::test]
async fn license_key_lookup_ignores_case() -> LicenseResult<()> {
    let (svc, _) = service(1).await;

    let e = svc
        .activate_by_license_key(&LICENSE_KEY.to_lowercase(), "M1", "alice")
        .await?;
    assert_eq!(e.license_key, LICENSE_KEY);

    let err = svc
        .activate_by_license_key("NO-SUCH-KEY", "M1", "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::NotFound(ref what) if what == "license"));
    Ok(())
}

#[tokio::test]
async fn concurrent_activations_respect_the_seat_count() -> LicenseResult<()> {
    let (svc, f) = service(3).await;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.activate(f.customer_id, f.product_id, &format!("M{i}"), "user")
                    .await
            })
        })
        .collect();

    let mut granted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("activation task panicked") {
            Ok(_) => granted += 1,
            Err(LicenseError::SeatLimitExceeded { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(granted, 3);
    assert_eq!(rejected, 5);
    assert_eq!(count(svc.db(), "SELECT COUNT(*) FROM registration").await, 3);
    assert_eq!(count(svc.db(), "SELECT COUNT(*) FROM machine").await, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_activations_on_shared_file_take_exactly_the_seat_count() -> LicenseResult<()> {
    let dir = tempfile::tempdir()?;
    let db = file_db(dir.path(), 8).await;
    let f = seed(&db, 3).await;
    let svc = ActivationService::new(db, SECRET);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.activate(f.customer_id, f.product_id, &format!("RACE-{i}"), "user")
                    .await
            })
        })
        .collect();

    let mut granted = 0;
    let mut rejected = 0;
    let mut other = Vec::new();
    for handle in handles {
        match handle.await.expect("activation task panicked") {
            Ok(_) => granted += 1,
            Err(LicenseError::SeatLimitExceeded { .. }) => rejected += 1,
            Err(e) => other.push(e.to_string()),
        }
    }

    assert!(other.is_empty(), "unexpected errors: {other:?}");
    assert_eq!(granted, 3);
    assert_eq!(rejected, 13);
    assert_eq!(count(svc.db(), "SELECT COUNT(*) FROM registration").await, 3);
    assert_eq!(count(svc.db(), "SELECT COUNT(*) FROM machine").await, 3);
    Ok(())
}

#[tokio::test]
async fn installed_version_is_recorded() -> LicenseResult<()> {
    let (svc, f) = service(2).await;
    activate(&svc, f, "M1").await?;

    let info = svc
        .update_installed_version(LICENSE_KEY, "M1", "1.2.0")
        .await?;
    assert_eq!(info.latest_version, "1.4.0");
    assert_eq!(info.seats_available, 1);

    let installed: String = sqlx::query_scalar("SELECT installed_version FROM registration")
        .fetch_one(pool(svc.db()))
        .await?;
    assert_eq!(installed, "1.2.0");

    let err = svc
        .update_installed_version(LICENSE_KEY, "UNKNOWN", "1.2.0")
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::NotFound(ref what) if what == "machine"));
    Ok(())
}

#[tokio::test]
async fn product_version_by_guid() -> LicenseResult<()> {
    let (svc, _) = service(1).await;

    let pv = svc
        .product_version(&common::PRODUCT_GUID.to_lowercase())
        .await?;
    assert_eq!(pv.latest_version, "1.4.0");
    assert_eq!(pv.download_url, common::DOWNLOAD_URL);

    assert!(matches!(
        svc.product_version("missing").await.unwrap_err(),
        LicenseError::NotFound(_)
    ));
    Ok(())
}

#[tokio::test]
async fn machine_get_or_create_is_idempotent() -> LicenseResult<()> {
    let (svc, f) = service(1).await;

    let mut tx = svc.db().begin().await?;
    let created = machines::get_or_create(&mut tx, f.customer_id, "M1", "alice").await?;
    let again = machines::get_or_create(&mut tx, f.customer_id, "M1", "alice").await?;
    let renamed = machines::get_or_create(&mut tx, f.customer_id, "M1", "bob").await?;
    tx.commit().await?;

    assert_eq!(created.change, MachineChange::Created);
    assert_eq!(again.change, MachineChange::Unchanged);
    assert_eq!(renamed.change, MachineChange::Renamed);
    assert_eq!(created.machine_id, again.machine_id);
    assert_eq!(created.machine_id, renamed.machine_id);
    assert_eq!(count(svc.db(), "SELECT COUNT(*) FROM machine").await, 1);
    Ok(())
}

#[tokio::test]
async fn dropped_transaction_leaves_no_machine() -> LicenseResult<()> {
    let (svc, f) = service(1).await;

    {
        let mut tx = svc.db().begin().await?;
        machines::get_or_create(&mut tx, f.customer_id, "M1", "alice").await?;
    }

    assert_eq!(count(svc.db(), "SELECT COUNT(*) FROM machine").await, 0);
    Ok(())
}
