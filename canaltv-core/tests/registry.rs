use std::path::Path;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use canaltv_core::{
    ChannelFilter, ChannelHealth, ChannelRegistry, NewChannel, RegistryError,
};

fn temp_registry(dir: &Path) -> ChannelRegistry {
    let registry = ChannelRegistry::builder()
        .path(dir.join("channels.sqlite"))
        .create_if_missing(true)
        .build()
        .expect("create registry");
    registry.initialize().expect("initialize registry");
    registry
}

fn channel(id: &str) -> NewChannel {
    NewChannel {
        id: id.to_string(),
        name: format!("Canal {id}"),
        country: Some("BR".to_string()),
        group_title: Some("Notícias".to_string()),
        source_url: format!("https://cdn.example.com/{id}/index.m3u8"),
    }
}

#[test]
fn registration_uses_optimistic_defaults() {
    let dir = TempDir::new().unwrap();
    let registry = temp_registry(dir.path());

    assert!(registry.register(&channel("ch-1")).unwrap());
    let record = registry.channel_by_id("ch-1").unwrap().expect("registered");

    assert!(record.health.is_online);
    assert_eq!(record.health.consecutive_failures, 0);
    assert!(record.health.last_checked.is_none());
    assert!(!record.validated);
}

#[test]
fn re_registration_preserves_health_state() {
    let dir = TempDir::new().unwrap();
    let registry = temp_registry(dir.path());
    registry.register(&channel("ch-1")).unwrap();

    let degraded = ChannelHealth {
        is_online: false,
        consecutive_failures: 4,
        last_checked: Some(Utc::now()),
    };
    registry.update_health("ch-1", &degraded).unwrap();

    // A repeated playlist import must not reset liveness bookkeeping.
    assert!(!registry.register(&channel("ch-1")).unwrap());
    let record = registry.channel_by_id("ch-1").unwrap().unwrap();
    assert!(!record.health.is_online);
    assert_eq!(record.health.consecutive_failures, 4);
}

#[test]
fn needing_check_selects_null_and_stale_rows() {
    let dir = TempDir::new().unwrap();
    let registry = temp_registry(dir.path());
    registry
        .register_all(&[channel("never"), channel("fresh"), channel("stale")])
        .unwrap();

    registry
        .update_health(
            "fresh",
            &ChannelHealth {
                is_online: true,
                consecutive_failures: 0,
                last_checked: Some(Utc::now()),
            },
        )
        .unwrap();
    registry
        .update_health(
            "stale",
            &ChannelHealth {
                is_online: true,
                consecutive_failures: 0,
                last_checked: Some(Utc::now() - Duration::hours(3)),
            },
        )
        .unwrap();

    let due = registry.channels_needing_check(Duration::hours(2)).unwrap();
    let ids: Vec<&str> = due.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(due.len(), 2);
    assert!(ids.contains(&"never"));
    assert!(ids.contains(&"stale"));
    // Never-checked channels come first.
    assert_eq!(ids[0], "never");
}

#[test]
fn update_health_roundtrips_timestamp() {
    let dir = TempDir::new().unwrap();
    let registry = temp_registry(dir.path());
    registry.register(&channel("ch-1")).unwrap();

    let checked_at = Utc::now();
    registry
        .update_health(
            "ch-1",
            &ChannelHealth {
                is_online: true,
                consecutive_failures: 0,
                last_checked: Some(checked_at),
            },
        )
        .unwrap();

    let record = registry.channel_by_id("ch-1").unwrap().unwrap();
    let stored = record.health.last_checked.expect("timestamp stored");
    assert!((stored - checked_at).num_seconds().abs() < 2);
}

#[test]
fn update_health_unknown_channel_is_not_found() {
    let dir = TempDir::new().unwrap();
    let registry = temp_registry(dir.path());
    let result = registry.update_health("missing", &ChannelHealth::default());
    assert!(matches!(result, Err(RegistryError::NotFound(id)) if id == "missing"));
}

#[test]
fn listing_filters_by_liveness() {
    let dir = TempDir::new().unwrap();
    let registry = temp_registry(dir.path());
    registry
        .register_all(&[channel("up"), channel("down")])
        .unwrap();
    registry
        .update_health(
            "down",
            &ChannelHealth {
                is_online: false,
                consecutive_failures: 3,
                last_checked: Some(Utc::now()),
            },
        )
        .unwrap();

    let online = registry.list_online().unwrap();
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].id, "up");

    let offline = registry
        .list(&ChannelFilter {
            online: Some(false),
            ..ChannelFilter::default()
        })
        .unwrap();
    assert_eq!(offline.len(), 1);
    assert_eq!(offline[0].id, "down");

    let all = registry.list_all().unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn summary_counts_population() {
    let dir = TempDir::new().unwrap();
    let registry = temp_registry(dir.path());
    registry
        .register_all(&[channel("a"), channel("b"), channel("c")])
        .unwrap();
    registry
        .update_health(
            "a",
            &ChannelHealth {
                is_online: false,
                consecutive_failures: 3,
                last_checked: Some(Utc::now()),
            },
        )
        .unwrap();
    registry.set_validated("b", true).unwrap();

    let summary = registry.summary().unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.online, 2);
    assert_eq!(summary.offline, 1);
    assert_eq!(summary.never_checked, 2);
    assert_eq!(summary.validated, 1);
}

#[test]
fn validated_flag_is_orthogonal_to_liveness() {
    let dir = TempDir::new().unwrap();
    let registry = temp_registry(dir.path());
    registry.register(&channel("ch-1")).unwrap();

    registry.set_validated("ch-1", true).unwrap();
    let record = registry.channel_by_id("ch-1").unwrap().unwrap();
    assert!(record.validated);
    assert!(record.health.is_online);

    registry
        .update_health(
            "ch-1",
            &ChannelHealth {
                is_online: false,
                consecutive_failures: 3,
                last_checked: Some(Utc::now()),
            },
        )
        .unwrap();
    let record = registry.channel_by_id("ch-1").unwrap().unwrap();
    assert!(record.validated, "health writes must not clobber curation");
}

#[test]
fn backup_creates_usable_copy() {
    let dir = TempDir::new().unwrap();
    let registry = temp_registry(dir.path());
    registry.register(&channel("ch-1")).unwrap();

    let backup_path = dir.path().join("backups/channels.sqlite");
    registry.backup_to(&backup_path).unwrap();
    assert!(backup_path.exists());

    let copy = ChannelRegistry::builder()
        .path(&backup_path)
        .read_only(true)
        .build()
        .unwrap();
    assert_eq!(copy.summary().unwrap().total, 1);
}
