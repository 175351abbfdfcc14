//! Settings validation, persistence, and seeding behavior.

use std::collections::BTreeSet;
use std::path::PathBuf;

use docshelf::db;
use docshelf::migrate::run_migrations;
use docshelf::seed::{seed_ai_settings, EnvDefaults, SeedOutcome};
use docshelf::settings::{
    AiSettings, CloudDriveSettings, DriveTier, LocalSettings, ObjectStorageSettings, ProviderKey,
    ProviderKind, ProviderSettings,
};
use docshelf::settings_store::SettingsStore;

fn extensions(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn local(name: &str, enabled: bool) -> ProviderSettings {
    ProviderSettings::Local(LocalSettings {
        name: name.to_string(),
        enabled,
        file_extensions: extensions(&["md", "txt"]),
        root: PathBuf::from("/srv/docs"),
        exclude_globs: Vec::new(),
    })
}

fn object_storage(name: &str, enabled: bool) -> ObjectStorageSettings {
    ObjectStorageSettings {
        name: name.to_string(),
        enabled,
        file_extensions: extensions(&["md"]),
        bucket: "acme-docs".to_string(),
        region: "us-east-1".to_string(),
        prefix: String::new(),
        access_key_id: Some("AKIA123".to_string()),
        secret_access_key: Some("secret".to_string()),
        use_instance_profile: false,
        endpoint_url: None,
    }
}

fn cloud_drive(name: &str, enabled: bool) -> CloudDriveSettings {
    CloudDriveSettings {
        name: name.to_string(),
        enabled,
        file_extensions: extensions(&["docx", "md"]),
        tenant_id: "tenant".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        tier: DriveTier::Business,
        drive_id: Some("drive-1".to_string()),
        site_id: None,
    }
}

async fn store() -> SettingsStore {
    let pool = db::connect_in_memory().await.unwrap();
    run_migrations(&pool).await.unwrap();
    SettingsStore::new(pool)
}

// ─── validation ───────────────────────────────────────────────────────

#[test]
fn disabled_configs_validate_regardless_of_completeness() {
    let empty_local = ProviderSettings::Local(LocalSettings {
        name: "incomplete".to_string(),
        enabled: false,
        file_extensions: BTreeSet::new(),
        root: PathBuf::new(),
        exclude_globs: Vec::new(),
    });
    assert!(empty_local.validate().is_ok());

    let empty_s3 = ProviderSettings::ObjectStorage(ObjectStorageSettings {
        bucket: String::new(),
        region: String::new(),
        access_key_id: None,
        secret_access_key: None,
        enabled: false,
        ..object_storage("incomplete", false)
    });
    assert!(empty_s3.validate().is_ok());

    let empty_drive = ProviderSettings::CloudDrive(CloudDriveSettings {
        tenant_id: String::new(),
        client_id: String::new(),
        client_secret: String::new(),
        drive_id: None,
        enabled: false,
        ..cloud_drive("incomplete", false)
    });
    assert!(empty_drive.validate().is_ok());
}

#[test]
fn enabled_local_requires_root_and_extensions() {
    let no_root = ProviderSettings::Local(LocalSettings {
        root: PathBuf::new(),
        ..match local("docs", true) {
            ProviderSettings::Local(s) => s,
            _ => unreachable!(),
        }
    });
    let err = no_root.validate().unwrap_err();
    assert!(err.message.contains("root path"));
    assert!(err.provider.contains("local:docs"));

    let no_extensions = ProviderSettings::Local(LocalSettings {
        file_extensions: BTreeSet::new(),
        ..match local("docs", true) {
            ProviderSettings::Local(s) => s,
            _ => unreachable!(),
        }
    });
    let err = no_extensions.validate().unwrap_err();
    assert!(err.message.contains("file extension"));
}

#[test]
fn enabled_object_storage_requires_bucket_region_and_auth() {
    let no_bucket = ProviderSettings::ObjectStorage(ObjectStorageSettings {
        bucket: String::new(),
        ..object_storage("runbooks", true)
    });
    assert!(no_bucket.validate().unwrap_err().message.contains("bucket"));

    let no_region = ProviderSettings::ObjectStorage(ObjectStorageSettings {
        region: String::new(),
        ..object_storage("runbooks", true)
    });
    assert!(no_region.validate().unwrap_err().message.contains("region"));

    // Neither an explicit pair nor the ambient fallback
    let no_auth = ProviderSettings::ObjectStorage(ObjectStorageSettings {
        access_key_id: None,
        secret_access_key: None,
        use_instance_profile: false,
        ..object_storage("runbooks", true)
    });
    assert!(no_auth.validate().unwrap_err().message.contains("credentials"));

    // Half a pair is never usable
    let half_pair = ProviderSettings::ObjectStorage(ObjectStorageSettings {
        secret_access_key: None,
        ..object_storage("runbooks", true)
    });
    assert!(half_pair.validate().unwrap_err().message.contains("credentials"));

    // Ambient identity alone is fine
    let ambient = ProviderSettings::ObjectStorage(ObjectStorageSettings {
        access_key_id: None,
        secret_access_key: None,
        use_instance_profile: true,
        ..object_storage("runbooks", true)
    });
    assert!(ambient.validate().is_ok());
}

#[test]
fn business_drives_require_a_drive_or_site_id() {
    let no_target = ProviderSettings::CloudDrive(CloudDriveSettings {
        drive_id: None,
        site_id: None,
        ..cloud_drive("wiki", true)
    });
    let err = no_target.validate().unwrap_err();
    assert!(err.message.contains("drive id or site id"));

    let site_only = ProviderSettings::CloudDrive(CloudDriveSettings {
        drive_id: None,
        site_id: Some("site-9".to_string()),
        ..cloud_drive("wiki", true)
    });
    assert!(site_only.validate().is_ok());

    // Personal tier needs neither
    let personal = ProviderSettings::CloudDrive(CloudDriveSettings {
        tier: DriveTier::Personal,
        drive_id: None,
        site_id: None,
        ..cloud_drive("home", true)
    });
    assert!(personal.validate().is_ok());
}

// ─── store ────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_round_trips_semantically_equal_value() {
    let store = store().await;

    let settings = ProviderSettings::ObjectStorage(ObjectStorageSettings {
        endpoint_url: Some("http://localhost:9000".to_string()),
        ..object_storage("minio", true)
    });
    let stored = store.upsert(settings).await.unwrap();

    let key = ProviderKey::new(ProviderKind::ObjectStorage, "minio");
    let read_back = store.get(&key).await.unwrap().unwrap();
    assert_eq!(read_back, stored);

    // The one permitted normalization: trailing separator on the
    // base-URL-like field
    match read_back {
        ProviderSettings::ObjectStorage(s) => {
            assert_eq!(s.endpoint_url.as_deref(), Some("http://localhost:9000/"));
        }
        _ => panic!("wrong variant"),
    }
}

#[tokio::test]
async fn missing_record_is_none_not_an_error() {
    let store = store().await;
    let key = ProviderKey::new(ProviderKind::Local, "ghost");
    assert!(store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_settings_never_reach_the_store() {
    let store = store().await;

    let invalid = ProviderSettings::Local(LocalSettings {
        name: "bad".to_string(),
        enabled: true,
        file_extensions: BTreeSet::new(),
        root: PathBuf::from("/srv/docs"),
        exclude_globs: Vec::new(),
    });
    assert!(store.upsert(invalid).await.is_err());
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn upsert_same_key_is_last_writer_wins() {
    let store = store().await;
    store.upsert(local("docs", false)).await.unwrap();
    store.upsert(local("DOCS", true)).await.unwrap();

    let all = store.list().await.unwrap();
    assert_eq!(all.len(), 1, "case-insensitive identity collapsed to one row");
    assert!(all[0].enabled());
}

#[tokio::test]
async fn delete_reports_whether_a_row_existed() {
    let store = store().await;
    store.upsert(local("docs", false)).await.unwrap();

    let key = ProviderKey::new(ProviderKind::Local, "docs");
    assert!(store.delete(&key).await.unwrap());
    assert!(!store.delete(&key).await.unwrap());
}

// ─── AI settings & seeding ────────────────────────────────────────────

#[tokio::test]
async fn ai_base_url_is_normalized_on_upsert() {
    let store = store().await;
    let ai = AiSettings {
        enabled: true,
        api_key: "sk-test".to_string(),
        base_url: "https://llm.internal/v1".to_string(),
        ..AiSettings::default()
    };
    store.upsert_ai(ai).await.unwrap();

    let read_back = store.get_ai().await.unwrap().unwrap();
    assert_eq!(read_back.base_url, "https://llm.internal/v1/");
}

#[tokio::test]
async fn seeding_is_idempotent() {
    let store = store().await;
    let defaults = EnvDefaults {
        api_key: Some("sk-seed".to_string()),
        base_url: Some("https://llm.internal/v1".to_string()),
        ..EnvDefaults::default()
    };

    let first = seed_ai_settings(&store, &defaults).await.unwrap();
    let seeded = match first {
        SeedOutcome::Seeded(ai) => ai,
        SeedOutcome::AlreadyPresent => panic!("expected a seed on first run"),
    };
    assert!(seeded.enabled);
    assert_eq!(seeded.base_url, "https://llm.internal/v1/");

    // Second call performs zero writes — even with different defaults
    let changed = EnvDefaults {
        api_key: Some("sk-other".to_string()),
        ..EnvDefaults::default()
    };
    assert_eq!(
        seed_ai_settings(&store, &changed).await.unwrap(),
        SeedOutcome::AlreadyPresent
    );
    let record = store.get_ai().await.unwrap().unwrap();
    assert_eq!(record.api_key, "sk-seed");
}

#[tokio::test]
async fn seeding_without_api_key_produces_disabled_record() {
    let store = store().await;
    let outcome = seed_ai_settings(&store, &EnvDefaults::default()).await.unwrap();
    match outcome {
        SeedOutcome::Seeded(ai) => {
            assert!(!ai.enabled);
            assert_eq!(ai.embed_model, "text-embedding-3-small");
        }
        SeedOutcome::AlreadyPresent => panic!("expected a seed"),
    }
}
