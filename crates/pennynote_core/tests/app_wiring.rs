use pennynote_core::{
    AppError, AttachmentKey, AttachmentUpload, BlobPath, CoreApp, CoreConfig, CreateNoteRequest,
    OwnerIdentity, ResolveError, UrlSigner,
};
use std::time::Duration;
use tempfile::TempDir;

const SECRET: &str = "app-wiring-secret-0123456789";
const BASE_URL: &str = "https://cdn.pennynote.test";

fn config(dir: &TempDir) -> CoreConfig {
    CoreConfig {
        database_path: dir.path().join("notes.sqlite3"),
        media_root: dir.path().join("blobs"),
        media_base_url: BASE_URL.to_string(),
        url_signing_secret: SECRET.to_string(),
        ..CoreConfig::default()
    }
}

fn owner(value: &str) -> OwnerIdentity {
    OwnerIdentity::new(value).unwrap()
}

fn image_note(name: &str, file_name: &str, bytes: &[u8]) -> CreateNoteRequest {
    CreateNoteRequest {
        name: name.to_string(),
        description: "with image".to_string(),
        attachment: Some(AttachmentUpload {
            file_name: file_name.to_string(),
            bytes: bytes.to_vec(),
        }),
    }
}

fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[tokio::test]
async fn resolved_url_fetches_uploaded_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let app = CoreApp::open(&config(&dir)).unwrap();
    let orchestrator = app.orchestrator_for(owner("alice"));

    let report = orchestrator
        .create(image_note("Pic", "photo.jpeg", b"jpeg-bytes"))
        .await
        .unwrap();
    let url = report.note.unwrap().image.url().unwrap().clone();

    assert!(url.as_str().starts_with("https://cdn.pennynote.test/media/alice/photo.jpeg?"));
    assert_eq!(app.fetch_signed(url.as_str()).await.unwrap(), b"jpeg-bytes");
    assert!(dir.path().join("blobs/media/alice/photo.jpeg").is_file());
}

#[tokio::test]
async fn tampered_url_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = CoreApp::open(&config(&dir)).unwrap();
    let orchestrator = app.orchestrator_for(owner("alice"));
    let report = orchestrator
        .create(image_note("Pic", "a.png", b"png"))
        .await
        .unwrap();
    let url = report.note.unwrap().image.url().unwrap().to_string();

    let other_owner = url.replace("/media/alice/", "/media/mallory/");
    let err = app.fetch_signed(&other_owner).await.unwrap_err();
    assert!(matches!(err, AppError::Resolve(ResolveError::InvalidSignature)));

    let err = app
        .fetch_signed("https://elsewhere.test/media/alice/a.png?expires=1&signature=x")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Resolve(ResolveError::InvalidUrl(_))));
}

#[tokio::test]
async fn expired_url_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = CoreApp::open(&config(&dir)).unwrap();
    let signer = UrlSigner::new(SECRET, BASE_URL, Duration::from_secs(60));
    let path = BlobPath::new(&owner("alice"), &AttachmentKey::new("a.png").unwrap());

    let stale = signer.sign(&path, now() - 3600);
    let err = app.fetch_signed(stale.as_str()).await.unwrap_err();

    assert!(matches!(err, AppError::Resolve(ResolveError::Expired { .. })));
}

#[tokio::test]
async fn valid_url_for_missing_blob_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let app = CoreApp::open(&config(&dir)).unwrap();
    let signer = UrlSigner::new(SECRET, BASE_URL, Duration::from_secs(60));
    let path = BlobPath::new(&owner("alice"), &AttachmentKey::new("never.png").unwrap());

    let url = signer.sign(&path, now());
    let err = app.fetch_signed(url.as_str()).await.unwrap_err();

    assert!(matches!(err, AppError::MissingBlob(missing) if missing == path));
}

#[tokio::test]
async fn owners_share_stores_but_not_notes() {
    let dir = tempfile::tempdir().unwrap();
    let app = CoreApp::open(&config(&dir)).unwrap();
    let alice = app.orchestrator_for(owner("alice"));
    let bob = app.orchestrator_for(owner("bob"));

    alice.create(image_note("mine", "a.png", b"alice")).await.unwrap();
    bob.create(image_note("yours", "a.png", b"bob")).await.unwrap();

    let alice_feed = alice.refresh().await.unwrap();
    let bob_feed = bob.refresh().await.unwrap();
    assert_eq!(alice_feed.len(), 1);
    assert_eq!(bob_feed.len(), 1);
    assert_eq!(alice_feed.notes()[0].name, "mine");

    let alice_url = alice_feed.notes()[0].image.url().unwrap();
    let bob_url = bob_feed.notes()[0].image.url().unwrap();
    assert_eq!(app.fetch_signed(alice_url.as_str()).await.unwrap(), b"alice");
    assert_eq!(app.fetch_signed(bob_url.as_str()).await.unwrap(), b"bob");
}

#[tokio::test]
async fn notes_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    {
        let app = CoreApp::open(&cfg).unwrap();
        app.orchestrator_for(owner("alice"))
            .create(image_note("kept", "a.png", b"png"))
            .await
            .unwrap();
    }

    let app = CoreApp::open(&cfg).unwrap();
    let feed = app.orchestrator_for(owner("alice")).refresh().await.unwrap();

    assert_eq!(feed.len(), 1);
    assert_eq!(feed.notes()[0].name, "kept");
    assert!(feed.notes()[0].image.url().is_some());
}

#[test]
fn invalid_config_is_rejected_before_opening_stores() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&dir);
    cfg.url_signing_secret = "short".to_string();

    let err = CoreApp::open(&cfg).err().unwrap();

    assert!(matches!(err, AppError::Config(_)));
    assert!(!cfg.database_path.exists());
}
