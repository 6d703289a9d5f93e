//! Integration tests for the four-step rotation protocol.
//!
//! These tests drive a [`Rotator`] the way the rotation trigger does, one
//! event per step, and check what the secret store and the configuration
//! target hold afterwards:
//! 1. Full rotations against in-memory and file-backed adapters
//! 2. Drift detection on the mirrored header
//! 3. Idempotent re-delivery of every step
//! 4. Conflicts with concurrent configuration edits
//! 5. Resumption after an interrupted rotation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use verigate_rotation::{
    ConfigTarget, Error, FieldLocator, FileConfigTarget, FileSecretStore, Label,
    MemoryConfigTarget, MemorySecretStore, PasswordGenerator, PasswordPolicy,
    RandomPasswordGenerator, Result, RotationEvent, RotationStep, RotationToken, Rotator,
    SecretId, SecretStore, SecretString, Section, StepReport, TargetRecord, VersionId, VersionTag,
    read_field,
};

const DISTRIBUTION: &str = "dist-1";
const ORIGIN: &str = "frontend";
const HEADER: &str = "x-origin-verify";

// ==================== Helper Functions ====================

/// Always produces the same value, so assertions can name it.
struct FixedGenerator(&'static str);

impl PasswordGenerator for FixedGenerator {
    fn generate(&self, _policy: &PasswordPolicy) -> Result<SecretString> {
        Ok(SecretString::new(self.0))
    }
}

/// Edits an unrelated section right before the first write goes through,
/// the way a concurrent console edit would.
struct RacingTarget {
    inner: Arc<MemoryConfigTarget>,
    raced: AtomicBool,
}

impl RacingTarget {
    fn new(inner: Arc<MemoryConfigTarget>) -> Self {
        Self {
            inner,
            raced: AtomicBool::new(false),
        }
    }
}

impl ConfigTarget for RacingTarget {
    async fn read_config(&self, target_id: &str) -> Result<(TargetRecord, VersionTag)> {
        self.inner.read_config(target_id).await
    }

    async fn write_config(
        &self,
        target_id: &str,
        record: TargetRecord,
        expected: &VersionTag,
    ) -> Result<VersionTag> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let other = FieldLocator::new(target_id, "backend", "x-api-version");
            self.inner.upsert_field(&other, "2");
        }
        self.inner.write_config(target_id, record, expected).await
    }
}

fn secret_id() -> SecretId {
    SecretId::new("s1").expect("valid secret id")
}

fn token(raw: &str) -> RotationToken {
    RotationToken::new(raw).expect("valid token")
}

fn locator() -> FieldLocator {
    FieldLocator::new(DISTRIBUTION, ORIGIN, HEADER)
}

fn distribution(header: Option<&str>) -> TargetRecord {
    let mut frontend = Section::new(ORIGIN);
    if let Some(value) = header {
        frontend = frontend.with_field(HEADER, value);
    }
    TargetRecord::new(vec![frontend, Section::new("backend")])
}

fn setup(
    header: Option<&str>,
    new_value: &'static str,
) -> (
    Arc<MemorySecretStore>,
    Arc<MemoryConfigTarget>,
    Rotator<Arc<MemorySecretStore>, Arc<MemoryConfigTarget>, FixedGenerator>,
) {
    let store = Arc::new(MemorySecretStore::new());
    store
        .insert_current(&secret_id(), VersionId::new("v0"), SecretString::new("old"))
        .expect("seed");
    let target = Arc::new(MemoryConfigTarget::new());
    target.insert(DISTRIBUTION, distribution(header));

    let rotator = Rotator::with_target(
        Arc::clone(&store),
        Arc::clone(&target),
        locator(),
        FixedGenerator(new_value),
        PasswordPolicy::default(),
    )
    .expect("valid rotator");
    (store, target, rotator)
}

async fn deliver<S, T, G>(
    rotator: &Rotator<S, T, G>,
    token: &RotationToken,
    step: RotationStep,
) -> StepReport
where
    S: SecretStore,
    T: ConfigTarget,
    G: PasswordGenerator,
{
    rotator
        .handle_report(&RotationEvent::new(&secret_id(), token, step))
        .await
}

async fn current_value<S: SecretStore>(store: &S) -> String {
    store
        .get_by_label(&secret_id(), Label::Current)
        .await
        .expect("current version")
        .value
        .expose()
        .to_string()
}

async fn header_value<T: ConfigTarget>(target: &T) -> Option<String> {
    read_field(target, &locator())
        .await
        .expect("read header")
        .flatten()
}

// ==================== Full Rotation ====================

#[tokio::test]
async fn test_full_rotation_replaces_header_and_current() {
    let (store, target, rotator) = setup(Some("old"), "new");
    let t1 = token("t1");

    for step in RotationStep::ALL {
        let report = deliver(&rotator, &t1, step).await;
        assert_eq!(report, StepReport::success(), "step {step} failed");
    }

    assert_eq!(current_value(store.as_ref()).await, "new");
    assert_eq!(header_value(target.as_ref()).await.as_deref(), Some("new"));

    let labels = store.describe_labels(&secret_id()).await.expect("labels");
    assert_eq!(labels.len(), 1, "old version should be pruned");
    assert!(labels[&t1.version_id()].contains(&Label::Current));
    assert!(!labels[&t1.version_id()].contains(&Label::Pending));
}

#[tokio::test]
async fn test_full_rotation_adopts_absent_header() {
    let (store, target, rotator) = setup(None, "new");
    let t1 = token("t1");

    for step in RotationStep::ALL {
        assert!(deliver(&rotator, &t1, step).await.success);
    }

    assert_eq!(current_value(store.as_ref()).await, "new");
    assert_eq!(header_value(target.as_ref()).await.as_deref(), Some("new"));
}

#[tokio::test]
async fn test_consecutive_rotations() {
    let (store, target, _) = setup(Some("old"), "unused");

    for (raw_token, value) in [("t1", "second"), ("t2", "third")] {
        let rotator = Rotator::with_target(
            Arc::clone(&store),
            Arc::clone(&target),
            locator(),
            FixedGenerator(value),
            PasswordPolicy::default(),
        )
        .expect("valid rotator");
        let t = token(raw_token);
        for step in RotationStep::ALL {
            assert!(deliver(&rotator, &t, step).await.success);
        }
        assert_eq!(current_value(store.as_ref()).await, value);
    }

    assert_eq!(header_value(target.as_ref()).await.as_deref(), Some("third"));
}

#[tokio::test]
async fn test_file_backed_rotation_persists_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileSecretStore::new(dir.path());
    store
        .insert_current(&secret_id(), VersionId::new("v0"), SecretString::new("old"))
        .await
        .expect("seed store");
    let target = FileConfigTarget::new(dir.path());
    target.upsert_field(&locator(), "old").await.expect("seed target");

    let rotator = Rotator::with_target(
        store,
        target,
        locator(),
        RandomPasswordGenerator::new(),
        PasswordPolicy::default(),
    )
    .expect("valid rotator");
    let t1 = token("t1");
    for step in RotationStep::ALL {
        assert!(deliver(&rotator, &t1, step).await.success);
    }
    drop(rotator);

    // Reopen from disk.
    let store = FileSecretStore::new(dir.path());
    let target = FileConfigTarget::new(dir.path());
    let current = current_value(&store).await;
    assert_ne!(current, "old");
    assert_eq!(current.chars().count(), 32);
    assert_eq!(header_value(&target).await, Some(current));
}

// ==================== Drift ====================

#[tokio::test]
async fn test_drifted_header_aborts_set_secret() {
    let (store, target, rotator) = setup(Some("tampered"), "new");
    let t1 = token("t1");

    assert!(deliver(&rotator, &t1, RotationStep::CreateSecret).await.success);

    let result = rotator.set_secret(&secret_id(), &t1).await;
    assert!(matches!(result, Err(Error::Drift { .. })));

    // Nothing was written and CURRENT is untouched.
    assert_eq!(header_value(target.as_ref()).await.as_deref(), Some("tampered"));
    assert_eq!(current_value(store.as_ref()).await, "old");

    let report = deliver(&rotator, &t1, RotationStep::TestSecret).await;
    assert!(!report.success);
}

#[tokio::test]
async fn test_drift_report_names_the_field() {
    let (_, _, rotator) = setup(Some("tampered"), "new");
    let t1 = token("t1");

    assert!(deliver(&rotator, &t1, RotationStep::CreateSecret).await.success);
    let report = deliver(&rotator, &t1, RotationStep::SetSecret).await;

    assert!(!report.success);
    let message = report.error.expect("error message");
    assert!(message.contains("drift"), "unexpected message: {message}");
    assert!(message.contains(HEADER), "unexpected message: {message}");
}

#[tokio::test]
async fn test_secret_fails_when_set_was_skipped() {
    let (store, _, rotator) = setup(Some("old"), "new");
    let t1 = token("t1");

    assert!(deliver(&rotator, &t1, RotationStep::CreateSecret).await.success);
    let report = deliver(&rotator, &t1, RotationStep::TestSecret).await;

    assert!(!report.success);
    assert_eq!(current_value(store.as_ref()).await, "old");
}

// ==================== Idempotency ====================

#[tokio::test]
async fn test_every_step_can_be_redelivered() {
    let (store, target, rotator) = setup(Some("old"), "new");
    let t1 = token("t1");

    for step in RotationStep::ALL {
        assert!(deliver(&rotator, &t1, step).await.success, "first {step}");
        assert!(deliver(&rotator, &t1, step).await.success, "replayed {step}");
    }

    assert_eq!(current_value(store.as_ref()).await, "new");
    assert_eq!(header_value(target.as_ref()).await.as_deref(), Some("new"));
}

#[tokio::test]
async fn test_create_secret_keeps_first_pending_value() {
    let store = Arc::new(MemorySecretStore::new());
    store
        .insert_current(&secret_id(), VersionId::new("v0"), SecretString::new("old"))
        .expect("seed");
    let t1 = token("t1");

    let first = Rotator::without_target(
        Arc::clone(&store),
        FixedGenerator("first"),
        PasswordPolicy::default(),
    )
    .expect("valid rotator");
    let second = Rotator::without_target(
        Arc::clone(&store),
        FixedGenerator("second"),
        PasswordPolicy::default(),
    )
    .expect("valid rotator");

    assert!(deliver(&first, &t1, RotationStep::CreateSecret).await.success);
    assert!(deliver(&second, &t1, RotationStep::CreateSecret).await.success);

    let pending = store
        .get_by_token_and_label(&secret_id(), &t1, Label::Pending)
        .await
        .expect("pending");
    assert!(pending.matches("first"));
}

#[tokio::test]
async fn test_labels_stay_exclusive_through_rotation() {
    let (store, _, rotator) = setup(Some("old"), "new");
    let t1 = token("t1");

    for step in RotationStep::ALL {
        assert!(deliver(&rotator, &t1, step).await.success);

        let labels = store.describe_labels(&secret_id()).await.expect("labels");
        for label in [Label::Current, Label::Pending] {
            let holders = labels.values().filter(|l| l.contains(&label)).count();
            assert!(holders <= 1, "{label} on {holders} versions after {step}");
        }
        let current = labels.values().filter(|l| l.contains(&Label::Current)).count();
        assert_eq!(current, 1, "exactly one CURRENT after {step}");
    }
}

// ==================== Concurrency ====================

#[tokio::test]
async fn test_concurrent_edit_conflicts_then_retry_succeeds() {
    let store = Arc::new(MemorySecretStore::new());
    store
        .insert_current(&secret_id(), VersionId::new("v0"), SecretString::new("old"))
        .expect("seed");
    let inner = Arc::new(MemoryConfigTarget::new());
    inner.insert(DISTRIBUTION, distribution(Some("old")));

    let rotator = Rotator::with_target(
        Arc::clone(&store),
        RacingTarget::new(Arc::clone(&inner)),
        locator(),
        FixedGenerator("new"),
        PasswordPolicy::default(),
    )
    .expect("valid rotator");
    let t1 = token("t1");

    assert!(deliver(&rotator, &t1, RotationStep::CreateSecret).await.success);

    let err = rotator
        .set_secret(&secret_id(), &t1)
        .await
        .expect_err("write should lose the race");
    assert!(matches!(err, Error::Conflict { .. }));
    assert!(err.is_retryable());
    assert_eq!(header_value(inner.as_ref()).await.as_deref(), Some("old"));

    for step in [
        RotationStep::SetSecret,
        RotationStep::TestSecret,
        RotationStep::FinishSecret,
    ] {
        assert!(deliver(&rotator, &t1, step).await.success, "retried {step}");
    }

    let record = inner.record(DISTRIBUTION).expect("record");
    let backend = record.section("backend").expect("backend section");
    assert_eq!(
        backend.field("x-api-version").and_then(|f| f.value.as_deref()),
        Some("2"),
        "concurrent edit must survive"
    );
    assert_eq!(header_value(inner.as_ref()).await.as_deref(), Some("new"));
}

// ==================== Resumption ====================

#[tokio::test]
async fn test_rotation_resumes_after_interruption() {
    let (store, target, rotator) = setup(Some("old"), "new");
    let t1 = token("t1");

    assert!(deliver(&rotator, &t1, RotationStep::CreateSecret).await.success);
    assert!(deliver(&rotator, &t1, RotationStep::SetSecret).await.success);
    drop(rotator);

    // A fresh process picks up where the old one stopped. Its generator
    // would produce a different value, which must not be used.
    let resumed = Rotator::with_target(
        Arc::clone(&store),
        Arc::clone(&target),
        locator(),
        FixedGenerator("other"),
        PasswordPolicy::default(),
    )
    .expect("valid rotator");
    for step in RotationStep::ALL {
        assert!(deliver(&resumed, &t1, step).await.success, "resumed {step}");
    }

    assert_eq!(current_value(store.as_ref()).await, "new");
    assert_eq!(header_value(target.as_ref()).await.as_deref(), Some("new"));
}

#[tokio::test]
async fn test_finish_is_noop_after_completed_rotation() {
    let (store, _, rotator) = setup(Some("old"), "new");
    let t1 = token("t1");
    for step in RotationStep::ALL {
        assert!(deliver(&rotator, &t1, step).await.success);
    }

    let before = store.describe_labels(&secret_id()).await.expect("labels");
    assert!(deliver(&rotator, &t1, RotationStep::FinishSecret).await.success);
    let after = store.describe_labels(&secret_id()).await.expect("labels");
    assert_eq!(before, after);
}

// ==================== Edge Cases ====================

#[tokio::test]
async fn test_unmanaged_secret_is_left_alone() {
    let store = Arc::new(MemorySecretStore::new());
    let rotator = Rotator::without_target(
        Arc::clone(&store),
        FixedGenerator("new"),
        PasswordPolicy::default(),
    )
    .expect("valid rotator");
    let t1 = token("t1");

    assert!(deliver(&rotator, &t1, RotationStep::CreateSecret).await.success);

    let result = store.describe_labels(&secret_id()).await;
    assert!(matches!(result, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn test_invalid_step_is_reported() {
    let (store, _, rotator) = setup(Some("old"), "new");
    let event = RotationEvent {
        secret_id: "s1".to_string(),
        client_request_token: "t1".to_string(),
        step: "bogus".to_string(),
    };

    let report = rotator.handle_report(&event).await;

    assert!(!report.success);
    assert_eq!(report.error.as_deref(), Some("invalid step parameter: bogus"));
    assert_eq!(current_value(store.as_ref()).await, "old");
}

#[tokio::test]
async fn test_missing_origin_fails_set_secret() {
    let store = Arc::new(MemorySecretStore::new());
    store
        .insert_current(&secret_id(), VersionId::new("v0"), SecretString::new("old"))
        .expect("seed");
    let target = Arc::new(MemoryConfigTarget::new());
    target.insert(DISTRIBUTION, TargetRecord::new(vec![Section::new("backend")]));

    let rotator = Rotator::with_target(
        Arc::clone(&store),
        target,
        locator(),
        FixedGenerator("new"),
        PasswordPolicy::default(),
    )
    .expect("valid rotator");
    let t1 = token("t1");

    assert!(deliver(&rotator, &t1, RotationStep::CreateSecret).await.success);
    let result = rotator.set_secret(&secret_id(), &t1).await;
    assert!(matches!(result, Err(Error::NotFound { .. })));
}
