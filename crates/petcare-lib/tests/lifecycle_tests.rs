//! End-to-end tests for the model lifecycle: encoding contract, artifact
//! versioning, train/predict, drift monitoring and the retrain scheduler.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use petcare_lib::{
    artifact::{resolve, resolve_serving_pair},
    monitor::{AlertPolicy, BaselineStore, DataAmountAlertPolicy, DriftMonitor},
    notify::{Channel, HttpRequestSender, NotificationMessage, NotificationRouter, Receiver, Sender},
    pipeline::{ServingContext, TrainConfig, Trainer},
    preprocess::{calculate_age_days, preprocess, CategoryAwarePreprocessor, Vocabulary},
    retrain::{CycleOutcome, RetrainScheduler, SchedulerSettings},
    retrieve::DataSource,
    LifecycleError, RawRecord, FALLBACK_BREED,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast;

// ---- fixtures ----

fn claim(i: usize) -> RawRecord {
    let breeds = [1144, 1121, 1200];
    let breed = breeds[i % breeds.len()];
    let weight = 2.0 + (i % 7) as f64;
    RawRecord {
        pet_breed_id: breed,
        birth: "2019-01-01".parse().unwrap(),
        gender: Some(if i % 2 == 0 { "M" } else { "F" }.to_string()),
        neuter_yn: Some(if i % 3 == 0 { "y" } else { "n" }.to_string()),
        weight_kg: if i % 11 == 0 { None } else { Some(weight) },
        claim_price: Some(50_000.0 + 10_000.0 * weight + (breed - 1100) as f64 * 100.0),
        created_at: format!("2021-{:02}-15T10:00:00", 1 + i % 12).parse().unwrap(),
        disease_name: Some("otitis".to_string()),
    }
}

fn claims(n: usize) -> Vec<RawRecord> {
    (0..n).map(claim).collect()
}

fn at(ts: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn train_into(dir: &Path, records: &[RawRecord], now: &str) -> petcare_lib::pipeline::TrainingOutcome {
    Trainer::new(TrainConfig {
        artifact_dir: dir.to_path_buf(),
        ..TrainConfig::default()
    })
    .train_at(records, at(now))
    .unwrap()
}

/// Returns queued snapshots in order, failing where an entry is `None`
struct ScriptedSource {
    script: Mutex<Vec<Option<Vec<RawRecord>>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(script: Vec<Option<Vec<RawRecord>>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().rev().collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn retrieve(&self, _query: &str) -> Result<Vec<RawRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop() {
            Some(Some(rows)) => Ok(rows),
            Some(None) => anyhow::bail!("database connection refused"),
            None => anyhow::bail!("script exhausted"),
        }
    }
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<NotificationMessage>>,
}

impl RecordingSender {
    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Sender for RecordingSender {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: &NotificationMessage, _receiver: &Receiver) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn open_monitor(dir: &TempDir) -> DriftMonitor {
    DriftMonitor::open(
        Box::new(DataAmountAlertPolicy::default()),
        BaselineStore::new(dir.path().join("baseline.csv")),
    )
    .unwrap()
}

// ---- encoding contract ----

#[test]
fn test_unknown_category_maps_to_fallback_and_width_is_stable() {
    let train = claims(30);
    let vocab = Vocabulary::from_records(&train);
    let mut pre = CategoryAwarePreprocessor::default();
    pre.fit(&preprocess(&train, &vocab).unwrap()).unwrap();
    let width = pre.width().unwrap();

    let mut request = claim(1);
    request.pet_breed_id = 4242;
    let rows = preprocess(&[request.clone()], &vocab).unwrap();
    assert_eq!(rows[0].pet_breed_id, FALLBACK_BREED);

    // A grown vocabulary keeps the breed, yet the encoded width is unchanged.
    let grown = Vocabulary::new(vocab.iter().chain([4242, 5555]));
    let grown_rows = preprocess(&[request], &grown).unwrap();
    assert_eq!(grown_rows[0].pet_breed_id, 4242);

    assert_eq!(pre.transform(&rows).unwrap()[0].width(), width);
    assert_eq!(pre.transform(&grown_rows).unwrap()[0].width(), width);
}

#[test]
fn test_fit_then_transform_equals_fit_transform() {
    let records = claims(25);
    let rows = preprocess(&records, &Vocabulary::from_records(&records)).unwrap();

    let mut a = CategoryAwarePreprocessor::default();
    a.fit(&rows).unwrap();
    let mut b = CategoryAwarePreprocessor::default();
    assert_eq!(a.transform(&rows).unwrap(), b.fit_transform(&rows).unwrap());
}

#[test]
fn test_age_is_whole_days() {
    let days = calculate_age_days("2020-01-01".parse().unwrap(), at("2020-01-31 00:00:00")).unwrap();
    assert_eq!(days, 30);
}

// ---- artifact versioning ----

#[test]
fn test_resolver_returns_newest_timestamp() {
    let dir = TempDir::new().unwrap();
    for tag in ["20240101_000000", "20240615_235959", "20231231_010101"] {
        std::fs::write(dir.path().join(format!("linear_regression_{}.txt", tag)), b"{}").unwrap();
    }
    let newest = resolve(dir.path(), "txt", "linear_regression").unwrap();
    assert!(newest.ends_with("linear_regression_20240615_235959.txt"));
}

// ---- training and serving ----

#[test]
fn test_training_single_row_is_insufficient() {
    let dir = TempDir::new().unwrap();
    let err = Trainer::new(TrainConfig {
        artifact_dir: dir.path().to_path_buf(),
        ..TrainConfig::default()
    })
    .train(&claims(1))
    .unwrap_err();
    assert!(matches!(err, LifecycleError::InsufficientData { rows: 1, required: 2 }));
}

#[test]
fn test_train_then_serve_newest_pair() {
    let dir = TempDir::new().unwrap();
    let data = claims(60);
    train_into(dir.path(), &data, "2024-01-01 00:00:00");
    let newest = train_into(dir.path(), &data, "2024-06-15 23:59:59");
    assert!(newest.evaluation.mae.is_finite());

    let pair = resolve_serving_pair(dir.path(), "linear_regression").unwrap();
    assert_eq!(pair.tag, "20240615_235959");

    let ctx = ServingContext::load(dir.path(), "linear_regression")
        .unwrap()
        .with_audit(dir.path().join("audit.csv"));
    assert!(ctx.checksum_verified());

    let mut unseen = claim(3);
    unseen.pet_breed_id = 9_999;
    unseen.claim_price = None;
    let results = ctx.predict(&data, &[claim(4), unseen]).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[1].pet_breed_id, 9_999);
    for r in &results {
        assert_eq!(r.model_tag, "20240615_235959");
        assert_eq!(r.predicted_claim_price % 1000.0, 0.0);
        assert_eq!(r.age, 2);
    }
    assert!(dir.path().join("audit.csv").exists());
}

#[test]
fn test_tampered_artifact_is_rejected() {
    let dir = TempDir::new().unwrap();
    let outcome = train_into(dir.path(), &claims(20), "2024-03-01 12:00:00");
    std::fs::write(&outcome.model_path, b"{\"tampered\":true}").unwrap();

    let err = ServingContext::load(dir.path(), "linear_regression").unwrap_err();
    assert!(matches!(err, LifecycleError::ChecksumMismatch { .. }));
}

#[test]
fn test_interrupted_publish_serves_previous_run() {
    let dir = TempDir::new().unwrap();
    let data = claims(40);
    train_into(dir.path(), &data, "2024-01-01 00:00:00");

    // a later run died after writing its preprocessor only
    let vocab = Vocabulary::from_records(&data);
    let mut pre = CategoryAwarePreprocessor::default();
    pre.fit(&preprocess(&data, &vocab).unwrap()).unwrap();
    pre.dump(&dir.path().join("linear_regression_20240601_000000.pkl"))
        .unwrap();

    let ctx = ServingContext::load(dir.path(), "linear_regression").unwrap();
    assert_eq!(ctx.tag(), "20240101_000000");
    assert!(ctx.checksum_verified());

    petcare_lib::artifact::prune_artifacts(dir.path(), "linear_regression", 1).unwrap();
    assert!(ServingContext::load(dir.path(), "linear_regression").is_ok());
}

#[test]
fn test_serving_without_artifacts_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = ServingContext::load(dir.path(), "linear_regression").unwrap_err();
    assert!(err.is_client_visible_not_found());
}

// ---- drift monitoring ----

#[test]
fn test_alert_policy_threshold() {
    let policy = DataAmountAlertPolicy::default();
    assert!(policy.analyze(&claims(100), &claims(130)));
    assert!(!policy.analyze(&claims(100), &claims(129)));
}

/// Minimal HTTP endpoint answering 200 and recording request lines
async fn spawn_trigger_endpoint() -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            let text = String::from_utf8_lossy(&buf);
            if let Some(line) = text.lines().next() {
                seen.lock().unwrap().push(line.to_string());
            }
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
        }
    });

    (format!("http://{}/retrain", addr), requests)
}

#[tokio::test]
async fn test_growth_triggers_exactly_one_retrain_request() {
    let dir = TempDir::new().unwrap();
    BaselineStore::new(dir.path().join("baseline.csv"))
        .save(&claims(100))
        .unwrap();

    let (endpoint, requests) = spawn_trigger_endpoint().await;
    let email = Arc::new(RecordingSender::default());
    let router = NotificationRouter::new()
        .with_route(
            Channel::RetrainTrigger,
            Arc::new(HttpRequestSender::with_client(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(5))
                    .no_proxy()
                    .build()
                    .unwrap(),
            )),
            Receiver::http_endpoint(&endpoint).unwrap(),
        )
        .with_route(
            Channel::Operator,
            email.clone(),
            Receiver::Email("ops@example.com".into()),
        );

    let scheduler = RetrainScheduler::new(
        Arc::new(ScriptedSource::new(vec![Some(claims(131))])),
        open_monitor(&dir),
        router,
        SchedulerSettings::default(),
    );

    let outcome = scheduler.run_cycle().await;
    assert_eq!(
        outcome,
        CycleOutcome::RetrainRequested {
            previous_rows: 100,
            new_rows: 131
        }
    );

    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("POST /retrain?"));
    assert!(requests[0].contains("new_rows=131"));
    assert_eq!(email.count(), 0);

    assert_eq!(scheduler.monitor().baseline_rows().await, Some(131));
    let persisted = BaselineStore::new(dir.path().join("baseline.csv")).load().unwrap();
    assert_eq!(persisted.map(|r| r.len()), Some(131));
}

#[tokio::test]
async fn test_cycle_failure_emails_once_and_next_cycle_runs() {
    let dir = TempDir::new().unwrap();
    let email = Arc::new(RecordingSender::default());
    let trigger = Arc::new(RecordingSender::default());
    let router = NotificationRouter::new()
        .with_route(
            Channel::Operator,
            email.clone(),
            Receiver::Email("ops@example.com".into()),
        )
        .with_route(
            Channel::RetrainTrigger,
            trigger.clone(),
            Receiver::http_endpoint("http://model-server/retrain").unwrap(),
        );

    let source = Arc::new(ScriptedSource::new(vec![None, Some(claims(40))]));
    let scheduler = RetrainScheduler::new(source.clone(), open_monitor(&dir), router, SchedulerSettings::default());

    let first = scheduler.run_cycle().await;
    assert!(matches!(
        first,
        CycleOutcome::Failed {
            step: Some("retrieve"),
            operator_notified: true
        }
    ));
    assert_eq!(email.count(), 1);
    let sent = email.sent.lock().unwrap()[0].clone();
    let NotificationMessage::Email { content, .. } = sent else {
        panic!("expected an email report");
    };
    assert!(content.contains("MonitoringCycleError"));
    assert!(content.contains("database connection refused"));

    let second = scheduler.run_cycle().await;
    assert_eq!(second, CycleOutcome::BaselineInitialized { rows: 40 });
    assert_eq!(email.count(), 1);
    assert_eq!(trigger.count(), 0);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_trigger_is_reported_to_operator() {
    let dir = TempDir::new().unwrap();
    BaselineStore::new(dir.path().join("baseline.csv"))
        .save(&claims(10))
        .unwrap();

    let email = Arc::new(RecordingSender::default());
    // No retrain route: the trigger step fails and must be reported.
    let router = NotificationRouter::new().with_route(
        Channel::Operator,
        email.clone(),
        Receiver::Email("ops@example.com".into()),
    );
    let scheduler = RetrainScheduler::new(
        Arc::new(ScriptedSource::new(vec![Some(claims(50))])),
        open_monitor(&dir),
        router,
        SchedulerSettings::default(),
    );

    let outcome = scheduler.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Failed { step: Some("trigger"), .. }));
    assert_eq!(email.count(), 1);
    // The decision was taken, so the baseline still advanced.
    assert_eq!(scheduler.monitor().baseline_rows().await, Some(50));
}

#[tokio::test]
async fn test_run_loop_survives_failures_until_shutdown() {
    let dir = TempDir::new().unwrap();
    let email = Arc::new(RecordingSender::default());
    let router = NotificationRouter::new().with_route(
        Channel::Operator,
        email.clone(),
        Receiver::Email("ops@example.com".into()),
    );
    let source = Arc::new(ScriptedSource::new(vec![None, None, None, None, None]));
    let scheduler = Arc::new(RetrainScheduler::new(
        source.clone(),
        open_monitor(&dir),
        router,
        SchedulerSettings {
            interval: Duration::from_millis(20),
            ..SchedulerSettings::default()
        },
    ));

    let (tx, rx) = broadcast::channel(1);
    let handle = tokio::spawn(scheduler.clone().run(rx));

    tokio::time::timeout(Duration::from_secs(5), async {
        while email.count() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("scheduler kept running after failures");

    tx.send(()).unwrap();
    handle.await.unwrap();
    assert!(source.calls.load(Ordering::SeqCst) >= 3);
}

#[test]
fn test_monitor_reopen_blocking() {
    let dir = TempDir::new().unwrap();
    tokio_test::block_on(async {
        let monitor = open_monitor(&dir);
        monitor.observe(claims(5)).await.unwrap();
    });
    let reopened = open_monitor(&dir);
    let event = tokio_test::block_on(reopened.observe(claims(35))).unwrap();
    assert!(event.triggered);
    assert_eq!(event.previous_rows, Some(5));
}
