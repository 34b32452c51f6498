use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batchvision_batch::BatchController;
use batchvision_core::batch::BatchEvent;
use batchvision_core::error::{BatchVisionError, Result};
use batchvision_core::extraction::{Extractor, RawResponse};
use batchvision_core::job::{FieldValue, FileBlob, JobItem, JobState};
use batchvision_core::schema::{PropertyType, Schema};
use batchvision_core::{BatchSettings, SecretString};
use serde_json::{json, Value};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Scripted extractor
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Script {
    Respond(Value),
    Fail(String),
    Reject(String),
}

/// Answers per filename. Files without a script get a valid receipt.
/// Files with a gate block until the test releases them.
#[derive(Default)]
struct ScriptedExtractor {
    scripts: Mutex<HashMap<String, Script>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    delay: Option<Duration>,
    started: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExtractor {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn script(&self, filename: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(filename.to_string(), script);
    }

    fn gate(&self, filename: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(filename.to_string(), gate.clone());
        gate
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn submit(
        &self,
        file: &FileBlob,
        _prompt: &str,
        _schema: &Schema,
        _credential: &SecretString,
    ) -> Result<RawResponse> {
        self.started.lock().unwrap().push(file.filename.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let gate = self.gates.lock().unwrap().get(&file.filename).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = self.scripts.lock().unwrap().get(&file.filename).cloned();
        match script.unwrap_or_else(|| {
            Script::Respond(json!({"date": "03/01/2024", "amount": "$12.50"}))
        }) {
            Script::Respond(value) => RawResponse::from_value(value),
            Script::Fail(message) => Err(BatchVisionError::Extraction(message)),
            Script::Reject(message) => Ok(RawResponse::Rejected(message)),
        }
    }
}

fn key() -> SecretString {
    SecretString::from("sk-test".to_string())
}

fn files(names: &[&str]) -> Vec<FileBlob> {
    names
        .iter()
        .map(|name| FileBlob::new(*name, vec![0xFFu8, 0xD8]))
        .collect()
}

fn controller(extractor: &Arc<ScriptedExtractor>, concurrency: usize) -> Arc<BatchController> {
    Arc::new(BatchController::new(extractor.clone(), concurrency))
}

fn item<'a>(items: &'a [JobItem], filename: &str) -> &'a JobItem {
    items
        .iter()
        .find(|i| i.filename() == filename)
        .unwrap_or_else(|| panic!("no item named {filename}"))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ---------------------------------------------------------------------------
// Run completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_item_is_terminal_after_run() {
    let extractor = Arc::new(ScriptedExtractor::default());
    extractor.script("b.png", Script::Fail("connection reset by peer".into()));
    extractor.script("c.png", Script::Reject("No receipt visible".into()));
    extractor.script("d.png", Script::Respond(json!({"date": "03/01/2024"})));

    let batch = controller(&extractor, 2);
    batch.add_files(files(&["a.png", "b.png", "c.png", "d.png", "e.png"]));

    let summary = batch.run_batch(key()).await.unwrap();
    assert_eq!(summary.dispatched, 5);
    assert_eq!(summary.done, 2);
    assert_eq!(summary.failed, 3);

    let snapshot = batch.snapshot();
    assert!(!snapshot.processing);
    assert!(snapshot.items.iter().all(|i| i.state().is_terminal()));
    assert_eq!(snapshot.counts.done, 2);
    assert_eq!(snapshot.counts.error, 3);

    for i in &snapshot.items {
        match i.state() {
            JobState::Done => {
                assert!(i.fields().is_some_and(|f| !f.is_empty()));
                assert!(i.error().is_none());
            }
            _ => {
                assert!(i.fields().is_none());
                assert!(i.error().is_some());
            }
        }
    }
}

#[tokio::test]
async fn receipt_example_is_coerced() {
    let extractor = Arc::new(ScriptedExtractor::default());
    let batch = controller(&extractor, 5);
    batch.add_files(files(&["receipt.jpg"]));
    batch.run_batch(key()).await.unwrap();

    let snapshot = batch.snapshot();
    let receipt = item(&snapshot.items, "receipt.jpg");
    assert_eq!(receipt.state(), JobState::Done);
    let fields = receipt.fields().unwrap();
    assert_eq!(fields.get("date"), Some(&FieldValue::Text("03/01/2024".into())));
    assert_eq!(fields.get("amount"), Some(&FieldValue::Number(12.5)));
}

#[tokio::test]
async fn missing_required_field_fails_item() {
    let extractor = Arc::new(ScriptedExtractor::default());
    extractor.script("r.jpg", Script::Respond(json!({"date": "03/01/2024"})));

    let batch = controller(&extractor, 5);
    batch.add_files(files(&["r.jpg"]));
    batch.run_batch(key()).await.unwrap();

    let snapshot = batch.snapshot();
    let r = item(&snapshot.items, "r.jpg");
    assert_eq!(r.state(), JobState::Error);
    assert_eq!(r.error(), Some("Missing required field: amount"));
    assert!(batch.results().is_empty());
}

#[tokio::test]
async fn malformed_optional_field_is_flagged() {
    let extractor = Arc::new(ScriptedExtractor::default());
    extractor.script(
        "r.jpg",
        Script::Respond(json!({"date": "x", "amount": 5, "tip": "n/a"})),
    );

    let batch = controller(&extractor, 5);
    batch
        .update_settings(BatchSettings {
            prompt: "Extract date, amount and tip".into(),
            schema: Schema::default().with_property("tip", PropertyType::Number, "Tip", false),
        })
        .unwrap();
    batch.add_files(files(&["r.jpg"]));
    batch.run_batch(key()).await.unwrap();

    let snapshot = batch.snapshot();
    let r = item(&snapshot.items, "r.jpg");
    assert_eq!(r.state(), JobState::Done);
    assert!(!r.fields().unwrap().contains_key("tip"));
    assert_eq!(
        r.field_errors().get("tip").map(String::as_str),
        Some("Invalid number format for field: tip")
    );

    let results = batch.results();
    assert_eq!(results.len(), 1);
    assert!(results[0].get("tip").is_none());
    assert_eq!(results[0].get("amount"), Some(&FieldValue::Number(5.0)));
}

#[tokio::test]
async fn failures_surface_service_messages() {
    let extractor = Arc::new(ScriptedExtractor::default());
    extractor.script("down.png", Script::Fail("Incorrect API key provided".into()));
    extractor.script("blank.png", Script::Reject("The image does not contain a receipt".into()));
    extractor.script("list.png", Script::Respond(json!(["not", "an", "object"])));

    let batch = controller(&extractor, 3);
    batch.add_files(files(&["down.png", "blank.png", "list.png"]));
    batch.run_batch(key()).await.unwrap();

    let snapshot = batch.snapshot();
    assert_eq!(
        item(&snapshot.items, "down.png").error(),
        Some("Incorrect API key provided")
    );
    assert_eq!(
        item(&snapshot.items, "blank.png").error(),
        Some("The image does not contain a receipt")
    );
    assert!(item(&snapshot.items, "list.png")
        .error()
        .is_some_and(|e| e.contains("an array")));
}

// ---------------------------------------------------------------------------
// Concurrency bound
// ---------------------------------------------------------------------------

#[tokio::test]
async fn in_flight_calls_never_exceed_cap() {
    let extractor = Arc::new(ScriptedExtractor::with_delay(Duration::from_millis(2)));
    let batch = controller(&extractor, 3);
    let names: Vec<String> = (0..12).map(|i| format!("img-{i}.png")).collect();
    batch.add_files(names.iter().map(|n| FileBlob::new(n.clone(), vec![0u8])));

    batch.run_batch(key()).await.unwrap();

    assert_eq!(extractor.calls(), 12);
    assert_eq!(extractor.peak(), 3);
    assert_eq!(batch.results().len(), 12);
}

#[tokio::test]
async fn items_dispatch_in_input_order() {
    let extractor = Arc::new(ScriptedExtractor::default());
    let batch = controller(&extractor, 1);
    batch.add_files(files(&["1.png", "2.png", "3.png", "4.png"]));
    batch.run_batch(key()).await.unwrap();

    assert_eq!(extractor.started(), vec!["1.png", "2.png", "3.png", "4.png"]);
}

#[tokio::test]
async fn freed_slot_starts_next_item_without_waiting_for_slowest() {
    let extractor = Arc::new(ScriptedExtractor::default());
    let gates: Vec<Arc<Notify>> = (1..=5).map(|i| extractor.gate(&format!("{i}.png"))).collect();

    let batch = controller(&extractor, 2);
    batch.add_files(files(&["1.png", "2.png", "3.png", "4.png", "5.png"]));
    let (pending, handle) = batch.spawn_run(key()).unwrap();
    assert_eq!(pending, 5);

    wait_until(|| extractor.calls() == 2).await;
    assert_eq!(extractor.started(), vec!["1.png", "2.png"]);

    // Item 1 is the slow one; finishing item 2 alone must start item 3.
    gates[1].notify_one();
    wait_until(|| extractor.calls() == 3).await;
    assert_eq!(extractor.started()[2], "3.png");
    assert_eq!(
        item(&batch.snapshot().items, "1.png").state(),
        JobState::Processing
    );

    gates[2].notify_one();
    wait_until(|| extractor.calls() == 4).await;
    assert_eq!(extractor.started()[3], "4.png");
    assert_eq!(
        item(&batch.snapshot().items, "1.png").state(),
        JobState::Processing
    );

    for gate in [&gates[0], &gates[3], &gates[4]] {
        gate.notify_one();
    }
    let summary = handle.await.unwrap();

    assert_eq!(summary.done, 5);
    assert_eq!(extractor.peak(), 2);
    assert!(!batch.is_processing());
}

// ---------------------------------------------------------------------------
// Re-runs, ordering and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rerun_only_touches_unfinished_items() {
    let extractor = Arc::new(ScriptedExtractor::default());
    extractor.script("flaky.png", Script::Fail("timeout".into()));

    let batch = controller(&extractor, 2);
    batch.add_files(files(&["ok.png", "flaky.png"]));
    batch.run_batch(key()).await.unwrap();

    let first = batch.snapshot();
    let ok_before = item(&first.items, "ok.png").clone();
    assert_eq!(item(&first.items, "flaky.png").state(), JobState::Error);
    assert_eq!(extractor.calls(), 2);

    extractor.script("flaky.png", Script::Respond(json!({"date": "d", "amount": 3})));
    let summary = batch.run_batch(key()).await.unwrap();
    assert_eq!(summary.dispatched, 1);

    let second = batch.snapshot();
    let ok_after = item(&second.items, "ok.png");
    assert_eq!(ok_after.finished_at(), ok_before.finished_at());
    assert_eq!(ok_after.fields(), ok_before.fields());
    assert_eq!(item(&second.items, "flaky.png").state(), JobState::Done);
    assert_eq!(extractor.calls(), 3);
    assert_eq!(batch.results().len(), 2);

    let summary = batch.run_batch(key()).await.unwrap();
    assert_eq!(summary.dispatched, 0);
    assert_eq!(extractor.calls(), 3);
}

#[tokio::test]
async fn results_follow_completion_order() {
    let extractor = Arc::new(ScriptedExtractor::default());
    let slow = extractor.gate("slow.png");
    let fast = extractor.gate("fast.png");

    let batch = controller(&extractor, 2);
    batch.add_files(files(&["slow.png", "fast.png"]));
    let (_, handle) = batch.spawn_run(key()).unwrap();

    wait_until(|| extractor.calls() == 2).await;
    fast.notify_one();
    wait_until(|| batch.results().len() == 1).await;
    slow.notify_one();
    handle.await.unwrap();

    let names: Vec<String> = batch
        .results()
        .iter()
        .map(|r| r.filename().to_string())
        .collect();
    assert_eq!(names, vec!["fast.png", "slow.png"]);
    let snapshot = batch.snapshot();
    assert_eq!(snapshot.items[0].filename(), "slow.png");
}

#[tokio::test]
async fn files_added_mid_run_wait_for_next_run() {
    let extractor = Arc::new(ScriptedExtractor::default());
    let gate = extractor.gate("first.png");

    let batch = controller(&extractor, 2);
    batch.add_files(files(&["first.png"]));
    let (_, handle) = batch.spawn_run(key()).unwrap();
    wait_until(|| extractor.calls() == 1).await;

    batch.add_files(files(&["late.png"]));
    gate.notify_one();
    handle.await.unwrap();

    let snapshot = batch.snapshot();
    assert_eq!(item(&snapshot.items, "first.png").state(), JobState::Done);
    assert_eq!(item(&snapshot.items, "late.png").state(), JobState::Ready);

    batch.run_batch(key()).await.unwrap();
    assert_eq!(
        item(&batch.snapshot().items, "late.png").state(),
        JobState::Done
    );
}

#[tokio::test]
async fn run_and_clear_are_refused_while_processing() {
    let extractor = Arc::new(ScriptedExtractor::default());
    let gate = extractor.gate("a.png");

    let batch = controller(&extractor, 1);
    batch.add_files(files(&["a.png"]));
    let (_, handle) = batch.spawn_run(key()).unwrap();
    assert!(batch.is_processing());
    assert!(batch.snapshot().processing);

    assert!(matches!(
        batch.spawn_run(key()),
        Err(BatchVisionError::RunInProgress)
    ));
    assert!(matches!(
        batch.clear_batch(),
        Err(BatchVisionError::RunInProgress)
    ));

    gate.notify_one();
    handle.await.unwrap();
    assert!(!batch.is_processing());

    batch.clear_batch().unwrap();
    assert_eq!(batch.item_count(), 0);
    assert!(batch.results().is_empty());
}

#[tokio::test]
async fn observers_see_run_lifecycle() {
    let extractor = Arc::new(ScriptedExtractor::default());
    extractor.script("bad.png", Script::Fail("boom".into()));

    let batch = controller(&extractor, 2);
    let mut events = batch.subscribe();
    batch.add_files(files(&["good.png", "bad.png"]));
    batch.run_batch(key()).await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert!(matches!(received.first(), Some(BatchEvent::FilesAdded { count: 2 })));
    assert!(matches!(received.get(1), Some(BatchEvent::RunStarted { pending: 2 })));
    match received.last() {
        Some(BatchEvent::RunFinished { summary }) => {
            assert_eq!(summary.done, 1);
            assert_eq!(summary.failed, 1);
        }
        other => panic!("expected RunFinished last, got {other:?}"),
    }

    // Start and settle for each of the two items.
    let updates = received
        .iter()
        .filter(|e| matches!(e, BatchEvent::ItemUpdated { .. }))
        .count();
    assert_eq!(updates, 4);
}

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exported_csv_parses_back() {
    let extractor = Arc::new(ScriptedExtractor::default());
    extractor.script(
        "one.jpg",
        Script::Respond(json!({"vendor": "Joe's Diner, Downtown", "amount": "$1,204.50", "card": "true"})),
    );
    extractor.script(
        "two.jpg",
        Script::Respond(json!({"vendor": "Corner Shop", "amount": 7, "card": false})),
    );
    extractor.script("three.jpg", Script::Respond(json!({"amount": 3.25})));

    let batch = controller(&extractor, 1);
    batch
        .update_settings(BatchSettings {
            prompt: "Extract vendor, amount and card payment".into(),
            schema: Schema::new()
                .with_property("vendor", PropertyType::String, "Store name", false)
                .with_property("amount", PropertyType::Number, "Total", true)
                .with_property("card", PropertyType::Boolean, "Paid by card", false),
        })
        .unwrap();
    batch.add_files(files(&["one.jpg", "two.jpg", "three.jpg"]));
    batch.run_batch(key()).await.unwrap();

    let csv_text = batch.export_csv();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_text.as_bytes());

    let headers = reader.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["Filename", "Vendor", "Amount", "Card"]
    );

    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    assert_eq!(
        rows,
        vec![
            vec!["one.jpg", "Joe's Diner, Downtown", "1204.5", "Yes"],
            vec!["two.jpg", "Corner Shop", "7", "No"],
            vec!["three.jpg", "", "3.25", ""],
        ]
    );
}
