use std::fs;
use std::sync::{Arc, Mutex};

use dne_loader::ingestion::{
    FailureReason, FileObserver, ImportPath, IngestionContext, IngestionObserver, IngestionOptions,
    IngestionSeverity, IngestionStats, ensure_schema, run_ingestion,
};
use dne_loader::layout::LayoutRegistry;
use dne_loader::store::MemoryStore;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingObserver {
    successes: Mutex<Vec<(String, ImportPath)>>,
    fallbacks: Mutex<Vec<String>>,
    failures: Mutex<Vec<IngestionSeverity>>,
    alerts: Mutex<Vec<IngestionSeverity>>,
}

impl IngestionObserver for RecordingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.successes.lock().unwrap().push((ctx.table.clone(), stats.path));
    }

    fn on_fallback(&self, ctx: &IngestionContext, _bulk_error: &str) {
        self.fallbacks.lock().unwrap().push(ctx.table.clone());
    }

    fn on_failure(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _reason: &FailureReason) {
        self.failures.lock().unwrap().push(severity);
    }

    fn on_alert(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _reason: &FailureReason) {
        self.alerts.lock().unwrap().push(severity);
    }
}

const LOCALIDADE: &[u8] = b"LOC_NU;UFE_SG;LOC_NO;CEP\n1;SP;Sao Paulo;01000000\n";
const RAGGED_FAIXA: &[u8] = b"UFE_SG;CEP_INI;CEP_FIM\nSP;01000000\n";

#[tokio::test]
async fn observer_sees_success_fallback_and_failure() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("LOG_LOCALIDADE.TXT"), LOCALIDADE).unwrap();
    fs::write(dir.path().join("LOG_FAIXA_UF.TXT"), RAGGED_FAIXA).unwrap();

    let obs = Arc::new(RecordingObserver::default());
    let opts = IngestionOptions {
        observer: Some(obs.clone()),
        alert_at_or_above: IngestionSeverity::Critical,
        ..Default::default()
    };

    let registry = LayoutRegistry::dne();
    let mut store = MemoryStore::new();
    ensure_schema(&mut store, &registry).await.unwrap();
    run_ingestion(&mut store, &registry, dir.path(), &opts).await.unwrap();

    assert_eq!(
        *obs.successes.lock().unwrap(),
        vec![("LOG_LOCALIDADE".to_string(), ImportPath::Bulk)]
    );
    assert_eq!(*obs.fallbacks.lock().unwrap(), vec!["LOG_FAIXA_UF".to_string()]);
    // Unsupported manual import is a warning: below the alert threshold.
    assert_eq!(*obs.failures.lock().unwrap(), vec![IngestionSeverity::Warning]);
    assert!(obs.alerts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn lower_threshold_raises_alerts() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("LOG_FAIXA_UF.TXT"), RAGGED_FAIXA).unwrap();

    let obs = Arc::new(RecordingObserver::default());
    let opts = IngestionOptions {
        observer: Some(obs.clone()),
        alert_at_or_above: IngestionSeverity::Warning,
        ..Default::default()
    };

    let registry = LayoutRegistry::dne();
    let mut store = MemoryStore::new();
    ensure_schema(&mut store, &registry).await.unwrap();
    run_ingestion(&mut store, &registry, dir.path(), &opts).await.unwrap();

    assert_eq!(*obs.alerts.lock().unwrap(), vec![IngestionSeverity::Warning]);
}

#[tokio::test]
async fn batch_failure_is_an_error_event() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("LOG_LOCALIDADE.TXT"), LOCALIDADE).unwrap();

    let obs = Arc::new(RecordingObserver::default());
    let opts = IngestionOptions {
        observer: Some(obs.clone()),
        alert_at_or_above: IngestionSeverity::Error,
        ..Default::default()
    };

    let registry = LayoutRegistry::dne();
    let mut store = MemoryStore::new()
        .deny_bulk_load("LOG_LOCALIDADE")
        .fail_batch("LOG_LOCALIDADE", 1);
    ensure_schema(&mut store, &registry).await.unwrap();
    run_ingestion(&mut store, &registry, dir.path(), &opts).await.unwrap();

    assert_eq!(*obs.failures.lock().unwrap(), vec![IngestionSeverity::Error]);
    assert_eq!(*obs.alerts.lock().unwrap(), vec![IngestionSeverity::Error]);
}

#[tokio::test]
async fn file_observer_appends_event_lines() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    fs::create_dir(&input).unwrap();
    fs::write(input.join("LOG_LOCALIDADE.TXT"), LOCALIDADE).unwrap();
    fs::write(input.join("LOG_FAIXA_UF.TXT"), RAGGED_FAIXA).unwrap();
    let log_path = dir.path().join("events.log");

    let opts = IngestionOptions {
        observer: Some(Arc::new(FileObserver::new(&log_path))),
        ..Default::default()
    };

    let registry = LayoutRegistry::dne();
    let mut store = MemoryStore::new();
    ensure_schema(&mut store, &registry).await.unwrap();
    run_ingestion(&mut store, &registry, &input, &opts).await.unwrap();

    let log = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("fallback table=LOG_FAIXA_UF"));
    assert!(lines[1].contains("fail severity=Warning table=LOG_FAIXA_UF"));
    assert!(lines[2].contains("ok table=LOG_LOCALIDADE"));
    assert!(lines[2].contains("via=bulk rows=1"));
}
