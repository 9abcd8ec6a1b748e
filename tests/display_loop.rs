mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{ScriptedTransaction, ScriptedView};
use pinwatch::config::PollConfig;
use pinwatch::display::datalog::DataLog;
use pinwatch::display::{DisplayLoop, DisplayState, NO_DATA_WARNING, SENTINEL_TEXT};
use pinwatch::poll::scheduler::PollScheduler;
use pinwatch::poll::ResultsBuffer;
use pinwatch::settings::SettingsStore;
use tokio::runtime::Handle;
use tokio::time::sleep;

const INTERVAL: Duration = Duration::from_secs(3);
const TICK: Duration = Duration::from_millis(10);

fn display_for(store: &SettingsStore, tx: Arc<ScriptedTransaction>) -> DisplayLoop {
    let scheduler = PollScheduler::new(
        Handle::current(),
        tx,
        ResultsBuffer::new(),
        &PollConfig::default(),
    );
    DisplayLoop::new(store.clone(), scheduler, INTERVAL, TICK)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn opening_the_view_refreshes_immediately() {
    let tmp = tempfile::tempdir().unwrap();
    let store = common::store_with(tmp.path(), common::board(&[("Temp", "A0", "1")]));
    let tx = Arc::new(ScriptedTransaction::default());
    let mut display = display_for(&store, tx.clone());
    let mut view = ScriptedView::new(usize::MAX);

    let t0 = Instant::now();
    display.open(t0);
    sleep(Duration::from_millis(100)).await;

    assert_eq!(display.tick(&mut view, t0).unwrap(), DisplayState::Waiting);
    let frame = view.last_frame().unwrap();
    assert!(!frame.warning);
    assert_eq!(frame.info, "Updating data every 3 seconds");
    assert_eq!(frame.field("Temp"), Some("A0:1"));
    assert_eq!(tx.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_pin_table_shows_warning() {
    let store = SettingsStore::new("never-written.json");
    let tx = Arc::new(ScriptedTransaction::default());
    let mut display = display_for(&store, tx.clone());
    let mut view = ScriptedView::new(usize::MAX);

    let t0 = Instant::now();
    display.open(t0);
    display.tick(&mut view, t0).unwrap();
    let frame = view.last_frame().unwrap();
    assert!(frame.warning);
    assert_eq!(frame.info, NO_DATA_WARNING);
    assert!(frame.fields.is_empty());
    assert_eq!(tx.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refreshes_once_per_interval() {
    let tmp = tempfile::tempdir().unwrap();
    let store = common::store_with(
        tmp.path(),
        common::board(&[("Temp", "A0", "1"), ("Light", "A1", "2")]),
    );
    let tx = Arc::new(ScriptedTransaction::default());
    let mut display = display_for(&store, tx.clone());
    let mut view = ScriptedView::new(usize::MAX);

    let t0 = Instant::now();
    display.open(t0);
    sleep(Duration::from_millis(100)).await;
    for ms in [100u64, 1000, 2900] {
        display.tick(&mut view, t0 + Duration::from_millis(ms)).unwrap();
    }
    assert_eq!(tx.calls.load(Ordering::SeqCst), 2);

    display.tick(&mut view, t0 + INTERVAL).unwrap();
    sleep(Duration::from_millis(100)).await;
    display.tick(&mut view, t0 + INTERVAL).unwrap();
    assert_eq!(tx.calls.load(Ordering::SeqCst), 4);

    let frame = view.last_frame().unwrap();
    assert_eq!(frame.field("Temp"), Some("A0:1"));
    assert_eq!(frame.field("Light"), Some("A1:2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_pin_renders_sentinel() {
    let tmp = tempfile::tempdir().unwrap();
    let store = common::store_with(
        tmp.path(),
        common::board(&[("Temp", "A0", "1"), ("Dead", "A5", "1")]),
    );
    let tx = Arc::new(ScriptedTransaction {
        silent_positions: vec!["A5".into()],
        ..Default::default()
    });
    let mut display = display_for(&store, tx);
    let mut view = ScriptedView::new(usize::MAX);

    let t0 = Instant::now();
    display.open(t0);
    sleep(Duration::from_millis(100)).await;
    display.tick(&mut view, t0).unwrap();
    let frame = view.last_frame().unwrap();
    assert_eq!(frame.field("Dead"), Some(SENTINEL_TEXT));
    assert_eq!(frame.field("Temp"), Some("A0:1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn layout_is_fixed_when_the_view_opens() {
    let tmp = tempfile::tempdir().unwrap();
    let store = common::store_with(tmp.path(), common::board(&[("Temp", "A0", "1")]));
    let tx = Arc::new(ScriptedTransaction::default());
    let mut display = display_for(&store, tx);
    let mut view = ScriptedView::new(usize::MAX);

    store.add_pin("Late", pinwatch::settings::PinDef::new("A9", "1"));
    let t0 = Instant::now();
    display.open(t0);
    sleep(Duration::from_millis(100)).await;
    display.tick(&mut view, t0).unwrap();

    assert_eq!(display.layout(), &["Temp".to_string()]);
    let frame = view.last_frame().unwrap();
    assert_eq!(frame.fields.len(), 1);
    assert_eq!(frame.field("Late"), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_request_ends_loop_and_stops_reads() {
    let tmp = tempfile::tempdir().unwrap();
    let store = common::store_with(tmp.path(), common::board(&[("Temp", "A0", "1")]));
    let tx = Arc::new(ScriptedTransaction::default());
    let mut display = display_for(&store, tx.clone());
    let mut view = ScriptedView::new(1);

    let t0 = Instant::now();
    display.open(t0);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(display.tick(&mut view, t0).unwrap(), DisplayState::Waiting);
    assert_eq!(display.tick(&mut view, t0).unwrap(), DisplayState::Closed);
    assert_eq!(display.state(), DisplayState::Closed);
    assert_eq!(view.closed.load(Ordering::SeqCst), 1);

    // Closed is terminal: no further refreshes, no second close.
    let later = t0 + INTERVAL * 2;
    assert_eq!(display.tick(&mut view, later).unwrap(), DisplayState::Closed);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(tx.calls.load(Ordering::SeqCst), 1);
    assert_eq!(view.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_renders_until_closed() {
    let tmp = tempfile::tempdir().unwrap();
    let store = common::store_with(tmp.path(), common::board(&[("Temp", "A0", "1")]));
    let tx = Arc::new(ScriptedTransaction::default());
    let display = display_for(&store, tx);
    let mut view = ScriptedView::new(3);
    let frames = Arc::clone(&view.frames);
    let closed = Arc::clone(&view.closed);

    tokio::task::spawn_blocking(move || display.run(&mut view))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frames.lock().unwrap().len(), 3);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn data_log_records_each_result_once() {
    let tmp = tempfile::tempdir().unwrap();
    let store = common::store_with(
        tmp.path(),
        common::board(&[("Temp", "A0", "1"), ("Light", "A1", "2")]),
    );
    let log_path = tmp.path().join("data.log");
    let tx = Arc::new(ScriptedTransaction::default());
    let mut display = display_for(&store, tx).with_datalog(DataLog::open(&log_path).unwrap());
    let mut view = ScriptedView::new(usize::MAX);

    let t0 = Instant::now();
    display.open(t0);
    sleep(Duration::from_millis(100)).await;
    display.tick(&mut view, t0).unwrap();
    display.tick(&mut view, t0).unwrap();

    let content = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().any(|v| v["pin"] == "Temp" && v["value"] == "A0:1"));
    assert!(lines.iter().any(|v| v["pin"] == "Light" && v["value"] == "A1:2"));
}
