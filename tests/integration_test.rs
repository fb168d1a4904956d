mod common;

use common::{SharedTable, StubBackend};
use sslcount::lifecycle::{ChangeSink, Coordinator, Phase};
use sslcount::poll::ChangeEvent;
use sslcount::target::Target;
use sslcount::SslcountError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[test]
fn test_error_types() {
    let err = SslcountError::TargetNotFound {
        path: "/usr/lib/libssl.so.3".to_string(),
    };
    assert!(err.to_string().contains("/usr/lib/libssl.so.3"));
    assert!(err.is_setup_failure());

    let err = SslcountError::CloseFailed {
        resource: "program 7 (entry_ssl_read)".to_string(),
        reason: "not found".to_string(),
    };
    assert!(!err.is_setup_failure());
}

#[test]
fn test_version_const() {
    assert!(!sslcount::VERSION.is_empty());
}

/// Sink shared with the test so events can be inspected while running.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<ChangeEvent>>>);

impl ChangeSink for SharedSink {
    fn record(&mut self, event: &ChangeEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

#[tokio::test(start_paused = true)]
async fn test_counts_flow_from_table_to_sink() {
    let table = SharedTable::default();
    let released = Arc::new(Mutex::new(Vec::new()));
    let backend = StubBackend {
        table: table.clone(),
        closers: vec!["bundle", "entry", "return"],
        released: released.clone(),
        fail: false,
    };
    let sink = SharedSink::default();
    let token = CancellationToken::new();

    let run = {
        let token = token.clone();
        let sink = sink.clone();
        tokio::spawn(async move {
            let mut coordinator = Coordinator::with_sink(token, sink);
            let summary = coordinator.run(backend, &Target::default()).await;
            (summary, coordinator.phase())
        })
    };

    table.set(4242, 1);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(sink.0.lock().unwrap().len(), 1);

    // Unchanged counts are not reported again.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.0.lock().unwrap().len(), 1);

    table.set(4242, 7);
    tokio::time::sleep(Duration::from_secs(1)).await;

    token.cancel();
    let (summary, phase) = run.await.unwrap();
    let summary = summary.unwrap();

    assert_eq!(phase, Phase::Stopped);
    assert_eq!(summary.polls, 3);
    let events = sink.0.lock().unwrap().clone();
    let counts: Vec<u32> = events.iter().map(|e| e.count).collect();
    assert_eq!(counts, vec![1, 7]);
    assert_eq!(
        events[1].to_string(),
        "table=rcount key=4242 [1092] count=7"
    );
    assert_eq!(
        *released.lock().unwrap(),
        vec!["return", "entry", "bundle"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_setup_rolls_back_and_returns_error() {
    let released = Arc::new(Mutex::new(Vec::new()));
    let backend = StubBackend {
        table: SharedTable::default(),
        closers: vec!["bundle"],
        released: released.clone(),
        fail: true,
    };

    let mut coordinator = Coordinator::with_sink(CancellationToken::new(), Vec::new());
    let err = coordinator
        .run(backend, &Target::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SslcountError::TargetNotFound { .. }));
    assert_eq!(coordinator.phase(), Phase::Stopped);
    assert_eq!(*released.lock().unwrap(), vec!["bundle"]);
}
