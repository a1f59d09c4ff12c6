use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use folio_core::metadata::extract_record;
use folio_core::{AuthorEntry, CancelToken, LookupTables};
use folio_ingest::{Catalog, TitleCheck, WorkerPool};

#[tokio::test]
async fn pool_never_exceeds_its_concurrency() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut pool = WorkerPool::new(5, CancelToken::new());

    for i in 0..50u64 {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        let started = pool
            .submit(async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1 + i % 4)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i
            })
            .await;
        assert!(started);
    }

    let mut done = pool.join().await;
    done.sort_unstable();
    assert_eq!(done, (0..50).collect::<Vec<_>>());
    assert!(peak.load(Ordering::SeqCst) <= 5, "peak was {}", peak.load(Ordering::SeqCst));
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[derive(Debug, PartialEq)]
enum Outcome {
    Done,
    Cancelled,
}

#[tokio::test]
async fn cancellation_stops_new_tasks_and_in_flight_ones_report_it() {
    let cancel = CancelToken::new();
    let mut pool = WorkerPool::new(2, cancel.clone());
    let running = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let (cancel, running) = (cancel.clone(), running.clone());
        assert!(
            pool.submit(async move {
                running.fetch_add(1, Ordering::SeqCst);
                tokio::select! {
                    () = cancel.cancelled() => Outcome::Cancelled,
                    () = tokio::time::sleep(Duration::from_secs(30)) => Outcome::Done,
                }
            })
            .await
        );
    }
    while running.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }

    // The pool is full: this submit waits for a worker and must give up on cancel.
    let waiter = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        })
    };
    let started = tokio::time::timeout(Duration::from_secs(5), pool.submit(async { Outcome::Done }))
        .await
        .expect("submit returns promptly after cancel");
    assert!(!started);
    waiter.await.unwrap();

    assert!(!pool.submit(async { Outcome::Done }).await);
    assert_eq!(pool.started(), 2);
    let outcomes = tokio::time::timeout(Duration::from_secs(5), pool.join()).await.expect("join");
    assert_eq!(outcomes, vec![Outcome::Cancelled, Outcome::Cancelled]);
}

fn record(name: &str, folder: &str) -> folio_core::BibliographicRecord {
    extract_record(name, folder, &LookupTables::default())
}

fn sorted_paths(catalog: &Catalog) -> Vec<Vec<String>> {
    catalog
        .duplicates()
        .into_iter()
        .map(|mut set| {
            set.paths.sort();
            set.paths
        })
        .collect()
}

#[test]
fn duplicates_are_found_in_either_order() {
    let first = ("a/Sea_Doe — Ocean.docx", record("Sea_Doe — Ocean.docx", "a"));
    let second = ("b/Ocean.pdf", record("Ocean.pdf", "b"));

    let forward = Catalog::new();
    assert_eq!(forward.process(first.0, &first.1), TitleCheck::Unique);
    assert_eq!(forward.process(second.0, &second.1), TitleCheck::Duplicate { first: first.0.to_string() });

    let backward = Catalog::new();
    assert_eq!(backward.process(second.0, &second.1), TitleCheck::Unique);
    assert_eq!(backward.process(first.0, &first.1), TitleCheck::Duplicate { first: second.0.to_string() });

    let expected = vec![vec!["a/Sea_Doe — Ocean.docx".to_string(), "b/Ocean.pdf".to_string()]];
    assert_eq!(sorted_paths(&forward), expected);
    assert_eq!(sorted_paths(&backward), expected);
    assert_eq!(forward.duplicates()[0].title, "Ocean");
    assert_eq!(forward.len(), 2);
    assert!(forward.record("b/Ocean.pdf").is_some());
}

#[test]
fn concurrent_duplicates_land_in_one_set() {
    let catalog = Arc::new(Catalog::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let catalog = catalog.clone();
            std::thread::spawn(move || {
                let path = format!("dir{i}/Ocean.docx");
                catalog.process(&path, &record("Ocean.docx", "x"));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let sets = catalog.duplicates();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].paths.len(), 8);
}

fn ivanov(role: &str, created_at: i64) -> AuthorEntry {
    AuthorEntry {
        name: "Ivanov".into(),
        entry_type: "book".into(),
        role: role.into(),
        description: format!("registered as {role}"),
        avatar_file: String::new(),
        created_at,
        updated_at: created_at,
    }
}

#[test]
fn registry_keeps_the_first_author_record() {
    let catalog = Catalog::new();
    let first = ivanov("editor", 1);
    assert!(catalog.register_author(first.clone()));
    assert!(!catalog.register_author(ivanov("translator", 2)));
    assert_eq!(catalog.author("Ivanov"), Some(first.clone()));

    // Registering through a parsed record does not overwrite either.
    catalog.register(&record("Prose_Ivanov — Ocean.docx", "x"));
    assert_eq!(catalog.author("Ivanov"), Some(first));
}
