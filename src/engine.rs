//! Concurrent fan-out of one search over a workspace snapshot.
//!
//! Every class and file is an independent unit submitted to a rayon pool.
//! Units merge into one mutex-guarded ordered set; a shared countdown fires
//! the completion callback exactly once, on whichever worker finishes last.

use parking_lot::Mutex;
use rayon::ThreadPool;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Instant;

use crate::error::{ClassFormatError, SearchError, UnitFailure};
use crate::matcher::{Search, UnitKind};
use crate::result::SearchResult;
use crate::workspace::Snapshot;

/// Stops a running search from starting further units. Units already
/// running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    /// Deduplicated and in total order.
    pub results: Vec<SearchResult>,
    pub diagnostics: Vec<UnitFailure>,
    /// Units never started because the search was cancelled.
    pub skipped: usize,
}

pub struct SearchEngine {
    pool: Arc<ThreadPool>,
}

impl SearchEngine {
    /// `threads == 0` lets rayon pick (one per CPU).
    pub fn new(threads: usize) -> Result<Self, SearchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("class-search-{i}"))
            .build()?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Starts `search` over `snapshot` and returns immediately.
    /// `on_complete` runs exactly once, on a worker thread, or on the calling
    /// thread when the snapshot is empty.
    pub fn run<F>(&self, search: Arc<Search>, snapshot: Snapshot, cancel: CancelToken, on_complete: F)
    where
        F: FnOnce(SearchOutcome) + Send + 'static,
    {
        let total = snapshot.unit_count();
        let fanout = Arc::new(Fanout::new(search, total, cancel, on_complete));
        if total == 0 {
            fanout.complete();
            return;
        }

        for class in snapshot.classes {
            let fanout = Arc::clone(&fanout);
            self.pool.spawn(move || {
                fanout.run_unit(class.name(), || {
                    match fanout.search.create_query_visitor(UnitKind::Class) {
                        Some(visitor) => visitor.visit_class(&class),
                        None => Ok(Vec::new()),
                    }
                });
            });
        }
        for file in snapshot.files {
            let fanout = Arc::clone(&fanout);
            self.pool.spawn(move || {
                fanout.run_unit(file.path(), || {
                    Ok(fanout
                        .search
                        .create_query_visitor(UnitKind::File)
                        .map(|visitor| visitor.visit_file(&file))
                        .unwrap_or_default())
                });
            });
        }
    }

    /// Runs a search and waits for its outcome.
    pub fn run_blocking(
        &self,
        search: Arc<Search>,
        snapshot: Snapshot,
        cancel: CancelToken,
    ) -> Result<SearchOutcome, SearchError> {
        let (tx, rx) = mpsc::channel();
        self.run(search, snapshot, cancel, move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.recv().map_err(|_| SearchError::Interrupted)
    }
}

type Completion = Box<dyn FnOnce(SearchOutcome) + Send>;

struct Fanout {
    search: Arc<Search>,
    results: Mutex<BTreeSet<SearchResult>>,
    diagnostics: Mutex<Vec<UnitFailure>>,
    remaining: AtomicUsize,
    skipped: AtomicUsize,
    cancel: CancelToken,
    on_complete: Mutex<Option<Completion>>,
    started: Instant,
}

impl Fanout {
    fn new<F>(search: Arc<Search>, total: usize, cancel: CancelToken, on_complete: F) -> Self
    where
        F: FnOnce(SearchOutcome) + Send + 'static,
    {
        let on_complete: Completion = Box::new(on_complete);
        Self {
            search,
            results: Mutex::new(BTreeSet::new()),
            diagnostics: Mutex::new(Vec::new()),
            remaining: AtomicUsize::new(total),
            skipped: AtomicUsize::new(0),
            cancel,
            on_complete: Mutex::new(Some(on_complete)),
            started: Instant::now(),
        }
    }

    /// Runs one unit and counts it down whether it succeeded, failed,
    /// panicked, or was skipped.
    fn run_unit<W>(&self, unit: &str, work: W)
    where
        W: FnOnce() -> Result<Vec<SearchResult>, ClassFormatError>,
    {
        if self.cancel.is_cancelled() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        } else {
            match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(Ok(found)) => {
                    if !found.is_empty() {
                        self.results.lock().extend(found);
                    }
                }
                Ok(Err(err)) => self.fail(unit, err.to_string()),
                Err(payload) => self.fail(unit, panic_message(payload.as_ref())),
            }
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.complete();
        }
    }

    fn fail(&self, unit: &str, message: String) {
        log::warn!("search failed for {unit}: {message}");
        self.diagnostics.lock().push(UnitFailure {
            unit: unit.to_string(),
            message,
        });
    }

    fn complete(&self) {
        let Some(on_complete) = self.on_complete.lock().take() else {
            return;
        };
        let results: Vec<SearchResult> = std::mem::take(&mut *self.results.lock())
            .into_iter()
            .collect();
        let mut diagnostics = std::mem::take(&mut *self.diagnostics.lock());
        diagnostics.sort_by(|a, b| a.unit.cmp(&b.unit).then_with(|| a.message.cmp(&b.message)));
        let outcome = SearchOutcome {
            results,
            diagnostics,
            skipped: self.skipped.load(Ordering::Relaxed),
        };
        log::info!(
            "search finished: {} results, {} diagnostics, {} skipped in {:?}",
            outcome.results.len(),
            outcome.diagnostics.len(),
            outcome.skipped,
            self.started.elapsed()
        );
        on_complete(outcome);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return format!("panicked: {s}");
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return format!("panicked: {s}");
    }
    "panicked".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_record::ClassRecord;
    use crate::classfile::fixture::{ClassBuilder, Op};
    use crate::matcher::{Number, NumberMatchMode, TextMatchMode};
    use crate::result::{Location, OwnerKind, ResultKind};
    use crate::workspace::FileRecord;

    fn snapshot(classes: Vec<Vec<u8>>, files: Vec<FileRecord>) -> Snapshot {
        Snapshot {
            classes: classes
                .into_iter()
                .map(|b| Arc::new(ClassRecord::parse(b).unwrap()))
                .collect(),
            files: files.into_iter().map(Arc::new).collect(),
        }
    }

    fn counting_fanout(total: usize) -> (Arc<Fanout>, Arc<AtomicUsize>, mpsc::Receiver<SearchOutcome>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let counter = Arc::clone(&fired);
        let fanout = Fanout::new(Arc::new(Search::new()), total, CancelToken::new(), move |o| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(o);
        });
        (Arc::new(fanout), fired, rx)
    }

    fn hit(owner: &str) -> SearchResult {
        SearchResult {
            owner: owner.to_string(),
            location: Location::Class,
            kind: ResultKind::Text,
            value: owner.to_string(),
            origin: OwnerKind::Class,
        }
    }

    #[test]
    fn empty_snapshot_completes_immediately() {
        let engine = SearchEngine::new(2).unwrap();
        let search = Arc::new(Search::new().text("x", TextMatchMode::Contains).unwrap());
        let outcome = engine
            .run_blocking(search, Snapshot::default(), CancelToken::new())
            .unwrap();
        assert!(outcome.results.is_empty());
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn panicking_unit_is_isolated() {
        let (fanout, fired, rx) = counting_fanout(3);
        fanout.run_unit("a/A", || Ok(vec![hit("a/A")]));
        fanout.run_unit("b/B", || panic!("boom"));
        fanout.run_unit("c/C", || Ok(vec![hit("c/C"), hit("a/A")]));

        let outcome = rx.recv().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.results, vec![hit("a/A"), hit("c/C")]);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].unit, "b/B");
        assert!(outcome.diagnostics[0].message.contains("boom"));
    }

    #[test]
    fn completion_fires_once_under_contention() {
        let units = 64;
        let (fanout, fired, rx) = counting_fanout(units);
        std::thread::scope(|s| {
            for i in 0..units {
                let fanout = &fanout;
                s.spawn(move || fanout.run_unit(&format!("u{i}"), || Ok(vec![hit(&format!("u{i}"))])));
            }
        });
        let outcome = rx.recv().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.results.len(), units);
        fanout.complete();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_units_count_as_complete() {
        let engine = SearchEngine::new(1).unwrap();
        let names: Vec<String> = (0..5).map(|i| format!("p/C{i}")).collect();
        let classes = names.iter().map(|n| ClassBuilder::new(n).build()).collect();
        let cancel = CancelToken::new();
        cancel.cancel();
        let search = Arc::new(Search::new().text("p/", TextMatchMode::StartsWith).unwrap());
        let outcome = engine
            .run_blocking(search, snapshot(classes, vec![]), cancel)
            .unwrap();
        assert_eq!(outcome.skipped, 5);
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn faulting_class_becomes_a_diagnostic() {
        let engine = SearchEngine::new(4).unwrap();
        let good = ClassBuilder::new("a/Good")
            .method(0x0001, "m", "()V", &[], Some(vec![Op::Int(42), Op::Return]))
            .build();
        let bad = ClassBuilder::new("a/Bad")
            .method(0x0001, "m", "()V", &[], Some(vec![Op::Raw(vec![0xEE])]))
            .build();
        let search = Arc::new(Search::new().number(Number::Int(42), NumberMatchMode::Equals));
        let outcome = engine
            .run_blocking(search, snapshot(vec![good, bad], vec![]), CancelToken::new())
            .unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].owner, "a/Good");
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].unit, "a/Bad");
    }

    #[test]
    fn files_are_searched_only_by_text() {
        let engine = SearchEngine::new(2).unwrap();
        let files = vec![FileRecord::new("conf/app.properties", b"limit=42\n".to_vec())];
        let numbers = Arc::new(Search::new().number(Number::Int(42), NumberMatchMode::Equals));
        let outcome = engine
            .run_blocking(numbers, snapshot(vec![], files.clone()), CancelToken::new())
            .unwrap();
        assert!(outcome.results.is_empty());

        let text = Arc::new(Search::new().text("42", TextMatchMode::Contains).unwrap());
        let outcome = engine
            .run_blocking(text, snapshot(vec![], files), CancelToken::new())
            .unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].location, Location::Line { number: 1 });
    }
}
