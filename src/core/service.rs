//! Shared console service
//!
//! A cheaply clonable handle around one [`ConsoleModel`]. Producers (process
//! reader threads) call `write` concurrently; the model is mutated under a
//! single mutex and listeners are notified after the lock is released, so a
//! listener may call straight back into the service.
//!
//! The service also owns the stdin slot: whichever process bound itself last
//! and is still bound receives the text the UI submits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;

use super::term::{ConsoleDelta, ConsoleLine, ConsoleModel, StreamKind};
use crate::config::{Config, TabSettings};

/// Handle returned when registering a callback
pub type ListenerId = u64;

/// Receives the delta of every visible change
pub type DeltaListener = Arc<dyn Fn(ConsoleDelta) + Send + Sync>;

/// Receives text submitted as process input
pub type StdinConsumer = Arc<dyn Fn(&str) + Send + Sync>;

/// Told whether a stdin consumer is bound after every change of the slot
pub type StdinWatcher = Arc<dyn Fn(bool) + Send + Sync>;

/// Identifies one live `bind_stdin` registration
pub type BindingId = u64;

/// Lines together with what is needed to follow them across evictions
#[derive(Clone, Debug)]
pub struct ConsoleSnapshot {
    /// Stable number of `lines[0]`, i.e. lines evicted so far
    pub first_line: usize,
    pub lines: Vec<ConsoleLine>,
    pub cursor: (usize, usize),
}

/// Shared console coordinator
#[derive(Clone)]
pub struct ConsoleService {
    inner: Arc<Inner>,
}

struct Inner {
    model: Mutex<ConsoleModel>,
    listeners: RwLock<Vec<(ListenerId, DeltaListener)>>,
    stdin: Mutex<StdinSlot>,
    stdin_watchers: RwLock<Vec<(ListenerId, StdinWatcher)>>,
    stdin_notify: Mutex<NotifyState>,
    next_id: AtomicU64,
}

/// Stdin routing: live bindings stack on top of a directly set consumer
#[derive(Default)]
struct StdinSlot {
    base: Option<StdinConsumer>,
    /// Most recent last
    bindings: Vec<(BindingId, StdinConsumer)>,
}

impl StdinSlot {
    fn current(&self) -> Option<&StdinConsumer> {
        self.bindings
            .last()
            .map(|(_, consumer)| consumer)
            .or(self.base.as_ref())
    }
}

/// Watcher delivery is single-flight; changes made meanwhile set `dirty`
#[derive(Default)]
struct NotifyState {
    running: bool,
    dirty: bool,
}

impl ConsoleService {
    pub fn new(max_lines: usize, tabs: Arc<dyn TabSettings>) -> Self {
        Self {
            inner: Arc::new(Inner {
                model: Mutex::new(ConsoleModel::new(max_lines, tabs)),
                listeners: RwLock::new(Vec::new()),
                stdin: Mutex::new(StdinSlot::default()),
                stdin_watchers: RwLock::new(Vec::new()),
                stdin_notify: Mutex::new(NotifyState::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_lines, Arc::new(config.tabs.clone()))
    }

    /// Feed process output. Safe to call from any number of threads.
    pub fn write(&self, chunk: &str, stream: StreamKind) -> ConsoleDelta {
        let delta = self.model().write(chunk, stream);
        self.notify(delta);
        delta
    }

    pub fn clear(&self) -> ConsoleDelta {
        let delta = self.model().clear();
        self.notify(delta);
        delta
    }

    /// Independent copy of every line
    pub fn create_lines_snapshot(&self) -> Vec<ConsoleLine> {
        self.model().lines().to_vec()
    }

    pub fn line_count(&self) -> usize {
        self.model().line_count()
    }

    pub fn cursor(&self) -> (usize, usize) {
        self.model().cursor()
    }

    pub fn text(&self) -> String {
        self.model().text()
    }

    /// Copy of every line, the cursor and the eviction count, taken atomically
    pub fn snapshot(&self) -> ConsoleSnapshot {
        let model = self.model();
        ConsoleSnapshot {
            first_line: model.evicted_lines(),
            lines: model.lines().to_vec(),
            cursor: model.cursor(),
        }
    }

    pub fn add_listener(&self, listener: impl Fn(ConsoleDelta) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id();
        let listener: DeltaListener = Arc::new(listener);
        write_lock(&self.inner.listeners).push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        remove_entry(&self.inner.listeners, id)
    }

    /// Forward user input to the bound consumer. Returns false, discarding
    /// the text, when nothing is bound.
    pub fn submit_stdin(&self, text: &str) -> bool {
        let consumer = self.stdin_consumer();
        match consumer {
            Some(consumer) => {
                consumer(text);
                true
            }
            None => {
                tracing::trace!("No stdin consumer, dropped {} bytes", text.len());
                false
            }
        }
    }

    /// Replace the stdin consumer, returning the previous one. Live bindings
    /// are discarded; their guards then release nothing.
    pub fn set_stdin_consumer(&self, consumer: Option<StdinConsumer>) -> Option<StdinConsumer> {
        let previous = {
            let mut slot = lock(&self.inner.stdin);
            let previous = slot.current().cloned();
            slot.bindings.clear();
            slot.base = consumer;
            previous
        };
        self.notify_stdin_watchers();
        previous
    }

    /// Bind `consumer` until the returned guard is dropped or
    /// [`release_stdin`](Self::release_stdin) is called with its id. Input
    /// goes to the most recent live binding.
    pub fn bind_stdin(&self, consumer: StdinConsumer) -> StdinBinding {
        let id = self.next_id();
        lock(&self.inner.stdin).bindings.push((id, consumer));
        self.notify_stdin_watchers();
        StdinBinding {
            service: self.clone(),
            id,
        }
    }

    /// Drop one binding, wherever it sits in the stack. Returns false when it
    /// was already gone.
    pub fn release_stdin(&self, id: BindingId) -> bool {
        let removed = {
            let mut slot = lock(&self.inner.stdin);
            let before = slot.bindings.len();
            slot.bindings.retain(|(entry, _)| *entry != id);
            slot.bindings.len() != before
        };
        if removed {
            self.notify_stdin_watchers();
        }
        removed
    }

    pub fn stdin_consumer(&self) -> Option<StdinConsumer> {
        lock(&self.inner.stdin).current().cloned()
    }

    pub fn has_stdin_consumer(&self) -> bool {
        lock(&self.inner.stdin).current().is_some()
    }

    /// Observe the stdin slot. Watchers may run on whichever thread changed
    /// the slot; the last value delivered always matches the slot.
    pub fn watch_stdin_consumer(&self, watcher: impl Fn(bool) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id();
        let watcher: StdinWatcher = Arc::new(watcher);
        write_lock(&self.inner.stdin_watchers).push((id, watcher));
        id
    }

    pub fn unwatch_stdin_consumer(&self, id: ListenerId) -> bool {
        remove_entry(&self.inner.stdin_watchers, id)
    }

    fn model(&self) -> MutexGuard<'_, ConsoleModel> {
        lock(&self.inner.model)
    }

    fn next_id(&self) -> ListenerId {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Deliver the current slot state to watchers. A change made while
    /// another thread delivers is picked up by that thread's loop, so the
    /// final delivery reads the final state.
    fn notify_stdin_watchers(&self) {
        {
            let mut state = lock(&self.inner.stdin_notify);
            state.dirty = true;
            if state.running {
                return;
            }
            state.running = true;
        }
        let _guard = NotifyGuard(&self.inner.stdin_notify);

        loop {
            {
                let mut state = lock(&self.inner.stdin_notify);
                if !state.dirty {
                    state.running = false;
                    return;
                }
                state.dirty = false;
            }

            let bound = self.has_stdin_consumer();
            let watchers: Vec<StdinWatcher> = read_lock(&self.inner.stdin_watchers)
                .iter()
                .map(|(_, watcher)| Arc::clone(watcher))
                .collect();
            for watcher in watchers {
                watcher(bound);
            }
        }
    }

    /// Call listeners on a snapshot of the list, outside every lock
    fn notify(&self, delta: ConsoleDelta) {
        if delta == ConsoleDelta::None {
            return;
        }
        let listeners: Vec<DeltaListener> = read_lock(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(delta);
        }
    }
}

/// Scoped stdin binding; dropping it removes this binding only
pub struct StdinBinding {
    service: ConsoleService,
    id: BindingId,
}

impl StdinBinding {
    pub fn id(&self) -> BindingId {
        self.id
    }
}

impl Drop for StdinBinding {
    fn drop(&mut self) {
        self.service.release_stdin(self.id);
    }
}

/// Frees the watcher delivery slot if a watcher panics
struct NotifyGuard<'a>(&'a Mutex<NotifyState>);

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            lock(self.0).running = false;
        }
    }
}

// The model is structurally valid between characters, so a panic in another
// holder does not leave it unusable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn remove_entry<F: ?Sized>(list: &RwLock<Vec<(ListenerId, Arc<F>)>>, id: ListenerId) -> bool {
    let mut entries = write_lock(list);
    let before = entries.len();
    entries.retain(|(entry, _)| *entry != id);
    entries.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TabConfig;

    fn service(max_lines: usize) -> ConsoleService {
        ConsoleService::new(max_lines, Arc::new(TabConfig::default()))
    }

    #[test]
    fn test_listeners_receive_visible_deltas() {
        let service = service(100);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = service.add_listener(move |delta| sink.lock().unwrap().push(delta));

        service.write("abc", StreamKind::Stdout);
        service.write("\x1b[1m", StreamKind::Stdout);
        service.clear();
        assert!(service.remove_listener(id));
        assert!(!service.remove_listener(id));
        service.write("ignored", StreamKind::Stdout);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConsoleDelta::LinesChanged { from: 0, to: 0 },
                ConsoleDelta::Cleared,
            ]
        );
    }

    #[test]
    fn test_listener_can_reenter_service() {
        let service = service(100);
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let handle = service.clone();
        let sink = Arc::clone(&snapshots);
        service.add_listener(move |_| {
            let text: Vec<String> = handle
                .create_lines_snapshot()
                .iter()
                .map(ConsoleLine::text)
                .collect();
            sink.lock().unwrap().push(text);
        });

        service.write("one\ntwo", StreamKind::Stdout);
        assert_eq!(*snapshots.lock().unwrap(), vec![vec!["one", "two"]]);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let service = service(100);
        service.write("before", StreamKind::Stdout);
        let snapshot = service.create_lines_snapshot();
        service.write("\rafter!", StreamKind::Stdout);

        assert_eq!(snapshot[0].text(), "before");
        assert_eq!(service.text(), "after!");
    }

    #[test]
    fn test_concurrent_producers_keep_chunks_whole() {
        let service = service(10_000);
        let producers: Vec<_> = (0..4)
            .map(|n| {
                let service = service.clone();
                thread::spawn(move || {
                    let stream = if n % 2 == 0 { StreamKind::Stdout } else { StreamKind::Stderr };
                    for i in 0..100 {
                        service.write(&format!("producer {} line {}\n", n, i), stream);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let lines = service.create_lines_snapshot();
        assert_eq!(lines.len(), 401);
        assert!(lines[..400]
            .iter()
            .all(|line| line.text().starts_with("producer ")));
        assert!(lines[400].is_empty());
        for line in &lines {
            assert!(line.spans_are_canonical());
        }
    }

    #[test]
    fn test_scrollback_reports_reset_to_listeners() {
        let service = service(3);
        let resets = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&resets);
        service.add_listener(move |delta| {
            if delta == ConsoleDelta::ResetAll {
                *sink.lock().unwrap() += 1;
            }
        });

        service.write("a\nb\nc\nd\n", StreamKind::Stdout);
        assert_eq!(service.line_count(), 3);
        assert_eq!(*resets.lock().unwrap(), 1);
    }

    #[test]
    fn test_stdin_without_consumer_is_discarded() {
        let service = service(10);
        assert!(!service.has_stdin_consumer());
        assert!(!service.submit_stdin("ls\n"));
    }

    #[test]
    fn test_stdin_binding_restores_previous() {
        let service = service(10);
        let received = Arc::new(Mutex::new(Vec::<String>::new()));

        let outer_sink = Arc::clone(&received);
        let outer: StdinConsumer = Arc::new(move |text: &str| {
            outer_sink.lock().unwrap().push(format!("outer:{}", text));
        });
        assert!(service.set_stdin_consumer(Some(outer)).is_none());

        {
            let inner_sink = Arc::clone(&received);
            let _binding = service.bind_stdin(Arc::new(move |text: &str| {
                inner_sink.lock().unwrap().push(format!("inner:{}", text));
            }));
            assert!(service.submit_stdin("a"));
        }
        assert!(service.submit_stdin("b"));

        assert_eq!(*received.lock().unwrap(), vec!["inner:a", "outer:b"]);
    }

    fn recording_consumer(name: &'static str, sink: &Arc<Mutex<Vec<String>>>) -> StdinConsumer {
        let sink = Arc::clone(sink);
        Arc::new(move |text: &str| sink.lock().unwrap().push(format!("{}:{}", name, text)))
    }

    #[test]
    fn test_stdin_bindings_release_out_of_order() {
        let service = service(10);
        let received = Arc::new(Mutex::new(Vec::new()));

        let first = service.bind_stdin(recording_consumer("A", &received));
        let second = service.bind_stdin(recording_consumer("B", &received));
        assert!(service.submit_stdin("0"));

        // A exits while B still runs: input keeps going to B
        drop(first);
        assert!(service.submit_stdin("1"));

        // B exits: nothing is left, A's consumer is not revived
        drop(second);
        assert!(!service.submit_stdin("2"));
        assert!(!service.has_stdin_consumer());

        assert_eq!(*received.lock().unwrap(), vec!["B:0", "B:1"]);
    }

    #[test]
    fn test_release_stdin_by_id() {
        let service = service(10);
        let received = Arc::new(Mutex::new(Vec::new()));

        let binding = service.bind_stdin(recording_consumer("A", &received));
        assert!(service.release_stdin(binding.id()));
        assert!(!service.release_stdin(binding.id()));
        assert!(!service.submit_stdin("x"));

        // Dropping the guard afterwards leaves a newer binding alone
        let newer = service.bind_stdin(recording_consumer("B", &received));
        drop(binding);
        assert!(service.submit_stdin("y"));
        drop(newer);

        assert_eq!(*received.lock().unwrap(), vec!["B:y"]);
    }

    #[test]
    fn test_set_stdin_consumer_overrides_bindings() {
        let service = service(10);
        let received = Arc::new(Mutex::new(Vec::new()));

        let binding = service.bind_stdin(recording_consumer("bound", &received));
        let previous = service.set_stdin_consumer(Some(recording_consumer("set", &received)));
        assert!(previous.is_some());

        drop(binding);
        assert!(service.submit_stdin("x"));
        assert_eq!(*received.lock().unwrap(), vec!["set:x"]);
    }

    #[test]
    fn test_stdin_watchers_end_on_current_state() {
        let service = service(10);
        let last_seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last_seen);
        service.watch_stdin_consumer(move |bound| *sink.lock().unwrap() = Some(bound));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let binding = service.bind_stdin(Arc::new(|_: &str| {}));
                        drop(binding);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(!service.has_stdin_consumer());
        assert_eq!(*last_seen.lock().unwrap(), Some(false));
    }

    #[test]
    fn test_watcher_may_change_slot() {
        let service = service(10);
        let states = Arc::new(Mutex::new(Vec::new()));
        let handle = service.clone();
        let sink = Arc::clone(&states);
        service.watch_stdin_consumer(move |bound| {
            sink.lock().unwrap().push(bound);
            if bound {
                handle.set_stdin_consumer(None);
            }
        });

        let _binding = service.bind_stdin(Arc::new(|_: &str| {}));
        assert!(!service.has_stdin_consumer());
        assert_eq!(*states.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_snapshot_numbers_lines_across_eviction() {
        let service = service(3);
        service.write("a\nb\nc\nd\n", StreamKind::Stdout);

        let snapshot = service.snapshot();
        assert_eq!(snapshot.first_line, 2);
        assert_eq!(snapshot.cursor, (2, 0));
        let texts: Vec<String> = snapshot.lines.iter().map(ConsoleLine::text).collect();
        assert_eq!(texts, vec!["c", "d", ""]);
    }

    #[test]
    fn test_stdin_watchers_observe_slot() {
        let service = service(10);
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        let id = service.watch_stdin_consumer(move |bound| sink.lock().unwrap().push(bound));

        {
            let _binding = service.bind_stdin(Arc::new(|_: &str| {}));
            assert!(service.has_stdin_consumer());
            assert!(service.stdin_consumer().is_some());
        }
        assert!(service.unwatch_stdin_consumer(id));
        service.set_stdin_consumer(None);

        assert_eq!(*states.lock().unwrap(), vec![true, false]);
    }
}
