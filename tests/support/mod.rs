#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chat_client::app::App;
use chat_client::session::SessionController;
use chat_provider::ChatTransport;
use history_store::{HistoryStore, MemoryBackend, StorageBackend};

pub type SharedBackend = Arc<Mutex<MemoryBackend>>;

/// App over a shared in-memory backend so tests can observe writes.
pub fn memory_app(debounce: Duration) -> (App, SharedBackend) {
    let backend: SharedBackend = Arc::new(Mutex::new(MemoryBackend::new()));
    let history = HistoryStore::new(Box::new(Arc::clone(&backend)));
    (App::with_save_debounce(history, debounce), backend)
}

pub fn controller_for(transport: impl ChatTransport) -> Arc<SessionController> {
    SessionController::new(Arc::new(transport))
}

pub fn write_count(backend: &SharedBackend) -> u64 {
    backend.lock().expect("backend lock").write_count()
}

pub fn stored_raw(backend: &SharedBackend, key: &str) -> Option<String> {
    backend
        .lock()
        .expect("backend lock")
        .read(key)
        .expect("backend read")
}

/// Drains controller events until `predicate` holds or `timeout` elapses.
pub fn pump_until(
    app: &mut App,
    controller: &SessionController,
    timeout: Duration,
    predicate: impl Fn(&App, &SessionController) -> bool,
) -> bool {
    let start = Instant::now();

    loop {
        controller.drain_events(app);
        if predicate(app, controller) {
            return true;
        }

        if start.elapsed() >= timeout {
            return false;
        }

        thread::sleep(Duration::from_millis(5));
    }
}
