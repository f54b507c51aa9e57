use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use chat_provider::{
    CancelSignal, ChatMessage, ChatRequest, ChatTransport, GenerationSettings, ModelInfo,
    RequestId, StreamEvent, TransportError,
};

use crate::app::{App, GenerationHost};

pub const ERROR_GENERATION_ACTIVE: &str = "Generation already active";

struct ActiveGeneration {
    request_id: RequestId,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

/// Drives one cancellable streaming session at a time.
///
/// The controller never mutates store state directly. Transport workers
/// enqueue events; [`SessionController::drain_events`] applies them to the
/// store in delivery order on the caller's thread. In environments without a
/// ticking loop, callers must pump `drain_events` after enqueuing work to
/// guarantee queued stream state is applied.
pub struct SessionController {
    transport: Arc<dyn ChatTransport>,
    pending_events: Arc<Mutex<VecDeque<StreamEvent>>>,
    next_request_id: AtomicU64,
    active: Mutex<Option<ActiveGeneration>>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            pending_events: Arc::new(Mutex::new(VecDeque::new())),
            next_request_id: AtomicU64::new(1),
            active: Mutex::new(None),
        })
    }

    fn start_internal(
        self: &Arc<Self>,
        model_id: String,
        messages: Vec<ChatMessage>,
        settings: GenerationSettings,
    ) -> Result<RequestId, String> {
        let mut active = self.lock_active();
        if active.is_some() {
            return Err(ERROR_GENERATION_ACTIVE.to_string());
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let cancel = Arc::new(AtomicBool::new(false));
        let request = ChatRequest {
            request_id,
            model_id,
            messages,
            settings,
        };
        let join_handle = self.spawn_worker(request, Arc::clone(&cancel))?;

        *active = Some(ActiveGeneration {
            request_id,
            cancel,
            join_handle: Some(join_handle),
        });

        Ok(request_id)
    }

    fn spawn_worker(
        self: &Arc<Self>,
        request: ChatRequest,
        cancel: CancelSignal,
    ) -> Result<JoinHandle<()>, String> {
        let request_id = request.request_id;
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name(format!("chat-generation-{request_id}"))
            .spawn(move || controller.run_worker(request, cancel))
            .map_err(|error| format!("Failed to spawn generation worker: {error}"))
    }

    fn run_worker(self: Arc<Self>, request: ChatRequest, cancel: CancelSignal) {
        let request_id = request.request_id;
        let terminal_emitted = Arc::new(AtomicBool::new(false));
        let terminal_emitted_for_emit = Arc::clone(&terminal_emitted);
        let controller = Arc::clone(&self);

        let mut emit = move |event: StreamEvent| {
            if event.is_terminal() {
                terminal_emitted_for_emit.store(true, Ordering::SeqCst);
            }

            controller.enqueue_event(event);
        };

        let transport = Arc::clone(&self.transport);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            transport.stream_chat(request, Arc::clone(&cancel), &mut emit)
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => emit(StreamEvent::Error { request_id, error }),
            Err(_) => emit(StreamEvent::Error {
                request_id,
                error: TransportError::Other("transport panicked".to_string()),
            }),
        }

        if !terminal_emitted.load(Ordering::SeqCst) && self.is_active_request(request_id) {
            emit(StreamEvent::Error {
                request_id,
                error: TransportError::Other(
                    "transport exited without a terminal event".to_string(),
                ),
            });
        }
    }

    fn enqueue_event(&self, event: StreamEvent) {
        lock_unpoisoned(&self.pending_events).push_back(event);
    }

    /// Applies queued stream events to `app` in delivery order.
    ///
    /// Terminal events clear the controller slot and reap the finished
    /// worker. Returns the number of events applied.
    pub fn drain_events(&self, app: &mut App) -> usize {
        let mut drained = 0usize;

        loop {
            let event = {
                let mut pending_events = lock_unpoisoned(&self.pending_events);
                pending_events.pop_front()
            };

            let Some(event) = event else {
                break;
            };

            let request_id = event.request_id();
            let terminal = event.is_terminal();

            match event {
                StreamEvent::Chunk { request_id, text } => app.on_stream_chunk(request_id, &text),
                StreamEvent::Done { request_id, usage } => app.on_stream_done(request_id, usage),
                StreamEvent::Error { request_id, error } => {
                    app.on_stream_error(request_id, &error)
                }
                StreamEvent::Cancelled { request_id } => app.on_stream_cancelled(request_id),
            }

            if terminal {
                self.clear_active_if_matching(request_id);
            }

            drained += 1;
        }

        drained
    }

    /// Returns true when a generation request is still occupying the slot.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Asks the transport for its model list. Transports without a live
    /// endpoint report the compiled-in fallback list.
    pub fn list_models(&self) -> Result<Vec<ModelInfo>, TransportError> {
        self.transport.list_models()
    }

    #[must_use]
    pub fn active_request_id(&self) -> Option<RequestId> {
        self.lock_active().as_ref().map(|active| active.request_id)
    }

    fn clear_active_if_matching(&self, request_id: RequestId) {
        let mut active = self.lock_active();
        let matches = active.as_ref().map(|active| active.request_id) == Some(request_id);
        if !matches {
            return;
        }

        let mut completed = match active.take() {
            Some(completed) => completed,
            None => return,
        };

        if let Some(join_handle) = completed.join_handle.take() {
            let is_current_thread = join_handle.thread().id() == thread::current().id();
            if !is_current_thread && join_handle.is_finished() {
                let _ = join_handle.join();
            }
        }
    }

    fn is_active_request(&self, request_id: RequestId) -> bool {
        self.lock_active().as_ref().map(|active| active.request_id) == Some(request_id)
    }

    fn cancel_internal(&self, request_id: RequestId) {
        let active = self.lock_active();
        if let Some(active) = active.as_ref() {
            if active.request_id == request_id {
                active.cancel.store(true, Ordering::SeqCst);
            }
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveGeneration>> {
        lock_unpoisoned(&self.active)
    }
}

impl GenerationHost for Arc<SessionController> {
    fn start_generation(
        &mut self,
        model_id: String,
        messages: Vec<ChatMessage>,
        settings: GenerationSettings,
    ) -> Result<RequestId, String> {
        self.start_internal(model_id, messages, settings)
    }

    fn cancel_generation(&mut self, request_id: RequestId) {
        self.cancel_internal(request_id);
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
