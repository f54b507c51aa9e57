//! Deterministic mock implementation of the shared `chat_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing.

use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chat_provider::{
    CancelSignal, ChatRequest, ChatTransport, ModelInfo, StreamEvent, TransportError, Usage,
};

/// Stable transport identifier used for explicit startup selection.
pub const MOCK_TRANSPORT_ID: &str = "mock";

/// One scripted transport step.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Emit one text chunk.
    Chunk(String),
    /// A frame the transport cannot parse; logged and skipped, never fatal.
    MalformedFrame(String),
    /// Terminal completion with optional usage accounting.
    Done(Option<Usage>),
    /// Terminal classified failure.
    Fail(TransportError),
    /// Park until the cancel signal is observed, then emit `Cancelled`.
    WaitForCancel,
}

/// Deterministic scripted transport used by `chat_client` tests and local runs.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Vec<ScriptStep>,
    step_delay: Duration,
    models: Vec<ModelInfo>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockTransport {
    /// Creates a transport that replays `script` once per request.
    #[must_use]
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            step_delay: Duration::ZERO,
            models: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a transport that streams `chunks` and completes with `usage`.
    #[must_use]
    pub fn completing(chunks: Vec<&str>, usage: Option<Usage>) -> Self {
        let mut script: Vec<ScriptStep> = chunks
            .into_iter()
            .map(|chunk| ScriptStep::Chunk(chunk.to_string()))
            .collect();
        script.push(ScriptStep::Done(usage));
        Self::new(script)
    }

    /// Creates a transport that streams `chunks` and then fails with `error`.
    #[must_use]
    pub fn failing(chunks: Vec<&str>, error: TransportError) -> Self {
        let mut script: Vec<ScriptStep> = chunks
            .into_iter()
            .map(|chunk| ScriptStep::Chunk(chunk.to_string()))
            .collect();
        script.push(ScriptStep::Fail(error));
        Self::new(script)
    }

    /// Creates a transport that streams `chunks` and then parks until cancelled.
    #[must_use]
    pub fn blocking(chunks: Vec<&str>) -> Self {
        let mut script: Vec<ScriptStep> = chunks
            .into_iter()
            .map(|chunk| ScriptStep::Chunk(chunk.to_string()))
            .collect();
        script.push(ScriptStep::WaitForCancel);
        Self::new(script)
    }

    /// Inserts a fixed pause between scripted steps.
    #[must_use]
    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }

    /// Sets the model list reported by `list_models`.
    #[must_use]
    pub fn with_models(mut self, models: Vec<ModelInfo>) -> Self {
        self.models = models;
        self
    }

    /// Returns every request received so far, in arrival order.
    #[must_use]
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    const CANCEL_POLL_MS: u64 = 5;
}

impl ChatTransport for MockTransport {
    fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(StreamEvent),
    ) -> Result<(), TransportError> {
        let request_id = request.request_id;
        lock_unpoisoned(&self.requests).push(request);

        for step in &self.script {
            if cancel.load(Ordering::SeqCst) {
                emit(StreamEvent::Cancelled { request_id });
                return Ok(());
            }

            if !self.step_delay.is_zero() {
                thread::sleep(self.step_delay);
            }

            match step {
                ScriptStep::Chunk(text) => emit(StreamEvent::Chunk {
                    request_id,
                    text: text.clone(),
                }),
                ScriptStep::MalformedFrame(frame) => {
                    log::warn!("skipping malformed stream frame: {frame}");
                }
                ScriptStep::Done(usage) => {
                    emit(StreamEvent::Done {
                        request_id,
                        usage: *usage,
                    });
                    return Ok(());
                }
                ScriptStep::Fail(error) => {
                    emit(StreamEvent::Error {
                        request_id,
                        error: error.clone(),
                    });
                    return Ok(());
                }
                ScriptStep::WaitForCancel => {
                    while !cancel.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(Self::CANCEL_POLL_MS));
                    }

                    emit(StreamEvent::Cancelled { request_id });
                    return Ok(());
                }
            }
        }

        if cancel.load(Ordering::SeqCst) {
            emit(StreamEvent::Cancelled { request_id });
        } else {
            emit(StreamEvent::Done {
                request_id,
                usage: None,
            });
        }

        Ok(())
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, TransportError> {
        if self.models.is_empty() {
            Ok(chat_provider::fallback_models())
        } else {
            Ok(self.models.clone())
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
