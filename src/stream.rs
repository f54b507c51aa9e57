//! Transient token buffer for the in-flight streaming message.
//!
//! High-frequency chunk updates land here so render passes can read the
//! current text without walking the full conversation tree. The buffer is
//! not the system of record; the store's message content is.

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamBuffer {
    current_text: String,
    active_message_id: Option<String>,
    is_active: bool,
}

impl StreamBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the buffer and marks it active for `message_id`.
    pub fn start_stream(&mut self, message_id: impl Into<String>) {
        self.current_text.clear();
        self.active_message_id = Some(message_id.into());
        self.is_active = true;
    }

    /// Appends streamed text. Tokens arriving outside an active stream are
    /// discarded, not queued.
    pub fn append_token(&mut self, text: &str) {
        if !self.is_active || self.active_message_id.is_none() {
            return;
        }

        self.current_text.push_str(text);
    }

    /// Deactivates the buffer but retains `current_text` so a final render
    /// pass can read the complete text before teardown.
    pub fn end_stream(&mut self) {
        self.is_active = false;
        self.active_message_id = None;
    }

    #[must_use]
    pub fn current_text(&self) -> &str {
        &self.current_text
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn active_message_id(&self) -> Option<&str> {
        self.active_message_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_outside_an_active_stream_are_discarded() {
        let mut buffer = StreamBuffer::new();

        buffer.append_token("dropped");
        assert_eq!(buffer.current_text(), "");

        buffer.start_stream("m-1");
        buffer.append_token("kept");
        buffer.end_stream();
        buffer.append_token(" dropped again");

        assert_eq!(buffer.current_text(), "kept");
    }

    #[test]
    fn end_stream_retains_text_until_next_start() {
        let mut buffer = StreamBuffer::new();
        buffer.start_stream("m-1");
        buffer.append_token("final answer");
        buffer.end_stream();

        assert!(!buffer.is_active());
        assert!(buffer.active_message_id().is_none());
        assert_eq!(buffer.current_text(), "final answer");

        buffer.start_stream("m-2");
        assert_eq!(buffer.current_text(), "");
        assert_eq!(buffer.active_message_id(), Some("m-2"));
    }
}
