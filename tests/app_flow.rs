mod support;

use std::time::Duration;

use chat_client::provider::{TransportError, Usage};
use chat_provider_mock::MockTransport;
use history_store::MessageRole;
use pretty_assertions::assert_eq;
use support::{controller_for, memory_app, pump_until};

#[test]
fn streamed_send_accumulates_chunks_and_usage_into_history() {
    let controller = controller_for(MockTransport::completing(
        vec!["Hi", " there"],
        Some(Usage::totalled(5)),
    ));
    let mut host = controller.clone();
    let (mut app, _backend) = memory_app(Duration::from_millis(50));

    let conversation_id = app.create_conversation(None);
    app.send_message("Hello", &mut host);
    assert!(app.is_generating());

    let settled = pump_until(
        &mut app,
        &controller,
        Duration::from_secs(3),
        |app, controller| !app.is_generating() && !controller.is_active(),
    );
    assert!(settled, "stream did not settle");

    let conversation = app.conversation(&conversation_id).expect("conversation");
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[0].role, MessageRole::User);
    assert_eq!(conversation.messages[0].content, "Hello");
    assert_eq!(conversation.messages[1].role, MessageRole::Assistant);
    assert_eq!(conversation.messages[1].content, "Hi there");
    assert_eq!(conversation.messages[1].token_count, Some(5));
    assert_eq!(conversation.metadata.message_count, 2);
    assert_eq!(conversation.metadata.total_tokens, 5);
    assert!(app.error().is_none());

    // Title derived once from the first user message.
    assert_eq!(conversation.title, "Hello");
}

#[test]
fn transport_failure_preserves_partial_content_and_classifies_the_error() {
    let controller = controller_for(MockTransport::failing(
        vec!["partial "],
        TransportError::Auth("401 unauthorized".to_string()),
    ));
    let mut host = controller.clone();
    let (mut app, _backend) = memory_app(Duration::from_millis(50));

    let conversation_id = app.create_conversation(None);
    app.send_message("Hello", &mut host);

    let settled = pump_until(
        &mut app,
        &controller,
        Duration::from_secs(3),
        |app, controller| !app.is_generating() && !controller.is_active(),
    );
    assert!(settled, "errored stream did not settle");

    let conversation = app.conversation(&conversation_id).expect("conversation");
    let assistant = &conversation.messages[1];
    assert_eq!(assistant.content, "partial ");
    assert!(assistant.error);
    assert!(assistant.token_count.is_none());
    assert_eq!(
        app.error(),
        Some("API key is missing or invalid. Check your provider credentials.")
    );

    // The banner is transient and clearable; history keeps the partial.
    app.clear_error();
    assert!(app.error().is_none());
    assert_eq!(
        app.conversation(&conversation_id).expect("conversation").messages[1].content,
        "partial "
    );
}

#[test]
fn consecutive_sends_replay_the_growing_history_to_the_transport() {
    let transport = std::sync::Arc::new(MockTransport::completing(vec!["answer"], None));
    let controller = chat_client::session::SessionController::new(transport.clone());
    let mut host = controller.clone();
    let (mut app, _backend) = memory_app(Duration::from_millis(50));
    app.create_conversation(None);

    app.send_message("first question", &mut host);
    assert!(pump_until(
        &mut app,
        &controller,
        Duration::from_secs(3),
        |app, controller| !app.is_generating() && !controller.is_active(),
    ));

    app.send_message("second question", &mut host);
    assert!(pump_until(
        &mut app,
        &controller,
        Duration::from_secs(3),
        |app, controller| !app.is_generating() && !controller.is_active(),
    ));

    let conversation = app.active_conversation().expect("conversation");
    assert_eq!(conversation.messages.len(), 4);
    assert_eq!(conversation.metadata.message_count, 4);
    let contents: Vec<&str> = conversation
        .messages
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec!["first question", "answer", "second question", "answer"]
    );

    // Each request carried the full prior history, minus its placeholder.
    let recorded = transport.recorded_requests();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].messages.len(), 1);
    assert_eq!(recorded[1].messages.len(), 3);
}

#[test]
fn fetched_model_list_installs_and_persists_through_the_store() {
    let controller = controller_for(MockTransport::completing(vec![], None));
    let (mut app, backend) = memory_app(Duration::from_millis(50));

    let models = controller.list_models().expect("model list");
    assert_eq!(models, chat_client::provider::fallback_models());

    app.set_models(models.clone());

    assert_eq!(app.models(), models.as_slice());
    assert!(support::stored_raw(&backend, history_store::MODELS_KEY).is_some());
}
