use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use docchat_model::ErrorKind;
use docchat_test_model::{
    PresetResponse, TestEmbeddingProvider, TestModelProvider,
};
use serde_json::{Map, json};
use uuid::Uuid;

use super::*;
use crate::document::DocumentRecord;
use crate::index::IndexConfig;
use crate::model_client::EmbeddingClient;

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const RUST_QUESTION: &str = "What is Rust programming?";

#[derive(Default)]
struct MemorySummaryStore {
    saved: Mutex<Vec<SavedSummary>>,
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn save(
        &self,
        summary: &ConversationSummary,
    ) -> Result<SavedSummary> {
        let saved = SavedSummary {
            id: Uuid::new_v4(),
            title: summary.title.clone(),
            summary: summary.summary.clone(),
            created_at: Utc::now(),
        };
        self.saved.lock().unwrap().push(saved.clone());
        Ok(saved)
    }
}

fn session_with(provider: &TestModelProvider) -> ChatSession {
    ChatSessionBuilder::with_model_provider(provider.clone())
        .system_prompt(SYSTEM_PROMPT)
        .build()
}

/// Builds an index over one Rust document, consuming one queued summary.
async fn rust_index(provider: &mut TestModelProvider) -> Arc<DocumentIndex> {
    let index = DocumentIndex::in_memory(
        ModelClient::new(provider.clone()),
        EmbeddingClient::new(TestEmbeddingProvider::default()),
        IndexConfig {
            similarity_top_k: 1,
            ..Default::default()
        },
    );
    let mut fields = Map::new();
    fields.insert("title".to_owned(), json!("Rust"));
    let document = DocumentRecord {
        id: "rust".to_owned(),
        title: "Rust".to_owned(),
        summary: String::new(),
        fields,
    };

    provider.add_text_response(
        "Rust is a systems programming language focused on safety.",
    );
    index.rebuild(&[document]).await.unwrap();
    Arc::new(index)
}

fn last_user_content(provider: &TestModelProvider) -> String {
    let requests = provider.requests();
    let req = requests.last().unwrap();
    req.messages.last().unwrap().content().to_owned()
}

#[tokio::test]
async fn test_turns_grow_history() {
    let mut provider = TestModelProvider::default();
    for reply in ["Hello!", "Rust is a language.", "You're welcome."] {
        provider.add_text_response(reply);
    }
    let mut session = session_with(&provider);
    assert_eq!(session.len(), 1);

    for (turn, text) in ["Hi", "What is Rust?", "Thanks"].iter().enumerate() {
        session.send(text).await.unwrap();
        assert_eq!(session.len(), 2 * (turn + 1) + 1);
    }

    let history = session.history();
    assert_eq!(history[0], (Role::System, SYSTEM_PROMPT));
    assert_eq!(history[3], (Role::User, "What is Rust?"));
    assert_eq!(history[4], (Role::Assistant, "Rust is a language."));
    for (idx, (role, _)) in history.iter().enumerate().skip(1) {
        let expected = if idx % 2 == 1 {
            Role::User
        } else {
            Role::Assistant
        };
        assert_eq!(*role, expected);
    }

    // Every request carries the full history.
    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[2].messages.len(), 6);
}

#[tokio::test]
async fn test_reset() {
    let mut provider = TestModelProvider::default();
    provider.add_text_response("Hello!");
    provider.add_text_response("Hello again!");
    let mut session = session_with(&provider);

    session.send("Hi").await.unwrap();
    session.reset();
    assert!(session.is_empty());
    assert!(session.history().is_empty());

    session.send("Hi again").await.unwrap();
    assert_eq!(session.len(), 2);
    let requests = provider.requests();
    assert_eq!(requests[1].messages, [ModelMessage::User(
        "Hi again".to_owned()
    )]);
}

#[tokio::test]
async fn test_failed_turn_keeps_history() {
    let mut provider = TestModelProvider::default();
    provider.add_text_response("Hello!");
    provider.add_response(PresetResponse::with_events([]));
    let mut session = session_with(&provider);
    session.send("Hi").await.unwrap();

    let err = session.send("Are you there?").await;
    assert!(matches!(err, Err(Error::EmptyCompletion)));
    assert_eq!(session.len(), 3);

    // The script is exhausted now.
    let err = session.send("Hello?").await.unwrap_err();
    assert_eq!(err.model_error_kind(), Some(ErrorKind::Other));
    assert_eq!(session.len(), 3);
    assert_eq!(session.history()[2], (Role::Assistant, "Hello!"));
}

#[tokio::test]
async fn test_on_delta() {
    let mut provider = TestModelProvider::default();
    provider.add_text_response("Hello there, friend!");
    let streamed = Arc::new(Mutex::new(vec![]));
    let mut session = ChatSessionBuilder::with_model_provider(provider)
        .on_delta({
            let streamed = Arc::clone(&streamed);
            move |delta| streamed.lock().unwrap().push(delta.to_owned())
        })
        .build();

    let reply = session.send("Hi").await.unwrap();
    let streamed = streamed.lock().unwrap();
    assert!(streamed.len() > 1);
    assert_eq!(streamed.concat(), reply);
}

#[tokio::test]
async fn test_summarize() {
    let mut provider = TestModelProvider::default();
    provider.add_text_response("Ownership moves values.");
    provider.add_text_response(
        r#"{"title": "Ownership", "summary": "The user asked about moves."}"#,
    );
    let mut session = session_with(&provider);
    session.send("How does ownership work?").await.unwrap();

    let summary = session.summarize().await.unwrap();
    assert_eq!(summary, ConversationSummary {
        title: "Ownership".to_owned(),
        summary: "The user asked about moves.".to_owned(),
    });
    assert_eq!(session.len(), 3);

    let requests = provider.requests();
    let req = &requests[1];
    assert_eq!(req.response_format, ResponseFormat::JsonObject);
    assert_eq!(req.messages.len(), 4);
    assert!(last_user_content(&provider).contains("JSON"));
}

#[tokio::test]
async fn test_summarize_invalid_reply() {
    let mut provider = TestModelProvider::default();
    provider.add_text_response(r#"{"title": "Missing summary"}"#);
    let session = session_with(&provider);

    let err = session.summarize().await;
    assert!(matches!(err, Err(Error::InvalidSummary(_))));
    assert_eq!(session.len(), 1);
}

#[tokio::test]
async fn test_summarize_and_persist() {
    let mut provider = TestModelProvider::default();
    provider.add_text_response(r#"{"title": "Greeting", "summary": "Hi."}"#);
    let store = Arc::new(MemorySummaryStore::default());
    let session = ChatSessionBuilder::with_model_provider(provider)
        .with_summary_store(store.clone())
        .build();

    let saved = session.summarize_and_persist().await.unwrap();
    assert_eq!(saved.title, "Greeting");
    assert_eq!(saved.summary, "Hi.");
    let stored = store.saved.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, saved.id);
}

#[tokio::test]
async fn test_persist_without_store() {
    let session =
        ChatSessionBuilder::with_model_provider(TestModelProvider::default())
            .build();
    let summary = ConversationSummary {
        title: "T".to_owned(),
        summary: "S".to_owned(),
    };
    let err = session.persist(&summary).await;
    assert!(matches!(err, Err(Error::Storage(_))));
}

#[tokio::test]
async fn test_augmented_turn() {
    let mut provider = TestModelProvider::default();
    let index = rust_index(&mut provider).await;
    provider.add_text_response("Rust is built for safety.");
    provider.add_text_response("Rust is a safe systems language.");
    let mut session = ChatSessionBuilder::with_model_provider(provider.clone())
        .system_prompt(SYSTEM_PROMPT)
        .with_index(index)
        .retrieval_mode(RetrievalMode::Always)
        .build();

    let reply = session.send(RUST_QUESTION).await.unwrap();
    assert_eq!(reply, "Rust is a safe systems language.");

    let content = last_user_content(&provider);
    assert!(content.contains("Rust is built for safety."));
    assert!(content.ends_with(RUST_QUESTION));

    let user = &session.conversation().items()[1];
    assert_eq!(user.transcript(), RUST_QUESTION);
    assert_eq!(user.model_content(), content);
}

#[tokio::test]
async fn test_no_information_never_augments() {
    let mut provider = TestModelProvider::default();
    let index = rust_index(&mut provider).await;
    provider.add_text_response("no information");
    provider.add_text_response("I don't know.");
    let mut session = ChatSessionBuilder::with_model_provider(provider.clone())
        .with_index(index)
        .retrieval_mode(RetrievalMode::Always)
        .build();

    session.send(RUST_QUESTION).await.unwrap();
    assert_eq!(last_user_content(&provider), RUST_QUESTION);

    // An empty index has no information either.
    let mut provider = TestModelProvider::default();
    provider.add_text_response("Hello!");
    let empty = DocumentIndex::in_memory(
        ModelClient::new(provider.clone()),
        EmbeddingClient::new(TestEmbeddingProvider::default()),
        IndexConfig::default(),
    );
    let mut session = ChatSessionBuilder::with_model_provider(provider.clone())
        .with_index(Arc::new(empty))
        .retrieval_mode(RetrievalMode::Always)
        .build();
    session.send(RUST_QUESTION).await.unwrap();
    assert_eq!(provider.requests().len(), 1);
    assert_eq!(last_user_content(&provider), RUST_QUESTION);
}

#[tokio::test]
async fn test_auto_retrieval() {
    let mut provider = TestModelProvider::default();
    let index = rust_index(&mut provider).await;
    let mut session = ChatSessionBuilder::with_model_provider(provider.clone())
        .with_index(index)
        .build();

    // The router declines, so the index isn't queried.
    provider.add_text_response("no");
    provider.add_text_response("Hello!");
    session.send("Hi there").await.unwrap();
    assert_eq!(last_user_content(&provider), "Hi there");
    let requests = provider.requests();
    let router = &requests[1];
    assert_eq!(
        router.messages[0],
        ModelMessage::System(prompts::RETRIEVAL_ROUTER.to_owned())
    );
    assert_eq!(router.messages[1], ModelMessage::User("Hi there".to_owned()));

    // The router accepts.
    provider.add_text_response("Yes.");
    provider.add_text_response("Rust is built for safety.");
    provider.add_text_response("Rust is a safe language.");
    session.send(RUST_QUESTION).await.unwrap();
    assert!(last_user_content(&provider).contains("Rust is built for safety."));
    assert_eq!(provider.remaining(), 0);

    // Router turns never enter the history.
    assert_eq!(session.len(), 4);
}

#[tokio::test]
async fn test_auto_retrieval_skips_empty_index() {
    let mut provider = TestModelProvider::default();
    provider.add_text_response("Hello!");
    let empty = DocumentIndex::in_memory(
        ModelClient::new(provider.clone()),
        EmbeddingClient::new(TestEmbeddingProvider::default()),
        IndexConfig::default(),
    );
    let mut session = ChatSessionBuilder::with_model_provider(provider.clone())
        .with_index(Arc::new(empty))
        .build();

    let reply = session.send(RUST_QUESTION).await.unwrap();
    assert_eq!(reply, "Hello!");
    // No routing request for an empty index.
    assert_eq!(provider.requests().len(), 1);
    assert_eq!(last_user_content(&provider), RUST_QUESTION);
}

#[tokio::test]
async fn test_retrieval_off() {
    let mut provider = TestModelProvider::default();
    let index = rust_index(&mut provider).await;
    provider.add_text_response("Hello!");
    let mut session = ChatSessionBuilder::with_model_provider(provider.clone())
        .with_index(index)
        .retrieval_mode(RetrievalMode::Off)
        .build();

    session.send(RUST_QUESTION).await.unwrap();
    assert_eq!(provider.requests().len(), 2);
    assert_eq!(last_user_content(&provider), RUST_QUESTION);
}

#[test]
fn test_retrieval_mode_from_name() {
    assert_eq!(RetrievalMode::from_name("off"), Some(RetrievalMode::Off));
    assert_eq!(
        RetrievalMode::from_name(" Always "),
        Some(RetrievalMode::Always)
    );
    assert_eq!(RetrievalMode::from_name("AUTO"), Some(RetrievalMode::Auto));
    assert_eq!(RetrievalMode::from_name("sometimes"), None);
}
