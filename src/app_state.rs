use std::sync::Arc;

use crate::{
    chat_log::ConversationLog, feedback::FeedbackStore, geolocation::Geolocator,
    knowledge::KnowledgeBase, llm::CompletionService,
};

/// Estado de proceso: se construye una vez al arrancar y se comparte entre
/// handlers. El documento de conocimiento y el prompt son de sólo lectura.
#[derive(Clone)]
pub struct AppState {
    pub knowledge: Arc<KnowledgeBase>,
    pub system_prompt: Arc<str>,
    pub llm: Arc<dyn CompletionService>,
    pub geolocator: Geolocator,
    pub chat_log: ConversationLog,
    pub feedback: FeedbackStore,
}

#[cfg(test)]
pub fn test_state(
    dir: &std::path::Path,
    knowledge: KnowledgeBase,
    llm: Arc<dyn CompletionService>,
) -> AppState {
    use std::time::Duration;

    AppState {
        knowledge: Arc::new(knowledge),
        system_prompt: Arc::from(crate::chat::system_prompt("Husain", "Backend engineer.")),
        llm,
        // Puerto cerrado: la geolocalización falla rápido y se degrada a "Unknown".
        geolocator: Geolocator::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap(),
        chat_log: ConversationLog::new(dir.join("chat_logs.jsonl")),
        feedback: FeedbackStore::open_in_memory().unwrap(),
    }
}
