//! Orquestación de una petición de chat.
//!
//! Flujo:
//!   1. Búsqueda de fragmentos en la base de conocimiento para el mensaje.
//!   2. Normalización de los últimos [`HISTORY_WINDOW`] mensajes del historial.
//!   3. Secuencia: prompt de sistema + historial + mensaje aumentado.
//!   4. Llamada al servicio de completado.
//!   5. Registro del intercambio (geolocalización + log) en modo "best effort".
//!
//! No hay estado de sesión en el servidor: el historial llega en cada petición.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    knowledge::KnowledgeBase,
    models::{ChatExchange, ChatMessage, HistoryMessage},
};

/// Mensajes previos que se reenvían al LLM.
pub const HISTORY_WINDOW: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub session_id: String,
}

/// Historia de fondo de la persona. Si el fichero no existe se usa un texto vacío.
pub fn load_story(path: &Path) -> Result<String> {
    if !path.exists() {
        warn!("No existe la historia de fondo en {}; el prompt irá sin ella.", path.display());
        return Ok(String::new());
    }
    let story = std::fs::read_to_string(path)
        .with_context(|| format!("Error leyendo {}", path.display()))?;
    info!("Historia de fondo cargada desde {} ({} bytes).", path.display(), story.len());
    Ok(story)
}

/// Prompt de sistema con la persona y su historia de fondo.
pub fn system_prompt(persona_name: &str, story: &str) -> String {
    format!(
        r#"
You are a friendly AI clone of {persona_name}, who is actively job hunting and likes to network with people.
Greet users and help them with anything they ask. Always answer as {persona_name}.

Use the following background to answer questions truthfully and avoid hallucinations. Be professional, concise,
and factually accurate. If you don't know something, say so.

--- {} STORY ---
{story}
"#,
        persona_name.to_uppercase()
    )
}

/// Conserva los últimos [`HISTORY_WINDOW`] mensajes, en orden, con el rol normalizado.
pub fn normalize_history(history: &[HistoryMessage]) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    history[start..].iter().map(ChatMessage::from).collect()
}

/// Construye la secuencia que se envía al LLM. Los fragmentos de conocimiento
/// sólo se añaden al mensaje de usuario saliente.
pub fn build_messages(
    system_prompt: &str,
    knowledge: &KnowledgeBase,
    message: &str,
    history: &[HistoryMessage],
) -> Vec<ChatMessage> {
    let user_message = match knowledge.context_for(message) {
        Some(context) => format!("{message}\n\n{context}"),
        None => message.to_string(),
    };

    let mut messages = Vec::with_capacity(HISTORY_WINDOW + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(normalize_history(history));
    messages.push(ChatMessage::user(user_message));
    messages
}

/// Usa la cabecera `X-Session-ID` tal cual llega si no está en blanco; si no,
/// genera un UUID nuevo.
pub fn resolve_session_id(header: Option<&str>) -> String {
    header
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Ejecuta el pipeline completo de `/chat`.
pub async fn chat(
    state: &AppState,
    message: &str,
    history: &[HistoryMessage],
    ip: &str,
    session_header: Option<&str>,
) -> Result<ChatReply> {
    let messages = build_messages(&state.system_prompt, &state.knowledge, message, history);

    let reply = state
        .llm
        .complete(&messages)
        .await
        .context("Error llamando al servicio de completado")?;
    let reply = reply.trim().to_string();

    let session_id = resolve_session_id(session_header);
    let mut conversation = messages;
    conversation.push(ChatMessage::assistant(reply.clone()));
    record_exchange(state, &session_id, ip, conversation).await;

    Ok(ChatReply {
        response: reply,
        session_id,
    })
}

/// Geolocaliza la IP y añade el intercambio al log. Nunca falla: los errores
/// de geolocalización ya llegan como "Unknown" y los de escritura se descartan aquí.
pub async fn record_exchange(state: &AppState, session_id: &str, ip: &str, conversation: Vec<ChatMessage>) {
    let location = state.geolocator.locate(ip).await;
    let exchange = ChatExchange::new(session_id, ip, &location, conversation);
    if let Err(e) = state.chat_log.append(&exchange).await {
        warn!("No se pudo escribir en el log de conversaciones: {e:#}");
    }
}
