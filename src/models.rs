//! Modelos de dominio (mensajes de chat, intercambios registrados y feedback).

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Rol de un mensaje en la secuencia enviada al servicio de completado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Normaliza el rol enviado por el cliente: `bot` pasa a `assistant` y
    /// cualquier valor desconocido se trata como `user`.
    pub fn normalize(raw: &str) -> Self {
        match raw {
            "system" => Self::System,
            "assistant" | "bot" => Self::Assistant,
            _ => Self::User,
        }
    }
}

/// Mensaje de historial tal y como lo envía el cliente, sin normalizar.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// Mensaje ya normalizado (par rol/contenido).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

impl From<&HistoryMessage> for ChatMessage {
    fn from(msg: &HistoryMessage) -> Self {
        Self::new(Role::normalize(&msg.role), msg.content.clone())
    }
}

/// Registro de un intercambio (chat o feedback) en el log de conversaciones.
/// Se crea una vez por petición y nunca se modifica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatExchange {
    pub session_id: String,
    pub ip: String,
    pub location: String,
    pub chat: Vec<ChatMessage>,
    pub timestamp: String,
}

impl ChatExchange {
    pub fn new(session_id: &str, ip: &str, location: &str, chat: Vec<ChatMessage>) -> Self {
        Self {
            session_id: session_id.to_string(),
            ip: ip.to_string(),
            location: location.to_string(),
            chat,
            timestamp: utc_timestamp(),
        }
    }
}

/// Fila de la tabla `feedback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackRecord {
    pub id: i64,
    /// Un nombre ausente o en blanco se guarda como `NULL` y se devuelve como
    /// `null` en JSON (no como cadena vacía).
    pub name: Option<String>,
    pub message: String,
    pub created_at: String,
}

/// Marca temporal UTC en formato ISO-8601 (RFC 3339, microsegundos, sufijo `Z`).
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
