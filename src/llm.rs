//! Abstracción sobre Rig para el proveedor de LLM (OpenAI).
//!
//! El orquestador sólo ve el trait [`CompletionService`], lo que permite
//! sustituir el proveedor real por uno simulado en los tests.

use crate::config::{AppConfig, LlmProvider};
use crate::models::{ChatMessage, Role};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;

/// Servicio de completado: recibe la secuencia completa de mensajes
/// (sistema + historial + usuario) y devuelve el texto de la respuesta.
pub trait CompletionService: Send + Sync {
    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<String>>;
}

/// Gestor de LLMs.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
    api_key: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            api_key: cfg.llm_api_key.clone(),
        })
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    pub async fn complete_chat(&self, messages: &[ChatMessage]) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(messages).await,
        }
    }

    async fn complete_with_openai(&self, messages: &[ChatMessage]) -> Result<String> {
        use rig::completion::{Chat, Message};
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let request = AgentRequest::from_messages(messages)?;

        let client = openai::Client::new(&self.api_key);
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o"
        } else {
            self.chat_model.as_str()
        };

        let agent = client
            .agent(model_name)
            .preamble(&request.preamble)
            .build();

        let history: Vec<Message> = request
            .history
            .into_iter()
            .map(|m| match m.role {
                Role::Assistant => Message::assistant(m.content),
                _ => Message::user(m.content),
            })
            .collect();

        let answer = agent.chat(request.prompt, history).await?;
        Ok(answer)
    }
}

impl CompletionService for LlmManager {
    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.complete_chat(messages))
    }
}

/// Secuencia de mensajes adaptada a un agente de Rig: el historial de Rig no
/// tiene rol `system`, así que esos mensajes se acumulan en el preámbulo.
#[derive(Debug, PartialEq)]
struct AgentRequest {
    preamble: String,
    history: Vec<ChatMessage>,
    prompt: String,
}

impl AgentRequest {
    fn from_messages(messages: &[ChatMessage]) -> Result<Self> {
        let (last, earlier) = messages
            .split_last()
            .ok_or_else(|| anyhow!("No hay mensajes que enviar al LLM"))?;
        if last.role != Role::User {
            return Err(anyhow!("El último mensaje enviado al LLM debe ser del usuario"));
        }

        let mut system_parts = Vec::new();
        let mut history = Vec::new();
        for msg in earlier {
            match msg.role {
                Role::System => system_parts.push(msg.content.as_str()),
                Role::User | Role::Assistant => history.push(msg.clone()),
            }
        }

        Ok(Self {
            preamble: system_parts.join("\n\n"),
            history,
            prompt: last.content.clone(),
        })
    }
}
