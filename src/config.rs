//! Carga y gestión de configuración de la aplicación (LLM, ficheros, CORS).

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Proveedores de completado disponibles. Sólo OpenAI tiene cliente; cualquier
/// otro valor de `LLM_PROVIDER` impide arrancar.
#[derive(Clone, Debug, PartialEq)]
pub enum LlmProvider {
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Orígenes permitidos por CORS.
#[derive(Clone, Debug, PartialEq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Interpreta una lista separada por comas, p. ej. `"https://a.com, https://b.com"`.
    /// `*` (o una lista vacía) permite cualquier origen.
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            Self::Any
        } else {
            Self::List(origins)
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub allowed_origins: AllowedOrigins,

    pub llm_provider: LlmProvider,
    pub llm_api_key: String,
    pub llm_chat_model: String,
    pub persona_name: String,

    pub knowledge_base_path: PathBuf,
    pub story_path: PathBuf,
    pub chat_log_path: PathBuf,
    pub feedback_db_path: PathBuf,

    pub geolocation_url: String,
    pub geolocation_timeout: Duration,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de consulta de
    /// variables; `from_env` la usa con el entorno del proceso.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let llm_api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("Falta OPENAI_API_KEY en el entorno"))?;

        let server_addr = var("SERVER_ADDR", "127.0.0.1:8000");
        let allowed_origins = AllowedOrigins::parse(&var("ALLOW_ORIGINS", "*"));

        let llm_provider = LlmProvider::from_str(&var("LLM_PROVIDER", "openai"))?;
        let llm_chat_model = var("LLM_CHAT_MODEL", "gpt-4o");
        let persona_name = var("PERSONA_NAME", "Husain");

        let path_var = |key: &str, default: &str| PathBuf::from(var(key, default));

        let geolocation_url = var("GEOLOCATION_URL", "https://ipapi.co");
        let geolocation_timeout = match lookup("GEOLOCATION_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow!("GEOLOCATION_TIMEOUT_SECS inválido ({raw}): {e}"))?,
            None => 3,
        };

        Ok(Self {
            server_addr,
            allowed_origins,
            llm_provider,
            llm_api_key,
            llm_chat_model,
            persona_name,
            knowledge_base_path: path_var("KNOWLEDGE_BASE_PATH", "knowledge_base.json"),
            story_path: path_var("STORY_PATH", "story.txt"),
            chat_log_path: path_var("CHAT_LOG_PATH", "chat_logs.jsonl"),
            feedback_db_path: path_var("FEEDBACK_DB_PATH", "feedback.db"),
            geolocation_url,
            geolocation_timeout: Duration::from_secs(geolocation_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_and_empty_origins_allow_any() {
        assert_eq!(AllowedOrigins::parse("*"), AllowedOrigins::Any);
        assert_eq!(AllowedOrigins::parse(""), AllowedOrigins::Any);
        assert_eq!(AllowedOrigins::parse(" , ,"), AllowedOrigins::Any);
        assert_eq!(
            AllowedOrigins::parse("https://a.com,*"),
            AllowedOrigins::Any
        );
    }

    #[test]
    fn origin_list_is_trimmed_and_blanks_dropped() {
        assert_eq!(
            AllowedOrigins::parse(" https://maixed.com , ,https://www.maixed.com"),
            AllowedOrigins::List(vec![
                "https://maixed.com".to_string(),
                "https://www.maixed.com".to_string(),
            ])
        );
    }

    #[test]
    fn only_openai_provider_is_accepted() {
        assert_eq!(LlmProvider::from_str("OpenAI").unwrap(), LlmProvider::OpenAI);
        for other in ["gemini", "ollama", "anthropic", ""] {
            assert!(LlmProvider::from_str(other).is_err(), "{other}");
        }
    }

    fn lookup_from<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn missing_or_blank_api_key_fails_to_load() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = AppConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "  \t ")])).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn unsupported_provider_fails_to_load() {
        for provider in ["gemini", "ollama"] {
            let vars = [("OPENAI_API_KEY", "sk-test"), ("LLM_PROVIDER", provider)];
            let err = AppConfig::from_lookup(lookup_from(&vars)).unwrap_err();
            assert!(err.to_string().contains("no soportado"));
        }
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(cfg.llm_api_key, "sk-test");
        assert_eq!(cfg.llm_provider, LlmProvider::OpenAI);
        assert_eq!(cfg.llm_chat_model, "gpt-4o");
        assert_eq!(cfg.server_addr, "127.0.0.1:8000");
        assert_eq!(cfg.allowed_origins, AllowedOrigins::Any);
        assert_eq!(cfg.feedback_db_path, PathBuf::from("feedback.db"));
        assert_eq!(cfg.geolocation_timeout, Duration::from_secs(3));
    }

    #[test]
    fn invalid_geolocation_timeout_fails_to_load() {
        let vars = [("OPENAI_API_KEY", "sk-test"), ("GEOLOCATION_TIMEOUT_SECS", "soon")];
        assert!(AppConfig::from_lookup(lookup_from(&vars)).is_err());
    }
}
