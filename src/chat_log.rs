//! Log de conversaciones en formato JSON Lines (un registro por línea).
//!
//! Es puramente diagnóstico: los errores se devuelven al llamador, que los
//! registra y los descarta sin afectar a la respuesta HTTP.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::models::ChatExchange;

#[derive(Debug, Clone)]
pub struct ConversationLog {
    path: PathBuf,
}

impl ConversationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Añade un intercambio al final del fichero (lo crea si no existe).
    pub async fn append(&self, exchange: &ChatExchange) -> Result<()> {
        let mut line = serde_json::to_vec(exchange)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Error abriendo el log {}", self.path.display()))?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
