//! Base de conocimiento estática y búsqueda por palabras clave.
//!
//! El documento JSON se carga una sola vez al arrancar y se convierte en un
//! árbol etiquetado (`KnowledgeNode`). La búsqueda recorre el árbol en
//! profundidad, en orden de documento, y devuelve como mucho
//! [`KNOWLEDGE_SNIPPET_LIMIT`] hojas de texto que contienen algún término.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// Número máximo de fragmentos devueltos por consulta.
pub const KNOWLEDGE_SNIPPET_LIMIT: usize = 5;

const SNIPPETS_HEADER: &str = "Knowledge Snippets:";

/// Nodo del documento de conocimiento.
#[derive(Debug, Clone, PartialEq)]
pub enum KnowledgeNode {
    /// Claves en el orden en que aparecen en el documento.
    Object(Vec<(String, KnowledgeNode)>),
    Array(Vec<KnowledgeNode>),
    Text(String),
    /// Números, booleanos y `null`: nunca coinciden con una búsqueda.
    Other,
}

impl From<Value> for KnowledgeNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            Value::Array(items) => Self::Array(items.into_iter().map(Into::into).collect()),
            Value::String(text) => Self::Text(text),
            _ => Self::Other,
        }
    }
}

impl KnowledgeNode {
    fn leaf_count(&self) -> usize {
        match self {
            Self::Object(entries) => entries.iter().map(|(_, v)| v.leaf_count()).sum(),
            Self::Array(items) => items.iter().map(Self::leaf_count).sum(),
            Self::Text(_) => 1,
            Self::Other => 0,
        }
    }
}

/// Documento de conocimiento de sólo lectura, compartido entre peticiones.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    root: KnowledgeNode,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self {
            root: KnowledgeNode::Object(Vec::new()),
        }
    }
}

impl KnowledgeBase {
    pub fn from_value(value: Value) -> Self {
        Self { root: value.into() }
    }

    /// Carga el documento desde disco. Si el fichero no existe se usa un
    /// documento vacío; un JSON mal formado es un error de arranque.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "No existe la base de conocimiento en {}; se usará un documento vacío.",
                path.display()
            );
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Error leyendo {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("JSON inválido en {}", path.display()))?;

        let kb = Self::from_value(value);
        info!(
            "Base de conocimiento cargada desde {} ({} hojas de texto).",
            path.display(),
            kb.leaf_count()
        );
        Ok(kb)
    }

    pub fn leaf_count(&self) -> usize {
        self.root.leaf_count()
    }

    /// Devuelve hasta [`KNOWLEDGE_SNIPPET_LIMIT`] fragmentos `"ruta: texto"` cuyas
    /// hojas contienen (sin distinguir mayúsculas) alguno de los términos de la consulta.
    pub fn search(&self, query: &str) -> Vec<String> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut collector = SnippetCollector {
            terms,
            limit: KNOWLEDGE_SNIPPET_LIMIT,
            matches: Vec::new(),
        };
        let mut path = String::new();
        collector.visit(&self.root, &mut path);
        collector.matches
    }

    /// Bloque de contexto que se añade al mensaje del usuario, o `None` si no hay coincidencias.
    pub fn context_for(&self, query: &str) -> Option<String> {
        let snippets = self.search(query);
        if snippets.is_empty() {
            return None;
        }
        Some(format!("{SNIPPETS_HEADER}\n{}", snippets.join("\n")))
    }
}

/// Recorrido en profundidad con un acumulador de ruta explícito.
struct SnippetCollector {
    terms: Vec<String>,
    limit: usize,
    matches: Vec<String>,
}

impl SnippetCollector {
    fn is_full(&self) -> bool {
        self.matches.len() >= self.limit
    }

    fn visit(&mut self, node: &KnowledgeNode, path: &mut String) {
        if self.is_full() {
            return;
        }

        match node {
            KnowledgeNode::Object(entries) => {
                for (key, child) in entries {
                    let mark = path.len();
                    if !path.is_empty() {
                        path.push('.');
                    }
                    path.push_str(key);
                    self.visit(child, path);
                    path.truncate(mark);
                    if self.is_full() {
                        break;
                    }
                }
            }
            KnowledgeNode::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    let mark = path.len();
                    path.push_str(&format!("[{index}]"));
                    self.visit(child, path);
                    path.truncate(mark);
                    if self.is_full() {
                        break;
                    }
                }
            }
            KnowledgeNode::Text(text) => {
                let lowered = text.to_lowercase();
                if self.terms.iter().any(|t| lowered.contains(t.as_str())) {
                    self.matches.push(format!("{path}: {text}"));
                }
            }
            KnowledgeNode::Other => {}
        }
    }
}
