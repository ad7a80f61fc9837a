// Módulos de la aplicación
mod api;
mod app_state;
mod chat;
mod chat_log;
mod config;
mod feedback;
mod geolocation;
mod knowledge;
mod llm;
mod models;

use crate::app_state::AppState;
use crate::config::AllowedOrigins;
use anyhow::{Context, Result};
use axum::{http::HeaderValue, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{self, AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración (sin OPENAI_API_KEY no se arranca)
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Datos estáticos: base de conocimiento e historia de la persona
    let knowledge = knowledge::KnowledgeBase::load(&cfg.knowledge_base_path)?;
    let story = chat::load_story(&cfg.story_path)?;
    let system_prompt = chat::system_prompt(&cfg.persona_name, &story);

    // 4. Persistencia y servicios externos
    let feedback = feedback::FeedbackStore::open(&cfg.feedback_db_path)?;
    let llm_manager = llm::LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?;
    let geolocator = geolocation::Geolocator::new(&cfg.geolocation_url, cfg.geolocation_timeout)?;

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        knowledge: Arc::new(knowledge),
        system_prompt: Arc::from(system_prompt),
        llm: Arc::new(llm_manager),
        geolocator,
        chat_log: chat_log::ConversationLog::new(cfg.chat_log_path.clone()),
        feedback,
    };

    info!("Log de conversaciones en {}", app_state.chat_log.path().display());

    // 6. Configurar el router de la API
    let app = Router::new()
        .merge(api::create_router(app_state))
        .layer(cors_layer(&cfg.allowed_origins)?)
        .layer(TraceLayer::new_for_http());

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        info!("Señal de apagado recibida, iniciando cierre del servidor.");
    })
    .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}

/// CORS: con `*` se acepta cualquier origen sin credenciales; con una lista
/// explícita se permiten credenciales y se reflejan métodos y cabeceras.
fn cors_layer(origins: &AllowedOrigins) -> Result<CorsLayer> {
    match origins {
        AllowedOrigins::Any => Ok(CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods(cors::Any)
            .allow_headers(cors::Any)),
        AllowedOrigins::List(list) => {
            let values = list
                .iter()
                .map(|o| {
                    HeaderValue::from_str(o).with_context(|| format!("Origen CORS inválido: {o}"))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(CorsLayer::new()
                .allow_origin(AllowOrigin::list(values))
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request())
                .allow_credentials(true))
        }
    }
}
