use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Extension, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use chat_api_server::auth::{auth_middleware, JwtManager};
use chat_api_server::config::Settings;
use chat_api_server::database::{DbPool, Repository};
use chat_api_server::handlers;
use chat_api_server::services::conversation::{
    CalculatorTool, ConversationStore, HistoryVectorSearchTool, MemoryStore, ModelGateway,
    ResponseStrategy, ToolRegistry, TurnOrchestrator, VectorIndex, WebSearchTool,
};
use chat_api_server::services::{
    EmbeddingService, LlmService, MemoryService, SearchService, StorageService, VectorService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,chat_api_server=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("🚀 Starting Chat API Server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    // Initialize database pool
    let db_pool = DbPool::new(&settings.database).await?;
    info!("✅ Database connection established");

    // Initialize repository + schema
    let repository = Arc::new(Repository::new(db_pool));
    repository.ensure_schema(settings.embedding.dimension).await?;
    info!("✅ Conversation schema ensured");

    // Initialize services
    let embedding_service = Arc::new(EmbeddingService::new(settings.embedding.clone()));
    let llm_service = Arc::new(LlmService::new(settings.llm.clone()));
    let memory_service = Arc::new(MemoryService::new(settings.memory.clone()));
    let search_service = Arc::new(SearchService::new(settings.search.clone()));
    let storage_service = Arc::new(StorageService::new(settings.storage.clone()));
    let vector_service = Arc::new(VectorService::new(
        repository.clone(),
        embedding_service.clone(),
    ));

    // Response strategy + tool set, selected by configuration
    let strategy = ResponseStrategy::from_name(&settings.orchestrator.strategy);
    let mut registry = ToolRegistry::new();
    if strategy.uses_tools() {
        registry.register(Arc::new(CalculatorTool));
        registry.register(Arc::new(WebSearchTool::new(search_service.clone())));
        registry.register(Arc::new(HistoryVectorSearchTool::new(
            vector_service.clone() as Arc<dyn VectorIndex>,
            settings.orchestrator.vector_top_k,
        )));
    }
    info!(?strategy, tools = !registry.is_empty(), "✅ Response strategy configured");

    let orchestrator = Arc::new(TurnOrchestrator::new(
        repository.clone() as Arc<dyn ConversationStore>,
        llm_service.clone() as Arc<dyn ModelGateway>,
        memory_service.clone() as Arc<dyn MemoryStore>,
        vector_service.clone() as Arc<dyn VectorIndex>,
        Arc::new(registry),
        strategy,
        settings.prompts.clone(),
        settings.orchestrator.clone(),
        settings.memory.update_window_seconds,
    ));

    let jwt_manager = Arc::new(JwtManager::new(
        &settings.auth.jwt_secret,
        settings.auth.token_expiration_seconds,
    ));

    // Build router
    let app = build_router(repository, orchestrator, storage_service, jwt_manager);

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(
    repository: Arc<Repository>,
    orchestrator: Arc<TurnOrchestrator>,
    storage_service: Arc<StorageService>,
    jwt_manager: Arc<JwtManager>,
) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    // Protected routes (authenticated principal required)
    let protected_routes = Router::new()
        .route(
            "/api/conversations",
            post(handlers::conversations::create_conversation_handler)
                .get(handlers::conversations::list_conversations_handler),
        )
        .route(
            "/api/conversations/{conversation_id}",
            delete(handlers::conversations::delete_conversation_handler),
        )
        .route(
            "/api/conversations/{conversation_id}/versions",
            get(handlers::versions::list_version_groups_handler),
        )
        .route(
            "/api/conversations/{conversation_id}/groups/{group_id}",
            patch(handlers::versions::navigate_version_handler),
        )
        .route(
            "/api/conversations/{conversation_id}/query",
            post(handlers::query::query_handler),
        )
        .route(
            "/api/conversations/{conversation_id}/query-file",
            post(handlers::query::query_file_handler),
        )
        .route(
            "/api/conversations/{conversation_id}/messages/{message_id}",
            put(handlers::edit::edit_message_handler),
        )
        .route(
            "/api/groups/{group_id}",
            delete(handlers::versions::delete_version_group_handler),
        )
        .layer(middleware::from_fn(auth_middleware));

    // Combine routes
    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        // Shared state
        .layer(Extension(repository))
        .layer(Extension(orchestrator))
        .layer(Extension(storage_service))
        .layer(Extension(jwt_manager))
        // CORS
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CatchPanicLayer::new())
        // Body limit (multipart uploads - max 100MB)
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
}
