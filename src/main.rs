use std::sync::Arc;
use tokio::net::TcpListener;
use gridcopilot::{
    agent::SqlAgent,
    api::routes::create_router,
    config::Config,
    database::PgDatabase,
    llm::AzureChatClient,
    logging::init_logging,
    prompt::PromptTemplate,
    viz::GeometryCache,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    // Load configuration
    let config = Config::load()?;
    let server_addr = config.server_addr;

    let model = AzureChatClient::new(config.llm.clone())?;
    let database = PgDatabase::connect_lazy(&config.database, config.agent.sample_rows)?;
    tracing::info!(
        host = %config.database.host,
        database = %config.database.name,
        deployment = %config.llm.deployment,
        "agent configured"
    );
    let agent = SqlAgent::new(Arc::new(model), Arc::new(database), config.agent.clone());

    let prompt = PromptTemplate::load(&config.prompt_path);
    let geometry = GeometryCache::new(config.geojson_path.clone());

    // Create application state
    let app_state = AppState::new(Arc::new(agent), prompt, geometry);

    // Build the router with routes
    let app = create_router(app_state);

    let listener = TcpListener::bind(server_addr).await?;

    tracing::info!(addr = %server_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
