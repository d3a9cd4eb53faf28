use agno_cookbook::server::{api_router, AgentRegistry};
use agno_cookbook::{file_toolkit, Agent, Result};
use agent_scripts::setup;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, model) = setup()?;

    let registry = AgentRegistry::new();
    registry
        .register(
            "assistant",
            Agent::new(model.clone())
                .with_name("assistant")
                .with_description("You are a helpful assistant."),
        )
        .await;
    // File access is only exposed on developer machines.
    if config.runtime_env.is_dev() {
        registry
            .register(
                "files",
                Agent::new(model)
                    .with_name("files")
                    .with_tools(file_toolkit(std::env::current_dir()?)),
            )
            .await;
    }
    tracing::info!(agents = ?registry.names().await, "registered agents");

    let app = api_router(&config.server, registry);
    agno_cookbook::server::serve(&config.server, app).await
}
