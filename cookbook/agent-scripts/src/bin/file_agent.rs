use std::io;

use agno_cookbook::{file_toolkit, Agent, Result};
use agent_scripts::{prompt_or, setup};

#[tokio::main]
async fn main() -> Result<()> {
    let (_, model) = setup()?;
    let base_dir = std::env::current_dir()?;
    let agent = Agent::new(model)
        .with_instructions(["Only read files the user asks about."])
        .with_tools(file_toolkit(base_dir))
        .with_show_tool_calls(true);

    let prompt = prompt_or("List the files in this directory and summarize Cargo.toml.");
    agent
        .print_response(prompt, &agent.default_options(), &mut io::stdout())
        .await
}
