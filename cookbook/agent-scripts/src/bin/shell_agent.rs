use std::io;

use agno_cookbook::tools::{shell_toolkit, ShellConfig};
use agno_cookbook::{Agent, Result};
use agent_scripts::{prompt_or, setup};

#[tokio::main]
async fn main() -> Result<()> {
    let (_, model) = setup()?;
    let agent = Agent::new(model)
        .with_tools(shell_toolkit(ShellConfig::default()))
        .with_show_tool_calls(true);

    let prompt = prompt_or("Show me the contents of the current directory.");
    let options = agent.default_options().streaming();
    agent
        .print_response(prompt, &options, &mut io::stdout())
        .await
}
