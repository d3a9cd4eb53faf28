use std::io;

use agno_cookbook::{Agent, Result, RunOptions};
use agent_scripts::{prompt_or, setup};

#[tokio::main]
async fn main() -> Result<()> {
    let (_, model) = setup()?;
    let agent = Agent::new(model)
        .with_description("You are a helpful assistant.")
        .with_markdown(true);

    let prompt = prompt_or("Share a two sentence horror story.");
    agent
        .print_response(prompt, &agent.default_options(), &mut io::stdout())
        .await?;

    // Follow-up is streamed and sees the first exchange in memory.
    let options = RunOptions::default().with_markdown(true).streaming();
    agent
        .print_response("Now make it funny.", &options, &mut io::stdout())
        .await
}
