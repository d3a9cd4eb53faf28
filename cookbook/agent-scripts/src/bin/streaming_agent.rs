use std::io::{self, Write};

use agno_cookbook::{Agent, Result, RunEvent, RunOptions};
use agent_scripts::{prompt_or, setup};
use futures::StreamExt;

#[tokio::main]
async fn main() -> Result<()> {
    let (_, model) = setup()?;
    let agent = Agent::new(model).with_name("storyteller");

    let prompt = prompt_or("Write a haiku about the ocean.");
    let mut stream = agent.run_stream(prompt, &RunOptions::default()).await?;
    let mut stdout = io::stdout();
    while let Some(event) = stream.next().await {
        match event? {
            RunEvent::RunContent(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            RunEvent::RunCompleted(response) => {
                writeln!(stdout)?;
                tracing::info!(run_id = %response.run_id, model = %response.model, "run completed");
            }
            RunEvent::ToolCallStarted(_) | RunEvent::ToolCallCompleted(_) => {}
        }
    }
    Ok(())
}
