use std::io;
use std::sync::Arc;

use agno_cookbook::{
    Agent, Distance, Document, InMemoryVectorStore, KnowledgeBase, Result, SearchType,
    WhitespaceEmbedder,
};
use agent_scripts::{prompt_or, setup};

const RECIPES: [(&str, &str); 3] = [
    ("tom-kha-gai", "Tom Kha Gai is a coconut milk soup with chicken, galangal and lime leaves."),
    ("massaman", "Massaman curry simmers beef with potatoes, peanuts and warm spices."),
    ("som-tam", "Som tam is a green papaya salad pounded with chili, lime and fish sauce."),
];

#[tokio::main]
async fn main() -> Result<()> {
    let (_, model) = setup()?;

    let store = InMemoryVectorStore::new(Distance::Cosine).with_search_type(SearchType::Hybrid);
    let knowledge = KnowledgeBase::new(Arc::new(WhitespaceEmbedder::new(128)), Arc::new(store));
    knowledge
        .load(
            RECIPES
                .iter()
                .map(|(name, text)| Document::new(*text).with_name(*name)),
        )
        .await?;

    let agent = Agent::new(model)
        .with_description("You are a Thai cuisine expert.")
        .with_instructions(["Prefer the recipes in your context when answering."])
        .with_retriever(Arc::new(knowledge))
        .with_markdown(true);

    let prompt = prompt_or("How do I make a coconut soup?");
    agent
        .print_response(prompt, &agent.default_options(), &mut io::stdout())
        .await
}
