use agno_cookbook::{LanguageModel, ModelConfig, OpenAIClient, Provider};

#[tokio::test]
async fn test_openai_compatible_client_instantiation() {
    for provider in [Provider::OpenAI, Provider::Groq, Provider::Ollama] {
        let cfg = ModelConfig {
            api_key: Some("test-key".into()),
            ..ModelConfig::for_provider(provider)
        };
        let client = OpenAIClient::from_config(&cfg).unwrap();
        assert_eq!(client.provider(), provider);
        assert_eq!(client.id(), provider.default_model());

        let _: Box<dyn LanguageModel> = Box::new(client);
    }
}

#[tokio::test]
async fn test_ollama_needs_no_api_key() {
    let client = OpenAIClient::new(Provider::Ollama).unwrap().with_model("qwen2.5:7b");
    assert_eq!(client.id(), "qwen2.5:7b");
}

#[test]
fn test_provider_names_parse() {
    assert_eq!("groq".parse::<Provider>().unwrap(), Provider::Groq);
    assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAI);
    assert!("bedrock".parse::<Provider>().is_err());
}
