pub mod anthropic;
pub mod azure;
pub mod bedrock;
pub mod cerebras;
pub mod cloudflare;
pub mod cohere;
pub mod copilot;
pub mod deepinfra;
pub mod deepseek;
pub mod gitlab;
pub mod google;
pub mod groq;
pub mod mistral;
pub mod openai;
pub mod openai_compatible;
pub mod openrouter;
pub mod perplexity;
pub mod replicate;
pub mod together;
pub mod vertex;
pub mod xai;
