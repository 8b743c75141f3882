//! # agentchain agents
//!
//! Four role agents chained into a fixed flow:
//! 1. Product Owner turns a project idea into requirements
//! 2. Architect designs from the requirements
//! 3. Developer implements the architecture
//! 4. QA reviews the implementation against the original requirements
//!
//! Every agent is a system prompt around one call to an [`LlmProvider`];
//! the [`Orchestrator`] threads each output into the next prompt.
//!
//! [`LlmProvider`]: agentchain_llm::LlmProvider

mod agent;
mod config;
mod orchestrator;
mod role;
#[cfg(test)]
mod testing;

pub use agent::{Agent, AgentOutput, AgentSettings};
pub use config::{ConfigFile, OrchestratorConfig, PromptOverrides};
pub use orchestrator::{FlowResult, Orchestrator};
pub use role::AgentRole;
