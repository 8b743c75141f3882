//! The flow orchestrator: PO -> Architect -> Developer -> QA

use crate::agent::{Agent, AgentOutput};
use crate::config::OrchestratorConfig;
use crate::role::AgentRole;
use agentchain_llm::{LlmProvider, Result, UsageTracker};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;

/// The four artifacts of a full flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowResult {
    pub requirements: String,
    pub architecture: String,
    pub implementation: String,
    pub qa_report: String,
}

impl FlowResult {
    /// The artifact produced by `role`
    pub fn get(&self, role: AgentRole) -> &str {
        match role {
            AgentRole::ProductOwner => &self.requirements,
            AgentRole::Architect => &self.architecture,
            AgentRole::Developer => &self.implementation,
            AgentRole::Qa => &self.qa_report,
        }
    }
}

/// Holds one agent per role and threads each output into the next prompt
pub struct Orchestrator<P> {
    po: Agent<P>,
    architect: Agent<P>,
    developer: Agent<P>,
    qa: Agent<P>,
    config: OrchestratorConfig,
    usage: UsageTracker,
    out: Box<dyn Write + Send>,
}

impl<P: LlmProvider> Orchestrator<P> {
    /// Create an orchestrator with default configuration, printing to stdout
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, OrchestratorConfig::default())
    }

    pub fn with_config(provider: P, config: OrchestratorConfig) -> Self {
        let provider = Arc::new(provider);
        let build = |role: AgentRole| {
            let agent = Agent::new(role, Arc::clone(&provider)).with_settings(config.settings.clone());
            match config.prompts.get(role) {
                Some(prompt) => agent.with_system_prompt(prompt),
                None => agent,
            }
        };

        Self {
            po: build(AgentRole::ProductOwner),
            architect: build(AgentRole::Architect),
            developer: build(AgentRole::Developer),
            qa: build(AgentRole::Qa),
            config,
            usage: UsageTracker::new(),
            out: Box::new(std::io::stdout()),
        }
    }

    /// Redirect progress output (stdout by default)
    pub fn with_output(mut self, out: impl Write + Send + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn agent(&self, role: AgentRole) -> &Agent<P> {
        match role {
            AgentRole::ProductOwner => &self.po,
            AgentRole::Architect => &self.architect,
            AgentRole::Developer => &self.developer,
            AgentRole::Qa => &self.qa,
        }
    }

    /// Token usage accumulated over every call made so far
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the full flow on a project idea.
    ///
    /// The first failing step aborts the flow.
    pub async fn run_flow(&mut self, user_request: &str) -> Result<FlowResult> {
        tracing::info!(request_chars = user_request.len(), "starting agent flow");
        self.say("\n--- Starting Agent Flow ---\n")?;

        let requirements = self
            .step(AgentRole::ProductOwner, format!("User Request: {}", user_request))
            .await?;

        let architecture = self
            .step(AgentRole::Architect, format!("Requirements: {}", requirements))
            .await?;

        let implementation = self
            .step(AgentRole::Developer, format!("Architecture: {}", architecture))
            .await?;

        let qa_report = self
            .step(
                AgentRole::Qa,
                format!(
                    "Implementation: {}\nOriginal Requirements: {}",
                    implementation, requirements
                ),
            )
            .await?;

        tracing::info!(
            calls = self.usage.total_calls,
            tokens = self.usage.total_tokens(),
            "agent flow finished"
        );

        Ok(FlowResult {
            requirements,
            architecture,
            implementation,
            qa_report,
        })
    }

    /// Run a single agent, selected by name (`po`, `arch`, `dev`, `qa`), on raw input
    pub async fn run_agent(&mut self, agent_name: &str, input: &str) -> Result<String> {
        let display = agent_name.to_uppercase();
        self.say(&format!("\n--- Running Single Agent: {} ---\n", display))?;

        let role: AgentRole = agent_name.parse()?;
        tracing::info!(agent = role.key(), "running single agent");

        let output = self
            .invoke(role, input, &format!("{} Output: ", display))
            .await
            .map_err(|e| {
                let message = format!("Error running agent {}: {}", agent_name, e.message());
                e.with_message(message)
            })?;

        Ok(output.text)
    }

    async fn step(&mut self, role: AgentRole, prompt: String) -> Result<String> {
        self.say(&format!(">> {} Working...", role.title()))?;
        tracing::info!(agent = role.key(), prompt_chars = prompt.len(), "agent step");

        let label = format!("{} Output: ", role.output_label());
        let output = self.invoke(role, &prompt, &label).await?;
        Ok(output.text)
    }

    /// Call the agent, print `{label}{text}` followed by a blank line, track usage
    async fn invoke(&mut self, role: AgentRole, input: &str, label: &str) -> Result<AgentOutput> {
        let quiet = self.config.quiet;
        let agent = match role {
            AgentRole::ProductOwner => &self.po,
            AgentRole::Architect => &self.architect,
            AgentRole::Developer => &self.developer,
            AgentRole::Qa => &self.qa,
        };

        let output = if self.config.stream && !quiet {
            let out = &mut self.out;
            write!(out, "{}", label)?;
            out.flush()?;
            let output = agent
                .process_streaming(input, |delta| {
                    write!(out, "{}", delta)?;
                    out.flush()?;
                    Ok(())
                })
                .await?;
            writeln!(out, "\n")?;
            output
        } else {
            let output = agent.run(input).await?;
            if !quiet {
                writeln!(self.out, "{}{}\n", label, output.text)?;
            }
            output
        };

        tracing::debug!(
            agent = role.key(),
            model = %output.model,
            output_chars = output.text.len(),
            completion_tokens = output.usage.completion_tokens,
            "agent finished"
        );
        self.usage.track(&output.model, &output.usage);
        Ok(output)
    }

    fn say(&mut self, line: &str) -> Result<()> {
        if !self.config.quiet {
            writeln!(self.out, "{}", line)?;
        }
        Ok(())
    }
}
