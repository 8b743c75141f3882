//! # agentchain CLI
//!
//! Runs the four-agent flow (Product Owner -> Architect -> Developer -> QA)
//! or a single agent against a language-model provider.
//!
//! Usage:
//!   agentchain [OPTIONS] [PROMPT]...
//!   agentchain --agent <po|arch|dev|qa> <PROMPT>...
//!
//! Examples:
//!   agentchain "Create a simple calculator app"
//!   agentchain -a qa "fn add(a: i32, b: i32) -> i32 { a - b }"
//!   agentchain --provider anthropic --stream "A pomodoro timer"
//!   agentchain --provider local --model qwen2.5-coder "A todo list"

use agentchain_agent::{ConfigFile, FlowResult, Orchestrator, OrchestratorConfig};
use agentchain_llm::{Error, Provider, ProviderConfig, ProviderType, Result, UsageTracker};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;

const DEFAULT_IDEA: &str = "Create a simple command-line Snake Game.";

#[derive(Parser, Debug)]
#[command(name = "agentchain")]
#[command(author, version, about = "agentchain - a four-agent software team in your terminal")]
struct Cli {
    /// Project idea (or raw input for --agent); prompted for when omitted
    #[arg(num_args = 0..)]
    prompt: Vec<String>,

    /// Run a single agent: po, arch, dev or qa
    #[arg(short, long)]
    agent: Option<String>,

    /// Provider: openai, anthropic or local [default: openai]
    #[arg(long, env = "AGENTCHAIN_PROVIDER")]
    provider: Option<String>,

    /// Model name; the provider's default when unset
    #[arg(long, env = "AGENTCHAIN_MODEL")]
    model: Option<String>,

    /// API key; falls back to OPENAI_API_KEY / ANTHROPIC_API_KEY
    #[arg(long, env = "AGENTCHAIN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Endpoint base URL, e.g. http://localhost:11434/v1
    #[arg(long, env = "AGENTCHAIN_BASE_URL")]
    base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(long, value_parser = parse_temperature)]
    temperature: Option<f32>,

    /// Maximum tokens per agent answer
    #[arg(long)]
    max_tokens: Option<usize>,

    /// JSON config file with provider settings and prompt overrides
    #[arg(long, env = "AGENTCHAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Quiet mode - only print the final artifact
    #[arg(short, long)]
    quiet: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Print model text as it arrives
    #[arg(long)]
    stream: bool,
}

impl Cli {
    fn prompt_text(&self) -> Option<String> {
        let text = self.prompt.join(" ");
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Orchestrator settings from flags, then from the config file
    fn orchestrator_config(&self, file: &ConfigFile) -> OrchestratorConfig {
        let mut config = OrchestratorConfig {
            quiet: self.quiet || self.json,
            stream: self.stream,
            ..Default::default()
        };
        config.settings.model = self.model.clone();
        config.settings.temperature = self.temperature;
        config.settings.max_tokens = self.max_tokens;
        file.apply_to(&mut config);
        config
    }

    /// Provider settings: flags win over the config file, which wins over env defaults
    fn provider_config(&self, file: &ConfigFile) -> Result<ProviderConfig> {
        let provider_type = match &self.provider {
            Some(name) => name.parse()?,
            None => file.provider.unwrap_or(ProviderType::OpenAI),
        };

        let mut config = ProviderConfig::from_env(provider_type);
        if let Some(key) = &self.api_key {
            config = config.with_api_key(key);
        }
        if let Some(url) = self.base_url.as_ref().or(file.base_url.as_ref()) {
            config = config.with_base_url(url);
        }
        if let Some(secs) = self.timeout.or(file.timeout_secs) {
            config = config.with_timeout(secs);
        }
        if let Some(model) = self.model.as_ref().or(file.model.as_ref()) {
            config = config.with_model(model);
        }
        Ok(config)
    }
}

fn parse_temperature(s: &str) -> std::result::Result<f32, String> {
    let t: f32 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if (0.0..=2.0).contains(&t) {
        Ok(t)
    } else {
        Err(format!("temperature must be between 0 and 2, got {}", t))
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet {
        "warn"
    } else {
        "agentchain=warn,agentchain_llm=warn,agentchain_agent=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Ask for a project idea on stdin; empty input picks the default
fn read_idea(input: &mut impl BufRead, out: &mut impl Write) -> Result<String> {
    writeln!(out, "Welcome to the Multi-Agent System Setup!")?;
    writeln!(out, "This system has 4 agents: Product Owner, Architect, Developer, QA.")?;
    write!(out, "Enter a project idea (or hit Enter for a default 'Snake Game'): ")?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let idea = line.trim();
    Ok(if idea.is_empty() {
        DEFAULT_IDEA.to_string()
    } else {
        idea.to_string()
    })
}

fn print_usage(usage: &UsageTracker) {
    println!("\n--- Token Usage ---");
    println!(
        "  {} calls, {} prompt + {} completion = {} tokens",
        usage.total_calls,
        usage.total_prompt_tokens,
        usage.total_completion_tokens,
        usage.total_tokens()
    );
    let mut models: Vec<_> = usage.by_model.iter().collect();
    models.sort_by(|a, b| a.0.cmp(b.0));
    for (model, u) in models {
        println!("  {}: {} tokens", model, u.total_tokens);
    }
}

fn print_flow(result: &FlowResult, cli: &Cli) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else if cli.quiet {
        println!("{}", result.qa_report);
    } else {
        println!("\n--- Final Results ---");
        println!("Flow completed successfully.");
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };

    let prompt = cli.prompt_text();
    if let (Some(agent), None) = (&cli.agent, &prompt) {
        return Err(Error::missing_prompt(agent.as_str()));
    }

    let provider_config = cli.provider_config(&file)?;
    tracing::debug!(
        provider = %provider_config.provider_type,
        model = ?provider_config.default_model,
        "provider configured"
    );
    let provider = Provider::from_config(provider_config)?;
    let mut orchestrator = Orchestrator::with_config(provider, cli.orchestrator_config(&file));

    match (&cli.agent, prompt) {
        (Some(agent), Some(input)) => {
            let output = orchestrator.run_agent(agent, &input).await?;
            if cli.json {
                let value = serde_json::json!({ "agent": agent, "output": output });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else if cli.quiet {
                println!("{}", output);
            }
        }
        (_, prompt) => {
            let idea = match prompt {
                Some(idea) => idea,
                None => {
                    let stdin = std::io::stdin();
                    read_idea(&mut stdin.lock(), &mut std::io::stdout())?
                }
            };
            let result = orchestrator.run_flow(&idea).await?;
            print_flow(&result, &cli)?;
        }
    }

    if !cli.quiet && !cli.json {
        print_usage(orchestrator.usage());
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    if let Err(e) = run(cli).await {
        tracing::debug!(error = %e, "run failed");
        eprintln!("Error: {}", e.message());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentchain_agent::AgentRole;
    use agentchain_llm::ErrorKind;
    use std::io::Cursor;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["agentchain"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_prompt_words_are_joined() {
        let cli = parse(&["Create", "a", "calculator"]);
        assert_eq!(cli.prompt_text().as_deref(), Some("Create a calculator"));
        assert!(cli.agent.is_none());
    }

    #[test]
    fn test_flags_after_prompt() {
        let cli = parse(&["idea", "--agent", "qa", "-q"]);
        assert_eq!(cli.agent.as_deref(), Some("qa"));
        assert!(cli.quiet);
        assert_eq!(cli.prompt_text().as_deref(), Some("idea"));

        let cli = parse(&["write", "tests", "--json", "--provider", "local"]);
        assert!(cli.json);
        assert_eq!(cli.provider.as_deref(), Some("local"));
        assert_eq!(cli.prompt_text().as_deref(), Some("write tests"));
    }

    #[test]
    fn test_no_prompt() {
        assert_eq!(parse(&[]).prompt_text(), None);
        assert_eq!(parse(&["  "]).prompt_text(), None);
    }

    #[test]
    fn test_agent_flag() {
        let cli = parse(&["-a", "qa", "check", "this"]);
        assert_eq!(cli.agent.as_deref(), Some("qa"));
        assert_eq!(cli.prompt_text().as_deref(), Some("check this"));

        let cli = parse(&["--agent", "dev"]);
        assert_eq!(cli.agent.as_deref(), Some("dev"));
        assert_eq!(cli.prompt_text(), None);
    }

    #[tokio::test]
    async fn test_agent_without_prompt_fails_before_any_call() {
        let err = run(parse(&["--agent", "po"])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingPrompt);
        assert_eq!(err.message(), "Prompt is required for agent po");
    }

    #[test]
    fn test_temperature_is_validated() {
        let cli = parse(&["--temperature", "0.7", "x"]);
        assert_eq!(cli.temperature, Some(0.7));
        assert!(Cli::try_parse_from(["agentchain", "--temperature", "9", "x"]).is_err());
        assert!(Cli::try_parse_from(["agentchain", "--temperature", "warm", "x"]).is_err());
    }

    #[test]
    fn test_provider_config_from_flags() {
        let cli = parse(&[
            "--provider",
            "anthropic",
            "--api-key",
            "sk-ant-test",
            "--model",
            "claude-3-5-haiku-latest",
            "--timeout",
            "30",
            "x",
        ]);
        let config = cli.provider_config(&ConfigFile::default()).unwrap();
        assert_eq!(config.provider_type, ProviderType::Anthropic);
        assert_eq!(config.api_key.as_deref(), Some("sk-ant-test"));
        assert_eq!(config.default_model.as_deref(), Some("claude-3-5-haiku-latest"));
        assert_eq!(config.timeout_secs, Some(30));
    }

    #[test]
    fn test_provider_config_falls_back_to_file() {
        let file = ConfigFile::parse(
            r#"{ "provider": "local", "base_url": "http://gpu-box:8000/v1", "timeout_secs": 600 }"#,
        )
        .unwrap();
        let config = parse(&["x"]).provider_config(&file).unwrap();
        assert_eq!(config.provider_type, ProviderType::Local);
        assert_eq!(config.base_url.as_deref(), Some("http://gpu-box:8000/v1"));
        assert_eq!(config.timeout_secs, Some(600));

        let config = parse(&["--provider", "openai", "--base-url", "http://proxy/v1", "x"])
            .provider_config(&file)
            .unwrap();
        assert_eq!(config.provider_type, ProviderType::OpenAI);
        assert_eq!(config.base_url.as_deref(), Some("http://proxy/v1"));
    }

    #[test]
    fn test_unknown_provider() {
        let err = parse(&["--provider", "gemini", "x"])
            .provider_config(&ConfigFile::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_orchestrator_config_merges_file() {
        let file = ConfigFile::parse(
            r#"{ "model": "from-file", "max_tokens": 1024, "prompts": { "arch": "Keep it small." } }"#,
        )
        .unwrap();
        let config = parse(&["--model", "from-cli", "--json", "x"]).orchestrator_config(&file);
        assert!(config.quiet);
        assert_eq!(config.settings.model.as_deref(), Some("from-cli"));
        assert_eq!(config.settings.max_tokens, Some(1024));
        assert_eq!(config.prompts.get(AgentRole::Architect), Some("Keep it small."));
    }

    #[test]
    fn test_read_idea() {
        let mut out = Vec::new();
        let idea = read_idea(&mut Cursor::new("A weather dashboard\n"), &mut out).unwrap();
        assert_eq!(idea, "A weather dashboard");

        let shown = String::from_utf8(out).unwrap();
        assert!(shown.starts_with("Welcome to the Multi-Agent System Setup!\n"));
        assert!(shown.contains("This system has 4 agents: Product Owner, Architect, Developer, QA."));
        assert!(shown.ends_with("(or hit Enter for a default 'Snake Game'): "));
    }

    #[test]
    fn test_read_idea_defaults_to_snake() {
        let idea = read_idea(&mut Cursor::new("   \n"), &mut Vec::new()).unwrap();
        assert_eq!(idea, DEFAULT_IDEA);

        let idea = read_idea(&mut Cursor::new(""), &mut Vec::new()).unwrap();
        assert_eq!(idea, "Create a simple command-line Snake Game.");
    }
}
