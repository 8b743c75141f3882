//! The four agent roles and their built-in prompt templates

use agentchain_llm::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A role in the flow. Declaration order is flow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentRole {
    #[serde(rename = "po")]
    ProductOwner,
    #[serde(rename = "arch")]
    Architect,
    #[serde(rename = "dev")]
    Developer,
    #[serde(rename = "qa")]
    Qa,
}

impl AgentRole {
    /// All roles, PO -> Architect -> Developer -> QA
    pub const ALL: [AgentRole; 4] = [
        AgentRole::ProductOwner,
        AgentRole::Architect,
        AgentRole::Developer,
        AgentRole::Qa,
    ];

    /// Selector names accepted by `--agent`
    pub const KEYS: [&'static str; 4] = ["po", "arch", "dev", "qa"];

    pub fn key(&self) -> &'static str {
        match self {
            AgentRole::ProductOwner => "po",
            AgentRole::Architect => "arch",
            AgentRole::Developer => "dev",
            AgentRole::Qa => "qa",
        }
    }

    /// Shown while the agent works: `>> {title} Working...`
    pub fn title(&self) -> &'static str {
        match self {
            AgentRole::ProductOwner => "Product Owner",
            AgentRole::Architect => "Tech Architect",
            AgentRole::Developer => "Developer",
            AgentRole::Qa => "QA",
        }
    }

    /// Prefix of the printed result: `{label} Output: ...`
    pub fn output_label(&self) -> &'static str {
        match self {
            AgentRole::ProductOwner => "PO",
            AgentRole::Architect => "Architect",
            AgentRole::Developer => "Developer",
            AgentRole::Qa => "QA",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            AgentRole::ProductOwner => PRODUCT_OWNER_PROMPT,
            AgentRole::Architect => ARCHITECT_PROMPT,
            AgentRole::Developer => DEVELOPER_PROMPT,
            AgentRole::Qa => QA_PROMPT,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AgentRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "po" | "product-owner" | "product_owner" => Ok(AgentRole::ProductOwner),
            "arch" | "architect" => Ok(AgentRole::Architect),
            "dev" | "developer" => Ok(AgentRole::Developer),
            "qa" | "tester" => Ok(AgentRole::Qa),
            _ => Err(Error::unknown_agent(s, &AgentRole::KEYS).with_operation("agent_role::parse")),
        }
    }
}

const PRODUCT_OWNER_PROMPT: &str = "\
You are an experienced Product Owner. Turn the user's rough project idea into \
clear requirements. Include: a one-paragraph product vision, user stories in \
the form 'As a <user>, I want <goal> so that <benefit>', acceptance criteria \
for each story, and anything explicitly out of scope. Be specific but brief. \
Output ONLY the requirements, no preamble.";

const ARCHITECT_PROMPT: &str = "\
You are a pragmatic software architect. Given product requirements, propose \
the simplest architecture that satisfies them. Include: technology stack with \
a one-line reason for each choice, components and their responsibilities, \
file and module layout, key data structures, and how the pieces interact. \
Be terse. Output ONLY the design, no preamble.";

const DEVELOPER_PROMPT: &str = "\
You are a senior software developer. Given an architecture, write a complete, \
working implementation. Produce every source file with its path as a heading \
followed by the full file contents in a fenced code block, then short \
instructions to build and run it. Do not leave placeholders or TODOs.";

const QA_PROMPT: &str = "\
You are a meticulous QA engineer. Given an implementation and the original \
requirements, verify the implementation against every acceptance criterion. \
Produce a QA report with: a test plan, concrete test cases (input, expected \
result, verdict), defects found with severity, and a final verdict of PASS \
or FAIL with a one-line justification.";

#[cfg(test)]
mod tests {
    use super::*;
    use agentchain_llm::ErrorKind;

    #[test]
    fn test_keys_match_roles() {
        let keys: Vec<&str> = AgentRole::ALL.iter().map(|r| r.key()).collect();
        assert_eq!(keys, AgentRole::KEYS);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("PO".parse::<AgentRole>().unwrap(), AgentRole::ProductOwner);
        assert_eq!("Arch".parse::<AgentRole>().unwrap(), AgentRole::Architect);
        assert_eq!("developer".parse::<AgentRole>().unwrap(), AgentRole::Developer);
        assert_eq!(" qa ".parse::<AgentRole>().unwrap(), AgentRole::Qa);
    }

    #[test]
    fn test_unknown_role() {
        let err = "designer".parse::<AgentRole>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownAgent);
        assert_eq!(
            err.message(),
            "Unknown agent 'designer'. Available: [po, arch, dev, qa]"
        );
    }

    #[test]
    fn test_flow_order() {
        let mut roles = AgentRole::ALL;
        roles.reverse();
        roles.sort();
        assert_eq!(roles, AgentRole::ALL);
    }

    #[test]
    fn test_serde_uses_keys() {
        assert_eq!(serde_json::to_string(&AgentRole::Architect).unwrap(), "\"arch\"");
        let role: AgentRole = serde_json::from_str("\"qa\"").unwrap();
        assert_eq!(role, AgentRole::Qa);
    }

    #[test]
    fn test_every_role_has_a_prompt() {
        for role in AgentRole::ALL {
            assert!(!role.system_prompt().is_empty(), "{} has no prompt", role);
            assert!(!role.system_prompt().contains("  "));
        }
    }
}
