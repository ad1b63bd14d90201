//! The external reasoning agent.
//!
//! The agent is untrusted: its exit code and transcript are logged, but
//! whether it changed anything is decided by looking at the working tree.

use crate::error::{Error, Result};
use crate::util::run_command_with_timeout;
use std::path::PathBuf;
use std::process::Command;

/// What came back from one agent call.
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    pub exit_code: Option<i32>,
    pub transcript: String,
    pub stderr: String,
}

impl AgentReply {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// `review(prompt) -> (exit status, transcript)`; may edit files as a side effect.
pub trait ReviewAgent {
    fn review(&self, prompt: &str) -> Result<AgentReply>;
}

/// An agent CLI that reads its prompt from stdin, e.g. `claude --print`.
#[derive(Debug, Clone)]
pub struct CliAgent {
    program: String,
    args: Vec<String>,
    /// Directory the agent runs in; rule paths in prompts are valid from here
    cwd: PathBuf,
}

impl CliAgent {
    pub fn new(program: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
        }
    }
}

impl ReviewAgent for CliAgent {
    fn review(&self, prompt: &str) -> Result<AgentReply> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.cwd);
        let output = run_command_with_timeout(&mut cmd, Some(prompt), None).map_err(|e| {
            Error::agent(format!(
                "{} could not be run (is it in your PATH?): {}",
                self.program, e
            ))
        })?;
        Ok(AgentReply {
            exit_code: output.exit_code(),
            transcript: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_agent_receives_prompt_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let agent = CliAgent::new("cat", Vec::new(), dir.path());
        let reply = agent.review("Review RedHat.TermsErrors").unwrap();
        assert!(reply.succeeded());
        assert_eq!(reply.transcript, "Review RedHat.TermsErrors");
    }

    #[test]
    fn test_cli_agent_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let agent = CliAgent::new(
            "sh",
            vec!["-c".to_string(), "echo nope >&2; exit 3".to_string()],
            dir.path(),
        );
        let reply = agent.review("anything").unwrap();
        assert!(!reply.succeeded());
        assert_eq!(reply.exit_code, Some(3));
        assert_eq!(reply.stderr.trim(), "nope");
    }

    #[test]
    fn test_missing_agent_binary_is_agent_error() {
        let dir = tempfile::tempdir().unwrap();
        let agent = CliAgent::new("no-such-agent-binary", Vec::new(), dir.path());
        assert!(matches!(agent.review("x"), Err(Error::Agent(_))));
    }
}
