//! Driving an external agent against a [`Toolbox`].
//!
//! The agent itself (usually a language model behind an API) lives outside
//! this crate. It implements [`Agent`]: given the tools and the last
//! observation, pick the next action. [`run_session`] loops until the agent
//! says it is done or the turn budget runs out.

use std::error::Error;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::tools::{ToolDefinition, ToolOutput, Toolbox, ToolboxState};

/// Error type agents report failures with.
pub type AgentError = Box<dyn Error + Send + Sync>;

/// What the agent wants to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    /// Call a tool.
    Call {
        /// Tool name.
        tool: String,
        /// JSON arguments.
        #[serde(default)]
        arguments: Value,
    },
    /// Stop; the task is complete.
    Done {
        /// Final answer or summary.
        summary: String,
    },
}

/// The result of one tool call, fed back to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Turn number, starting at 1.
    pub turn: usize,
    /// Tool that was called.
    pub tool: String,
    /// What the tool produced. Rejected calls show up here as errors.
    pub output: ToolOutput,
}

/// An external decision-maker.
#[async_trait]
pub trait Agent: Send {
    /// Choose the next action. `last` is the previous call's observation,
    /// `None` on the first turn.
    async fn next_action(
        &mut self,
        tools: &[ToolDefinition],
        last: Option<&Observation>,
    ) -> Result<AgentAction, AgentError>;
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SessionEnd {
    /// The agent signaled completion.
    Done {
        /// The agent's summary.
        summary: String,
    },
    /// The turn budget ran out first.
    TurnLimit,
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Tool calls made.
    pub turns: usize,
    /// Why the session stopped.
    pub end: SessionEnd,
    /// Every observation, in order.
    pub observations: Vec<Observation>,
}

impl SessionOutcome {
    /// Whether the agent finished on its own.
    pub fn is_done(&self) -> bool {
        matches!(self.end, SessionEnd::Done { .. })
    }
}

/// Errors that abort a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The toolbox was never initialized.
    #[error("toolbox is not ready")]
    NotReady,
    /// The agent failed to produce an action.
    #[error("agent failed on turn {turn}: {source}")]
    Agent {
        /// Turn being decided.
        turn: usize,
        /// The agent's error.
        #[source]
        source: AgentError,
    },
}

/// Run `agent` against `toolbox` for at most `max_turns` tool calls.
///
/// Tool failures and rejected arguments never end the session; they are
/// returned to the agent as error observations. After the last allowed call
/// the agent is asked once more, so it can still finish with `Done`.
pub async fn run_session<A>(
    toolbox: &Toolbox,
    agent: &mut A,
    max_turns: usize,
) -> Result<SessionOutcome, SessionError>
where
    A: Agent + ?Sized,
{
    if toolbox.state() == ToolboxState::Uninitialized {
        return Err(SessionError::NotReady);
    }

    let tools = toolbox.definitions();
    let mut observations: Vec<Observation> = Vec::new();

    for turn in 1..=max_turns + 1 {
        let action = agent
            .next_action(&tools, observations.last())
            .await
            .map_err(|source| SessionError::Agent { turn, source })?;

        let (tool, arguments) = match action {
            AgentAction::Done { summary } => {
                info!(turns = turn - 1, "agent done");
                return Ok(SessionOutcome {
                    turns: turn - 1,
                    end: SessionEnd::Done { summary },
                    observations,
                });
            }
            AgentAction::Call { tool, arguments } => (tool, arguments),
        };

        if turn > max_turns {
            break;
        }

        info!(turn, tool = %tool, "tool selected");
        let output = match toolbox.invoke(&tool, arguments).await {
            Ok(output) => output,
            Err(e) => {
                warn!(turn, tool = %tool, error = %e, "tool call rejected");
                ToolOutput::error(e.to_string())
            }
        };

        let exit_code = output
            .structured
            .as_ref()
            .and_then(|s| s.get("exit_code"))
            .and_then(Value::as_i64);
        info!(turn, tool = %tool, exit_code, is_error = output.is_error, "tool result");

        observations.push(Observation { turn, tool, output });
    }

    warn!(max_turns, "agent hit the turn limit");
    Ok(SessionOutcome {
        turns: max_turns,
        end: SessionEnd::TurnLimit,
        observations,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::sandbox::VirtualSandbox;
    use crate::skills::Discovery;

    /// Plays back a fixed list of actions and records what it saw.
    #[derive(Debug, Default)]
    struct ScriptedAgent {
        actions: VecDeque<AgentAction>,
        seen: Vec<Option<Observation>>,
    }

    impl ScriptedAgent {
        fn new(actions: impl IntoIterator<Item = AgentAction>) -> Self {
            Self {
                actions: actions.into_iter().collect(),
                seen: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        async fn next_action(
            &mut self,
            _tools: &[ToolDefinition],
            last: Option<&Observation>,
        ) -> Result<AgentAction, AgentError> {
            self.seen.push(last.cloned());
            self.actions.pop_front().ok_or_else(|| "out of actions".into())
        }
    }

    fn call(tool: &str, arguments: Value) -> AgentAction {
        AgentAction::Call {
            tool: tool.to_string(),
            arguments,
        }
    }

    async fn ready_toolbox() -> Toolbox {
        let sandbox = Arc::new(VirtualSandbox::in_memory().await.unwrap());
        let mut toolbox = Toolbox::new(sandbox);
        toolbox.initialize(Discovery::default()).await.unwrap();
        toolbox
    }

    #[tokio::test]
    async fn test_session_runs_until_done() {
        let toolbox = ready_toolbox().await;
        let mut agent = ScriptedAgent::new([
            call("write_file", json!({"path": "/a.txt", "content": "x\ny\n"})),
            call("bash", json!({"command": "wc -l < /a.txt"})),
            AgentAction::Done {
                summary: "two lines".into(),
            },
        ]);

        let outcome = run_session(&toolbox, &mut agent, 10).await.unwrap();
        assert_eq!(outcome.turns, 2);
        assert!(outcome.is_done());
        assert_eq!(outcome.observations[1].output.text, "2\n");

        assert!(agent.seen[0].is_none());
        assert_eq!(agent.seen[2].as_ref().unwrap().tool, "bash");
    }

    #[tokio::test]
    async fn test_rejections_are_observations() {
        let toolbox = ready_toolbox().await;
        let mut agent = ScriptedAgent::new([
            call("bash", json!({"cmd": "ls"})),
            call("teleport", json!({})),
            AgentAction::Done {
                summary: String::new(),
            },
        ]);

        let outcome = run_session(&toolbox, &mut agent, 10).await.unwrap();
        assert_eq!(outcome.turns, 2);
        assert!(outcome.observations.iter().all(|o| o.output.is_error));
        assert!(outcome.observations[1].output.text.contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_turn_limit() {
        let toolbox = ready_toolbox().await;
        let mut agent = ScriptedAgent::new(std::iter::repeat_n(call("bash", json!({"command": "true"})), 5));

        let outcome = run_session(&toolbox, &mut agent, 3).await.unwrap();
        assert_eq!(outcome.turns, 3);
        assert_eq!(outcome.end, SessionEnd::TurnLimit);
        assert_eq!(outcome.observations.len(), 3);
    }

    #[tokio::test]
    async fn test_agent_failure_aborts() {
        let toolbox = ready_toolbox().await;
        let mut agent = ScriptedAgent::new([]);

        let err = run_session(&toolbox, &mut agent, 3).await.unwrap_err();
        assert!(matches!(err, SessionError::Agent { turn: 1, .. }));
    }

    #[tokio::test]
    async fn test_requires_ready_toolbox() {
        let sandbox = Arc::new(VirtualSandbox::in_memory().await.unwrap());
        let toolbox = Toolbox::new(sandbox);
        let mut agent = ScriptedAgent::new([]);

        let err = run_session(&toolbox, &mut agent, 3).await.unwrap_err();
        assert!(matches!(err, SessionError::NotReady));
    }

    #[test]
    fn test_action_wire_format() {
        let action: AgentAction = serde_json::from_value(json!({
            "action": "call",
            "tool": "skill",
            "arguments": {"name": "csv"}
        }))
        .unwrap();
        assert_eq!(action, call("skill", json!({"name": "csv"})));

        let done: AgentAction =
            serde_json::from_value(json!({"action": "done", "summary": "ok"})).unwrap();
        assert!(matches!(done, AgentAction::Done { .. }));
    }
}
