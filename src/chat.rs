//! Agent Conversations
//!
//! An agent is a stored prompt, usually an assembled artifact, used as the
//! standing instructions of a conversation. Each agent keeps its history in
//! the key-value store under `agent:{id}:memory`.
//!
//! The instructions are the `**Instructions**` section of the prompt when it
//! has one, otherwise the whole prompt. They are sent once, folded into the
//! first user message; later turns replay the stored history instead.

use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{BackendSet, ChatMessage};
use crate::error::{Error, Result};
use crate::execution::router::BackendCapability;
use crate::registry::{PromptRegistry, DEFAULT_VERSION};
use crate::store::KeyValueStore;

/// Prefix of agent memory keys.
pub const AGENT_PREFIX: &str = "agent:";

const INSTRUCTIONS_HEADING: &str = "**Instructions**";
const SECTION_HEADINGS: &[&str] = &["**Context**", "**Examples**"];

/// Storage key of an agent's conversation history.
pub fn memory_key(agent_id: &str) -> String {
    format!("{}{}:memory", AGENT_PREFIX, agent_id)
}

/// Returns the `**Instructions**` section of a prompt.
///
/// The section ends at the next `**Context**` or `**Examples**` heading.
/// Prompts without the heading, or with an empty section, are returned whole.
pub fn extract_instructions(prompt: &str) -> &str {
    let Some(start) = prompt.find(INSTRUCTIONS_HEADING) else {
        return prompt;
    };

    let body = &prompt[start + INSTRUCTIONS_HEADING.len()..];
    let end = SECTION_HEADINGS
        .iter()
        .filter_map(|heading| body.find(heading))
        .min()
        .unwrap_or(body.len());

    match body[..end].trim() {
        "" => prompt,
        section => section,
    }
}

fn first_turn(instructions: &str, user_input: &str) -> String {
    format!(
        "You are an AI agent and must follow the instructions below from now on.\n\
         ---\n\
         {}\n\
         ---\n\
         \n\
         Now answer the user's first question.\n\
         User: {}",
        instructions, user_input
    )
}

/// One completed exchange.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    /// What the user typed, without the instruction preamble
    pub user_input: String,
    pub assistant_response: String,
}

/// A message to an agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatRequest {
    #[serde(alias = "agentId")]
    pub agent_id: String,

    /// Prompt holding the agent's instructions
    #[serde(alias = "promptId")]
    pub prompt_id: String,

    #[serde(default = "default_version", alias = "versionTag")]
    pub version_tag: String,

    #[serde(alias = "userInput")]
    pub user_input: String,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

impl ChatRequest {
    pub fn new(
        agent_id: impl Into<String>,
        prompt_id: impl Into<String>,
        user_input: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            prompt_id: prompt_id.into(),
            version_tag: default_version(),
            user_input: user_input.into(),
        }
    }

    pub fn with_version(mut self, version_tag: impl Into<String>) -> Self {
        self.version_tag = version_tag.into();
        self
    }

    fn validate(&self) -> Result<()> {
        let missing = [
            ("agent_id", &self.agent_id),
            ("prompt_id", &self.prompt_id),
            ("version_tag", &self.version_tag),
            ("user_input", &self.user_input),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect::<Vec<_>>();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "chat request is missing {}",
                missing.join(", ")
            )))
        }
    }
}

/// The agent's answer.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub agent_id: String,
    pub response: String,
    /// Number of exchanges in the history, this one included
    pub turns: usize,
}

/// Runs agent conversations on top of the prompt registry.
#[derive(Clone)]
pub struct AgentChat {
    registry: PromptRegistry,
    store: Arc<dyn KeyValueStore>,
    backends: BackendSet,
    capability: BackendCapability,
}

impl AgentChat {
    /// Creates a chat service that talks to the secondary remote backend.
    pub fn new(store: Arc<dyn KeyValueStore>, backends: BackendSet) -> Self {
        Self {
            registry: PromptRegistry::new(Arc::clone(&store)),
            store,
            backends,
            capability: BackendCapability::RemoteGenerationSecondary,
        }
    }

    pub fn with_capability(mut self, capability: BackendCapability) -> Self {
        self.capability = capability;
        self
    }

    /// Stored history of an agent, oldest first.
    pub async fn history(&self, agent_id: &str) -> Result<Vec<ChatTurn>> {
        let key = memory_key(agent_id);
        let stored = self
            .store
            .get(&key)
            .await
            .map_err(|e| Error::persistence(&key, e))?;

        match stored {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| Error::Parse {
                what: key,
                reason: e.to_string(),
            }),
        }
    }

    /// Forgets an agent's history.
    pub async fn reset(&self, agent_id: &str) -> Result<()> {
        let key = memory_key(agent_id);
        self.store
            .set(&key, Value::Array(Vec::new()))
            .await
            .map_err(|e| Error::persistence(&key, e))?;
        info!("Cleared memory of agent {}", agent_id);
        Ok(())
    }

    /// Sends one message and records the exchange.
    ///
    /// History is written only after the backend answers, so a failed call
    /// leaves the conversation unchanged.
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatReply> {
        request.validate()?;

        let prompt = self
            .registry
            .fetch(&request.prompt_id, &request.version_tag)
            .await?
            .ok_or_else(|| {
                Error::Lookup(format!("{}:{}", request.prompt_id, request.version_tag))
            })?;

        let mut history = self.history(&request.agent_id).await?;

        let mut messages = Vec::with_capacity(history.len() * 2 + 1);
        for turn in &history {
            messages.push(ChatMessage::user(turn.user_input.clone()));
            messages.push(ChatMessage::assistant(turn.assistant_response.clone()));
        }
        messages.push(if history.is_empty() {
            ChatMessage::user(first_turn(
                extract_instructions(&prompt.content),
                &request.user_input,
            ))
        } else {
            ChatMessage::user(request.user_input.clone())
        });

        debug!(
            "Agent {} on {} ({} earlier turns)",
            request.agent_id,
            prompt.key,
            history.len()
        );

        let response = self
            .backends
            .chat(self.capability, &messages)
            .await
            .map_err(|source| Error::Backend {
                module_id: request.prompt_id.clone(),
                capability: self.capability,
                source,
            })?;

        history.push(ChatTurn {
            user_input: request.user_input.clone(),
            assistant_response: response.clone(),
        });

        let key = memory_key(&request.agent_id);
        let stored = serde_json::to_value(&history).map_err(|e| Error::persistence(&key, e))?;
        self.store
            .set(&key, stored)
            .await
            .map_err(|e| Error::persistence(&key, e))?;

        Ok(ChatReply {
            agent_id: request.agent_id.clone(),
            response,
            turns: history.len(),
        })
    }
}

impl std::fmt::Debug for AgentChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentChat")
            .field("backends", &self.backends)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}
