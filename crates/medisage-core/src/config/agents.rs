//! Agent registry
//!
//! An agent is one upstream assistant (a simulated patient persona) identified
//! by its `assistant_id`. The registry pairs the agent list with the API
//! credentials, and is only built when a session actually needs upstream.

use super::model::RelayConfig;
use crate::auth::ApiCredentials;
use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One upstream assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub predefined: PredefinedQuestions,
}

impl AgentProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            predefined: PredefinedQuestions::default(),
        }
    }
}

/// Canned opening questions offered for an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredefinedQuestions {
    #[serde(default)]
    pub questions: Vec<String>,
}

/// Load the agent list: inline config entries win over the agents file.
///
/// A missing or unreadable agents file yields an empty list.
pub async fn load_agents(config: &RelayConfig) -> Vec<AgentProfile> {
    if !config.agents.is_empty() {
        return config.agents.clone();
    }

    let path = config.storage.agents_file();
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str::<Vec<AgentProfile>>(&raw) {
        Ok(agents) => agents,
        Err(e) => {
            warn!("ignoring malformed agents file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Look up agents by id or name; with neither, every agent is returned.
pub fn find_agents<'a>(
    agents: &'a [AgentProfile],
    agent_id: Option<&str>,
    agent_name: Option<&str>,
) -> Vec<&'a AgentProfile> {
    let agent_id = agent_id.map(str::trim).filter(|s| !s.is_empty());
    let agent_name = agent_name.map(str::trim).filter(|s| !s.is_empty());

    match (agent_id, agent_name) {
        (Some(id), _) => agents.iter().filter(|a| a.id == id).take(1).collect(),
        (None, Some(name)) => agents.iter().filter(|a| a.name == name).take(1).collect(),
        (None, None) => agents.iter().collect(),
    }
}

/// Credentials plus the non-empty agent list
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    credentials: ApiCredentials,
    agents: Vec<AgentProfile>,
}

impl AgentRegistry {
    /// Build the registry, failing when credentials or agents are missing
    pub fn new(credentials: Option<ApiCredentials>, agents: Vec<AgentProfile>) -> RelayResult<Self> {
        let credentials = credentials.ok_or_else(|| {
            RelayError::config_with_context(
                "Missing Qingyan API credentials",
                "Set QINGYAN_API_KEY and QINGYAN_API_SECRET or configure upstream.api_key/api_secret",
            )
        })?;
        if agents.is_empty() {
            return Err(RelayError::config_with_context(
                "Missing agents list",
                "Add agents to the config file or to agents.json in the data directory",
            ));
        }
        Ok(Self {
            credentials,
            agents,
        })
    }

    /// Build the registry from configuration
    pub async fn load(config: &RelayConfig) -> RelayResult<Self> {
        let credentials = config
            .upstream
            .credentials()
            .map(|(key, secret)| ApiCredentials::new(key, secret));
        let agents = load_agents(config).await;
        Self::new(credentials, agents)
    }

    pub fn credentials(&self) -> &ApiCredentials {
        &self.credentials
    }

    pub fn agents(&self) -> &[AgentProfile] {
        &self.agents
    }

    pub fn find_by_id(&self, id: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Agent with the given name, or the first agent
    pub fn pick(&self, name: Option<&str>) -> &AgentProfile {
        name.filter(|n| !n.is_empty())
            .and_then(|n| self.agents.iter().find(|a| a.name == n))
            .unwrap_or(&self.agents[0])
    }

    /// Resolve the agent for a chat turn.
    ///
    /// Priority: explicit assistant id, the conversation's stored agent id,
    /// the conversation's (then the request's) agent name, the first agent.
    /// Ids unknown to the registry are still honored as ad-hoc agents.
    pub fn resolve(
        &self,
        assistant_id_override: Option<&str>,
        conversation_agent_id: Option<&str>,
        conversation_agent_name: Option<&str>,
        requested_name: Option<&str>,
    ) -> AgentProfile {
        let conversation_agent_name = non_empty(conversation_agent_name);
        let requested_name = non_empty(requested_name);

        if let Some(id) = non_empty(assistant_id_override) {
            return self.find_by_id(id).cloned().unwrap_or_else(|| {
                AgentProfile::new(
                    id,
                    requested_name
                        .or(conversation_agent_name)
                        .unwrap_or("assistant"),
                )
            });
        }

        if let Some(id) = non_empty(conversation_agent_id) {
            return self.find_by_id(id).cloned().unwrap_or_else(|| {
                AgentProfile::new(
                    id,
                    conversation_agent_name
                        .or(requested_name)
                        .unwrap_or("assistant"),
                )
            });
        }

        self.pick(conversation_agent_name.or(requested_name)).clone()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(
            Some(ApiCredentials::new("k", "s")),
            vec![
                AgentProfile::new("a1", "腹痛患者"),
                AgentProfile::new("a2", "发热患者"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_registry_requires_credentials_and_agents() {
        let err = AgentRegistry::new(None, vec![AgentProfile::new("a1", "x")]).unwrap_err();
        assert!(matches!(err, RelayError::Config { .. }));

        let err = AgentRegistry::new(Some(ApiCredentials::new("k", "s")), vec![]).unwrap_err();
        assert!(matches!(err, RelayError::Config { .. }));
    }

    #[test]
    fn test_resolve_each_priority_level() {
        let registry = registry();

        // 1. assistant id override beats everything else
        let agent = registry.resolve(Some("a2"), Some("a1"), Some("腹痛患者"), Some("腹痛患者"));
        assert_eq!(agent.id, "a2");

        // 2. stored agent id beats names
        let agent = registry.resolve(None, Some("a2"), Some("腹痛患者"), Some("腹痛患者"));
        assert_eq!(agent.id, "a2");

        // 3. conversation name, then requested name
        let agent = registry.resolve(None, None, Some("发热患者"), Some("腹痛患者"));
        assert_eq!(agent.id, "a2");
        let agent = registry.resolve(Some("  "), Some(""), None, Some("发热患者"));
        assert_eq!(agent.id, "a2");

        // 4. first agent
        let agent = registry.resolve(None, None, None, None);
        assert_eq!(agent.id, "a1");
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some(" a ")), Some(" a "));
        assert_eq!(non_empty(Some(" ")), None);
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn test_resolve_priority() {
        let registry = registry();

        let agent = registry.resolve(Some("a2"), Some("a1"), None, None);
        assert_eq!(agent.name, "发热患者");

        let agent = registry.resolve(Some("custom"), None, None, Some("临时"));
        assert_eq!(agent, AgentProfile::new("custom", "临时"));

        let agent = registry.resolve(None, Some("a1"), Some("发热患者"), None);
        assert_eq!(agent.id, "a1");

        let agent = registry.resolve(None, None, None, Some("发热患者"));
        assert_eq!(agent.id, "a2");

        let agent = registry.resolve(None, None, Some(""), Some("unknown"));
        assert_eq!(agent.id, "a1");
    }

    #[test]
    fn test_find_agents() {
        let agents = vec![
            AgentProfile::new("a1", "腹痛患者"),
            AgentProfile::new("a2", "发热患者"),
        ];
        assert_eq!(find_agents(&agents, None, None).len(), 2);
        assert_eq!(find_agents(&agents, Some("a2"), None)[0].name, "发热患者");
        assert_eq!(find_agents(&agents, None, Some("腹痛患者"))[0].id, "a1");
        assert!(find_agents(&agents, Some("zz"), Some("腹痛患者")).is_empty());
    }

    #[tokio::test]
    async fn test_load_agents_from_data_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        tokio::fs::write(
            temp_dir.path().join("agents.json"),
            r#"[{"id":"a1","name":"腹痛患者","predefined":{"questions":["哪里不舒服？"]}}]"#,
        )
        .await
        .unwrap();

        let mut config = RelayConfig::default();
        config.storage.data_dir = temp_dir.path().to_path_buf();

        let agents = load_agents(&config).await;
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].predefined.questions, vec!["哪里不舒服？"]);
    }
}
