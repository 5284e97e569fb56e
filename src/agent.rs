//! Agent and knowledge-document lookup.
//!
//! Agents and their documents live in the dashboard's store, outside this
//! service. The [`AgentDirectory`] trait is the boundary: the transport asks
//! it once per connect and snapshots the result for the session's lifetime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A configured agent persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub greeting_message: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// A service extracted from a crawled page or uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Typed document metadata. The ingestion side produces loosely-shaped JSON;
/// unknown fields are dropped here rather than carried as an open map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub pages: Vec<String>,
}

/// One knowledge-base document assigned to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDocument {
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

/// Lookup boundary for agent configuration and knowledge documents.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_agent(&self, agent_id: u64) -> Option<Agent>;
    async fn get_documents_for_agent(&self, agent_id: u64) -> Vec<KnowledgeDocument>;
}

/// In-memory directory, seeded from a JSON file at startup.
#[derive(Default)]
pub struct InMemoryDirectory {
    agents: HashMap<u64, Agent>,
    documents: HashMap<u64, Vec<KnowledgeDocument>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectorySeed {
    agents: Vec<Agent>,
    #[serde(default)]
    documents: Vec<SeedDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedDocument {
    agent_id: u64,
    #[serde(flatten)]
    document: KnowledgeDocument,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_agent(&mut self, agent: Agent) {
        self.agents.insert(agent.id, agent);
    }

    pub fn insert_document(&mut self, agent_id: u64, document: KnowledgeDocument) {
        self.documents.entry(agent_id).or_default().push(document);
    }

    /// Parse a directory seed of the form
    /// `{"agents": [...], "documents": [{"agentId": 42, ...}]}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let seed: DirectorySeed = serde_json::from_str(json)?;
        let mut directory = Self::new();
        for agent in seed.agents {
            directory.insert_agent(agent);
        }
        for entry in seed.documents {
            directory.insert_document(entry.agent_id, entry.document);
        }
        Ok(directory)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

#[async_trait]
impl AgentDirectory for InMemoryDirectory {
    async fn get_agent(&self, agent_id: u64) -> Option<Agent> {
        self.agents.get(&agent_id).cloned()
    }

    async fn get_documents_for_agent(&self, agent_id: u64) -> Vec<KnowledgeDocument> {
        self.documents.get(&agent_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_lookup() {
        let mut directory = InMemoryDirectory::new();
        directory.insert_agent(Agent {
            id: 42,
            name: "Support Bot".to_string(),
            voice_id: None,
            greeting_message: None,
            system_prompt: None,
        });

        let agent = directory.get_agent(42).await;
        assert!(agent.is_some());
        assert_eq!(agent.unwrap().name, "Support Bot");
        assert!(directory.get_agent(7).await.is_none());
        assert!(directory.get_documents_for_agent(42).await.is_empty());
    }

    #[tokio::test]
    async fn test_seed_from_json() {
        let json = r#"{
            "agents": [{"id": 1, "name": "Acme Bot", "voiceId": "v1"}],
            "documents": [{
                "agentId": 1,
                "name": "Website: acme.com",
                "content": "We sell anvils.",
                "metadata": {"services": [{"title": "Anvils"}]}
            }]
        }"#;

        let directory = InMemoryDirectory::from_json(json).unwrap();
        assert_eq!(directory.agent_count(), 1);

        let agent = directory.get_agent(1).await.unwrap();
        assert_eq!(agent.voice_id.as_deref(), Some("v1"));

        let docs = directory.get_documents_for_agent(1).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.services[0].title, "Anvils");
    }
}
