//! Conversation context construction.
//!
//! Builds the system instructions, knowledge context and greeting for one
//! agent. Pure function of the agent and its documents: the same input always
//! produces byte-identical output, so the closed-book contract can be
//! asserted verbatim in tests.

use crate::agent::{Agent, KnowledgeDocument, ServiceEntry};

/// Greeting names at most this many services before truncating.
const MAX_GREETING_SERVICES: usize = 3;
/// Upper bound on service entries carried into the model context.
const MAX_CONTEXT_SERVICES: usize = 10;
/// Per-document content excerpt length in the model context.
const EXCERPT_CHARS: usize = 200;

/// Marker a compliant answer must start with when documents are assigned.
pub const ANSWER_MARKER: &str = "Based on the document";
/// Marker of the compliant refusal.
pub const CANNOT_ANSWER_MARKER: &str = "I cannot answer this question";

/// Everything the session needs that derives from agent + documents.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationContext {
    pub system_instructions: String,
    pub services_context: String,
    pub document_context: String,
    pub greeting_message: String,
    pub document_names: Vec<String>,
}

impl ConversationContext {
    /// Single system message sent (freshly built) on every completion request.
    pub fn system_message(&self) -> String {
        let mut message = self.system_instructions.clone();
        if !self.services_context.is_empty() {
            message.push_str("\n\nService Information:\n");
            message.push_str(&self.services_context);
        }
        if !self.document_context.is_empty() {
            message.push_str("\n\nAvailable documents:\n");
            message.push_str(&self.document_context);
        }
        message
    }
}

/// The exact refusal sentence the model is instructed to use, and that the
/// session substitutes when a response violates the closed-book contract.
pub fn closed_book_fallback(document_names: &[String]) -> String {
    format!(
        "I cannot answer this question as it's not covered in the assigned documents. \
         I can only provide information that is explicitly present in {}. \
         Please ask about the content from these documents.",
        document_names.join(", ")
    )
}

/// Build the conversation context for an agent.
pub fn build_conversation_context(
    agent: &Agent,
    documents: &[KnowledgeDocument],
) -> ConversationContext {
    let document_names: Vec<String> = documents.iter().map(|d| d.name.clone()).collect();

    let system_instructions = if documents.is_empty() {
        open_instructions(agent)
    } else {
        closed_book_instructions(&document_names)
    };

    ConversationContext {
        system_instructions,
        services_context: services_context(documents),
        document_context: document_context(documents),
        greeting_message: greeting_message(agent, documents),
        document_names,
    }
}

fn open_instructions(agent: &Agent) -> String {
    if let Some(prompt) = agent
        .system_prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
    {
        return prompt.to_string();
    }
    format!(
        "You are a helpful assistant named {}. \
         Keep responses conversational and natural for speech, \
         and under two sentences unless more detail is needed.",
        agent.name
    )
}

fn closed_book_instructions(document_names: &[String]) -> String {
    let names_list = document_names
        .iter()
        .map(|name| format!("- {}", name))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a document-focused AI assistant with STRICT limitations. \
         Follow these rules without exception:\n\n\
         1. You can ONLY provide information that is explicitly present in the assigned documents.\n\
         2. Your knowledge is LIMITED to ONLY these documents:\n{names}\n\n\
         3. For EVERY response you give:\n   \
         - First verify if the information exists in the documents\n   \
         - If found: Start with \"Based on the document(s), ...\" and provide only that information\n   \
         - If not found: Respond EXACTLY with this message: \"{fallback}\"\n\n\
         4. NEVER use any external knowledge or general information, even if relevant.\n\
         5. NEVER make assumptions or inferences beyond what's directly stated in the documents.\n\n\
         Important: You have NO access to information outside these documents. \
         Treat any other knowledge as non-existent.",
        names = names_list,
        fallback = closed_book_fallback(document_names),
    )
}

/// Collect service entries across all documents, keeping only entries with a
/// non-empty title.
fn all_services(documents: &[KnowledgeDocument]) -> Vec<&ServiceEntry> {
    documents
        .iter()
        .flat_map(|doc| doc.metadata.services.iter())
        .filter(|service| !service.title.trim().is_empty())
        .collect()
}

fn services_context(documents: &[KnowledgeDocument]) -> String {
    all_services(documents)
        .iter()
        .take(MAX_CONTEXT_SERVICES)
        .map(|service| match service.description.as_deref() {
            Some(description) if !description.trim().is_empty() => {
                format!("- {}: {}", service.title, description)
            }
            _ => format!("- {}", service.title),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn document_context(documents: &[KnowledgeDocument]) -> String {
    documents
        .iter()
        .map(|doc| {
            let excerpt = if doc.content.is_empty() {
                "No content".to_string()
            } else {
                let cut = doc
                    .content
                    .char_indices()
                    .nth(EXCERPT_CHARS)
                    .map(|(i, _)| i)
                    .unwrap_or(doc.content.len());
                format!("{}...", &doc.content[..cut])
            };
            format!("Document: {}\nContent Summary: {}\n---", doc.name, excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn greeting_message(agent: &Agent, documents: &[KnowledgeDocument]) -> String {
    // A greeting configured on the agent wins over the templated one.
    if let Some(greeting) = agent
        .greeting_message
        .as_deref()
        .filter(|g| !g.trim().is_empty())
    {
        return greeting.to_string();
    }

    if documents.is_empty() {
        return format!(
            "Hello! I'm {}, your AI assistant. How can I help you today?",
            agent.name
        );
    }

    let site_doc = &documents[0];
    let site_name = site_doc
        .name
        .strip_prefix("Website: ")
        .unwrap_or(&site_doc.name);
    let description = site_doc
        .metadata
        .description
        .as_deref()
        .and_then(|d| d.split('.').next())
        .unwrap_or("")
        .trim();

    let services = all_services(documents);
    let mut services_list = String::new();
    if !services.is_empty() {
        services_list = services
            .iter()
            .take(MAX_GREETING_SERVICES)
            .map(|service| service.title.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        if services.len() > MAX_GREETING_SERVICES {
            services_list.push_str(&format!(
                " and {} more services",
                services.len() - MAX_GREETING_SERVICES
            ));
        }
    }

    let mut greeting = format!("👋 Hi! I'm your {} assistant", site_name);
    if !description.is_empty() {
        greeting.push_str(&format!(" - {}", description));
    }
    greeting.push_str(". ");
    if !services_list.is_empty() {
        greeting.push_str(&format!("I can help you with {}. ", services_list));
    }
    greeting.push_str("How may I assist you today?");
    greeting
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::DocumentMetadata;

    fn agent(name: &str) -> Agent {
        Agent {
            id: 1,
            name: name.to_string(),
            voice_id: None,
            greeting_message: None,
            system_prompt: None,
        }
    }

    fn document(name: &str, services: Vec<&str>) -> KnowledgeDocument {
        KnowledgeDocument {
            name: name.to_string(),
            content: "Some crawled page text.".to_string(),
            metadata: DocumentMetadata {
                description: None,
                services: services
                    .into_iter()
                    .map(|title| ServiceEntry {
                        title: title.to_string(),
                        description: None,
                    })
                    .collect(),
                pages: vec![],
            },
        }
    }

    #[test]
    fn test_default_greeting_without_documents() {
        let context = build_conversation_context(&agent("Ava"), &[]);
        assert_eq!(
            context.greeting_message,
            "Hello! I'm Ava, your AI assistant. How can I help you today?"
        );
        assert!(context.system_instructions.contains("named Ava"));
        assert!(context.services_context.is_empty());
        assert!(context.document_context.is_empty());
    }

    #[test]
    fn test_configured_greeting_overrides_template() {
        let mut a = agent("Ava");
        a.greeting_message = Some("Welcome to Acme!".to_string());
        let context = build_conversation_context(&a, &[]);
        assert_eq!(context.greeting_message, "Welcome to Acme!");
    }

    #[test]
    fn test_greeting_truncates_services() {
        let docs = vec![document(
            "Website: acme.com",
            vec!["Consulting", "Audits", "Training", "Support", "Hosting"],
        )];
        let context = build_conversation_context(&agent("Ava"), &docs);
        assert!(context
            .greeting_message
            .contains("Consulting, Audits, Training and 2 more services"));
        assert!(context.greeting_message.starts_with("👋 Hi! I'm your acme.com assistant"));
    }

    #[test]
    fn test_closed_book_instructions_embed_fallback() {
        let docs = vec![document("handbook.pdf", vec![])];
        let context = build_conversation_context(&agent("Ava"), &docs);

        assert!(context.system_instructions.contains("- handbook.pdf"));
        assert!(context
            .system_instructions
            .contains(&closed_book_fallback(&context.document_names)));
        assert!(context.system_instructions.contains(ANSWER_MARKER));
    }

    #[test]
    fn test_fallback_sentence_is_canonical() {
        let names = vec!["a.pdf".to_string(), "b.pdf".to_string()];
        assert_eq!(
            closed_book_fallback(&names),
            "I cannot answer this question as it's not covered in the assigned documents. \
             I can only provide information that is explicitly present in a.pdf, b.pdf. \
             Please ask about the content from these documents."
        );
    }

    #[test]
    fn test_system_message_composes_sections() {
        let docs = vec![document("Website: acme.com", vec!["Consulting"])];
        let context = build_conversation_context(&agent("Ava"), &docs);
        let message = context.system_message();

        assert!(message.contains("Service Information:\n- Consulting"));
        assert!(message.contains("Available documents:\nDocument: Website: acme.com"));
    }

    #[test]
    fn test_determinism() {
        let docs = vec![document("Website: acme.com", vec!["Consulting"])];
        let first = build_conversation_context(&agent("Ava"), &docs);
        let second = build_conversation_context(&agent("Ava"), &docs);
        assert_eq!(first, second);
    }
}
