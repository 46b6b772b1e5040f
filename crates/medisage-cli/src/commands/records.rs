//! Record commands: conversations, agent sessions, scores and agents
//!
//! Results are printed as pretty JSON in the same shape the data files use.

use medisage_core::error::RelayResult;
use medisage_core::{ConversationService, RelayContext};
use serde::Serialize;

/// Pretty-print `value` to stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> RelayResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn create_conversation(
    service: &ConversationService,
    user_id: &str,
    title: Option<&str>,
    agent: Option<&str>,
) -> RelayResult<()> {
    let record = service.create_conversation(user_id, title, agent).await?;
    print_json(&record)
}

pub async fn list_conversations(service: &ConversationService, user_id: &str) -> RelayResult<()> {
    let records = service.list_conversations(user_id).await?;
    print_json(&records)
}

pub async fn delete_conversation(
    service: &ConversationService,
    user_id: &str,
    conversation_id: &str,
) -> RelayResult<()> {
    service.delete_conversation(user_id, conversation_id).await?;
    eprintln!("Deleted conversation {}", conversation_id);
    Ok(())
}

pub async fn list_sessions(service: &ConversationService, user_id: &str) -> RelayResult<()> {
    let sessions = service.list_agent_sessions(user_id).await?;
    print_json(&sessions)
}

pub async fn list_scores(service: &ConversationService, user_id: &str) -> RelayResult<()> {
    let scores = service.list_scores(user_id).await?;
    print_json(&scores)
}

pub async fn show_score(
    service: &ConversationService,
    user_id: &str,
    score_id: &str,
) -> RelayResult<()> {
    let score = service.get_score(user_id, score_id).await?;
    print_json(&score)
}

pub async fn list_agents(
    service: &ConversationService,
    agent_id: Option<&str>,
    agent_name: Option<&str>,
) -> RelayResult<()> {
    let agents = service.predefined_questions(agent_id, agent_name).await?;
    print_json(&agents)
}

/// Print suggested follow-up prompts, one per line
pub async fn suggest(ctx: &RelayContext, user_id: &str, conversation_id: &str) -> RelayResult<()> {
    let prompts = medisage_core::suggest_prompts(ctx, user_id, conversation_id).await?;
    for prompt in &prompts {
        println!("{}", prompt);
    }
    Ok(())
}
