//! Command routing logic for CLI

use crate::args::{Cli, Commands, ConversationAction, ScoreAction};
use crate::commands::{records, stream};
use medisage_core::error::RelayResult;
use medisage_core::{ChatRequest, ConversationService, RelayConfig, RelayContext, ScoreRequest};

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli, config: RelayConfig) -> RelayResult<()> {
    let ctx = RelayContext::from_config(config)?;
    let service = ConversationService::new(ctx.config.clone(), ctx.store.clone());
    let user = cli.user.as_str();

    match cli.command {
        Commands::Chat {
            conversation,
            message,
            init,
            agent,
            assistant_id,
        } => {
            let request = ChatRequest {
                init,
                agent_name: agent,
                assistant_id,
                ..ChatRequest::new(user, conversation, message)
            };
            stream::chat(ctx, request).await
        }
        Commands::Score { conversation } => {
            stream::score(ctx, ScoreRequest::new(user, conversation)).await
        }
        Commands::Suggest { conversation } => records::suggest(&ctx, user, &conversation).await,
        Commands::Conversations { action } => match action {
            ConversationAction::New { title, agent } => {
                records::create_conversation(&service, user, title.as_deref(), agent.as_deref())
                    .await
            }
            ConversationAction::List => records::list_conversations(&service, user).await,
            ConversationAction::Delete { id } => {
                records::delete_conversation(&service, user, &id).await
            }
        },
        Commands::Sessions => records::list_sessions(&service, user).await,
        Commands::Scores { action } => match action {
            ScoreAction::List => records::list_scores(&service, user).await,
            ScoreAction::Show { id } => records::show_score(&service, user, &id).await,
        },
        Commands::Agents { id, name } => {
            records::list_agents(&service, id.as_deref(), name.as_deref()).await
        }
    }
}
