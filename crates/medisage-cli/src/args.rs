//! CLI argument definitions using clap
//!
//! - medisage chat <conversation> <message>   # Stream one chat turn
//! - medisage score <conversation>            # Grade a consultation
//! - medisage conversations/sessions/scores   # Record management

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medisage")]
#[command(about = "MediSage - streaming relay for simulated patient consultations")]
#[command(
    long_about = r#"MediSage - streaming relay for simulated patient consultations

USAGE:
  medisage conversations new --agent 腹痛患者   # Start a consultation
  medisage chat <id> "哪里不舒服？"              # Stream one turn
  medisage chat <id> --init                     # Ask the patient to open
  medisage score <id>                           # Grade the consultation
  medisage scores show <score_id>               # Read a score report

Streaming commands print the downstream frames (data: ...) to stdout."#
)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (JSON, TOML or YAML)
    #[arg(long, global = true)]
    pub config_file: Option<PathBuf>,

    /// User the records belong to
    #[arg(long, global = true, env = "MEDISAGE_USER", default_value = "local")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream one chat turn of a conversation
    Chat {
        /// Conversation id
        conversation: String,

        /// Message to send (may be omitted with --init)
        #[arg(default_value = "")]
        message: String,

        /// Ask the agent for its opening line instead of sending a message
        #[arg(long)]
        init: bool,

        /// Agent name to use when the conversation has none
        #[arg(long)]
        agent: Option<String>,

        /// Talk to this assistant id regardless of the conversation's agent
        #[arg(long)]
        assistant_id: Option<String>,
    },

    /// Stream the grading of a conversation
    Score {
        /// Conversation id
        conversation: String,
    },

    /// Suggested follow-up prompts for a conversation
    Suggest {
        /// Conversation id
        conversation: String,
    },

    /// Manage conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },

    /// List agent sessions, newest first
    Sessions,

    /// Read score reports
    Scores {
        #[command(subcommand)]
        action: ScoreAction,
    },

    /// List agents and their predefined questions
    Agents {
        /// Agent id
        #[arg(long, conflicts_with = "name")]
        id: Option<String>,

        /// Agent name
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConversationAction {
    /// Create a conversation
    New {
        /// Title (defaults to the agent name)
        #[arg(long)]
        title: Option<String>,

        /// Agent name (defaults to the first agent)
        #[arg(long)]
        agent: Option<String>,
    },

    /// List conversations
    List,

    /// Delete a conversation with its sessions and scores
    Delete {
        /// Conversation id
        id: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ScoreAction {
    /// List score reports, newest first
    List,

    /// Show one score report
    Show {
        /// Score id
        id: String,
    },
}
