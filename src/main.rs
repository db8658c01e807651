use anyhow::Result;
use clap::{Parser, Subcommand};
use pdf_rag_chat::commands::{
    delete_session, export_session, index_documents, list_sessions, query_documents, serve_api,
    show_session, start_chat,
};
use pdf_rag_chat::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pdf-rag-chat")]
#[command(about = "Chat with a folder of PDFs through a local vector index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configure Ollama, indexing and server settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Rebuild the vector index from a directory of documents
    Index {
        /// Directory to index (defaults to the configured data directory)
        dir: Option<PathBuf>,
    },
    /// Start the HTTP query server
    Serve,
    /// Print the chunks closest to a question
    Query {
        question: String,
        /// Number of results to show
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Chat in the terminal, starting the query server if needed
    Chat {
        /// Resume an existing session
        #[arg(long)]
        session: Option<String>,
    },
    /// Manage saved chat sessions
    #[command(subcommand)]
    Sessions(SessionCommands),
}

#[derive(Subcommand, Debug)]
enum SessionCommands {
    /// List saved sessions
    List,
    /// Show the history of a session
    Show { session_id: String },
    /// Delete a session
    Delete { session_id: String },
    /// Export a session as a plain-text transcript
    Export {
        session_id: String,
        /// Output file (defaults to chat_<id>.txt)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load_default()?);
            } else {
                run_interactive_config(&get_config_dir()?)?;
            }
        }
        Commands::Index { dir } => {
            index_documents(dir).await?;
        }
        Commands::Serve => {
            serve_api().await?;
        }
        Commands::Query { question, top_k } => {
            query_documents(question, top_k).await?;
        }
        Commands::Chat { session } => {
            start_chat(session).await?;
        }
        Commands::Sessions(command) => match command {
            SessionCommands::List => list_sessions().await?,
            SessionCommands::Show { session_id } => show_session(session_id).await?,
            SessionCommands::Delete { session_id } => delete_session(session_id).await?,
            SessionCommands::Export { session_id, output } => {
                export_session(session_id, output).await?;
            }
        },
    }

    Ok(())
}
