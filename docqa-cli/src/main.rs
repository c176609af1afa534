use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use docqa_cli::{App, CliConfig, telemetry};
use docqa_rag::{CancellationToken, Query};
use tracing::warn;

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Ask questions about your own documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./docqa.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Index file, overriding `store.path`
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Ollama server URL, overriding `ollama.url`
    #[arg(long, global = true)]
    ollama_url: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every .txt, .md and .pdf file under a directory
    Index {
        /// Directory to index; document IDs are paths relative to it
        dir: PathBuf,
    },

    /// Show the chunks most similar to a question
    Search {
        question: String,

        #[command(flatten)]
        retrieval: RetrievalArgs,
    },

    /// Answer a question from the indexed documents
    Ask {
        question: String,

        #[command(flatten)]
        retrieval: RetrievalArgs,

        /// Print the answer and citations as JSON
        #[arg(long)]
        json: bool,

        /// Language model to answer with, overriding `ollama.generation_model`
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Remove a document from the index
    Remove {
        /// Document ID as printed by `docqa index`
        document_id: String,
    },
}

#[derive(Args)]
struct RetrievalArgs {
    /// Number of chunks to retrieve (default: `rag.top_k`)
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Minimum similarity score (default: `rag.similarity_threshold`)
    #[arg(short, long)]
    threshold: Option<f32>,
}

impl RetrievalArgs {
    fn query(&self, question: String) -> Query {
        Query { text: question, top_k: self.top_k, threshold: self.threshold }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose, cli.log_json)?;

    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(index) = cli.index {
        config.store.path = index;
    }
    if let Some(url) = cli.ollama_url {
        config.ollama.url = url;
    }
    if let Commands::Ask { model: Some(model), .. } = &cli.command {
        config.ollama.generation_model = model.clone();
    }

    let app = App::open(&config).await?;
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Index { dir } => {
            app.index(&dir, &mut stdout).await?;
        }
        Commands::Search { question, retrieval } => {
            app.search(&retrieval.query(question), &mut stdout).await?;
        }
        Commands::Ask { question, retrieval, json, .. } => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, cancelling query");
                    on_interrupt.cancel();
                }
            });
            app.ask(&retrieval.query(question), json, &cancel, &mut stdout).await?;
        }
        Commands::Remove { document_id } => {
            app.remove(&document_id, &mut stdout).await?;
        }
    }
    Ok(())
}
