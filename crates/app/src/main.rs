use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::Config;

#[derive(Parser)]
#[command(author, version, about = "Load brokerage statement extractions into a finance database", long_about = None)]
struct Cli {
    /// Config file (default: $STMTLOAD_CONFIG, then stmtload.toml in the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Database file, overriding the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its tables
    Init,
    /// Upsert entities, institutions and accounts from a TOML file
    #[command(arg_required_else_help = true)]
    Reference {
        file: PathBuf,
    },
    /// Register a source statement by its content hash
    #[command(arg_required_else_help = true)]
    Register {
        file: PathBuf,
        #[arg(short, long)]
        institution: String,
        /// Statement date (YYYY-MM-DD or MM/DD/YYYY)
        #[arg(short, long)]
        statement_date: Option<String>,
    },
    /// Load one or more extraction JSON files
    #[command(arg_required_else_help = true)]
    Load {
        files: Vec<PathBuf>,
    },
    /// Manage the mapping rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// Replace the stored rules with a CSV rules sheet
    Update {
        /// Rules sheet (default: [rules] sheet from the config)
        sheet: Option<PathBuf>,
    },
    /// Re-run the stored rules over loaded transactions and positions
    Apply {
        /// Only records of this document
        #[arg(short, long)]
        document: Option<i64>,
    },
    /// List the stored rules in application order
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    match cli.command {
        Commands::Init => commands::init(&config).await,
        Commands::Reference { file } => commands::reference(&config, &file).await,
        Commands::Register {
            file,
            institution,
            statement_date,
        } => commands::register(&config, &file, &institution, statement_date.as_deref())
            .await
            .map(|_| ()),
        Commands::Load { files } => commands::load(&config, &files).await,
        Commands::Rules { command } => match command {
            RulesCommand::Update { sheet } => commands::rules_update(&config, sheet.as_deref()).await,
            RulesCommand::Apply { document } => commands::rules_apply(&config, document).await,
            RulesCommand::Show => commands::rules_show(&config).await,
        },
    }
}
