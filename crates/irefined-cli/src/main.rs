use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "irefined-cli", version, about = "iRefined session queue CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the queue engine over JSON lines on stdin/stdout
    Run(commands::run::RunArgs),
    /// Start-time helpers
    Queue {
        #[command(subcommand)]
        action: commands::queue::QueueAction,
    },
    /// Push-feed inspection
    Feed {
        #[command(subcommand)]
        action: commands::feed::FeedAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Join/forfeit guard state
    Guard {
        #[command(subcommand)]
        action: commands::guard::GuardAction,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Queue { action } => commands::queue::run(action),
        Commands::Feed { action } => commands::feed::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Guard { action } => commands::guard::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
