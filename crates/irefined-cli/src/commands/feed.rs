use std::path::PathBuf;

use clap::Subcommand;
use irefined_core::feed::{parse_push, SeasonIndex};

#[derive(Subcommand)]
pub enum FeedAction {
    /// Print the lifecycle events one push message yields, one JSON per line
    Parse {
        /// File holding a single push message
        file: PathBuf,
        /// Also print the formatted season index, if the message carries one
        #[arg(long)]
        seasons: bool,
    },
}

pub fn run(action: FeedAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        FeedAction::Parse { file, seasons } => {
            let raw = std::fs::read_to_string(&file)?;
            let message: serde_json::Value = serde_json::from_str(&raw)?;

            for event in parse_push(&message) {
                println!("{}", serde_json::to_string(&event)?);
            }

            if seasons {
                match SeasonIndex::from_push(&message) {
                    Some(index) => {
                        for (season_id, name) in index.entries() {
                            println!("{season_id}\t{name}");
                        }
                    }
                    None => eprintln!("no session list in message"),
                }
            }
        }
    }
    Ok(())
}
