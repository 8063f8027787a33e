use clap::Subcommand;
use irefined_core::Database;

#[derive(Subcommand)]
pub enum GuardAction {
    /// Show the last subsession auto-join acted on
    LastJoined {
        /// Forget it instead
        #[arg(long)]
        clear: bool,
    },
}

pub fn run(action: GuardAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        GuardAction::LastJoined { clear } => {
            let db = Database::open()?;
            if clear {
                if db.clear_last_joined_subsession()? {
                    println!("cleared");
                } else {
                    println!("nothing to clear");
                }
            } else {
                match db.last_joined_subsession()? {
                    Some(id) => println!("{id}"),
                    None => println!("none"),
                }
            }
        }
    }
    Ok(())
}
