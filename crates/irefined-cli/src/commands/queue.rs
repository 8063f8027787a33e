use chrono::{Duration, Utc};
use clap::Subcommand;
use irefined_core::queue::DEFAULT_ACTIVATION_WINDOW_SECS;
use irefined_core::time::{format_countdown, normalize_start_time, parse_start_time};
use irefined_core::IntentKey;

#[derive(Subcommand)]
pub enum QueueAction {
    /// Print a start time in the feed's canonical form
    Normalize {
        /// Start time (RFC 3339, any offset, optional milliseconds)
        time: String,
    },
    /// Print the status-bar countdown to a start time
    Countdown {
        time: String,
        /// Activation window in seconds
        #[arg(long, default_value_t = DEFAULT_ACTIVATION_WINDOW_SECS)]
        window_secs: i64,
    },
    /// Print the queue key for a season and start time
    Key { season_id: i64, time: String },
}

pub fn run(action: QueueAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        QueueAction::Normalize { time } => {
            println!("{}", normalize_start_time(&time)?);
        }
        QueueAction::Countdown { time, window_secs } => {
            let target = parse_start_time(&time)?;
            println!(
                "{}",
                format_countdown(target, Utc::now(), Duration::seconds(window_secs))
            );
        }
        QueueAction::Key { season_id, time } => {
            let at = parse_start_time(&time)?;
            println!("{}", IntentKey::new(season_id, &at));
        }
    }
    Ok(())
}
