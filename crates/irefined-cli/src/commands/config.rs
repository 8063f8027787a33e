use clap::Subcommand;
use irefined_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one setting
    Get {
        /// One of: features.auto_register, features.auto_join,
        /// features.auto_forfeit, queue.activation_window_secs,
        /// queue.expire_unmatched_after_secs, auto_join.join_type (race|all),
        /// auto_forfeit.minutes
        key: String,
    },
    /// Change one setting; windows and countdowns must be non-zero and fit a
    /// chrono duration. Takes effect on the next `run`
    Set {
        /// Dotted key, see `config get --help`
        key: String,
        /// New value
        value: String,
    },
    /// Print the whole file as JSON
    List,
    /// Print the timings the engine would start with
    Check,
    /// Overwrite the file with defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => {
                    eprintln!("unknown key: {key} (known: {})", Config::KEYS.join(", "));
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            let applied = config.get(&key).unwrap_or(value);
            println!("{key} = {applied}");
        }
        ConfigAction::List => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Check => {
            let config = Config::load()?;
            config.validate()?;
            println!(
                "activation window: {}s",
                config.queue.activation_window().num_seconds()
            );
            match config.queue.expire_unmatched_after() {
                Some(after) => println!("unmatched intents expire: {}s after start", after.num_seconds()),
                None => println!("unmatched intents expire: never"),
            }
            println!(
                "forfeit countdown: {}s",
                config.auto_forfeit.countdown().as_secs()
            );
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
