mod app;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use localfirst::config::{self, Config, ConnectivityMode};
use localfirst::logging;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "localfirst")]
#[command(about = "Rhymes, weather and chat that keep working offline")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/localfirst/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Path to the cache database (default: $XDG_DATA_HOME/localfirst/cache.db)
  #[arg(long)]
  db: Option<PathBuf>,

  /// Behave as if the network were unavailable
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Find words that rhyme
  Rhyme {
    #[arg(required = true, num_args = 1..)]
    word: Vec<String>,
  },
  /// Show current weather for a city
  Weather {
    #[arg(required = true, num_args = 1..)]
    city: Vec<String>,
  },
  /// Talk to the chat server
  Chat {
    #[command(subcommand)]
    action: ChatCommand,
  },
}

#[derive(Subcommand, Debug)]
enum ChatCommand {
  /// Send one message (queued if offline)
  Send {
    #[arg(required = true, num_args = 1..)]
    message: Vec<String>,
  },
  /// Send queued messages now
  Flush,
  /// List queued messages
  Pending,
  /// Show the conversation so far
  History {
    #[arg(short, long)]
    limit: Option<usize>,
  },
  /// Interactive session
  Repl,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::setup_logging(&config, &config::data_dir()?)?;

  // Override connectivity if requested on command line
  let config = if args.offline {
    Config {
      connectivity: ConnectivityMode::Offline,
      ..config
    }
  } else {
    config
  };

  let app = app::App::new(config, args.db).await?;

  match args.command {
    Command::Rhyme { word } => app.rhyme(&word.join(" ")).await,
    Command::Weather { city } => app.weather(&city.join(" ")).await,
    Command::Chat { action } => match action {
      ChatCommand::Send { message } => app.chat_send(&message.join(" ")).await,
      ChatCommand::Flush => app.chat_flush().await,
      ChatCommand::Pending => app.chat_pending(),
      ChatCommand::History { limit } => app.chat_history(limit),
      ChatCommand::Repl => app.chat_repl().await,
    },
  }
}
