use color_eyre::Result;
use localfirst::cache::{probe, Connectivity, Notice, Provenance, SendOutcome, SqliteStorage};
use localfirst::chat::{ChatClient, ChatNotice, ChatSession};
use localfirst::config::{Config, ConnectivityMode};
use localfirst::rhymes::CachedRhymeClient;
use localfirst::weather::CachedWeatherClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// How long the startup connectivity probe may take
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Main application state
pub struct App {
  config: Config,
  connectivity: Connectivity,
  storage: Arc<SqliteStorage>,
}

impl App {
  pub async fn new(config: Config, db_path: Option<PathBuf>) -> Result<Self> {
    let storage = match db_path {
      Some(path) => SqliteStorage::open_at(&path)?,
      None => SqliteStorage::open()?,
    };

    let online = match config.connectivity {
      ConnectivityMode::Online => true,
      ConnectivityMode::Offline => false,
      ConnectivityMode::Auto => probe(&config.probe_addr, PROBE_TIMEOUT).await,
    };
    tracing::info!(online, mode = ?config.connectivity, "starting");

    Ok(Self {
      config,
      connectivity: Connectivity::new(online),
      storage: Arc::new(storage),
    })
  }

  pub async fn rhyme(&self, word: &str) -> Result<()> {
    let client = CachedRhymeClient::new(&self.config, self.connectivity.clone())?;
    let result = client.find_rhymes(word).await;

    match (&result.provenance, &result.error) {
      (Provenance::None, Some(e)) => {
        println!("Rhymes for \"{}\":", word.trim());
        print!("{}", result.value);
        eprintln!("({})", e);
      }
      (provenance, _) => {
        println!("Rhymes for \"{}\" ({}):", word.trim(), provenance);
        print!("{}", result.value);
      }
    }
    Ok(())
  }

  pub async fn weather(&self, city: &str) -> Result<()> {
    let client = CachedWeatherClient::new(&self.config, self.storage.clone(), self.connectivity.clone())?;
    let result = client.current(city).await;

    print!("{}", result.value);
    match (&result.provenance, &result.error, &result.stored_at) {
      (Provenance::Local, _, Some(at)) => eprintln!("(cached at {})", at.format("%Y-%m-%d %H:%M UTC")),
      (Provenance::None, Some(e), _) => eprintln!("({})", e),
      _ => {}
    }
    Ok(())
  }

  fn chat_session(&self) -> Result<(ChatSession, tokio::sync::mpsc::UnboundedReceiver<ChatNotice>)> {
    let client = ChatClient::new(&self.config.chat, self.config.timeout())?;
    ChatSession::new(self.storage.clone(), client, self.connectivity.clone())
  }

  pub async fn chat_send(&self, message: &str) -> Result<()> {
    let (session, _notices) = self.chat_session()?;
    let outcome = session.send(message).await?;
    print_outcome(&outcome);

    let pending = session.pending().len();
    if pending > 0 && self.connectivity.is_online() {
      eprintln!("({} queued message(s) waiting; run `localfirst chat flush`)", pending);
    }
    Ok(())
  }

  pub async fn chat_flush(&self) -> Result<()> {
    let (session, mut notices) = self.chat_session()?;
    if !self.connectivity.is_online() {
      println!("Offline: {} message(s) still queued", session.pending().len());
      return Ok(());
    }

    let report = session.flush().await?;
    while let Ok(notice) = notices.try_recv() {
      print_notice(&notice);
      session.record_notice(&notice)?;
    }

    if let Some(report) = report {
      println!(
        "Delivered {}, failed {}, remaining {}",
        report.delivered, report.failed, report.remaining
      );
    }
    Ok(())
  }

  pub fn chat_pending(&self) -> Result<()> {
    let (session, _notices) = self.chat_session()?;
    let pending = session.pending();
    if pending.is_empty() {
      println!("No queued messages");
    }
    for (i, message) in pending.iter().enumerate() {
      println!("{:>2}. {}", i + 1, message);
    }
    Ok(())
  }

  pub fn chat_history(&self, limit: Option<usize>) -> Result<()> {
    let (session, _notices) = self.chat_session()?;
    let limit = limit.unwrap_or(self.config.chat.history_limit);
    for record in session.history(limit)? {
      println!(
        "[{}] {}: {}",
        record.created_at.format("%H:%M"),
        record.role,
        record.content
      );
    }
    Ok(())
  }

  /// Interactive chat. `/offline` and `/online` toggle connectivity so the
  /// queue and the reconnect flush can be exercised by hand.
  pub async fn chat_repl(&self) -> Result<()> {
    let (session, mut notices) = self.chat_session()?;
    let session = Arc::new(session);
    let flusher = session.outbox().spawn_reconnect_flush();

    let printer = {
      let session = Arc::clone(&session);
      tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
          if matches!(notice, Notice::Queued(_)) {
            continue;
          }
          print_notice(&notice);
          if let Err(e) = session.record_notice(&notice) {
            tracing::warn!(error = %e, "failed to record chat notice");
          }
        }
      })
    };

    println!(
      "Chat ({}). Commands: /online /offline /pending /quit",
      if self.connectivity.is_online() { "online" } else { "offline" }
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
      match line.trim() {
        "" => continue,
        "/quit" | "/exit" => break,
        "/offline" => {
          self.connectivity.set_online(false);
          println!("system: You are currently offline. Messages will be sent when connection is restored.");
        }
        "/online" => {
          self.connectivity.set_online(true);
          println!("system: Back online");
        }
        "/pending" => {
          for message in session.pending() {
            println!("  queued: {}", message);
          }
        }
        message => match session.send(message).await {
          Ok(outcome) => print_outcome(&outcome),
          Err(e) => println!("system: {}", e),
        },
      }
    }

    flusher.abort();
    printer.abort();
    Ok(())
  }
}

fn print_outcome(outcome: &SendOutcome<String>) {
  match outcome {
    SendOutcome::Delivered(reply) => println!("assistant: {}", reply),
    SendOutcome::Failed(e) => println!("system: {}", e),
    SendOutcome::Queued => println!("system: Message queued for sending when online"),
  }
}

fn print_notice(notice: &ChatNotice) {
  match notice {
    Notice::Queued(message) => println!("system: queued \"{}\"", message),
    Notice::Delivered { message, reply } => {
      println!("user (sent): {}", message);
      println!("assistant: {}", reply);
    }
    Notice::Failed { message, error } => {
      println!("system: failed to send \"{}\": {}", message, error)
    }
  }
}
