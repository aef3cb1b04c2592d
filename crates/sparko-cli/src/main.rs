// ============================================================================
// sparko - terminal client for the Sparko swipe deck
// ============================================================================
// Usage:
//   sparko discover                 Load and show the top of the queue
//   sparko swipe                    Interactive swipe session
//   sparko switch-role investor     Change the active role
//   sparko completion [--role R]    Profile completion for a role
//   sparko matches                  List formed matches
//   sparko reset-sparks             Reset the weekly super-spark balance
// ============================================================================

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sparko_core::{
    DecisionKind, DecisionReport, DiscoveryStatus, GestureMode, HttpMatchingClient,
    MatchingApi, Profile, QueueEvent, QueueManager, QueuePhase, QueueSnapshot, Role,
    SessionContext, Settlement, SparkoConfig,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

/// Sparko swipe client
#[derive(Parser)]
#[command(name = "sparko", version, about = "Swipe through Sparko candidates from the terminal")]
struct Cli {
    /// Matching API base URL (default: SPARKO_API_URL or http://localhost:5000/api)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token (default: SPARKO_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Current user id, recorded in log output (default: SPARKO_USER_ID)
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Active role: entrepreneur, investor, partner (default: SPARKO_ROLE)
    #[arg(long, global = true)]
    role: Option<Role>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load candidates for the active role and show the top of the queue
    Discover,

    /// Interactive swipe session
    Swipe,

    /// Switch the active role and load its queue
    SwitchRole {
        /// Target role: entrepreneur, investor, partner
        role: Role,
    },

    /// Show profile completion for a role
    Completion {
        /// Role to check (default: the active role)
        #[arg(long)]
        role: Option<Role>,
    },

    /// List formed matches
    Matches,

    /// Reset the super-spark balance
    ResetSparks,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env may set RUST_LOG, so load it before the subscriber
    let dotenv = dotenvy::dotenv();
    init_logging()?;
    if let Err(e) = dotenv {
        debug!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();

    let mut config = SparkoConfig::from_env();
    if let Some(url) = &cli.api_url {
        config.api_base_url = url.trim_end_matches('/').to_string();
    }
    let session = session_from(&cli)?;
    info!(
        "Using {} as {} (user: {})",
        config.api_base_url,
        session.role,
        session.user_id.as_deref().unwrap_or("unknown")
    );

    let client = Arc::new(
        HttpMatchingClient::from_config(&config).context("Failed to build HTTP client")?,
    );
    let manager = QueueManager::new(client.clone(), session.clone(), config);

    match cli.command {
        Commands::Discover => cmd_discover(&manager, cli.json).await,
        Commands::Swipe => cmd_swipe(&manager).await,
        Commands::SwitchRole { role } => cmd_switch_role(&manager, role, cli.json).await,
        Commands::Completion { role } => {
            cmd_completion(client.as_ref(), &session, role.unwrap_or(session.role), cli.json).await
        }
        Commands::Matches => cmd_matches(&manager, cli.json).await,
        Commands::ResetSparks => cmd_reset_sparks(&manager, cli.json).await,
    }
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sparko=info".parse()?)
                .add_directive("sparko_core=debug".parse()?),
        )
        .init();
    Ok(())
}

/// Session from flags, falling back to SPARKO_* variables
fn session_from(cli: &Cli) -> Result<SessionContext> {
    let role = match cli.role {
        Some(role) => role,
        None => match std::env::var("SPARKO_ROLE") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("Invalid SPARKO_ROLE '{}'", raw))?,
            Err(_) => Role::default(),
        },
    };
    let token = cli
        .token
        .clone()
        .or_else(|| std::env::var("SPARKO_TOKEN").ok());
    let user_id = cli
        .user_id
        .clone()
        .or_else(|| std::env::var("SPARKO_USER_ID").ok());

    let session = SessionContext::new(role, token);
    Ok(match user_id {
        Some(id) => session.with_user_id(id),
        None => session,
    })
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_discover(manager: &QueueManager, json: bool) -> Result<()> {
    let status = manager.start().await;
    let snapshot = manager.snapshot().await;

    if json {
        let out = serde_json::json!({ "status": status, "queue": snapshot });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_status(&status);
    print_snapshot(&snapshot);
    Ok(())
}

async fn cmd_switch_role(manager: &QueueManager, role: Role, json: bool) -> Result<()> {
    let status = manager
        .switch_role(role)
        .await
        .with_context(|| format!("Failed to switch to {}", role))?;
    let snapshot = manager.snapshot().await;

    if json {
        let out = serde_json::json!({ "status": status, "queue": snapshot });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Now acting as {} ({})", role.display_name(), role.description());
    print_status(&status);
    print_snapshot(&snapshot);
    Ok(())
}

async fn cmd_completion(
    api: &dyn MatchingApi,
    session: &SessionContext,
    role: Role,
    json: bool,
) -> Result<()> {
    let completion = api
        .check_completion(session, role)
        .await
        .context("Failed to check profile completion")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&completion)?);
        return Ok(());
    }

    println!(
        "{} profile: {}% complete ({})",
        role.display_name(),
        completion.percentage(),
        if completion.complete { "ready to discover" } else { "discovery blocked" }
    );
    if let Some(message) = &completion.message {
        println!("  {}", message);
    }
    Ok(())
}

async fn cmd_matches(manager: &QueueManager, json: bool) -> Result<()> {
    let matches = manager
        .list_matches()
        .await
        .context("Failed to list matches")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No matches yet.");
        return Ok(());
    }

    println!("{:<12}  {:<24}  {:<14}  {}", "MATCH ID", "NAME", "ROLE", "CHAT");
    println!("{}", "-".repeat(64));
    for summary in &matches {
        println!(
            "{:<12}  {:<24}  {:<14}  {}",
            summary.match_id,
            summary.name.chars().take(24).collect::<String>(),
            summary.role.map(|r| r.display_name()).unwrap_or("-"),
            if summary.chat_unlocked { "unlocked" } else { "locked" }
        );
    }
    println!("\nTotal: {} matches", matches.len());
    Ok(())
}

async fn cmd_reset_sparks(manager: &QueueManager, json: bool) -> Result<()> {
    let reset = manager
        .reset_super_sparks()
        .await
        .context("Failed to reset super sparks")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reset)?);
        return Ok(());
    }

    println!("Super sparks: {}", reset.balance);
    if let Some(message) = &reset.message {
        println!("  {}", message);
    }
    if let Some(next) = &reset.next_reset {
        println!("  Next reset: {}", next);
    }
    Ok(())
}

// ============================================================================
// Interactive swipe loop
// ============================================================================

const SWIPE_HELP: &str = "\
Commands:
  l, like          like the card on top
  s, skip          skip the card on top
  x, spark         super spark the card on top
  drag <dx>        release a drag at horizontal displacement dx
  refresh          reload candidates (also retries after errors)
  role <name>      switch to entrepreneur, investor or partner
  show             show the queue
  help             this text
  q, quit          exit";

async fn cmd_swipe(manager: &QueueManager) -> Result<()> {
    let printer = spawn_event_printer(manager);

    let status = manager.start().await;
    print_status(&status);
    print_snapshot(&manager.snapshot().await);
    println!("Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        match command {
            "q" | "quit" | "exit" => break,
            "help" | "?" => println!("{}", SWIPE_HELP),
            "show" => print_snapshot(&manager.snapshot().await),
            "l" | "like" => decide(manager, GestureMode::Button(DecisionKind::Like), 0.0).await,
            "s" | "skip" => decide(manager, GestureMode::Button(DecisionKind::Skip), 0.0).await,
            "x" | "spark" => {
                decide(manager, GestureMode::Button(DecisionKind::SuperSpark), 0.0).await
            }
            "drag" => match words.next().map(str::parse::<f64>) {
                Some(Ok(dx)) => decide(manager, GestureMode::Release, dx).await,
                _ => println!("usage: drag <dx>"),
            },
            "refresh" => {
                print_status(&manager.refresh().await);
                print_snapshot(&manager.snapshot().await);
            }
            "role" => match words.next().map(str::parse::<Role>) {
                Some(Ok(role)) => match manager.switch_role(role).await {
                    Ok(status) => {
                        print_status(&status);
                        print_snapshot(&manager.snapshot().await);
                    }
                    Err(e) => println!("Role switch failed: {}", e.user_message()),
                },
                Some(Err(e)) => println!("{}", e),
                None => println!("usage: role <entrepreneur|investor|partner>"),
            },
            other => println!("Unknown command '{}'. Type 'help'.", other),
        }
    }

    printer.abort();
    Ok(())
}

async fn decide(manager: &QueueManager, mode: GestureMode, displacement: f64) {
    let target = manager.visible().await.first().map(|p| p.id.clone());
    let report = manager
        .handle_gesture(target.as_ref(), displacement, mode)
        .await;

    match report {
        DecisionReport::Cancelled => println!("(card returns to rest)"),
        DecisionReport::Ignored(reason) => println!("Nothing to decide on ({:?})", reason),
        DecisionReport::Rejected(e) => println!("Not sent: {}", e),
        DecisionReport::Committed(_) | DecisionReport::Reverted(_) | DecisionReport::Stale => {}
    }

    if let Some(next) = manager.visible().await.first() {
        print_card(next);
    }
}

fn spawn_event_printer(manager: &QueueManager) -> tokio::task::JoinHandle<()> {
    let mut events = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Event printer lagged by {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// ============================================================================
// Output
// ============================================================================

fn print_event(event: &QueueEvent) {
    match event {
        QueueEvent::DecisionSettled {
            profile_id,
            settlement: Settlement::Reverted(e),
        } if !e.is_silent() => println!("! Decision on {} failed: {}", profile_id, e),
        QueueEvent::DecisionSettled { .. } => {}
        QueueEvent::Match {
            profile_id,
            match_id,
        } => println!(
            "*** It's a match with {}! ({}) ***",
            profile_id,
            match_id.as_deref().unwrap_or("pending id")
        ),
        QueueEvent::QueueExhausted { role } => {
            println!("No more {} candidates. Try 'refresh' later.", role.target())
        }
        QueueEvent::ProfileIncomplete { role, ratio, message } => println!(
            "! Your {} profile is {:.0}% complete. {}",
            role,
            ratio * 100.0,
            message.as_deref().unwrap_or("Complete it to start discovering.")
        ),
        QueueEvent::Refilled { added, .. } => debug!("{} new candidates", added),
        QueueEvent::DiscoveryFailed { error, .. } => {
            println!("! {} Type 'refresh' to retry.", error.user_message())
        }
        QueueEvent::RoleChanged { role } => println!("Role changed to {}", role.display_name()),
        QueueEvent::BalanceChanged { balance } => println!("Super sparks left: {}", balance),
        QueueEvent::SessionExpired => {
            println!("! Session expired. Set SPARKO_TOKEN and restart.")
        }
    }
}

fn print_status(status: &DiscoveryStatus) {
    match status {
        DiscoveryStatus::Appended(added) => println!("Loaded {} candidates.", added),
        DiscoveryStatus::Exhausted => println!("No new candidates right now."),
        DiscoveryStatus::Incomplete(completion) => println!(
            "Profile {}% complete. Finish it to start discovering.",
            completion.percentage()
        ),
        DiscoveryStatus::Failed(e) => println!("Discovery failed: {}", e.user_message()),
        DiscoveryStatus::Stale | DiscoveryStatus::Skipped => {}
    }
}

fn print_snapshot(snapshot: &QueueSnapshot) {
    let phase = match &snapshot.phase {
        QueuePhase::Loading => "loading".to_string(),
        QueuePhase::Ready => "ready".to_string(),
        QueuePhase::Exhausted => "exhausted".to_string(),
        QueuePhase::ProfileIncomplete { ratio, .. } => {
            format!("profile incomplete ({:.0}%)", ratio * 100.0)
        }
        QueuePhase::Failed { message } => format!("failed: {}", message),
    };

    println!(
        "[{} | {} | {} in queue | {} pending | {} super sparks | {}]",
        snapshot.role.display_name(),
        phase,
        snapshot.queue_len,
        snapshot.pending.len(),
        snapshot.balance,
        Utc::now().format("%H:%M:%S")
    );
    if let Some(message) = &snapshot.message {
        println!("  {}", message);
    }
    for (position, profile) in snapshot.visible.iter().enumerate() {
        if position == 0 {
            print_card(profile);
        } else {
            println!("  next: {}", summary_line(profile));
        }
    }
}

fn print_card(profile: &Profile) {
    println!("{}", "-".repeat(48));
    println!(
        "{}{}",
        summary_line(profile),
        if profile.super_spark_highlight { "  [super spark]" } else { "" }
    );
    if let Some(tagline) = &profile.tagline {
        println!("  \"{}\"", tagline);
    }
    if let Some(location) = &profile.location {
        println!("  {}", location);
    }
    if !profile.skills.is_empty() {
        println!("  Skills: {}", profile.skills.join(", "));
    }
    if let Some(looking_for) = &profile.looking_for {
        println!("  Looking for: {}", looking_for);
    }
    println!("{}", "-".repeat(48));
}

fn summary_line(profile: &Profile) -> String {
    let mut line = profile.name.clone();
    if let Some(age) = profile.age {
        line.push_str(&format!(", {}", age));
    }
    if let Some(headline) = profile.headline() {
        line.push_str(&format!(" - {}", headline));
    }
    line
}
