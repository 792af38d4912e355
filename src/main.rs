//! fwstage - Firewall rule staging console
//!
//! Command-line front end for staging, reviewing and applying the ordered
//! ruleset of a remote firewall appliance.
//!
//! # Usage
//!
//! ```bash
//! fwstage status                       # Enabled flag, policy, rule counts
//! fwstage show                         # Numbered rules with issues and hints
//! fwstage export > rules.json          # Current rules + policy as JSON
//! fwstage diff rules.json              # What applying the file would change
//! fwstage apply rules.json             # Apply, confirming hazardous changes
//! fwstage enable [--apply rules.json]  # Enable (optionally apply first)
//! fwstage disable
//! fwstage explain --proto tcp --src 203.0.113.9 --dst 10.0.0.1 --dport 22
//! fwstage interfaces
//! fwstage settings --set allow_icmp=false
//! ```

use clap::{Args, Parser, Subcommand};
use fwstage::audit::AuditLog;
use fwstage::config::{self, ConsoleConfig};
use fwstage::core::evaluate::{Packet, Transport, Verdict};
use fwstage::core::gate::Hazard;
use fwstage::core::ruleset::RulesetUpdate;
use fwstage::core::sync::Outcome;
use fwstage::utils;
use fwstage::{HttpAuthority, Mode, Request, SyncController};
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fwstage")]
#[command(about = "Stage, review and safely apply firewall rules on a remote appliance", long_about = None)]
struct Cli {
    /// Appliance base URL (overrides the saved config)
    #[arg(long, global = true)]
    endpoint: Option<String>,
    /// Bearer token (overrides the saved config)
    #[arg(long, global = true)]
    token: Option<String>,
    /// Save --endpoint/--token to the config file
    #[arg(long, global = true)]
    save: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show enabled flag, policy and rule counts
    Status,
    /// List the current rules
    Show,
    /// Print the current rules and policy as JSON
    Export,
    /// Show what applying a rules file would change
    Diff {
        /// JSON file with `rules` and `policy`
        file: PathBuf,
    },
    /// Apply a rules file
    Apply {
        /// JSON file with `rules` and `policy`
        file: PathBuf,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Enable the firewall
    Enable {
        /// Apply this rules file before enabling
        #[arg(long, value_name = "FILE")]
        apply: Option<PathBuf>,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Disable the firewall
    Disable,
    /// Show which rule would decide a packet
    Explain(ExplainArgs),
    /// List the appliance's network interfaces
    Interfaces,
    /// Show or change appliance firewall settings
    Settings {
        /// `name=true|false`, may be repeated
        #[arg(long = "set", value_name = "NAME=BOOL")]
        set: Vec<String>,
    },
}

#[derive(Args)]
struct ExplainArgs {
    /// Evaluate a rules file instead of the live rules
    #[arg(long, value_name = "FILE")]
    file: Option<PathBuf>,
    #[arg(long, default_value = "in")]
    direction: Mode,
    /// tcp, udp or other
    #[arg(long, default_value = "tcp")]
    proto: String,
    #[arg(long)]
    src: IpAddr,
    #[arg(long)]
    dst: IpAddr,
    #[arg(long, default_value_t = 40000)]
    sport: u16,
    /// Required for tcp and udp
    #[arg(long)]
    dport: Option<u16>,
    /// Input interface
    #[arg(long)]
    iif: Option<String>,
    /// Output interface
    #[arg(long)]
    oif: Option<String>,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    let dirs = utils::ensure_dirs();
    init_logging();
    if let Err(e) = dirs {
        tracing::warn!("Failed to create data/state directories: {e}");
    }
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    if let Some(mut log_path) = utils::get_state_dir() {
        log_path.push("fwstage.log");
        if let Ok(file) = std::fs::File::create(log_path) {
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .init();
            return;
        }
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .init();
}

async fn handle_cli(cli: Cli) -> CliResult {
    let mut config = config::load_config().await;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(token) = cli.token {
        config.api_token = Some(token);
    }
    if cli.save {
        config::save_config(&config).await?;
        println!("Saved configuration for {}", config.endpoint);
    }

    let mut sync = connect(&config)?;

    match cli.command {
        Commands::Status => {
            sync.fetch().await?;
            let ws = sync.workspace();
            if let Some(snapshot) = ws.snapshot() {
                println!("Endpoint: {}", sync.authority().endpoint());
                println!(
                    "Firewall: {}",
                    if snapshot.enabled { "enabled" } else { "disabled" }
                );
                println!("Policy:   {}", snapshot.policy.display_name());
                println!(
                    "Rules:    {} ({} active)",
                    snapshot.rules.len(),
                    snapshot.active_rule_count()
                );
            }
        }
        Commands::Show => {
            sync.fetch().await?;
            refresh_interfaces(&mut sync).await;
            print_rules(&sync);
        }
        Commands::Export => {
            sync.fetch().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&sync.workspace().to_update())?
            );
        }
        Commands::Diff { file } => {
            stage_file(&mut sync, &file).await?;
            print_review(&sync);
        }
        Commands::Apply { file, yes } => {
            stage_file(&mut sync, &file).await?;
            print_review(&sync);
            let outcome = sync.request(Request::Apply).await?;
            finish(&mut sync, outcome, yes).await?;
        }
        Commands::Enable { apply, yes } => {
            match apply {
                Some(file) => {
                    stage_file(&mut sync, &file).await?;
                    print_review(&sync);
                }
                None => {
                    sync.fetch().await?;
                }
            }
            let outcome = sync.request(Request::Enable).await?;
            finish(&mut sync, outcome, yes).await?;
        }
        Commands::Disable => {
            sync.fetch().await?;
            let outcome = sync.request(Request::Disable).await?;
            finish(&mut sync, outcome, true).await?;
        }
        Commands::Explain(args) => {
            match &args.file {
                Some(file) => stage_file(&mut sync, file).await?,
                None => {
                    sync.fetch().await?;
                }
            }
            explain(&sync, &args)?;
        }
        Commands::Interfaces => {
            for iface in sync.refresh_interfaces().await? {
                println!("{:<16} {}", iface.name, iface.addr);
            }
        }
        Commands::Settings { set } => {
            let mut settings = sync.settings().await?;
            if !set.is_empty() {
                for assignment in &set {
                    let (name, value) = assignment
                        .split_once('=')
                        .ok_or_else(|| format!("Expected NAME=BOOL, got {assignment:?}"))?;
                    let value: bool = value
                        .trim()
                        .parse()
                        .map_err(|_| format!("Expected true or false for {name}"))?;
                    settings.set(name.trim(), value)?;
                }
                sync.update_settings(&settings).await?;
            }
            for (name, value) in settings.entries() {
                println!("{name:<18} {value}");
            }
        }
    }
    Ok(())
}

fn connect(config: &ConsoleConfig) -> Result<SyncController<HttpAuthority>, fwstage::Error> {
    let authority = HttpAuthority::new(config)?;
    let sync = SyncController::new(authority);
    if config.audit_log
        && let Ok(audit) = AuditLog::new()
    {
        return Ok(sync.with_audit(audit));
    }
    Ok(sync)
}

async fn refresh_interfaces(sync: &mut SyncController<HttpAuthority>) {
    if let Err(e) = sync.refresh_interfaces().await {
        tracing::warn!("Interface catalog unavailable: {e}");
        eprintln!("Warning: interface catalog unavailable, interface names not checked");
    }
}

/// Fetches the live ruleset and stages the content of `file` over it
async fn stage_file(sync: &mut SyncController<HttpAuthority>, file: &Path) -> CliResult {
    let json = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| format!("Cannot read {}: {e}", file.display()))?;
    let update: RulesetUpdate = serde_json::from_str(&json)?;

    sync.fetch().await?;
    refresh_interfaces(sync).await;
    sync.workspace_mut().import(update.rules, update.policy)?;
    Ok(())
}

fn print_rules(sync: &SyncController<HttpAuthority>) {
    let ws = sync.workspace();
    if ws.rules().is_empty() {
        println!("No rules.");
    }
    for (index, staged) in ws.rules().iter().enumerate() {
        println!("{:>4}  {}", index + 1, staged.rule());
        for issue in ws.issues_for(staged.id()) {
            println!("      ✗ {}: {}", issue.field, issue.message);
        }
    }
    println!("policy {}", ws.policy());
    for (index, hint) in ws.hints() {
        println!(
            "note: rule #{} ({}): {hint}",
            index + 1,
            utils::truncate_string(&ws.rules()[index].rule().name, 24)
        );
    }
}

fn print_review(sync: &SyncController<HttpAuthority>) {
    let ws = sync.workspace();
    match ws.render_diff() {
        Some(diff) => {
            println!("Changes ({}):", ws.diff().summary());
            print!("{diff}");
        }
        None => println!("No changes."),
    }
    for issue in ws.issues() {
        println!("✗ {issue}");
    }
}

/// Completes a gated request, asking when it needs confirmation
async fn finish(
    sync: &mut SyncController<HttpAuthority>,
    mut outcome: Outcome,
    assume_yes: bool,
) -> CliResult {
    // Confirming can ask again if the gate's answer changed in between
    while let Outcome::ConfirmationRequired { token, hazards, .. } = outcome {
        outcome = if assume_yes || ask_confirmation(&hazards)? {
            sync.confirm(token).await?
        } else {
            sync.decline(token)?
        };
    }

    match outcome {
        Outcome::Completed(plan) => {
            let enabled = sync.workspace().is_enabled();
            println!(
                "✓ Done ({plan:?}). Firewall is {}.",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        Outcome::Unchanged => println!("Nothing to apply."),
        Outcome::Declined => println!("Cancelled. Nothing was sent."),
        Outcome::ConfirmationRequired { .. } => {}
    }
    Ok(())
}

/// Lists the hazards and reads a single y/N keypress in raw mode
fn ask_confirmation(hazards: &[Hazard]) -> std::io::Result<bool> {
    use crossterm::event::{self, Event, KeyCode, KeyEventKind};

    println!("This change needs confirmation:");
    for hazard in hazards {
        println!("  ! {hazard}");
    }
    print!("Proceed? [y/N] ");
    std::io::stdout().flush()?;

    crossterm::terminal::enable_raw_mode()?;
    let answer = loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                break Ok(matches!(key.code, KeyCode::Char('y' | 'Y')));
            }
            Ok(_) => {}
            Err(e) => break Err(e),
        }
    };
    // Always restore terminal to normal mode
    let _ = crossterm::terminal::disable_raw_mode();
    println!();
    answer
}

fn explain(sync: &SyncController<HttpAuthority>, args: &ExplainArgs) -> CliResult {
    let transport = match args.proto.to_ascii_lowercase().as_str() {
        "tcp" => Transport::Tcp,
        "udp" => Transport::Udp,
        "other" | "icmp" => Transport::Other,
        other => return Err(format!("Unknown transport {other:?}").into()),
    };
    let destination_port = match (transport, args.dport) {
        (Transport::Other, port) => port.unwrap_or(0),
        (_, Some(port)) => port,
        (_, None) => return Err("--dport is required for tcp and udp".into()),
    };
    let packet = Packet {
        direction: args.direction,
        transport,
        source: args.src,
        destination: args.dst,
        source_port: args.sport,
        destination_port,
        in_interface: args.iif.clone(),
        out_interface: args.oif.clone(),
    };

    let ws = sync.workspace();
    match ws.explain(&packet) {
        Verdict::Rule { index, action } => println!(
            "{} by rule #{}: {}",
            action.display_name(),
            index + 1,
            ws.rules()[index].rule()
        ),
        Verdict::Policy(action) => {
            println!("{} by default policy (no rule matched)", action.display_name());
        }
    }
    Ok(())
}
