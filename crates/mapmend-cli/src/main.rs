//! Mapmend CLI
//!
//! Command-line front end for the correction consensus engine:
//! - `submit` a correction (or upvote the identical pending one)
//! - `vote` on a known proposal by id
//! - `list` proposals by target/status with pagination
//! - `show` one proposal in full
//!
//! State lives in `--data-dir` (ledger snapshot plus, when no SPARQL
//! endpoint is configured, an offline statement log).

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use mapmend_core::{ProposalStatus, VoteType};
use mapmend_engine::{
    ConsensusEngine, EngineConfig, GraphLog, GraphStore, HttpGraphStore, SubmitOutcome,
};
use mapmend_ledger::MemoryLedger;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "mapmend")]
#[command(author, version, about = "Crowdsourced POI correction consensus engine")]
struct Cli {
    /// Directory holding the ledger snapshot and the offline graph log
    #[arg(long, global = true, default_value = ".mapmend")]
    data_dir: PathBuf,

    /// SPARQL endpoint exposing `/update` and `/query`; when absent,
    /// statements are appended to `<data-dir>/graph.log`
    #[arg(long, global = true)]
    graph_endpoint: Option<String>,

    /// Upvotes required before a proposal auto-merges
    #[arg(long, global = true, default_value_t = 5)]
    threshold: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a correction for a POI, or upvote the identical pending one
    Submit {
        /// Acting user id
        #[arg(long)]
        user: String,
        /// Target POI id
        #[arg(long)]
        target: String,
        /// Proposed field as `name=value` (repeatable)
        #[arg(long = "field", required = true)]
        fields: Vec<String>,
        /// Client IP recorded with the vote
        #[arg(long)]
        ip: Option<String>,
    },

    /// Cast an explicit up/down vote on a proposal
    Vote {
        /// Proposal id
        proposal: Uuid,
        /// Acting user id
        #[arg(long)]
        user: String,
        #[arg(long, value_enum, default_value = "up")]
        vote: CliVote,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        ip: Option<String>,
    },

    /// List proposals (pending by default), newest first
    List {
        #[arg(long)]
        target: Option<String>,
        #[arg(long, value_enum)]
        status: Option<CliStatus>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Query the staging graph instead of the ledger (pending reports,
        /// newest first; needs `--graph-endpoint` to return rows)
        #[arg(long)]
        from_graph: bool,
    },

    /// Show one proposal in full
    Show {
        /// Proposal id
        proposal: Uuid,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliVote {
    Up,
    Down,
}

impl From<CliVote> for VoteType {
    fn from(v: CliVote) -> Self {
        match v {
            CliVote::Up => VoteType::Up,
            CliVote::Down => VoteType::Down,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStatus {
    Pending,
    Approved,
    Rejected,
}

impl From<CliStatus> for ProposalStatus {
    fn from(s: CliStatus) -> Self {
        match s {
            CliStatus::Pending => ProposalStatus::Pending,
            CliStatus::Approved => ProposalStatus::Approved,
            CliStatus::Rejected => ProposalStatus::Rejected,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let engine = build_engine(&cli)?;

    match cli.command {
        Commands::Submit {
            user,
            target,
            fields,
            ip,
        } => {
            let pairs = parse_field_args(&fields)?;
            let receipt = engine.submit_or_vote(&user, &target, pairs, ip.as_deref())?;
            print_submit(&receipt);
        }
        Commands::Vote {
            proposal,
            user,
            vote,
            comment,
            ip,
        } => {
            let receipt = engine.vote(&user, proposal, vote.into(), comment, ip.as_deref())?;
            println!(
                "{} {} ({}/{} votes)",
                "✓".green(),
                receipt.message,
                receipt.current_votes,
                receipt.required_votes
            );
        }
        Commands::List {
            target,
            status,
            page,
            limit,
            from_graph,
        } => {
            if from_graph {
                let rows = engine.list_staged_reports(target.as_deref())?;
                if rows.is_empty() {
                    println!("no staged reports");
                }
                for row in &rows {
                    let line = row
                        .iter()
                        .map(|(name, value)| format!("{}={value}", name.bold()))
                        .collect::<Vec<_>>()
                        .join("  ");
                    println!("{line}");
                }
                return Ok(());
            }
            let page_out = engine.list_pending(
                target.as_deref(),
                status.map(Into::into),
                page,
                limit,
            )?;
            if page_out.items.is_empty() {
                println!("no proposals match");
            }
            for p in &page_out.items {
                println!(
                    "{}  {}  {}  {}/{} votes  {}",
                    p.id.to_string().dimmed(),
                    p.target_id.bold(),
                    p.status,
                    p.upvotes,
                    p.threshold,
                    p.created_at.format("%Y-%m-%d %H:%M")
                );
            }
            println!(
                "{}",
                format!("page {page}, {} total", page_out.total).dimmed()
            );
        }
        Commands::Show { proposal } => {
            let row = engine.get_detail(proposal)?;
            println!("{}", serde_json::to_string_pretty(&row)?);
        }
    }
    Ok(())
}

fn build_engine(cli: &Cli) -> Result<ConsensusEngine> {
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("creating data dir {}", cli.data_dir.display()))?;

    let ledger = Arc::new(
        MemoryLedger::open(cli.data_dir.join("ledger.json")).context("opening ledger snapshot")?,
    );
    let graph: Arc<dyn GraphStore> = match &cli.graph_endpoint {
        Some(endpoint) => Arc::new(HttpGraphStore::new(endpoint)),
        None => Arc::new(GraphLog::new(cli.data_dir.join("graph.log"))),
    };
    let config = EngineConfig {
        approval_threshold: cli.threshold,
        ..Default::default()
    };
    Ok(ConsensusEngine::new(ledger, graph, config))
}

/// Parse repeated `--field name=value` arguments, typing each value per the
/// field vocabulary (flags as booleans, price levels as integers, the rest
/// as strings). Unknown names pass through as strings; the engine drops
/// them the same way it drops them for any other caller.
fn parse_field_args(args: &[String]) -> Result<Vec<(String, serde_json::Value)>> {
    use mapmend_core::{FieldKind, PoiField};

    args.iter()
        .map(|arg| {
            let (name, value) = arg
                .split_once('=')
                .ok_or_else(|| anyhow!("expected name=value, got '{arg}'"))?;
            let kind = PoiField::from_wire_name(name).map(PoiField::kind);
            let value = match kind {
                Some(FieldKind::Flag) => serde_json::Value::Bool(
                    value
                        .parse::<bool>()
                        .map_err(|_| anyhow!("field '{name}' expects true/false, got '{value}'"))?,
                ),
                Some(FieldKind::Number) => serde_json::json!(value
                    .parse::<i64>()
                    .map_err(|_| anyhow!("field '{name}' expects an integer, got '{value}'"))?),
                _ => serde_json::Value::String(value.to_string()),
            };
            Ok((name.to_string(), value))
        })
        .collect()
}

fn print_submit(receipt: &mapmend_engine::SubmitReceipt) {
    match receipt.outcome {
        SubmitOutcome::AlreadyVoted => {
            println!("{} {}", "!".yellow(), receipt.message);
        }
        SubmitOutcome::AutoMerged => {
            println!(
                "{} {} (proposal {})",
                "✓".green().bold(),
                receipt.message,
                receipt.proposal_id
            );
        }
        _ => {
            println!(
                "{} {} (proposal {}, {}/{} votes)",
                "✓".green(),
                receipt.message,
                receipt.proposal_id,
                receipt.current_votes,
                receipt.required_votes
            );
        }
    }
}
