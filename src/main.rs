// Command-line front end for the earnings corpus engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use earnings_corpus::config::EngineConfig;
use earnings_corpus::corpus::CorpusManager;
use earnings_corpus::domain::{PeriodKey, SpeakerRole};
use earnings_corpus::index::{builder, HashingEmbedder};
use earnings_corpus::ingest::topics::KeywordTagger;
use earnings_corpus::ingest::types::{AsrToken, CallMeta, DiarizationTurn, RosterEntry};
use earnings_corpus::ingest::{validate_media_file, IngestPipeline, IngestRequest};
use earnings_corpus::query::{QueryEngine, SearchFilters};

#[derive(Parser)]
#[command(
    name = "earnings-corpus",
    about = "Alignment, attribution and retrieval for earnings calls",
    version
)]
struct Cli {
    /// Path to the corpus database.
    #[arg(long, env = "EARNINGS_DB", default_value = "earnings.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one call from a JSON file of ASR tokens and diarization turns.
    Ingest {
        /// JSON file with call metadata, tokens, turns and optional roster.
        input: PathBuf,
        /// Replace an existing call for the same ticker, period and date.
        #[arg(long)]
        replace: bool,
        /// Source media file to validate before ingesting.
        #[arg(long)]
        media: Option<PathBuf>,
    },
    /// Resume a failed call from its last committed checkpoint.
    Resume { call_id: String },
    /// Search indexed statements.
    Search {
        query: String,
        #[arg(long = "ticker")]
        tickers: Vec<String>,
        /// Start of the period range, e.g. Q1-2023.
        #[arg(long)]
        from: Option<PeriodKey>,
        /// End of the period range, e.g. Q4-2023.
        #[arg(long)]
        to: Option<PeriodKey>,
        #[arg(long)]
        role: Option<SpeakerRole>,
        /// Participant identity key or display name.
        #[arg(long)]
        participant: Option<String>,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// Aggregate statements carrying a topic tag, by fiscal period.
    Topics {
        tag: String,
        #[arg(long = "ticker")]
        tickers: Vec<String>,
        #[arg(long)]
        from: Option<PeriodKey>,
        #[arg(long)]
        to: Option<PeriodKey>,
    },
    /// Show calls and role-level statement counts for a company.
    Status {
        ticker: String,
        /// Also scan the indexes for entries pointing at missing statements.
        #[arg(long)]
        verify: bool,
    },
}

/// On-disk ingest payload.
#[derive(Deserialize)]
struct IngestInput {
    meta: CallMeta,
    tokens: Vec<AsrToken>,
    turns: Vec<DiarizationTurn>,
    #[serde(default)]
    roster: Option<Vec<RosterEntry>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let corpus = Arc::new(CorpusManager::new(cli.db.clone())?);
    let embedder = Arc::new(HashingEmbedder::default());
    let config = EngineConfig::default();

    match cli.command {
        Command::Ingest {
            input,
            replace,
            media,
        } => {
            if let Some(media) = media {
                let info = validate_media_file(&media.to_string_lossy())?;
                log::info!("Validated media file: {}", info);
            }
            let payload = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let input: IngestInput =
                serde_json::from_str(&payload).context("Invalid ingest payload")?;

            let pipeline = IngestPipeline::new(
                corpus,
                embedder,
                Arc::new(KeywordTagger::default()),
                config,
            );
            let call_id = pipeline
                .ingest(IngestRequest {
                    meta: input.meta,
                    tokens: input.tokens,
                    turns: input.turns,
                    roster: input.roster,
                    replace,
                })
                .await?;
            println!("Indexed call {}", call_id);
        }
        Command::Resume { call_id } => {
            let pipeline = IngestPipeline::new(
                corpus,
                embedder,
                Arc::new(KeywordTagger::default()),
                config,
            );
            pipeline.resume(&call_id).await?;
            println!("Resumed call {}", call_id);
        }
        Command::Search {
            query,
            tickers,
            from,
            to,
            role,
            participant,
            top_k,
        } => {
            let filters = build_filters(tickers, from, to, role, participant)?;
            let engine = QueryEngine::new(corpus, embedder, config);
            let hits = engine.search(&query, &filters, top_k).await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Command::Topics {
            tag,
            tickers,
            from,
            to,
        } => {
            let filters = build_filters(tickers, from, to, None, None)?;
            let engine = QueryEngine::new(corpus, embedder, config);
            let summaries = engine.aggregate_topic(&tag, &filters)?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Command::Status { ticker, verify } => {
            let calls = corpus.list_calls_for_company(&ticker)?;
            if calls.is_empty() {
                println!("No calls for {}", ticker.to_uppercase());
                return Ok(());
            }
            for call in &calls {
                println!(
                    "{}  {}  status={} checkpoint={}",
                    call.id, call.call_date, call.status, call.checkpoint
                );
            }
            for count in corpus.role_counts(&ticker)? {
                println!("{}: {} statements", count.role, count.count);
            }
            if verify {
                corpus.with_connection(builder::verify_consistency)?;
                println!("Index consistency: ok");
            }
        }
    }

    Ok(())
}

fn build_filters(
    tickers: Vec<String>,
    from: Option<PeriodKey>,
    to: Option<PeriodKey>,
    role: Option<SpeakerRole>,
    participant: Option<String>,
) -> Result<SearchFilters> {
    let period_range = match (from, to) {
        (Some(from), Some(to)) => Some((from, to)),
        (Some(from), None) => Some((from, from)),
        (None, Some(to)) => Some((to, to)),
        (None, None) => None,
    };
    let filters = SearchFilters {
        tickers: if tickers.is_empty() {
            None
        } else {
            Some(tickers)
        },
        period_range,
        role,
        participant,
        call_ids: None,
    };
    filters.validate()?;
    Ok(filters)
}
