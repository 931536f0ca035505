// Ingestion pipeline: align -> attribute -> index, with per-call
// serialization and checkpointed resumption.
//
// Different calls may ingest in parallel; ingestion of the same call is
// serialized through a per-call async lock because replace atomicity
// depends on it. Every phase commits in its own transaction, and queries
// only ever see calls whose status is `indexed`, so readers never observe
// a half-built call.

use dashmap::DashMap;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::EngineConfig;
use crate::corpus::models::{Call, Participant, Statement, Turn};
use crate::corpus::{calls_repo, statements_repo, CorpusManager};
use crate::domain::{CallStatus, PeriodKey, SpeakerRole};
use crate::errors::{DuplicateCallError, IngestError};
use crate::index::{builder, embed_with_timeout, lexical, Embedder};
use crate::ingest::aligner::{self, AlignedTurn};
use crate::ingest::roster::{self, Assignment};
use crate::ingest::topics::TopicTagger;
use crate::ingest::types::{AsrToken, CallMeta, DiarizationTurn, RosterEntry};

/// Everything needed to ingest one call.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub meta: CallMeta,
    pub tokens: Vec<AsrToken>,
    pub turns: Vec<DiarizationTurn>,
    pub roster: Option<Vec<RosterEntry>>,
    /// Replace an existing call for the same (ticker, period, date) slot.
    pub replace: bool,
}

pub struct IngestPipeline {
    corpus: Arc<CorpusManager>,
    embedder: Arc<dyn Embedder>,
    tagger: Arc<dyn TopicTagger>,
    config: EngineConfig,
    call_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl IngestPipeline {
    pub fn new(
        corpus: Arc<CorpusManager>,
        embedder: Arc<dyn Embedder>,
        tagger: Arc<dyn TopicTagger>,
        config: EngineConfig,
    ) -> Self {
        Self {
            corpus,
            embedder,
            tagger,
            config,
            call_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, call_id: &str) -> Arc<AsyncMutex<()>> {
        self.call_locks
            .entry(call_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Ingest a call end to end. Returns the call id.
    pub async fn ingest(&self, request: IngestRequest) -> Result<String, IngestError> {
        let key = PeriodKey::new(request.meta.fiscal_year, request.meta.quarter);
        let call_id = Call::make_id(&request.meta.ticker, key, request.meta.call_date);

        let lock = self.lock_for(&call_id);
        let _guard = lock.lock().await;

        let existing = self
            .corpus
            .get_call(&call_id)
            .map_err(|e| storage("lookup", e))?;

        match existing {
            Some(old) if !request.replace => Err(DuplicateCallError {
                ticker: request.meta.ticker.to_uppercase(),
                period: key,
                call_date: request.meta.call_date.to_string(),
                existing_call_id: old.id,
            }
            .into()),
            Some(_) => self.replace_call(&call_id, key, request).await,
            None => self.ingest_fresh(&call_id, key, request).await,
        }
    }

    /// Phased ingestion of a new call. Each phase commits a checkpoint the
    /// pipeline can resume from after a failure.
    async fn ingest_fresh(
        &self,
        call_id: &str,
        key: PeriodKey,
        request: IngestRequest,
    ) -> Result<String, IngestError> {
        let roster_json = roster_to_json(request.roster.as_deref())?;

        self.corpus
            .with_connection(|conn| {
                let tx = conn.unchecked_transaction()?;
                let period_id = calls_repo::ensure_company_period(
                    &tx,
                    &request.meta.ticker,
                    &request.meta.company_name,
                    key,
                )?;
                calls_repo::insert_call(
                    &tx,
                    &Call {
                        id: call_id.to_string(),
                        period_id,
                        ticker: request.meta.ticker.to_uppercase(),
                        call_date: request.meta.call_date,
                        duration_secs: request.meta.duration_secs,
                        status: CallStatus::Pending,
                        checkpoint: CallStatus::Pending,
                    },
                    roster_json.as_deref(),
                )?;
                tx.commit()?;
                Ok(())
            })
            .map_err(|e| storage("create", e))?;

        // Phase 1: alignment. Malformed input marks the call failed and is
        // not retried automatically.
        let aligned = match aligner::align(&request.tokens, &request.turns, &self.config) {
            Ok(aligned) => aligned,
            Err(e) => {
                self.mark_failed(call_id, "alignment");
                return Err(e.into());
            }
        };

        let (participants, turns, statements) =
            self.build_graph(call_id, &aligned);

        self.corpus
            .with_connection(|conn| {
                let tx = conn.unchecked_transaction()?;
                statements_repo::insert_participants(&tx, &participants)?;
                statements_repo::insert_turns(&tx, &turns)?;
                statements_repo::insert_statements(&tx, &statements)?;
                calls_repo::set_call_status(&tx, call_id, CallStatus::Aligned)?;
                tx.commit()?;
                Ok(())
            })
            .map_err(|e| storage("alignment", e))?;

        // Phase 2: attribution.
        let assignments = roster::match_speakers(&aligned, request.roster.as_deref(), &self.config);
        self.commit_attribution(call_id, &request.meta.ticker, &participants, &assignments)?;

        // Phase 3: indexing.
        self.index_statements(call_id, &request.meta.ticker, &statements)
            .await?;

        info!("Ingested call {} ({} statements)", call_id, statements.len());
        Ok(call_id.to_string())
    }

    /// Atomic replacement: the new call is fully aligned, attributed and
    /// embedded before a single transaction swaps it in. Any failure leaves
    /// the old call intact and visible.
    async fn replace_call(
        &self,
        call_id: &str,
        key: PeriodKey,
        request: IngestRequest,
    ) -> Result<String, IngestError> {
        let aligned = aligner::align(&request.tokens, &request.turns, &self.config)?;
        let assignments = roster::match_speakers(&aligned, request.roster.as_deref(), &self.config);
        let (mut participants, turns, statements) =
            self.build_graph(call_id, &aligned);
        apply_assignments(&mut participants, &assignments, &request.meta.ticker, &self.config);

        let mut vectors = Vec::with_capacity(statements.len());
        for statement in &statements {
            let vector = embed_with_timeout(
                self.embedder.as_ref(),
                &statement.text,
                Duration::from_secs(self.config.embedding_timeout_secs),
            )
            .await?;
            vectors.push(vector);
        }

        let roster_json = roster_to_json(request.roster.as_deref())?;
        let ticker = request.meta.ticker.clone();

        self.corpus
            .with_connection(|conn| {
                let tx = conn.unchecked_transaction()?;

                calls_repo::delete_call_impl(&tx, call_id)?;

                let period_id = calls_repo::ensure_company_period(
                    &tx,
                    &request.meta.ticker,
                    &request.meta.company_name,
                    key,
                )?;
                calls_repo::insert_call(
                    &tx,
                    &Call {
                        id: call_id.to_string(),
                        period_id,
                        ticker: ticker.to_uppercase(),
                        call_date: request.meta.call_date,
                        duration_secs: request.meta.duration_secs,
                        status: CallStatus::Pending,
                        checkpoint: CallStatus::Pending,
                    },
                    roster_json.as_deref(),
                )?;
                statements_repo::insert_participants(&tx, &participants)?;
                statements_repo::insert_turns(&tx, &turns)?;
                statements_repo::insert_statements(&tx, &statements)?;
                for (statement, vector) in statements.iter().zip(&vectors) {
                    builder::add_statement(&tx, statement, vector)?;
                }
                calls_repo::set_call_status(&tx, call_id, CallStatus::Indexed)?;
                calls_repo::recompute_role_counts(&tx, &ticker)?;

                tx.commit()?;
                Ok(())
            })
            .map_err(|e| storage("replace", e))?;

        info!("Replaced call {} ({} statements)", call_id, statements.len());
        Ok(call_id.to_string())
    }

    /// Resume a failed (or interrupted) ingestion from its last committed
    /// checkpoint rather than from raw tokens.
    pub async fn resume(&self, call_id: &str) -> Result<(), IngestError> {
        let lock = self.lock_for(call_id);
        let _guard = lock.lock().await;

        let call = self
            .corpus
            .get_call(call_id)
            .map_err(|e| storage("lookup", e))?
            .ok_or_else(|| IngestError::CannotResume {
                call_id: call_id.to_string(),
                reason: "call does not exist".to_string(),
            })?;

        if call.status == CallStatus::Indexed {
            return Ok(());
        }

        match call.checkpoint {
            CallStatus::Aligned => {
                let participants = self
                    .corpus
                    .get_participants_for_call(call_id)
                    .map_err(|e| storage("resume", e))?;
                let aligned = self
                    .reconstruct_aligned(call_id, &participants)
                    .map_err(|e| storage("resume", e))?;
                let roster = self.stored_roster(call_id)?;
                let assignments =
                    roster::match_speakers(&aligned, roster.as_deref(), &self.config);
                self.commit_attribution(call_id, &call.ticker, &participants, &assignments)?;

                let statements = self
                    .corpus
                    .get_statements_for_call(call_id)
                    .map_err(|e| storage("resume", e))?;
                self.index_statements(call_id, &call.ticker, &statements).await
            }
            CallStatus::Attributed => {
                let statements = self
                    .corpus
                    .get_statements_for_call(call_id)
                    .map_err(|e| storage("resume", e))?;
                self.index_statements(call_id, &call.ticker, &statements).await
            }
            _ => Err(IngestError::CannotResume {
                call_id: call_id.to_string(),
                reason: format!(
                    "no resumable checkpoint (checkpoint: {})",
                    call.checkpoint
                ),
            }),
        }
    }

    /// Build deterministic participant / turn / statement rows from the
    /// alignment output. Participants start unknown; attribution confirms
    /// them in the next phase.
    fn build_graph(
        &self,
        call_id: &str,
        aligned: &[AlignedTurn],
    ) -> (Vec<Participant>, Vec<Turn>, Vec<Statement>) {
        let mut participants: Vec<Participant> = Vec::new();
        let mut turns = Vec::new();
        let mut statements = Vec::new();
        let mut statement_seq: i64 = 0;

        for (turn_seq, aligned_turn) in aligned.iter().enumerate() {
            let participant_id = match participants
                .iter()
                .find(|p| p.speaker_label == aligned_turn.speaker_label)
            {
                Some(p) => p.id.clone(),
                None => {
                    let id = Participant::make_id(call_id, participants.len());
                    participants.push(Participant {
                        id: id.clone(),
                        call_id: call_id.to_string(),
                        speaker_label: aligned_turn.speaker_label.clone(),
                        display_name: format!("Speaker {}", participants.len() + 1),
                        role: SpeakerRole::Unknown,
                        confidence: 0.0,
                        identity_key: None,
                    });
                    id
                }
            };

            let turn_id = Turn::make_id(call_id, turn_seq as i64);
            turns.push(Turn {
                id: turn_id.clone(),
                call_id: call_id.to_string(),
                participant_id,
                seq: turn_seq as i64,
                start_s: aligned_turn.start,
                end_s: aligned_turn.end,
            });

            for (local_seq, s) in aligned_turn.statements.iter().enumerate() {
                statements.push(Statement {
                    id: Statement::make_id(&turn_id, local_seq as i64),
                    turn_id: turn_id.clone(),
                    call_id: call_id.to_string(),
                    seq: statement_seq,
                    start_s: s.start,
                    end_s: s.end,
                    text: s.text.clone(),
                    normalized_text: lexical::normalize(&s.text),
                    topic_tags: self.tagger.tags(&s.text),
                });
                statement_seq += 1;
            }
        }

        (participants, turns, statements)
    }

    /// Persist attribution results and advance to the attributed checkpoint.
    fn commit_attribution(
        &self,
        call_id: &str,
        ticker: &str,
        participants: &[Participant],
        assignments: &[(String, Assignment)],
    ) -> Result<(), IngestError> {
        let threshold = self.config.roster_confidence_threshold;
        let config = &self.config;

        self.corpus
            .with_connection(|conn| {
                let tx = conn.unchecked_transaction()?;
                for (label, assignment) in assignments {
                    let Some(participant) =
                        participants.iter().find(|p| &p.speaker_label == label)
                    else {
                        continue;
                    };
                    let identity_key =
                        identity_key_for(assignment, ticker, config);
                    statements_repo::confirm_participant(
                        &tx,
                        &participant.id,
                        &assignment.display_name,
                        assignment.role,
                        assignment.confidence,
                        identity_key.as_deref(),
                        threshold,
                    )?;
                }
                calls_repo::set_call_status(&tx, call_id, CallStatus::Attributed)?;
                tx.commit()?;
                Ok(())
            })
            .map_err(|e| storage("attribution", e))
    }

    /// Embed and index every statement, then commit the indexed state and
    /// refreshed aggregates in one transaction. Embedding failures mark the
    /// call failed but keep the attributed checkpoint for retry.
    async fn index_statements(
        &self,
        call_id: &str,
        ticker: &str,
        statements: &[Statement],
    ) -> Result<(), IngestError> {
        let timeout = Duration::from_secs(self.config.embedding_timeout_secs);

        let mut vectors = Vec::with_capacity(statements.len());
        for statement in statements {
            match embed_with_timeout(self.embedder.as_ref(), &statement.text, timeout).await {
                Ok(vector) => vectors.push(vector),
                Err(e) => {
                    self.mark_failed(call_id, "indexing");
                    return Err(e.into());
                }
            }
        }

        self.corpus
            .with_connection(|conn| {
                let tx = conn.unchecked_transaction()?;
                for (statement, vector) in statements.iter().zip(&vectors) {
                    builder::add_statement(&tx, statement, vector)?;
                }
                calls_repo::set_call_status(&tx, call_id, CallStatus::Indexed)?;
                calls_repo::recompute_role_counts(&tx, ticker)?;
                tx.commit()?;
                Ok(())
            })
            .map_err(|e| storage("indexing", e))
    }

    /// Rebuild the aligner's view of a call from persisted rows, for
    /// resumption of the attribution phase.
    fn reconstruct_aligned(
        &self,
        call_id: &str,
        participants: &[Participant],
    ) -> anyhow::Result<Vec<AlignedTurn>> {
        let turns = self.corpus.get_turns_for_call(call_id)?;
        let statements = self.corpus.get_statements_for_call(call_id)?;

        Ok(turns
            .iter()
            .map(|turn| {
                let speaker_label = participants
                    .iter()
                    .find(|p| p.id == turn.participant_id)
                    .map(|p| p.speaker_label.clone())
                    .unwrap_or_default();
                AlignedTurn {
                    speaker_label,
                    start: turn.start_s,
                    end: turn.end_s,
                    statements: statements
                        .iter()
                        .filter(|s| s.turn_id == turn.id)
                        .map(|s| crate::ingest::aligner::AlignedStatement {
                            start: s.start_s,
                            end: s.end_s,
                            text: s.text.clone(),
                        })
                        .collect(),
                }
            })
            .collect())
    }

    fn stored_roster(&self, call_id: &str) -> Result<Option<Vec<RosterEntry>>, IngestError> {
        let json = self
            .corpus
            .with_connection(|conn| calls_repo::get_call_roster_json(conn, call_id))
            .map_err(|e| storage("resume", e))?;

        json.map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(|e| storage("resume", anyhow::anyhow!("invalid stored roster: {}", e)))
    }

    /// Best-effort failure marker; the original error is what propagates.
    fn mark_failed(&self, call_id: &str, phase: &str) {
        warn!("Marking call {} failed during {}", call_id, phase);
        let result = self.corpus.with_connection(|conn| {
            calls_repo::set_call_status(conn, call_id, CallStatus::Failed)
        });
        if let Err(e) = result {
            warn!("Could not mark call {} failed: {}", call_id, e);
        }
    }
}

/// In-memory version of participant confirmation, used by the replace path
/// where rows are built fully before any write.
fn apply_assignments(
    participants: &mut [Participant],
    assignments: &[(String, Assignment)],
    ticker: &str,
    config: &EngineConfig,
) {
    for (label, assignment) in assignments {
        if let Some(p) = participants.iter_mut().find(|p| &p.speaker_label == label) {
            p.display_name = assignment.display_name.clone();
            p.role = assignment.role;
            p.confidence = assignment.confidence;
            p.identity_key = identity_key_for(assignment, ticker, config);
        }
    }
}

/// Cross-call identity key for a resolved participant. Synthetic and
/// below-threshold identities carry no key.
fn identity_key_for(
    assignment: &Assignment,
    ticker: &str,
    config: &EngineConfig,
) -> Option<String> {
    if assignment.confidence < config.roster_confidence_threshold {
        return None;
    }
    if assignment.display_name.starts_with("Speaker ")
        || assignment.display_name.starts_with("Unidentified ")
    {
        return None;
    }
    Some(Participant::make_identity_key(
        &roster::normalize_name(&assignment.display_name),
        ticker,
    ))
}

fn roster_to_json(roster: Option<&[RosterEntry]>) -> Result<Option<String>, IngestError> {
    roster
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| storage("create", anyhow::anyhow!("failed to serialize roster: {}", e)))
}

fn storage(phase: &'static str, source: anyhow::Error) -> IngestError {
    IngestError::Storage { phase, source }
}
