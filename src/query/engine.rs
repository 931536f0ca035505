// Read-only search over the indexed corpus: filtered candidates, hybrid
// lexical/semantic scoring, near-duplicate folding, topic aggregation.
//
// Only calls with status 'indexed' are visible here, so queries never see
// a partially ingested call.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::corpus::CorpusManager;
use crate::domain::{PeriodKey, Quarter, SpeakerRole};
use crate::errors::{EmptyCorpusError, InvalidFilterError, QueryError};
use crate::index::builder;
use crate::index::embedder::{cosine_similarity, embed_with_timeout, Embedder};
use crate::index::lexical;

use super::filters::SearchFilters;

/// One ranked statement returned from a search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub statement_id: String,
    pub call_id: String,
    pub ticker: String,
    pub period: PeriodKey,
    pub call_date: NaiveDate,
    pub participant: String,
    pub role: SpeakerRole,
    pub start_s: f64,
    pub end_s: f64,
    pub text: String,
    /// Ranking score. When near-duplicates were folded into this hit, this
    /// is the best score in the folded group, so the group keeps the rank
    /// its strongest member earned.
    pub score: f64,
    pub lexical_score: f64,
    pub semantic_score: f64,
    /// Near-duplicate statements by the same participant that were folded
    /// into this hit, most recent first.
    pub also_said_in: Vec<DuplicateRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateRef {
    pub statement_id: String,
    pub call_id: String,
    pub call_date: NaiveDate,
}

/// Per-period rollup of statements carrying one topic tag.
#[derive(Debug, Clone, Serialize)]
pub struct TopicPeriodSummary {
    pub ticker: String,
    pub period: PeriodKey,
    pub statement_count: usize,
    /// Representative statements, most recent call first.
    pub samples: Vec<TopicSample>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicSample {
    pub statement_id: String,
    pub call_id: String,
    pub call_date: NaiveDate,
    pub text: String,
}

pub struct QueryEngine {
    corpus: Arc<CorpusManager>,
    embedder: Arc<dyn Embedder>,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(corpus: Arc<CorpusManager>, embedder: Arc<dyn Embedder>, config: EngineConfig) -> Self {
        Self {
            corpus,
            embedder,
            config,
        }
    }

    /// Ranked hybrid search over indexed statements.
    ///
    /// Filters restrict the candidate set before any scoring; candidates are
    /// then scored as a weighted blend of lexical term overlap and cosine
    /// similarity of embeddings. Near-duplicates by the same participant are
    /// folded before the top-k cut, so a shorter k is always a prefix of a
    /// longer one.
    pub async fn search(
        &self,
        query_text: &str,
        filters: &SearchFilters,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, QueryError> {
        filters.validate()?;
        if top_k == 0 {
            return Err(InvalidFilterError::ZeroTopK.into());
        }

        let query_tokens = lexical::tokenize(query_text);

        // One connection access: candidate rows, posting matches, vectors.
        let (candidates, matched_tokens, vectors) = self.corpus.with_connection(|conn| {
            if count_matching_calls(conn, filters)? == 0 {
                return Ok(None);
            }
            let candidates = fetch_candidates(conn, filters)?;

            let mut matched_tokens: HashMap<String, usize> = HashMap::new();
            for token in &query_tokens {
                for statement_id in builder::statement_ids_for_token(conn, token)? {
                    *matched_tokens.entry(statement_id).or_insert(0) += 1;
                }
            }

            let mut vectors = HashMap::new();
            for candidate in &candidates {
                if let Some(vector) = builder::get_vector(conn, &candidate.statement_id)? {
                    vectors.insert(candidate.statement_id.clone(), vector);
                }
            }
            Ok(Some((candidates, matched_tokens, vectors)))
        })?
        .ok_or(EmptyCorpusError)?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = embed_with_timeout(
            self.embedder.as_ref(),
            query_text,
            Duration::from_secs(self.config.embedding_timeout_secs),
        )
        .await?;

        let scored = self.score_candidates(&candidates, &query_tokens, &matched_tokens, &vectors, &query_vector);

        let mut ranked: Vec<usize> = (0..candidates.len()).collect();
        ranked.sort_by(|&a, &b| {
            scored[b]
                .score
                .partial_cmp(&scored[a].score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| candidates[b].call_date.cmp(&candidates[a].call_date))
                .then_with(|| candidates[a].statement_id.cmp(&candidates[b].statement_id))
        });

        let clusters = self.fold_duplicates(&candidates, &ranked);

        let mut hits: Vec<SearchHit> = clusters
            .into_iter()
            .map(|cluster| self.cluster_to_hit(&candidates, &scored, cluster))
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.call_date.cmp(&a.call_date))
                .then_with(|| a.statement_id.cmp(&b.statement_id))
        });
        hits.truncate(top_k);

        log::debug!(
            "Search for {:?} returned {} hits from {} candidates",
            query_text,
            hits.len(),
            candidates.len()
        );
        Ok(hits)
    }

    /// Count and sample statements tagged with `tag`, grouped by fiscal
    /// period, for trend views like "guidance mentions per quarter".
    pub fn aggregate_topic(
        &self,
        tag: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<TopicPeriodSummary>, QueryError> {
        filters.validate()?;

        let candidates = self
            .corpus
            .with_connection(|conn| {
                if count_matching_calls(conn, filters)? == 0 {
                    return Ok(None);
                }
                Ok(Some(fetch_candidates(conn, filters)?))
            })?
            .ok_or(EmptyCorpusError)?;

        let mut groups: HashMap<(String, PeriodKey), Vec<&Candidate>> = HashMap::new();
        for candidate in &candidates {
            if candidate.topic_tags.iter().any(|t| t == tag) {
                groups
                    .entry((candidate.ticker.clone(), candidate.period))
                    .or_default()
                    .push(candidate);
            }
        }

        let mut summaries: Vec<TopicPeriodSummary> = groups
            .into_iter()
            .map(|((ticker, period), mut members)| {
                members.sort_by(|a, b| {
                    b.call_date
                        .cmp(&a.call_date)
                        .then_with(|| a.seq.cmp(&b.seq))
                        .then_with(|| a.statement_id.cmp(&b.statement_id))
                });
                let samples = members
                    .iter()
                    .take(self.config.topic_samples_per_period)
                    .map(|c| TopicSample {
                        statement_id: c.statement_id.clone(),
                        call_id: c.call_id.clone(),
                        call_date: c.call_date,
                        text: c.text.clone(),
                    })
                    .collect();
                TopicPeriodSummary {
                    ticker,
                    period,
                    statement_count: members.len(),
                    samples,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.ticker.cmp(&b.ticker).then_with(|| a.period.cmp(&b.period)));
        Ok(summaries)
    }

    fn score_candidates(
        &self,
        candidates: &[Candidate],
        query_tokens: &[String],
        matched_tokens: &HashMap<String, usize>,
        vectors: &HashMap<String, Vec<f32>>,
        query_vector: &[f32],
    ) -> Vec<Scored> {
        let weight_total = self.config.lexical_weight + self.config.semantic_weight;
        candidates
            .iter()
            .map(|candidate| {
                let lexical_score = if query_tokens.is_empty() {
                    0.0
                } else {
                    let matched = matched_tokens.get(&candidate.statement_id).copied().unwrap_or(0);
                    matched as f64 / query_tokens.len() as f64
                };
                let semantic_score = match vectors.get(&candidate.statement_id) {
                    Some(vector) => cosine_similarity(query_vector, vector) as f64,
                    None => {
                        log::warn!("Statement {} has no stored vector", candidate.statement_id);
                        0.0
                    }
                };
                let score = if weight_total > 0.0 {
                    (self.config.lexical_weight * lexical_score
                        + self.config.semantic_weight * semantic_score)
                        / weight_total
                } else {
                    0.0
                };
                Scored {
                    lexical_score,
                    semantic_score,
                    score,
                }
            })
            .collect()
    }

    /// Group near-duplicate statements by the same participant identity.
    /// Candidates are visited in rank order and compared against each
    /// group's seed, so grouping does not depend on the requested k.
    fn fold_duplicates(&self, candidates: &[Candidate], ranked: &[usize]) -> Vec<Vec<usize>> {
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        'next: for &i in ranked {
            for cluster in clusters.iter_mut() {
                let seed = cluster[0];
                if same_identity(&candidates[i], &candidates[seed])
                    && lexical::token_set_similarity(
                        &candidates[i].normalized_text,
                        &candidates[seed].normalized_text,
                    ) >= self.config.dedup_similarity_threshold
                {
                    cluster.push(i);
                    continue 'next;
                }
            }
            clusters.push(vec![i]);
        }
        clusters
    }

    fn cluster_to_hit(&self, candidates: &[Candidate], scored: &[Scored], cluster: Vec<usize>) -> SearchHit {
        // Best score in the cluster; members were pushed in rank order.
        let best_score = scored[cluster[0]].score;

        // The most recent utterance represents the group.
        let rep = *cluster
            .iter()
            .max_by(|&&a, &&b| {
                candidates[a]
                    .call_date
                    .cmp(&candidates[b].call_date)
                    .then_with(|| candidates[b].statement_id.cmp(&candidates[a].statement_id))
            })
            .unwrap_or(&cluster[0]);

        let mut also_said_in: Vec<DuplicateRef> = cluster
            .iter()
            .filter(|&&i| i != rep)
            .map(|&i| DuplicateRef {
                statement_id: candidates[i].statement_id.clone(),
                call_id: candidates[i].call_id.clone(),
                call_date: candidates[i].call_date,
            })
            .collect();
        also_said_in.sort_by(|a, b| {
            b.call_date
                .cmp(&a.call_date)
                .then_with(|| a.statement_id.cmp(&b.statement_id))
        });

        let c = &candidates[rep];
        SearchHit {
            statement_id: c.statement_id.clone(),
            call_id: c.call_id.clone(),
            ticker: c.ticker.clone(),
            period: c.period,
            call_date: c.call_date,
            participant: c.participant.clone(),
            role: c.role,
            start_s: c.start_s,
            end_s: c.end_s,
            text: c.text.clone(),
            score: best_score,
            lexical_score: scored[rep].lexical_score,
            semantic_score: scored[rep].semantic_score,
            also_said_in,
        }
    }
}

fn same_identity(a: &Candidate, b: &Candidate) -> bool {
    match (&a.identity_key, &b.identity_key) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

struct Scored {
    lexical_score: f64,
    semantic_score: f64,
    score: f64,
}

struct Candidate {
    statement_id: String,
    call_id: String,
    seq: i64,
    start_s: f64,
    end_s: f64,
    text: String,
    normalized_text: String,
    topic_tags: Vec<String>,
    participant: String,
    role: SpeakerRole,
    identity_key: Option<String>,
    ticker: String,
    period: PeriodKey,
    call_date: NaiveDate,
}

/// Builds the shared WHERE clauses for the metadata filters. Call-level
/// clauses only when `call_level_only` (used by the empty-corpus check;
/// role and participant narrow statements, not calls).
fn filter_clauses(
    filters: &SearchFilters,
    call_level_only: bool,
) -> (Vec<String>, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut clauses: Vec<String> = vec!["c.status = 'indexed'".to_string()];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(tickers) = &filters.tickers {
        let placeholders = vec!["?"; tickers.len()].join(", ");
        clauses.push(format!("p.ticker IN ({})", placeholders));
        for ticker in tickers {
            params.push(Box::new(ticker.to_uppercase()));
        }
    }
    if let Some((start, end)) = filters.period_range {
        clauses.push("(p.fiscal_year * 4 + p.quarter) BETWEEN ? AND ?".to_string());
        params.push(Box::new(period_scalar(start)));
        params.push(Box::new(period_scalar(end)));
    }
    if let Some(call_ids) = &filters.call_ids {
        let placeholders = vec!["?"; call_ids.len()].join(", ");
        clauses.push(format!("c.id IN ({})", placeholders));
        for call_id in call_ids {
            params.push(Box::new(call_id.clone()));
        }
    }
    if !call_level_only {
        if let Some(role) = filters.role {
            clauses.push("pa.role = ?".to_string());
            params.push(Box::new(role.as_str()));
        }
        if let Some(participant) = &filters.participant {
            clauses.push("(pa.identity_key = ? OR pa.display_name = ?)".to_string());
            params.push(Box::new(participant.clone()));
            params.push(Box::new(participant.clone()));
        }
    }

    (clauses, params)
}

fn period_scalar(key: PeriodKey) -> i64 {
    key.year as i64 * 4 + key.quarter.as_number() as i64
}

fn count_matching_calls(conn: &Connection, filters: &SearchFilters) -> Result<i64> {
    let (clauses, params) = filter_clauses(filters, true);
    let sql = format!(
        "SELECT COUNT(*) FROM calls c JOIN periods p ON c.period_id = p.id WHERE {}",
        clauses.join(" AND ")
    );
    conn.query_row(
        &sql,
        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
        |row| row.get(0),
    )
    .context("Failed to count matching calls")
}

fn fetch_candidates(conn: &Connection, filters: &SearchFilters) -> Result<Vec<Candidate>> {
    let (clauses, params) = filter_clauses(filters, false);
    let sql = format!(
        r#"
        SELECT s.id, s.call_id, s.seq, s.start_s, s.end_s, s.text, s.normalized_text,
               s.topic_tags, pa.display_name, pa.role, pa.identity_key,
               p.ticker, p.fiscal_year, p.quarter, c.call_date
        FROM statements s
        JOIN turns t ON s.turn_id = t.id
        JOIN participants pa ON t.participant_id = pa.id
        JOIN calls c ON s.call_id = c.id
        JOIN periods p ON c.period_id = p.id
        WHERE {}
        ORDER BY c.call_date DESC, s.id ASC
        "#,
        clauses.join(" AND ")
    );

    let mut stmt = conn
        .prepare(&sql)
        .context("Failed to prepare candidate query")?;
    let rows = stmt
        .query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            raw_candidate_row,
        )
        .context("Failed to query candidates")?;

    let mut candidates = Vec::new();
    for row in rows {
        candidates.push(candidate_from_raw(row.context("Failed to read candidate row")?)?);
    }
    Ok(candidates)
}

type RawCandidate = (
    String,
    String,
    i64,
    f64,
    f64,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    i64,
    i64,
    String,
);

fn raw_candidate_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCandidate> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
    ))
}

fn candidate_from_raw(raw: RawCandidate) -> Result<Candidate> {
    let (
        statement_id,
        call_id,
        seq,
        start_s,
        end_s,
        text,
        normalized_text,
        topic_tags,
        participant,
        role,
        identity_key,
        ticker,
        fiscal_year,
        quarter,
        call_date,
    ) = raw;
    let quarter = Quarter::from_number(quarter as u8)
        .ok_or_else(|| anyhow!("Invalid quarter in database: {}", quarter))?;
    Ok(Candidate {
        statement_id,
        call_id,
        seq,
        start_s,
        end_s,
        text,
        normalized_text,
        topic_tags: serde_json::from_str(&topic_tags)
            .context("Invalid topic_tags JSON in database")?,
        participant,
        role: SpeakerRole::from_str(&role).map_err(|e| anyhow!(e))?,
        identity_key,
        ticker,
        period: PeriodKey::new(fiscal_year as u16, quarter),
        call_date: NaiveDate::parse_from_str(&call_date, "%Y-%m-%d")
            .with_context(|| format!("Invalid call_date in database: {}", call_date))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Quarter;
    use crate::index::HashingEmbedder;
    use crate::ingest::topics::KeywordTagger;
    use crate::ingest::types::{AsrToken, CallMeta, DiarizationTurn};
    use crate::ingest::IngestPipeline;
    use crate::ingest::IngestRequest;
    use tempfile::tempdir;

    fn words(text: &str, start: f64) -> Vec<AsrToken> {
        text.split_whitespace()
            .enumerate()
            .map(|(i, w)| AsrToken {
                text: w.to_string(),
                start: start + i as f64 * 0.5,
                end: start + i as f64 * 0.5 + 0.4,
            })
            .collect()
    }

    /// Two-speaker call: operator opening, then a named CFO remark.
    fn call_request(
        ticker: &str,
        year: u16,
        quarter: Quarter,
        date: &str,
        remark: &str,
    ) -> IngestRequest {
        let mut tokens = words("Welcome to the conference call.", 0.0);
        let remark_text = format!("This is Jane Smith, Chief Financial Officer. {}", remark);
        tokens.extend(words(&remark_text, 21.0));
        let turns = vec![
            DiarizationTurn {
                speaker_label: "spk_0".to_string(),
                start: 0.0,
                end: 20.0,
            },
            DiarizationTurn {
                speaker_label: "spk_1".to_string(),
                start: 21.0,
                end: 80.0,
            },
        ];
        IngestRequest {
            meta: CallMeta {
                ticker: ticker.to_string(),
                company_name: format!("{} Corp", ticker),
                fiscal_year: year,
                quarter,
                call_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                duration_secs: 80.0,
            },
            tokens,
            turns,
            roster: None,
            replace: false,
        }
    }

    async fn seeded_engine() -> (QueryEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let corpus = Arc::new(CorpusManager::new(dir.path().join("test.db")).unwrap());
        let embedder = Arc::new(HashingEmbedder::default());
        let pipeline = IngestPipeline::new(
            corpus.clone(),
            embedder.clone(),
            Arc::new(KeywordTagger::default()),
            EngineConfig::default(),
        );

        let requests = vec![
            call_request(
                "ACME",
                2023,
                Quarter::Q1,
                "2023-02-01",
                "We expect margins to improve next quarter. Full year guidance is unchanged.",
            ),
            call_request(
                "ACME",
                2023,
                Quarter::Q2,
                "2023-05-01",
                "We expect margins to improve next quarter. We are raising full year guidance.",
            ),
            call_request(
                "ACME",
                2023,
                Quarter::Q3,
                "2023-08-01",
                "Revenue grew nicely. Guidance for the full year moves higher again.",
            ),
            call_request(
                "BETA",
                2023,
                Quarter::Q1,
                "2023-02-15",
                "Headcount was flat and hiring remains paused.",
            ),
        ];
        for request in requests {
            pipeline.ingest(request).await.unwrap();
        }

        let engine = QueryEngine::new(corpus, embedder, EngineConfig::default());
        (engine, dir)
    }

    #[tokio::test]
    async fn test_search_respects_ticker_filter() {
        let (engine, _dir) = seeded_engine().await;
        let filters = SearchFilters {
            tickers: Some(vec!["ACME".to_string()]),
            ..Default::default()
        };

        let hits = engine.search("full year guidance", &filters, 10).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.ticker == "ACME"));
        // Hits come back sorted by score.
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_search_with_period_range_and_top_k() {
        let (engine, _dir) = seeded_engine().await;
        let filters = SearchFilters {
            tickers: Some(vec!["ACME".to_string()]),
            period_range: Some((
                PeriodKey::new(2023, Quarter::Q1),
                PeriodKey::new(2023, Quarter::Q4),
            )),
            ..Default::default()
        };

        let hits = engine.search("guidance", &filters, 5).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.len() <= 5);
        for hit in &hits {
            assert_eq!(hit.ticker, "ACME");
            assert!(hit.period >= PeriodKey::new(2023, Quarter::Q1));
            assert!(hit.period <= PeriodKey::new(2023, Quarter::Q4));
        }
    }

    #[tokio::test]
    async fn test_search_empty_corpus_for_unknown_ticker() {
        let (engine, _dir) = seeded_engine().await;
        let filters = SearchFilters {
            tickers: Some(vec!["ZZZZ".to_string()]),
            ..Default::default()
        };

        let err = engine.search("guidance", &filters, 10).await.unwrap_err();
        assert!(matches!(err, QueryError::EmptyCorpus(_)));
    }

    #[tokio::test]
    async fn test_search_rejects_zero_top_k() {
        let (engine, _dir) = seeded_engine().await;
        let err = engine
            .search("guidance", &SearchFilters::default(), 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidFilter(InvalidFilterError::ZeroTopK)
        ));
    }

    #[tokio::test]
    async fn test_duplicates_fold_onto_most_recent_call() {
        let (engine, _dir) = seeded_engine().await;
        let filters = SearchFilters {
            tickers: Some(vec!["ACME".to_string()]),
            ..Default::default()
        };

        // "We expect margins to improve next quarter." appears verbatim in
        // Q1 and Q2; the Q2 utterance should represent the pair.
        let hits = engine
            .search("expect margins to improve", &filters, 10)
            .await
            .unwrap();
        let margin_hits: Vec<_> = hits
            .iter()
            .filter(|h| h.text.contains("margins to improve"))
            .collect();
        assert_eq!(margin_hits.len(), 1);

        let hit = margin_hits[0];
        assert_eq!(hit.call_date, NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());
        assert_eq!(hit.also_said_in.len(), 1);
        assert_eq!(
            hit.also_said_in[0].call_date,
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()
        );
    }

    #[tokio::test]
    async fn test_top_k_prefix_is_stable() {
        let (engine, _dir) = seeded_engine().await;
        let filters = SearchFilters::default();

        let short = engine.search("full year guidance", &filters, 2).await.unwrap();
        let long = engine.search("full year guidance", &filters, 5).await.unwrap();
        assert!(long.len() >= short.len());
        for (a, b) in short.iter().zip(long.iter()) {
            assert_eq!(a.statement_id, b.statement_id);
        }
    }

    #[tokio::test]
    async fn test_role_filter_narrows_to_operator() {
        let (engine, _dir) = seeded_engine().await;
        let filters = SearchFilters {
            role: Some(SpeakerRole::Operator),
            ..Default::default()
        };

        let hits = engine.search("welcome to the call", &filters, 10).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.role == SpeakerRole::Operator));
    }

    #[tokio::test]
    async fn test_aggregate_topic_by_period() {
        let (engine, _dir) = seeded_engine().await;
        let filters = SearchFilters {
            tickers: Some(vec!["ACME".to_string()]),
            period_range: Some((
                PeriodKey::new(2023, Quarter::Q1),
                PeriodKey::new(2023, Quarter::Q4),
            )),
            ..Default::default()
        };

        let summaries = engine.aggregate_topic("guidance", &filters).unwrap();
        assert_eq!(summaries.len(), 3);
        for pair in summaries.windows(2) {
            assert!(pair[0].period < pair[1].period);
        }
        for summary in &summaries {
            assert!(summary.statement_count >= 1);
            assert!(!summary.samples.is_empty());
            assert!(summary.samples.len() <= EngineConfig::default().topic_samples_per_period);
        }
    }

    #[tokio::test]
    async fn test_aggregate_topic_validates_filters() {
        let (engine, _dir) = seeded_engine().await;
        let filters = SearchFilters {
            period_range: Some((
                PeriodKey::new(2024, Quarter::Q1),
                PeriodKey::new(2023, Quarter::Q1),
            )),
            ..Default::default()
        };
        let err = engine.aggregate_topic("guidance", &filters).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
    }
}
