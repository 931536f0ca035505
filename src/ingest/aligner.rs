// Time alignment of ASR tokens against diarization turn boundaries.
//
// Both inputs are independently erroneous time series: tokens may have small
// gaps or overlaps, turns may leave silence uncovered. The aligner assigns
// every token to exactly one turn and merges runs of same-turn tokens into
// statements at sentence boundaries.

use log::debug;

use crate::config::EngineConfig;
use crate::errors::AlignmentError;
use crate::ingest::types::{AsrToken, DiarizationTurn};

/// A contiguous text span assigned to one diarization turn. Offsets are
/// clamped to the parent turn's interval.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedStatement {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// One diarization turn with its merged statements. Turns with no assigned
/// tokens are preserved with an empty statement list.
#[derive(Debug, Clone)]
pub struct AlignedTurn {
    pub speaker_label: String,
    pub start: f64,
    pub end: f64,
    pub statements: Vec<AlignedStatement>,
}

/// Align tokens to turns and merge them into statements.
///
/// Each token goes to the turn containing its midpoint; tokens falling into
/// silence gaps attach to the nearest turn by boundary distance, with exact
/// ties broken toward the earlier turn so the result is deterministic.
pub fn align(
    tokens: &[AsrToken],
    turns: &[DiarizationTurn],
    config: &EngineConfig,
) -> Result<Vec<AlignedTurn>, AlignmentError> {
    validate_tokens(tokens)?;
    validate_turns(turns)?;

    if turns.is_empty() {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        // Upstream diarization failure: words were recognized but no
        // speakers were found.
        return Err(AlignmentError::NoTurns {
            token_count: tokens.len(),
        });
    }

    let mut aligned: Vec<AlignedTurn> = turns
        .iter()
        .map(|t| AlignedTurn {
            speaker_label: t.speaker_label.clone(),
            start: t.start,
            end: t.end,
            statements: Vec::new(),
        })
        .collect();

    // Group consecutive tokens by assigned turn, then merge each run into
    // statements at sentence boundaries or the max-duration cap.
    let mut run: Vec<&AsrToken> = Vec::new();
    let mut run_turn: Option<usize> = None;

    for token in tokens {
        let turn_idx = assign_turn(token, turns);

        let boundary = match run_turn {
            Some(current) if current != turn_idx => true,
            Some(_) => {
                let first = run[0];
                let over_cap = token.end - first.start > config.max_statement_secs;
                let sentence_end = run
                    .last()
                    .map(|t| ends_sentence(&t.text))
                    .unwrap_or(false);
                over_cap || sentence_end
            }
            None => false,
        };

        if boundary {
            if let Some(current) = run_turn {
                flush_run(&mut aligned[current], &run);
            }
            run.clear();
        }

        run.push(token);
        run_turn = Some(turn_idx);
    }

    if let Some(current) = run_turn {
        flush_run(&mut aligned[current], &run);
    }

    debug!(
        "Aligned {} tokens into {} statements across {} turns",
        tokens.len(),
        aligned.iter().map(|t| t.statements.len()).sum::<usize>(),
        aligned.len()
    );

    Ok(aligned)
}

fn validate_tokens(tokens: &[AsrToken]) -> Result<(), AlignmentError> {
    for (i, token) in tokens.iter().enumerate() {
        if token.end < token.start {
            return Err(AlignmentError::InvertedToken {
                index: i,
                start: token.start,
                end: token.end,
            });
        }
        if i > 0 && token.start < tokens[i - 1].start {
            return Err(AlignmentError::NonMonotonicTokens {
                index: i,
                prev: tokens[i - 1].start,
                cur: token.start,
            });
        }
    }
    Ok(())
}

fn validate_turns(turns: &[DiarizationTurn]) -> Result<(), AlignmentError> {
    for (i, turn) in turns.iter().enumerate() {
        if turn.end < turn.start {
            return Err(AlignmentError::NonMonotonicTurns { index: i });
        }
        if i > 0 {
            if turn.start < turns[i - 1].start {
                return Err(AlignmentError::NonMonotonicTurns { index: i });
            }
            if turn.start < turns[i - 1].end {
                return Err(AlignmentError::OverlappingTurns {
                    index: i,
                    prev_end: turns[i - 1].end,
                    start: turn.start,
                });
            }
        }
    }
    Ok(())
}

/// Index of the turn a token belongs to: the turn containing its midpoint,
/// otherwise the nearest turn by boundary distance (earlier wins on an
/// exact tie).
fn assign_turn(token: &AsrToken, turns: &[DiarizationTurn]) -> usize {
    let mid = token.midpoint();

    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;

    for (i, turn) in turns.iter().enumerate() {
        if mid >= turn.start && mid < turn.end {
            return i;
        }
        let dist = if mid < turn.start {
            turn.start - mid
        } else {
            mid - turn.end
        };
        // Strict comparison keeps the earlier turn on equidistant ties.
        if dist < best_dist {
            best_dist = dist;
            best_idx = i;
        }
    }

    best_idx
}

/// Merge a run of tokens into one statement on the given turn, clamping the
/// span into the turn's interval and keeping statements within a turn
/// non-overlapping.
fn flush_run(turn: &mut AlignedTurn, run: &[&AsrToken]) {
    if run.is_empty() {
        return;
    }

    let text = run
        .iter()
        .map(|t| t.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return;
    }

    let raw_start = run[0].start;
    let raw_end = run.last().map(|t| t.end).unwrap_or(raw_start);

    // Gap tokens attached by nearest-turn fallback can start or end outside
    // the turn; clamp so the containment invariant holds.
    let mut start = raw_start.clamp(turn.start, turn.end);
    let mut end = raw_end.clamp(turn.start, turn.end);

    if let Some(prev) = turn.statements.last() {
        start = start.max(prev.end);
    }
    end = end.max(start);

    turn.statements.push(AlignedStatement { start, end, text });
}

/// Whether a token's text closes a sentence or clause.
fn ends_sentence(text: &str) -> bool {
    text.trim_end_matches(['"', '\'', ')', ']'])
        .ends_with(['.', '?', '!', ';'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, start: f64, end: f64) -> AsrToken {
        AsrToken {
            text: text.to_string(),
            start,
            end,
        }
    }

    fn turn(label: &str, start: f64, end: f64) -> DiarizationTurn {
        DiarizationTurn {
            speaker_label: label.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn test_tokens_assigned_by_midpoint() {
        let tokens = vec![
            token("good", 0.0, 0.5),
            token("morning.", 0.5, 1.0),
            token("thanks", 5.2, 5.8),
            token("everyone.", 5.8, 6.4),
        ];
        let turns = vec![turn("spk_0", 0.0, 4.0), turn("spk_1", 5.0, 8.0)];

        let aligned = align(&tokens, &turns, &EngineConfig::default()).unwrap();
        assert_eq!(aligned[0].statements.len(), 1);
        assert_eq!(aligned[0].statements[0].text, "good morning.");
        assert_eq!(aligned[1].statements.len(), 1);
        assert_eq!(aligned[1].statements[0].text, "thanks everyone.");
    }

    #[test]
    fn test_statement_contained_in_turn() {
        // Token straddles into the silence gap before the second turn.
        let tokens = vec![token("so", 3.8, 4.6), token("anyway", 4.6, 5.4)];
        let turns = vec![turn("spk_0", 0.0, 4.0), turn("spk_1", 5.0, 8.0)];

        let aligned = align(&tokens, &turns, &EngineConfig::default()).unwrap();
        for t in &aligned {
            for s in &t.statements {
                assert!(s.start >= t.start && s.end <= t.end, "{:?} outside turn", s);
            }
        }
    }

    #[test]
    fn test_gap_token_attaches_to_nearest_turn() {
        // Midpoint 4.3 is 0.3s past turn 0 and 0.7s before turn 1.
        let tokens = vec![token("uh", 4.1, 4.5)];
        let turns = vec![turn("spk_0", 0.0, 4.0), turn("spk_1", 5.0, 8.0)];

        let aligned = align(&tokens, &turns, &EngineConfig::default()).unwrap();
        assert_eq!(aligned[0].statements.len(), 1);
        assert!(aligned[1].statements.is_empty());
    }

    #[test]
    fn test_equidistant_tie_goes_to_earlier_turn() {
        // Midpoint 4.5 is exactly 0.5s from both turn boundaries.
        let tokens = vec![token("hm", 4.25, 4.75)];
        let turns = vec![turn("spk_0", 0.0, 4.0), turn("spk_1", 5.0, 8.0)];

        let aligned = align(&tokens, &turns, &EngineConfig::default()).unwrap();
        assert_eq!(aligned[0].statements.len(), 1);
        assert!(aligned[1].statements.is_empty());
    }

    #[test]
    fn test_sentence_boundary_splits_statements() {
        let tokens = vec![
            token("revenue", 0.0, 0.5),
            token("grew.", 0.5, 1.0),
            token("margins", 1.2, 1.7),
            token("held.", 1.7, 2.2),
        ];
        let turns = vec![turn("spk_0", 0.0, 4.0)];

        let aligned = align(&tokens, &turns, &EngineConfig::default()).unwrap();
        let texts: Vec<&str> = aligned[0]
            .statements
            .iter()
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(texts, vec!["revenue grew.", "margins held."]);
    }

    #[test]
    fn test_max_duration_caps_statement() {
        let mut config = EngineConfig::default();
        config.max_statement_secs = 2.0;

        // No punctuation anywhere; the cap alone must force a split.
        let tokens: Vec<AsrToken> = (0..8)
            .map(|i| token("word", i as f64 * 0.5, i as f64 * 0.5 + 0.4))
            .collect();
        let turns = vec![turn("spk_0", 0.0, 10.0)];

        let aligned = align(&tokens, &turns, &config).unwrap();
        assert!(aligned[0].statements.len() >= 2);
        for s in &aligned[0].statements {
            assert!(s.end - s.start <= 2.0 + 1e-9);
        }
    }

    #[test]
    fn test_non_monotonic_tokens_rejected() {
        let tokens = vec![token("b", 2.0, 2.5), token("a", 1.0, 1.5)];
        let turns = vec![turn("spk_0", 0.0, 4.0)];

        let err = align(&tokens, &turns, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, AlignmentError::NonMonotonicTokens { index: 1, .. }));
    }

    #[test]
    fn test_overlapping_turns_rejected() {
        let tokens = vec![token("a", 0.0, 0.5)];
        let turns = vec![turn("spk_0", 0.0, 4.0), turn("spk_1", 3.0, 6.0)];

        let err = align(&tokens, &turns, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, AlignmentError::OverlappingTurns { index: 1, .. }));
    }

    #[test]
    fn test_tokens_without_turns_is_diarization_failure() {
        let tokens = vec![token("hello", 0.0, 0.5)];
        let err = align(&tokens, &[], &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, AlignmentError::NoTurns { token_count: 1 }));
    }

    #[test]
    fn test_empty_inputs_align_to_nothing() {
        let aligned = align(&[], &[], &EngineConfig::default()).unwrap();
        assert!(aligned.is_empty());
    }

    #[test]
    fn test_silence_gap_call_stays_in_audio_range() {
        // Three turns (operator, CEO, analyst), 50 tokens over 0-120s with a
        // 2s silence gap at 40-42s.
        let turns = vec![
            turn("spk_0", 0.0, 40.0),
            turn("spk_1", 42.0, 90.0),
            turn("spk_2", 90.0, 120.0),
        ];
        let tokens: Vec<AsrToken> = (0..50)
            .map(|i| {
                let start = i as f64 * 2.4;
                token("word", start, start + 2.0)
            })
            .collect();

        let aligned = align(&tokens, &turns, &EngineConfig::default()).unwrap();
        let total: usize = aligned.iter().map(|t| t.statements.len()).sum();
        assert!(total > 0);
        for t in &aligned {
            for s in &t.statements {
                assert!(s.start >= 0.0 && s.end <= 120.0);
                assert!(s.start >= t.start && s.end <= t.end);
            }
        }
    }
}
