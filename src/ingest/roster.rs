// Speaker attribution: maps anonymous diarization labels onto participant
// identities and roles.
//
// A prioritized chain of pure heuristics, first match wins:
//   1. operator boilerplate in the speaker's own opening text
//   2. hand-off phrases in the preceding turn naming the speaker
//   3. self-introductions ("this is <name>, <title>")
//   4. conventional speaking order (operator opens, management follows)
// Anything below the confidence threshold stays unknown with a stable
// synthetic label. Matching is deterministic given identical input.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::EngineConfig;
use crate::domain::SpeakerRole;
use crate::ingest::aligner::AlignedTurn;
use crate::ingest::types::RosterEntry;

/// What a speaker label resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub display_name: String,
    pub role: SpeakerRole,
    pub confidence: f32,
}

/// Everything the heuristics can observe about one diarization label.
#[derive(Debug, Clone)]
struct SpeakerObservation {
    label: String,
    /// Position among distinct labels, in order of first speech.
    appearance_index: usize,
    /// Duration of the speaker's longest turn, in seconds.
    longest_turn_secs: f64,
    /// Text of the speaker's first few statements.
    opening_text: String,
    /// Text of the turn immediately preceding the speaker's first turn.
    preceding_text: Option<String>,
}

static OPERATOR_PHRASES: &[&str] = &[
    "welcome to",
    "conference call",
    "question-and-answer session",
    "question and answer session",
    "your first question",
    "question comes from",
    "please stand by",
    "all lines have been placed on mute",
    "i would now like to turn the call over",
    "this concludes today's",
];

static HANDOFF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)turn (?:the )?(?:call|conference) over to ([A-Z][\w'.-]*(?: [A-Z][\w'.-]*){1,2})",
    )
    .expect("handoff regex")
});

static QUESTION_FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)question (?:comes|is) from (?:the line of )?([A-Z][\w'.-]*(?: [A-Z][\w'.-]*){1,2})",
    )
    .expect("question-from regex")
});

static SELF_INTRO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:this is|i'm|i am) ([A-Z][\w'.-]*(?: [A-Z][\w'.-]*){1,2})")
        .expect("self-intro regex")
});

static MANAGEMENT_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(chief|ceo|cfo|coo|cto|president|founder|officer|treasurer)\b")
        .expect("title regex")
});

static ANALYST_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\banalyst\b").expect("analyst regex"));

type Strategy = fn(&SpeakerObservation, &MatchContext) -> Option<Assignment>;

struct MatchContext<'a> {
    roster: &'a [RosterEntry],
    config: &'a EngineConfig,
}

/// Resolve every distinct speaker label on a call. Returns one assignment
/// per label, in order of first appearance.
pub fn match_speakers(
    turns: &[AlignedTurn],
    roster: Option<&[RosterEntry]>,
    config: &EngineConfig,
) -> Vec<(String, Assignment)> {
    let observations = observe(turns);
    let ctx = MatchContext {
        roster: roster.unwrap_or(&[]),
        config,
    };

    let strategies: &[Strategy] = &[
        match_operator_boilerplate,
        match_handoff_introduction,
        match_self_introduction,
        match_speaking_order,
    ];

    observations
        .iter()
        .map(|obs| {
            let matched = strategies.iter().find_map(|s| s(obs, &ctx));

            let assignment = match matched {
                Some(a) if a.confidence >= config.roster_confidence_threshold => {
                    debug!(
                        "Label {} resolved to '{}' ({}, confidence {:.2})",
                        obs.label, a.display_name, a.role, a.confidence
                    );
                    a
                }
                Some(a) => {
                    debug!(
                        "Label {} matched '{}' below threshold ({:.2} < {:.2}), keeping unknown",
                        obs.label, a.display_name, a.confidence,
                        config.roster_confidence_threshold
                    );
                    synthetic(obs, a.confidence)
                }
                None => synthetic(obs, 0.0),
            };

            (obs.label.clone(), assignment)
        })
        .collect()
}

/// Stable fallback identity for an unresolved label.
fn synthetic(obs: &SpeakerObservation, confidence: f32) -> Assignment {
    Assignment {
        display_name: format!("Speaker {}", obs.appearance_index + 1),
        role: SpeakerRole::Unknown,
        confidence,
    }
}

fn observe(turns: &[AlignedTurn]) -> Vec<SpeakerObservation> {
    let mut observations: Vec<SpeakerObservation> = Vec::new();

    for (turn_idx, turn) in turns.iter().enumerate() {
        let duration = turn.end - turn.start;

        if let Some(existing) = observations.iter_mut().find(|o| o.label == turn.speaker_label) {
            existing.longest_turn_secs = existing.longest_turn_secs.max(duration);
            continue;
        }

        let opening_text = turn
            .statements
            .iter()
            .take(3)
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let preceding_text = turn_idx.checked_sub(1).map(|prev_idx| {
            turns[prev_idx]
                .statements
                .iter()
                .rev()
                .take(3)
                .rev()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });

        observations.push(SpeakerObservation {
            label: turn.speaker_label.clone(),
            appearance_index: observations.len(),
            longest_turn_secs: duration,
            opening_text,
            preceding_text,
        });
    }

    observations
}

/// Heuristic 1: the speaker's own opening text is operator boilerplate.
fn match_operator_boilerplate(
    obs: &SpeakerObservation,
    _ctx: &MatchContext,
) -> Option<Assignment> {
    let lower = obs.opening_text.to_lowercase();
    if OPERATOR_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(Assignment {
            display_name: "Operator".to_string(),
            role: SpeakerRole::Operator,
            confidence: 0.9,
        });
    }
    None
}

/// Heuristic 2: the preceding turn hands off to this speaker by name.
fn match_handoff_introduction(obs: &SpeakerObservation, ctx: &MatchContext) -> Option<Assignment> {
    let preceding = obs.preceding_text.as_deref()?;

    if let Some(caps) = HANDOFF_RE.captures(preceding) {
        let name = caps.get(1)?.as_str();
        return Some(resolve_named(name, SpeakerRole::Management, ctx, 0.85, 0.7));
    }

    if let Some(caps) = QUESTION_FROM_RE.captures(preceding) {
        let name = caps.get(1)?.as_str();
        return Some(resolve_named(name, SpeakerRole::Analyst, ctx, 0.85, 0.7));
    }

    None
}

/// Heuristic 3: self-introduction with an optional title.
fn match_self_introduction(obs: &SpeakerObservation, ctx: &MatchContext) -> Option<Assignment> {
    let caps = SELF_INTRO_RE.captures(&obs.opening_text)?;
    let name = caps.get(1)?.as_str();

    let default_role = if MANAGEMENT_TITLE_RE.is_match(&obs.opening_text) {
        SpeakerRole::Management
    } else if ANALYST_TITLE_RE.is_match(&obs.opening_text) {
        SpeakerRole::Analyst
    } else {
        SpeakerRole::Unknown
    };

    Some(resolve_named(name, default_role, ctx, 0.8, 0.6))
}

/// Heuristic 4: conventional speaking order. The operator opens the call,
/// the first extended turn after that is conventionally senior management.
fn match_speaking_order(obs: &SpeakerObservation, ctx: &MatchContext) -> Option<Assignment> {
    let role = *ctx.config.speaking_order_roles.get(obs.appearance_index)?;

    if role == SpeakerRole::Management && obs.longest_turn_secs < ctx.config.extended_turn_secs {
        return None;
    }

    let display_name = match role {
        SpeakerRole::Operator => "Operator".to_string(),
        _ => format!("Unidentified {}", capitalize(role.as_str())),
    };

    Some(Assignment {
        display_name,
        role,
        confidence: 0.55,
    })
}

/// Resolve an extracted name against the roster. A roster hit takes the
/// roster's spelling and role at higher confidence; otherwise the extracted
/// name is kept with the phrase-implied role.
fn resolve_named(
    name: &str,
    implied_role: SpeakerRole,
    ctx: &MatchContext,
    roster_confidence: f32,
    bare_confidence: f32,
) -> Assignment {
    let name = name.trim_end_matches(['.', ',', ';', ':']);
    if let Some(entry) = ctx
        .roster
        .iter()
        .find(|e| names_match(&e.expected_name, name))
    {
        return Assignment {
            display_name: entry.expected_name.clone(),
            role: entry.expected_role,
            confidence: roster_confidence,
        };
    }

    Assignment {
        display_name: name.to_string(),
        role: implied_role,
        confidence: bare_confidence,
    }
}

/// Lenient name comparison: full normalized equality, or matching surnames
/// (covers "Ms. Chen" vs "Laura Chen" style mismatches).
pub fn names_match(a: &str, b: &str) -> bool {
    let na = normalize_name(a);
    let nb = normalize_name(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    if na == nb {
        return true;
    }
    match (na.split(' ').last(), nb.split(' ').last()) {
        (Some(sa), Some(sb)) => sa == sb && sa.len() > 2,
        _ => false,
    }
}

/// Lowercased, punctuation-free form of a display name. Also the basis of
/// the cross-call identity key.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|w| !matches!(*w, "mr" | "ms" | "mrs" | "dr"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::aligner::AlignedStatement;

    fn turn_with(label: &str, start: f64, end: f64, text: &str) -> AlignedTurn {
        AlignedTurn {
            speaker_label: label.to_string(),
            start,
            end,
            statements: vec![AlignedStatement {
                start,
                end,
                text: text.to_string(),
            }],
        }
    }

    fn roster() -> Vec<RosterEntry> {
        vec![
            RosterEntry {
                expected_name: "Jane Smith".to_string(),
                expected_role: SpeakerRole::Management,
            },
            RosterEntry {
                expected_name: "Bob Lee".to_string(),
                expected_role: SpeakerRole::Analyst,
            },
        ]
    }

    fn assignments_for(
        turns: &[AlignedTurn],
        roster: Option<&[RosterEntry]>,
    ) -> Vec<(String, Assignment)> {
        match_speakers(turns, roster, &EngineConfig::default())
    }

    #[test]
    fn test_operator_detected_from_boilerplate() {
        let turns = vec![turn_with(
            "spk_0",
            0.0,
            30.0,
            "Good morning and welcome to the ACME fourth quarter conference call.",
        )];

        let result = assignments_for(&turns, None);
        assert_eq!(result[0].1.role, SpeakerRole::Operator);
        assert_eq!(result[0].1.display_name, "Operator");
    }

    #[test]
    fn test_handoff_resolves_against_roster() {
        let turns = vec![
            turn_with(
                "spk_0",
                0.0,
                30.0,
                "Welcome to the call. I would now like to turn the call over to Jane Smith.",
            ),
            turn_with("spk_1", 31.0, 120.0, "Thank you. Revenue grew this quarter."),
        ];

        let r = roster();
        let result = assignments_for(&turns, Some(&r));
        let jane = &result[1].1;
        assert_eq!(jane.display_name, "Jane Smith");
        assert_eq!(jane.role, SpeakerRole::Management);
        assert!(jane.confidence >= 0.85);
    }

    #[test]
    fn test_question_handoff_implies_analyst() {
        let turns = vec![
            turn_with(
                "spk_0",
                0.0,
                10.0,
                "Our first question comes from the line of Bob Lee.",
            ),
            turn_with("spk_1", 11.0, 40.0, "Thanks for taking my question."),
        ];

        let result = assignments_for(&turns, None);
        let bob = &result[1].1;
        assert_eq!(bob.display_name, "Bob Lee");
        assert_eq!(bob.role, SpeakerRole::Analyst);
    }

    #[test]
    fn test_self_introduction_with_title() {
        let turns = vec![turn_with(
            "spk_0",
            0.0,
            60.0,
            "Good morning. This is Jane Smith, Chief Financial Officer.",
        )];

        let result = assignments_for(&turns, None);
        assert_eq!(result[0].1.display_name, "Jane Smith");
        assert_eq!(result[0].1.role, SpeakerRole::Management);
    }

    #[test]
    fn test_unresolved_speaker_gets_stable_synthetic_label() {
        // Short mid-call turn with nothing to match on; appearance index 3
        // is beyond the default speaking-order list.
        let turns = vec![
            turn_with("spk_0", 0.0, 5.0, "mumble"),
            turn_with("spk_1", 6.0, 11.0, "noise"),
            turn_with("spk_2", 12.0, 17.0, "static"),
            turn_with("spk_3", 18.0, 23.0, "hello there"),
        ];

        let result = assignments_for(&turns, None);
        let last = &result[3].1;
        assert_eq!(last.role, SpeakerRole::Unknown);
        assert_eq!(last.display_name, "Speaker 4");
    }

    #[test]
    fn test_speaking_order_requires_extended_turn_for_management() {
        // Second speaker's turn is too short to be the prepared-remarks slot.
        let turns = vec![
            turn_with("spk_0", 0.0, 30.0, "Welcome to the quarterly conference call."),
            turn_with("spk_1", 31.0, 36.0, "Hi."),
        ];

        let result = assignments_for(&turns, None);
        assert_eq!(result[1].1.role, SpeakerRole::Unknown);

        // With an extended turn the convention applies.
        let turns = vec![
            turn_with("spk_0", 0.0, 30.0, "Welcome to the quarterly conference call."),
            turn_with("spk_1", 31.0, 120.0, "Let me walk you through the numbers."),
        ];
        let result = assignments_for(&turns, None);
        assert_eq!(result[1].1.role, SpeakerRole::Management);
    }

    #[test]
    fn test_matching_is_deterministic() {
        let turns = vec![
            turn_with(
                "spk_0",
                0.0,
                30.0,
                "Welcome to the call. Our first question comes from Bob Lee.",
            ),
            turn_with("spk_1", 31.0, 60.0, "Thanks. This is Bob Lee."),
        ];

        let r = roster();
        let first = assignments_for(&turns, Some(&r));
        for _ in 0..5 {
            assert_eq!(assignments_for(&turns, Some(&r)), first);
        }
    }

    #[test]
    fn test_names_match_levels() {
        assert!(names_match("Jane Smith", "jane smith"));
        assert!(names_match("Ms. Smith", "Jane Smith"));
        assert!(!names_match("Jane Smith", "Jane Doe"));
        assert!(!names_match("", "Jane Smith"));
    }
}
