// Ingestion: turns raw ASR + diarization output into an attributed,
// indexed call.
//
// Phases: align (tokens x turns -> statements), attribute (labels ->
// participants), index (postings + vectors). Each committed phase is a
// checkpoint the pipeline can resume from.

pub mod aligner;
pub mod media;
pub mod pipeline;
pub mod roster;
pub mod topics;
pub mod types;

pub use aligner::{align, AlignedStatement, AlignedTurn};
pub use media::validate_media_file;
pub use pipeline::{IngestPipeline, IngestRequest};
pub use roster::{match_speakers, Assignment};
pub use topics::{KeywordTagger, NoopTagger, TopicTagger};
pub use types::{AsrToken, CallMeta, DiarizationTurn, RosterEntry};
