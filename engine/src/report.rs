use serde::{Deserialize, Serialize};

use crate::mode::SessionMode;
use crate::participant::{ParticipantId, ParticipantStatus};
use crate::quiz::AnswerId;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    Finished,
    LastSurvivor,
    BracketResolved,
    Cancelled,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub participant_id: ParticipantId,
    pub handle: String,
    pub score: u32,
    pub status: ParticipantStatus,
}

/// One scored submission in the per-question answer log.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AnswerLogEntry {
    pub participant_id: ParticipantId,
    pub question_index: usize,
    pub answer_ids: Vec<AnswerId>,
    pub elapsed_ms: u64,
    pub points: u32,
}

/// Serializable end-of-session record handed to the persistence
/// collaborator: final ranking plus the full scored answer log.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub mode: SessionMode,
    pub winner: Option<ParticipantId>,
    pub ranking: Vec<RankingEntry>,
    pub answer_log: Vec<AnswerLogEntry>,
    pub completion: Option<CompletionReason>,
    #[serde(default)]
    pub ts: Option<String>,
}

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};

/// Appends session summaries as JSONL, one line per completed session.
pub struct SummaryWriter {
    writer: BufWriter<File>,
}

impl SummaryWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                let _ = create_dir_all(parent);
            }
        }
        let f = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(f),
        })
    }

    pub fn write(&mut self, summary: &SessionSummary) -> std::io::Result<()> {
        // inject timestamp if missing
        let mut record = summary.clone();
        if record.ts.is_none() {
            record.ts = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        let line = serde_json::to_string(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}
