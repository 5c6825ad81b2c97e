use std::fs;
use std::path::PathBuf;

use qf_engine::mode::SessionMode;
use qf_engine::participant::ParticipantStatus;
use qf_engine::report::{
    AnswerLogEntry, CompletionReason, RankingEntry, SessionSummary, SummaryWriter,
};

fn tmp_path(name: &str) -> PathBuf {
    let mut p = PathBuf::from("target");
    p.push(format!("{}_{}.jsonl", name, std::process::id()));
    p
}

fn summary() -> SessionSummary {
    SessionSummary {
        session_id: "s-1".into(),
        mode: SessionMode::Standard,
        winner: Some("p1".into()),
        ranking: vec![
            RankingEntry {
                participant_id: "p1".into(),
                handle: "ada".into(),
                score: 100,
                status: ParticipantStatus::Active,
            },
            RankingEntry {
                participant_id: "p2".into(),
                handle: "grace".into(),
                score: 50,
                status: ParticipantStatus::Active,
            },
        ],
        answer_log: vec![AnswerLogEntry {
            participant_id: "p1".into(),
            question_index: 0,
            answer_ids: vec![1],
            elapsed_ms: 1_200,
            points: 100,
        }],
        completion: Some(CompletionReason::Finished),
        ts: None,
    }
}

#[test]
fn writes_jsonl_with_lf_only() {
    let path = tmp_path("summarylog");
    let mut writer = SummaryWriter::create(&path).expect("create writer");
    writer.write(&summary()).expect("write");
    let bytes = fs::read(&path).expect("read file");
    assert!(bytes.ends_with(b"\n"));
    assert!(!bytes.contains(&b'\r'));
}

#[test]
fn injects_timestamp_and_round_trips() {
    let path = tmp_path("summaryts");
    let mut writer = SummaryWriter::create(&path).expect("create writer");
    writer.write(&summary()).expect("write");
    let text = fs::read_to_string(&path).expect("read file");
    let parsed: SessionSummary = serde_json::from_str(text.trim()).expect("parse line");
    assert!(parsed.ts.is_some());
    assert_eq!(parsed.winner.as_deref(), Some("p1"));
    assert_eq!(parsed.ranking[0].score, 100);
}

#[test]
fn event_shape_is_snake_case() {
    let json = serde_json::to_value(summary()).expect("serialize");
    assert_eq!(json["mode"], "standard");
    assert_eq!(json["completion"], "finished");
    assert_eq!(json["ranking"][0]["status"], "active");
}
