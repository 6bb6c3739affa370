use coach_store::{NewInterview, SessionStore, StoreError};
use coach_types::{
    AppendOutcome, InterviewScore, QuestionState, SessionError, TranscriptEntry, TranscriptRole,
};
use std::sync::Arc;

fn new_interview() -> NewInterview {
    NewInterview {
        adapter: "mock".to_string(),
        role_title: Some("Data Analyst".to_string()),
        questions: vec![
            "Describe a conflict.".to_string(),
            "How do you prioritize?".to_string(),
            "Why this role?".to_string(),
        ],
        focus_areas: vec!["Communication".to_string()],
        resume_text: "Analyst at Acme.".to_string(),
        job_text: "Own dashboards.".to_string(),
    }
}

#[test]
fn create_then_get_round_trips_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).unwrap();

    let created = store.create(new_interview()).unwrap();
    let loaded = store.get(&created.interview_id).unwrap();

    assert_eq!(loaded, created);
    assert_eq!(loaded.question_statuses.len(), 3);
    assert!(store.exists(&created.interview_id));
}

#[test]
fn unknown_interview_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).unwrap();

    assert!(matches!(store.get("missing"), Err(StoreError::NotFound(_))));
    assert!(matches!(
        store.append_transcript_entry(
            "missing",
            TranscriptEntry::new(TranscriptRole::Coach, "Hello")
        ),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn append_merges_same_role_and_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).unwrap();
    let id = store.create(new_interview()).unwrap().interview_id;

    let coach = |text: &str| TranscriptEntry::new(TranscriptRole::Coach, text);
    assert_eq!(
        store.append_transcript_entry(&id, coach("Welcome")).unwrap(),
        AppendOutcome::Appended
    );
    assert_eq!(
        store.append_transcript_entry(&id, coach(".")).unwrap(),
        AppendOutcome::Merged
    );
    assert_eq!(
        store.append_transcript_entry(&id, coach("  ")).unwrap(),
        AppendOutcome::Skipped
    );

    let reopened = SessionStore::open(dir.path()).unwrap();
    let session = reopened.get(&id).unwrap();
    assert_eq!(session.transcript.len(), 1);
    assert_eq!(session.transcript[0].text, "Welcome.");
    assert!(session.conversation_memory.contains("Coach: Welcome."));
}

#[test]
fn progress_index_is_monotonic_and_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).unwrap();
    let id = store.create(new_interview()).unwrap().interview_id;

    assert_eq!(store.advance_question_index(&id, 1, "live").unwrap(), Some(1));
    assert_eq!(store.advance_question_index(&id, 0, "live").unwrap(), Some(1));
    assert!(matches!(
        store.advance_question_index(&id, 3, "live"),
        Err(StoreError::Session(SessionError::IndexOutOfRange { index: 3, len: 3 }))
    ));

    store
        .update_question_status(&id, 2, QuestionState::Answered, "user")
        .unwrap();
    let session = store.get(&id).unwrap();
    assert_eq!(session.asked_question_index, Some(2));
    assert_eq!(session.question_status_history.len(), 1);
}

#[test]
fn failed_mutation_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).unwrap();
    let id = store.create(new_interview()).unwrap().interview_id;
    let before = store.get(&id).unwrap();

    let result = store.update_question_status(&id, 9, QuestionState::Started, "user");
    assert!(result.is_err());
    assert_eq!(store.get(&id).unwrap(), before);
}

#[test]
fn reset_clears_transcript_score_and_progress() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).unwrap();
    let id = store.create(new_interview()).unwrap().interview_id;

    store
        .append_transcript_entry(&id, TranscriptEntry::new(TranscriptRole::Candidate, "Hi"))
        .unwrap();
    store.advance_question_index(&id, 1, "live").unwrap();
    store
        .set_score(
            &id,
            InterviewScore {
                overall_score: 80,
                summary: "Solid".to_string(),
                strengths: vec![],
                improvements: vec![],
            },
        )
        .unwrap();

    let session = store.reset(&id).unwrap();
    assert!(session.transcript.is_empty());
    assert!(session.score.is_none());
    assert_eq!(session.asked_question_index, None);
    assert_eq!(store.get(&id).unwrap(), session);
}

#[test]
fn loaded_records_have_statuses_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).unwrap();
    let id = store.create(new_interview()).unwrap().interview_id;

    let path = dir.path().join(format!("{id}.json"));
    let mut raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    raw["question_statuses"] = serde_json::json!([]);
    std::fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

    let session = store.get(&id).unwrap();
    assert_eq!(session.question_statuses.len(), 3);
}

#[test]
fn concurrent_appends_to_one_interview_do_not_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SessionStore::open(dir.path()).unwrap());
    let id = store.create(new_interview()).unwrap().interview_id;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            let id = id.clone();
            std::thread::spawn(move || {
                let role = if i % 2 == 0 {
                    TranscriptRole::Coach
                } else {
                    TranscriptRole::Candidate
                };
                for _ in 0..5 {
                    store
                        .append_transcript_entry(&id, TranscriptEntry::new(role, "word"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let session = store.get(&id).unwrap();
    let total_words: usize = session
        .transcript
        .iter()
        .map(|entry| entry.text.split_whitespace().count())
        .sum();
    assert_eq!(total_words, 40);
}
