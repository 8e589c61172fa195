//! Property-based tests for the pure parts of the workflow: transitions,
//! authorization table, scoring and history reconstruction

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use achievement_workflow::directory::LecturerId;
use achievement_workflow::workflow::{
    AccessEvaluator, AccessFacts, AchievementDetails, Action, Actor, CompetitionDetails, CompetitionLevel,
    ContentKey, Decision, DenyReason, HistoryReconstructor, OtherDetails, Role, ScoringPolicy,
    SubmissionRecord, SubmissionStateMachine, SubmissionStatus, Transition, UserId,
};

const ACTIONS: [Action; 7] = [
    Action::Create,
    Action::UpdateDraft,
    Action::Submit,
    Action::DeleteDraft,
    Action::Verify,
    Action::Reject,
    Action::Read,
];

fn status_strategy() -> impl Strategy<Value = SubmissionStatus> {
    prop::sample::select(SubmissionStatus::ALL.to_vec())
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop::sample::select(ACTIONS.to_vec())
}

fn level_strategy() -> impl Strategy<Value = CompetitionLevel> {
    prop_oneof![
        Just(CompetitionLevel::International),
        Just(CompetitionLevel::National),
        Just(CompetitionLevel::Regional),
        Just(CompetitionLevel::Local),
    ]
}

/// A record in `status` whose snapshot fields satisfy the record invariants
fn record_in(status: SubmissionStatus) -> SubmissionRecord {
    let created = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let mut record = SubmissionRecord::new_draft(UserId::from("stu-1"), ContentKey::new(), created);
    record.status = status;
    if status.requires_submission() {
        record.submitted_at = Some(created + Duration::hours(1));
    }
    if matches!(status, SubmissionStatus::Verified | SubmissionStatus::Rejected) {
        record.decided_at = Some(created + Duration::hours(2));
        record.decided_by = Some(UserId::from("lec-1"));
    }
    if status == SubmissionStatus::Rejected {
        record.rejection_note = Some("incomplete".to_string());
    }
    record
}

fn competition(level: CompetitionLevel, rank: Option<u32>) -> AchievementDetails {
    AchievementDetails::Competition(CompetitionDetails {
        level: Some(level),
        rank,
        ..Default::default()
    })
}

proptest! {
    #[test]
    fn submit_succeeds_only_from_draft_or_rejected(status in status_strategy()) {
        let record = record_in(status);
        prop_assert_eq!(record.invariant_violation(), None);

        let transition = SubmissionStateMachine::submission_for(status);
        let result = SubmissionStateMachine::apply(&record, &transition, Utc::now());
        if matches!(status, SubmissionStatus::Draft | SubmissionStatus::Rejected) {
            let next = result.unwrap();
            prop_assert_eq!(next.status, SubmissionStatus::Submitted);
            prop_assert_eq!(next.invariant_violation(), None);
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn blank_reject_note_is_always_missing(status in status_strategy(), note in "[ \t\n]{0,6}") {
        let record = record_in(status);
        let transition = Transition::Reject { decided_by: UserId::from("lec-1"), note };
        let err = SubmissionStateMachine::apply(&record, &transition, Utc::now()).unwrap_err();
        prop_assert_eq!(err.to_string(), "Rejection requires a non-empty note");
    }

    #[test]
    fn committed_transitions_keep_record_invariants(status in status_strategy(), note in "[a-z]{1,12}") {
        let record = record_in(status);
        let candidates = [
            Transition::Submit,
            Transition::Resubmit,
            Transition::Verify { decided_by: UserId::from("lec-1") },
            Transition::Reject { decided_by: UserId::from("lec-1"), note },
            Transition::Delete,
        ];
        for transition in candidates {
            if let Ok(next) = SubmissionStateMachine::apply(&record, &transition, Utc::now()) {
                prop_assert_eq!(next.invariant_violation(), None);
                prop_assert!(SubmissionStateMachine::legal_targets(status).contains(&next.status));
            }
        }
    }

    #[test]
    fn admin_is_always_allowed(action in action_strategy(), owner in "stu-[0-9]{1,3}") {
        let decision = AccessEvaluator::can_perform(
            action,
            &Actor::admin("admin-1"),
            &UserId::from(owner),
            &AccessFacts::default(),
        );
        prop_assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn student_never_acts_for_someone_else(action in action_strategy(), owner in "stu-[0-9]{1,3}") {
        let decision = AccessEvaluator::can_perform(
            action,
            &Actor::student("stu-x"),
            &UserId::from(owner),
            &AccessFacts::granted(),
        );
        prop_assert!(!decision.is_allowed());
    }

    #[test]
    fn mismatched_advisor_cannot_decide(
        acting in "L-[0-9]{2}",
        assigned in "L-[0-9]{2}",
        verify in any::<bool>(),
    ) {
        prop_assume!(acting != assigned);
        let action = if verify { Action::Verify } else { Action::Reject };
        let facts = AccessFacts {
            capability_granted: true,
            acting_lecturer: Some(LecturerId(acting)),
            owner_advisor: Some(LecturerId(assigned)),
        };
        let decision = AccessEvaluator::can_perform(action, &Actor::advisor("lec-1"), &UserId::from("stu-1"), &facts);
        prop_assert_eq!(decision, Decision::Deny(DenyReason::NotAdvisor));
    }

    #[test]
    fn scoring_is_deterministic(level in level_strategy(), rank in prop::option::of(1u32..50)) {
        let details = competition(level, rank);
        prop_assert_eq!(ScoringPolicy::score(&details), ScoringPolicy::score(&details.clone()));
        prop_assert!(ScoringPolicy::score(&details) >= 5);
    }

    #[test]
    fn low_ranks_score_the_floor(rank in 4u32..10_000) {
        prop_assert_eq!(ScoringPolicy::score(&competition(CompetitionLevel::International, Some(rank))), 40);
        prop_assert_eq!(ScoringPolicy::score(&competition(CompetitionLevel::National, Some(rank))), 20);
    }

    #[test]
    fn regional_ignores_rank(rank in prop::option::of(any::<u32>())) {
        prop_assert_eq!(ScoringPolicy::score(&competition(CompetitionLevel::Regional, rank)), 10);
        prop_assert_eq!(
            ScoringPolicy::score(&AchievementDetails::Other(OtherDetails::default())),
            10
        );
    }

    #[test]
    fn history_is_chronological(status in status_strategy()) {
        let record = record_in(status);
        let first = HistoryReconstructor::reconstruct(&record);
        let second = HistoryReconstructor::reconstruct(&record);
        prop_assert_eq!(&first, &second);
        prop_assert!(first.windows(2).all(|pair| pair[0].at <= pair[1].at));
        let expected = match status {
            SubmissionStatus::Draft => 1,
            SubmissionStatus::Submitted | SubmissionStatus::Deleted => 2,
            SubmissionStatus::Verified | SubmissionStatus::Rejected => 3,
        };
        prop_assert_eq!(first.len(), expected);
    }
}
