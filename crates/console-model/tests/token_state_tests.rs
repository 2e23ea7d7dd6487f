use console_model::{allowed_transitions, validate_transition, IngestionToken, TokenStatus};
use proptest::prelude::*;

#[test]
fn test_issued_transitions() {
    assert!(validate_transition(TokenStatus::Existing, TokenStatus::Activated).is_ok());
    assert!(validate_transition(TokenStatus::NewlyIssued, TokenStatus::Activated).is_ok());
    assert!(validate_transition(TokenStatus::Existing, TokenStatus::Deactivated).is_ok());

    // Invalid
    assert!(validate_transition(TokenStatus::NewlyIssued, TokenStatus::Existing).is_err());
}

#[test]
fn test_deactivated_is_terminal() {
    assert!(allowed_transitions(TokenStatus::Deactivated).is_empty());
    assert!(validate_transition(TokenStatus::Deactivated, TokenStatus::Deactivated).is_err());
}

#[test]
fn test_rollback_reactivation_of_recorded_token() {
    // A token read back from an older artifact starts as Existing and may be
    // activated again.
    let mut token = IngestionToken::existing("recorded-token");
    token.transition(TokenStatus::Activated).unwrap();
    assert!(token.status.is_usable());
}

fn any_status() -> impl Strategy<Value = TokenStatus> {
    prop_oneof![
        Just(TokenStatus::Existing),
        Just(TokenStatus::NewlyIssued),
        Just(TokenStatus::Activated),
        Just(TokenStatus::Deactivated),
    ]
}

proptest! {
    #[test]
    fn prop_validation_matches_allowed_set(from in any_status(), to in any_status()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_failed_transition_leaves_token_unchanged(
        path in proptest::collection::vec(any_status(), 0..8)
    ) {
        let mut token = IngestionToken::existing("tok");
        for to in path {
            let before = token.status;
            if token.transition(to).is_err() {
                prop_assert_eq!(token.status, before);
            } else {
                prop_assert_eq!(token.status, to);
            }
        }
    }
}
