mod common;

use bitebattle_core::{CoreError, MatchStatus, Notifications, Services, Store};
use common::{setup, user};
use uuid::Uuid;

fn categories() -> Vec<String> {
    vec!["mexican".into(), "japanese".into()]
}

#[tokio::test]
async fn new_matches_start_pending() {
    let (_store, services) = setup().await;
    let (a, b) = (user(), user());

    let created = services.matches.create_match(a, b, categories()).await.unwrap();
    assert_eq!(created.status, MatchStatus::Pending);
    assert_eq!(created.inviter_id, a);
    assert_eq!(created.invitee_id, b);

    let fetched = services.matches.get_match(created.id, b).await.unwrap();
    assert_eq!(fetched.status, MatchStatus::Pending);
    assert_eq!(fetched.categories, categories());
}

#[tokio::test]
async fn create_validates_participants_and_categories() {
    let (_store, services) = setup().await;
    let a = user();

    let self_invite = services.matches.create_match(a, a, categories()).await.unwrap_err();
    assert!(matches!(self_invite, CoreError::InvalidInput(_)));

    let empty = services.matches.create_match(a, user(), vec![]).await.unwrap_err();
    assert!(matches!(empty, CoreError::InvalidInput(_)));
}

#[tokio::test]
async fn invitee_accepts_and_inviter_cannot_reaccept() {
    let (_store, services) = setup().await;
    let (a, b) = (user(), user());
    let created = services.matches.create_match(a, b, categories()).await.unwrap();

    let accepted = services.matches.accept_match(created.id, b).await.unwrap();
    assert_eq!(accepted.status, MatchStatus::Active);

    let err = services.matches.accept_match(created.id, a).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition));

    let again = services.matches.accept_match(created.id, b).await.unwrap_err();
    assert!(matches!(again, CoreError::InvalidTransition));
}

#[tokio::test]
async fn inviter_cannot_accept_a_pending_match() {
    let (_store, services) = setup().await;
    let (a, b) = (user(), user());
    let created = services.matches.create_match(a, b, categories()).await.unwrap();

    let err = services.matches.accept_match(created.id, a).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition));

    let current = services.matches.get_match(created.id, a).await.unwrap();
    assert_eq!(current.status, MatchStatus::Pending);
}

#[tokio::test]
async fn outsiders_cannot_tell_whether_a_match_exists() {
    let (_store, services) = setup().await;
    let (a, b) = (user(), user());
    let created = services.matches.create_match(a, b, categories()).await.unwrap();

    let existing = services.matches.accept_match(created.id, user()).await.unwrap_err();
    assert!(matches!(existing, CoreError::NotFound));

    let missing = services.matches.accept_match(Uuid::new_v4(), user()).await.unwrap_err();
    assert!(matches!(missing, CoreError::NotFound));

    let hidden = services.matches.get_match(created.id, user()).await.unwrap_err();
    assert!(matches!(hidden, CoreError::NotFound));
}

#[tokio::test]
async fn accepting_unknown_match_is_not_found() {
    let (_store, services) = setup().await;

    let err = services.matches.accept_match(Uuid::new_v4(), user()).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_transition_once() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display());
    let store = Store::connect(&url, 4).await.unwrap();
    store.ensure_schema().await.unwrap();
    let services = Services::new(store.clone(), Notifications::disabled());

    for _ in 0..10 {
        let (a, b) = (user(), user());
        let created = services.matches.create_match(a, b, categories()).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let matches = services.matches.clone();
                tokio::spawn(async move { matches.accept_match(created.id, b).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(m) => {
                    assert_eq!(m.status, MatchStatus::Active);
                    accepted += 1;
                }
                Err(e) => assert!(matches!(e, CoreError::InvalidTransition), "{e}"),
            }
        }
        assert_eq!(accepted, 1);
    }

    store.close().await;
}

#[tokio::test]
async fn matches_are_hidden_from_outsiders() {
    let (_store, services) = setup().await;
    let (a, b) = (user(), user());
    let created = services.matches.create_match(a, b, categories()).await.unwrap();

    let err = services.matches.get_match(created.id, user()).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound));
}
