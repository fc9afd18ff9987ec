// src/lib.rs
//! Group decision-making over restaurant options: invite-code polls with
//! voting, and two-party head-to-head matches with mutual-like discovery.
//!
//! Callers arrive already authenticated; every operation takes the caller's
//! identity as a plain [`UserId`].

pub mod config;
pub mod db;
pub mod error;
pub mod head2head;
pub mod models;
pub mod notification;
pub mod poll;
pub mod swipe;
pub mod vote;

pub use config::Config;
pub use db::Store;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use head2head::MatchService;
pub use models::*;
pub use notification::{Notifications, Notifier, StoreNotifier};
pub use poll::PollService;
pub use swipe::SwipeRecorder;
pub use vote::VotingLedger;

/// Every component, wired to one store handle.
#[derive(Clone)]
pub struct Services {
    pub polls: PollService,
    pub ledger: VotingLedger,
    pub matches: MatchService,
    pub swipes: SwipeRecorder,
}

impl Services {
    pub fn new(store: Store, notifications: Notifications) -> Self {
        Self {
            polls: PollService::new(store.clone(), notifications.clone()),
            ledger: VotingLedger::new(store.clone(), notifications.clone()),
            matches: MatchService::new(store.clone(), notifications),
            swipes: SwipeRecorder::new(store),
        }
    }
}
