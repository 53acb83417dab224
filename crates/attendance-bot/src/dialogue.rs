//! Registration dialogue state, one per user.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use attendance_core::AccountId;

/// Where a user is in the three-prompt registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    AwaitingCode,
    AwaitingUsername { code: String },
    AwaitingPassword { code: String, username: String },
}

#[derive(Debug, Default)]
pub struct Dialogues {
    stages: Mutex<HashMap<AccountId, Stage>>,
}

impl Dialogues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) registration for `user`.
    pub fn begin(&self, user: AccountId) {
        self.set(user, Stage::AwaitingCode);
    }

    pub fn get(&self, user: AccountId) -> Option<Stage> {
        self.stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
            .cloned()
    }

    pub fn set(&self, user: AccountId, stage: Stage) {
        self.stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user, stage);
    }

    /// Drop any dialogue for `user`. Returns whether one existed.
    pub fn clear(&self, user: AccountId) -> bool {
        self.stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user)
            .is_some()
    }
}
