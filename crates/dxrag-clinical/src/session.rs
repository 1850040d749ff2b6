use dashmap::DashMap;
use std::sync::Arc;

use crate::patient::{PatientProfile, PatientUpdate};

pub const DEFAULT_SESSION: &str = "default";

/// Patient profiles keyed by session id. Writes to the same id are
/// last-write-wins; distinct ids never interact.
#[derive(Clone, Default)]
pub struct SessionStore {
    profiles: Arc<DashMap<String, PatientProfile>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profile for `session_id`, creating an empty one on first use.
    pub fn get_or_create(&self, session_id: &str) -> PatientProfile {
        self.profiles.entry(session_id.to_string()).or_default().clone()
    }

    pub fn get(&self, session_id: &str) -> Option<PatientProfile> {
        self.profiles.get(session_id).map(|p| p.clone())
    }

    pub fn set(&self, session_id: &str, profile: PatientProfile) {
        self.profiles.insert(session_id.to_string(), profile);
    }

    /// Apply `update` under the entry lock and return the resulting profile.
    pub fn apply_update(&self, session_id: &str, update: PatientUpdate) -> PatientProfile {
        let mut entry = self.profiles.entry(session_id.to_string()).or_default();
        update.apply(entry.value_mut());
        entry.value().clone()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
