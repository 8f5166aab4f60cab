//! Copy-on-write endpoint profile store.
//!
//! Readers load the current snapshot without locking. Writers clone the
//! nested map, edit the clone and publish it with `rcu`, so concurrent
//! writers never lose each other's updates.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// Learned profile of one API endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointProfile {
    pub revision_id: i64,
    pub api_name: String,
    pub api_endpoint_name: String,
    pub environment_id: i64,
    pub created_at: i64,
    pub changed_at: i64,
    pub spec: serde_json::Value,
}

type Endpoints = HashMap<String, Arc<EndpointProfile>>;
type Profiles = HashMap<String, Endpoints>;

#[derive(Default)]
pub struct ProfileStore {
    profiles: ArcSwap<Profiles>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, api_name: &str, endpoint_name: &str) -> Option<Arc<EndpointProfile>> {
        self.profiles.load().get(api_name)?.get(endpoint_name).cloned()
    }

    pub fn add_modify(&self, api_name: &str, endpoint_name: &str, profile: EndpointProfile) {
        let profile = Arc::new(profile);
        self.profiles.rcu(|current| {
            let mut next = Profiles::clone(current);
            next.entry(api_name.to_string())
                .or_default()
                .insert(endpoint_name.to_string(), profile.clone());
            next
        });
    }

    pub fn delete_endpoint(&self, api_name: &str, endpoint_name: &str) {
        self.profiles.rcu(|current| {
            let mut next = Profiles::clone(current);
            if let Some(endpoints) = next.get_mut(api_name) {
                endpoints.remove(endpoint_name);
            }
            next
        });
    }

    pub fn delete_api(&self, api_name: &str) {
        self.profiles.rcu(|current| {
            let mut next = Profiles::clone(current);
            next.remove(api_name);
            next
        });
    }

    /// Number of profiled endpoints across all APIs.
    pub fn len(&self) -> usize {
        self.profiles.load().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
