//! Diff records and the notification envelope.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::accessor::{ApiInfo, ApiType};

/// Kind of change between observed traffic and a spec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffType {
    #[default]
    #[serde(rename = "NO_DIFF")]
    NoDiff,
    #[serde(rename = "GENERAL_DIFF")]
    General,
    #[serde(rename = "SHADOW_DIFF")]
    Shadow,
    #[serde(rename = "ZOMBIE_DIFF")]
    Zombie,
}

impl DiffType {
    /// Severity rank; higher wins when both spec types report a diff.
    pub fn priority(self) -> u8 {
        match self {
            DiffType::NoDiff => 1,
            DiffType::General => 2,
            DiffType::Shadow => 3,
            DiffType::Zombie => 4,
        }
    }

    /// The more severe of `self` and `other` (`self` on a tie).
    pub fn highest(self, other: DiffType) -> DiffType {
        if other.priority() > self.priority() {
            other
        } else {
            self
        }
    }

    pub fn is_diff(self) -> bool {
        self != DiffType::NoDiff
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiffType::NoDiff => "NO_DIFF",
            DiffType::General => "GENERAL_DIFF",
            DiffType::Shadow => "SHADOW_DIFF",
            DiffType::Zombie => "ZOMBIE_DIFF",
        }
    }
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which spec a diff was computed against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpecType {
    Provided,
    Reconstructed,
    #[default]
    None,
}

/// One recorded spec change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    pub diff_type: DiffType,
    pub last_seen: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub new_spec: String,
    pub old_spec: String,
    pub spec_type: SpecType,
    pub spec_timestamp: DateTime<Utc>,
}

/// Content fingerprint used to deduplicate diffs within one API.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiffHash([u8; 32]);

impl DiffHash {
    /// `SHA-256(new_spec || old_spec)`, with the spec type appended when
    /// `spec_type` is given.
    pub fn compute(new_spec: &str, old_spec: &str, spec_type: Option<SpecType>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(new_spec.as_bytes());
        hasher.update(old_spec.as_bytes());
        if let Some(spec_type) = spec_type {
            let tag: &[u8] = match spec_type {
                SpecType::Provided => b"PROVIDED",
                SpecType::Reconstructed => b"RECONSTRUCTED",
                SpecType::None => b"NONE",
            };
            hasher.update(tag);
        }
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for DiffHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for DiffHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiffHash({})", hex::encode(&self.0[..8]))
    }
}

/// Public part of an API identity sent with notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInfoWithType {
    pub id: u32,
    pub name: String,
    pub port: u16,
    pub destination_namespace: String,
    pub has_provided_spec: bool,
    pub has_reconstructed_spec: bool,
    pub trace_source_id: Uuid,
    pub api_type: ApiType,
}

impl From<&ApiInfo> for ApiInfoWithType {
    fn from(info: &ApiInfo) -> Self {
        Self {
            id: info.id,
            name: info.name.clone(),
            port: info.port,
            destination_namespace: info.destination_namespace.clone(),
            has_provided_spec: info.has_provided_spec,
            has_reconstructed_spec: info.has_reconstructed_spec,
            trace_source_id: info.trace_source_id,
            api_type: info.api_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDiffs {
    pub api_info: ApiInfoWithType,
    pub diffs: Vec<Diff>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecDiffsNotification {
    pub diffs: ApiDiffs,
}

/// Envelope handed to the accessor's `notify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notificationType")]
pub enum Notification {
    SpecDiffsNotification(SpecDiffsNotification),
}

impl Notification {
    pub fn api_id(&self) -> u32 {
        match self {
            Notification::SpecDiffsNotification(n) => n.diffs.api_info.id,
        }
    }
}
