//! Analyze settings: API naming, navigational args, auth discovery.
//!
//! # Design Decisions
//! - All three rule sets sit behind one `RwLock`; the annotator only reads,
//!   admin and hot reload write
//! - Naming rules live in a `BTreeMap` so the first match is the
//!   lexicographically smallest api name
//! - Nav args are reference counted because several rule ids may name the
//!   same argument

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SettingsConfig;

/// Where an argument was found in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    ReqUrlPath,
    ReqUrlQuery,
    ReqHeader,
    ReqCookie,
    ReqBody,
    RespHeader,
    RespCookie,
    RespBody,
}

impl ArgType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArgType::ReqUrlPath => "req_url_path",
            ArgType::ReqUrlQuery => "req_url_query",
            ArgType::ReqHeader => "req_header",
            ArgType::ReqCookie => "req_cookie",
            ArgType::ReqBody => "req_body",
            ArgType::RespHeader => "resp_header",
            ArgType::RespCookie => "resp_cookie",
            ArgType::RespBody => "resp_body",
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully qualified argument name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArgIdentifier {
    pub api_name: String,
    pub arg_type: ArgType,
    pub name: String,
}

impl ArgIdentifier {
    pub fn new(api_name: impl Into<String>, arg_type: ArgType, name: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            arg_type,
            name: name.into(),
        }
    }
}

/// Traffic for `host` under `url_prefix` belongs to the rule's api.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiNamingRule {
    pub host: String,
    pub url_prefix: String,
}

/// What an argument carries for authentication purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthInfoType {
    None,
    Token,
    UserId,
    Scopes,
}

#[derive(Default)]
struct Rules {
    api_naming: BTreeMap<String, ApiNamingRule>,
    nav_arg_ids: HashMap<String, ArgIdentifier>,
    nav_arg_refs: HashMap<ArgIdentifier, usize>,
    auth_rule_ids: HashMap<String, ArgIdentifier>,
    auth_types: HashMap<ArgIdentifier, AuthInfoType>,
}

impl Rules {
    fn nav_arg_add_modify(&mut self, nav_arg_id: &str, arg: ArgIdentifier) {
        self.nav_arg_delete(nav_arg_id);
        *self.nav_arg_refs.entry(arg.clone()).or_insert(0) += 1;
        self.nav_arg_ids.insert(nav_arg_id.to_string(), arg);
    }

    fn nav_arg_delete(&mut self, nav_arg_id: &str) -> bool {
        let Some(prior) = self.nav_arg_ids.remove(nav_arg_id) else {
            return false;
        };
        if let Some(count) = self.nav_arg_refs.get_mut(&prior) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.nav_arg_refs.remove(&prior);
            }
        }
        true
    }

    fn auth_rule_add_modify(&mut self, rule_id: &str, arg: ArgIdentifier, auth_type: AuthInfoType) -> bool {
        self.auth_rule_delete(rule_id);
        if self.auth_types.contains_key(&arg) {
            return false;
        }
        self.auth_types.insert(arg.clone(), auth_type);
        self.auth_rule_ids.insert(rule_id.to_string(), arg);
        true
    }

    fn auth_rule_delete(&mut self, rule_id: &str) -> bool {
        match self.auth_rule_ids.remove(rule_id) {
            Some(arg) => {
                self.auth_types.remove(&arg);
                true
            }
            None => false,
        }
    }
}

/// Rule registry read by the trace annotator.
pub struct AnalyzeSettings {
    rules: RwLock<Rules>,
    revision_id: AtomicI64,
}

impl AnalyzeSettings {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Rules::default()),
            revision_id: AtomicI64::new(0),
        }
    }

    /// Build a registry preloaded with the configured rules.
    pub fn from_config(config: &SettingsConfig) -> Self {
        let settings = Self::new();
        settings.replace_all(config);
        settings
    }

    pub fn api_naming_rule_add_modify(&self, api_name: &str, rule: ApiNamingRule) {
        debug!(api_name, host = %rule.host, url_prefix = %rule.url_prefix, "API naming rule set");
        self.rules.write().api_naming.insert(api_name.to_string(), rule);
    }

    pub fn api_naming_rule_delete(&self, api_name: &str) -> bool {
        self.rules.write().api_naming.remove(api_name).is_some()
    }

    /// Api name for traffic to `host` at `path`; the host itself when no
    /// rule matches.
    pub fn get_api_name(&self, host: &str, path: &str) -> String {
        self.rules
            .read()
            .api_naming
            .iter()
            .find(|(_, rule)| rule.host == host && path.starts_with(&rule.url_prefix))
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| host.to_string())
    }

    /// Point `nav_arg_id` at `arg`, releasing whatever it named before.
    pub fn nav_arg_add_modify(&self, nav_arg_id: &str, arg: ArgIdentifier) {
        self.rules.write().nav_arg_add_modify(nav_arg_id, arg);
    }

    pub fn nav_arg_delete(&self, nav_arg_id: &str) -> bool {
        self.rules.write().nav_arg_delete(nav_arg_id)
    }

    pub fn is_nav_arg(&self, arg: &ArgIdentifier) -> bool {
        self.rules.read().nav_arg_refs.contains_key(arg)
    }

    /// Register an auth rule. Returns `false` when `arg` already has a type.
    pub fn auth_rule_add_modify(&self, rule_id: &str, arg: ArgIdentifier, auth_type: AuthInfoType) -> bool {
        self.rules.write().auth_rule_add_modify(rule_id, arg, auth_type)
    }

    pub fn auth_rule_delete(&self, rule_id: &str) -> bool {
        self.rules.write().auth_rule_delete(rule_id)
    }

    pub fn get_auth_type(&self, arg: &ArgIdentifier) -> Option<AuthInfoType> {
        self.rules.read().auth_types.get(arg).copied()
    }

    pub fn revision_id(&self) -> i64 {
        self.revision_id.load(Ordering::Acquire)
    }

    pub fn set_revision_id(&self, revision_id: i64) {
        self.revision_id.store(revision_id, Ordering::Release);
    }

    /// Swap every rule for the configured set and bump the revision.
    pub fn replace_all(&self, config: &SettingsConfig) {
        let mut rules = Rules::default();
        for rule in &config.api_naming_rules {
            rules.api_naming.insert(
                rule.api_name.clone(),
                ApiNamingRule {
                    host: rule.host.clone(),
                    url_prefix: rule.url_prefix.clone(),
                },
            );
        }
        for nav_arg in &config.nav_args {
            rules.nav_arg_add_modify(&nav_arg.id, nav_arg.arg.clone());
        }
        for auth_rule in &config.auth_rules {
            rules.auth_rule_add_modify(&auth_rule.id, auth_rule.arg.clone(), auth_rule.auth_type);
        }

        let (naming, nav, auth) = (rules.api_naming.len(), rules.nav_arg_ids.len(), rules.auth_rule_ids.len());
        *self.rules.write() = rules;
        let revision = self.revision_id.fetch_add(1, Ordering::AcqRel) + 1;
        info!(revision, naming_rules = naming, nav_args = nav, auth_rules = auth, "Analyze settings replaced");
    }
}

impl Default for AnalyzeSettings {
    fn default() -> Self {
        Self::new()
    }
}
