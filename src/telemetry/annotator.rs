//! Trace annotator: the first handler on the *trace* topic.
//!
//! # Responsibilities
//! - Resolve the api name and endpoint name of each trace
//! - Extract headers, cookies, query and body args into the eight arg maps
//! - Discover auth material (bearer JWTs and rule-typed args)
//! - Attach the endpoint profile, if one is known
//!
//! # Design Decisions
//! - Decode failures never fail the handler; a partially annotated trace is
//!   still appended
//! - Args are scanned in name order, so the "first" navigational arg is
//!   deterministic
//! - URL path args stay empty; filling them needs a spec to match path
//!   templates against

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::bus::AnalyticsMessage;
use crate::engine::{AnalyzerHandler, Annotation, Annotations, HandlerError, ProcessContext};
use crate::profiles::ProfileStore;
use crate::settings::{AnalyzeSettings, ArgIdentifier, ArgType, AuthInfoType};
use crate::telemetry::annotated::{AnnotatedTrace, ArgInstances, ArgMap};
use crate::telemetry::extract;
use crate::telemetry::types::{Common, Telemetry};

pub const ANNOTATOR_NAME: &str = "trace_annotator";
pub const ANNOTATOR_PRIORITY: i32 = 10;

/// Body arg always treated as navigational (JSON-RPC style routing).
const RPC_METHOD_ARG: &str = "method";
/// Arg name treated as a token even without an auth rule.
const ACCESS_TOKEN_ARG: &str = "access_token";

pub struct TraceAnnotator {
    settings: Arc<AnalyzeSettings>,
    profiles: Arc<ProfileStore>,
}

impl TraceAnnotator {
    pub fn new(settings: Arc<AnalyzeSettings>, profiles: Arc<ProfileStore>) -> Self {
        Self { settings, profiles }
    }

    /// Build the annotated form of `telemetry`.
    pub fn annotate(&self, telemetry: &Telemetry) -> AnnotatedTrace {
        let request = &telemetry.request;
        let response = &telemetry.response;
        let (path, query) = match request.path.split_once('?') {
            Some((path, query)) => (path, query),
            None => (request.path.as_str(), ""),
        };

        let mut annotated = AnnotatedTrace {
            api_name: self.settings.get_api_name(&request.host, path),
            resp_code: response.status_code.trim().parse().unwrap_or(0),
            source_address: telemetry.source_address.clone(),
            destination_address: telemetry.destination_address.clone(),
            request_id: telemetry.request_id.clone(),
            host: request.host.clone(),
            method: request.method.clone(),
            path: path.to_string(),
            request_time: request.common.time,
            response_time: response.common.time,
            ..Default::default()
        };

        annotate_headers(&mut annotated, &request.common, ArgType::ReqHeader, ArgType::ReqCookie);
        annotate_headers(&mut annotated, &response.common, ArgType::RespHeader, ArgType::RespCookie);
        annotated.req_url_query = extract::parse_urlencoded(query);
        annotated.req_body = parse_common_body(&request.common);
        annotated.resp_body = parse_common_body(&response.common);

        annotated.api_endpoint_name = self.endpoint_name(&annotated);
        self.annotate_rule_typed_args(&mut annotated);

        annotated.profile = self.profiles.get(&annotated.api_name, &annotated.api_endpoint_name);
        annotated
    }

    fn endpoint_name(&self, annotated: &AnnotatedTrace) -> String {
        let mut name = format!("{} {}", annotated.method, annotated.path);
        if let Some((arg, value)) = self.first_nav_arg(annotated) {
            name.push_str(&format!("URL:{arg}={value}"));
        }
        name
    }

    fn first_nav_arg<'a>(&self, annotated: &'a AnnotatedTrace) -> Option<(&'a str, &'a str)> {
        let api = &annotated.api_name;
        let in_query = annotated.req_url_query.iter().find(|(name, _)| {
            self.settings
                .is_nav_arg(&ArgIdentifier::new(api.as_str(), ArgType::ReqUrlQuery, name.as_str()))
        });
        let found = in_query.or_else(|| {
            annotated.req_body.iter().find(|(name, _)| {
                name.as_str() == RPC_METHOD_ARG
                    || self
                        .settings
                        .is_nav_arg(&ArgIdentifier::new(api.as_str(), ArgType::ReqBody, name.as_str()))
            })
        })?;
        Some((found.0.as_str(), found.1.first().unwrap_or_default()))
    }

    fn annotate_rule_typed_args(&self, annotated: &mut AnnotatedTrace) {
        let mut typed = Vec::new();
        for arg_type in [ArgType::ReqUrlQuery, ArgType::ReqBody] {
            for (name, instances) in annotated.args(arg_type) {
                let id = ArgIdentifier::new(annotated.api_name.as_str(), arg_type, name.as_str());
                let auth_type = if name == ACCESS_TOKEN_ARG {
                    Some(AuthInfoType::Token)
                } else {
                    self.settings.get_auth_type(&id)
                };
                // Only single-valued args carry auth info.
                if let (Some(auth_type), Some(value)) = (auth_type, instances.value()) {
                    typed.push((auth_type, value.to_string()));
                }
            }
        }

        for (auth_type, value) in typed {
            match auth_type {
                AuthInfoType::Token => annotate_jwt(annotated, &value),
                AuthInfoType::UserId => annotated.explicit_user_id = value,
                AuthInfoType::Scopes => annotated.explicit_scopes.extend(extract::split_scopes(&value)),
                AuthInfoType::None => {}
            }
        }
    }
}

fn annotate_headers(annotated: &mut AnnotatedTrace, common: &Common, header_type: ArgType, cookie_type: ArgType) {
    for header in &common.headers {
        let name = header.key.to_ascii_lowercase();
        match name.as_str() {
            "cookie" => {
                for (cookie, value) in extract::parse_cookie_header(&header.value) {
                    annotated.args_mut(cookie_type).insert(cookie, ArgInstances::scalar(value));
                }
            }
            "set-cookie" => {
                if let Some((cookie, value)) = extract::parse_set_cookie(&header.value) {
                    annotated.args_mut(cookie_type).insert(cookie, ArgInstances::scalar(value));
                }
            }
            "authorization" => match extract::bearer_token(&header.value) {
                Some(token) => annotate_jwt(annotated, token),
                None => {
                    annotated.args_mut(header_type).insert(name, ArgInstances::scalar(header.value.clone()));
                }
            },
            _ => {
                annotated.args_mut(header_type).insert(name, ArgInstances::scalar(header.value.clone()));
            }
        }
    }
}

fn parse_common_body(common: &Common) -> ArgMap {
    extract::parse_body(&common.body, common.header("content-type"))
}

fn annotate_jwt(annotated: &mut AnnotatedTrace, token: &str) {
    annotated.auth_token = token.to_string();
    let Some(claims) = extract::decode_jwt_claims(token) else {
        trace!(request_id = %annotated.request_id, "Token is not a decodable JWT");
        return;
    };
    if let Some(scopes) = claims.get("scopes") {
        annotated.explicit_scopes.extend(extract::scopes_claim(scopes));
    }
    if let Some(Value::String(sub)) = claims.get("sub") {
        annotated.explicit_user_id = sub.clone();
    }
}

#[async_trait]
impl AnalyzerHandler for TraceAnnotator {
    fn name(&self) -> &str {
        ANNOTATOR_NAME
    }

    fn priority(&self) -> i32 {
        ANNOTATOR_PRIORITY
    }

    async fn process(
        &self,
        _ctx: ProcessContext<'_>,
        message: &AnalyticsMessage,
        mut annotations: Annotations,
    ) -> Result<Annotations, HandlerError> {
        if let AnalyticsMessage::Trace(trace) = message {
            let annotated = self.annotate(&trace.telemetry);
            annotations.push(Annotation::Trace(Arc::new(annotated)));
        }
        Ok(annotations)
    }
}
