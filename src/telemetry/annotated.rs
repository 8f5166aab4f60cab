//! Enriched trace produced by the annotator.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::profiles::EndpointProfile;
use crate::settings::ArgType;

/// Every value one argument took in a trace.
///
/// Instance keys encode position: `"."` for a scalar, `"[i]"` per array
/// level (e.g. `"[0][2]"`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgInstances {
    pub is_array: bool,
    pub instances: BTreeMap<String, String>,
}

impl ArgInstances {
    pub fn scalar(value: impl Into<String>) -> Self {
        let mut instances = BTreeMap::new();
        instances.insert(".".to_string(), value.into());
        Self {
            is_array: false,
            instances,
        }
    }

    /// Value recorded under `"."`, if the argument was a scalar.
    pub fn value(&self) -> Option<&str> {
        self.instances.get(".").map(String::as_str)
    }

    /// First value in instance-key order.
    pub fn first(&self) -> Option<&str> {
        self.instances.values().next().map(String::as_str)
    }
}

pub type ArgMap = BTreeMap<String, ArgInstances>;

#[derive(Debug, Clone, Default)]
pub struct AnnotatedTrace {
    pub api_name: String,
    pub api_endpoint_name: String,
    pub explicit_user_id: String,
    pub explicit_scopes: Vec<String>,
    pub auth_token: String,

    pub req_headers: ArgMap,
    pub req_cookies: ArgMap,
    pub req_url_path: ArgMap,
    pub req_url_query: ArgMap,
    pub req_body: ArgMap,
    pub resp_headers: ArgMap,
    pub resp_cookies: ArgMap,
    pub resp_body: ArgMap,

    pub resp_code: i32,
    pub source_address: String,
    pub destination_address: String,
    pub request_id: String,
    pub host: String,
    pub method: String,
    pub path: String,
    pub request_time: i64,
    pub response_time: i64,

    pub profile: Option<Arc<EndpointProfile>>,
}

impl AnnotatedTrace {
    /// Argument mapping for `arg_type`.
    pub fn args(&self, arg_type: ArgType) -> &ArgMap {
        match arg_type {
            ArgType::ReqUrlPath => &self.req_url_path,
            ArgType::ReqUrlQuery => &self.req_url_query,
            ArgType::ReqHeader => &self.req_headers,
            ArgType::ReqCookie => &self.req_cookies,
            ArgType::ReqBody => &self.req_body,
            ArgType::RespHeader => &self.resp_headers,
            ArgType::RespCookie => &self.resp_cookies,
            ArgType::RespBody => &self.resp_body,
        }
    }

    pub(crate) fn args_mut(&mut self, arg_type: ArgType) -> &mut ArgMap {
        match arg_type {
            ArgType::ReqUrlPath => &mut self.req_url_path,
            ArgType::ReqUrlQuery => &mut self.req_url_query,
            ArgType::ReqHeader => &mut self.req_headers,
            ArgType::ReqCookie => &mut self.req_cookies,
            ArgType::ReqBody => &mut self.req_body,
            ArgType::RespHeader => &mut self.resp_headers,
            ArgType::RespCookie => &mut self.resp_cookies,
            ArgType::RespBody => &mut self.resp_body,
        }
    }
}
