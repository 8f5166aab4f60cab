//! Argument extraction from headers, query strings and bodies.
//!
//! Every function here swallows malformed input and returns whatever it
//! could make sense of.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::telemetry::annotated::{ArgInstances, ArgMap};

/// Name given to a body whose JSON root is not an object.
pub const RAW_BODY_ARG: &str = "body_raw";

/// Split a `Cookie` request header into `(lowercase name, value)` pairs.
pub fn parse_cookie_header(raw: &str) -> Vec<(String, String)> {
    raw.split(';').filter_map(parse_cookie_pair).collect()
}

/// Cookie set by a `Set-Cookie` response header. Attributes are ignored.
pub fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    raw.split(';').next().and_then(parse_cookie_pair)
}

fn parse_cookie_pair(pair: &str) -> Option<(String, String)> {
    let (name, value) = pair.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    Some((name.to_ascii_lowercase(), value.to_string()))
}

/// Decode a `k=v&k=v` string. One value lands under `"."`, repeated keys
/// under `"[i]"`. Arrayness follows structure, so `is_array` stays false.
pub fn parse_urlencoded(raw: &str) -> ArgMap {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.trim().as_bytes()) {
        grouped
            .entry(key.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }

    grouped
        .into_iter()
        .map(|(key, values)| {
            let instances = if values.len() == 1 {
                let mut single = BTreeMap::new();
                single.insert(".".to_string(), values.into_iter().next().unwrap_or_default());
                single
            } else {
                values
                    .into_iter()
                    .enumerate()
                    .map(|(i, value)| (format!("[{i}]"), value))
                    .collect()
            };
            (
                key,
                ArgInstances {
                    is_array: false,
                    instances,
                },
            )
        })
        .collect()
}

fn is_form_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("wwwurlencoded") || content_type.contains("www-form-urlencoded")
}

/// Flatten a JSON body, or a url-encoded form when JSON decoding fails.
pub fn parse_body(body: &[u8], content_type: Option<&str>) -> ArgMap {
    if body.is_empty() {
        return ArgMap::new();
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(root) => flatten_json(&root),
        Err(_) => match content_type {
            Some(ct) if is_form_content_type(ct) => parse_urlencoded(&String::from_utf8_lossy(body)),
            _ => ArgMap::new(),
        },
    }
}

/// One entry per JSON leaf, named by dotted path with `[]` per array level.
pub fn flatten_json(root: &Value) -> ArgMap {
    let mut args = ArgMap::new();
    match root {
        Value::Object(_) => walk(root, "", ".", false, &mut args),
        _ => walk(root, RAW_BODY_ARG, ".", false, &mut args),
    }
    args
}

fn walk(value: &Value, name: &str, instance: &str, in_array: bool, args: &mut ArgMap) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_name = if name.is_empty() {
                    key.clone()
                } else {
                    format!("{name}.{key}")
                };
                walk(child, &child_name, instance, in_array, args);
            }
        }
        Value::Array(items) => {
            let child_name = format!("{name}[]");
            for (i, item) in items.iter().enumerate() {
                let child_instance = if in_array {
                    format!("{instance}[{i}]")
                } else {
                    format!("[{i}]")
                };
                walk(item, &child_name, &child_instance, true, args);
            }
        }
        scalar => {
            let entry = args.entry(name.to_string()).or_default();
            entry.is_array |= in_array;
            entry.instances.insert(instance.to_string(), scalar_string(scalar));
        }
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(value: &str) -> Option<&str> {
    let value = value.trim();
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim()).filter(|t| !t.is_empty())
}

/// JWT claims, read without verifying the signature.
pub fn decode_jwt_claims(token: &str) -> Option<Map<String, Value>> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(claims) => Some(claims),
        _ => None,
    }
}

/// Scopes carried by a `scopes` claim: a space separated string or an
/// array of strings.
pub fn scopes_claim(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => split_scopes(s),
        Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

pub fn split_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
