//! HTTP transport speaking GraphSON to the server's `/gremlin` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_LENGTH};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use super::{GremlinClient, GremlinConfig, Serializer};
use crate::element::{ElementId, Value};
use crate::error::{MapperError, Result};
use crate::result::{json_type, DetachedElement, GremlinResult, JsonMap};

const SCRIPT_LANGUAGE: &str = "gremlin-groovy";

const STATUS_SUCCESS: u64 = 200;
const STATUS_NO_CONTENT: u64 = 204;
const STATUS_PARTIAL_CONTENT: u64 = 206;

/// [`GremlinClient`] over HTTP POST.
///
/// Each statement travels as a standalone script request; the server runs it
/// in its own transaction.
#[derive(Clone, Debug)]
pub struct HttpGremlinClient {
    http: reqwest::Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
    accept: &'static str,
    max_content_length: usize,
}

impl HttpGremlinClient {
    /// Builds a client for `config`.
    ///
    /// Only the GraphSON serializers can be decoded over this transport.
    pub fn connect(config: &GremlinConfig) -> Result<Self> {
        config.validate()?;
        if config.serializer == Serializer::GraphbinaryV1 {
            return Err(MapperError::ConfigurationError(format!(
                "serializer '{}' is not supported over http",
                config.serializer
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MapperError::ConfigurationError(format!("http client: {e}")))?;
        Ok(Self {
            http,
            url: config.url(),
            username: config.username.clone(),
            password: config.password.clone(),
            accept: config.serializer.mime_type(),
            max_content_length: config.max_content_length,
        })
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl GremlinClient for HttpGremlinClient {
    async fn submit(&self, statement: &str) -> Result<Vec<GremlinResult>> {
        let body = json!({ "gremlin": statement, "language": SCRIPT_LANGUAGE });
        let mut request = self
            .http
            .post(&self.url)
            .header(ACCEPT, self.accept)
            .json(&body);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| MapperError::execution(statement, e))?;
        let http_status = response.status().as_u16();

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_content_length) {
            return Err(self.too_large(statement));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MapperError::execution(statement, e))?;
        if bytes.len() > self.max_content_length {
            return Err(self.too_large(statement));
        }
        if bytes.is_empty() {
            if http_status == STATUS_NO_CONTENT as u16 {
                return Ok(Vec::new());
            }
            return Err(MapperError::execution(
                statement,
                format!("empty response with http status {http_status}"),
            ));
        }

        let payload: JsonValue = serde_json::from_slice(&bytes)
            .map_err(|e| MapperError::execution(statement, format!("malformed response: {e}")))?;
        decode_response(statement, http_status, &payload)
    }
}

impl HttpGremlinClient {
    fn too_large(&self, statement: &str) -> MapperError {
        MapperError::execution(
            statement,
            format!(
                "response exceeds max content length of {} bytes",
                self.max_content_length
            ),
        )
    }
}

/// Decodes a server response envelope into rows.
pub fn decode_response(
    statement: &str,
    http_status: u16,
    payload: &JsonValue,
) -> Result<Vec<GremlinResult>> {
    let status = payload.get("status");
    let code = status
        .and_then(|s| s.get("code"))
        .and_then(JsonValue::as_u64)
        .unwrap_or(u64::from(http_status));
    match code {
        STATUS_SUCCESS | STATUS_PARTIAL_CONTENT => {}
        STATUS_NO_CONTENT => return Ok(Vec::new()),
        _ => {
            let message = status
                .and_then(|s| s.get("message"))
                .and_then(JsonValue::as_str)
                .filter(|m| !m.is_empty())
                .map(str::to_owned)
                .or_else(|| payload.get("message").and_then(JsonValue::as_str).map(str::to_owned))
                .unwrap_or_else(|| format!("server returned status {code}"));
            warn!(%statement, code, %message, "statement rejected");
            return Err(MapperError::execution(statement, message));
        }
    }

    let data = payload
        .get("result")
        .and_then(|r| r.get("data"))
        .unwrap_or(&JsonValue::Null);
    let rows = decode_data(data)?;
    debug!(rows = rows.len(), "decoded response");
    Ok(rows)
}

fn decode_data(data: &JsonValue) -> Result<Vec<GremlinResult>> {
    match data {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::Array(items) => items.iter().map(decode_item).collect(),
        JsonValue::Object(map) if type_tag(map) == Some("g:List") => match map.get("@value") {
            Some(JsonValue::Array(items)) => items.iter().map(decode_item).collect(),
            Some(other) => Err(MapperError::shape(json_type(other), "g:List without a list payload")),
            None => Ok(Vec::new()),
        },
        other => Ok(vec![decode_item(other)?]),
    }
}

fn type_tag(map: &JsonMap) -> Option<&str> {
    map.get("@type").and_then(JsonValue::as_str)
}

fn decode_item(item: &JsonValue) -> Result<GremlinResult> {
    let JsonValue::Object(map) = item else {
        return Ok(GremlinResult::Scalar(item.clone()));
    };
    let payload = map.get("@value").unwrap_or(&JsonValue::Null);
    match type_tag(map) {
        Some("g:Vertex") => decode_vertex(payload).map(GremlinResult::Detached),
        Some("g:Edge") => decode_edge(payload).map(GremlinResult::Detached),
        Some("g:Map") => match untype(item) {
            JsonValue::Object(object) => Ok(GremlinResult::Map(object)),
            other => Ok(GremlinResult::Scalar(other)),
        },
        Some(_) => Ok(GremlinResult::Scalar(untype(item))),
        None => match untype(item) {
            JsonValue::Object(object) => Ok(GremlinResult::Map(object)),
            other => Ok(GremlinResult::Scalar(other)),
        },
    }
}

fn element_header(payload: &JsonValue, kind: &str) -> Result<(ElementId, String)> {
    let id = payload
        .get("id")
        .and_then(ElementId::from_json)
        .ok_or_else(|| MapperError::shape(format!("g:{kind}"), "missing or invalid id"))?;
    let label = payload
        .get("label")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_owned();
    Ok((id, label))
}

fn decode_vertex(payload: &JsonValue) -> Result<DetachedElement> {
    let (id, label) = element_header(payload, "Vertex")?;
    let mut vertex = DetachedElement::vertex(id, label);
    if let Some(JsonValue::Object(properties)) = payload.get("properties") {
        for (key, entries) in properties {
            // Multi-valued properties keep the first value.
            let first = match untype_shallow(entries) {
                JsonValue::Array(list) => list.first().cloned(),
                _ => None,
            };
            let value = first
                .map(|entry| untype_shallow(&entry))
                .and_then(|entry| entry.get("value").cloned())
                .unwrap_or(JsonValue::Null);
            vertex = vertex.with_property(key.clone(), Value::from_json(&untype(&value)));
        }
    }
    Ok(vertex)
}

fn decode_edge(payload: &JsonValue) -> Result<DetachedElement> {
    let (id, label) = element_header(payload, "Edge")?;
    let endpoint = |key: &str| {
        payload
            .get(key)
            .and_then(ElementId::from_json)
            .ok_or_else(|| MapperError::shape("g:Edge", format!("missing {key}")))
    };
    let mut edge = DetachedElement::edge(id, label, endpoint("outV")?, endpoint("inV")?);
    if let Some(JsonValue::Object(properties)) = payload.get("properties") {
        for (key, property) in properties {
            let property = untype_shallow(property);
            let value = property.get("value").unwrap_or(&property);
            edge = edge.with_property(key.clone(), Value::from_json(&untype(value)));
        }
    }
    Ok(edge)
}

fn untype_shallow(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) if type_tag(map).is_some() => {
            map.get("@value").cloned().unwrap_or(JsonValue::Null)
        }
        other => other.clone(),
    }
}

/// Strips GraphSON type wrappers recursively.
///
/// `g:Map` flat key/value lists become objects, `g:List` and `g:Set` become
/// arrays and JanusGraph relation identifiers collapse to their string form.
pub fn untype(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(untype).collect()),
        JsonValue::Object(map) => match type_tag(map) {
            Some("g:Map") => {
                let mut object = JsonMap::new();
                if let Some(JsonValue::Array(flat)) = map.get("@value") {
                    for pair in flat.chunks(2) {
                        let key = match untype(&pair[0]) {
                            JsonValue::String(s) => s,
                            other => other.to_string(),
                        };
                        let value = pair.get(1).map(untype).unwrap_or(JsonValue::Null);
                        object.insert(key, value);
                    }
                }
                JsonValue::Object(object)
            }
            Some(_) => map.get("@value").map(untype).unwrap_or(JsonValue::Null),
            None => match map.get("relationId") {
                Some(JsonValue::String(relation)) if map.len() == 1 => {
                    JsonValue::String(relation.clone())
                }
                _ => JsonValue::Object(
                    map.iter().map(|(k, v)| (k.clone(), untype(v))).collect(),
                ),
            },
        },
        other => other.clone(),
    }
}
