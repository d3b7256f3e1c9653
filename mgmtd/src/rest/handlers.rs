use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errmap;
use crate::metrics::CoreStatistics;
use crate::model::NfType;
use crate::store::{
    ChangeKind, ClientId, Collection, DataPath, DataStore, EditOp, EditOperation, EntryKey, StoreError, Target,
};

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn DataStore>,
}

// =============================================================================
// Errors
// =============================================================================

/// One entry of an RFC 8040 error body.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct RestconfError {
    pub error_type: String,
    pub error_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_app_tag: Option<String>,
    pub error_message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RestconfErrorList {
    pub error: Vec<RestconfError>,
}

/// API error response (`ietf-restconf:errors`)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    #[serde(rename = "ietf-restconf:errors")]
    pub errors: RestconfErrorList,
    #[serde(skip)]
    pub code: u16,
}

impl ApiError {
    fn new(code: u16, error_type: &str, tag: &str, app_tag: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            errors: RestconfErrorList {
                error: vec![RestconfError {
                    error_type: error_type.to_string(),
                    error_tag: tag.to_string(),
                    error_app_tag: app_tag.map(str::to_string),
                    error_message: message.into(),
                }],
            },
            code,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(400, "protocol", "malformed-message", None, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        StoreError::InvalidEdit(message.into()).into()
    }

    /// The first error tag, for logs and tests.
    pub fn tag(&self) -> &str {
        self.errors.error.first().map_or("", |e| e.error_tag.as_str())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let wire = errmap::for_error(&e);
        ApiError::new(
            wire.http_status.as_u16(),
            wire.error_type,
            wire.error_tag,
            wire.error_app_tag,
            e.to_string(),
        )
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// RESTCONF root resource
#[utoipa::path(
    get,
    path = "/restconf",
    responses(
        (status = 200, description = "RESTCONF root resource")
    ),
    tag = "restconf"
)]
pub async fn get_root() -> Json<Value> {
    Json(json!({
        "ietf-restconf:restconf": {
            "data": {},
            "operations": {},
            "yang-library-version": "2019-01-04"
        }
    }))
}

/// Root resource discovery (RFC 8040 section 3.1)
#[utoipa::path(
    get,
    path = "/.well-known/host-meta",
    responses(
        (status = 200, description = "XRD document pointing at the RESTCONF root")
    ),
    tag = "restconf"
)]
pub async fn host_meta() -> Response {
    (
        [(header::CONTENT_TYPE, "application/xrd+xml")],
        "<XRD xmlns='http://docs.oasis-open.org/ns/xri/xrd-1.0'><Link rel='restconf' href='/restconf'/></XRD>",
    )
        .into_response()
}

// =============================================================================
// Data resources
// =============================================================================

/// Read the whole running tree
#[utoipa::path(
    get,
    path = "/restconf/data",
    responses(
        (status = 200, description = "All collections, wrapped by collection name")
    ),
    tag = "data"
)]
pub async fn get_data_root(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.store.read(Target::Running, &DataPath::Root)?))
}

/// Read a collection or entry
#[utoipa::path(
    get,
    path = "/restconf/data/{path}",
    params(
        ("path" = String, Path, description = "Resource path, e.g. subscribers/001010000000001 or network-functions/amf/amf-1")
    ),
    responses(
        (status = 200, description = "Resource in collection-wrapper shape"),
        (status = 404, description = "Path does not resolve", body = ApiError)
    ),
    tag = "data"
)]
pub async fn get_data(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let path = DataPath::parse(&path)?;
    Ok(Json(state.store.read(Target::Running, &path)?))
}

/// Create entries in a collection
#[utoipa::path(
    post,
    path = "/restconf/data/{path}",
    params(
        ("path" = String, Path, description = "Collection path, e.g. subscribers or network-functions/amf")
    ),
    request_body(content = Object, description = "A bare entry or a collection wrapper"),
    responses(
        (status = 201, description = "Created; Location names the first entry"),
        (status = 400, description = "Invalid entry or dangling reference", body = ApiError),
        (status = 409, description = "Entry already exists", body = ApiError)
    ),
    tag = "data"
)]
pub async fn post_data(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let path = DataPath::parse(&path)?;
    if matches!(path, DataPath::Entry(_) | DataPath::Root) {
        return Err(ApiError::invalid(format!("POST requires a collection path, got '{}'", path)));
    }
    let entries = body_entries(&path, parse_body(&body)?, true)?;
    let location = entries
        .first()
        .map(|(key, _)| format!("/restconf/data/{}", key))
        .ok_or_else(|| ApiError::invalid("request body contains no entries"))?;

    let ops = entries
        .into_iter()
        .map(|(key, value)| EditOperation::new(key, EditOp::Create, Some(value)))
        .collect();
    state.store.apply_direct(&ClientId::restconf(), ops)?;

    let mut response = StatusCode::CREATED.into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    Ok(response)
}

/// Create or replace an entry
#[utoipa::path(
    put,
    path = "/restconf/data/{path}",
    params(
        ("path" = String, Path, description = "Entry path")
    ),
    request_body(content = Object, description = "The complete entry, bare or wrapped"),
    responses(
        (status = 201, description = "Entry created"),
        (status = 204, description = "Entry replaced"),
        (status = 400, description = "Invalid entry", body = ApiError)
    ),
    tag = "data"
)]
pub async fn put_data(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let path = DataPath::parse(&path)?;
    if !matches!(path, DataPath::Entry(_)) {
        return Err(ApiError::invalid(format!("PUT requires an entry path, got '{}'", path)));
    }
    let ops = body_entries(&path, parse_body(&body)?, false)?
        .into_iter()
        .map(|(key, value)| EditOperation::new(key, EditOp::Replace, Some(value)))
        .collect();
    let outcome = state.store.apply_direct(&ClientId::restconf(), ops)?;

    if outcome.changes.iter().any(|c| c.kind == ChangeKind::Created) {
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::NO_CONTENT)
    }
}

/// Merge into an entry or collection
#[utoipa::path(
    patch,
    path = "/restconf/data/{path}",
    params(
        ("path" = String, Path, description = "Entry or collection path")
    ),
    request_body(content = Object, description = "Partial entry, or a collection wrapper of partial entries"),
    responses(
        (status = 204, description = "Merged"),
        (status = 400, description = "Invalid entry", body = ApiError)
    ),
    tag = "data"
)]
pub async fn patch_data(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let path = DataPath::parse(&path)?;
    if path == DataPath::Root {
        return Err(ApiError::invalid("PATCH requires a collection or entry path"));
    }
    let ops: Vec<EditOperation> = body_entries(&path, parse_body(&body)?, false)?
        .into_iter()
        .map(|(key, value)| EditOperation::new(key, EditOp::Merge, Some(value)))
        .collect();
    if ops.is_empty() {
        return Err(ApiError::invalid("request body contains no entries"));
    }
    state.store.apply_direct(&ClientId::restconf(), ops)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete an entry
#[utoipa::path(
    delete,
    path = "/restconf/data/{path}",
    params(
        ("path" = String, Path, description = "Entry path")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Entry not found", body = ApiError),
        (status = 409, description = "Entry still referenced", body = ApiError)
    ),
    tag = "data"
)]
pub async fn delete_data(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<StatusCode, ApiError> {
    let DataPath::Entry(key) = DataPath::parse(&path)? else {
        return Err(ApiError::invalid(format!("DELETE requires an entry path, got '{}'", path)));
    };
    state
        .store
        .apply_direct(&ClientId::restconf(), vec![EditOperation::delete(key)])?;
    Ok(StatusCode::NO_CONTENT)
}

/// Derived counters, the same values the SNMP agent exposes
#[utoipa::path(
    get,
    path = "/restconf/statistics",
    responses(
        (status = 200, description = "Core statistics", body = CoreStatistics)
    ),
    tag = "statistics"
)]
pub async fn get_statistics(State(state): State<Arc<AppState>>) -> Json<CoreStatistics> {
    let snapshot = state.store.snapshot(Target::Running);
    Json(CoreStatistics::derive(&snapshot.tree, snapshot.version))
}

// =============================================================================
// Body decoding
// =============================================================================

fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(ApiError::malformed("request body must be a JSON object")),
        Err(e) => Err(ApiError::malformed(format!("invalid JSON: {}", e))),
    }
}

/// Split a request body into keyed entries for `path`.
///
/// Accepts a bare entry or the collection-wrapper shape used in responses.
fn body_entries(path: &DataPath, body: Value, generate_ids: bool) -> Result<Vec<(EntryKey, Value)>, ApiError> {
    let Value::Object(mut obj) = body else {
        return Err(ApiError::malformed("request body must be a JSON object"));
    };

    match path {
        DataPath::Root => Err(ApiError::invalid("writes must address a collection or entry")),
        DataPath::Entry(key) => {
            let wrapper = match key {
                EntryKey::NetworkFunction(t, _) => t.segment(),
                other => other.collection().name(),
            };
            let value = match obj.remove(wrapper) {
                Some(Value::Array(mut items)) if items.len() == 1 => items.remove(0),
                Some(Value::Array(_)) => {
                    return Err(ApiError::invalid(format!("'{}' must contain exactly one entry", wrapper)));
                }
                Some(single @ Value::Object(_)) if obj.is_empty() => single,
                Some(other) => {
                    // Not a wrapper after all; put the field back.
                    obj.insert(wrapper.to_string(), other);
                    Value::Object(obj)
                }
                None => Value::Object(obj),
            };
            Ok(vec![(key.clone(), value)])
        }
        DataPath::NfType(t) => {
            let items = match obj.remove(t.segment()) {
                Some(list) => items_of(list),
                None => vec![Value::Object(obj)],
            };
            items
                .into_iter()
                .map(|item| keyed(Collection::NetworkFunctions, Some(*t), item, false))
                .collect()
        }
        DataPath::Collection(Collection::NetworkFunctions) => {
            let body = match obj.remove(Collection::NetworkFunctions.name()) {
                Some(Value::Object(inner)) => inner,
                _ => obj,
            };
            let typed: Vec<NfType> = body.keys().filter_map(|k| k.parse().ok()).collect();
            if typed.is_empty() {
                // Bare entry: the type comes from the body.
                let nf_type = body
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(|t| t.parse::<NfType>().ok())
                    .ok_or_else(|| ApiError::invalid("network function needs a valid 'type'"))?;
                return Ok(vec![keyed(
                    Collection::NetworkFunctions,
                    Some(nf_type),
                    Value::Object(body),
                    false,
                )?]);
            }
            let mut body = body;
            let mut out = Vec::new();
            for nf_type in typed {
                if let Some(list) = body.remove(nf_type.segment()) {
                    for item in items_of(list) {
                        out.push(keyed(Collection::NetworkFunctions, Some(nf_type), item, false)?);
                    }
                }
            }
            Ok(out)
        }
        DataPath::Collection(c) => {
            let items = match obj.remove(c.name()) {
                Some(list) => items_of(list),
                None => vec![Value::Object(obj)],
            };
            items
                .into_iter()
                .map(|item| keyed(*c, None, item, generate_ids))
                .collect()
        }
    }
}

fn items_of(list: Value) -> Vec<Value> {
    match list {
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn keyed(
    collection: Collection,
    nf_type: Option<NfType>,
    mut item: Value,
    generate_ids: bool,
) -> Result<(EntryKey, Value), ApiError> {
    let key_leaf = collection.key_leaf();
    let Value::Object(obj) = &mut item else {
        return Err(ApiError::invalid(format!("{} entries must be objects", collection)));
    };
    let id = match obj.get(key_leaf) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        None if generate_ids && collection == Collection::Sessions => {
            let id = Uuid::new_v4().to_string();
            obj.insert(key_leaf.to_string(), Value::String(id.clone()));
            id
        }
        _ => return Err(ApiError::invalid(format!("{} entry is missing '{}'", collection, key_leaf))),
    };
    Ok((EntryKey::new(collection, nf_type, id)?, item))
}
