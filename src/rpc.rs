// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! JSON-RPC style wire protocol
//!
//! One request or response per newline-terminated frame. Requests carry an
//! opaque `id` that the response echoes, so answers may arrive in any order.
//! Params use camelCase keys, results use snake_case keys.

use crate::error::QueryError;
use crate::query::{self, DatasetInfo, QueryEngine};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Protocol version tag carried by every response
pub const JSONRPC_VERSION: &str = "2.0";

// =============================================================================
// Error Codes
// =============================================================================

/// Frame is not valid JSON
pub const PARSE_ERROR: i64 = -32700;
/// Frame is JSON but not a request
pub const INVALID_REQUEST: i64 = -32600;
/// Unknown method name
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Params missing, mistyped or out of range
pub const INVALID_PARAMS: i64 = -32602;
/// Server-side failure
pub const INTERNAL_ERROR: i64 = -32603;
/// Graph still loading; retry later
pub const NOT_READY: i64 = -32001;
/// Unknown combo or card
pub const NOT_FOUND: i64 = -32004;

// =============================================================================
// Envelopes
// =============================================================================

/// A request frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlation id, echoed verbatim
    #[serde(default)]
    pub id: Value,
    /// Method name
    pub method: String,
    /// Method params (object or absent)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

/// Error body of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    /// Numeric error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
}

impl RpcError {
    /// Build an error with any code
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// `-32700`
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    /// `-32600`
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    /// `-32601`
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("unknown method: {method}"))
    }

    /// `-32602`
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    /// `-32603`
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    /// `-32001`
    #[must_use]
    pub fn not_ready() -> Self {
        Self::new(NOT_READY, "combo graph is still loading")
    }

    /// Whether a retry may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code == NOT_READY
    }
}

impl From<QueryError> for RpcError {
    fn from(err: QueryError) -> Self {
        let code = match err {
            QueryError::ComboNotFound(_) | QueryError::CardNotFound(_) => NOT_FOUND,
            QueryError::InvalidArgument(_) => INVALID_PARAMS,
        };
        Self::new(code, err.to_string())
    }
}

/// A response frame: exactly one of `result` and `error` is present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// The request id, or `null` when it could not be read
    #[serde(default)]
    pub id: Value,
    /// Success payload; may itself be `null`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

impl RpcResponse {
    /// Successful response
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response
    #[must_use]
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Response for a handler outcome
    #[must_use]
    pub fn from_outcome(id: Value, outcome: Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(error) => Self::failure(id, error),
        }
    }

    /// Serialize to a single line (no trailing newline)
    #[must_use]
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(
                r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{INTERNAL_ERROR},"message":"failed to encode response: {err}"}}}}"#
            )
        })
    }
}

/// Decode one frame. Failures come back as ready-to-send error responses.
pub fn parse_frame(line: &str) -> Result<RpcRequest, RpcResponse> {
    let value: Value = serde_json::from_str(line)
        .map_err(|err| RpcResponse::failure(Value::Null, RpcError::parse(err.to_string())))?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    if !value.is_object() {
        return Err(RpcResponse::failure(
            Value::Null,
            RpcError::invalid_request("request must be a JSON object"),
        ));
    }

    serde_json::from_value::<RpcRequest>(value)
        .map_err(|err| RpcResponse::failure(id, RpcError::invalid_request(err.to_string())))
}

// =============================================================================
// Methods
// =============================================================================

/// Every method the service answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Readiness and dataset summary
    Health,
    /// Method catalogue
    ListMethods,
    /// Single combo lookup
    GetComboById,
    /// Direct neighbors
    GetDistance1Combos,
    /// Two-hop neighbors
    GetDistance2Combos,
    /// Shared-card chains
    FindComboChainsFromCombo,
    /// Effect-to-prerequisite chains
    FindEnablingChains,
    /// Combos using a card
    SearchCombosByCard,
    /// Card centrality
    GetCardImportance,
    /// Connected packages
    FindComboPackages,
    /// Package grown from seed combos
    GetComboPackageById,
    /// Graph statistics
    GetGraphStatistics,
    /// Combos of one color identity
    GetCombosByColorIdentity,
    /// Ranked related combos
    GetRelatedCombos,
}

impl Method {
    /// All methods, in catalogue order
    pub const ALL: [Method; 14] = [
        Method::Health,
        Method::ListMethods,
        Method::GetComboById,
        Method::GetDistance1Combos,
        Method::GetDistance2Combos,
        Method::FindComboChainsFromCombo,
        Method::FindEnablingChains,
        Method::SearchCombosByCard,
        Method::GetCardImportance,
        Method::FindComboPackages,
        Method::GetComboPackageById,
        Method::GetGraphStatistics,
        Method::GetCombosByColorIdentity,
        Method::GetRelatedCombos,
    ];

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Health => "health",
            Method::ListMethods => "listMethods",
            Method::GetComboById => "getComboById",
            Method::GetDistance1Combos => "getDistance1Combos",
            Method::GetDistance2Combos => "getDistance2Combos",
            Method::FindComboChainsFromCombo => "findComboChainsFromCombo",
            Method::FindEnablingChains => "findEnablingChains",
            Method::SearchCombosByCard => "searchCombosByCard",
            Method::GetCardImportance => "getCardImportance",
            Method::FindComboPackages => "findComboPackages",
            Method::GetComboPackageById => "getComboPackageById",
            Method::GetGraphStatistics => "getGraphStatistics",
            Method::GetCombosByColorIdentity => "getCombosByColorIdentity",
            Method::GetRelatedCombos => "getRelatedCombos",
        }
    }

    /// Look a method up by wire name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    /// Answered even while the graph loads
    #[must_use]
    pub fn is_ungated(self) -> bool {
        matches!(self, Method::Health | Method::ListMethods)
    }

    /// Runs on the blocking pool
    #[must_use]
    pub fn is_expensive(self) -> bool {
        matches!(
            self,
            Method::FindComboChainsFromCombo
                | Method::FindEnablingChains
                | Method::GetCardImportance
                | Method::FindComboPackages
                | Method::GetComboPackageById
                | Method::GetGraphStatistics
                | Method::GetRelatedCombos
        )
    }

    fn params(self) -> &'static [&'static str] {
        match self {
            Method::Health | Method::ListMethods | Method::GetGraphStatistics => &[],
            Method::GetComboById | Method::GetDistance1Combos | Method::GetDistance2Combos => {
                &["comboId"]
            }
            Method::FindComboChainsFromCombo | Method::FindEnablingChains => {
                &["comboId", "maxDepth?"]
            }
            Method::SearchCombosByCard => &["cardName", "limit?"],
            Method::GetCardImportance => &["cardName?", "limit?"],
            Method::FindComboPackages => &["minSharedCards?", "limit?"],
            Method::GetComboPackageById => &["comboIds", "minSharedCards?", "expand?"],
            Method::GetCombosByColorIdentity => &["colorIdentity", "limit?"],
            Method::GetRelatedCombos => &["comboId", "limit?"],
        }
    }

    fn description(self) -> &'static str {
        match self {
            Method::Health => "Readiness status and dataset summary",
            Method::ListMethods => "This catalogue",
            Method::GetComboById => "A combo with per-card popularity, or null",
            Method::GetDistance1Combos => "Combos sharing at least one card",
            Method::GetDistance2Combos => "Combos exactly two hops away, with connecting paths",
            Method::FindComboChainsFromCombo => "Simple paths over shared cards",
            Method::FindEnablingChains => "Simple paths where effects satisfy prerequisites",
            Method::SearchCombosByCard => "Combos containing a card",
            Method::GetCardImportance => "Card centrality, or the top cards by degree",
            Method::FindComboPackages => "Connected groups under a shared-card threshold",
            Method::GetComboPackageById => "A package grown from seed combos",
            Method::GetGraphStatistics => "Aggregate graph statistics",
            Method::GetCombosByColorIdentity => "Combos of an exact color identity",
            Method::GetRelatedCombos => "Combos ranked by overlap and common neighbors",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalogue entry returned by `listMethods`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    /// Wire name
    pub name: String,
    /// Param names; optional ones end in `?`
    pub params: Vec<String>,
    /// One-line summary
    pub description: String,
}

/// The method catalogue
#[must_use]
pub fn catalogue() -> Vec<MethodInfo> {
    Method::ALL
        .into_iter()
        .map(|m| MethodInfo {
            name: m.as_str().to_string(),
            params: m.params().iter().map(|p| (*p).to_string()).collect(),
            description: m.description().to_string(),
        })
        .collect()
}

// =============================================================================
// Health
// =============================================================================

/// Service status reported by `health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Dataset load in progress
    Loading,
    /// Serving queries
    Ready,
    /// Dataset load failed
    Failed,
}

/// `health` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Current status
    pub status: HealthStatus,
    /// Combos in the graph (0 until ready)
    pub combos_loaded: usize,
    /// Distinct cards in the graph (0 until ready)
    pub cards_loaded: usize,
    /// Snapshot identity once ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetInfo>,
    /// When the graph became available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
}

impl HealthReport {
    /// Report for a graph that is not available
    #[must_use]
    pub fn unavailable(status: HealthStatus) -> Self {
        Self {
            status,
            combos_loaded: 0,
            cards_loaded: 0,
            dataset: None,
            loaded_at: None,
        }
    }

    /// Report for a ready engine
    #[must_use]
    pub fn ready(engine: &QueryEngine) -> Self {
        Self {
            status: HealthStatus::Ready,
            combos_loaded: engine.graph().combo_count(),
            cards_loaded: engine.graph().card_count(),
            dataset: Some(engine.dataset().clone()),
            loaded_at: Some(engine.dataset().loaded_at),
        }
    }

    /// Whether queries will be answered
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == HealthStatus::Ready
    }
}

// =============================================================================
// Params
// =============================================================================

fn default_chain_depth() -> i64 {
    query::DEFAULT_CHAIN_DEPTH
}

fn default_min_shared() -> i64 {
    query::DEFAULT_MIN_SHARED_CARDS
}

fn default_related_limit() -> i64 {
    query::DEFAULT_RELATED_LIMIT
}

fn default_expand() -> bool {
    true
}

/// `{comboId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComboIdParams {
    /// Combo id
    #[serde(alias = "combo_id")]
    pub combo_id: String,
}

/// `{comboId, maxDepth?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainParams {
    /// Origin combo
    #[serde(alias = "combo_id")]
    pub combo_id: String,
    /// Hops to explore
    #[serde(default = "default_chain_depth", alias = "max_depth")]
    pub max_depth: i64,
}

/// `{cardName, limit?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSearchParams {
    /// Exact card name
    #[serde(alias = "card_name")]
    pub card_name: String,
    /// Cap on returned combos
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// `{cardName?, limit?}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardImportanceParams {
    /// Card to score; absent for the ranking
    #[serde(default, alias = "card_name", skip_serializing_if = "Option::is_none")]
    pub card_name: Option<String>,
    /// Ranking length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// `{minSharedCards?, limit?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageParams {
    /// Edge weight threshold
    #[serde(default = "default_min_shared", alias = "min_shared_cards")]
    pub min_shared_cards: i64,
    /// Cap on returned packages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// `{comboIds, minSharedCards?, expand?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeededPackageParams {
    /// Seed combos
    #[serde(alias = "combo_ids")]
    pub combo_ids: Vec<String>,
    /// Edge weight threshold
    #[serde(default = "default_min_shared", alias = "min_shared_cards")]
    pub min_shared_cards: i64,
    /// Grow seeds to full components
    #[serde(default = "default_expand")]
    pub expand: bool,
}

/// `{colorIdentity, limit?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorIdentityParams {
    /// Identity to match, e.g. `"UB"`
    #[serde(alias = "color_identity")]
    pub color_identity: String,
    /// Cap on returned combos
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// `{comboId, limit?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedParams {
    /// Origin combo
    #[serde(alias = "combo_id")]
    pub combo_id: String,
    /// Cap on returned combos
    #[serde(default = "default_related_limit")]
    pub limit: i64,
}

/// Decode params, treating a missing body as `{}`
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|err| RpcError::invalid_params(err.to_string()))
}

pub(crate) fn to_value<T: Serialize>(result: &T) -> Result<Value, RpcError> {
    serde_json::to_value(result).map_err(|err| RpcError::internal(err.to_string()))
}

// =============================================================================
// Dispatch
// =============================================================================

/// Run one method against a ready engine
pub fn dispatch(engine: &QueryEngine, method: Method, params: Value) -> Result<Value, RpcError> {
    match method {
        Method::Health => to_value(&HealthReport::ready(engine)),
        Method::ListMethods => to_value(&catalogue()),
        Method::GetComboById => {
            let p: ComboIdParams = parse_params(params)?;
            to_value(&engine.combo(&p.combo_id))
        }
        Method::GetDistance1Combos => {
            let p: ComboIdParams = parse_params(params)?;
            to_value(&engine.distance1(&p.combo_id)?)
        }
        Method::GetDistance2Combos => {
            let p: ComboIdParams = parse_params(params)?;
            to_value(&engine.distance2(&p.combo_id)?)
        }
        Method::FindComboChainsFromCombo => {
            let p: ChainParams = parse_params(params)?;
            to_value(&engine.chains(&p.combo_id, p.max_depth)?)
        }
        Method::FindEnablingChains => {
            let p: ChainParams = parse_params(params)?;
            to_value(&engine.enabling_chains(&p.combo_id, p.max_depth)?)
        }
        Method::SearchCombosByCard => {
            let p: CardSearchParams = parse_params(params)?;
            to_value(&engine.combos_by_card(&p.card_name, p.limit))
        }
        Method::GetCardImportance => {
            let p: CardImportanceParams = parse_params(params)?;
            to_value(&engine.card_importance(p.card_name.as_deref(), p.limit)?)
        }
        Method::FindComboPackages => {
            let p: PackageParams = parse_params(params)?;
            to_value(&engine.packages(p.min_shared_cards, p.limit)?)
        }
        Method::GetComboPackageById => {
            let p: SeededPackageParams = parse_params(params)?;
            to_value(&engine.package_for(&p.combo_ids, p.min_shared_cards, p.expand)?)
        }
        Method::GetGraphStatistics => to_value(engine.statistics()),
        Method::GetCombosByColorIdentity => {
            let p: ColorIdentityParams = parse_params(params)?;
            to_value(&engine.combos_by_color_identity(&p.color_identity, p.limit)?)
        }
        Method::GetRelatedCombos => {
            let p: RelatedParams = parse_params(params)?;
            to_value(&engine.related(&p.combo_id, p.limit)?)
        }
    }
}

/// Resolve a method by name and run it
pub fn handle(engine: &QueryEngine, method: &str, params: Value) -> Result<Value, RpcError> {
    let method = Method::from_name(method).ok_or_else(|| RpcError::method_not_found(method))?;
    dispatch(engine, method, params)
}
