//! In-memory stand-in for the Dataverse metadata API
//!
//! Stores created objects by technical name, answers existence queries the
//! way the Web API does (404 for metadata, empty `value` for entity sets), and
//! lets a test script failures for requests matching a path fragment.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use erd_deploy::erd_core::{generate, parse_erd, DeploymentPlan, NamingConfig};
use erd_deploy::{
    AccessToken, ApiRequest, ApiResponse, AuthError, CredentialProvider, DataverseClient,
    DeployConfig, Method, Orchestrator, Transport, TransportError,
};

pub const CUSTOMER_ORDER: &str = "erDiagram\n  Customer { string id PK }\n  Order { string id PK }\n  Customer ||--o{ Order : places\n";

// =============================================================================
// FAKE PLATFORM
// =============================================================================

#[derive(Debug, Clone)]
pub struct LoggedRequest {
    pub method: Method,
    pub path: String,
    pub bearer: String,
    pub at: Instant,
}

struct Script {
    method: Method,
    fragment: String,
    responses: VecDeque<Result<ApiResponse, TransportError>>,
}

#[derive(Default)]
struct State {
    /// kind → technical name → id
    objects: HashMap<&'static str, HashMap<String, String>>,
    log: Vec<LoggedRequest>,
    scripts: Vec<Script>,
    rejected_tokens: HashSet<String>,
    next_id: u64,
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer the next matching requests with `responses`, in order
    pub fn script(&self, method: Method, fragment: &str, responses: Vec<ApiResponse>) {
        self.script_results(method, fragment, responses.into_iter().map(Ok).collect());
    }

    pub fn script_results(
        &self,
        method: Method,
        fragment: &str,
        responses: Vec<Result<ApiResponse, TransportError>>,
    ) {
        self.lock().scripts.push(Script {
            method,
            fragment: fragment.to_string(),
            responses: responses.into(),
        });
    }

    /// Every request carrying this bearer gets a 401
    pub fn reject_token(&self, secret: &str) {
        self.lock().rejected_tokens.insert(secret.to_string());
    }

    /// Pre-create an object as if an earlier run had made it
    pub fn seed(&self, kind: &'static str, name: &str) -> String {
        let mut state = self.lock();
        let id = next_id(&mut state);
        state
            .objects
            .entry(kind)
            .or_default()
            .insert(name.to_string(), id.clone());
        id
    }

    pub fn count(&self, kind: &str) -> usize {
        self.lock().objects.get(kind).map_or(0, HashMap::len)
    }

    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.lock()
            .objects
            .get(kind)
            .map_or(false, |objects| objects.contains_key(name))
    }

    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.lock().log.clone()
    }

    pub fn requests_to(&self, method: Method, fragment: &str) -> Vec<LoggedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path.contains(fragment))
            .collect()
    }

    pub fn post_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == Method::Post)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn respond(&self, request: &ApiRequest, bearer: &str) -> Result<ApiResponse, TransportError> {
        let mut state = self.lock();
        state.log.push(LoggedRequest {
            method: request.method,
            path: request.path.clone(),
            bearer: bearer.to_string(),
            at: Instant::now(),
        });

        if state.rejected_tokens.contains(bearer) {
            return Ok(odata_error(401, "0x80048306", "The access token is invalid."));
        }

        let scripted = state
            .scripts
            .iter_mut()
            .find(|s| {
                s.method == request.method
                    && request.path.contains(&s.fragment)
                    && !s.responses.is_empty()
            })
            .and_then(|s| s.responses.pop_front());
        if let Some(response) = scripted {
            return response;
        }

        Ok(match request.method {
            Method::Get => handle_get(&state, request),
            Method::Post => handle_post(&mut state, request),
        })
    }
}

#[async_trait]
impl Transport for FakePlatform {
    async fn send(&self, request: &ApiRequest, bearer: &str) -> Result<ApiResponse, TransportError> {
        self.respond(request, bearer)
    }
}

fn next_id(state: &mut State) -> String {
    state.next_id += 1;
    format!("00000000-0000-0000-0000-{:012x}", state.next_id)
}

/// Which store a path addresses, keyed on its last segment
fn kind_of(path: &str) -> &'static str {
    let last = path.rsplit('/').next().unwrap_or(path);
    if last.starts_with("publishers") {
        "publisher"
    } else if last.starts_with("solutioncomponents") || last.starts_with("AddSolutionComponent") {
        "component"
    } else if last.starts_with("solutions") {
        "solution"
    } else if last.starts_with("GlobalOptionSetDefinitions") {
        "choice_set"
    } else if last.starts_with("RelationshipDefinitions") {
        "relationship"
    } else if last.starts_with("Attributes") {
        "column"
    } else if last.starts_with("Keys") {
        "key"
    } else {
        "entity"
    }
}

/// `EntityDefinitions(LogicalName='cr1_order')` → `cr1_order`
fn quoted_key(segment: &str) -> Option<String> {
    let start = segment.find("='")? + 2;
    let end = segment.rfind("')")?;
    Some(segment[start..end].replace("''", "'"))
}

/// `uniquename eq 'Contoso'` → `Contoso`
fn filter_literal(filter: &str) -> Option<String> {
    let start = filter.find('\'')? + 1;
    let end = filter.rfind('\'')?;
    (end > start).then(|| filter[start..end].replace("''", "'"))
}

/// Store key: columns and keys are qualified by their entity
fn store_name(path: &str, name: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() > 1 {
        let entity = quoted_key(segments[0]).unwrap_or_default();
        format!("{}.{}", entity, name)
    } else {
        name.to_string()
    }
}

fn handle_get(state: &State, request: &ApiRequest) -> ApiResponse {
    let kind = kind_of(&request.path);
    let store = state.objects.get(kind);

    match kind {
        "publisher" | "solution" | "component" => {
            let filter = request.query_value("$filter").unwrap_or_default();
            let (name, id_field) = match kind {
                "component" => (
                    filter
                        .strip_prefix("objectid eq ")
                        .and_then(|rest| rest.split_whitespace().next())
                        .unwrap_or_default()
                        .to_string(),
                    "solutioncomponentid",
                ),
                "publisher" => (filter_literal(filter).unwrap_or_default(), "publisherid"),
                _ => (filter_literal(filter).unwrap_or_default(), "solutionid"),
            };
            let rows: Vec<Value> = store
                .and_then(|s| s.get(&name))
                .map(|id| vec![json!({ id_field: id })])
                .unwrap_or_default();
            ApiResponse::new(200).with_json(&json!({ "value": rows }))
        }
        _ => {
            let last = request.path.rsplit('/').next().unwrap_or_default();
            let name = store_name(&request.path, &quoted_key(last).unwrap_or_default());
            match store.and_then(|s| s.get(&name)) {
                Some(id) => ApiResponse::new(200).with_json(&json!({ "MetadataId": id })),
                None => odata_error(404, "0x80060888", "Could not find the object."),
            }
        }
    }
}

fn handle_post(state: &mut State, request: &ApiRequest) -> ApiResponse {
    let kind = kind_of(&request.path);
    let body = request.body.clone().unwrap_or(Value::Null);
    let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_string);

    let name = match kind {
        "publisher" | "solution" => field("uniquename"),
        "component" => field("ComponentId"),
        "choice_set" => field("Name"),
        "relationship" => field("SchemaName"),
        _ => field("SchemaName").map(|s| store_name(&request.path, &s.to_lowercase())),
    };
    let Some(name) = name else {
        return odata_error(400, "0x80040203", "Required field is missing.");
    };
    if state
        .objects
        .get(kind)
        .map_or(false, |s| s.contains_key(&name))
    {
        return odata_error(400, "0x80044363", "An object with the same name already exists.");
    }

    let id = next_id(state);
    state
        .objects
        .entry(kind)
        .or_default()
        .insert(name, id.clone());

    if kind == "component" {
        return ApiResponse::new(200).with_json(&json!({ "id": id }));
    }
    ApiResponse::new(204).with_header(
        "OData-EntityId",
        format!("https://fake.crm.dynamics.com/api/data/v9.2/{}({})", request.path, id),
    )
}

pub fn odata_error(status: u16, code: &str, message: &str) -> ApiResponse {
    ApiResponse::new(status).with_json(&json!({ "error": { "code": code, "message": message } }))
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Hands out `token-1`, `token-2`, … on each fetch
#[derive(Default)]
pub struct SequenceProvider {
    fetches: AtomicUsize,
}

#[async_trait]
impl CredentialProvider for SequenceProvider {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken::new(format!("token-{}", n), None))
    }
}

/// Succeeds `remaining` times, then fails
pub struct FailingAfterProvider {
    pub remaining: AtomicUsize,
}

#[async_trait]
impl CredentialProvider for FailingAfterProvider {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return Err(AuthError::Provider("identity endpoint unreachable".into()));
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        Ok(AccessToken::new(format!("token-{}", left), None))
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

pub fn test_config() -> DeployConfig {
    let mut config = DeployConfig::from_yaml_str(
        "environment_url: https://fake.crm.dynamics.com\npublisher:\n  display_name: Contoso\n  prefix: cr1\nsolution:\n  display_name: Order Management\nretry:\n  max_attempts: 4\n  base_delay_ms: 100\n  max_delay_ms: 10000\n",
    )
    .unwrap();
    config.max_concurrency = 2;
    config
}

pub fn plan_for(diagram: &str) -> DeploymentPlan {
    let parsed = parse_erd(diagram).unwrap();
    let naming = NamingConfig::new("cr1", "Contoso", "Order Management");
    generate(&parsed.graph, &[], &naming, &Default::default())
        .unwrap()
        .plan
}

pub fn orchestrator(
    platform: &Arc<FakePlatform>,
    provider: Arc<dyn CredentialProvider>,
    max_concurrency: usize,
) -> Orchestrator {
    let config = test_config();
    let client = DataverseClient::with_transport(
        platform.clone(),
        provider,
        config.retry_policy(),
        config.token_refresh_margin(),
    );
    Orchestrator::new(client).with_max_concurrency(max_concurrency)
}

pub fn sequence_provider() -> Arc<dyn CredentialProvider> {
    Arc::new(SequenceProvider::default())
}
