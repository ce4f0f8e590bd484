// ABOUTME: Shared test doubles for installation integration tests
// ABOUTME: In-memory store with failure injection and a platform stub enforcing single-use refresh tokens

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use omnya_auth::installation::{
    lock::KeyedLock,
    orchestrator::ProvisioningOrchestrator,
    platform::{PlatformClient, PlatformError, PlatformResult},
    service::InstallationService,
    store::{InstallationField, InstallationStore, StoreError, StoreResult},
    token_provider::TokenProvider,
    types::{CreateCustomValueRequest, CustomValue, InstallationRecord, TokenExchangeResult},
};
use omnya_auth::ProvisioningConfig;

pub const COMPANY_LOCATION_ID: &str = "companyOmnya";

/// In-memory installation store
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, InstallationRecord>>,
    fail_reads: AtomicBool,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert directly, bypassing failure injection and write counting
    pub fn seed(&self, record: InstallationRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.location_id.clone(), record);
    }

    pub fn record(&self, location_id: &str) -> Option<InstallationRecord> {
        self.records.lock().unwrap().get(location_id).cloned()
    }

    pub fn refresh_token(&self, location_id: &str) -> Option<String> {
        self.record(location_id).map(|r| r.refresh_token)
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, on: bool) {
        self.fail_inserts.store(on, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, on: bool) {
        self.fail_updates.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl InstallationStore for MemoryStore {
    async fn get(&self, location_id: &str) -> StoreResult<Option<InstallationRecord>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        Ok(self.record(location_id))
    }

    async fn insert(&self, record: &InstallationRecord) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected insert failure".to_string()));
        }

        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.location_id) {
            return Err(StoreError::Duplicate(record.location_id.clone()));
        }
        records.insert(record.location_id.clone(), record.clone());
        Ok(())
    }

    async fn update_field(
        &self,
        location_id: &str,
        field: InstallationField,
        value: &str,
    ) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected update failure".to_string()));
        }

        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(location_id)
            .ok_or_else(|| StoreError::NotFound(location_id.to_string()))?;
        match field {
            InstallationField::RefreshToken => record.refresh_token = value.to_string(),
            InstallationField::CompanyId => record.company_id = Some(value.to_string()),
            InstallationField::ProvisioningArtifactId => {
                record.provisioning_artifact_id = Some(value.to_string())
            }
        }
        Ok(())
    }
}

pub enum LocationTokenReply {
    Tokens {
        access_token: String,
        refresh_token: Option<String>,
    },
    Reject {
        status: u16,
        description: String,
    },
    Unreachable,
}

pub enum CustomValueReply {
    Created { id: Option<String> },
    Reject { status: u16, description: String },
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationTokenCall {
    pub company_token: String,
    pub company_id: String,
    pub location_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomValueCall {
    pub location_token: String,
    pub location_id: String,
    pub name: String,
    pub value: String,
}

#[derive(Default)]
struct AuthServer {
    /// Scripted grants: refresh token -> (access token, next refresh token)
    grants: HashMap<String, (String, String)>,
    valid: HashSet<String>,
    consumed: HashSet<String>,
    refresh_calls: Vec<String>,
    replays: usize,
    issued: usize,
    omit_rotation: bool,
    unreachable: bool,
    unreadable: bool,
    lifetime: Option<i64>,
}

/// Platform stub that behaves like a rotating OAuth server: every accepted
/// refresh token is invalidated and a new one issued. Presenting a consumed
/// token is counted as a replay and rejected.
pub struct StubPlatform {
    auth: Mutex<AuthServer>,
    refresh_delay: Mutex<Duration>,
    location_reply: Mutex<LocationTokenReply>,
    custom_value_reply: Mutex<CustomValueReply>,
    location_calls: Mutex<Vec<LocationTokenCall>>,
    custom_value_calls: Mutex<Vec<CustomValueCall>>,
}

impl StubPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            auth: Mutex::new(AuthServer::default()),
            refresh_delay: Mutex::new(Duration::ZERO),
            location_reply: Mutex::new(LocationTokenReply::Tokens {
                access_token: "lat".to_string(),
                refresh_token: Some("lrt".to_string()),
            }),
            custom_value_reply: Mutex::new(CustomValueReply::Created {
                id: Some("cv1".to_string()),
            }),
            location_calls: Mutex::new(Vec::new()),
            custom_value_calls: Mutex::new(Vec::new()),
        })
    }

    /// Accept `refresh_token` once, answering with `access_token` and `next_refresh_token`
    pub fn script_grant(&self, refresh_token: &str, access_token: &str, next_refresh_token: &str) {
        let mut auth = self.auth.lock().unwrap();
        auth.valid.insert(refresh_token.to_string());
        auth.grants.insert(
            refresh_token.to_string(),
            (access_token.to_string(), next_refresh_token.to_string()),
        );
    }

    /// Accept `refresh_token` once with generated tokens
    pub fn accept(&self, refresh_token: &str) {
        self.auth
            .lock()
            .unwrap()
            .valid
            .insert(refresh_token.to_string());
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    /// Answer refreshes without a new refresh token
    pub fn omit_rotation(&self) {
        self.auth.lock().unwrap().omit_rotation = true;
    }

    pub fn set_refresh_unreachable(&self) {
        self.auth.lock().unwrap().unreachable = true;
    }

    /// Consume the token, then answer with a body that cannot be decoded
    pub fn set_refresh_unreadable(&self) {
        self.auth.lock().unwrap().unreadable = true;
    }

    /// Override `expires_in` on refresh responses
    pub fn set_token_lifetime(&self, expires_in: i64) {
        self.auth.lock().unwrap().lifetime = Some(expires_in);
    }

    pub fn set_location_reply(&self, reply: LocationTokenReply) {
        *self.location_reply.lock().unwrap() = reply;
    }

    pub fn set_custom_value_reply(&self, reply: CustomValueReply) {
        *self.custom_value_reply.lock().unwrap() = reply;
    }

    pub fn replays(&self) -> usize {
        self.auth.lock().unwrap().replays
    }

    pub fn refresh_calls(&self) -> Vec<String> {
        self.auth.lock().unwrap().refresh_calls.clone()
    }

    pub fn location_calls(&self) -> Vec<LocationTokenCall> {
        self.location_calls.lock().unwrap().clone()
    }

    pub fn custom_value_calls(&self) -> Vec<CustomValueCall> {
        self.custom_value_calls.lock().unwrap().clone()
    }
}

pub fn token_result(access_token: &str, refresh_token: Option<&str>) -> TokenExchangeResult {
    TokenExchangeResult {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_in: Some(86399),
        token_type: Some("Bearer".to_string()),
        scope: None,
        location_id: None,
        user_id: None,
        plan_id: None,
    }
}

#[async_trait]
impl PlatformClient for StubPlatform {
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> PlatformResult<TokenExchangeResult> {
        let delay = *self.refresh_delay.lock().unwrap();

        let outcome = {
            let mut auth = self.auth.lock().unwrap();
            auth.refresh_calls.push(refresh_token.to_string());

            if auth.unreachable {
                Err(PlatformError::Transport("connection refused".to_string()))
            } else if auth.consumed.contains(refresh_token) {
                auth.replays += 1;
                Err(PlatformError::Rejected {
                    status: 400,
                    description: "Invalid grant: refresh token is invalid".to_string(),
                })
            } else if !auth.valid.remove(refresh_token) {
                Err(PlatformError::Rejected {
                    status: 401,
                    description: "Invalid grant: unknown refresh token".to_string(),
                })
            } else {
                auth.consumed.insert(refresh_token.to_string());
                auth.issued += 1;
                let issued = auth.issued;
                let (access, next) = auth
                    .grants
                    .remove(refresh_token)
                    .unwrap_or_else(|| (format!("at-{}", issued), format!("rt-{}", issued)));

                if auth.unreadable {
                    auth.valid.insert(next);
                    Err(PlatformError::InvalidResponse(
                        "expected value at line 1 column 1".to_string(),
                    ))
                } else if auth.omit_rotation {
                    // Token stays usable when the server does not rotate
                    auth.consumed.remove(refresh_token);
                    auth.valid.insert(refresh_token.to_string());
                    Ok(token_result(&access, None))
                } else {
                    auth.valid.insert(next.clone());
                    let mut result = token_result(&access, Some(&next));
                    if let Some(lifetime) = auth.lifetime {
                        result.expires_in = Some(lifetime);
                    }
                    Ok(result)
                }
            }
        };

        // The server has already acted on the token while the response travels back
        tokio::time::sleep(delay).await;
        outcome
    }

    async fn exchange_location_token(
        &self,
        company_token: &str,
        company_id: &str,
        location_id: &str,
    ) -> PlatformResult<TokenExchangeResult> {
        self.location_calls.lock().unwrap().push(LocationTokenCall {
            company_token: company_token.to_string(),
            company_id: company_id.to_string(),
            location_id: location_id.to_string(),
        });

        match &*self.location_reply.lock().unwrap() {
            LocationTokenReply::Tokens {
                access_token,
                refresh_token,
            } => Ok(token_result(access_token, refresh_token.as_deref())),
            LocationTokenReply::Reject {
                status,
                description,
            } => Err(PlatformError::Rejected {
                status: *status,
                description: description.clone(),
            }),
            LocationTokenReply::Unreachable => {
                Err(PlatformError::Transport("connection reset".to_string()))
            }
        }
    }

    async fn create_custom_value(
        &self,
        location_token: &str,
        location_id: &str,
        request: &CreateCustomValueRequest,
    ) -> PlatformResult<CustomValue> {
        self.custom_value_calls.lock().unwrap().push(CustomValueCall {
            location_token: location_token.to_string(),
            location_id: location_id.to_string(),
            name: request.name.clone(),
            value: request.value.clone(),
        });

        match &*self.custom_value_reply.lock().unwrap() {
            CustomValueReply::Created { id } => Ok(CustomValue {
                id: id.clone(),
                name: Some(request.name.clone()),
                field_key: Some(format!("{{{{ custom_values.{} }}}}", request.name)),
                value: Some(request.value.clone()),
                location_id: Some(location_id.to_string()),
            }),
            CustomValueReply::Reject {
                status,
                description,
            } => Err(PlatformError::Rejected {
                status: *status,
                description: description.clone(),
            }),
            CustomValueReply::Unreachable => {
                Err(PlatformError::Transport("operation timed out".to_string()))
            }
        }
    }
}

pub fn token_provider(
    store: &Arc<MemoryStore>,
    platform: &Arc<StubPlatform>,
    locks: Arc<dyn KeyedLock>,
) -> TokenProvider {
    TokenProvider::new(store.clone(), platform.clone(), locks)
}

pub fn orchestrator(
    store: &Arc<MemoryStore>,
    platform: &Arc<StubPlatform>,
    locks: Arc<dyn KeyedLock>,
) -> ProvisioningOrchestrator {
    let tokens = Arc::new(TokenProvider::new(
        store.clone(),
        platform.clone(),
        locks.clone(),
    ));
    ProvisioningOrchestrator::new(
        tokens,
        platform.clone(),
        store.clone(),
        locks,
        ProvisioningConfig::default(),
    )
}

pub fn service(
    store: &Arc<MemoryStore>,
    platform: &Arc<StubPlatform>,
    locks: Arc<dyn KeyedLock>,
) -> InstallationService {
    InstallationService::new(
        store.clone(),
        platform.clone(),
        locks,
        ProvisioningConfig::default(),
    )
}
