//! Scripted accounting API for tests.

use crate::credentials::TenantCredentials;
use crate::domain::period::TenantId;
use crate::ingest::client::{AccountingApi, Endpoint};
use crate::ingest::error::ApiError;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

type Responder = Box<dyn Fn(&Endpoint) -> Result<Value, ApiError> + Send + Sync>;

/// Answers from per-endpoint queues first, then from per-endpoint responders.
/// Unscripted endpoints fail with a transport error.
#[derive(Default)]
pub struct ScriptedApi {
    queued: Mutex<HashMap<&'static str, VecDeque<Result<Value, ApiError>>>>,
    responders: Mutex<HashMap<&'static str, Responder>>,
    calls: Mutex<Vec<(Endpoint, Instant)>>,
    latency: Mutex<HashMap<&'static str, Duration>>,
}

impl ScriptedApi {
    pub fn push(&self, label: &'static str, response: Result<Value, ApiError>) {
        self.queued
            .lock()
            .unwrap()
            .entry(label)
            .or_default()
            .push_back(response);
    }

    pub fn respond_with(
        &self,
        label: &'static str,
        f: impl Fn(&Endpoint) -> Result<Value, ApiError> + Send + Sync + 'static,
    ) {
        self.responders.lock().unwrap().insert(label, Box::new(f));
    }

    pub fn with_latency(&self, label: &'static str, d: Duration) {
        self.latency.lock().unwrap().insert(label, d);
    }

    pub fn calls(&self) -> Vec<(Endpoint, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, label: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e.label() == label)
            .count()
    }
}

#[async_trait::async_trait]
impl AccountingApi for ScriptedApi {
    async fn get(&self, _creds: &TenantCredentials, endpoint: &Endpoint) -> Result<Value, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.clone(), Instant::now()));
        let delay = self.latency.lock().unwrap().get(endpoint.label()).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(endpoint.label())
            .and_then(|q| q.pop_front());
        if let Some(r) = queued {
            return r;
        }
        if let Some(f) = self.responders.lock().unwrap().get(endpoint.label()) {
            return f(endpoint);
        }
        Err(ApiError::Transport(format!(
            "no scripted response for {}",
            endpoint.label()
        )))
    }
}

pub fn tenant() -> TenantId {
    TenantId(Uuid::from_u128(0xfeed))
}

pub fn creds() -> TenantCredentials {
    TenantCredentials {
        tenant_id: tenant(),
        access_token: "token".into(),
        upstream_tenant_id: "org".into(),
        base_currency: Some("NZD".into()),
        expires_at: None,
        requires_reauthorization: false,
    }
}
