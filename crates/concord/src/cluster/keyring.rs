//! Keyring fan-out across gossip pools.
//!
//! A request targets the local LAN pool, the WAN pool and the LAN pool of
//! every other WAN-reachable datacenter (only the local LAN when
//! `local_only`). Pools run concurrently; inside a pool every live member
//! is called concurrently with a per-call timeout. Each pool's result lands
//! in its own slot, so member failures become counters on that pool's
//! response instead of errors.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use concord_common::constants::{
    DEFAULT_KEYRING_CALL_TIMEOUT_MS, DEFAULT_KEYRING_DEADLINE_MS, VALID_KEY_LENGTHS,
};
use concord_common::{ConcordError, KeyringOp, KeyringPoolResponse, KeyringResponses};
use futures::StreamExt;
use futures::future::join_all;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::pools::{GossipPools, KeyOperation, Member, PoolId};
use crate::acl::{Access, Redactor};

/// Timeouts applied when a request does not set its own
#[derive(Debug, Clone, Copy)]
pub struct KeyringSettings {
    pub call_timeout: Duration,
    pub deadline: Duration,
}

impl Default for KeyringSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(DEFAULT_KEYRING_CALL_TIMEOUT_MS),
            deadline: Duration::from_millis(DEFAULT_KEYRING_DEADLINE_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyringRequest {
    pub operation: KeyringOp,
    pub key: Option<String>,
    /// Only consult the local LAN pool; valid for list only
    pub local_only: bool,
    pub token: Option<String>,
    pub call_timeout: Option<Duration>,
    pub deadline: Option<Duration>,
}

impl KeyringRequest {
    pub fn new(operation: KeyringOp) -> Self {
        Self {
            operation,
            key: None,
            local_only: false,
            token: None,
            call_timeout: None,
            deadline: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn local_only(mut self) -> Self {
        self.local_only = true;
        self
    }
}

/// Gossip encryption keys are base64 of 16, 24 or 32 bytes
pub fn validate_key(key: &str) -> Result<(), ConcordError> {
    let bytes = STANDARD
        .decode(key)
        .map_err(|e| ConcordError::validation(format!("Invalid key: {e}")))?;

    if !VALID_KEY_LENGTHS.contains(&bytes.len()) {
        return Err(ConcordError::validation(format!(
            "Invalid key length {}: must be 16, 24 or 32 bytes",
            bytes.len()
        )));
    }
    Ok(())
}

/// One pool to consult. Remote LAN pools are resolved when their slot runs.
#[derive(Debug, Clone)]
struct Target {
    datacenter: String,
    wan: bool,
    pool: Option<PoolId>,
}

impl Target {
    fn label(&self) -> &'static str {
        if self.wan { "WAN" } else { "LAN" }
    }
}

/// Wrap a collaborator failure as an unreachable pool
fn unreachable(dc: &str, err: ConcordError) -> ConcordError {
    match err {
        err @ ConcordError::UnreachablePool { .. } => err,
        other => ConcordError::UnreachablePool {
            datacenter: dc.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Runs keyring operations across every targeted pool
pub struct KeyringCoordinator {
    datacenter: String,
    pools: Arc<dyn GossipPools>,
    redactor: Redactor,
    settings: KeyringSettings,
}

impl KeyringCoordinator {
    pub fn new(
        datacenter: impl Into<String>,
        pools: Arc<dyn GossipPools>,
        redactor: Redactor,
        settings: KeyringSettings,
    ) -> Self {
        Self {
            datacenter: datacenter.into(),
            pools,
            redactor,
            settings,
        }
    }

    /// Validate, authorize, then fan out. Only validation and authorization
    /// fail the whole request; pool-level problems are reported alongside
    /// the responses that did arrive.
    pub async fn execute(&self, req: &KeyringRequest) -> Result<KeyringResponses, ConcordError> {
        Self::validate(req)?;

        let access = if req.operation.is_destructive() {
            Access::Write
        } else {
            Access::Read
        };
        if !self.redactor.authorize_keyring(req.token.as_deref(), access) {
            let level = if access == Access::Write { "write" } else { "read" };
            return Err(ConcordError::permission_denied(format!("keyring {level} access required")));
        }

        let op = KeyOperation {
            op: req.operation,
            key: req.key.clone(),
        };
        let call_timeout = req.call_timeout.unwrap_or(self.settings.call_timeout);
        let deadline = Instant::now() + req.deadline.unwrap_or(self.settings.deadline);

        let (targets, mut errors) = match tokio::time::timeout_at(deadline, self.plan(req.local_only)).await {
            Ok(plan) => plan,
            Err(_) => {
                return Ok(KeyringResponses {
                    responses: Vec::new(),
                    errors: vec![ConcordError::DeadlineExceeded(format!(
                        "keyring {} could not list pools before the deadline",
                        req.operation
                    ))],
                });
            }
        };

        tracing::debug!(
            operation = %req.operation,
            local_only = req.local_only,
            pools = targets.len(),
            "Keyring fan-out"
        );

        let mut slots: Vec<Option<Result<KeyringPoolResponse, ConcordError>>> =
            (0..targets.len()).map(|_| None).collect();

        let mut inflight: FuturesUnordered<_> = targets
            .iter()
            .enumerate()
            .map(|(slot, target)| self.run_slot(slot, target, &op, call_timeout))
            .collect();

        loop {
            let next = tokio::time::timeout_at(deadline, inflight.next()).await;
            match next {
                Ok(Some((slot, outcome))) => slots[slot] = Some(outcome),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        operation = %req.operation,
                        pending = inflight.len(),
                        "Keyring deadline reached, abandoning pending pools"
                    );
                    break;
                }
            }
        }
        drop(inflight);

        let mut responses = Vec::with_capacity(targets.len());
        for (target, slot) in targets.iter().zip(slots) {
            match slot {
                Some(Ok(response)) => responses.push(response),
                Some(Err(err)) => {
                    tracing::warn!(
                        datacenter = %target.datacenter,
                        pool = target.label(),
                        error = %err,
                        "Keyring pool unreachable"
                    );
                    errors.push(err);
                }
                None => errors.push(ConcordError::DeadlineExceeded(format!(
                    "keyring {} on {} pool in datacenter {} did not finish",
                    req.operation,
                    target.label(),
                    target.datacenter
                ))),
            }
        }

        Ok(KeyringResponses { responses, errors })
    }

    fn validate(req: &KeyringRequest) -> Result<(), ConcordError> {
        if !req.operation.is_destructive() {
            return Ok(());
        }
        if req.local_only {
            return Err(ConcordError::validation(format!(
                "LocalOnly is only valid for list operations, not {}",
                req.operation
            )));
        }

        let key = req
            .key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConcordError::validation(format!("keyring {} requires a key", req.operation)))?;

        if req.operation == KeyringOp::Install {
            validate_key(key)?;
        }
        Ok(())
    }

    /// Local LAN first, then the WAN, then remote datacenters by name
    async fn plan(&self, local_only: bool) -> (Vec<Target>, Vec<ConcordError>) {
        let local = match self.pools.list_pools(&self.datacenter).await {
            Ok(set) => set,
            Err(err) => return (Vec::new(), vec![unreachable(&self.datacenter, err)]),
        };

        let mut targets = vec![Target {
            datacenter: self.datacenter.clone(),
            wan: false,
            pool: Some(local.lan),
        }];
        let mut errors = Vec::new();

        if local_only {
            return (targets, errors);
        }
        let Some(wan) = local.wan else {
            return (targets, errors);
        };

        targets.push(Target {
            datacenter: self.datacenter.clone(),
            wan: true,
            pool: Some(wan),
        });

        match self.pools.wan_datacenters().await {
            Ok(mut dcs) => {
                dcs.sort();
                dcs.dedup();
                targets.extend(dcs.into_iter().filter(|dc| *dc != self.datacenter).map(|dc| Target {
                    datacenter: dc,
                    wan: false,
                    pool: None,
                }));
            }
            Err(err) => errors.push(ConcordError::Internal(format!(
                "Failed to list WAN datacenters: {err}"
            ))),
        }

        (targets, errors)
    }

    async fn run_slot(
        &self,
        slot: usize,
        target: &Target,
        op: &KeyOperation,
        call_timeout: Duration,
    ) -> (usize, Result<KeyringPoolResponse, ConcordError>) {
        (slot, self.query_pool(target, op, call_timeout).await)
    }

    async fn query_pool(
        &self,
        target: &Target,
        op: &KeyOperation,
        call_timeout: Duration,
    ) -> Result<KeyringPoolResponse, ConcordError> {
        let dc = target.datacenter.as_str();
        let pool = match &target.pool {
            Some(pool) => pool.clone(),
            None => self.pools.list_pools(dc).await.map_err(|e| unreachable(dc, e))?.lan,
        };

        let members = self.pools.list_members(&pool).await.map_err(|e| unreachable(dc, e))?;
        let live: Vec<Member> = members.into_iter().filter(Member::is_alive).collect();

        let mut response = KeyringPoolResponse::new(dc, target.wan);
        response.num_nodes = live.len();

        let calls = live.iter().map(|member| {
            let pool = &pool;
            async move {
                let outcome = tokio::time::timeout(call_timeout, self.pools.invoke_key_op(pool, member, op)).await;
                (member, outcome)
            }
        });

        for (member, outcome) in join_all(calls).await {
            match outcome {
                Ok(Ok(report)) => {
                    for key in report.keys {
                        *response.keys.entry(key).or_default() += 1;
                    }
                    if let Some(primary) = report.primary_key {
                        *response.primary_keys.entry(primary).or_default() += 1;
                    }
                }
                Ok(Err(err)) => {
                    response.num_failed += 1;
                    response.messages.insert(member.name.clone(), err.to_string());
                }
                Err(_) => {
                    response.num_failed += 1;
                    response.messages.insert(
                        member.name.clone(),
                        format!("timed out after {}ms", call_timeout.as_millis()),
                    );
                }
            }
        }

        if response.is_degraded() {
            response.error = Some(format!(
                "{} of {} members failed keyring {}",
                response.num_failed, response.num_nodes, op.op
            ));
            tracing::warn!(
                datacenter = %dc,
                pool = %pool,
                failed = response.num_failed,
                nodes = response.num_nodes,
                "Keyring operation degraded"
            );
        }

        Ok(response)
    }
}
