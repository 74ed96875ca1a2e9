//! # Role Resolution
//!
//! Turns a caller's token role id into a role name (via the company service)
//! and then into a [`RoleScope`] (via the injected [`RolePolicy`]).
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CallerClaims { role_id, tenant, user_id }                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  RoleDirectory::role_name    (gRPC GetPosRoleById, under deadline)     │
//! │       │   ├── not found        → PermissionDenied("invalid role")      │
//! │       │   └── down / timeout   → ExternalUnavailable                   │
//! │       ▼                                                                 │
//! │  RolePolicy::classify(role_name)                                       │
//! │       │   └── unrecognized     → PermissionDenied("invalid role")      │
//! │       ▼                                                                 │
//! │  ResolvedCaller { role_name, scope }                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use stockline_core::{CallerClaims, RolePolicy, RoleScope, TenantIds};
use thiserror::Error;
use tokio::time::Instant;
use tonic::transport::Endpoint;
use tonic::Code;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::proto::{CompanyServiceClient, GetPosRoleByIdRequest, JwtPayload};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoleLookupError {
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Role service unavailable: {0}")]
    Unavailable(String),

    #[error("Role service returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl From<tonic::Status> for RoleLookupError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            Code::NotFound => RoleLookupError::RoleNotFound(status.message().to_string()),
            _ => RoleLookupError::Unavailable(format!("{:?}: {}", status.code(), status.message())),
        }
    }
}

// =============================================================================
// Role Directory
// =============================================================================

/// Looks up the role record behind a token's role id.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Returns the role name for `claims.role_id`. The claims are forwarded
    /// as the caller's token payload.
    async fn role_name(&self, claims: &CallerClaims) -> Result<String, RoleLookupError>;
}

/// Production directory backed by the company service.
#[derive(Debug, Clone)]
pub struct GrpcRoleDirectory {
    client: CompanyServiceClient,
}

impl GrpcRoleDirectory {
    /// Creates a lazily connecting client; the first lookup dials the service.
    pub fn connect_lazy(url: &str, request_timeout: Duration) -> Result<Self, RoleLookupError> {
        let channel = Endpoint::from_shared(url.to_string())
            .map_err(|e| RoleLookupError::Unavailable(format!("Invalid role service URL: {e}")))?
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .connect_lazy();

        Ok(GrpcRoleDirectory {
            client: CompanyServiceClient::new(channel),
        })
    }
}

fn jwt_payload(claims: &CallerClaims) -> JwtPayload {
    let id = |v: Option<uuid::Uuid>| v.map(|u| u.to_string()).unwrap_or_default();
    JwtPayload {
        user_id: claims.user_id.to_string(),
        role_id: claims.role_id.clone(),
        company_id: claims.tenant.company_id.to_string(),
        branch_id: id(claims.tenant.branch_id),
        store_id: id(claims.tenant.store_id),
    }
}

#[async_trait]
impl RoleDirectory for GrpcRoleDirectory {
    async fn role_name(&self, claims: &CallerClaims) -> Result<String, RoleLookupError> {
        let mut client = self.client.clone();

        let request = tonic::Request::new(GetPosRoleByIdRequest {
            role_id: claims.role_id.clone(),
            jwt_payload: Some(jwt_payload(claims)),
        });

        let response = client.get_pos_role_by_id(request).await?.into_inner();

        let role = response
            .pos_role
            .ok_or_else(|| RoleLookupError::InvalidResponse("missing pos_role".to_string()))?;

        debug!(role_id = %claims.role_id, role_name = %role.role_name, "Resolved role");
        Ok(role.role_name)
    }
}

/// Role directory held in memory, for tests and local development.
///
/// Can be switched offline or slowed down to exercise failure paths.
#[derive(Debug, Default)]
pub struct InMemoryRoleDirectory {
    roles: RwLock<HashMap<String, String>>,
    offline: AtomicBool,
    latency: RwLock<Option<Duration>>,
    lookups: AtomicUsize,
}

impl InMemoryRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `role_id → role_name`.
    pub fn with_role(self, role_id: impl Into<String>, role_name: impl Into<String>) -> Self {
        if let Ok(mut roles) = self.roles.write() {
            roles.insert(role_id.into(), role_name.into());
        }
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.latency.write() {
            *slot = latency;
        }
    }

    /// Number of lookups served or attempted.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoleDirectory for InMemoryRoleDirectory {
    async fn role_name(&self, claims: &CallerClaims) -> Result<String, RoleLookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency.read().ok().and_then(|slot| *slot);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(RoleLookupError::Unavailable("role directory offline".to_string()));
        }

        self.roles
            .read()
            .map_err(|_| RoleLookupError::Unavailable("lock poisoned".to_string()))?
            .get(&claims.role_id)
            .cloned()
            .ok_or_else(|| RoleLookupError::RoleNotFound(claims.role_id.clone()))
    }
}

// =============================================================================
// Authorization
// =============================================================================

/// A caller whose role has been looked up and recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCaller {
    pub role_name: String,
    pub scope: RoleScope,
}

impl ResolvedCaller {
    pub fn can_mutate_inventory(&self) -> bool {
        self.scope.can_mutate_inventory()
    }

    pub fn can_read_inventory(&self) -> bool {
        self.scope.can_read_inventory()
    }

    /// Tenant boundary check of `record` against the caller's token ids.
    pub fn scope_check(&self, record: &TenantIds, caller: &TenantIds) -> bool {
        self.scope.permits(record, caller)
    }

    pub fn require_mutate(&self) -> EngineResult<()> {
        if self.can_mutate_inventory() {
            Ok(())
        } else {
            Err(EngineError::permission_denied(format!(
                "{} users are not allowed to modify inventory",
                self.scope.as_str()
            )))
        }
    }

    pub fn require_read(&self) -> EngineResult<()> {
        if self.can_read_inventory() {
            Ok(())
        } else {
            Err(EngineError::permission_denied("users are not allowed to read inventory"))
        }
    }

    pub fn require_scope(&self, what: &str, record: &TenantIds, caller: &TenantIds) -> EngineResult<()> {
        if self.scope_check(record, caller) {
            Ok(())
        } else {
            Err(EngineError::permission_denied(format!(
                "{} users can only access {what} within their {}",
                self.scope.as_str(),
                self.scope.as_str()
            )))
        }
    }
}

/// Resolves callers against a [`RoleDirectory`] and the configured [`RolePolicy`].
#[derive(Clone)]
pub struct AuthorizationResolver {
    directory: Arc<dyn RoleDirectory>,
    policy: RolePolicy,
}

impl AuthorizationResolver {
    pub fn new(directory: Arc<dyn RoleDirectory>, policy: RolePolicy) -> Self {
        AuthorizationResolver { directory, policy }
    }

    pub fn policy(&self) -> &RolePolicy {
        &self.policy
    }

    /// Looks the caller's role up before `deadline`.
    ///
    /// ## Errors
    /// * `PermissionDenied("invalid role")` - Unknown role id or unrecognized role name
    /// * `ExternalUnavailable` - Directory failure or deadline exceeded
    pub async fn resolve(&self, claims: &CallerClaims, deadline: Instant) -> EngineResult<ResolvedCaller> {
        let role_name = tokio::time::timeout_at(deadline, self.directory.role_name(claims))
            .await
            .map_err(|_| EngineError::unavailable("role lookup deadline exceeded"))??;

        let scope = self
            .policy
            .classify(&role_name)
            .ok_or_else(|| EngineError::permission_denied("invalid role"))?;

        Ok(ResolvedCaller { role_name, scope })
    }
}
