//! The Access Control Engine.
//!
//! Single authority for "can principal P do action A" and "can P see
//! department D", and owner of the session lifecycle. There is no ambient
//! session singleton: `authenticate` hands back an explicit [`Session`]
//! value that call sites pass to whatever needs the principal.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::store::{IdentityProvider, Profile, ProfileStore, SessionStore};

use super::models::{Credentials, Department, Principal, RoleId};
use super::registry::RoleRegistry;

// ═══════════════════════════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════════════════════════

/// An authenticated session: a Principal snapshot valid from login to logout.
///
/// Read-only for every component other than the engine that issued it.
#[derive(Debug, Clone)]
pub struct Session {
    principal: Principal,
}

impl Session {
    pub(crate) fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Access Control Engine
// ═══════════════════════════════════════════════════════════════════════════════

/// The Access Control Engine.
///
/// Authenticates against the remote identity provider and profile store (the
/// system of record), evaluates permission and department predicates against
/// the static [`RoleRegistry`], and persists the Principal to durable client
/// storage so a reload restores the session without re-prompting.
#[derive(Clone)]
pub struct AccessControl {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    sessions: Arc<dyn SessionStore>,
    registry: Arc<RoleRegistry>,
}

impl AccessControl {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        sessions: Arc<dyn SessionStore>,
        registry: RoleRegistry,
    ) -> Self {
        Self {
            identity,
            profiles,
            sessions,
            registry: Arc::new(registry),
        }
    }

    /// The registry this engine enforces against.
    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Authenticate credentials and build a session.
    ///
    /// Validates credentials against the identity provider, then loads the
    /// profile record keyed by the identity's subject id. A missing profile
    /// fails authentication even though the credentials were valid. No
    /// partial state is ever exposed: the session is persisted and returned
    /// only once the full Principal exists.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Session> {
        let subject = self
            .identity
            .sign_in(&credentials.email, &credentials.password)
            .await
            .map_err(|e| {
                debug!(reason = %e, "Sign-in rejected by identity provider");
                crate::error::FieldgateError::authentication(e.to_string())
            })?;

        let profile = self
            .profiles
            .get_by_id(subject.as_str())
            .await?
            .ok_or_else(|| {
                warn!(subject = %subject, "Credentials valid but profile not provisioned");
                crate::error::FieldgateError::authentication(format!(
                    "no profile record for subject {}",
                    subject
                ))
            })?;

        let principal = principal_from_profile(profile);

        if let Some(ref role) = principal.role {
            if !self.registry.contains(role) {
                warn!(role = %role, "Principal references a role absent from the registry");
            }
        }

        if let Err(e) = self.sessions.save(&principal).await {
            // The in-process session is still valid; a reload will re-prompt.
            warn!(error = %e, "Failed to persist session to client storage");
        }

        info!(principal = %principal.id, role = ?principal.role, "Authenticated");
        Ok(Session::new(principal))
    }

    /// Restore a session from durable client storage, if one was persisted.
    pub async fn restore(&self) -> Result<Option<Session>> {
        Ok(self.sessions.load().await?.map(Session::new))
    }

    /// End a session: clear the persisted Principal and invalidate the
    /// remote session. Idempotent when no session is active.
    #[instrument(skip(self, session), fields(principal = %session.principal.id))]
    pub async fn logout(&self, session: Session) -> Result<()> {
        if let Err(e) = self.identity.sign_out().await {
            warn!(error = %e, "Remote sign-out failed; clearing local session anyway");
        }
        self.sessions.clear().await?;
        info!("Logged out");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Predicates
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the principal's role grants a permission key.
    ///
    /// The wildcard `"*"` grants everything; otherwise the key must be an
    /// exact member of the role's set. Matching is flat — keys are never
    /// prefix-matched. A principal with an unset or unknown role is denied
    /// every key.
    pub fn has_permission(&self, principal: &Principal, permission: &str) -> bool {
        self.role_of(principal)
            .map(|def| def.grants(permission))
            .unwrap_or(false)
    }

    /// Whether the principal's role may access a department. Unset or
    /// unknown roles are denied every department.
    pub fn can_access_department(&self, principal: &Principal, department: Department) -> bool {
        self.role_of(principal)
            .map(|def| def.covers(department))
            .unwrap_or(false)
    }

    fn role_of<'a>(
        &'a self,
        principal: &Principal,
    ) -> Option<&'a crate::rbac::models::RoleDefinition> {
        principal
            .role
            .as_ref()
            .and_then(|role| self.registry.get(role))
    }
}

/// Build a Principal from a raw profile record. Unknown department strings
/// are treated as unset rather than failing authentication.
fn principal_from_profile(profile: Profile) -> Principal {
    let department = profile
        .department
        .as_deref()
        .and_then(|d| d.parse::<Department>().ok());

    Principal {
        id: profile.id,
        email: profile.email,
        display_name: profile.full_name,
        role: profile.role.map(RoleId::new),
        department,
        region: profile.region,
        avatar_url: profile.avatar_url,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
