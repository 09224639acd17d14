//! Session claim set carried in the signed session cookie

use serde::{Deserialize, Serialize};

/// First onboarding step for a user who has no tenant yet
pub const CREATE_BUSINESS_STEP: &str = "create-business";

/// Onboarding progress of the signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnboardingStatus {
    /// User still has to create or join a tenant
    Pending,
    /// User belongs to a tenant
    Completed,
}

/// Claims minted into a session artifact
///
/// Only the session codec produces these from untrusted input, and only after
/// the artifact signature verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// Identity provider subject
    pub user_id: String,

    /// User email address
    pub email: String,

    /// Active tenant, absent until onboarding completes
    pub tenant_id: Option<String>,

    /// Role within the active tenant
    pub role: String,

    /// Human readable name
    #[serde(default)]
    pub display_name: Option<String>,

    /// Permission strings granted with the role
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Downstream access token issued by the identity provider
    pub access_token: String,

    /// Downstream refresh token, when the provider issued one
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Onboarding progress
    pub onboarding_status: OnboardingStatus,

    /// Current onboarding step while pending
    #[serde(default)]
    pub onboarding_step: Option<String>,

    /// Whether the user must be sent through onboarding
    pub requires_onboarding: bool,
}

impl SessionClaims {
    /// Create claims for a user without a tenant (onboarding required)
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            tenant_id: None,
            role: role.into(),
            display_name: None,
            permissions: Vec::new(),
            access_token: access_token.into(),
            refresh_token: None,
            onboarding_status: OnboardingStatus::Pending,
            onboarding_step: Some(CREATE_BUSINESS_STEP.to_string()),
            requires_onboarding: true,
        }
    }

    /// Set the tenant and derive onboarding state from its presence
    ///
    /// A tenant means onboarding is complete; no tenant means the user starts
    /// at the create-business step.
    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        let tenant_id = tenant_id.filter(|t| !t.is_empty());
        match tenant_id {
            Some(_) => {
                self.onboarding_status = OnboardingStatus::Completed;
                self.onboarding_step = None;
                self.requires_onboarding = false;
            }
            None => {
                self.onboarding_status = OnboardingStatus::Pending;
                self.onboarding_step = Some(CREATE_BUSINESS_STEP.to_string());
                self.requires_onboarding = true;
            }
        }
        self.tenant_id = tenant_id;
        self
    }

    /// Attach the downstream refresh token
    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    /// Attach a display name
    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name;
        self
    }

    /// Attach permission strings
    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Display name, falling back to the email address
    pub fn display_name_or_email(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

/// A verified session: claims plus the artifact's time bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Claim set
    #[serde(flatten)]
    pub claims: SessionClaims,

    /// Issued at (Unix epoch seconds)
    #[serde(rename = "iat")]
    pub issued_at: u64,

    /// Expiration (Unix epoch seconds)
    #[serde(rename = "exp")]
    pub expires_at: u64,
}

impl Session {
    /// Whether the session has expired at `now` (epoch seconds)
    ///
    /// Valid through the `exp` second itself; no leeway beyond that.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.expires_at
    }
}
