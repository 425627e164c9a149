//! Inbound request headers consumed by the billing core. Parsing these
//! out of a real HTTP request is the front end's job; this
//! struct is the interface boundary the core depends on.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundHeaders {
    pub app_id: Option<String>,
    pub app_publisher: Option<String>,
    pub git_name: Option<String>,
    pub git_email: Option<String>,
    pub auth_key: Option<String>,
    pub version: Option<String>,
    pub profile_id: Option<String>,
}

impl InboundHeaders {
    pub fn builder() -> InboundHeadersBuilder {
        InboundHeadersBuilder::default()
    }

    pub fn publisher_present(&self) -> bool {
        self.app_publisher.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InboundHeadersBuilder(InboundHeaders);

impl InboundHeadersBuilder {
    pub fn app_id(mut self, v: impl Into<String>) -> Self {
        self.0.app_id = Some(v.into());
        self
    }

    pub fn app_publisher(mut self, v: impl Into<String>) -> Self {
        self.0.app_publisher = Some(v.into());
        self
    }

    pub fn git_name(mut self, v: impl Into<String>) -> Self {
        self.0.git_name = Some(v.into());
        self
    }

    pub fn git_email(mut self, v: impl Into<String>) -> Self {
        self.0.git_email = Some(v.into());
        self
    }

    pub fn auth_key(mut self, v: impl Into<String>) -> Self {
        self.0.auth_key = Some(v.into());
        self
    }

    pub fn version(mut self, v: impl Into<String>) -> Self {
        self.0.version = Some(v.into());
        self
    }

    pub fn profile_id(mut self, v: impl Into<String>) -> Self {
        self.0.profile_id = Some(v.into());
        self
    }

    pub fn build(self) -> InboundHeaders {
        self.0
    }
}

/// Header name constants, mirrored for both the inbound request headers and
/// the outbound response headers the core sets.
pub mod names {
    pub const APP_ID: &str = "Ninja-App-Id";
    pub const APP_PUBLISHER: &str = "Ninja-App-Publisher";
    pub const GIT_NAME: &str = "Ninja-Git-Name";
    pub const GIT_EMAIL: &str = "Ninja-Git-Email";
    pub const AUTH_KEY: &str = "Ninja-Auth-Key";
    pub const VERSION: &str = "Ninja-Version";
    pub const PROFILE_ID: &str = "Ninja-Profile-Id";

    pub const DUNNING_WARNING: &str = "X-Ninja-Dunning-Warning";
    pub const CLAIM_ISSUE: &str = "X-Ninja-Claim-Issue";
    pub const SUBSCRIPTION_MISSING: &str = "X-Ninja-Subscription-Missing";
}
