use std::{
    fmt,
    sync::{atomic::AtomicBool, Arc},
};

use shared::domain::AccountIdentity;
use tracing::info;
use zeroize::Zeroize;

use crate::{
    api::{ApiResult, ClientConfig, HttpApiClient, PlatformApi},
    error::ClientError,
    pacing::{Sleeper, TokioSleeper},
};

/// Opaque personal access token, sent verbatim in the `Authorization` header.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Takes the token as given; only blank input is rejected.
    pub fn new(raw: impl Into<String>) -> ApiResult<Self> {
        let mut raw = raw.into();
        if raw.trim().is_empty() {
            raw.zeroize();
            return Err(ClientError::InvalidCredential(
                "credential must not be empty".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    /// The token exactly as it goes on the wire. Keep it out of logs.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// One login: the API client bound to a credential plus the identity it resolved to.
pub struct Session {
    api: Arc<dyn PlatformApi>,
    sleeper: Arc<dyn Sleeper>,
    identity: Option<AccountIdentity>,
    run_slot: Arc<AtomicBool>,
}

impl Session {
    pub fn new(config: &ClientConfig, credential: Credential) -> ApiResult<Self> {
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        let api = HttpApiClient::with_sleeper(config, credential, Arc::clone(&sleeper))?;
        Ok(Self::with_parts(Arc::new(api), sleeper))
    }

    pub fn with_parts(api: Arc<dyn PlatformApi>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            api,
            sleeper,
            identity: None,
            run_slot: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Validates the credential against the current-user endpoint.
    pub async fn login(&mut self) -> ApiResult<&AccountIdentity> {
        let identity = self.api.get_current_user().await?;
        info!(
            user_id = identity.id.0,
            display_name = %identity.display_name,
            "session authenticated"
        );
        Ok(self.identity.insert(identity))
    }

    pub fn identity(&self) -> Option<&AccountIdentity> {
        self.identity.as_ref()
    }

    pub fn api(&self) -> Arc<dyn PlatformApi> {
        Arc::clone(&self.api)
    }

    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        Arc::clone(&self.sleeper)
    }

    /// Set while a deletion run started from this session is active; shared by every engine
    /// built from it.
    pub fn run_slot(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.run_slot)
    }

    /// Ends the session; the credential is wiped once the last engine or catalog using it is gone.
    pub fn logout(self) {
        if let Some(identity) = &self.identity {
            info!(user_id = identity.id.0, "session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_rejects_blank_tokens() {
        let err = Credential::new("   ").expect_err("blank token");
        assert!(err.is_auth());
    }

    #[test]
    fn credential_is_kept_verbatim_and_redacted() {
        let credential = Credential::new(" secret-token").expect("credential");
        assert_eq!(credential.expose(), " secret-token");
        assert_eq!(format!("{credential:?}"), "Credential(<redacted>)");
    }
}
