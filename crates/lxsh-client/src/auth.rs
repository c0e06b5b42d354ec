use reqwest::{Method, StatusCode};
use serde_json::json;

use crate::config::AuthMaterial;
use crate::transport::ApiClient;
use crate::LxdError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a session got access to the control plane.
pub enum AuthOutcome {
    Anonymous,
    Certificate,
    TrustPassword,
}

impl AuthOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthOutcome::Anonymous => "anonymous",
            AuthOutcome::Certificate => "certificate",
            AuthOutcome::TrustPassword => "trust_password",
        }
    }
}

/// One-shot credential negotiation. Success is memoized for the session lifetime.
#[derive(Debug)]
pub(crate) struct Authenticator {
    material: AuthMaterial,
    outcome: Option<AuthOutcome>,
}

impl Authenticator {
    pub(crate) fn new(material: AuthMaterial) -> Self {
        Self {
            material,
            outcome: None,
        }
    }

    pub(crate) fn material(&self) -> &AuthMaterial {
        &self.material
    }

    pub(crate) fn outcome(&self) -> Option<AuthOutcome> {
        self.outcome
    }

    pub(crate) fn ensure_authenticated(&mut self, api: &ApiClient) -> Result<AuthOutcome, LxdError> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        let outcome = self.negotiate(api)?;
        tracing::debug!(auth_mode = outcome.as_str(), "lxd authentication negotiated");
        self.outcome = Some(outcome);
        Ok(outcome)
    }

    fn negotiate(&self, api: &ApiClient) -> Result<AuthOutcome, LxdError> {
        if anonymous_access_allowed(api)? {
            return Ok(AuthOutcome::Anonymous);
        }

        match &self.material {
            // The transport presents the pair on every request; a bad pair shows up on the first real call.
            AuthMaterial::Certificate { .. } => Ok(AuthOutcome::Certificate),
            AuthMaterial::TrustPassword(password) => {
                let path = api.api_path("certificates");
                let body = json!({"type": "client", "password": password});
                let status = api.status_of(Method::POST, &path, Some(&body))?;
                if status == StatusCode::OK || status == StatusCode::CREATED {
                    Ok(AuthOutcome::TrustPassword)
                } else {
                    Err(LxdError::Authentication(format!(
                        "trust password rejected with status {}",
                        status.as_u16()
                    )))
                }
            }
            AuthMaterial::None => Err(LxdError::Authentication(
                "no authentication method available".to_string(),
            )),
        }
    }
}

fn anonymous_access_allowed(api: &ApiClient) -> Result<bool, LxdError> {
    if api.status_of(Method::GET, &api.api_path(""), None)? != StatusCode::OK {
        return Ok(false);
    }
    Ok(api.status_of(Method::GET, &api.api_path("instances"), None)? == StatusCode::OK)
}
