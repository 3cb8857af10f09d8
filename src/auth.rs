use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures::future::{ready, Ready};

use crate::error::AppError;
use crate::permissions::{evaluate_capability, Decision, PermissionGroup};

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

// Identity as forwarded by the upstream auth layer. Nothing here is verified;
// it only feeds the role gate.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub user_id: Option<String>,
    pub role: Option<String>,
}

fn header_or_cookie(req: &HttpRequest, header: &str, cookie: &str) -> Option<String> {
    req.headers()
        .get(header)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| req.cookie(cookie).map(|c| c.value().to_owned()))
        .filter(|s| !s.trim().is_empty())
}

impl FromRequest for Caller {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let caller = Caller {
            user_id: header_or_cookie(req, USER_ID_HEADER, "user_id"),
            role: header_or_cookie(req, USER_ROLE_HEADER, "role"),
        };
        if caller.user_id.is_none() || caller.role.is_none() {
            tracing::debug!("Caller identity incomplete on {}", req.path());
        }
        // Missing identity is not an extraction failure; the gate decides.
        ready(Ok(caller))
    }
}

impl Caller {
    /// Gate for a capability. Runs before any storage access.
    pub fn authorize(&self, group: PermissionGroup) -> Result<(), AppError> {
        // Without a user id there is no caller, whatever role was claimed.
        let role = self.user_id.as_ref().and(self.role.as_deref());
        match evaluate_capability(role, group) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                tracing::warn!(
                    "Denied {} for user {:?} with role {:?}: {}",
                    group,
                    self.user_id,
                    self.role,
                    reason
                );
                Err(AppError::PermissionDenied(reason))
            }
        }
    }
}
