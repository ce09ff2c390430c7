//! HTTP middleware for session authentication and capability checks

use agencyos_errors::{ClassifiedError, ServiceResult};
use agencyos_rbac::{AuthContext, Capability, TenantId};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::service::SecurityService;

/// Header selecting the tenant a request acts in
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Bearer token from the `Authorization` header, if present
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn tenant_header(headers: &HeaderMap) -> ServiceResult<Option<TenantId>> {
    let Some(value) = headers.get(TENANT_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .map(|id| Some(TenantId(id)))
        .ok_or_else(|| ClassifiedError::validation("Invalid tenant id header"))
}

/// Resolve the bearer token and attach the caller's [`AuthContext`] to the request
pub async fn require_session(
    State(service): State<SecurityService>,
    mut request: Request,
    next: Next,
) -> Result<Response, ClassifiedError> {
    let token = bearer_token(request.headers()).ok_or_else(ClassifiedError::authentication)?;
    let mut auth_context = service.authenticate(token).await?;

    if let Some(tenant_id) = tenant_header(request.headers())? {
        auth_context = auth_context.with_tenant(tenant_id);
    }

    request.extensions_mut().insert(auth_context);
    Ok(next.run(request).await)
}

/// Capability a route demands, read from request extensions
#[derive(Debug, Clone, Copy)]
pub struct RequiredCapability {
    pub capability: Capability,
    /// Falls back to the tenant the request selected
    pub tenant_id: Option<TenantId>,
}

impl RequiredCapability {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            tenant_id: None,
        }
    }

    pub fn in_tenant(capability: Capability, tenant_id: TenantId) -> Self {
        Self {
            capability,
            tenant_id: Some(tenant_id),
        }
    }
}

/// Enforce the route's [`RequiredCapability`]; must run after [`require_session`]
pub async fn authorize_capability(
    State(service): State<SecurityService>,
    request: Request,
    next: Next,
) -> Result<Response, ClassifiedError> {
    let auth_context = request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(ClassifiedError::authentication)?;

    if let Some(required) = request.extensions().get::<RequiredCapability>().copied() {
        let tenant_id = required
            .tenant_id
            .or(auth_context.current_tenant_id)
            .ok_or_else(|| ClassifiedError::validation("A tenant must be selected"))?;

        let allowed = service
            .has_permission(&auth_context.session_id, tenant_id, required.capability)
            .await?;
        if !allowed {
            tracing::debug!(
                user_id = %auth_context.user_id,
                tenant_id = %tenant_id,
                capability = required.capability.as_str(),
                "Request denied"
            );
            return Err(ClassifiedError::permission());
        }
    }

    Ok(next.run(request).await)
}

/// Extractor for the authenticated caller set by [`require_session`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthContext);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ClassifiedError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(ClassifiedError::authentication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{InMemoryCredentialVerifier, LoginRequest, SecurityStores};
    use agencyos_config::AgencyConfig;
    use agencyos_rbac::{Membership, Role, SystemClock, User};
    use axum::{
        body::Body,
        http::{HeaderValue, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Extension, Router,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn service_with_user(role: Role) -> (SecurityService, String, TenantId) {
        let verifier = InMemoryCredentialVerifier::new();
        let service = SecurityService::new(
            AgencyConfig::default(),
            SecurityStores::in_memory(),
            Arc::new(verifier.clone()),
            SystemClock::shared(),
        )
        .await
        .unwrap();

        let tenant = TenantId::new();
        let user = service
            .permission_store()
            .put_user(User::new("member@agency.test"))
            .await
            .unwrap();
        service
            .permission_store()
            .replace_membership(Membership::new(user.id, tenant, role))
            .await
            .unwrap();
        verifier.insert("member@agency.test", "pw", user.id);

        let token = service
            .login(LoginRequest::new("member@agency.test", "pw"))
            .await
            .unwrap()
            .session
            .id;
        (service, token, tenant)
    }

    async fn whoami(CurrentUser(ctx): CurrentUser) -> String {
        ctx.email
    }

    fn request(token: Option<&str>, tenant: Option<TenantId>) -> Request<Body> {
        let mut request = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        if let Some(token) = token {
            request.headers_mut().insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
        }
        if let Some(tenant) = tenant {
            request.headers_mut().insert(
                TENANT_HEADER,
                HeaderValue::from_str(&tenant.to_string()).unwrap(),
            );
        }
        request
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer sess_abc"));
        assert_eq!(bearer_token(&headers), Some("sess_abc"));
    }

    #[tokio::test]
    async fn test_require_session() {
        let (service, token, _) = service_with_user(Role::Viewer).await;
        let app = Router::new()
            .route("/", get(whoami))
            .layer(from_fn_with_state(service.clone(), require_session));

        let ok = app.clone().oneshot(request(Some(&token), None)).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let missing = app.clone().oneshot(request(None, None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let unknown = app.oneshot(request(Some("sess_unknown"), None)).await.unwrap();
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_authorize_capability_uses_selected_tenant() {
        let (service, token, tenant) = service_with_user(Role::Viewer).await;

        let app = |capability| {
            Router::new()
                .route("/", get(whoami))
                .layer(from_fn_with_state(service.clone(), authorize_capability))
                .layer(Extension(RequiredCapability::new(capability)))
                .layer(from_fn_with_state(service.clone(), require_session))
        };

        let allowed = app(Capability::CanViewReports)
            .oneshot(request(Some(&token), Some(tenant)))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let denied = app(Capability::CanManageBilling)
            .oneshot(request(Some(&token), Some(tenant)))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let no_tenant = app(Capability::CanViewReports)
            .oneshot(request(Some(&token), None))
            .await
            .unwrap();
        assert_eq!(no_tenant.status(), StatusCode::BAD_REQUEST);
    }
}
