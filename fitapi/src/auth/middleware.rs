//! Authentication and authorization gates.
//!
//! [`require_authentication`] resolves the caller and attaches the [`Principal`] to the request.
//! [`require_role`] builds a layer that reads that principal and checks it against the role
//! hierarchy. Layer the role gate inside the authentication gate; on its own it sees no principal
//! and rejects every request with 401.

use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::{debug, instrument};

use crate::{
    AppState,
    api::models::users::Principal,
    auth::{
        resolver::RequestCredentials,
        roles::{Role, RoleHierarchy},
    },
    errors::Error,
    types::abbrev_uuid,
};

/// Reject requests without a resolvable principal; otherwise attach it and continue.
#[instrument(skip_all)]
pub async fn require_authentication(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, Error> {
    let credentials = RequestCredentials::from_headers(request.headers(), &state.config.auth.session.cookie_name);

    let Some(principal) = state.resolver.resolve(&credentials).await else {
        return Err(Error::Unauthenticated { message: None });
    };

    debug!("Authenticated user {} as {}", abbrev_uuid(&principal.id), principal.role);
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Decide whether `principal` may pass a gate requiring `required`.
pub fn authorize<'a>(hierarchy: &RoleHierarchy, required: Role, principal: Option<&'a Principal>) -> Result<&'a Principal, Error> {
    let principal = principal.ok_or(Error::Unauthenticated { message: None })?;

    if hierarchy.satisfies(principal.role, required) {
        Ok(principal)
    } else {
        Err(Error::InsufficientRole {
            required,
            actual: principal.role,
        })
    }
}

/// Gate requests on the attached principal's role.
pub fn require_role(hierarchy: Arc<RoleHierarchy>, required: Role) -> RequireRoleLayer {
    RequireRoleLayer { hierarchy, required }
}

#[derive(Debug, Clone)]
pub struct RequireRoleLayer {
    hierarchy: Arc<RoleHierarchy>,
    required: Role,
}

impl<S> Layer<S> for RequireRoleLayer {
    type Service = RequireRole<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireRole {
            inner,
            hierarchy: self.hierarchy.clone(),
            required: self.required,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequireRole<S> {
    inner: S,
    hierarchy: Arc<RoleHierarchy>,
    required: Role,
}

impl<S> Service<Request> for RequireRole<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The clone may not be ready; swap so the ready service handles this request
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if let Err(e) = authorize(&self.hierarchy, self.required, request.extensions().get::<Principal>()) {
            return Box::pin(async move { Ok(e.into_response()) });
        }

        Box::pin(inner.call(request))
    }
}
