//! Route access policy.
//!
//! Every route the service exposes is declared once as a [`RouteSpec`]
//! carrying its required [`Access`]. [`into_router`] wraps each handler with
//! the same guard, so no handler is reachable without its policy applied.

use axum::{
    extract::{FromRef, Request, State},
    handler::Handler,
    http::HeaderMap,
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{on, MethodFilter, MethodRouter},
    Router,
};
use tracing::{debug, warn};

use crate::{
    auth::{
        claims::Role,
        extractors::{bearer_token, CurrentUser},
        jwt::JwtKeys,
        repo_types::User,
    },
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Any valid token for an existing user.
    Authenticated,
    /// Valid token whose role is one of the listed roles.
    Roles(&'static [Role]),
}

pub const ADMIN: Access = Access::Roles(&[Role::Admin]);
pub const STUDENT: Access = Access::Roles(&[Role::Student]);
pub const STAFF: Access = Access::Roles(&[Role::Instructor, Role::Admin]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    fn filter(self) -> MethodFilter {
        match self {
            Verb::Get => MethodFilter::GET,
            Verb::Post => MethodFilter::POST,
            Verb::Put => MethodFilter::PUT,
            Verb::Delete => MethodFilter::DELETE,
        }
    }
}

pub struct RouteSpec {
    pub verb: Verb,
    pub path: &'static str,
    pub access: Access,
    handler: MethodRouter<AppState>,
}

impl RouteSpec {
    pub fn new<H, T>(verb: Verb, path: &'static str, access: Access, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        Self {
            verb,
            path,
            access,
            handler: on(verb.filter(), handler),
        }
    }
}

#[derive(Clone)]
struct Guard {
    state: AppState,
    access: Access,
}

/// Builds a router from the table, attaching the guard to every entry.
pub fn into_router(routes: Vec<RouteSpec>, state: &AppState) -> Router<AppState> {
    routes.into_iter().fold(Router::new(), |router, route| {
        let guard = Guard {
            state: state.clone(),
            access: route.access,
        };
        router.route(
            route.path,
            route.handler
                .route_layer(from_fn_with_state(guard, require_access)),
        )
    })
}

async fn require_access(
    State(guard): State<Guard>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let required_roles = match guard.access {
        Access::Public => return Ok(next.run(req).await),
        Access::Authenticated => None,
        Access::Roles(roles) => Some(roles),
    };

    let (user, token_role) = authenticate(&guard.state, req.headers()).await?;

    if let Some(roles) = required_roles {
        if !roles.contains(&token_role) {
            warn!(user_id = %user.id, role = %token_role, path = %req.uri().path(), "forbidden");
            return Err(AppError::forbidden(
                "You do not have permission to access this resource",
            ));
        }
    }

    debug!(user_id = %user.id, role = %token_role, "access granted");
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Verifies the bearer token and confirms its subject still exists.
/// Returns the user together with the role asserted by the token.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<(User, Role)> {
    let token = bearer_token(headers)?;
    let claims = JwtKeys::from_ref(state).verify(token).map_err(|_| {
        warn!("invalid or expired token");
        AppError::unauthorized("Invalid or expired token")
    })?;

    let user = state
        .store
        .find_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "token for unknown user");
            AppError::unauthorized("Login first to access this!")
        })?;

    Ok((user, claims.role))
}
