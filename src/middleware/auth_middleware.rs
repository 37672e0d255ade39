/// Request authenticator
///
/// Runs once per inbound request. Extracts the bearer credential, decodes
/// it statelessly against the signing secret and installs the resulting
/// identity into request extensions. Never touches the database, so
/// revoking a principal's API access mid-flight is only achieved by waiting
/// out the access token's short TTL.
///
/// Per-request outcomes:
/// - auth namespace requests bypass the gate entirely
/// - no bearer header: the request proceeds unauthenticated and downstream
///   guards decide whether anonymous access is allowed
/// - decode failure: short-circuit 401 with a structured JSON body
/// - decoded token is not an ACCESS token: proceeds unauthenticated
///   (refresh tokens are never valid API credentials)
/// - otherwise: identity installed, request proceeds authenticated

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::guard::AuthenticatedUser;
use crate::auth::jwt::decode_token;
use crate::configuration::JwtSettings;
use crate::error::ErrorBody;

const AUTH_NAMESPACE: &str = "/api/v1/auth";

pub struct AuthMiddleware {
    jwt_config: JwtSettings,
}

impl AuthMiddleware {
    pub fn new(jwt_config: JwtSettings) -> Self {
        Self { jwt_config }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            jwt_config: self.jwt_config.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    jwt_config: JwtSettings,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        // Exact scope match only: "/api/v1/authors" must NOT bypass.
        let bypass = req
            .path()
            .strip_prefix(AUTH_NAMESPACE)
            .map_or(false, |rest| rest.is_empty() || rest.starts_with('/'));
        if bypass {
            return Box::pin(async move { service.call(req).await });
        }

        let bearer = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string);

        let token = match bearer {
            // Anonymous request; downstream authorization decides.
            None => return Box::pin(async move { service.call(req).await }),
            Some(token) => token,
        };

        match decode_token(&token, &self.jwt_config) {
            Ok(claims) if claims.is_access() => {
                let identity = AuthenticatedUser::from_claims(&claims);
                tracing::debug!(email = %identity.email, role = %identity.role, "Request authenticated");
                req.extensions_mut().insert(identity);
                Box::pin(async move { service.call(req).await })
            }
            Ok(_) => {
                // A refresh token presented as a bearer credential is
                // silently treated as unauthenticated.
                tracing::debug!("Non-access token presented as bearer credential");
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                tracing::warn!(error = %e, path = req.path(), "Bearer credential rejected");
                let body = ErrorBody::new(
                    StatusCode::UNAUTHORIZED,
                    e.to_string(),
                    Some(req.path().to_string()),
                );
                let response = HttpResponse::Unauthorized().json(body);
                Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response("Unauthorized", response)
                        .into())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{generate_access_token, generate_refresh_token};
    use crate::auth::role::Role;
    use actix_web::{test, web, App};

    fn test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 300,
            refresh_token_expiry: 86400,
        }
    }

    /// Responds with the authenticated email, or "anonymous".
    async fn whoami(user: Option<web::ReqData<AuthenticatedUser>>) -> String {
        user.map_or_else(|| "anonymous".to_string(), |u| u.email.clone())
    }

    async fn call(path: &str, bearer: Option<&str>) -> (u16, String) {
        let config = test_config();
        let app = test::init_service(
            App::new().service(
                web::scope("/api/v1")
                    .wrap(AuthMiddleware::new(config))
                    .route("/auth/login", web::get().to(whoami))
                    .route("/authors", web::get().to(whoami))
                    .route("/books", web::get().to(whoami)),
            ),
        )
        .await;

        let mut req = test::TestRequest::get().uri(path);
        if let Some(token) = bearer {
            req = req.insert_header(("Authorization", format!("Bearer {}", token)));
        }

        // Short-circuited requests surface as service errors here; render
        // them the same way the HTTP dispatcher would.
        match test::try_call_service(&app, req.to_request()).await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = String::from_utf8(test::read_body(response).await.to_vec()).unwrap();
                (status, body)
            }
            Err(err) => {
                let response = HttpResponse::from_error(err);
                let status = response.status().as_u16();
                let bytes = actix_web::body::to_bytes(response.into_body())
                    .await
                    .unwrap();
                (status, String::from_utf8(bytes.to_vec()).unwrap())
            }
        }
    }

    #[actix_web::test]
    async fn valid_access_token_installs_identity() {
        let token = generate_access_token("admin@example.com", Role::Admin, &test_config()).unwrap();
        let (status, body) = call("/api/v1/books", Some(&token)).await;

        assert_eq!(status, 200);
        assert_eq!(body, "admin@example.com");
    }

    #[actix_web::test]
    async fn authors_namespace_is_not_the_auth_namespace() {
        // "/api/v1/authors" shares a string prefix with the auth scope but
        // must still go through token decoding.
        let token = generate_access_token("admin@example.com", Role::Admin, &test_config()).unwrap();
        let (status, body) = call("/api/v1/authors", Some(&token)).await;
        assert_eq!(status, 200);
        assert_eq!(body, "admin@example.com");

        let (status, _) = call("/api/v1/authors", Some("garbage")).await;
        assert_eq!(status, 401);
    }

    #[actix_web::test]
    async fn auth_namespace_bypasses_token_decoding() {
        // A garbage bearer on the auth scope itself must not short-circuit.
        let (status, body) = call("/api/v1/auth/login", Some("garbage")).await;

        assert_eq!(status, 200);
        assert_eq!(body, "anonymous");
    }

    #[actix_web::test]
    async fn missing_bearer_passes_through_unauthenticated() {
        let (status, body) = call("/api/v1/books", None).await;

        assert_eq!(status, 200);
        assert_eq!(body, "anonymous");
    }

    #[actix_web::test]
    async fn refresh_token_as_bearer_stays_unauthenticated() {
        let token =
            generate_refresh_token("admin@example.com", Role::Admin, &test_config()).unwrap();
        let (status, body) = call("/api/v1/books", Some(&token)).await;

        assert_eq!(status, 200);
        assert_eq!(body, "anonymous");
    }

    #[actix_web::test]
    async fn garbage_bearer_is_rejected_with_structured_body() {
        let (status, body) = call("/api/v1/books", Some("definitely.not.a-token")).await;

        assert_eq!(status, 401);
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["status"], 401);
        assert_eq!(parsed["error"], "Unauthorized");
        assert_eq!(parsed["path"], "/api/v1/books");
    }
}
