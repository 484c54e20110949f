use std::sync::Arc;

use actix_web::{Responder, post, web};
use api_billing::EntitlementResolver;
use chrono::Utc;
use common::{env_config::Config, error::Res, http::Success, jwt::JwtClaims};
use sqlx::PgPool;

use crate::{
    dtos::auth::{GoogleSignInRequest, MessageResponse, VerifyResponse},
    services::{self, identity::IdentityVerifier},
};

/// Signs in with a Firebase or Google ID token.
///
/// # Input
/// - `req`: JSON payload with the `credential` returned by the client SDK
/// - `verifier`: chain of identity providers (Firebase first, then Google)
///
/// # Output
/// - Success: session `token` and the `user` with its effective premium status
/// - Error: 400 if the credential is missing, 401 if no provider accepts it
///
/// # Frontend Example
/// ```javascript
/// const idToken = await firebase.auth().currentUser.getIdToken();
/// const response = await fetch('/api/auth/google', {
///   method: 'POST',
///   headers: { 'Content-Type': 'application/json' },
///   body: JSON.stringify({ credential: idToken })
/// });
///
/// if (response.ok) {
///   const { token, user } = await response.json();
///   localStorage.setItem('authToken', token);
///   console.log('Premium:', user.is_premium);
/// }
/// ```
#[post("/google")]
pub async fn post_google(
    req: web::Json<GoogleSignInRequest>,
    pool: web::Data<Arc<PgPool>>,
    config: web::Data<Arc<Config>>,
    verifier: web::Data<dyn IdentityVerifier>,
    resolver: web::Data<EntitlementResolver>,
) -> Res<impl Responder> {
    let response = services::user::sign_in(
        &pool,
        verifier.get_ref(),
        &resolver,
        &config.jwt_config,
        &req.credential,
        Utc::now(),
    )
    .await?;
    Success::ok(response)
}

/// Confirms the session token and returns the user with a reconciled premium flag.
#[post("/verify")]
pub async fn post_verify(
    claims: web::ReqData<JwtClaims>,
    pool: web::Data<Arc<PgPool>>,
    resolver: web::Data<EntitlementResolver>,
) -> Res<impl Responder> {
    let user = services::user::verified_user(&pool, &resolver, claims.user_id, Utc::now()).await?;
    Success::ok(VerifyResponse { valid: true, user })
}

/// Sessions are stateless JWTs; the client drops its token.
#[post("/logout")]
pub async fn post_logout(claims: web::ReqData<JwtClaims>) -> Res<impl Responder> {
    log::info!("User {} logged out", claims.user_id);
    Success::ok(MessageResponse::new("Logged out successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identity::tests::{FakeVerifier, identity};
    use actix_web::{App, HttpMessage, http::StatusCode, test};
    use api_billing::EntitlementStore;
    use async_trait::async_trait;
    use chrono::DateTime;
    use common::env_config::{GeminiConfig, IdentityConfig, JwtConfig, QuotaConfig, RateLimitConfig};
    use db::models::subscription::Subscription;
    use uuid::Uuid;

    struct NoEntitlements;

    #[async_trait]
    impl EntitlementStore for NoEntitlements {
        async fn load(
            &self,
            _user_id: Uuid,
            _now: DateTime<Utc>,
        ) -> Res<Option<api_billing::services::entitlement::EntitlementState>> {
            Ok(None)
        }
        async fn grant_if_live(&self, _user_id: Uuid, _now: DateTime<Utc>) -> Res<bool> {
            Ok(false)
        }
        async fn expire_lapsed(&self, _user_id: Uuid, _now: DateTime<Utc>) -> Res<Vec<Subscription>> {
            Ok(vec![])
        }
    }

    fn config() -> Config {
        Config {
            environment: "development".to_string(),
            database_url: "postgres://localhost/img2table_test".to_string(),
            redis_url: None,
            jwt_config: JwtConfig {
                secret: "test-secret".to_string(),
                expiration_hours: 1,
            },
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            num_workers: 1,
            cors_allowed_origins: vec![],
            console_logging_enabled: false,
            identity: IdentityConfig {
                google_client_id: "client".to_string(),
                firebase_project_id: "project".to_string(),
            },
            gemini: GeminiConfig {
                api_key: String::new(),
                model: "gemini-2.5-flash-lite".to_string(),
                api_url: "http://127.0.0.1:9".to_string(),
            },
            quota: QuotaConfig::default(),
            rate_limit: RateLimitConfig {
                window_secs: 900,
                max_requests: 100,
            },
        }
    }

    macro_rules! auth_app {
        () => {{
            // never connects: every request below fails before touching the datastore
            let pool = Arc::new(PgPool::connect_lazy("postgres://localhost/img2table_test").unwrap());
            let verifier: Arc<dyn IdentityVerifier> =
                Arc::new(FakeVerifier::accepting("good", identity("ana@example.com", None)));
            test::init_service(
                App::new()
                    .app_data(web::Data::new(pool))
                    .app_data(web::Data::new(Arc::new(config())))
                    .app_data(web::Data::from(verifier))
                    .app_data(web::Data::new(EntitlementResolver::new(Arc::new(NoEntitlements))))
                    .service(crate::mount_auth())
                    .service(crate::mount_users()),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn blank_credential_is_bad_request() {
        let app = auth_app!();
        let req = test::TestRequest::post()
            .uri("/auth/google")
            .set_json(serde_json::json!({ "credential": "" }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn rejected_credential_is_unauthorized() {
        let app = auth_app!();
        let req = test::TestRequest::post()
            .uri("/auth/google")
            .set_json(serde_json::json!({ "credential": "forged" }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn logout_requires_a_session() {
        let app = auth_app!();
        let res =
            test::call_service(&app, test::TestRequest::post().uri("/auth/logout").to_request())
                .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post().uri("/auth/logout").to_request();
        req.extensions_mut().insert::<Res<JwtClaims>>(Ok(JwtClaims {
            user_id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            is_premium: false,
            exp: usize::MAX,
        }));
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn verify_for_deleted_user_is_not_found() {
        let app = auth_app!();
        let req = test::TestRequest::post().uri("/auth/verify").to_request();
        req.extensions_mut().insert::<Res<JwtClaims>>(Ok(JwtClaims {
            user_id: Uuid::new_v4(),
            email: "gone@example.com".to_string(),
            is_premium: false,
            exp: usize::MAX,
        }));
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn user_routes_require_a_session() {
        let app = auth_app!();
        let requests = [
            test::TestRequest::get().uri("/users/me"),
            test::TestRequest::get().uri("/users/usage"),
            test::TestRequest::patch()
                .uri("/users/me")
                .set_json(serde_json::json!({ "name": "Ana" })),
            test::TestRequest::delete().uri("/users/me"),
        ];
        for req in requests {
            let res = test::call_service(&app, req.to_request()).await;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
