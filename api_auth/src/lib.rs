use actix_web::web;
use middleware::auth::AuthMiddleware;

pub mod middleware {
    pub mod auth;
}

pub mod routes {
    pub mod auth;
    pub mod user;
}

pub mod services {
    pub mod identity;
    pub mod user;
}

pub mod dtos {
    pub mod auth;
}

pub use services::identity::{ChainedVerifier, IdentityVerifier, JwksVerifier, VerifiedIdentity};

/// Rejects requests without valid claims and exposes them as `web::ReqData<JwtClaims>`.
pub fn auth_middleware() -> AuthMiddleware {
    AuthMiddleware::new()
}

pub fn mount_auth() -> actix_web::Scope {
    web::scope("/auth").service(routes::auth::post_google).service(
        web::scope("")
            .wrap(auth_middleware())
            .service(routes::auth::post_verify)
            .service(routes::auth::post_logout),
    )
}

pub fn mount_users() -> actix_web::Scope {
    web::scope("/users").service(
        web::scope("")
            .wrap(auth_middleware())
            .service(routes::user::get_me)
            .service(routes::user::patch_me)
            .service(routes::user::delete_me)
            .service(routes::user::get_usage),
    )
}
