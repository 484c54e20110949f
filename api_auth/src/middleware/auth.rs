use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::jwt::{JwtClaims, get_jwt_claims_or_error};
use futures::future::{Ready, ok};

/// Guards a scope: the extraction middleware must have parsed a valid bearer token.
pub struct AuthMiddleware {}

impl AuthMiddleware {
    pub fn new() -> Self {
        AuthMiddleware {}
    }
}

impl Default for AuthMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Rc::new(service),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Rc::clone(&self.service);

        Box::pin(async move {
            match get_jwt_claims_or_error(&req) {
                Ok(claims) => {
                    // expose claims to handlers through web::ReqData
                    req.extensions_mut().insert::<JwtClaims>(claims);
                    srv.call(req).await.map(|res| res.map_into_boxed_body())
                }
                Err(response) => Ok(req.into_response(response)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpResponse, http::StatusCode, test, web};
    use common::error::{AppError, Res};
    use uuid::Uuid;

    async fn whoami(claims: web::ReqData<JwtClaims>) -> HttpResponse {
        HttpResponse::Ok().body(claims.email.clone())
    }

    #[actix_web::test]
    async fn missing_claims_are_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new())
                .route("/me", web::get().to(whoami)),
        )
        .await;
        let res = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn valid_claims_reach_the_handler() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new())
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let req = test::TestRequest::get().uri("/me").to_request();
        req.extensions_mut().insert::<Res<JwtClaims>>(Ok(JwtClaims {
            user_id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            is_premium: false,
            exp: usize::MAX,
        }));
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(test::read_body(res).await, "ana@example.com");
    }

    #[actix_web::test]
    async fn invalid_token_answers_with_its_error() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new())
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let req = test::TestRequest::get().uri("/me").to_request();
        req.extensions_mut()
            .insert::<Res<JwtClaims>>(Err(AppError::Unauthorized("expired".to_string())));
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
