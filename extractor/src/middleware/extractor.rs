use std::{future::Future, pin::Pin, sync::Arc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    web,
};
use futures::future::{Ready, ok};

use common::{
    env_config::Config,
    error::{AppError, Res},
    ip::{ClientIp, resolve_client_ip},
    jwt::{self, JwtClaims},
};

/// Parses the bearer token and the client address once per request and stores
/// them in the request extensions for the middlewares and handlers downstream.
pub struct ExtractionMiddleware {}

impl ExtractionMiddleware {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for ExtractionMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for ExtractionMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = ExtractionMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ExtractionMiddlewareService {
            service: Arc::new(service),
        })
    }
}

pub struct ExtractionMiddlewareService<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for ExtractionMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // retrieve token from authorization header
        let auth_header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|auth_value| auth_value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty());

        let client_ip = resolve_client_ip(req.headers(), req.peer_addr());

        let Some(config) = req.app_data::<web::Data<Arc<Config>>>().cloned() else {
            return Box::pin(async {
                Err(AppError::Internal("Server configuration is missing".to_string()).into())
            });
        };
        let srv = Arc::clone(&self.service);

        Box::pin(async move {
            if let Some(token) = auth_header {
                // validate token and insert claims to request object for future use
                let claims_res = jwt::validate_jwt(&token, &config.jwt_config.secret);
                if let Err(error) = &claims_res {
                    log::debug!("Rejected bearer token: {}", error);
                }
                req.extensions_mut().insert::<Res<JwtClaims>>(claims_res);
            }
            req.extensions_mut().insert::<ClientIp>(client_ip);
            srv.call(req).await.map(|res| res.map_into_boxed_body())
        })
    }
}
