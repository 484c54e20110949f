use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    web,
};
use chrono::Utc;
use common::{error::AppError, ip::get_client_ip, jwt::get_jwt_claims_or_error};

use crate::engine::{Identity, QuotaEngine, QuotaTicket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateMode {
    /// Charged to the client IP.
    Guest,
    /// Charged to the authenticated user, claims are required.
    User,
}

/// Admission check in front of extraction handlers.
///
/// Admitted requests carry a [`QuotaTicket`] in their extensions. The extraction is
/// counted once the handler answers with a success status, so failed attempts
/// never consume quota. Denials answer 429 with usage guidance.
pub struct QuotaGate {
    mode: GateMode,
}

impl QuotaGate {
    pub fn guest() -> Self {
        Self {
            mode: GateMode::Guest,
        }
    }

    pub fn user() -> Self {
        Self {
            mode: GateMode::User,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for QuotaGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = QuotaGateService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(QuotaGateService {
            service: Rc::new(service),
            mode: self.mode,
        }))
    }
}

pub struct QuotaGateService<S> {
    service: Rc<S>,
    mode: GateMode,
}

impl<S, B> Service<ServiceRequest> for QuotaGateService<S>
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
        let engine = req.app_data::<web::Data<QuotaEngine>>().cloned();
        let identity = match self.mode {
            GateMode::Guest => Ok(Identity::Guest {
                ip: get_client_ip(&req),
            }),
            GateMode::User => get_jwt_claims_or_error(&req).map(|claims| Identity::User {
                user_id: claims.user_id,
            }),
        };

        Box::pin(async move {
            let Some(engine) = engine else {
                return Ok(req.error_response(AppError::Internal(
                    "Quota engine is not configured".to_string(),
                )));
            };
            let identity = match identity {
                Ok(identity) => identity,
                Err(response) => return Ok(req.into_response(response)),
            };

            let ticket = match engine.check(identity, Utc::now()).await {
                Ok(ticket) => ticket,
                Err(error) => return Ok(req.error_response(error)),
            };
            req.extensions_mut().insert::<QuotaTicket>(ticket.clone());

            let res = srv.call(req).await?;
            if res.status().is_success() {
                engine.record_success(&ticket).await;
            }
            Ok(res.map_into_boxed_body())
        })
    }
}
