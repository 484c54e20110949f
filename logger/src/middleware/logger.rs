use std::{sync::Arc, time::Instant};

use actix_web::{
    Error,
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::StatusCode,
    web,
};
use colored::{ColoredString, Colorize};
use common::{env_config::Config, ip::get_client_ip, jwt::claims_from_request};
use db::dtos::usage_log::ApiUsageCreateRequest;
use futures::future::{LocalBoxFuture, Ready, ready};
use log::{info, warn};
use sqlx::PgPool;

/// Records every API call: a coloured console line and a row in `api_usage`.
pub struct LoggerMiddleware {}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for LoggerMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = LoggerMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggerMiddlewareService {
            service: Arc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let ip_address = get_client_ip(&req).to_string();
        let user_agent = req
            .headers()
            .get("User-Agent")
            .and_then(|ua| ua.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let console_logging_enabled = req
            .app_data::<web::Data<Arc<Config>>>()
            .is_none_or(|config| config.console_logging_enabled);
        let pool = req
            .app_data::<web::Data<Arc<PgPool>>>()
            .map(|pool| Arc::clone(pool.get_ref()));
        let srv = Arc::clone(&self.service);

        Box::pin(async move {
            let res = srv.call(req).await?;

            // Claims are attached by the extraction middleware on the way in.
            let user_id = claims_from_request(res.request()).map(|claims| claims.user_id);
            let status_code = res.status().as_u16() as i32;
            let elapsed_ms = started.elapsed().as_millis().min(i32::MAX as u128) as i32;

            if console_logging_enabled {
                info!(
                    "[{}] {} {} {} user_id={} ip={}",
                    colored_status(res.status()),
                    colored_method(&method),
                    path.bright_white(),
                    format!("({}ms)", elapsed_ms).bright_black(),
                    user_id
                        .map_or("None".to_string(), |id| id.to_string())
                        .bright_blue(),
                    ip_address.bright_cyan(),
                );
            }

            if let Some(pool) = pool {
                let entry = ApiUsageCreateRequest {
                    user_id,
                    endpoint: path,
                    method,
                    status_code,
                    response_time_ms: elapsed_ms,
                    ip_address,
                    user_agent,
                };
                if let Err(error) = db::usage_log::insert_api_usage(pool.as_ref(), entry).await {
                    warn!("Failed to record API usage: {}", error);
                }
            }

            Ok(res.map_into_boxed_body())
        })
    }
}

fn colored_status(status: StatusCode) -> ColoredString {
    let code = status.as_u16().to_string();
    match status.as_u16() {
        200..=299 => code.green(),
        300..=399 => code.yellow(),
        400..=499 => code.bright_red(),
        _ => code.red(),
    }
}

fn colored_method(method: &str) -> ColoredString {
    match method {
        "GET" => method.blue(),
        "POST" => method.yellow(),
        "PUT" | "PATCH" => method.purple(),
        "DELETE" => method.red(),
        _ => method.normal(),
    }
}
