use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::{error::AppError, ip::get_client_ip};
use governor::{Quota, RateLimiter, clock::QuantaClock, state::keyed::DashMapStateStore};
use std::{future::Future, num::NonZeroU32, pin::Pin, rc::Rc, sync::Arc, time::Duration};

type IpStateStore = DashMapStateStore<String>;
type IpLimiter = RateLimiter<String, IpStateStore, QuantaClock>;

/// Request rate limit keyed by client IP. Build it once and clone it into every
/// worker so all workers share the same buckets.
#[derive(Clone)]
pub struct IpRateLimiter {
    limiter: Arc<IpLimiter>,
}

impl IpRateLimiter {
    /// Allows `max_requests` per `window_secs`, replenished evenly over the window.
    pub fn new(window_secs: u64, max_requests: u32) -> Self {
        let burst = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
        let period = Duration::from_secs(window_secs.max(1)) / burst.get();
        let quota = Quota::with_period(period)
            .map(|quota| quota.allow_burst(burst))
            .unwrap_or_else(|| Quota::per_second(burst));
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    pub fn check(&self, key: &str) -> bool {
        self.limiter.check_key(&key.to_string()).is_ok()
    }

    /// Forgets buckets that are back to full capacity.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}

impl<S, B> Transform<S, ServiceRequest> for IpRateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = IpRateLimiterService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(IpRateLimiterService {
            service: Rc::new(service),
            limiter: self.clone(),
        }))
    }
}

pub struct IpRateLimiterService<S> {
    service: Rc<S>,
    limiter: IpRateLimiter,
}

impl<S, B> Service<ServiceRequest> for IpRateLimiterService<S>
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
        let allowed = self.limiter.check(get_client_ip(&req).as_str());
        Box::pin(async move {
            if allowed {
                srv.call(req).await.map(|res| res.map_into_boxed_body())
            } else {
                // Return 429 if limit reached
                Ok(req.error_response(AppError::TooManyRequests(
                    "Too many requests from this IP, please try again later.".to_string(),
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpResponse, http::StatusCode, test as actix_test, web};

    #[test]
    fn buckets_are_per_ip() {
        let limiter = IpRateLimiter::new(900, 2);
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
    }

    #[actix_web::test]
    async fn exhausted_ip_gets_429() {
        let app = actix_test::init_service(
            App::new()
                .wrap(IpRateLimiter::new(900, 1))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = || {
            actix_test::TestRequest::get()
                .uri("/")
                .insert_header(("x-forwarded-for", "203.0.113.1"))
                .to_request()
        };
        assert_eq!(actix_test::call_service(&app, req()).await.status(), StatusCode::OK);
        assert_eq!(
            actix_test::call_service(&app, req()).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
