use actix_cors::Cors;
use actix_web::http::header::{self, HeaderValue};
use common::env_config::Config;

/// Origins used by the Capacitor and Ionic builds of the mobile app.
const MOBILE_ORIGINS: [&str; 4] = [
    "capacitor://localhost",
    "ionic://localhost",
    "http://localhost",
    "https://localhost",
];

pub fn middleware(config: &Config) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers(&[header::RETRY_AFTER])
        .supports_credentials()
        .max_age(3600);

    for origin in config
        .cors_allowed_origins
        .iter()
        .map(String::as_str)
        .chain(MOBILE_ORIGINS)
        .filter(|origin| *origin != "*")
    {
        cors = cors.allowed_origin(origin);
    }

    // any local dev server port
    if !config.is_production() {
        cors = cors.allowed_origin_fn(|origin, _req_head| is_local_origin(origin));
    }

    cors
}

fn is_local_origin(origin: &HeaderValue) -> bool {
    origin.to_str().is_ok_and(|origin| {
        ["http://localhost:", "http://127.0.0.1:"]
            .iter()
            .any(|prefix| origin.starts_with(prefix))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_dev_servers_are_recognised() {
        assert!(is_local_origin(&HeaderValue::from_static("http://localhost:5173")));
        assert!(is_local_origin(&HeaderValue::from_static("http://127.0.0.1:8100")));
        assert!(!is_local_origin(&HeaderValue::from_static("https://evil.example")));
        assert!(!is_local_origin(&HeaderValue::from_static("http://localhost.evil.example")));
    }
}
