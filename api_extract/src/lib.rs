use actix_web::web;

pub mod routes {
    pub mod extraction;
}

pub mod services {
    pub mod extraction;
    pub mod history;
    pub mod provider;
    pub mod table;
}

pub mod dtos {
    pub mod extraction;
}

#[cfg(test)]
pub(crate) mod testing;

pub use services::{
    extraction::ExtractionService,
    history::{HistoryStore, PgHistoryStore},
    provider::{GeminiExtractor, TableExtractor},
};

/// Extraction routes. The guest endpoint is public, everything else requires a session.
pub fn mount_extractions() -> actix_web::Scope {
    web::scope("/extractions")
        .service(routes::extraction::post_extract_guest)
        .service(routes::extraction::post_extract)
        .service(
            web::scope("")
                .wrap(api_auth::auth_middleware())
                // literal paths before `{id}`
                .service(routes::extraction::get_history)
                .service(routes::extraction::get_stats)
                .service(routes::extraction::get_extraction)
                .service(routes::extraction::delete_extraction)
                .service(routes::extraction::delete_all),
        )
}
