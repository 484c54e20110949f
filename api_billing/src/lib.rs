use actix_web::web;

pub mod routes {
    pub mod billing;
}

pub mod services {
    pub mod entitlement;
    pub mod purchase;
    pub mod store;
}

pub mod dtos {
    pub mod billing;
}

pub mod misc {
    pub mod plan;
}

#[cfg(test)]
pub(crate) mod testing;

pub use services::{
    entitlement::{EntitlementResolver, EntitlementStore},
    purchase::{BillingService, BillingStore},
    store::PgBillingStore,
};

/// Billing routes. Expects the auth middleware to be wrapped around the scope.
pub fn mount_billing() -> actix_web::Scope {
    web::scope("/billing")
        .service(routes::billing::post_verify_purchase)
        .service(routes::billing::get_subscription)
        .service(routes::billing::post_cancel)
        .service(routes::billing::get_history)
}
