use api_billing::EntitlementResolver;
use chrono::{DateTime, Utc};
use common::{
    error::{AppError, Res},
    ip::ClientIp,
    quota::QuotaUsage,
};
use uuid::Uuid;

use crate::{admission::Admission, guest::GuestQuotaTracker, user::UserQuotaTracker};

/// Who an extraction is charged to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User { user_id: Uuid },
    Guest { ip: ClientIp },
}

/// Proof of admission, handed to the handler and used to count the extraction afterwards.
#[derive(Debug, Clone)]
pub struct QuotaTicket {
    pub identity: Identity,
    pub is_premium: bool,
    /// Usage before this extraction.
    pub usage: QuotaUsage,
}

/// Admission control for extractions: guest quotas per IP, daily quotas per
/// free user, no quota for premium.
#[derive(Clone)]
pub struct QuotaEngine {
    guest: GuestQuotaTracker,
    user: UserQuotaTracker,
    resolver: EntitlementResolver,
}

impl QuotaEngine {
    pub fn new(
        guest: GuestQuotaTracker,
        user: UserQuotaTracker,
        resolver: EntitlementResolver,
    ) -> Self {
        Self {
            guest,
            user,
            resolver,
        }
    }

    pub fn guest_tracker(&self) -> &GuestQuotaTracker {
        &self.guest
    }

    pub(crate) fn user_tracker(&self) -> &UserQuotaTracker {
        &self.user
    }

    pub(crate) fn resolver(&self) -> &EntitlementResolver {
        &self.resolver
    }

    /// Admits the caller or fails with [`AppError::QuotaExceeded`].
    /// Datastore errors propagate, so a failing store denies.
    pub async fn check(&self, identity: Identity, now: DateTime<Utc>) -> Res<QuotaTicket> {
        let (admission, is_premium) = match &identity {
            Identity::Guest { ip } => (self.guest.check_and_admit(ip.as_str(), now).await?, false),
            Identity::User { user_id } => {
                let is_premium = self.resolver.resolve_current_premium(*user_id, now).await?;
                (
                    self.user.check_and_admit(*user_id, is_premium, now).await?,
                    is_premium,
                )
            }
        };

        match admission {
            Admission::Admit(usage) => Ok(QuotaTicket {
                identity,
                is_premium,
                usage,
            }),
            Admission::Deny(denial) => Err(AppError::QuotaExceeded(denial)),
        }
    }

    /// Counts a successful extraction. Never fails.
    pub async fn record_success(&self, ticket: &QuotaTicket) {
        match &ticket.identity {
            Identity::Guest { ip } => self.guest.increment(ip.as_str()).await,
            Identity::User { user_id } => self.user.increment(*user_id, ticket.is_premium).await,
        }
    }
}
