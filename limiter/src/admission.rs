use common::quota::{QuotaDenial, QuotaUsage};

/// Outcome of a tracker's admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Allowed, with the usage observed before this request.
    Admit(QuotaUsage),
    Deny(QuotaDenial),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admit(_))
    }
}
