use farmstand_core::PrincipalId;

/// Authenticated caller for a request.
///
/// This is immutable and must be present for all ledger routes. The ledger
/// trusts the identity carried here; establishing it (the wallet session) is
/// the token layer's job.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CallerContext {
    principal_id: PrincipalId,
}

impl CallerContext {
    pub fn new(principal_id: PrincipalId) -> Self {
        Self { principal_id }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }
}
