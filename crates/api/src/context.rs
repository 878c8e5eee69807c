use thiserror::Error;

use boxoffice_core::UserId;

use crate::identity::Role;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("role '{actual}' may not {action}")]
pub struct AccessDenied {
    pub actual: Role,
    pub action: &'static str,
}

/// Authenticated caller for a request.
///
/// Inserted by the auth middleware; every protected route can rely on it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BuyerContext {
    user_id: UserId,
    role: Role,
}

impl BuyerContext {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Catalog writes are reserved for admins.
    pub fn ensure_admin(&self, action: &'static str) -> Result<(), AccessDenied> {
        match self.role {
            Role::Admin => Ok(()),
            actual => Err(AccessDenied { actual, action }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admins_pass_the_admin_check() {
        let admin = BuyerContext::new(UserId::new(), Role::Admin);
        assert_eq!(admin.ensure_admin("create events"), Ok(()));

        let buyer = BuyerContext::new(UserId::new(), Role::User);
        let err = buyer.ensure_admin("create events").unwrap_err();
        assert_eq!(err.to_string(), "role 'user' may not create events");
    }
}
