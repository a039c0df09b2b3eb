use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Guard,
    Manager,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Guard => "guard",
            Role::Manager => "manager",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    pub fn grants(&self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::Customer => matches!(capability, PlaceHold | ManageOwnReservations),
            Role::Guard => matches!(capability, RedeemTicket),
            Role::Manager => matches!(
                capability,
                PlaceHold
                    | ManageOwnReservations
                    | ManageAnyReservation
                    | ConfirmManualPayment
                    | RedeemTicket
            ),
            Role::Admin | Role::Owner => true,
        }
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" | "user" => Ok(Role::Customer),
            "guard" => Ok(Role::Guard),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(CoreError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

/// Operations guarded at the boundary of the booking core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    PlaceHold,
    ManageOwnReservations,
    ManageAnyReservation,
    ConfirmManualPayment,
    RedeemTicket,
    AdministerCourts,
}

/// The caller of a core operation. Passed explicitly on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn customer(id: impl Into<String>) -> Self {
        Self::new(id, Role::Customer)
    }

    pub fn require(&self, capability: Capability) -> CoreResult<()> {
        if self.role.grants(capability) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "role '{}' may not perform {:?}",
                self.role.as_str(),
                capability
            )))
        }
    }

    /// Owners of a record act on it with `ManageOwnReservations`; anyone else needs
    /// `ManageAnyReservation`.
    pub fn require_owner_or_staff(&self, owner_id: &str) -> CoreResult<()> {
        if self.id == owner_id {
            self.require(Capability::ManageOwnReservations)
        } else {
            self.require(Capability::ManageAnyReservation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_can_only_redeem() {
        let guard = Actor::new("g-1", Role::Guard);
        assert!(guard.require(Capability::RedeemTicket).is_ok());
        assert!(matches!(
            guard.require(Capability::PlaceHold),
            Err(CoreError::Forbidden(_))
        ));
    }

    #[test]
    fn test_ownership_check() {
        let customer = Actor::customer("c-1");
        assert!(customer.require_owner_or_staff("c-1").is_ok());
        assert!(customer.require_owner_or_staff("c-2").is_err());

        let manager = Actor::new("m-1", Role::Manager);
        assert!(manager.require_owner_or_staff("c-2").is_ok());
    }

    #[test]
    fn test_role_parsing_accepts_legacy_user() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::Customer);
        assert_eq!("OWNER".parse::<Role>().unwrap(), Role::Owner);
        assert!("root".parse::<Role>().is_err());
    }
}
