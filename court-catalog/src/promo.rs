use chrono::{DateTime, Utc};
use court_core::models::{PromoCode, PromoKind};
use court_core::{CoreError, CoreResult};
use rust_decimal::Decimal;

/// Reject codes that are inactive, outside their validity window or used up.
pub fn validate(promo: &PromoCode, now: DateTime<Utc>) -> CoreResult<()> {
    if !promo.is_active {
        return Err(CoreError::Validation(format!("promo code '{}' is not active", promo.code)));
    }
    if now < promo.valid_from {
        return Err(CoreError::Validation(format!("promo code '{}' is not valid yet", promo.code)));
    }
    if promo.valid_until.is_some_and(|until| now > until) {
        return Err(CoreError::Validation(format!("promo code '{}' has expired", promo.code)));
    }
    if promo.max_uses.is_some_and(|max| promo.used_count >= max) {
        return Err(CoreError::Validation(format!(
            "promo code '{}' has reached its usage limit",
            promo.code
        )));
    }
    Ok(())
}

/// Absolute discount a code grants on `subtotal`. Never exceeds the subtotal.
pub fn discount_amount(promo: &PromoCode, subtotal: Decimal) -> Decimal {
    let raw = match promo.kind {
        PromoKind::Percentage => subtotal * promo.value,
        PromoKind::Fixed => promo.value,
    };
    raw.max(Decimal::ZERO).min(subtotal)
}

/// Codes are matched case-insensitively and stored upper-case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn promo(kind: PromoKind, value: Decimal) -> PromoCode {
        let from = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        PromoCode {
            id: Uuid::new_v4(),
            code: "ACE".to_string(),
            kind,
            value,
            max_uses: Some(2),
            used_count: 0,
            is_active: true,
            valid_from: from,
            valid_until: Some(from + Duration::days(10)),
        }
    }

    #[test]
    fn test_validity_window() {
        let code = promo(PromoKind::Fixed, Decimal::from(5000));
        let inside = code.valid_from + Duration::days(1);

        assert!(validate(&code, inside).is_ok());
        assert!(validate(&code, code.valid_from - Duration::seconds(1)).is_err());
        assert!(validate(&code, code.valid_from + Duration::days(11)).is_err());
    }

    #[test]
    fn test_exhausted_and_inactive_codes() {
        let now = Utc.with_ymd_and_hms(2024, 12, 2, 0, 0, 0).unwrap();

        let mut used_up = promo(PromoKind::Fixed, Decimal::from(5000));
        used_up.used_count = 2;
        assert!(matches!(validate(&used_up, now), Err(CoreError::Validation(_))));

        let mut inactive = promo(PromoKind::Fixed, Decimal::from(5000));
        inactive.is_active = false;
        assert!(validate(&inactive, now).is_err());
    }

    #[test]
    fn test_discount_is_capped_by_subtotal() {
        let percent = promo(PromoKind::Percentage, Decimal::new(25, 2));
        assert_eq!(discount_amount(&percent, Decimal::from(40000)), Decimal::from(10000));

        let fixed = promo(PromoKind::Fixed, Decimal::from(50000));
        assert_eq!(discount_amount(&fixed, Decimal::from(30000)), Decimal::from(30000));
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  ace10 "), "ACE10");
    }
}
