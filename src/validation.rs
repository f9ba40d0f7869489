//! Business validation for incoming orders
//!
//! Pure functions over the [`Order`] aggregate. Every rule is evaluated and all
//! violations are reported together; nothing short-circuits on the first
//! failure. No state, no I/O.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use validator::ValidateEmail;

use crate::models::Order;

/// Tolerated clock skew for timestamps produced by upstream systems
const MAX_CLOCK_SKEW_MINUTES: i64 = 5;

/// Payments before 2000-01-01T00:00:00Z are treated as corrupt
const EARLIEST_PAYMENT_TIMESTAMP: i64 = 946_684_800;

static ORDER_UID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]{6,64}$").expect("order_uid pattern is a valid regex")
});

static CUSTOMER_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]{1,64}$").expect("customer_id pattern is a valid regex")
});

static TRACK_NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z0-9]{6,32}$").expect("track_number pattern is a valid regex")
});

static CURRENCY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{3}$").expect("currency pattern is a valid regex"));

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[0-9\s\-()]{5,}$").expect("phone pattern is a valid regex")
});

/// A single field-level rule violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Dotted path of the offending field, e.g. `items[2].sale`
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All violations found in one order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Whether any violation was reported against `field`
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Default)]
struct ViolationCollector {
    violations: Vec<FieldViolation>,
}

impl ViolationCollector {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    fn check(&mut self, ok: bool, field: impl Into<String>, message: &str) {
        if !ok {
            self.push(field, message);
        }
    }

    fn finish(self) -> Result<(), ValidationErrors> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors {
                violations: self.violations,
            })
        }
    }
}

/// Validate an order against the wall clock
pub fn validate_order(order: &Order) -> Result<(), ValidationErrors> {
    validate_order_at(order, Utc::now())
}

/// Validate an order, treating `now` as the current time
pub fn validate_order_at(order: &Order, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
    let mut errors = ViolationCollector::default();
    let latest_allowed = now + Duration::minutes(MAX_CLOCK_SKEW_MINUTES);

    errors.check(
        ORDER_UID_PATTERN.is_match(&order.order_uid),
        "order_uid",
        "invalid or empty, expected 6-64 of [A-Za-z0-9_.-]",
    );
    errors.check(
        TRACK_NUMBER_PATTERN.is_match(&order.track_number.to_ascii_uppercase()),
        "track_number",
        "must be 6-32 letters/digits",
    );
    errors.check(!order.entry.trim().is_empty(), "entry", "required");
    errors.check(
        CUSTOMER_ID_PATTERN.is_match(&order.customer_id),
        "customer_id",
        "expected 1-64 of [A-Za-z0-9_.-]",
    );
    errors.check(
        order.date_created <= latest_allowed,
        "date_created",
        "must not be in the future",
    );

    let delivery = &order.delivery;
    if !delivery.email.is_empty() {
        errors.check(
            delivery.email.validate_email(),
            "delivery.email",
            "invalid email address",
        );
    }
    if !delivery.phone.is_empty() {
        errors.check(
            PHONE_PATTERN.is_match(&delivery.phone),
            "delivery.phone",
            "invalid phone number",
        );
    }

    let payment = &order.payment;
    errors.check(
        CURRENCY_PATTERN.is_match(&payment.currency),
        "payment.currency",
        "must be a 3-letter ISO code",
    );
    errors.check(payment.amount >= 0, "payment.amount", "must be >= 0");
    errors.check(
        payment.delivery_cost >= 0,
        "payment.delivery_cost",
        "must be >= 0",
    );
    errors.check(payment.goods_total >= 0, "payment.goods_total", "must be >= 0");
    errors.check(payment.custom_fee >= 0, "payment.custom_fee", "must be >= 0");
    let payment_in_range = payment.payment_dt >= EARLIEST_PAYMENT_TIMESTAMP
        && payment.payment_dt <= latest_allowed.timestamp();
    errors.check(
        payment_in_range,
        "payment.payment_dt",
        "out of sane range",
    );

    if order.items.is_empty() {
        errors.push("items", "must contain at least 1 item");
    }

    let mut seen_chrt_ids = HashSet::with_capacity(order.items.len());
    for (index, item) in order.items.iter().enumerate() {
        let field = |name: &str| format!("items[{index}].{name}");

        errors.check(item.chrt_id > 0, field("chrt_id"), "must be > 0");
        if item.chrt_id > 0 && !seen_chrt_ids.insert(item.chrt_id) {
            errors.push(field("chrt_id"), "duplicate chrt_id within order");
        }
        errors.check(item.nm_id > 0, field("nm_id"), "must be > 0");
        errors.check(item.price >= 0, field("price"), "must be >= 0");
        errors.check(item.total_price >= 0, field("total_price"), "must be >= 0");
        errors.check(
            (0..=100).contains(&item.sale),
            field("sale"),
            "must be within 0..100",
        );
        errors.check(!item.name.trim().is_empty(), field("name"), "required");
        errors.check(!item.size.trim().is_empty(), field("size"), "required");
        errors.check(
            !item.track_number.trim().is_empty(),
            field("track_number"),
            "required",
        );
    }

    errors.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::factories::{item, now_seconds, valid_order};
    use proptest::prelude::*;

    #[test]
    fn test_minimal_valid_order_passes() {
        let order = valid_order("b563feb7b2b84b6test");
        assert_eq!(validate_order(&order), Ok(()));
    }

    #[test]
    fn test_empty_order_uid_rejected() {
        let mut order = valid_order("b563feb7b2b84b6test");
        order.order_uid.clear();

        let errors = validate_order(&order).unwrap_err();
        assert!(errors.has_field("order_uid"));
    }

    #[test]
    fn test_order_uid_with_unsafe_characters_rejected() {
        let order = valid_order("abc 123; DROP");
        let errors = validate_order(&order).unwrap_err();
        assert!(errors.has_field("order_uid"));
    }

    #[test]
    fn test_empty_items_rejected() {
        let mut order = valid_order("b563feb7b2b84b6test");
        order.items.clear();

        let errors = validate_order(&order).unwrap_err();
        assert!(errors.has_field("items"));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut order = valid_order("b563feb7b2b84b6test");
        order.payment.amount = -1;

        let errors = validate_order(&order).unwrap_err();
        assert!(errors.has_field("payment.amount"));
    }

    #[test]
    fn test_sale_above_hundred_rejected() {
        let mut order = valid_order("b563feb7b2b84b6test");
        order.items[0].sale = 150;

        let errors = validate_order(&order).unwrap_err();
        assert!(errors.has_field("items[0].sale"));
    }

    #[test]
    fn test_all_violations_are_collected() {
        let mut order = valid_order("b563feb7b2b84b6test");
        order.order_uid.clear();
        order.payment.amount = -1;
        order.payment.currency = "DOLLARS".to_string();
        order.delivery.email = "not-an-email".to_string();
        order.items[0].sale = 150;
        order.items[0].name = "   ".to_string();

        let errors = validate_order(&order).unwrap_err();

        assert_eq!(errors.len(), 6, "unexpected violations: {errors}");
        for field in [
            "order_uid",
            "payment.amount",
            "payment.currency",
            "delivery.email",
            "items[0].sale",
            "items[0].name",
        ] {
            assert!(errors.has_field(field), "missing violation for {field}");
        }
    }

    #[test]
    fn test_display_joins_violations() {
        let mut order = valid_order("b563feb7b2b84b6test");
        order.payment.amount = -1;
        order.payment.custom_fee = -5;

        let message = validate_order(&order).unwrap_err().to_string();
        assert_eq!(
            message,
            "payment.amount: must be >= 0; payment.custom_fee: must be >= 0"
        );
    }

    #[test]
    fn test_track_number_is_matched_case_insensitively() {
        let mut order = valid_order("b563feb7b2b84b6test");
        order.track_number = "wbilmtesttrack".to_string();
        assert_eq!(validate_order(&order), Ok(()));

        order.track_number = "WBIL-TEST".to_string();
        assert!(validate_order(&order).unwrap_err().has_field("track_number"));

        order.track_number = "WB12".to_string();
        assert!(validate_order(&order).unwrap_err().has_field("track_number"));
    }

    #[test]
    fn test_currency_is_case_insensitive() {
        let mut order = valid_order("b563feb7b2b84b6test");
        order.payment.currency = "usd".to_string();
        assert_eq!(validate_order(&order), Ok(()));
    }

    #[test]
    fn test_optional_contact_fields() {
        let mut order = valid_order("b563feb7b2b84b6test");
        order.delivery.email.clear();
        order.delivery.phone.clear();
        assert_eq!(validate_order(&order), Ok(()));

        order.delivery.phone = "+7 (999) 123-45-67".to_string();
        assert_eq!(validate_order(&order), Ok(()));

        order.delivery.phone = "call me".to_string();
        assert!(validate_order(&order).unwrap_err().has_field("delivery.phone"));
    }

    #[test]
    fn test_date_created_skew_window() {
        let now = now_seconds();
        let mut order = valid_order("b563feb7b2b84b6test");

        order.date_created = now + Duration::minutes(4);
        assert_eq!(validate_order_at(&order, now), Ok(()));

        order.date_created = now + Duration::minutes(6);
        assert!(validate_order_at(&order, now)
            .unwrap_err()
            .has_field("date_created"));
    }

    #[test]
    fn test_payment_timestamp_window() {
        let now = now_seconds();
        let mut order = valid_order("b563feb7b2b84b6test");

        order.payment.payment_dt = EARLIEST_PAYMENT_TIMESTAMP - 1;
        assert!(validate_order_at(&order, now)
            .unwrap_err()
            .has_field("payment.payment_dt"));

        order.payment.payment_dt = (now + Duration::hours(1)).timestamp();
        assert!(validate_order_at(&order, now)
            .unwrap_err()
            .has_field("payment.payment_dt"));

        order.payment.payment_dt = EARLIEST_PAYMENT_TIMESTAMP;
        assert_eq!(validate_order_at(&order, now), Ok(()));
    }

    #[test]
    fn test_item_rules() {
        let mut order = valid_order("b563feb7b2b84b6test");
        order.items[0].chrt_id = 0;
        order.items[0].nm_id = -3;
        order.items[0].price = -1;
        order.items[0].total_price = -1;
        order.items[0].size.clear();
        order.items[0].track_number.clear();

        let errors = validate_order(&order).unwrap_err();
        for field in [
            "items[0].chrt_id",
            "items[0].nm_id",
            "items[0].price",
            "items[0].total_price",
            "items[0].size",
            "items[0].track_number",
        ] {
            assert!(errors.has_field(field), "missing violation for {field}");
        }
    }

    #[test]
    fn test_duplicate_chrt_id_rejected() {
        let mut order = valid_order("b563feb7b2b84b6test");
        order.items = vec![item(7), item(8), item(7)];

        let errors = validate_order(&order).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors.has_field("items[2].chrt_id"));
    }

    proptest! {
        #[test]
        fn prop_sale_within_range_accepted(sale in 0i32..=100) {
            let mut order = valid_order("b563feb7b2b84b6test");
            order.items[0].sale = sale;
            prop_assert!(validate_order(&order).is_ok());
        }

        #[test]
        fn prop_sale_outside_range_rejected(sale in prop_oneof![i32::MIN..0, 101i32..]) {
            let mut order = valid_order("b563feb7b2b84b6test");
            order.items[0].sale = sale;
            let errors = validate_order(&order).unwrap_err();
            prop_assert!(errors.has_field("items[0].sale"));
        }

        #[test]
        fn prop_negative_money_rejected(amount in i64::MIN..0) {
            let mut order = valid_order("b563feb7b2b84b6test");
            order.payment.goods_total = amount;
            order.items[0].price = amount;
            let errors = validate_order(&order).unwrap_err();
            prop_assert!(errors.has_field("payment.goods_total"));
            prop_assert!(errors.has_field("items[0].price"));
        }

        #[test]
        fn prop_generated_order_uids_accepted(uid in "[A-Za-z0-9_.-]{6,64}") {
            let order = valid_order(&uid);
            prop_assert!(validate_order(&order).is_ok());
        }
    }
}
