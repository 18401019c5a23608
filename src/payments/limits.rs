// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Daily and monthly transfer limit enforcement.
//!
//! The authoritative check sums non-failed, non-cancelled transactions
//! from the store; the per-user counters are advisory mirrors that the
//! engine keeps current for operator visibility.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::error::ServiceError;
use crate::storage::{Database, User};

/// Daily window start: one day before the user's reset anchor.
pub fn daily_window_start(user: &User) -> DateTime<Utc> {
    user.daily_limit_reset_at - Duration::days(1)
}

/// Monthly window start: thirty days before the user's reset anchor.
pub fn monthly_window_start(user: &User) -> DateTime<Utc> {
    user.monthly_limit_reset_at - Duration::days(30)
}

/// Roll expired limit windows forward, zeroing the counters. Reset
/// timestamps only move forward.
pub fn advance_limit_windows(user: &mut User, now: DateTime<Utc>) -> bool {
    let mut changed = false;
    if now >= user.daily_limit_reset_at + Duration::days(1) {
        user.daily_transferred_amount = Decimal::ZERO;
        user.daily_limit_reset_at = now;
        changed = true;
    }
    if now >= user.monthly_limit_reset_at + Duration::days(30) {
        user.monthly_transferred_amount = Decimal::ZERO;
        user.monthly_limit_reset_at = now;
        changed = true;
    }
    if changed {
        user.updated_at = now;
    }
    changed
}

/// Fail when `amount` would push the user over either window's limit.
pub fn check_transfer_limits(
    db: &Database,
    user: &User,
    amount: Decimal,
) -> Result<(), ServiceError> {
    let daily_sum = db
        .sum_transfers_since(&user.id, daily_window_start(user))
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    if daily_sum + amount > user.daily_transfer_limit {
        return Err(ServiceError::DailyLimitExceeded);
    }

    let monthly_sum = db
        .sum_transfers_since(&user.id, monthly_window_start(user))
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    if monthly_sum + amount > user.monthly_transfer_limit {
        return Err(ServiceError::MonthlyLimitExceeded);
    }

    Ok(())
}

/// Mirror a successful submission into the user's counters.
pub fn record_transfer(user: &mut User, amount: Decimal, now: DateTime<Utc>) {
    user.daily_transferred_amount += amount;
    user.monthly_transferred_amount += amount;
    user.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Token;
    use crate::storage::{IdempotentInsert, TransactionRecord};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("limits.redb")).unwrap();
        (db, dir)
    }

    fn seed_transfer(db: &Database, sender: Uuid, amount: Decimal, key: &str) {
        let tx = TransactionRecord::new_transfer(
            key.to_string(),
            sender,
            Uuid::new_v4(),
            amount,
            Token::Usdc,
        );
        assert!(matches!(
            db.insert_transaction_idempotent(&tx).unwrap(),
            IdempotentInsert::Inserted
        ));
    }

    #[test]
    fn amount_within_limit_passes() {
        let (db, _dir) = temp_db();
        let user = User::new("+14155550101".to_string());
        seed_transfer(&db, user.id, dec!(100), "k-limit-1-aaaaaaaaaaa");

        assert!(check_transfer_limits(&db, &user, dec!(500)).is_ok());
    }

    #[test]
    fn daily_overflow_is_refused() {
        let (db, _dir) = temp_db();
        let mut user = User::new("+14155550101".to_string());
        user.daily_transfer_limit = dec!(100);
        seed_transfer(&db, user.id, dec!(90), "k-limit-2-aaaaaaaaaaa");

        let result = check_transfer_limits(&db, &user, dec!(25));
        assert!(matches!(result, Err(ServiceError::DailyLimitExceeded)));
    }

    #[test]
    fn monthly_overflow_is_refused() {
        let (db, _dir) = temp_db();
        let mut user = User::new("+14155550101".to_string());
        user.daily_transfer_limit = dec!(10000);
        user.monthly_transfer_limit = dec!(100);
        seed_transfer(&db, user.id, dec!(90), "k-limit-3-aaaaaaaaaaa");

        let result = check_transfer_limits(&db, &user, dec!(25));
        assert!(matches!(result, Err(ServiceError::MonthlyLimitExceeded)));
    }

    #[test]
    fn window_advance_zeroes_counters_and_moves_forward() {
        let mut user = User::new("+14155550101".to_string());
        user.daily_transferred_amount = dec!(500);
        user.daily_limit_reset_at = Utc::now() - Duration::days(2);
        let before = user.daily_limit_reset_at;

        let changed = advance_limit_windows(&mut user, Utc::now());
        assert!(changed);
        assert_eq!(user.daily_transferred_amount, Decimal::ZERO);
        assert!(user.daily_limit_reset_at > before);

        // A second advance within the window is a no-op
        assert!(!advance_limit_windows(&mut user, Utc::now()));
    }

    #[test]
    fn record_transfer_updates_both_counters() {
        let mut user = User::new("+14155550101".to_string());
        record_transfer(&mut user, dec!(25), Utc::now());
        assert_eq!(user.daily_transferred_amount, dec!(25));
        assert_eq!(user.monthly_transferred_amount, dec!(25));
    }
}
