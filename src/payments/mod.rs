// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment pipeline: idempotent intake, limits, submission.

pub mod engine;
pub mod limits;
pub mod rate_limit;

pub use engine::{PaymentEngine, SendPaymentRequest, WithdrawRequest};
pub use rate_limit::{FixedWindowLimiter, NoopLimiter, RateLimiter};
