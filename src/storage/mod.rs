// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistence layer: embedded redb store, entity models, audit log.

pub mod audit;
pub mod db;
pub mod models;

pub use audit::{AuditEntry, AuditLog};
pub use db::{Database, DbError, DbResult, IdempotentInsert};
pub use models::{TransactionRecord, TxStatus, TxType, User, WalletRecord};
