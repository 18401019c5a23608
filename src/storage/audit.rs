// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Every transaction state change, key rotation, and authentication event
//! lands in the append-only `audit_log` table. There is no update or
//! delete path; a failed audit write is logged and never fails the
//! operation being audited.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::db::Database;

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry id.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// User who triggered the event, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    /// Event name, e.g. `payment_sent`, `key_rotation`.
    pub action: String,
    /// Entity kind affected, e.g. `transaction`, `wallet`.
    pub entity_type: String,
    /// Entity identifier, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Snapshot before the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_values: Option<serde_json::Value>,
    /// Snapshot after the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_values: Option<serde_json::Value>,
    /// Free-form request context (trace id, job name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            old_values: None,
            new_values: None,
            context: None,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_old_values(mut self, values: serde_json::Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn with_new_values(mut self, values: serde_json::Value) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Handle for appending audit entries.
#[derive(Clone)]
pub struct AuditLog {
    db: Arc<Database>,
}

impl AuditLog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append an entry. Failures are logged, never propagated - an audit
    /// hiccup must not abort a payment.
    pub fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.db.append_audit(&entry) {
            tracing::warn!(
                action = %entry.action,
                entity_type = %entry.entity_type,
                error = %e,
                "failed to append audit entry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_fields() {
        let user = Uuid::new_v4();
        let entry = AuditEntry::new("payment_sent", "transaction")
            .with_user(user)
            .with_entity_id("tx-1")
            .with_new_values(json!({ "status": "processing" }))
            .with_context("trace-abc");

        assert_eq!(entry.action, "payment_sent");
        assert_eq!(entry.user_id, Some(user));
        assert_eq!(entry.entity_id.as_deref(), Some("tx-1"));
        assert!(entry.old_values.is_none());
        assert_eq!(entry.context.as_deref(), Some("trace-abc"));
    }

    #[test]
    fn record_appends_to_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("audit.redb")).unwrap());
        let log = AuditLog::new(db.clone());

        log.record(AuditEntry::new("wallet_created", "wallet").with_entity_id("pub-1"));

        let entries = db.list_audit_recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "wallet_created");
    }
}
