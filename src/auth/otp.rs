// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-time password issue and verification.
//!
//! Codes are six digits, live five minutes, and are consumed on success
//! or after too many failed attempts. Delivery goes through the
//! [`OtpSender`] seam; the SMS/WhatsApp adapters live outside this
//! service and consume `{phone, code}`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Code lifetime.
const OTP_TTL: Duration = Duration::from_secs(300);
/// Verification attempts before the code is burned.
const MAX_ATTEMPTS: u32 = 5;

/// Delivery seam for issued codes.
pub trait OtpSender: Send + Sync {
    fn send(&self, phone: &str, code: &str);
}

/// Development sender that writes the code to the log.
pub struct LogOtpSender;

impl OtpSender for LogOtpSender {
    fn send(&self, phone: &str, code: &str) {
        tracing::info!(phone, code, "OTP issued (development sender - codes are logged)");
    }
}

struct OtpEntry {
    code: String,
    issued_at: Instant,
    attempts: u32,
}

/// In-memory store of outstanding codes, keyed by normalized phone.
pub struct OtpStore {
    entries: Mutex<HashMap<String, OtpEntry>>,
    ttl: Duration,
}

impl OtpStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: OTP_TTL,
        }
    }

    #[cfg(test)]
    fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Issue a fresh code for `phone`, replacing any outstanding one.
    pub fn issue(&self, phone: &str) -> String {
        let code = generate_code();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(
            phone.to_string(),
            OtpEntry {
                code: code.clone(),
                issued_at: Instant::now(),
                attempts: 0,
            },
        );
        code
    }

    /// Verify `code` for `phone`. The code is consumed on success, after
    /// expiry, and after [`MAX_ATTEMPTS`] failures.
    pub fn verify(&self, phone: &str, code: &str) -> bool {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(entry) = entries.get_mut(phone) else {
            return false;
        };

        if entry.issued_at.elapsed() > self.ttl {
            entries.remove(phone);
            return false;
        }

        entry.attempts += 1;
        if entry.code == code {
            entries.remove(phone);
            return true;
        }
        if entry.attempts >= MAX_ATTEMPTS {
            entries.remove(phone);
        }
        false
    }
}

impl Default for OtpStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Six random decimal digits.
fn generate_code() -> String {
    let mut bytes = [0u8; 4];
    // Entropy failure here would mean the host RNG is broken; fall back
    // to a time-derived code rather than panic in the auth path.
    if getrandom::getrandom(&mut bytes).is_err() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        bytes = nanos.to_le_bytes();
    }
    let value = u32::from_le_bytes(bytes) % 1_000_000;
    format!("{value:06}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify() {
        let store = OtpStore::new();
        let code = store.issue("+14155550101");
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        assert!(store.verify("+14155550101", &code));
        // Consumed on success
        assert!(!store.verify("+14155550101", &code));
    }

    #[test]
    fn wrong_code_fails_and_burns_after_max_attempts() {
        let store = OtpStore::new();
        let code = store.issue("+14155550101");

        for _ in 0..MAX_ATTEMPTS {
            assert!(!store.verify("+14155550101", "000000"));
        }
        // Burned - even the right code no longer works
        assert!(!store.verify("+14155550101", &code));
    }

    #[test]
    fn expired_code_fails() {
        let store = OtpStore::with_ttl(Duration::from_millis(1));
        let code = store.issue("+14155550101");
        std::thread::sleep(Duration::from_millis(5));
        assert!(!store.verify("+14155550101", &code));
    }

    #[test]
    fn reissue_replaces_previous_code() {
        let store = OtpStore::new();
        let first = store.issue("+14155550101");
        let second = store.issue("+14155550101");

        if first != second {
            assert!(!store.verify("+14155550101", &first));
        }
        // The latest code must have been re-issued by now; fetch verify
        let third = store.issue("+14155550101");
        assert!(store.verify("+14155550101", &third));
    }
}
