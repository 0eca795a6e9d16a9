// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ephemeral challenge storage with per-address expiry.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;

/// Hard expiry for issued challenges.
pub const CHALLENGE_TTL: Duration = Duration::minutes(5);

/// Nonce entropy in bytes.
const NONCE_BYTES: usize = 16;

/// A server-issued, single-use, time-boxed message to be signed.
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Address the challenge was issued for (as supplied by the caller)
    pub address: String,
    /// The exact message the wallet must sign
    pub message: String,
    /// Random nonce embedded in the message
    pub nonce: String,
    /// Issue time; the challenge dies `CHALLENGE_TTL` later
    pub issued_at: DateTime<Utc>,
}

impl Challenge {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + CHALLENGE_TTL
    }

    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at()
    }
}

/// In-memory challenge store, one live challenge per address.
///
/// Expiry is enforced lazily on access; a new request for the same address
/// overwrites the prior challenge.
#[derive(Default)]
pub struct ChallengeStore {
    entries: DashMap<String, Challenge>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh challenge for an address, replacing any prior one.
    pub fn issue(&self, address: &str) -> Challenge {
        let mut nonce_bytes = [0u8; NONCE_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = hex::encode(nonce_bytes);
        let issued_at = Utc::now();

        let message = format!(
            "Verify wallet ownership\nAddress: {address}\nNonce: {nonce}\nIssued at: {}",
            issued_at.to_rfc3339()
        );

        let challenge = Challenge {
            address: address.to_string(),
            message,
            nonce,
            issued_at,
        };
        self.entries.insert(address.to_string(), challenge.clone());
        challenge
    }

    /// The live challenge for an address, if any.
    ///
    /// An expired challenge is removed and reported as absent.
    pub fn live(&self, address: &str) -> Option<Challenge> {
        let expired = match self.entries.get(address) {
            Some(entry) if entry.is_expired() => true,
            Some(entry) => return Some(entry.clone()),
            None => return None,
        };
        if expired {
            self.entries.remove(address);
        }
        None
    }

    /// Consume the challenge for an address (after successful verification).
    pub fn consume(&self, address: &str) {
        self.entries.remove(address);
    }

    /// Backdate a challenge's issue time (test hook for expiry paths).
    #[cfg(test)]
    pub(crate) fn backdate(&self, address: &str, by: Duration) {
        if let Some(mut entry) = self.entries.get_mut(address) {
            entry.issued_at -= by;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_embeds_address_and_nonce() {
        let store = ChallengeStore::new();
        let challenge = store.issue("addr-1");

        assert!(challenge.message.contains("addr-1"));
        assert!(challenge.message.contains(&challenge.nonce));
        // 16 bytes of entropy, hex-encoded
        assert_eq!(challenge.nonce.len(), 32);
    }

    #[test]
    fn reissue_replaces_prior_challenge() {
        let store = ChallengeStore::new();
        let first = store.issue("addr-1");
        let second = store.issue("addr-1");

        assert_ne!(first.nonce, second.nonce);
        let live = store.live("addr-1").unwrap();
        assert_eq!(live.nonce, second.nonce);
    }

    #[test]
    fn expired_challenge_is_absent() {
        let store = ChallengeStore::new();
        store.issue("addr-1");
        store.backdate("addr-1", CHALLENGE_TTL + Duration::seconds(1));

        assert!(store.live("addr-1").is_none());
    }

    #[test]
    fn consume_removes_challenge() {
        let store = ChallengeStore::new();
        store.issue("addr-1");
        store.consume("addr-1");
        assert!(store.live("addr-1").is_none());
    }

    #[test]
    fn challenges_are_per_address() {
        let store = ChallengeStore::new();
        store.issue("addr-1");
        assert!(store.live("addr-2").is_none());
    }
}
