// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain-specific signature verification and wallet connection.
//!
//! Ethereum signatures use the EIP-191 personal-message scheme: the signer
//! address is recovered from the signature and compared case-insensitively
//! against the claimed address. Solana signatures are detached Ed25519
//! signatures over the UTF-8 message bytes, verified under the public key
//! encoded by the base58 address. Both paths do real cryptographic
//! verification; there is no accept-all fallback.

use std::sync::Arc;

use ed25519_dalek::{Signature as Ed25519Signature, Verifier, VerifyingKey};

use crate::models::Chain;
use crate::storage::WalletDb;

use super::{Challenge, ChallengeStore, ConnectedWallet, VerifyError, VerifyResult};

/// Issues challenges and verifies wallet ownership proofs.
pub struct OwnershipVerifier {
    challenges: ChallengeStore,
    wallets: Arc<WalletDb>,
}

impl OwnershipVerifier {
    pub fn new(wallets: Arc<WalletDb>) -> Self {
        Self {
            challenges: ChallengeStore::new(),
            wallets,
        }
    }

    /// Issue (or re-issue) the challenge message for an address.
    pub fn issue_challenge(&self, address: &str) -> Challenge {
        self.challenges.issue(address)
    }

    /// Verify a signature against the live challenge for an address.
    ///
    /// A successful verification consumes the challenge (single use);
    /// a failed one leaves it in place so the client can retry within
    /// the expiry window.
    pub fn verify(&self, address: &str, chain: Chain, signature: &str) -> VerifyResult<()> {
        let challenge = self
            .challenges
            .live(address)
            .ok_or_else(|| VerifyError::ChallengeExpired(address.to_string()))?;

        let valid = match chain {
            Chain::Ethereum => verify_ethereum(address, &challenge.message, signature),
            Chain::Solana => verify_solana(address, &challenge.message, signature),
        };

        if valid {
            self.challenges.consume(address);
            Ok(())
        } else {
            Err(VerifyError::SignatureInvalid)
        }
    }

    /// Verify ownership and persist the connected wallet.
    pub fn connect(
        &self,
        user_id: &str,
        address: &str,
        chain: Chain,
        signature: &str,
    ) -> VerifyResult<ConnectedWallet> {
        self.verify(address, chain, signature)?;

        if let Some(existing) = self.wallets.claimant(chain, address)? {
            if existing.user_id != user_id {
                return Err(VerifyError::AddressAlreadyClaimed);
            }
        }

        let wallet = ConnectedWallet {
            user_id: user_id.to_string(),
            address: chain.normalize_address(address),
            chain,
            verified: true,
            signature: signature.to_string(),
            connected_at: chrono::Utc::now(),
        };
        self.wallets.insert(&wallet)?;

        tracing::info!(user_id, address = %wallet.address, %chain, "Wallet connected");
        Ok(wallet)
    }

    /// All wallets connected by a user.
    pub fn connected_wallets(&self, user_id: &str) -> VerifyResult<Vec<ConnectedWallet>> {
        Ok(self.wallets.list_by_user(user_id)?)
    }

    /// Remove a user's claim on an address. Owner-only; another user's
    /// claim is indistinguishable from no claim.
    pub fn disconnect(&self, user_id: &str, address: &str) -> VerifyResult<ConnectedWallet> {
        let wallet = self
            .wallets
            .find_claim(user_id, address)?
            .ok_or_else(|| VerifyError::NotFound(address.to_string()))?;
        self.wallets.delete(wallet.chain, &wallet.address)?;
        Ok(wallet)
    }
}

// =============================================================================
// Chain-specific verification
// =============================================================================

/// EIP-191 personal-message recovery; true iff the recovered signer equals
/// the claimed address (case-insensitive).
fn verify_ethereum(address: &str, message: &str, signature: &str) -> bool {
    let sig_hex = signature.strip_prefix("0x").unwrap_or(signature);
    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(sig) = alloy::primitives::Signature::from_raw(&sig_bytes) else {
        return false;
    };
    match sig.recover_address_from_msg(message.as_bytes()) {
        Ok(recovered) => recovered.to_string().eq_ignore_ascii_case(address),
        Err(_) => false,
    }
}

/// Detached Ed25519 verification over the UTF-8 message bytes, under the
/// public key encoded by the base58 address.
fn verify_solana(address: &str, message: &str, signature: &str) -> bool {
    let Ok(pk_bytes) = bs58::decode(address).into_vec() else {
        return false;
    };
    let pk_array: [u8; 32] = match pk_bytes.try_into() {
        Ok(array) => array,
        Err(_) => return false,
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&pk_array) else {
        return false;
    };

    // Wallets commonly emit base58 signatures; accept hex as a fallback.
    let sig_bytes = match bs58::decode(signature).into_vec() {
        Ok(bytes) => bytes,
        Err(_) => {
            let sig_hex = signature.strip_prefix("0x").unwrap_or(signature);
            match hex::decode(sig_hex) {
                Ok(bytes) => bytes,
                Err(_) => return false,
            }
        }
    };
    let sig_array: [u8; 64] = match sig_bytes.try_into() {
        Ok(array) => array,
        Err(_) => return false,
    };
    let sig = Ed25519Signature::from_bytes(&sig_array);

    verifying_key.verify(message.as_bytes(), &sig).is_ok()
}

// =============================================================================
// Tests
// =============================================================================
