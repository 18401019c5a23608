// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Legacy Solana transaction wire format.
//!
//! Builds and signs the exact byte layout the RPC `sendTransaction` method
//! expects: a compact-u16 prefixed signature list followed by a serialized
//! message (header, account keys, recent blockhash, compiled instructions).
//!
//! Only the pieces the payment pipeline needs are implemented: the SPL
//! Token `Transfer` instruction, associated-token-account creation, and
//! program-derived-address lookup for ATAs.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

/// System program id.
pub const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";
/// SPL Token program id.
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
/// SPL Associated Token Account program id.
pub const ASSOCIATED_TOKEN_PROGRAM: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

/// SPL Token instruction tag for `Transfer`.
const TOKEN_TRANSFER_TAG: u8 = 3;

/// Domain separator for program-derived addresses.
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Wire-format errors.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("No viable program-derived address for seeds")]
    NoViablePda,
}

/// A 32-byte Solana account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
    /// Parse a base58-encoded address. The string form must be 32-44
    /// characters and decode to exactly 32 bytes.
    pub fn from_base58(s: &str) -> Result<Self, TxError> {
        if s.len() < 32 || s.len() > 44 {
            return Err(TxError::InvalidAddress(format!(
                "address length {} out of range 32-44",
                s.len()
            )));
        }
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| TxError::InvalidAddress(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TxError::InvalidAddress("not 32 bytes".to_string()))?;
        Ok(Pubkey(arr))
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Whether the bytes decompress to a point on the ed25519 curve.
    /// Program-derived addresses must be off-curve.
    fn is_on_curve(&self) -> bool {
        VerifyingKey::from_bytes(&self.0).is_ok()
    }
}

impl std::fmt::Display for Pubkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base58())
    }
}

/// Syntactic address validation (base58, 32-44 chars, 32 bytes).
pub fn is_valid_address(s: &str) -> bool {
    Pubkey::from_base58(s).is_ok()
}

/// Generate a fresh Ed25519 keypair.
///
/// Returns the base58 public key and the 64-byte secret in Solana layout:
/// 32-byte seed followed by the 32-byte public key.
pub fn generate_keypair() -> Result<(String, [u8; 64]), TxError> {
    let mut seed = [0u8; 32];
    getrandom::getrandom(&mut seed)
        .map_err(|e| TxError::InvalidSecretKey(format!("entropy failure: {e}")))?;

    let signing = SigningKey::from_bytes(&seed);
    let public = signing.verifying_key().to_bytes();

    let mut secret = [0u8; 64];
    secret[..32].copy_from_slice(&seed);
    secret[32..].copy_from_slice(&public);

    Ok((bs58::encode(public).into_string(), secret))
}

/// Derive the public key from a 64-byte secret, verifying the embedded
/// public half matches the seed.
pub fn pubkey_from_secret(secret: &[u8; 64]) -> Result<Pubkey, TxError> {
    let seed: [u8; 32] = secret[..32].try_into().expect("slice is 32 bytes");
    let derived = SigningKey::from_bytes(&seed).verifying_key().to_bytes();
    if derived != secret[32..] {
        return Err(TxError::InvalidSecretKey(
            "public half does not match seed".to_string(),
        ));
    }
    Ok(Pubkey(derived))
}

/// Find the program-derived address for the given seeds.
///
/// Walks bump seeds from 255 downward until the candidate hash falls off
/// the ed25519 curve, per the runtime's derivation rule.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8), TxError> {
    for bump in (0..=255u8).rev() {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update([bump]);
        hasher.update(program_id.0);
        hasher.update(PDA_MARKER);
        let candidate = Pubkey(hasher.finalize().into());
        if !candidate.is_on_curve() {
            return Ok((candidate, bump));
        }
    }
    Err(TxError::NoViablePda)
}

/// Derive the associated token account for `(owner, mint)`.
pub fn derive_associated_token_account(owner: &Pubkey, mint: &Pubkey) -> Result<Pubkey, TxError> {
    let token_program = Pubkey::from_base58(TOKEN_PROGRAM)?;
    let ata_program = Pubkey::from_base58(ASSOCIATED_TOKEN_PROGRAM)?;
    let (address, _bump) = find_program_address(
        &[&owner.0, &token_program.0, &mint.0],
        &ata_program,
    )?;
    Ok(address)
}

/// An account referenced by an instruction.
#[derive(Debug, Clone)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// A single instruction before compilation.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// Build an SPL Token `Transfer` instruction.
pub fn token_transfer_instruction(
    source_ata: Pubkey,
    destination_ata: Pubkey,
    owner: Pubkey,
    raw_amount: u64,
) -> Result<Instruction, TxError> {
    let mut data = Vec::with_capacity(9);
    data.push(TOKEN_TRANSFER_TAG);
    data.extend_from_slice(&raw_amount.to_le_bytes());

    Ok(Instruction {
        program_id: Pubkey::from_base58(TOKEN_PROGRAM)?,
        accounts: vec![
            AccountMeta::writable(source_ata, false),
            AccountMeta::writable(destination_ata, false),
            AccountMeta::readonly(owner, true),
        ],
        data,
    })
}

/// Build a `Create` instruction for the associated token account program.
/// The payer funds the new account.
pub fn create_ata_instruction(
    payer: Pubkey,
    ata: Pubkey,
    owner: Pubkey,
    mint: Pubkey,
) -> Result<Instruction, TxError> {
    Ok(Instruction {
        program_id: Pubkey::from_base58(ASSOCIATED_TOKEN_PROGRAM)?,
        accounts: vec![
            AccountMeta::writable(payer, true),
            AccountMeta::writable(ata, false),
            AccountMeta::readonly(owner, false),
            AccountMeta::readonly(mint, false),
            AccountMeta::readonly(Pubkey::from_base58(SYSTEM_PROGRAM)?, false),
            AccountMeta::readonly(Pubkey::from_base58(TOKEN_PROGRAM)?, false),
        ],
        data: Vec::new(),
    })
}

/// Compact-u16 length encoding used throughout the wire format.
fn encode_shortvec_len(out: &mut Vec<u8>, mut value: u16) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// A compiled legacy message ready for signing.
#[derive(Debug, Clone)]
pub struct Message {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: [u8; 32],
    /// (program_id_index, account_indices, data)
    pub instructions: Vec<(u8, Vec<u8>, Vec<u8>)>,
}

impl Message {
    /// Compile instructions into a message with `payer` as fee payer.
    ///
    /// Account ordering follows the runtime's requirement: writable
    /// signers (payer first), readonly signers, writable non-signers,
    /// readonly non-signers.
    pub fn compile(
        instructions: &[Instruction],
        payer: Pubkey,
        recent_blockhash: [u8; 32],
    ) -> Self {
        // Merge duplicate keys, keeping the strongest privileges.
        let mut metas: Vec<AccountMeta> = vec![AccountMeta::writable(payer, true)];
        let mut merge = |meta: AccountMeta| {
            match metas.iter().position(|m| m.pubkey == meta.pubkey) {
                Some(i) => {
                    metas[i].is_signer |= meta.is_signer;
                    metas[i].is_writable |= meta.is_writable;
                }
                None => metas.push(meta),
            }
        };
        for ix in instructions {
            for account in &ix.accounts {
                merge(account.clone());
            }
            merge(AccountMeta::readonly(ix.program_id, false));
        }

        let rank = |m: &AccountMeta| match (m.is_signer, m.is_writable) {
            (true, true) => 0u8,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        // Payer stays first: it is the only writable signer inserted ahead
        // of the merge, and the sort is stable.
        metas.sort_by_key(rank);

        let num_required_signatures = metas.iter().filter(|m| m.is_signer).count() as u8;
        let num_readonly_signed = metas
            .iter()
            .filter(|m| m.is_signer && !m.is_writable)
            .count() as u8;
        let num_readonly_unsigned = metas
            .iter()
            .filter(|m| !m.is_signer && !m.is_writable)
            .count() as u8;

        let account_keys: Vec<Pubkey> = metas.iter().map(|m| m.pubkey).collect();
        let index_of = |key: &Pubkey| -> u8 {
            account_keys
                .iter()
                .position(|k| k == key)
                .expect("compiled key present") as u8
        };

        let compiled = instructions
            .iter()
            .map(|ix| {
                let indices: Vec<u8> = ix.accounts.iter().map(|a| index_of(&a.pubkey)).collect();
                (index_of(&ix.program_id), indices, ix.data.clone())
            })
            .collect();

        Self {
            num_required_signatures,
            num_readonly_signed,
            num_readonly_unsigned,
            account_keys,
            recent_blockhash,
            instructions: compiled,
        }
    }

    /// Serialize to the wire layout.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.push(self.num_required_signatures);
        out.push(self.num_readonly_signed);
        out.push(self.num_readonly_unsigned);

        encode_shortvec_len(&mut out, self.account_keys.len() as u16);
        for key in &self.account_keys {
            out.extend_from_slice(&key.0);
        }

        out.extend_from_slice(&self.recent_blockhash);

        encode_shortvec_len(&mut out, self.instructions.len() as u16);
        for (program_index, accounts, data) in &self.instructions {
            out.push(*program_index);
            encode_shortvec_len(&mut out, accounts.len() as u16);
            out.extend_from_slice(accounts);
            encode_shortvec_len(&mut out, data.len() as u16);
            out.extend_from_slice(data);
        }

        out
    }
}

/// Sign a message with the fee payer's 64-byte secret and serialize the
/// full transaction. Returns `(base58 signature, wire bytes)`.
pub fn sign_and_serialize(
    message: &Message,
    secret: &[u8; 64],
) -> Result<(String, Vec<u8>), TxError> {
    let seed: [u8; 32] = secret[..32].try_into().expect("slice is 32 bytes");
    let signing = SigningKey::from_bytes(&seed);

    let message_bytes = message.serialize();
    let signature = signing.sign(&message_bytes);

    let mut wire = Vec::with_capacity(1 + 64 + message_bytes.len());
    encode_shortvec_len(&mut wire, 1);
    wire.extend_from_slice(&signature.to_bytes());
    wire.extend_from_slice(&message_bytes);

    Ok((bs58::encode(signature.to_bytes()).into_string(), wire))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Verifier;

    fn test_keypair() -> (Pubkey, [u8; 64]) {
        let (pub_b58, secret) = generate_keypair().unwrap();
        (Pubkey::from_base58(&pub_b58).unwrap(), secret)
    }

    #[test]
    fn shortvec_known_encodings() {
        let cases: &[(u16, &[u8])] = &[
            (0, &[0x00]),
            (5, &[0x05]),
            (0x7f, &[0x7f]),
            (0x80, &[0x80, 0x01]),
            (0x3fff, &[0xff, 0x7f]),
            (0x4000, &[0x80, 0x80, 0x01]),
        ];
        for (value, expected) in cases {
            let mut out = Vec::new();
            encode_shortvec_len(&mut out, *value);
            assert_eq!(out, *expected, "encoding of {value}");
        }
    }

    #[test]
    fn system_program_is_all_zero_bytes() {
        let key = Pubkey::from_base58(SYSTEM_PROGRAM).unwrap();
        assert_eq!(key.0, [0u8; 32]);
        assert_eq!(key.to_base58(), SYSTEM_PROGRAM);
    }

    #[test]
    fn address_validation_bounds() {
        assert!(is_valid_address(TOKEN_PROGRAM));
        assert!(!is_valid_address("short"));
        assert!(!is_valid_address("0OIl-not-base58-0OIl-not-base58-0OIl"));
    }

    #[test]
    fn generated_keypair_is_consistent() {
        let (pubkey, secret) = test_keypair();
        assert_eq!(pubkey_from_secret(&secret).unwrap(), pubkey);

        let mut corrupted = secret;
        corrupted[40] ^= 0xff;
        assert!(pubkey_from_secret(&corrupted).is_err());
    }

    #[test]
    fn keypairs_are_distinct() {
        let (a, _) = generate_keypair().unwrap();
        let (b, _) = generate_keypair().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn ata_derivation_is_deterministic_and_off_curve() {
        let (owner, _) = test_keypair();
        let mint = Pubkey::from_base58("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU").unwrap();

        let a = derive_associated_token_account(&owner, &mint).unwrap();
        let b = derive_associated_token_account(&owner, &mint).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_on_curve());

        let (other_owner, _) = test_keypair();
        let c = derive_associated_token_account(&other_owner, &mint).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn transfer_instruction_data_layout() {
        let (owner, _) = test_keypair();
        let (src, _) = test_keypair();
        let (dst, _) = test_keypair();

        let ix = token_transfer_instruction(src, dst, owner, 25_000_000).unwrap();
        assert_eq!(ix.data[0], TOKEN_TRANSFER_TAG);
        assert_eq!(&ix.data[1..], &25_000_000u64.to_le_bytes());
        assert_eq!(ix.accounts.len(), 3);
        assert!(ix.accounts[2].is_signer);
    }

    #[test]
    fn compiled_message_orders_payer_first() {
        let (owner, _) = test_keypair();
        let (src, _) = test_keypair();
        let (dst, _) = test_keypair();

        let ix = token_transfer_instruction(src, dst, owner, 1).unwrap();
        let message = Message::compile(&[ix], owner, [7u8; 32]);

        assert_eq!(message.account_keys[0], owner);
        assert_eq!(message.num_required_signatures, 1);
        assert_eq!(message.num_readonly_signed, 0);
        // Token program is the only readonly unsigned key besides none —
        // src/dst are writable non-signers.
        assert_eq!(message.num_readonly_unsigned, 1);

        let bytes = message.serialize();
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[3], message.account_keys.len() as u8);
    }

    #[test]
    fn signed_transaction_verifies() {
        let (owner, secret) = test_keypair();
        let (src, _) = test_keypair();
        let (dst, _) = test_keypair();

        let ix = token_transfer_instruction(src, dst, owner, 42).unwrap();
        let message = Message::compile(&[ix], owner, [1u8; 32]);
        let (sig_b58, wire) = sign_and_serialize(&message, &secret).unwrap();

        // Wire = shortvec(1) + signature + message
        assert_eq!(wire[0], 1);
        let sig_bytes: [u8; 64] = wire[1..65].try_into().unwrap();
        assert_eq!(bs58::encode(sig_bytes).into_string(), sig_b58);

        let verifying = VerifyingKey::from_bytes(&owner.0).unwrap();
        let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        assert!(verifying.verify(&wire[65..], &signature).is_ok());
    }
}
