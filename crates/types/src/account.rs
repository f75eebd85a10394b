// Path: crates/types/src/account.rs
//! The account record binary layout (spec §6).
//!
//! The wire format is external and bit-exact — little-endian,
//! concatenated, no padding — so it is hand-decoded the same way the
//! teacher decodes its own fixed binary layouts in
//! `storage/src/redb_epoch_store.rs` (`be64`/`parse_u64`) rather than
//! derived through a generic serde codec.

use crate::error::ViewError;

/// Total encoded size in bytes: 16 + 16 + 32 + 8.
pub const ACCOUNT_RECORD_LEN: usize = 72;

/// A contract account's balance and code pointer, as stored at a given
/// revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountRecord {
    /// Total token balance, including locked amount.
    pub amount: u128,
    /// The portion of `amount` currently locked (e.g. by stake).
    pub locked: u128,
    /// The hash of the code blob currently deployed to this account.
    pub code_hash: [u8; 32],
    /// Bytes of storage this account is charged for.
    pub storage_usage: u64,
}

impl AccountRecord {
    /// Encodes the record into its 72-byte little-endian wire format.
    pub fn encode(&self) -> [u8; ACCOUNT_RECORD_LEN] {
        let mut out = [0u8; ACCOUNT_RECORD_LEN];
        out[0..16].copy_from_slice(&self.amount.to_le_bytes());
        out[16..32].copy_from_slice(&self.locked.to_le_bytes());
        out[32..64].copy_from_slice(&self.code_hash);
        out[64..72].copy_from_slice(&self.storage_usage.to_le_bytes());
        out
    }

    /// Decodes a record from its 72-byte little-endian wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ViewError> {
        if bytes.len() != ACCOUNT_RECORD_LEN {
            return Err(ViewError::AccountDecode(format!(
                "expected {ACCOUNT_RECORD_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut amount_buf = [0u8; 16];
        amount_buf.copy_from_slice(&bytes[0..16]);
        let mut locked_buf = [0u8; 16];
        locked_buf.copy_from_slice(&bytes[16..32]);
        let mut code_hash = [0u8; 32];
        code_hash.copy_from_slice(&bytes[32..64]);
        let mut storage_usage_buf = [0u8; 8];
        storage_usage_buf.copy_from_slice(&bytes[64..72]);

        Ok(Self {
            amount: u128::from_le_bytes(amount_buf),
            locked: u128::from_le_bytes(locked_buf),
            code_hash,
            storage_usage: u64::from_le_bytes(storage_usage_buf),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::any;

    fn roundtrip(record: AccountRecord) {
        let encoded = record.encode();
        assert_eq!(encoded.len(), ACCOUNT_RECORD_LEN);
        let decoded = AccountRecord::decode(&encoded).expect("decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn roundtrips_zero() {
        roundtrip(AccountRecord::default());
    }

    #[test]
    fn roundtrips_boundary_values() {
        for amount in [0u128, 1u128 << 127, u128::MAX] {
            for locked in [0u128, 1u128 << 127, u128::MAX] {
                for storage_usage in [0u64, 1, (1u64 << 63) - 1, u64::MAX] {
                    roundtrip(AccountRecord {
                        amount,
                        locked,
                        code_hash: [0xab; 32],
                        storage_usage,
                    });
                }
            }
        }
    }

    #[test]
    fn rejects_wrong_length() {
        let err = AccountRecord::decode(&[0u8; 71]).unwrap_err();
        assert!(matches!(err, ViewError::AccountDecode(_)));
    }

    proptest::proptest! {
        #[test]
        fn roundtrips_arbitrary_values(
            amount_hi in any::<u64>(),
            amount_lo in any::<u64>(),
            locked_hi in any::<u64>(),
            locked_lo in any::<u64>(),
            storage_usage in any::<u64>(),
            code_hash in proptest::array::uniform32(any::<u8>()),
        ) {
            let amount = (u128::from(amount_hi) << 64) | u128::from(amount_lo);
            let locked = (u128::from(locked_hi) << 64) | u128::from(locked_lo);
            roundtrip(AccountRecord { amount, locked, code_hash, storage_usage });
        }
    }
}
