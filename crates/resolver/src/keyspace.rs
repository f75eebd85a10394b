// Path: crates/resolver/src/keyspace.rs
//! Bit-exact key construction for the versioned store keyspace
//! (spec §6). Every function here returns raw bytes; delimiters are
//! literal colon bytes (`0x3A`), never formatted strings, since `{C}`
//! and `{key}` may themselves be non-UTF-8.

const SEP: u8 = b':';

pub const LATEST_BLOCK_HEIGHT: &[u8] = b"latest_block_height";

fn join(parts: &[&[u8]]) -> Vec<u8> {
    let len = parts.iter().map(|p| p.len()).sum::<usize>() + parts.len().saturating_sub(1);
    let mut out = Vec::with_capacity(len);
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(SEP);
        }
        out.extend_from_slice(part);
    }
    out
}

pub fn code_set_key(contract: &[u8]) -> Vec<u8> {
    join(&[b"code", contract])
}

pub fn code_blob_key(contract: &[u8], revision: &[u8]) -> Vec<u8> {
    join(&[b"code", contract, revision])
}

pub fn account_set_key(contract: &[u8]) -> Vec<u8> {
    join(&[b"account", contract])
}

pub fn account_blob_key(contract: &[u8], revision: &[u8]) -> Vec<u8> {
    join(&[b"account-data", contract, revision])
}

/// `composite_key` is already `{C}:{key}` — the byte-concatenation of
/// contract identifier and contract-chosen storage key (spec §3's
/// "Storage entry" composite key).
pub fn data_set_key(composite_key: &[u8]) -> Vec<u8> {
    join(&[b"data", composite_key])
}

pub fn data_blob_key(composite_key: &[u8], revision: &[u8]) -> Vec<u8> {
    join(&[b"data-value", composite_key, revision])
}

pub fn composite_key(contract: &[u8], storage_key: &[u8]) -> Vec<u8> {
    join(&[contract, storage_key])
}

/// Prefix every `data:{C}:` versioned-index key carries, used to strip
/// the resource-family and contract prefixes off scan results.
pub fn data_scan_prefix(contract: &[u8]) -> Vec<u8> {
    let mut prefix = join(&[b"data", contract]);
    prefix.push(SEP);
    prefix
}

/// Strips the `data:{C}:` prefix from a versioned-index key, returning
/// the contract-chosen storage key underneath.
pub fn strip_data_prefix<'a>(full_key: &'a [u8], contract: &[u8]) -> Option<&'a [u8]> {
    full_key
        .strip_prefix(data_scan_prefix(contract).as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_key_layout() {
        assert_eq!(code_set_key(b"alice.near"), b"code:alice.near");
        assert_eq!(
            code_blob_key(b"alice.near", b"r1"),
            b"code:alice.near:r1"
        );
        assert_eq!(
            account_blob_key(b"alice.near", b"r1"),
            b"account-data:alice.near:r1"
        );
        let composite = composite_key(b"alice.near", b"k");
        assert_eq!(composite, b"alice.near:k");
        assert_eq!(data_set_key(&composite), b"data:alice.near:k");
        assert_eq!(
            data_blob_key(&composite, b"r1"),
            b"data-value:alice.near:k:r1"
        );
    }

    #[test]
    fn strips_data_prefix() {
        let full = b"data:alice.near:mykey";
        assert_eq!(
            strip_data_prefix(full, b"alice.near"),
            Some(b"mykey".as_slice())
        );
        assert_eq!(strip_data_prefix(full, b"bob.near"), None);
    }
}
