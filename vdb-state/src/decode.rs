use alloy_consensus::Account;
use alloy_primitives::{Bytes as RlpBytes, U256};
use alloy_rlp::Decodable;

use crate::error::{Error, Result};

/// Splits a trie leaf node into its two elements and returns the value
/// element. Leaf and removed nodes are RLP lists of `[partial_path, value]`;
/// anything else is an index invariant violation.
fn leaf_value(node: &[u8]) -> Result<RlpBytes> {
    let mut buf = node;
    let header = alloy_rlp::Header::decode(&mut buf)
        .map_err(|e| Error::invariant(format!("trie leaf rlp: {e}")))?;
    if !header.list {
        return Err(Error::invariant("trie leaf rlp is not a list"));
    }
    let _path = RlpBytes::decode(&mut buf)
        .map_err(|e| Error::invariant(format!("trie leaf path rlp: {e}")))?;
    let value = RlpBytes::decode(&mut buf)
        .map_err(|e| Error::invariant(format!("trie leaf value rlp: {e}")))?;
    if !buf.is_empty() {
        return Err(Error::invariant(
            "trie leaf rlp decoded into more than two elements",
        ));
    }
    Ok(value)
}

/// Decodes a state-trie leaf into the account blob
/// `{nonce, balance, storage_root, code_hash}`.
pub fn decode_state_leaf(node: &[u8]) -> Result<Account> {
    let value = leaf_value(node)?;
    Account::decode(&mut value.as_ref())
        .map_err(|e| Error::invariant(format!("account rlp: {e}")))
}

/// Decodes a storage-trie leaf into its raw value element. The element is
/// itself the RLP of the stored word.
pub fn decode_storage_leaf(node: &[u8]) -> Result<RlpBytes> {
    leaf_value(node)
}

/// Decodes a storage leaf value element into the 32-byte big-endian word.
pub fn storage_value_to_word(value: &[u8]) -> Result<U256> {
    if value.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::decode(&mut &value[..]).map_err(|e| Error::invariant(format!("storage value rlp: {e}")))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{B256, U256};
    use alloy_rlp::Encodable;

    use super::*;

    fn encode_leaf(path: &[u8], value: &[u8]) -> Vec<u8> {
        let items: [&[u8]; 2] = [path, value];
        let mut out = Vec::new();
        alloy_rlp::encode_list::<&[u8], [u8]>(&items, &mut out);
        out
    }

    #[test]
    fn state_leaf_round_trips_account() {
        let account = Account {
            nonce: 7,
            balance: U256::from(1_000_000u64),
            storage_root: B256::repeat_byte(0xaa),
            code_hash: B256::repeat_byte(0xbb),
        };
        let mut blob = Vec::new();
        account.encode(&mut blob);
        let node = encode_leaf(&[0x20, 0x01], &blob);

        let decoded = decode_state_leaf(&node).unwrap();
        assert_eq!(decoded, account);
    }

    #[test]
    fn storage_leaf_yields_value_element() {
        let word = U256::from(1_000_000_000_000_000_000_000u128);
        let mut value = Vec::new();
        word.encode(&mut value);
        let node = encode_leaf(&[0x3f], &value);

        let element = decode_storage_leaf(&node).unwrap();
        assert_eq!(storage_value_to_word(&element).unwrap(), word);
    }

    #[test]
    fn non_list_node_is_invariant_violation() {
        let mut node = Vec::new();
        "just bytes".as_bytes().encode(&mut node);
        assert!(matches!(
            decode_state_leaf(&node),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn three_element_list_is_invariant_violation() {
        let items: [&[u8]; 3] = [&[0x01], &[0x02], &[0x03]];
        let mut node = Vec::new();
        alloy_rlp::encode_list::<&[u8], [u8]>(&items, &mut node);
        assert!(matches!(
            decode_storage_leaf(&node),
            Err(Error::InvariantViolation(_))
        ));
    }
}
