use std::str::FromStr;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;
use vdb_state::BlockRef;

use crate::{
    hex::{self, decode, decode_quantity, DecodeHexError},
    jsonrpc::JsonRpcError,
};

pub type EthAddress = FixedData<20>;
pub type EthHash = FixedData<32>;

// https://ethereum.org/developers/docs/apis/json-rpc#unformatted-data-encoding
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnformattedData(pub Vec<u8>);

impl UnformattedData {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for UnformattedData {
    type Err = DecodeHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s).map(UnformattedData)
    }
}

impl Serialize for UnformattedData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for UnformattedData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let buf = String::deserialize(deserializer)?;
        UnformattedData::from_str(&buf)
            .map_err(|e| serde::de::Error::custom(format!("UnformattedData parse failed: {e:?}")))
    }
}

// https://ethereum.org/developers/docs/apis/json-rpc#hex-encoding
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Quantity(pub u64);

impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{:x}", self.0))
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum QuantityOrString {
            Num(u64),
            Str(String),
        }

        match QuantityOrString::deserialize(deserializer)? {
            QuantityOrString::Num(n) => Ok(Quantity(n)),
            QuantityOrString::Str(s) => {
                if let Some(hex) = s.strip_prefix("0x") {
                    u64::from_str_radix(hex, 16)
                        .map(Quantity)
                        .map_err(serde::de::Error::custom)
                } else {
                    s.parse().map(Quantity).map_err(serde::de::Error::custom)
                }
            }
        }
    }
}

/// A 256-bit quantity serialized as minimal hex, e.g. balances.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigQuantity(pub U256);

impl Serialize for BigQuantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{:x}", self.0))
    }
}

impl<'de> Deserialize<'de> for BigQuantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let buf = String::deserialize(deserializer)?;
        U256::from_str(&buf)
            .map(BigQuantity)
            .map_err(|e| serde::de::Error::custom(format!("U256 parse failed: {e:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedData<const N: usize>(pub [u8; N]);

impl<const N: usize> std::fmt::Display for FixedData<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl<const N: usize> FromStr for FixedData<N> {
    type Err = DecodeHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s).map(|d| match d.try_into() {
            Ok(a) => Ok(FixedData(a)),
            Err(_) => Err(DecodeHexError::InvalidLen),
        })?
    }
}

impl<const N: usize> Serialize for FixedData<N> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedData<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let buf = String::deserialize(deserializer)?;
        FixedData::from_str(&buf)
            .map_err(|e| serde::de::Error::custom(format!("FixedData parse failed: {e:?}")))
    }
}

impl From<B256> for FixedData<32> {
    fn from(bytes: B256) -> Self {
        Self(bytes.0)
    }
}

impl From<Address> for FixedData<20> {
    fn from(addr: Address) -> Self {
        FixedData(addr.0 .0)
    }
}

impl From<FixedData<32>> for B256 {
    fn from(data: FixedData<32>) -> Self {
        B256::from(data.0)
    }
}

impl From<FixedData<20>> for Address {
    fn from(data: FixedData<20>) -> Self {
        Address::from(data.0)
    }
}

/// Block tags. The index records no finality distinctions, so `earliest`,
/// `safe`, `finalized` and `pending` coarsen to `latest`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockTags {
    Number(Quantity),
    #[default]
    Latest,
}

impl FromStr for BlockTags {
    type Err = DecodeHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earliest" => Ok(Self::Latest),
            "latest" => Ok(Self::Latest),
            "safe" => Ok(Self::Latest),
            "finalized" => Ok(Self::Latest),
            "pending" => Ok(Self::Latest),
            _ => decode_quantity(s).map(|q| Self::Number(Quantity(q))),
        }
    }
}

impl<'de> Deserialize<'de> for BlockTags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let buf = String::deserialize(deserializer)?;
        BlockTags::from_str(&buf)
            .map_err(|e| serde::de::Error::custom(format!("BlockTags parse failed: {e:?}")))
    }
}

impl From<BlockTags> for BlockRef {
    fn from(tag: BlockTags) -> Self {
        match tag {
            BlockTags::Latest => BlockRef::Latest,
            BlockTags::Number(q) => BlockRef::Number(q.0),
        }
    }
}

/// A block position parameter: a tag, a height, or an EIP-1898 object
/// carrying `blockHash` or `blockNumber`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTagOrHash {
    BlockTags(BlockTags),
    Hash(EthHash),
}

impl From<BlockTagOrHash> for BlockRef {
    fn from(at: BlockTagOrHash) -> Self {
        match at {
            BlockTagOrHash::BlockTags(tag) => tag.into(),
            BlockTagOrHash::Hash(hash) => BlockRef::Hash(B256::from(hash.0)),
        }
    }
}

impl<'de> Deserialize<'de> for BlockTagOrHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Eip1898 {
            block_hash: Option<EthHash>,
            block_number: Option<BlockTags>,
            #[serde(default)]
            #[allow(dead_code)]
            require_canonical: Option<bool>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Object(Eip1898),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Str(s) => BlockTags::from_str(&s)
                .map(BlockTagOrHash::BlockTags)
                .or_else(|_| EthHash::from_str(&s).map(BlockTagOrHash::Hash))
                .map_err(|e| {
                    serde::de::Error::custom(format!("BlockTagOrHash parse failed: {e:?}"))
                }),
            Raw::Object(obj) => match (obj.block_hash, obj.block_number) {
                (Some(hash), None) => Ok(BlockTagOrHash::Hash(hash)),
                (None, Some(tag)) => Ok(BlockTagOrHash::BlockTags(tag)),
                _ => Err(serde::de::Error::custom(
                    "exactly one of blockHash and blockNumber required",
                )),
            },
        }
    }
}

pub fn serialize_result<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| {
        debug!("result serialize error {:?}", e);
        JsonRpcError::internal_error(format!("serialization error: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::{BlockTagOrHash, BlockTags, FixedData, Quantity, UnformattedData};

    #[derive(Deserialize, Debug)]
    struct OneDataParam {
        a: UnformattedData,
    }

    #[derive(Deserialize, Debug)]
    struct OneQuantity {
        a: Quantity,
    }

    #[test]
    fn test_deser_one_param() {
        let x: OneDataParam = serde_json::from_value(json!(["0x0f00"])).unwrap();
        assert_eq!(x.a.0, vec![0x0f, 0x00]);

        assert!(serde_json::from_value::<OneDataParam>(json!([])).is_err());
        assert!(serde_json::from_value::<OneDataParam>(json!(["42"])).is_err());
        assert!(serde_json::from_value::<OneDataParam>(json!(["0x42", "0x43"])).is_err());
        assert!(serde_json::from_value::<OneDataParam>(json!([0xff])).is_err());
    }

    #[test]
    fn test_deser_quantity() {
        let x: OneQuantity = serde_json::from_value(json!(["0x400"])).unwrap();
        assert_eq!(x.a.0, 1024);
    }

    #[derive(Deserialize, Debug)]
    struct OneBlockParam {
        a: BlockTags,
    }

    #[test]
    fn test_block_enums() {
        let x: OneBlockParam = serde_json::from_value(json!(["latest"])).unwrap();
        assert_eq!(BlockTags::Latest, x.a);

        let x: OneBlockParam = serde_json::from_value(json!(["0xffacb0"])).unwrap();
        assert_eq!(BlockTags::Number(Quantity(16755888)), x.a);
    }

    #[derive(Deserialize, Debug)]
    struct OneFixedAddr {
        a: FixedData<20>,
    }

    #[derive(Deserialize, Debug)]
    struct OneFixedHash {
        a: FixedData<32>,
    }

    #[test]
    fn test_fixed_data() {
        let addr = json!(["0x407d73d8a49eeb85d32cf465507dd71d507100c1"]);
        let hash = json!(["0xb903239f8543d04b5dc1ba6579132b143087c68db1b2168786408fcbce568238"]);

        let x: OneFixedAddr = serde_json::from_value(addr).unwrap();
        assert_eq!(x.a.0.len(), 20);

        assert!(serde_json::from_value::<OneFixedAddr>(json!(["0x40"])).is_err());
        assert!(serde_json::from_value::<OneFixedAddr>(hash.clone()).is_err());

        let x: OneFixedHash = serde_json::from_value(hash).unwrap();
        assert_eq!(x.a.0.len(), 32);
    }

    #[derive(Deserialize, Debug)]
    struct OneBlockOrHash {
        a: BlockTagOrHash,
    }

    #[test]
    fn params_without_eip_1898() {
        let res: OneBlockOrHash = serde_json::from_value(json!(["latest"])).unwrap();
        assert!(matches!(
            res.a,
            BlockTagOrHash::BlockTags(BlockTags::Latest)
        ));
        let res: OneBlockOrHash = serde_json::from_value(json!(["0x1"])).unwrap();
        assert!(matches!(
            res.a,
            BlockTagOrHash::BlockTags(BlockTags::Number(Quantity(1)))
        ));
    }

    #[test]
    fn eip_1898_objects() {
        let res: OneBlockOrHash = serde_json::from_value(json!([{
            "blockHash": "0xd4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3"
        }]))
        .unwrap();
        assert!(matches!(res.a, BlockTagOrHash::Hash(_)));

        let res: OneBlockOrHash =
            serde_json::from_value(json!([{ "blockNumber": "0x0" }])).unwrap();
        assert!(matches!(
            res.a,
            BlockTagOrHash::BlockTags(BlockTags::Number(Quantity(0)))
        ));

        assert!(serde_json::from_value::<OneBlockOrHash>(json!([{}])).is_err());
    }
}
