// src/overlay/identity.rs
// =============================================================================
// Node identities and the values derived from them.
//
// Every node on the overlay is named by a 32-byte public key. From that key
// we can derive (purely, with no network access):
// - a node ID: the SHA-512 hash of the key
// - an IPv6 address inside 200::/7
// - an IPv6 /64 subnet inside 300::/8
//
// These derived values are only used for display in the results file. The
// crawler itself only ever keys its maps by the raw public key.
// =============================================================================

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// Length of a node's public key in bytes
pub const KEY_LEN: usize = 32;

/// Length of a node ID (SHA-512 output) in bytes
pub const NODE_ID_LEN: usize = 64;

const ADDRESS_PREFIX: u8 = 0x02;
const SUBNET_PREFIX: u8 = 0x03;

/// The public key that uniquely identifies a node on the overlay
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; KEY_LEN]);

impl Identity {
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Hex form used as the key in the results file
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Derives the node ID (SHA-512 of the public key)
    pub fn node_id(&self) -> NodeId {
        let digest = Sha512::digest(self.0);
        let mut id = [0u8; NODE_ID_LEN];
        id.copy_from_slice(&digest);
        NodeId(id)
    }
}

/// Error returned when a hex string is not a valid public key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid public key '{input}': expected {} hex-encoded bytes", KEY_LEN)]
pub struct ParseIdentityError {
    input: String,
}

impl FromStr for Identity {
    type Err = ParseIdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIdentityError { input: s.to_string() };
        let bytes = hex::decode(s).map_err(|_| err())?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| err())?;
        Ok(Self(key))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.to_hex())
    }
}

// Identities serialize as hex strings so they can be used as JSON map keys
impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A node ID: the SHA-512 hash of a node's public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// The all-zero node ID, used as a "no particular target" hint in DHT pings
    pub const fn zero() -> Self {
        Self([0u8; NODE_ID_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Derives the node's IPv6 address.
    ///
    /// Layout: one prefix byte, one byte counting the leading 1-bits of the
    /// node ID, then the bits that follow the first 0-bit, packed from the
    /// most significant end.
    pub fn address(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.pack(ADDRESS_PREFIX))
    }

    /// Derives the node's routed /64 subnet as `addr/64`
    pub fn subnet(&self) -> String {
        let mut bytes = self.pack(SUBNET_PREFIX);
        bytes[8..].fill(0);
        format!("{}/64", Ipv6Addr::from(bytes))
    }

    fn pack(&self, prefix: u8) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0] = prefix;

        let mut ones: u8 = 0;
        let mut done = false;
        let mut acc: u8 = 0;
        let mut acc_bits = 0;
        let mut pos = 2;

        for idx in 0..NODE_ID_LEN * 8 {
            let bit = (self.0[idx / 8] >> (7 - (idx % 8))) & 1;
            if !done {
                if bit == 1 {
                    ones = ones.saturating_add(1);
                } else {
                    done = true;
                }
                continue;
            }
            acc = (acc << 1) | bit;
            acc_bits += 1;
            if acc_bits == 8 {
                if pos == out.len() {
                    break;
                }
                out[pos] = acc;
                pos += 1;
                acc = 0;
                acc_bits = 0;
            }
        }

        out[1] = ones;
        out
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// A node's position in the spanning tree: the port numbers taken at each
/// hop from the root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coords(pub Vec<u64>);

impl Coords {
    pub fn new(hops: Vec<u64>) -> Self {
        Self(hops)
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, hop) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", hop)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_hex_roundtrip() {
        let key = Identity::from_bytes([0xab; KEY_LEN]);
        let parsed: Identity = key.to_hex().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_identity_rejects_short_key() {
        assert!("abcd".parse::<Identity>().is_err());
        assert!("not hex at all".parse::<Identity>().is_err());
    }

    #[test]
    fn test_identity_as_json_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(Identity::from_bytes([1; KEY_LEN]), true);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, format!("{{\"{}\":true}}", "01".repeat(KEY_LEN)));
    }

    #[test]
    fn test_node_id_is_sha512_of_key() {
        let key = Identity::from_bytes([0u8; KEY_LEN]);
        let expected = Sha512::digest([0u8; KEY_LEN]);
        assert_eq!(&key.node_id().as_bytes()[..], &expected[..]);
    }

    #[test]
    fn test_address_counts_leading_ones() {
        // 0b1110_0000 then 0b1010_1010...: three leading ones, the zero is
        // dropped, and packing starts from the fourth bit
        let mut id = [0u8; NODE_ID_LEN];
        id[0] = 0b1110_1010;
        id[1] = 0b1010_1010;
        let addr = NodeId(id).address().octets();
        assert_eq!(addr[0], 0x02);
        assert_eq!(addr[1], 3);
        assert_eq!(addr[2], 0b1010_1010);
        assert_eq!(addr[3], 0b1010_0000);
    }

    #[test]
    fn test_subnet_uses_subnet_prefix() {
        let id = NodeId([0xff; NODE_ID_LEN]);
        // All bits are ones so nothing is packed after the counter byte
        let subnet = id.subnet();
        assert!(subnet.starts_with("3ff::"), "got {}", subnet);
        assert!(subnet.ends_with("/64"));
    }

    #[test]
    fn test_coords_display() {
        assert_eq!(Coords::new(vec![1, 4, 2]).to_string(), "[1 4 2]");
        assert_eq!(Coords::default().to_string(), "[]");
    }
}
