//! Typed fork choice dump as served by the beacon node debug API.
//!
//! 64-bit integers are quoted decimal strings on the wire; roots and hashes
//! are kept as the 0x-prefixed hex strings the node returns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A full fork choice dump.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForkChoice {
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    #[serde(default)]
    pub fork_choice_nodes: Vec<ForkChoiceNode>,
    #[serde(default)]
    pub extra_data: Map<String, Value>,
}

/// An epoch boundary checkpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(with = "quoted_u64")]
    pub epoch: u64,
    pub root: String,
}

/// One block in the fork choice store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForkChoiceNode {
    #[serde(with = "quoted_u64")]
    pub slot: u64,
    pub block_root: String,
    pub parent_root: String,
    #[serde(with = "quoted_u64")]
    pub justified_epoch: u64,
    #[serde(with = "quoted_u64")]
    pub finalized_epoch: u64,
    #[serde(with = "quoted_u64")]
    pub weight: u64,
    pub validity: NodeValidity,
    pub execution_block_hash: String,
    #[serde(default)]
    pub extra_data: Map<String, Value>,
}

/// Execution validity of a fork choice node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeValidity {
    Valid,
    Invalid,
    Optimistic,
}

impl ForkChoice {
    /// Node with the greatest weight, ties resolved towards the higher slot.
    pub fn heaviest_node(&self) -> Option<&ForkChoiceNode> {
        self.fork_choice_nodes
            .iter()
            .max_by_key(|node| (node.weight, node.slot))
    }
}

mod quoted_u64 {
    use serde::de::{self, Deserializer, Visitor};
    use serde::ser::Serializer;
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        struct QuotedU64;

        impl Visitor<'_> for QuotedU64 {
            type Value = u64;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal u64, quoted or bare")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
                Ok(value)
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
                value.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(QuotedU64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"{
        "justified_checkpoint": {"epoch": "5", "root": "0xaa"},
        "finalized_checkpoint": {"epoch": "4", "root": "0xbb"},
        "fork_choice_nodes": [
            {
                "slot": "160",
                "block_root": "0x01",
                "parent_root": "0x00",
                "justified_epoch": "5",
                "finalized_epoch": "4",
                "weight": "3200000000",
                "validity": "valid",
                "execution_block_hash": "0xee",
                "extra_data": {"balance": "32"}
            },
            {
                "slot": "161",
                "block_root": "0x02",
                "parent_root": "0x01",
                "justified_epoch": "5",
                "finalized_epoch": "4",
                "weight": "3200000000",
                "validity": "optimistic",
                "execution_block_hash": "0xef"
            }
        ],
        "extra_data": {}
    }"#;

    #[test]
    fn test_parse_beacon_api_dump() {
        let dump: ForkChoice = serde_json::from_str(DUMP).unwrap();
        assert_eq!(dump.justified_checkpoint.epoch, 5);
        assert_eq!(dump.fork_choice_nodes.len(), 2);
        assert_eq!(dump.fork_choice_nodes[1].validity, NodeValidity::Optimistic);
        assert!(dump.fork_choice_nodes[1].extra_data.is_empty());
    }

    #[test]
    fn test_integers_serialize_quoted() {
        let dump: ForkChoice = serde_json::from_str(DUMP).unwrap();
        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["fork_choice_nodes"][0]["weight"], "3200000000");
        assert_eq!(json["finalized_checkpoint"]["epoch"], "4");
    }

    #[test]
    fn test_bare_integers_accepted() {
        let checkpoint: Checkpoint =
            serde_json::from_str(r#"{"epoch": 7, "root": "0x00"}"#).unwrap();
        assert_eq!(checkpoint.epoch, 7);
    }

    #[test]
    fn test_heaviest_node_prefers_higher_slot_on_tie() {
        let dump: ForkChoice = serde_json::from_str(DUMP).unwrap();
        assert_eq!(dump.heaviest_node().unwrap().block_root, "0x02");
    }
}
