//! Contract event ABI definitions and topic hash computation.
//!
//! Each watched event is described by an ordered, typed argument list. The
//! list drives decoding and display formatting only; no business logic reads
//! these values.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which watched contract emitted a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Pool,
    Vault,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Pool => write!(f, "Pool"),
            Source::Vault => write!(f, "Vault"),
        }
    }
}

/// How an argument is decoded and rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Address,
    /// 18-decimal fixed-point amount, rendered with a unit symbol.
    Amount(&'static str),
    /// Plain unsigned integer (bps, counters, enum tags).
    Uint,
    Bool,
    /// Dynamic `string`; never indexed in the watched contracts.
    Text,
}

impl ArgKind {
    fn abi_type(self) -> &'static str {
        match self {
            ArgKind::Address => "address",
            ArgKind::Amount(_) | ArgKind::Uint => "uint256",
            ArgKind::Bool => "bool",
            ArgKind::Text => "string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub indexed: bool,
}

const fn arg(name: &'static str, kind: ArgKind) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        indexed: false,
    }
}

const fn indexed(name: &'static str, kind: ArgKind) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        indexed: true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    pub source: Source,
    pub name: &'static str,
    pub inputs: &'static [ArgSpec],
}

impl EventSchema {
    /// Canonical signature, e.g. `Sync(uint256,uint256)`.
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.inputs.iter().map(|a| a.kind.abi_type()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    pub fn topic0(&self) -> B256 {
        keccak256(self.signature().as_bytes())
    }
}

const DFT: &str = "DFT";
const STABLE: &str = "STABLE";
const LP: &str = "LP";

// ─── Pool-side events ────────────────────────────────────────────────────────

pub const POOL_EVENTS: &[EventSchema] = &[
    EventSchema {
        source: Source::Pool,
        name: "Swap",
        inputs: &[
            indexed("sender", ArgKind::Address),
            indexed("to", ArgKind::Address),
            arg("amountDftIn", ArgKind::Amount(DFT)),
            arg("amountStableIn", ArgKind::Amount(STABLE)),
            arg("amountDftOut", ArgKind::Amount(DFT)),
            arg("amountStableOut", ArgKind::Amount(STABLE)),
        ],
    },
    EventSchema {
        source: Source::Pool,
        name: "FeesApplied",
        inputs: &[
            indexed("trader", ArgKind::Address),
            arg("feeStable", ArgKind::Amount(STABLE)),
            arg("feeBps", ArgKind::Uint),
        ],
    },
    EventSchema {
        source: Source::Pool,
        name: "Sync",
        inputs: &[
            arg("reserveDft", ArgKind::Amount(DFT)),
            arg("reserveStable", ArgKind::Amount(STABLE)),
        ],
    },
    EventSchema {
        source: Source::Pool,
        name: "Mint",
        inputs: &[
            indexed("provider", ArgKind::Address),
            arg("amountDft", ArgKind::Amount(DFT)),
            arg("amountStable", ArgKind::Amount(STABLE)),
            arg("liquidity", ArgKind::Amount(LP)),
        ],
    },
    EventSchema {
        source: Source::Pool,
        name: "Burn",
        inputs: &[
            indexed("provider", ArgKind::Address),
            indexed("to", ArgKind::Address),
            arg("amountDft", ArgKind::Amount(DFT)),
            arg("amountStable", ArgKind::Amount(STABLE)),
            arg("liquidity", ArgKind::Amount(LP)),
        ],
    },
];

// ─── Vault-side events ───────────────────────────────────────────────────────

pub const VAULT_EVENTS: &[EventSchema] = &[
    EventSchema {
        source: Source::Vault,
        name: "Rebalanced",
        inputs: &[
            arg("reason", ArgKind::Text),
            arg("sellDft", ArgKind::Bool),
            arg("dftAmount", ArgKind::Amount(DFT)),
            arg("stableAmount", ArgKind::Amount(STABLE)),
            arg("stressBps", ArgKind::Uint),
        ],
    },
    EventSchema {
        source: Source::Vault,
        name: "SeededLiquidity",
        inputs: &[
            arg("dftAmount", ArgKind::Amount(DFT)),
            arg("stableAmount", ArgKind::Amount(STABLE)),
        ],
    },
    EventSchema {
        source: Source::Vault,
        name: "EmaUpdated",
        inputs: &[
            arg("emaShort", ArgKind::Amount(STABLE)),
            arg("emaLong", ArgKind::Amount(STABLE)),
            arg("spot", ArgKind::Amount(STABLE)),
        ],
    },
];

/// Compute keccak256 hash of a byte slice.
pub fn keccak256(data: &[u8]) -> B256 {
    use tiny_keccak::{Hasher, Keccak};
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    B256::from(output)
}

/// Schemas keyed by (source, topic0), plus the address → source mapping.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    sources: HashMap<Address, Source>,
    schemas: HashMap<(Source, B256), &'static EventSchema>,
}

impl EventRegistry {
    pub fn new(pool: Address, vault: Address) -> Self {
        let mut sources = HashMap::new();
        sources.insert(pool, Source::Pool);
        sources.insert(vault, Source::Vault);

        let schemas = POOL_EVENTS
            .iter()
            .chain(VAULT_EVENTS.iter())
            .map(|schema| ((schema.source, schema.topic0()), schema))
            .collect();

        Self { sources, schemas }
    }

    pub fn source_of(&self, address: &Address) -> Option<Source> {
        self.sources.get(address).copied()
    }

    pub fn lookup(&self, source: Source, topic0: &B256) -> Option<&'static EventSchema> {
        self.schemas.get(&(source, *topic0)).copied()
    }

    /// Address of the contract registered for `source`.
    pub fn address_of(&self, source: Source) -> Option<Address> {
        self.sources
            .iter()
            .find(|(_, s)| **s == source)
            .map(|(addr, _)| *addr)
    }

    /// topic0 values for every event registered under `source`.
    pub fn topics_for(&self, source: Source) -> Vec<B256> {
        let mut topics: Vec<B256> = self
            .schemas
            .keys()
            .filter(|(s, _)| *s == source)
            .map(|(_, t)| *t)
            .collect();
        topics.sort();
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    #[test]
    fn test_signatures() {
        let swap = &POOL_EVENTS[0];
        assert_eq!(
            swap.signature(),
            "Swap(address,address,uint256,uint256,uint256,uint256)"
        );
        let rebalanced = &VAULT_EVENTS[0];
        assert_eq!(
            rebalanced.signature(),
            "Rebalanced(string,bool,uint256,uint256,uint256)"
        );
    }

    #[test]
    fn test_keccak_matches_known_topic() {
        // ERC-20 Transfer
        assert_eq!(
            keccak256(b"Transfer(address,address,uint256)"),
            b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
    }

    #[test]
    fn test_registry_lookup_is_scoped_by_source() {
        let pool = Address::repeat_byte(0x01);
        let vault = Address::repeat_byte(0x02);
        let registry = EventRegistry::new(pool, vault);

        let sync = POOL_EVENTS.iter().find(|s| s.name == "Sync").unwrap();
        assert_eq!(registry.source_of(&pool), Some(Source::Pool));
        assert_eq!(registry.source_of(&Address::ZERO), None);
        assert!(registry.lookup(Source::Pool, &sync.topic0()).is_some());
        // a pool signature emitted by the vault is not a known schema
        assert!(registry.lookup(Source::Vault, &sync.topic0()).is_none());

        assert_eq!(registry.topics_for(Source::Pool).len(), POOL_EVENTS.len());
        assert_eq!(registry.topics_for(Source::Vault).len(), VAULT_EVENTS.len());
        assert_eq!(registry.address_of(Source::Vault), Some(vault));
    }
}
