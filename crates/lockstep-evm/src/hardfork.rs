//! Hardfork selection
//!
//! The reference interpreter only distinguishes forks where gas schedules or
//! the opcode set changed. Variants are ordered chronologically so feature
//! gates are plain comparisons.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Ethereum protocol upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[allow(missing_docs)]
pub enum Hardfork {
    Frontier,
    Homestead,
    TangerineWhistle,
    SpuriousDragon,
    Byzantium,
    Constantinople,
    Petersburg,
    Istanbul,
    Berlin,
    London,
    Merge,
    Shanghai,
    #[default]
    Cancun,
    Prague,
}

/// Unknown hardfork name
#[derive(Debug, Error)]
#[error("unknown hardfork: {0}")]
pub struct UnknownHardfork(pub String);

impl Hardfork {
    /// All supported forks, oldest first
    pub const ALL: [Hardfork; 14] = [
        Hardfork::Frontier,
        Hardfork::Homestead,
        Hardfork::TangerineWhistle,
        Hardfork::SpuriousDragon,
        Hardfork::Byzantium,
        Hardfork::Constantinople,
        Hardfork::Petersburg,
        Hardfork::Istanbul,
        Hardfork::Berlin,
        Hardfork::London,
        Hardfork::Merge,
        Hardfork::Shanghai,
        Hardfork::Cancun,
        Hardfork::Prague,
    ];

    /// Canonical name
    pub fn name(self) -> &'static str {
        match self {
            Hardfork::Frontier => "Frontier",
            Hardfork::Homestead => "Homestead",
            Hardfork::TangerineWhistle => "TangerineWhistle",
            Hardfork::SpuriousDragon => "SpuriousDragon",
            Hardfork::Byzantium => "Byzantium",
            Hardfork::Constantinople => "Constantinople",
            Hardfork::Petersburg => "Petersburg",
            Hardfork::Istanbul => "Istanbul",
            Hardfork::Berlin => "Berlin",
            Hardfork::London => "London",
            Hardfork::Merge => "Merge",
            Hardfork::Shanghai => "Shanghai",
            Hardfork::Cancun => "Cancun",
            Hardfork::Prague => "Prague",
        }
    }

    /// EIP-2929 warm/cold access lists
    pub fn has_access_lists(self) -> bool {
        self >= Hardfork::Berlin
    }

    /// EIP-2200 net-metered SSTORE
    pub fn has_net_metering(self) -> bool {
        self >= Hardfork::Istanbul
    }

    /// EIP-150 all-but-one-64th call gas forwarding
    pub fn has_call_gas_cap(self) -> bool {
        self >= Hardfork::TangerineWhistle
    }

    /// EIP-3651 warm coinbase
    pub fn warms_coinbase(self) -> bool {
        self >= Hardfork::Shanghai
    }

    /// Divisor of gas used that bounds the refund (EIP-3529 from London)
    pub fn refund_quotient(self) -> u64 {
        if self >= Hardfork::London {
            5
        } else {
            2
        }
    }
}

impl fmt::Display for Hardfork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Hardfork {
    type Err = UnknownHardfork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.chars().filter(|c| *c != '_' && *c != '-').collect();
        match wanted.to_ascii_lowercase().as_str() {
            "paris" => return Ok(Hardfork::Merge),
            "tangerine" => return Ok(Hardfork::TangerineWhistle),
            "spurious" => return Ok(Hardfork::SpuriousDragon),
            _ => {}
        }
        Hardfork::ALL
            .iter()
            .copied()
            .find(|fork| fork.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| UnknownHardfork(s.to_string()))
    }
}
