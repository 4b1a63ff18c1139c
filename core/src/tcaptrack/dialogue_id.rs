//! Order-insensitive dialogue identifiers.
//!
//! Provides the signaling addresses seen on a TCAP message and the per-role keys used to index
//! dialogues. Every key compares equal regardless of which endpoint sent the message, so a dialogue
//! observed from both signaling directions lands in the same table slot.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// MTP3 signaling point code.
///
/// Treated as an opaque fixed-width value: ITU (14-bit), ANSI (24-bit) and Japanese (16-bit) point
/// codes all fit.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PointCode(pub u32);

impl fmt::Display for PointCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a signaling endpoint.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum SignalingAddr {
    /// MTP3 routing label point code.
    Pc(PointCode),
    /// IP endpoint, for SIGTRAN captures without MTP3 routing labels.
    Ip(IpAddr),
}

impl SignalingAddr {
    /// Returns the hash of this address used in dialogue keys.
    pub fn pc_hash(&self) -> PcHash {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        PcHash(hasher.finish())
    }
}

impl From<PointCode> for SignalingAddr {
    fn from(pc: PointCode) -> Self {
        SignalingAddr::Pc(pc)
    }
}

impl From<IpAddr> for SignalingAddr {
    fn from(ip: IpAddr) -> Self {
        SignalingAddr::Ip(ip)
    }
}

impl fmt::Display for SignalingAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalingAddr::Pc(pc) => write!(f, "pc:{}", pc),
            SignalingAddr::Ip(ip) => write!(f, "{}", ip),
        }
    }
}

/// Parses `"pc:1234"`, a bare decimal point code `"1234"`, or an IP address.
impl FromStr for SignalingAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let pc = s.strip_prefix("pc:").unwrap_or(s);
        if let Ok(code) = pc.parse::<u32>() {
            return Ok(SignalingAddr::Pc(PointCode(code)));
        }
        Ok(SignalingAddr::Ip(s.parse::<IpAddr>()?))
    }
}

#[derive(Error, Debug)]
pub enum AddrParseError {
    #[error("Invalid signaling address")]
    InvalidAddress {
        #[from]
        source: std::net::AddrParseError,
    },
}

/// Hash of a signaling address.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct PcHash(pub u64);

impl fmt::Display for PcHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Returns `true` if `(a1, b1)` and `(a2, b2)` hold the same values in either order.
#[inline]
fn same_pair<T: PartialEq>(a1: T, b1: T, a2: T, b2: T) -> bool {
    (a1 == a2 && b1 == b2) || (a1 == b2 && b1 == a2)
}

/// Combines a point-code pair independently of its order.
#[inline]
fn mix_pc_pair(a: PcHash, b: PcHash) -> u64 {
    a.0 ^ b.0
}

/// Defines a dialogue key made of one transaction id and a point-code pair.
macro_rules! tid_key {
    ( $(#[$meta:meta])* $name:ident, $label:literal ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Serialize)]
        pub struct $name {
            /// Transaction id.
            pub tid: u32,
            /// Hash of the sending endpoint.
            pub opc_hash: PcHash,
            /// Hash of the receiving endpoint.
            pub dpc_hash: PcHash,
        }

        impl $name {
            /// Builds a key for transaction `tid` exchanged between `src` and `dst`.
            pub fn new(tid: u32, src: &SignalingAddr, dst: &SignalingAddr) -> Self {
                $name {
                    tid,
                    opc_hash: src.pc_hash(),
                    dpc_hash: dst.pc_hash(),
                }
            }

            /// Bucket hash of the key.
            #[inline]
            pub fn calchash(&self) -> u32 {
                self.tid
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.tid == other.tid
                    && same_pair(self.opc_hash, self.dpc_hash, other.opc_hash, other.dpc_hash)
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                state.write_u32(self.calchash());
                state.write_u64(mix_pc_pair(self.opc_hash, self.dpc_hash));
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    concat!($label, " tid {:#010x} ({} <> {})"),
                    self.tid, self.opc_hash, self.dpc_hash
                )
            }
        }
    };
}

tid_key!(
    /// Identifies a dialogue by the originating transaction id of its BEGIN.
    BeginKey,
    "begin"
);

tid_key!(
    /// Identifies a dialogue by the transaction id an END or ABORT is addressed to.
    EndKey,
    "end"
);

tid_key!(
    /// Identifies an ANSI TCAP transaction.
    AnsiKey,
    "ansi"
);

/// Identifies a dialogue by both transaction ids carried in a CONTINUE.
///
/// Either endpoint may send the CONTINUE, so the transaction-id pair is compared in either order,
/// independently of the point-code pair.
#[derive(Debug, Copy, Clone, Serialize)]
pub struct ContKey {
    /// Originating transaction id of the CONTINUE.
    pub src_tid: u32,
    /// Destination transaction id of the CONTINUE.
    pub dst_tid: u32,
    /// Hash of the sending endpoint.
    pub opc_hash: PcHash,
    /// Hash of the receiving endpoint.
    pub dpc_hash: PcHash,
}

impl ContKey {
    /// Builds a key for a CONTINUE from `src` to `dst` carrying `src_tid` and `dst_tid`.
    pub fn new(src_tid: u32, dst_tid: u32, src: &SignalingAddr, dst: &SignalingAddr) -> Self {
        ContKey {
            src_tid,
            dst_tid,
            opc_hash: src.pc_hash(),
            dpc_hash: dst.pc_hash(),
        }
    }

    /// Bucket hash of the key.
    #[inline]
    pub fn calchash(&self) -> u32 {
        self.src_tid.wrapping_add(self.dst_tid)
    }
}

impl PartialEq for ContKey {
    fn eq(&self, other: &Self) -> bool {
        same_pair(self.src_tid, self.dst_tid, other.src_tid, other.dst_tid)
            && same_pair(self.opc_hash, self.dpc_hash, other.opc_hash, other.dpc_hash)
    }
}

impl Eq for ContKey {}

impl Hash for ContKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.calchash());
        state.write_u64(mix_pc_pair(self.opc_hash, self.dpc_hash));
    }
}

impl fmt::Display for ContKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cont tid {:#010x}/{:#010x} ({} <> {})",
            self.src_tid, self.dst_tid, self.opc_hash, self.dpc_hash
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of<K: Hash>(key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn pc(code: u32) -> SignalingAddr {
        SignalingAddr::Pc(PointCode(code))
    }

    #[test]
    fn core_begin_key_symmetric() {
        let fwd = BeginKey::new(0x1234, &pc(100), &pc(200));
        let rev = BeginKey::new(0x1234, &pc(200), &pc(100));
        assert_eq!(fwd, rev);
        assert_eq!(hash_of(&fwd), hash_of(&rev));
    }

    #[test]
    fn core_begin_key_distinct_tid() {
        let a = BeginKey::new(1, &pc(100), &pc(200));
        let b = BeginKey::new(2, &pc(100), &pc(200));
        assert_ne!(a, b);
    }

    #[test]
    fn core_begin_key_distinct_pair() {
        let a = BeginKey::new(1, &pc(100), &pc(200));
        let b = BeginKey::new(1, &pc(100), &pc(300));
        assert_ne!(a, b);
    }

    #[test]
    fn core_cont_key_swapped_tids() {
        let fwd = ContKey::new(7, 9, &pc(1), &pc(2));
        let rev = ContKey::new(9, 7, &pc(2), &pc(1));
        assert_eq!(fwd, rev);
        assert_eq!(hash_of(&fwd), hash_of(&rev));
        // tids swapped while the point codes keep their order
        let mixed = ContKey::new(9, 7, &pc(1), &pc(2));
        assert_eq!(fwd, mixed);
        assert_eq!(hash_of(&fwd), hash_of(&mixed));
    }

    #[test]
    fn core_cont_key_partial_tid_match() {
        let a = ContKey::new(7, 9, &pc(1), &pc(2));
        let b = ContKey::new(7, 8, &pc(1), &pc(2));
        assert_ne!(a, b);
    }

    #[test]
    fn core_ip_and_pc_addresses() {
        let ip: SignalingAddr = "10.0.0.1".parse().unwrap();
        let code: SignalingAddr = "pc:2057".parse().unwrap();
        let bare: SignalingAddr = "2057".parse().unwrap();
        assert_eq!(code, bare);
        assert_eq!(code, pc(2057));
        assert!(matches!(ip, SignalingAddr::Ip(_)));
        assert_ne!(ip.pc_hash(), code.pc_hash());
        assert!("not-an-address".parse::<SignalingAddr>().is_err());
    }
}
