//! IPv4 address management.
//!
//! Each subnet has a bitmap stored as a string of `'0'`/`'1'` characters, one
//! per address of the block. Character `i` tracks host address `base + i + 1`,
//! so the first allocation in a fresh block is the gateway address. The table
//! lives in a single JSON file and every change is a locked
//! load-modify-save cycle.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use husk_common::{HuskError, HuskResult, LockedStore};
use ipnetwork::Ipv4Network;

/// Largest prefix that still leaves a usable host address.
pub const MAX_PREFIX: u8 = 30;

/// Smallest prefix accepted. Keeps a bitmap at 64k characters.
pub const MIN_PREFIX: u8 = 16;

/// Subnet (normalized CIDR) to bitmap.
pub type AllocationTable = BTreeMap<String, String>;

/// Parse a CIDR block and normalize it to its network address.
///
/// `10.0.0.7/24` becomes `10.0.0.0/24`.
pub fn parse_subnet(value: &str) -> HuskResult<Ipv4Network> {
    let net: Ipv4Network = value.trim().parse().map_err(|_| HuskError::InvalidSubnet {
        value: value.to_string(),
    })?;
    normalize(&net)
}

fn block_size(subnet: &Ipv4Network) -> usize {
    1usize << (32 - u32::from(subnet.prefix()))
}

/// Address allocator backed by the on-disk allocation table.
#[derive(Debug, Clone)]
pub struct Ipam {
    store: LockedStore,
}

impl Ipam {
    /// Allocator persisting to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: LockedStore::new(path),
        }
    }

    /// Allocate the lowest free address of `subnet`.
    ///
    /// The network and broadcast addresses are never handed out.
    pub fn allocate(&self, subnet: &Ipv4Network) -> HuskResult<Ipv4Addr> {
        let subnet = normalize(subnet)?;
        let key = subnet.to_string();
        let size = block_size(&subnet);

        let addr = self.store.update(|table: &mut AllocationTable| {
            let bitmap = table.entry(key.clone()).or_insert_with(|| "0".repeat(size));
            if bitmap.len() != size {
                return Err(HuskError::Internal {
                    message: format!("bitmap for {key} has {} entries, expected {size}", bitmap.len()),
                });
            }

            let index = bitmap[..size - 2]
                .find('0')
                .ok_or_else(|| HuskError::SubnetExhausted {
                    subnet: key.clone(),
                })?;
            bitmap.replace_range(index..=index, "1");

            let offset = u32::try_from(index + 1).map_err(|_| HuskError::Internal {
                message: format!("offset {index} does not fit an IPv4 address"),
            })?;
            Ok(Ipv4Addr::from(u32::from(subnet.network()) + offset))
        })?;

        tracing::debug!(subnet = %key, %addr, "Allocated address");
        Ok(addr)
    }

    /// Return `addr` to the free pool of `subnet`.
    ///
    /// Releasing from a subnet the table has never seen is a no-op.
    pub fn release(&self, subnet: &Ipv4Network, addr: Ipv4Addr) -> HuskResult<()> {
        let subnet = normalize(subnet)?;
        let key = subnet.to_string();
        let size = block_size(&subnet);

        let out_of_range = || HuskError::AddressOutOfRange {
            address: addr.to_string(),
            subnet: key.clone(),
        };
        let offset = u32::from(addr)
            .checked_sub(u32::from(subnet.network()))
            .ok_or_else(out_of_range)? as usize;
        if offset == 0 || offset > size - 2 {
            return Err(out_of_range());
        }
        let index = offset - 1;

        self.store.update(|table: &mut AllocationTable| {
            match table.get_mut(&key) {
                Some(bitmap) if bitmap.len() == size => {
                    bitmap.replace_range(index..=index, "0");
                }
                Some(_) => {
                    return Err(HuskError::Internal {
                        message: format!("bitmap for {key} has the wrong length"),
                    });
                }
                None => {
                    tracing::warn!(subnet = %key, %addr, "Release from unknown subnet ignored");
                }
            }
            Ok(())
        })?;

        tracing::debug!(subnet = %key, %addr, "Released address");
        Ok(())
    }

    /// Snapshot of the allocation table.
    pub fn table(&self) -> HuskResult<AllocationTable> {
        self.store.load()
    }
}

fn normalize(subnet: &Ipv4Network) -> HuskResult<Ipv4Network> {
    let invalid = || HuskError::InvalidSubnet {
        value: subnet.to_string(),
    };
    if !(MIN_PREFIX..=MAX_PREFIX).contains(&subnet.prefix()) {
        return Err(invalid());
    }
    Ipv4Network::new(subnet.network(), subnet.prefix()).map_err(|_| invalid())
}
