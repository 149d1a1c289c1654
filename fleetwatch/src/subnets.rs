use std::collections::HashMap;
use std::net::IpAddr;

use config_tree_core::ConfigNode;
use serde::Serialize;

use crate::bigcounter::BigCounter;
use crate::kea_config::KeaConfig;

/// Address pool given either as `lower - upper` or as a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressPool {
    pub lower: IpAddr,
    pub upper: IpAddr,
}

impl AddressPool {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some((lower, upper)) = text.split_once('-') {
            let lower: IpAddr = lower.trim().parse().ok()?;
            let upper: IpAddr = upper.trim().parse().ok()?;
            if lower.is_ipv4() != upper.is_ipv4() {
                return None;
            }
            return Some(Self { lower, upper });
        }
        let (address, len) = parse_prefix(text)?;
        Some(match address {
            IpAddr::V4(v4) => {
                let host_bits = 32 - u32::from(len);
                let base = u32::from(v4) & mask_u32(len);
                let last = base | (((1u64 << host_bits) - 1) as u32);
                Self {
                    lower: IpAddr::V4(base.into()),
                    upper: IpAddr::V4(last.into()),
                }
            }
            IpAddr::V6(v6) => {
                let host_bits = 128 - u32::from(len);
                let host_mask = if host_bits == 128 {
                    u128::MAX
                } else {
                    (1u128 << host_bits) - 1
                };
                let base = u128::from(v6) & !host_mask;
                Self {
                    lower: IpAddr::V6(base.into()),
                    upper: IpAddr::V6((base | host_mask).into()),
                }
            }
        })
    }

    /// Number of addresses in the pool, zero for an inverted range.
    pub fn size(&self) -> BigCounter {
        match (self.lower, self.upper) {
            (IpAddr::V4(lower), IpAddr::V4(upper)) => {
                let (lower, upper) = (u32::from(lower), u32::from(upper));
                if upper < lower {
                    return BigCounter::default();
                }
                BigCounter::new(u64::from(upper - lower) + 1)
            }
            (IpAddr::V6(lower), IpAddr::V6(upper)) => {
                let (lower, upper) = (u128::from(lower), u128::from(upper));
                if upper < lower {
                    return BigCounter::default();
                }
                let mut size = BigCounter::from_u128(upper - lower);
                size.add_u64(1);
                size
            }
            _ => BigCounter::default(),
        }
    }
}

/// Prefix delegation pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixPool {
    pub prefix: String,
    pub prefix_len: u8,
    pub delegated_len: u8,
}

impl PrefixPool {
    /// Number of delegated prefixes the pool can hand out.
    pub fn size(&self) -> BigCounter {
        if self.delegated_len < self.prefix_len {
            return BigCounter::default();
        }
        BigCounter::pow2(u32::from(self.delegated_len - self.prefix_len))
    }
}

/// A subnet as configured on one daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalSubnet {
    /// Subnet identifier local to the daemon, if configured.
    pub id: Option<i64>,
    /// Prefix in canonical form, verbatim when it does not parse.
    pub prefix: String,
    pub shared_network: Option<String>,
    pub address_pools: Vec<AddressPool>,
    pub prefix_pools: Vec<PrefixPool>,
}

impl LocalSubnet {
    pub fn total_addresses(&self) -> BigCounter {
        let mut total = BigCounter::default();
        for pool in &self.address_pools {
            total.add(&pool.size());
        }
        total
    }

    pub fn total_delegated_prefixes(&self) -> BigCounter {
        let mut total = BigCounter::default();
        for pool in &self.prefix_pools {
            total.add(&pool.size());
        }
        total
    }
}

/// Canonical text of an `address/len` prefix, e.g. `2001:db8:2::/64` for
/// `2001:0db8:0002:0000::/64`.
pub fn canonical_prefix(text: &str) -> Option<String> {
    let (address, len) = parse_prefix(text)?;
    Some(format!("{address}/{len}"))
}

/// Lookup key of a prefix: the canonical form, or the trimmed text when it
/// does not parse.
fn prefix_key(text: &str) -> String {
    canonical_prefix(text).unwrap_or_else(|| text.trim().to_string())
}

fn parse_prefix(text: &str) -> Option<(IpAddr, u8)> {
    let (address, len) = text.trim().split_once('/')?;
    let address: IpAddr = address.trim().parse().ok()?;
    let len: u8 = len.trim().parse().ok()?;
    let max = if address.is_ipv4() { 32 } else { 128 };
    (len <= max).then_some((address, len))
}

fn mask_u32(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(len))
    }
}

/// All subnets of a configuration, top-level ones first followed by those
/// nested in shared networks. Entries without a `subnet` string are skipped.
pub fn local_subnets(config: &KeaConfig) -> Vec<LocalSubnet> {
    let mut subnets = Vec::new();
    for key in ["subnet4", "subnet6"] {
        subnets.extend(config.root_items(key).iter().filter_map(|n| parse_subnet(n, None)));
    }
    for network in config.root_items("shared-networks") {
        let name = network.get_str(&["name"]);
        for key in ["subnet4", "subnet6"] {
            subnets.extend(
                network
                    .items(&[key])
                    .iter()
                    .filter_map(|n| parse_subnet(n, name)),
            );
        }
    }
    subnets
}

fn parse_subnet(node: &ConfigNode, shared_network: Option<&str>) -> Option<LocalSubnet> {
    let prefix = prefix_key(node.get_str(&["subnet"])?);
    let address_pools = node
        .items(&["pools"])
        .iter()
        .filter_map(|pool| AddressPool::parse(pool.get_str(&["pool"])?))
        .collect();
    let prefix_pools = node
        .items(&["pd-pools"])
        .iter()
        .filter_map(|pool| {
            Some(PrefixPool {
                prefix: pool.get_str(&["prefix"])?.to_string(),
                prefix_len: u8::try_from(pool.get_i64(&["prefix-len"])?).ok()?,
                delegated_len: u8::try_from(pool.get_i64(&["delegated-len"])?).ok()?,
            })
        })
        .collect();
    Some(LocalSubnet {
        id: node.get_i64(&["id"]),
        prefix,
        shared_network: shared_network.map(str::to_string),
        address_pools,
        prefix_pools,
    })
}

/// Subnets of one configuration indexed by canonical prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedSubnets {
    subnets: Vec<LocalSubnet>,
    by_prefix: HashMap<String, usize>,
}

impl IndexedSubnets {
    pub fn new(config: &KeaConfig) -> Self {
        let subnets = local_subnets(config);
        let mut by_prefix = HashMap::with_capacity(subnets.len());
        for (pos, subnet) in subnets.iter().enumerate() {
            by_prefix.entry(subnet.prefix.clone()).or_insert(pos);
        }
        Self { subnets, by_prefix }
    }

    /// Subnet with the given prefix, in any textual form.
    pub fn get(&self, prefix: &str) -> Option<&LocalSubnet> {
        let key = prefix_key(prefix);
        self.by_prefix.get(&key).map(|pos| &self.subnets[*pos])
    }

    pub fn subnets(&self) -> &[LocalSubnet] {
        &self.subnets
    }
}

/// Local identifier of the subnet with the given prefix.
pub fn local_subnet_id(config: &KeaConfig, prefix: &str) -> Option<i64> {
    let key = prefix_key(prefix);
    local_subnets(config)
        .into_iter()
        .find(|subnet| subnet.prefix == key)
        .and_then(|subnet| subnet.id)
}
