//! Source IP allowlist matching against provider CIDR ranges.

use std::net::IpAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CidrParseError {
    #[error("invalid CIDR block '{0}'")]
    InvalidBlock(String),
    #[error("prefix length {prefix} exceeds {max} for '{block}'")]
    PrefixTooLong { block: String, prefix: u8, max: u8 },
}

/// A parsed IPv4 or IPv6 CIDR block.
///
/// Addresses are widened to `u128` so v4 and v6 share one masking path;
/// the address family still has to match at lookup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrBlock {
    network: u128,
    prefix: u8,
    is_v4: bool,
}

impl CidrBlock {
    pub fn parse(block: &str) -> Result<Self, CidrParseError> {
        let block = block.trim();
        let (addr_part, prefix_part) = match block.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (block, None),
        };

        let addr: IpAddr = addr_part
            .parse()
            .map_err(|_| CidrParseError::InvalidBlock(block.to_string()))?;

        let max_prefix: u8 = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix_part {
            // A bare address is an exact-match block.
            None => max_prefix,
            Some(p) => p
                .parse::<u8>()
                .map_err(|_| CidrParseError::InvalidBlock(block.to_string()))?,
        };
        if prefix > max_prefix {
            return Err(CidrParseError::PrefixTooLong {
                block: block.to_string(),
                prefix,
                max: max_prefix,
            });
        }

        let bits = Self::address_bits(&addr);
        Ok(Self {
            network: bits & Self::mask(prefix, max_prefix),
            prefix,
            is_v4: addr.is_ipv4(),
        })
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        if addr.is_ipv4() != self.is_v4 {
            return false;
        }
        let max_prefix: u8 = if self.is_v4 { 32 } else { 128 };
        Self::address_bits(&addr) & Self::mask(self.prefix, max_prefix) == self.network
    }

    fn address_bits(addr: &IpAddr) -> u128 {
        match addr {
            IpAddr::V4(v4) => u32::from(*v4) as u128,
            IpAddr::V6(v6) => u128::from(*v6),
        }
    }

    fn mask(prefix: u8, max_prefix: u8) -> u128 {
        if prefix == 0 {
            return 0;
        }
        // Mask over the low `max_prefix` bits only; v4 lives in the low 32.
        let full = if max_prefix == 128 {
            u128::MAX
        } else {
            (1u128 << max_prefix) - 1
        };
        full & !((1u128 << (max_prefix - prefix)) - 1)
    }
}

/// Allowlist for one provider. An empty list matches every address.
#[derive(Debug, Clone, Default)]
pub struct IpAllowlist {
    blocks: Vec<CidrBlock>,
}

impl IpAllowlist {
    pub fn parse(blocks: &[String]) -> Result<Self, CidrParseError> {
        let blocks = blocks
            .iter()
            .map(|b| CidrBlock::parse(b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { blocks })
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn allows(&self, addr: IpAddr) -> bool {
        self.blocks.is_empty() || self.blocks.iter().any(|b| b.contains(addr))
    }
}
