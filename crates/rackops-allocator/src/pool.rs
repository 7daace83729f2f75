//! Address pool
//!
//! A circular queue of free IPs over a CIDR range plus a MAC-to-IP mapping
//! for the allocated set. Every IP is either in the queue or in the mapping,
//! never both; the ring capacity is fixed at the size of the configured
//! `[low, high]` sub-range. Allocation is FIFO unless the MAC already holds
//! a mapping, in which case the same IP is returned (sticky).

use ipnet::Ipv4Net;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid network '{0}'")]
    InvalidNetwork(String),
    #[error("no free addresses in the configured range")]
    Exhausted,
}

#[derive(Debug)]
pub struct AddressPool {
    allocated: HashMap<String, Ipv4Addr>,
    available: Vec<Ipv4Addr>,
    read_idx: usize,
    write_idx: usize,
    size: usize,
}

impl AddressPool {
    /// Enumerate the network and queue every address inside the closed
    /// inclusive `[low, high]` sub-range.
    pub fn new(network: &str, low: Ipv4Addr, high: Ipv4Addr) -> Result<Self, PoolError> {
        let net: Ipv4Net = network
            .parse()
            .map_err(|_| PoolError::InvalidNetwork(network.to_string()))?;

        let mut available = Vec::new();
        let base = u32::from(net.network());
        let count = 1u64 << (32 - net.prefix_len());
        for offset in 0..count {
            let ip = Ipv4Addr::from(base.wrapping_add(offset as u32));
            if low <= ip && ip <= high {
                available.push(ip);
            }
        }

        let size = available.len();
        Ok(Self {
            allocated: HashMap::new(),
            available,
            read_idx: 0,
            write_idx: 0,
            size,
        })
    }

    fn dequeue(&mut self) -> Result<Ipv4Addr, PoolError> {
        if self.size == 0 || self.allocated.len() >= self.size {
            return Err(PoolError::Exhausted);
        }
        let ip = self.available[self.read_idx];
        self.read_idx = (self.read_idx + 1) % self.size;
        Ok(ip)
    }

    fn enqueue(&mut self, ip: Ipv4Addr) {
        self.available[self.write_idx] = ip;
        self.write_idx = (self.write_idx + 1) % self.size;
    }

    /// Allocate an address for a MAC. A MAC that already holds an address
    /// gets the same one back.
    pub fn allocate(&mut self, mac: &str) -> Result<Ipv4Addr, PoolError> {
        if let Some(ip) = self.allocated.get(mac) {
            return Ok(*ip);
        }
        let ip = self.dequeue()?;
        self.allocated.insert(mac.to_string(), ip);
        Ok(ip)
    }

    /// Release a MAC's address back to the queue. Unknown MACs are a silent
    /// no-op.
    pub fn release(&mut self, mac: &str) -> Option<Ipv4Addr> {
        let ip = self.allocated.remove(mac)?;
        self.enqueue(ip);
        Some(ip)
    }

    /// Release whichever MAC holds the given address.
    pub fn release_ip(&mut self, ip: Ipv4Addr) -> Option<String> {
        let mac = self
            .allocated
            .iter()
            .find(|(_, bound)| **bound == ip)
            .map(|(mac, _)| mac.clone())?;
        self.release(&mac);
        Some(mac)
    }

    /// Snapshot of the allocated set.
    pub fn allocations(&self) -> Vec<(String, Ipv4Addr)> {
        self.allocated
            .iter()
            .map(|(mac, ip)| (mac.clone(), *ip))
            .collect()
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }
}
