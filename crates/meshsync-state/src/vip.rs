//! Deterministic virtual IPs for internal hostnames.
//!
//! The address is derived from the SHA-256 digest of the hostname and lives
//! in 127.0.0.0/8, so it never collides with routable addresses. The low two
//! bits of the last octet are always set, which keeps it clear of
//! 127.0.0.1 and of network/broadcast-looking addresses.

use std::net::Ipv4Addr;

use sha2::{Digest, Sha256};

/// Virtual IP for `hostname`: `127.h[2].h[1].(h[0] | 0x03)` over the
/// SHA-256 digest of the lowercased hostname.
pub fn vip_for_hostname(hostname: &str) -> Ipv4Addr {
    let digest = Sha256::digest(hostname.to_ascii_lowercase().as_bytes());
    Ipv4Addr::new(127, digest[2], digest[1], digest[0] | 0x03)
}
