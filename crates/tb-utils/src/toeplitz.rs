use std::net::{Ipv4Addr, Ipv6Addr};

use crate::UtilError;

/// Toeplitz hash of `input` under `key`, the receive-side-scaling hash.
///
/// For every set input bit, most significant first, the 32-bit key window
/// starting at that bit position is folded into the result.
///
/// # Errors
///
/// Returns [`UtilError::KeyTooShort`] unless the key holds at least 31 bits
/// more than the input.
pub fn toeplitz_hash(key: &[u8], input: &[u8]) -> Result<u32, UtilError> {
    if key.len() * 8 < input.len() * 8 + 31 {
        return Err(UtilError::KeyTooShort {
            key_bytes: key.len(),
            input_bytes: input.len(),
        });
    }

    let mut window = u32::from_be_bytes([key[0], key[1], key[2], key[3]]);
    let mut next_key_bit = 32;
    let mut hash = 0;
    for byte in input {
        for bit in (0..8).rev() {
            if (byte >> bit) & 1 == 1 {
                hash ^= window;
            }
            window = (window << 1) | u32::from(key_bit(key, next_key_bit));
            next_key_bit += 1;
        }
    }
    Ok(hash)
}

fn key_bit(key: &[u8], position: usize) -> bool {
    key.get(position / 8)
        .is_some_and(|byte| (byte >> (7 - position % 8)) & 1 == 1)
}

/// Source and destination of a flow in the order the RSS hash consumes them:
/// source address, destination address, then source and destination ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowTuple {
    addresses: FlowAddresses,
    ports: Option<(u16, u16)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FlowAddresses {
    V4(Ipv4Addr, Ipv4Addr),
    V6(Ipv6Addr, Ipv6Addr),
}

impl FlowTuple {
    /// IPv4 flow hashed on addresses only, as for fragments.
    #[must_use]
    pub const fn ipv4(src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        Self {
            addresses: FlowAddresses::V4(src, dst),
            ports: None,
        }
    }

    /// IPv6 flow hashed on addresses only.
    #[must_use]
    pub const fn ipv6(src: Ipv6Addr, dst: Ipv6Addr) -> Self {
        Self {
            addresses: FlowAddresses::V6(src, dst),
            ports: None,
        }
    }

    /// Adds TCP or UDP ports to the hash input.
    #[must_use]
    pub const fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.ports = Some((src_port, dst_port));
        self
    }

    /// Serializes the hash input in network byte order.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(36);
        match self.addresses {
            FlowAddresses::V4(src, dst) => {
                bytes.extend_from_slice(&src.octets());
                bytes.extend_from_slice(&dst.octets());
            }
            FlowAddresses::V6(src, dst) => {
                bytes.extend_from_slice(&src.octets());
                bytes.extend_from_slice(&dst.octets());
            }
        }
        if let Some((src_port, dst_port)) = self.ports {
            bytes.extend_from_slice(&src_port.to_be_bytes());
            bytes.extend_from_slice(&dst_port.to_be_bytes());
        }
        bytes
    }

    /// Hashes the tuple under `key`.
    ///
    /// # Errors
    ///
    /// Same as [`toeplitz_hash`].
    pub fn hash(&self, key: &[u8]) -> Result<u32, UtilError> {
        toeplitz_hash(key, &self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use rstest::rstest;

    use super::{toeplitz_hash, FlowTuple};
    use crate::UtilError;

    const RSS_KEY: [u8; 40] = [
        0x6d, 0x5a, 0x56, 0xda, 0x25, 0x5b, 0x0e, 0xc2, 0x41, 0x67, 0x25, 0x3d, 0x43, 0xa3, 0x8f,
        0xb0, 0xd0, 0xca, 0x2b, 0xcb, 0xae, 0x7b, 0x30, 0xb4, 0x77, 0xcb, 0x2d, 0xa3, 0x80, 0x30,
        0xf2, 0x0c, 0x6a, 0x42, 0xb7, 0x3b, 0xbe, 0xac, 0x01, 0xfa,
    ];

    #[rstest]
    #[case(false, 0x323e_8fc2)]
    #[case(true, 0x51cc_c178)]
    fn ipv4_verification_vector(#[case] with_ports: bool, #[case] expected: u32) {
        let mut flow = FlowTuple::ipv4(Ipv4Addr::new(66, 9, 149, 187), Ipv4Addr::new(161, 142, 100, 80));
        if with_ports {
            flow = flow.with_ports(2794, 1766);
        }

        assert_eq!(flow.hash(&RSS_KEY).expect("key long enough"), expected);
    }

    #[rstest]
    #[case(false, 0x2cc1_8cd5)]
    #[case(true, 0x4020_7d3d)]
    fn ipv6_verification_vector(#[case] with_ports: bool, #[case] expected: u32) {
        let src: Ipv6Addr = "3ffe:2501:200:1fff::7".parse().expect("address");
        let dst: Ipv6Addr = "3ffe:2501:200:3::1".parse().expect("address");
        let mut flow = FlowTuple::ipv6(src, dst);
        if with_ports {
            flow = flow.with_ports(2794, 1766);
        }

        assert_eq!(flow.hash(&RSS_KEY).expect("key long enough"), expected);
    }

    #[test]
    fn zero_input_hashes_to_zero() {
        assert_eq!(toeplitz_hash(&RSS_KEY, &[0; 12]).expect("hash"), 0);
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(matches!(
            toeplitz_hash(&RSS_KEY[..8], &[0; 8]),
            Err(UtilError::KeyTooShort {
                key_bytes: 8,
                input_bytes: 8,
            })
        ));
    }
}
