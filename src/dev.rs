//! Deterministic development keys and sealing helpers.
//!
//! These are the standard prefunded dev-chain keys; every test that needs a
//! real secp256k1 seal signs with them so recovered addresses are stable.

use crate::constants::EXTRA_SEAL_LENGTH;
use crate::header::seal_hash;
use crate::recovery::signature_to_seal_bytes;
use alloy_consensus::Header;
use alloy_primitives::Address;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

/// Well-known development private keys.
pub const DEV_PRIVATE_KEYS: [&str; 6] = [
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
    "7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6",
    "47e179ec197488593b187f80a00eb0da91f1b9d0b13f8733639f19c30a34926a",
    "8b3a350cf5c34c9194ca85829a2df0ec3153be0318b5e2d3348e872092edffba",
];

/// Signer for dev key `index`.
pub fn signer(index: usize) -> PrivateKeySigner {
    DEV_PRIVATE_KEYS[index]
        .parse()
        .expect("dev key is valid hex")
}

/// Addresses of all dev keys, in key order.
pub fn addresses() -> Vec<Address> {
    (0..DEV_PRIVATE_KEYS.len()).map(|i| signer(i).address()).collect()
}

/// Sign `header`'s seal hash with `signer` and embed the signature into the
/// trailing 65 bytes of its extra data.
pub fn seal(mut header: Header, signer: &PrivateKeySigner) -> Header {
    let hash = seal_hash(&header);
    let signature = signer.sign_hash_sync(&hash).expect("dev signing succeeds");

    let mut extra = header.extra_data.to_vec();
    if extra.len() >= EXTRA_SEAL_LENGTH {
        extra.truncate(extra.len() - EXTRA_SEAL_LENGTH);
    }
    extra.extend_from_slice(&signature_to_seal_bytes(&signature));
    header.extra_data = extra.into();
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_addresses_are_distinct_and_stable() {
        let addrs = addresses();
        assert_eq!(addrs.len(), DEV_PRIVATE_KEYS.len());
        for i in 0..addrs.len() {
            for j in (i + 1)..addrs.len() {
                assert_ne!(addrs[i], addrs[j]);
            }
        }
        assert_eq!(addrs, addresses(), "derivation must be deterministic");
    }

    #[test]
    fn test_first_dev_address_matches_known_value() {
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
            .parse()
            .unwrap();
        assert_eq!(signer(0).address(), expected);
    }
}
