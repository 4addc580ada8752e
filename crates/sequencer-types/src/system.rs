//! Storage layout of the L2 system contract

use crate::primitives::{Address, Hash};
use sha3::{Digest, Keccak256};

/// Address of the system contract that records per-block state roots
pub const SYSTEM_SC_ADDRESS: Address = Address([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x5c, 0xa1, 0xab, 0x1e,
]);

/// Storage slot of the `stateRoot` mapping in the system contract
const STATE_ROOT_MAPPING_SLOT: u64 = 1;

/// Storage position holding the state root written for `block_number`.
///
/// `keccak256(pad32(block_number) || pad32(1))`
pub fn system_sc_position(block_number: u64) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(Hash::from_u64(block_number).as_bytes());
    hasher.update(Hash::from_u64(STATE_ROOT_MAPPING_SLOT).as_bytes());
    let mut position = [0u8; 32];
    position.copy_from_slice(&hasher.finalize());
    Hash(position)
}
