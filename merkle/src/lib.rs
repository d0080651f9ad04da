use primitive_types::H256;
use serde::{Deserialize, Serialize};

pub use crate::errors::MerkleError;
pub use crate::hasher::{HashFunction, Keccak256};

mod errors;
mod hasher;

pub type MerkleRoot = H256;

/// Whether the node being proven is the left or the right child at a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    fn to_byte(self) -> u8 {
        match self {
            Direction::Left => 0,
            Direction::Right => 1,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, MerkleError> {
        match byte {
            0 => Ok(Direction::Left),
            1 => Ok(Direction::Right),
            _ => Err(MerkleError::MalformedProof),
        }
    }
}

///
/// # Merkle Tree
///
/// Fixed capacity binary tree. Leaves beyond the supplied items are filled
/// with the hash of the empty leaf encoding, so every tree of the same
/// capacity has the same shape.
#[derive(Debug, Clone)]
pub struct Merkle<H = Keccak256>
where
    H: HashFunction,
{
    leaves: Vec<H256>,
    levels: Option<Vec<Vec<H256>>>,
    hasher: H,
}

impl Merkle<Keccak256> {
    pub fn new<B: AsRef<[u8]>>(
        capacity: usize,
        empty_leaf: &[u8],
        items: &[B],
    ) -> Result<Self, MerkleError> {
        Merkle::with_hasher(Keccak256, capacity, empty_leaf, items)
    }
}

impl<H: HashFunction> Merkle<H> {
    pub fn with_hasher<B: AsRef<[u8]>>(
        hasher: H,
        capacity: usize,
        empty_leaf: &[u8],
        items: &[B],
    ) -> Result<Self, MerkleError> {
        if !capacity.is_power_of_two() {
            return Err(MerkleError::CapacityNotPowerOfTwo(capacity));
        }
        if items.len() > capacity {
            return Err(MerkleError::TooManyLeaves(items.len(), capacity));
        }
        let empty = hasher.digest(empty_leaf);
        let mut leaves = Vec::with_capacity(capacity);
        leaves.extend(items.iter().map(|item| hasher.digest(item.as_ref())));
        leaves.resize(capacity, empty);
        Ok(Merkle {
            leaves,
            levels: None,
            hasher,
        })
    }

    pub fn capacity(&self) -> usize {
        self.leaves.len()
    }

    pub fn depth(&self) -> usize {
        self.leaves.len().trailing_zeros() as usize
    }

    /// Root without retaining intermediate levels.
    pub fn compute_root(&self) -> MerkleRoot {
        let mut level = self.leaves.clone();
        while level.len() > 1 {
            level = self.next_level(&level);
        }
        level[0]
    }

    /// Retains every level; required before [`Merkle::root`] and [`Merkle::proof`].
    pub fn build_tree(&mut self) {
        let mut levels = Vec::with_capacity(self.depth() + 1);
        levels.push(self.leaves.clone());
        while let Some(last) = levels.last() {
            if last.len() == 1 {
                break;
            }
            let next = self.next_level(last);
            levels.push(next);
        }
        self.levels = Some(levels);
    }

    pub fn root(&self) -> Result<MerkleRoot, MerkleError> {
        let levels = self.levels.as_ref().ok_or(MerkleError::TreeNotReady)?;
        levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .ok_or(MerkleError::TreeNotReady)
    }

    pub fn proof(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        let levels = self.levels.as_ref().ok_or(MerkleError::TreeNotReady)?;
        if index >= self.leaves.len() {
            return Err(MerkleError::IndexOutOfRange(index));
        }
        let mut path = Vec::with_capacity(self.depth());
        let mut position = index;
        for level in levels.iter().take(levels.len() - 1) {
            let step = if position % 2 == 0 {
                (Direction::Left, level[position + 1])
            } else {
                (Direction::Right, level[position - 1])
            };
            path.push(step);
            position /= 2;
        }
        Ok(MerkleProof {
            index: index as u32,
            path,
        })
    }

    fn next_level(&self, level: &[H256]) -> Vec<H256> {
        level
            .chunks(2)
            .map(|pair| hash_pair(&self.hasher, &pair[0], &pair[1]))
            .collect()
    }
}

pub fn hash_pair(h: &dyn HashFunction, left: &H256, right: &H256) -> H256 {
    let mut union = [0_u8; 64];
    union[..32].copy_from_slice(left.as_bytes());
    union[32..].copy_from_slice(right.as_bytes());
    h.digest(&union)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub index: u32,
    pub path: Vec<(Direction, H256)>,
}

impl MerkleProof {
    pub fn fold(&self, hasher: &dyn HashFunction, leaf_hash: H256) -> H256 {
        self.path
            .iter()
            .fold(leaf_hash, |node, (direction, sibling)| match direction {
                Direction::Left => hash_pair(hasher, &node, sibling),
                Direction::Right => hash_pair(hasher, sibling, &node),
            })
    }

    /// Checks a raw leaf encoding against `root` with the keccak hasher.
    pub fn verify(&self, leaf: &[u8], root: &MerkleRoot) -> bool {
        let hasher = Keccak256;
        self.fold(&hasher, hasher.digest(leaf)) == *root
    }

    /// `index (4, BE) || depth (1) || depth * (direction (1) || sibling (32))`
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.path.len() * 33);
        out.extend_from_slice(&self.index.to_be_bytes());
        out.push(self.path.len() as u8);
        for (direction, sibling) in self.path.iter() {
            out.push(direction.to_byte());
            out.extend_from_slice(sibling.as_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, MerkleError> {
        if buf.len() < 5 {
            return Err(MerkleError::MalformedProof);
        }
        let mut index = [0_u8; 4];
        index.copy_from_slice(&buf[..4]);
        let depth = buf[4] as usize;
        let body = &buf[5..];
        if body.len() != depth * 33 {
            return Err(MerkleError::MalformedProof);
        }
        let path = body
            .chunks(33)
            .map(|step| Ok((Direction::from_byte(step[0])?, H256::from_slice(&step[1..]))))
            .collect::<Result<Vec<_>, MerkleError>>()?;
        Ok(MerkleProof {
            index: u32::from_be_bytes(index),
            path,
        })
    }
}
