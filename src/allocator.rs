// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subnet Allocation - CIDR Bin Packing
//!
//! Pure functions that carve child blocks out of a parent network.
//!
//! # Algorithm
//!
//! 1. `candidate_length = parent.prefix + additional_mask_bits`
//! 2. Enumerate the `2^additional_mask_bits` blocks of that length inside the
//!    parent in ascending address order
//! 3. Drop candidates overlapping an existing child
//! 4. Return the first survivor
//!
//! The result depends only on the parent and the *set* of existing children,
//! never on the order they were supplied in. Serializing concurrent
//! allocators is the caller's transaction's job.

use thiserror::Error;

use crate::domain::{cidr::low_mask, Cidr};

/// Allocation failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Invalid prefix length /{requested} (maximum /{max})")]
    InvalidPrefix { requested: u16, max: u8 },

    #[error("Subnets exhausted: no free /{prefix_length} left in {parent}")]
    SubnetsExhausted { parent: Cidr, prefix_length: u8 },
}

/// Prefix length of blocks produced by splitting `parent` with extra mask bits
pub fn candidate_length(parent: &Cidr, additional_mask_bits: u8) -> Result<u8, AllocationError> {
    let max = parent.family().max_prefix();
    let requested = parent.prefix_length() as u16 + additional_mask_bits as u16;

    if requested > max as u16 {
        return Err(AllocationError::InvalidPrefix { requested, max });
    }

    Ok(requested as u8)
}

/// Ascending enumeration of equal-sized sub-blocks of a parent network
#[derive(Debug, Clone)]
pub struct Candidates {
    parent: Cidr,
    prefix_length: u8,
    next: Option<u128>,
}

impl Candidates {
    /// Enumerate the `/prefix_length` blocks of `parent`
    pub fn new(parent: Cidr, prefix_length: u8) -> Result<Self, AllocationError> {
        let max = parent.family().max_prefix();
        if prefix_length > max || prefix_length < parent.prefix_length() {
            return Err(AllocationError::InvalidPrefix {
                requested: prefix_length as u16,
                max,
            });
        }

        Ok(Self {
            parent,
            prefix_length,
            next: Some(parent.first()),
        })
    }

    fn block_size_minus_one(&self) -> u128 {
        low_mask(self.parent.family().max_prefix() - self.prefix_length)
    }

    /// Move the cursor to the first candidate starting after `address`
    fn skip_past(&mut self, address: u128) {
        let span = self.block_size_minus_one();
        self.next = address
            .checked_add(1)
            .and_then(|next| {
                // round up to the next block boundary
                let offset = next & span;
                if offset == 0 {
                    Some(next)
                } else {
                    (next | span).checked_add(1)
                }
            })
            .filter(|start| *start <= self.parent.last());
    }
}

impl Iterator for Candidates {
    type Item = Cidr;

    fn next(&mut self) -> Option<Cidr> {
        let start = self.next?;
        let end = start | self.block_size_minus_one();

        self.next = end
            .checked_add(1)
            .filter(|next| *next <= self.parent.last());

        Cidr::from_numeric(self.parent.family(), start, self.prefix_length).ok()
    }
}

/// Allocate the lowest free block of `parent` split by `additional_mask_bits`
///
/// # Errors
/// - `InvalidPrefix` if the candidate length exceeds the family maximum
/// - `SubnetsExhausted` if every candidate overlaps an existing child
///
/// # Examples
///
/// ```rust
/// use cim_topology::allocator::allocate;
/// use cim_topology::domain::Cidr;
///
/// let parent = Cidr::new("10.0.0.0/16").unwrap();
/// let taken = vec![Cidr::new("10.0.0.0/24").unwrap()];
/// let next = allocate(&parent, &taken, 8).unwrap();
/// assert_eq!(next.to_string(), "10.0.1.0/24");
/// ```
pub fn allocate<'a, I>(
    parent: &Cidr,
    existing: I,
    additional_mask_bits: u8,
) -> Result<Cidr, AllocationError>
where
    I: IntoIterator<Item = &'a Cidr>,
{
    let prefix_length = candidate_length(parent, additional_mask_bits)?;

    // Sorting makes the scan independent of the caller's ordering.
    let mut taken: Vec<&Cidr> = existing
        .into_iter()
        .filter(|child| child.overlaps(parent))
        .collect();
    taken.sort_by_key(|child| (child.first(), child.last()));

    let mut candidates = Candidates::new(*parent, prefix_length)?;
    while let Some(candidate) = candidates.clone().next() {
        let blocking_end = taken
            .iter()
            .filter(|child| child.overlaps(&candidate))
            .map(|child| child.last())
            .max();

        match blocking_end {
            None => return Ok(candidate),
            Some(end) => candidates.skip_past(end.max(candidate.first())),
        }
    }

    Err(AllocationError::SubnetsExhausted {
        parent: *parent,
        prefix_length,
    })
}
