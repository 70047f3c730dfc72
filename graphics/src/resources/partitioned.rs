//! Partitioned buffer sub-allocation.
//!
//! A [`PartitionedBuffer`] carves one large backend buffer into power-of-two
//! sized blocks and serves reservation requests out of them. It targets the
//! common pattern of many same-sized requests (per-mesh vertex ranges,
//! per-material uniform slices): same-sized blocks split and re-merge
//! buddy-style, so the steady state stays unfragmented.
//!
//! # Sharing
//!
//! A reservation is either [`Exclusive`](BufferSharing::Exclusive), in which
//! case it owns its block outright, or [`Shared`](BufferSharing::Shared), in which case
//! several reservations co-reside in one block at bump-allocated offsets and
//! the block is only returned to the free set after the last co-resident
//! release.
//!
//! # Example
//!
//! ```
//! use lantern_graphics::backend::DummyBackend;
//! use lantern_graphics::resources::PartitionedBuffer;
//! use lantern_graphics::types::{BufferUsage, ReservationRequest};
//!
//! let backend = DummyBackend::new();
//! let mut buffer = PartitionedBuffer::new(
//!     &backend,
//!     1024,
//!     64,
//!     BufferUsage::VERTEX | BufferUsage::UNIFORM,
//!     "geometry",
//! )?;
//!
//! let reservation = buffer.reserve(ReservationRequest::exclusive(50, BufferUsage::VERTEX))?;
//! assert_eq!(reservation.request_size, 50);
//! assert_eq!(reservation.size, 64); // rounded up to the partition granularity
//!
//! buffer.release(&reservation)?;
//! # Ok::<(), lantern_graphics::GraphicsError>(())
//! ```

use lantern_core::{Arena, Handle};

use crate::backend::{GpuBuffer, RenderBackend};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferSharing, BufferUsage, ReservationRequest};

/// Minimum number of partitions carved for a new shared block.
///
/// Shared blocks are carved with slack beyond the first reservation so that
/// subsequent shared requests can co-reside instead of each carving a block
/// of their own.
const SHARED_BLOCK_PARTITIONS: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Free,
    Exclusive,
    Shared {
        /// Bump cursor: next free byte relative to the block start.
        cursor: u64,
        /// Number of live reservations inside the block.
        live: u32,
    },
}

/// A contiguous sub-range of the backing buffer.
///
/// Blocks are bookkeeping entries owned by the allocator's arena; callers
/// only ever hold `Handle<BufferBlock>` values inside their reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBlock {
    offset: u64,
    size: u64,
    state: BlockState,
}

impl BufferBlock {
    fn free(offset: u64, size: u64) -> Self {
        Self {
            offset,
            size,
            state: BlockState::Free,
        }
    }

    /// Byte offset of the block inside the backing buffer.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of the block in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Check whether the block is in the free set.
    pub fn is_free(&self) -> bool {
        self.state == BlockState::Free
    }
}

/// A granted sub-range of a partitioned buffer.
///
/// `size` is the allocator-granted size (the request rounded up to the
/// partition granularity); `request_size` preserves the caller's original
/// ask so callers can bind exactly the bytes they populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferReservation {
    /// The caller's requested size in bytes.
    pub request_size: u64,
    /// Granted size: `request_size` rounded up to the partition granularity.
    pub size: u64,
    /// Byte offset of the reservation inside the backing buffer.
    pub offset: u64,
    /// The block this reservation lives in.
    pub block: Handle<BufferBlock>,
}

impl BufferReservation {
    /// End offset of the granted range (`offset + size`).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Sub-allocator over a single backend buffer.
///
/// The capacity given at construction is rounded up so the partition count is
/// a power of two, which keeps every split block buddy-aligned: a block's
/// buddy is always at `offset ^ size`, and releasing adjacent buddies merges
/// them back eagerly.
pub struct PartitionedBuffer {
    buffer: GpuBuffer,
    usage: BufferUsage,
    capacity: u64,
    granularity: u64,
    blocks: Arena<BufferBlock>,
    /// Free blocks sorted by offset, so first-fit scans grant the
    /// lowest-offset block that fits.
    free: Vec<Handle<BufferBlock>>,
}

impl PartitionedBuffer {
    /// Create a partitioned buffer backed by a new backend buffer.
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend collaborator that allocates the backing buffer
    /// * `capacity` - Requested capacity in bytes; rounded up so the
    ///   partition count is a power of two
    /// * `granularity` - Partition size in bytes (must be a power of two)
    /// * `usage` - Usage flags of the backing buffer; reservation requests
    ///   must stay within this set
    /// * `label` - Debug label for the backing buffer
    pub fn new(
        backend: &dyn RenderBackend,
        capacity: u64,
        granularity: u64,
        usage: BufferUsage,
        label: &str,
    ) -> Result<Self, GraphicsError> {
        if granularity == 0 || !granularity.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "partition granularity must be a power of two, got {granularity}"
            )));
        }
        if capacity == 0 {
            return Err(GraphicsError::InvalidParameter(
                "partitioned buffer capacity cannot be zero".to_string(),
            ));
        }

        let partitions = capacity.div_ceil(granularity).next_power_of_two();
        let rounded = partitions * granularity;

        let descriptor =
            BufferDescriptor::new(rounded, usage).with_label(format!("{label}_partitioned"));
        let buffer = backend.create_buffer(&descriptor)?;

        let mut blocks = Arena::new();
        let root = blocks.allocate(BufferBlock::free(0, rounded))?;

        log::trace!(
            "partitioned buffer '{label}': {rounded} bytes, {partitions} partitions of {granularity}"
        );

        Ok(Self {
            buffer,
            usage,
            capacity: rounded,
            granularity,
            blocks,
            free: vec![root],
        })
    }

    /// The backing backend buffer.
    pub fn buffer(&self) -> &GpuBuffer {
        &self.buffer
    }

    /// Total capacity in bytes (after power-of-two partition rounding).
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Partition granularity in bytes.
    pub fn granularity(&self) -> u64 {
        self.granularity
    }

    /// Total bytes currently in the free set.
    ///
    /// Unused slack inside shared blocks counts as reserved, not free.
    pub fn free_bytes(&self) -> u64 {
        self.free
            .iter()
            .filter_map(|&handle| self.blocks.try_get(handle))
            .map(BufferBlock::size)
            .sum()
    }

    /// Total bytes currently held by blocks outside the free set.
    pub fn reserved_bytes(&self) -> u64 {
        self.capacity - self.free_bytes()
    }

    /// Reserve a sub-range of the buffer.
    ///
    /// The request size is rounded up to the partition granularity. Exclusive
    /// requests get a first-fit free block, split buddy-style down to the
    /// smallest power-of-two block that holds the granted size. Shared
    /// requests join an existing shared block with room, or carve a new one.
    ///
    /// Fails with [`GraphicsError::OutOfSpace`] when no free block fits; the
    /// allocator state is unchanged on failure, so the caller may release
    /// other reservations and retry.
    pub fn reserve(
        &mut self,
        request: ReservationRequest,
    ) -> Result<BufferReservation, GraphicsError> {
        if request.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "reservation size cannot be zero".to_string(),
            ));
        }
        if !self.usage.contains(request.usage) {
            return Err(GraphicsError::InvalidParameter(format!(
                "reservation usage {:?} not covered by buffer usage {:?}",
                request.usage, self.usage
            )));
        }

        let granted = align_up(request.size, self.granularity);
        if granted > self.capacity {
            return Err(GraphicsError::OutOfSpace);
        }

        let reservation = match request.sharing {
            BufferSharing::Exclusive => {
                let handle = self.take_free_block(block_size_for(granted, self.granularity))?;
                let block = self.blocks.get_mut(handle)?;
                block.state = BlockState::Exclusive;
                BufferReservation {
                    request_size: request.size,
                    size: granted,
                    offset: block.offset,
                    block: handle,
                }
            }
            BufferSharing::Shared => self.reserve_shared(request.size, granted)?,
        };

        log::trace!(
            "reserved {} bytes ({:?}) at offset {}",
            reservation.size,
            request.sharing,
            reservation.offset
        );
        Ok(reservation)
    }

    /// Release a reservation back to the allocator.
    ///
    /// Exclusive reservations free their block immediately; shared
    /// reservations only free the block once every co-resident reservation
    /// has been released. Freed blocks merge with their free buddy eagerly.
    ///
    /// Fails with [`GraphicsError::UnknownReservation`] if the reservation's
    /// block handle no longer resolves or the block is already free.
    pub fn release(&mut self, reservation: &BufferReservation) -> Result<(), GraphicsError> {
        let block = self
            .blocks
            .get_mut(reservation.block)
            .map_err(|_| GraphicsError::UnknownReservation)?;

        match block.state {
            BlockState::Free => Err(GraphicsError::UnknownReservation),
            BlockState::Exclusive => {
                log::trace!(
                    "released exclusive block at offset {} ({} bytes)",
                    block.offset,
                    block.size
                );
                self.free_block(reservation.block)
            }
            BlockState::Shared { cursor, live } => {
                if live > 1 {
                    block.state = BlockState::Shared {
                        cursor,
                        live: live - 1,
                    };
                    Ok(())
                } else {
                    log::trace!(
                        "released last shared reservation in block at offset {}",
                        block.offset
                    );
                    self.free_block(reservation.block)
                }
            }
        }
    }

    /// Merge adjacent free buddies until no more merges are possible.
    ///
    /// Returns the number of merges performed. Releasing already coalesces
    /// eagerly, so this normally reports zero; it exists as an explicit
    /// maintenance hook. Live reservations are never migrated; compaction of
    /// occupied blocks is not supported by this allocator.
    pub fn defragment(&mut self) -> Result<usize, GraphicsError> {
        let mut merges = 0;
        let mut progress = true;
        while progress {
            progress = false;
            let candidates = self.free.clone();
            for handle in candidates {
                // Skip handles consumed by a merge earlier in this sweep.
                if !self.blocks.contains(handle) {
                    continue;
                }
                if self.merge_with_buddy(handle)?.is_some() {
                    merges += 1;
                    progress = true;
                }
            }
        }
        Ok(merges)
    }

    fn reserve_shared(
        &mut self,
        request_size: u64,
        granted: u64,
    ) -> Result<BufferReservation, GraphicsError> {
        // Join the lowest-offset shared block with enough room.
        let candidate = self.blocks.iter().find_map(|(handle, block)| {
            if let BlockState::Shared { cursor, .. } = block.state {
                (block.size - cursor >= granted).then_some(handle)
            } else {
                None
            }
        });

        if let Some(handle) = candidate {
            let block = self.blocks.get_mut(handle)?;
            let (cursor, live) = match block.state {
                BlockState::Shared { cursor, live } => (cursor, live),
                _ => unreachable!("candidate block is shared"),
            };
            let offset = block.offset + cursor;
            block.state = BlockState::Shared {
                cursor: cursor + granted,
                live: live + 1,
            };
            return Ok(BufferReservation {
                request_size,
                size: granted,
                offset,
                block: handle,
            });
        }

        // Carve a fresh shared block with slack for future co-residents.
        let slack = (SHARED_BLOCK_PARTITIONS * self.granularity).min(self.capacity);
        let block_size = block_size_for(granted, self.granularity).max(slack);
        let handle = self.take_free_block(block_size)?;
        let block = self.blocks.get_mut(handle)?;
        block.state = BlockState::Shared {
            cursor: granted,
            live: 1,
        };
        Ok(BufferReservation {
            request_size,
            size: granted,
            offset: block.offset,
            block: handle,
        })
    }

    /// First-fit over the free set, splitting the chosen block buddy-style
    /// down to `block_size`.
    fn take_free_block(&mut self, block_size: u64) -> Result<Handle<BufferBlock>, GraphicsError> {
        let blocks = &self.blocks;
        let position = self
            .free
            .iter()
            .position(|&handle| blocks.try_get(handle).is_some_and(|b| b.size >= block_size))
            .ok_or(GraphicsError::OutOfSpace)?;
        let handle = self.free.remove(position);

        loop {
            let (offset, size) = {
                let block = self.blocks.get(handle)?;
                (block.offset, block.size)
            };
            if size / 2 < block_size {
                break;
            }
            let half = size / 2;
            let upper = self.blocks.allocate(BufferBlock::free(offset + half, half))?;
            self.insert_free_sorted(upper, offset + half);
            self.blocks.get_mut(handle)?.size = half;
        }

        Ok(handle)
    }

    /// Return a block to the free set and merge it with its buddy eagerly.
    fn free_block(&mut self, handle: Handle<BufferBlock>) -> Result<(), GraphicsError> {
        let block = self.blocks.get_mut(handle)?;
        block.state = BlockState::Free;
        let offset = block.offset;
        self.insert_free_sorted(handle, offset);

        let mut current = handle;
        while let Some(merged) = self.merge_with_buddy(current)? {
            current = merged;
        }
        Ok(())
    }

    /// Merge `handle` with its free buddy, if the buddy is free and the same
    /// size. Returns the handle of the merged block, or `None` if no merge
    /// was possible. Both constituents are consumed.
    fn merge_with_buddy(
        &mut self,
        handle: Handle<BufferBlock>,
    ) -> Result<Option<Handle<BufferBlock>>, GraphicsError> {
        let (offset, size) = {
            let block = self.blocks.get(handle)?;
            (block.offset, block.size)
        };
        if size >= self.capacity {
            return Ok(None);
        }

        let buddy_offset = offset ^ size;
        let blocks = &self.blocks;
        let buddy = self.free.iter().copied().find(|&candidate| {
            candidate != handle
                && blocks
                    .try_get(candidate)
                    .is_some_and(|b| b.offset == buddy_offset && b.size == size)
        });
        let Some(buddy) = buddy else {
            return Ok(None);
        };

        self.free
            .retain(|&candidate| candidate != handle && candidate != buddy);
        self.blocks.free(handle)?;
        self.blocks.free(buddy)?;

        let merged_offset = offset.min(buddy_offset);
        let merged = self
            .blocks
            .allocate(BufferBlock::free(merged_offset, size * 2))?;
        self.insert_free_sorted(merged, merged_offset);
        Ok(Some(merged))
    }

    fn insert_free_sorted(&mut self, handle: Handle<BufferBlock>, offset: u64) {
        let blocks = &self.blocks;
        let position = self
            .free
            .partition_point(|&h| blocks.try_get(h).is_some_and(|b| b.offset < offset));
        self.free.insert(position, handle);
    }
}

impl std::fmt::Debug for PartitionedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedBuffer")
            .field("capacity", &self.capacity)
            .field("granularity", &self.granularity)
            .field("free_bytes", &self.free_bytes())
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

/// Align a value up to the given power-of-two alignment.
#[inline]
fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Smallest power-of-two multiple of `granularity` that holds `granted`.
#[inline]
fn block_size_for(granted: u64, granularity: u64) -> u64 {
    (granted / granularity).next_power_of_two() * granularity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::types::ReservationRequest;

    const USAGE: BufferUsage = BufferUsage::VERTEX.union(BufferUsage::UNIFORM);

    fn create_buffer(capacity: u64, granularity: u64) -> PartitionedBuffer {
        let backend = DummyBackend::new();
        PartitionedBuffer::new(&backend, capacity, granularity, USAGE, "test").unwrap()
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two_partitions() {
        // 1000 bytes at granularity 64 needs 16 partitions (15.6 rounded up),
        // which is already a power of two.
        let buffer = create_buffer(1000, 64);
        assert_eq!(buffer.capacity(), 1024);

        // 17 partitions round up to 32.
        let buffer = create_buffer(17 * 64, 64);
        assert_eq!(buffer.capacity(), 32 * 64);
    }

    #[test]
    fn test_granularity_must_be_power_of_two() {
        let backend = DummyBackend::new();
        let result = PartitionedBuffer::new(&backend, 1024, 100, USAGE, "test");
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_reserve_rounds_up_to_granularity() {
        let mut buffer = create_buffer(1024, 64);
        let reservation = buffer
            .reserve(ReservationRequest::exclusive(50, BufferUsage::VERTEX))
            .unwrap();

        assert_eq!(reservation.request_size, 50);
        assert_eq!(reservation.size, 64);
        assert_eq!(reservation.offset, 0);
    }

    #[test]
    fn test_exclusive_reservations_do_not_overlap() {
        let mut buffer = create_buffer(1024, 64);
        let a = buffer
            .reserve(ReservationRequest::exclusive(64, BufferUsage::VERTEX))
            .unwrap();
        let b = buffer
            .reserve(ReservationRequest::exclusive(64, BufferUsage::VERTEX))
            .unwrap();

        assert!(a.end() <= b.offset || b.end() <= a.offset);
    }

    #[test]
    fn test_release_coalesces_buddies() {
        let mut buffer = create_buffer(1024, 64);
        let a = buffer
            .reserve(ReservationRequest::exclusive(64, BufferUsage::VERTEX))
            .unwrap();
        let b = buffer
            .reserve(ReservationRequest::exclusive(64, BufferUsage::VERTEX))
            .unwrap();

        buffer.release(&a).unwrap();
        buffer.release(&b).unwrap();

        // Both 64-byte buddies must have merged back, or a 128-byte
        // reservation could not be served contiguously.
        let c = buffer
            .reserve(ReservationRequest::exclusive(128, BufferUsage::VERTEX))
            .unwrap();
        assert_eq!(c.size, 128);
        assert_eq!(c.offset, 0);
    }

    #[test]
    fn test_out_of_space_is_recoverable() {
        let mut buffer = create_buffer(256, 64);
        let big = buffer
            .reserve(ReservationRequest::exclusive(256, BufferUsage::VERTEX))
            .unwrap();

        assert_eq!(
            buffer.reserve(ReservationRequest::exclusive(64, BufferUsage::VERTEX)),
            Err(GraphicsError::OutOfSpace)
        );

        // Failure must not corrupt state: release and retry succeeds.
        buffer.release(&big).unwrap();
        assert!(buffer
            .reserve(ReservationRequest::exclusive(64, BufferUsage::VERTEX))
            .is_ok());
    }

    #[test]
    fn test_oversized_request_fails() {
        let mut buffer = create_buffer(256, 64);
        assert_eq!(
            buffer.reserve(ReservationRequest::exclusive(512, BufferUsage::VERTEX)),
            Err(GraphicsError::OutOfSpace)
        );
    }

    #[test]
    fn test_zero_size_request_rejected() {
        let mut buffer = create_buffer(256, 64);
        assert!(matches!(
            buffer.reserve(ReservationRequest::exclusive(0, BufferUsage::VERTEX)),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_usage_must_be_subset_of_buffer_usage() {
        let mut buffer = create_buffer(256, 64);
        assert!(matches!(
            buffer.reserve(ReservationRequest::exclusive(64, BufferUsage::STORAGE)),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_shared_reservations_co_reside() {
        let mut buffer = create_buffer(1024, 64);
        let a = buffer
            .reserve(ReservationRequest::shared(64, BufferUsage::UNIFORM))
            .unwrap();
        let b = buffer
            .reserve(ReservationRequest::shared(64, BufferUsage::UNIFORM))
            .unwrap();

        assert_eq!(a.block, b.block);
        assert_eq!(b.offset, a.offset + 64);
    }

    #[test]
    fn test_shared_block_freed_after_last_release() {
        let mut buffer = create_buffer(1024, 64);
        let a = buffer
            .reserve(ReservationRequest::shared(64, BufferUsage::UNIFORM))
            .unwrap();
        let b = buffer
            .reserve(ReservationRequest::shared(64, BufferUsage::UNIFORM))
            .unwrap();

        buffer.release(&a).unwrap();
        // Block still held by `b`.
        assert!(buffer.free_bytes() < buffer.capacity());

        buffer.release(&b).unwrap();
        assert_eq!(buffer.free_bytes(), buffer.capacity());
    }

    #[test]
    fn test_double_release_fails() {
        let mut buffer = create_buffer(256, 64);
        let reservation = buffer
            .reserve(ReservationRequest::exclusive(64, BufferUsage::VERTEX))
            .unwrap();

        buffer.release(&reservation).unwrap();
        assert_eq!(
            buffer.release(&reservation),
            Err(GraphicsError::UnknownReservation)
        );
    }

    #[test]
    fn test_defragment_after_eager_merging_is_noop() {
        let mut buffer = create_buffer(1024, 64);
        let reservations: Vec<_> = (0..4)
            .map(|_| {
                buffer
                    .reserve(ReservationRequest::exclusive(64, BufferUsage::VERTEX))
                    .unwrap()
            })
            .collect();
        for reservation in &reservations {
            buffer.release(reservation).unwrap();
        }

        // Release already merged everything back to a single root block.
        assert_eq!(buffer.defragment().unwrap(), 0);
        assert_eq!(buffer.free_bytes(), buffer.capacity());
    }

    #[test]
    fn test_interleaved_release_merges_out_of_order() {
        let mut buffer = create_buffer(512, 64);
        let reservations: Vec<_> = (0..8)
            .map(|_| {
                buffer
                    .reserve(ReservationRequest::exclusive(64, BufferUsage::VERTEX))
                    .unwrap()
            })
            .collect();

        // Release in a scattered order; coalescing must still recover the
        // whole buffer.
        for index in [3, 0, 7, 2, 5, 1, 6, 4] {
            buffer.release(&reservations[index]).unwrap();
        }
        assert_eq!(buffer.free_bytes(), buffer.capacity());

        let whole = buffer
            .reserve(ReservationRequest::exclusive(512, BufferUsage::VERTEX))
            .unwrap();
        assert_eq!(whole.offset, 0);
    }

    #[test]
    fn test_non_power_of_two_request_gets_larger_block() {
        let mut buffer = create_buffer(1024, 64);
        // 192 bytes round to 192 granted, but the backing block is 256.
        let reservation = buffer
            .reserve(ReservationRequest::exclusive(190, BufferUsage::VERTEX))
            .unwrap();
        assert_eq!(reservation.size, 192);
        assert_eq!(buffer.reserved_bytes(), 256);
    }
}
