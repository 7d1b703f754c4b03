//! This module provides the raw allocator and its support types.
//!
//! A "raw allocator" is one that simply gets requests for a specific memory
//! size but does not need to worry about alignment; [`crate::Allocator`]
//! layers that on top. Internally the heap is a single arena ([`arena::Arena`])
//! carved into boundary-tagged blocks ([`block`]), threaded through 16
//! segregated free lists ([`free_list`]) rooted at a fixed table laid out by
//! [`topology::initialize`], with eager coalescing ([`coalesce`]) and
//! best-fit placement ([`place`]) backed by a dedicated wilderness block.
pub(crate) mod arena;
pub(crate) mod block;
pub(crate) mod check;
pub(crate) mod coalesce;
pub(crate) mod free_list;
pub(crate) mod place;
pub(crate) mod topology;

use arena::{Arena, OutOfMemory};
use block::Node;
use topology::Topology;

/// An error occurred when calling [`RawAllocator::try_free`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
    /// An already-freed block was freed again.
    DoubleFreeDetected,
    /// The pointer doesn't point at the payload of any block this
    /// allocator handed out.
    AllocationNotFound,
}

/// A segregated-fit memory allocator over a fixed-capacity arena.
///
/// The arena is lazily carved into its initial topology (seg-list root
/// table, prologue, epilogue, first wilderness block) on first use, so that
/// [`RawAllocator::new`] stays a trivial `const fn` suitable for a `static`.
pub struct RawAllocator<const N: usize> {
    arena: Arena<N>,
    topology: Topology,
    wilderness: Node,
    initialized: bool,
}
impl<const N: usize> RawAllocator<N> {
    /// Create a new, uninitialized [`RawAllocator`]. No heap layout exists
    /// yet; it's carved out lazily by the first call that needs it.
    pub const fn new() -> Self {
        Self {
            arena: Arena::new(),
            topology: Topology {
                prologue: Node(0),
                epilogue: Node(0),
            },
            wilderness: Node(0),
            initialized: false,
        }
    }

    fn ensure_init(&mut self) -> Result<(), OutOfMemory> {
        if !self.initialized {
            let (topology, wilderness) = topology::initialize(&mut self.arena)?;
            self.topology = topology;
            self.wilderness = wilderness;
            self.initialized = true;
        }
        Ok(())
    }

    /// Compute the adjusted block size for a `size`-byte request (section
    /// 4.6): header overhead plus alignment round-up, a minimum block
    /// floor for tiny requests, and extra room once the large-block header
    /// layout kicks in.
    fn adjusted_size(size: u32) -> u32 {
        let mut asize = ((size + 1) / block::DSIZE) * block::DSIZE + block::DSIZE;
        if size <= block::DSIZE - 2 {
            asize += block::DSIZE;
        }
        if asize >= block::LARGE_THRESHOLD {
            asize += 2 * block::DSIZE;
        }
        asize
    }

    /// Allocate `size` bytes, returning a pointer to the payload, or `None`
    /// if `size` is zero, too large to represent, or the arena is
    /// exhausted.
    pub fn allocate(&mut self, size: usize) -> Option<*mut u8> {
        if size == 0 {
            return None;
        }
        let size = u32::try_from(size).ok()?;
        self.ensure_init().ok()?;
        let asize = Self::adjusted_size(size);

        let bp = loop {
            if let Some(bp) = place::find_fit(&self.arena, self.wilderness, asize) {
                break bp;
            }
            let wild_size = block::header(&self.arena, self.wilderness).size;
            let deficit = asize.saturating_sub(wild_size.saturating_sub(block::MINSIZE));
            let grow = deficit.max(block::CHUNKSIZE);
            self.wilderness = place::extend_heap(
                &mut self.arena,
                &mut self.topology,
                self.wilderness,
                grow / block::WSIZE,
            )
            .ok()?;
        };

        if bp != self.wilderness {
            free_list::remove(&mut self.arena, bp);
        }
        let placed = place::place(&mut self.arena, self.wilderness, bp, asize);
        if let Some(new_wilderness) = placed.new_wilderness {
            self.wilderness = new_wilderness;
        }

        let large = block::header(&self.arena, bp).large;
        Some(self.arena.as_mut_ptr(bp.payload(large)))
    }

    /// Free the block at `ptr`, detecting double-frees and foreign
    /// pointers rather than corrupting the heap.
    pub fn try_free(&mut self, ptr: *mut u8) -> Result<(), FreeError> {
        if ptr.is_null() {
            return Ok(());
        }
        if !self.initialized {
            return Err(FreeError::AllocationNotFound);
        }
        let payload_offset = self
            .arena
            .offset_of(ptr)
            .ok_or(FreeError::AllocationNotFound)?;
        let nd = block::locate(&self.arena, payload_offset);
        if !self.arena.in_bounds(nd.header()) {
            return Err(FreeError::AllocationNotFound);
        }
        let header = block::header(&self.arena, nd);
        if !header.alloc {
            return Err(FreeError::DoubleFreeDetected);
        }

        let becomes_wilderness = topology::next_block(&self.arena, nd) == self.wilderness;

        block::write_free(&mut self.arena, nd, header.size, header.prev_alloc);
        let successor = topology::next_block(&self.arena, nd);
        block::set_prev_alloc(&mut self.arena, successor, false);

        let result = coalesce::coalesce(&mut self.arena, nd, self.wilderness);
        if becomes_wilderness {
            self.wilderness = result;
        } else {
            free_list::insert(&mut self.arena, result);
        }
        Ok(())
    }

    /// Infallible free for [`core::alloc::GlobalAlloc::dealloc`]'s
    /// contract, which has no way to report an error. Errors are swallowed
    /// rather than panicking, since a foreign/double-freed pointer here
    /// means caller UB we can't recover from productively; `debug_assert`
    /// surfaces it in debug builds.
    pub fn free(&mut self, ptr: *mut u8) {
        let result = self.try_free(ptr);
        debug_assert!(result.is_ok(), "free() of an invalid pointer");
    }

    /// Reallocate the block at `ptr` to hold `size` bytes, copying the
    /// lesser of the old and new payload capacities. Always performs a
    /// fresh allocation, copy, and free (section 9, open question 2): no
    /// in-place growth is attempted.
    pub fn reallocate(&mut self, ptr: *mut u8, size: usize) -> Option<*mut u8> {
        if size == 0 {
            self.free(ptr);
            return None;
        }
        if ptr.is_null() {
            return self.allocate(size);
        }

        let old_offset = self.arena.offset_of(ptr)?;
        let nd = block::locate(&self.arena, old_offset);
        let header = block::header(&self.arena, nd);
        let old_capacity = block::payload_capacity(header.size, header.large);

        let new_ptr = self.allocate(size)?;
        let new_offset = self.arena.offset_of(new_ptr)?;
        let copy_len = (size as u32).min(old_capacity) as usize;
        self.arena.copy(old_offset, new_offset, copy_len);
        self.free(ptr);
        Some(new_ptr)
    }

    /// Allocate space for `count` elements of `size` bytes each, zeroed.
    pub fn zeroed_allocate(&mut self, count: usize, size: usize) -> Option<*mut u8> {
        let total = count.checked_mul(size)?;
        let ptr = self.allocate(total)?;
        let offset = self.arena.offset_of(ptr)?;
        self.arena.zero(offset, total);
        Some(ptr)
    }

    /// Run the consistency checker (section 4.7) over the current heap.
    pub fn check(&self, verbose: bool) -> bool {
        if !self.initialized {
            return true;
        }
        check::check(&self.arena, &self.topology, self.wilderness, verbose)
    }

    /// Bytes of the arena committed so far (the current break).
    pub fn used(&self) -> usize {
        self.arena.high() as usize
    }

    /// The arena's total capacity, i.e. `N`.
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_round_trips() {
        let mut allocator = RawAllocator::<4096>::new();
        let ptr = allocator.allocate(64).unwrap();
        assert!(!ptr.is_null());
        assert!(allocator.check(false));
        allocator.try_free(ptr).unwrap();
        assert!(allocator.check(false));
    }

    #[test]
    fn double_free_is_detected() {
        let mut allocator = RawAllocator::<4096>::new();
        let ptr = allocator.allocate(32).unwrap();
        allocator.try_free(ptr).unwrap();
        assert_eq!(
            allocator.try_free(ptr),
            Err(FreeError::DoubleFreeDetected)
        );
    }

    #[test]
    fn foreign_pointer_is_rejected() {
        let mut allocator = RawAllocator::<4096>::new();
        allocator.allocate(16).unwrap();
        let mut x = 0_u8;
        assert_eq!(
            allocator.try_free(core::ptr::addr_of_mut!(x)),
            Err(FreeError::AllocationNotFound)
        );
    }

    #[test]
    fn zero_size_allocation_returns_none() {
        let mut allocator = RawAllocator::<4096>::new();
        assert!(allocator.allocate(0).is_none());
    }

    #[test]
    fn reallocate_grows_and_preserves_contents() {
        let mut allocator = RawAllocator::<4096>::new();
        let ptr = allocator.allocate(16).unwrap();
        unsafe {
            core::ptr::write_bytes(ptr, 0xAB, 16);
        }
        let grown = allocator.reallocate(ptr, 128).unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(grown, 16) };
        assert!(bytes.iter().all(|&b| b == 0xAB));
        assert!(allocator.check(false));
    }

    #[test]
    fn reallocate_to_zero_frees_and_returns_null() {
        let mut allocator = RawAllocator::<4096>::new();
        let ptr = allocator.allocate(16).unwrap();
        assert!(allocator.reallocate(ptr, 0).is_none());
        assert!(allocator.check(false));
    }

    #[test]
    fn zeroed_allocate_clears_memory() {
        let mut allocator = RawAllocator::<4096>::new();
        let ptr = allocator.zeroed_allocate(4, 8).unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(ptr, 32) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn repeated_allocations_eventually_grow_the_heap() {
        let mut allocator = RawAllocator::<8192>::new();
        let mut ptrs = [core::ptr::null_mut(); 64];
        for slot in ptrs.iter_mut() {
            *slot = allocator.allocate(48).unwrap();
        }
        assert!(allocator.check(false));
        for ptr in ptrs {
            allocator.try_free(ptr).unwrap();
        }
        assert!(allocator.check(false));
    }

    // The six end-to-end scenarios from section 8 that need precise
    // block-topology assertions drive `RawAllocator` directly; the ones
    // only needing observable behavior are also covered at the public
    // `Allocator<N>` surface in `tests/scenarios.rs`.

    #[test]
    fn scenario_alloc_free_pair_restores_topology() {
        let mut allocator = RawAllocator::<4096>::new();
        allocator.ensure_init().unwrap();
        let before = allocator.wilderness;
        let before_size = block::header(&allocator.arena, before).size;

        let p = allocator.allocate(40).unwrap();
        allocator.try_free(p).unwrap();

        assert_eq!(allocator.wilderness, before);
        assert_eq!(block::header(&allocator.arena, before).size, before_size);
        assert!(allocator.check(false));
    }

    #[test]
    fn scenario_fragmentation_then_coalescing_leaves_one_free_block() {
        let mut allocator = RawAllocator::<4096>::new();
        let a = allocator.allocate(40).unwrap();
        let b = allocator.allocate(40).unwrap();
        let c = allocator.allocate(40).unwrap();
        allocator.try_free(b).unwrap();
        allocator.try_free(a).unwrap();
        allocator.try_free(c).unwrap();

        for index in 0..block::SEGLISTS {
            assert_eq!(free_list::iter(&allocator.arena, index).count(), 0);
        }
        assert!(allocator.check(false));
    }

    #[test]
    fn scenario_best_fit_ties_break_lifo() {
        let mut allocator = RawAllocator::<4096>::new();
        let a = allocator.allocate(80).unwrap();
        let b = allocator.allocate(40).unwrap();
        let c = allocator.allocate(80).unwrap();
        // Pin the wilderness away from `c` so freeing `c` joins a seg-list
        // instead of forward-coalescing into the wilderness.
        let guard = allocator.allocate(16).unwrap();
        allocator.try_free(a).unwrap();
        allocator.try_free(c).unwrap();

        let before = allocator.arena.offset_of(c).unwrap();
        let d = allocator.allocate(40).unwrap();
        assert_eq!(allocator.arena.offset_of(d).unwrap(), before);
        let _ = (b, guard);
    }

    #[test]
    fn scenario_large_block_path() {
        let mut allocator = RawAllocator::<262144>::new();
        let p = allocator.allocate(100_000).unwrap();
        assert_eq!((p as usize) % 8, 0);

        let offset = allocator.arena.offset_of(p).unwrap();
        let nd = block::locate(&allocator.arena, offset);
        let header = block::header(&allocator.arena, nd);
        assert!(header.large);
        assert!(header.size >= 100_016);
    }

    #[test]
    fn scenario_wilderness_grows_monotonically() {
        let mut allocator = RawAllocator::<65536>::new();
        let mut last_high = 0;
        for _ in 0..8 {
            let p = allocator.allocate(block::CHUNKSIZE as usize).unwrap();
            assert!(allocator.used() >= last_high);
            last_high = allocator.used();
            let _ = p;
        }
        assert!(allocator.check(false));
    }
}
