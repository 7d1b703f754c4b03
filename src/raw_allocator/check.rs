//! The consistency checker: a full sweep validating I1-I8 plus the
//! cross-check between the heap sweep's free-block count and the
//! segregated lists' total length.
//!
//! This is a debug-only gate, meant to run around every public entry point
//! while developing or fuzzing the allocator (spec.md section 2: "used as
//! a debug gate around each public entry"); it walks the entire heap, so
//! it is never run in release builds. Corruption found here is
//! unconditionally fatal (spec.md section 7): there is no recovery path,
//! since every subsequent pointer becomes suspect.
use super::arena::Arena;
use super::block::{self, Node, HSIZE, MINSIZE, SEGLISTS};
use super::free_list;
use super::topology::Topology;

/// Run a full consistency sweep. Returns `true` if the heap is consistent.
///
/// When `verbose` is set, every block visited is reported through
/// [`report`] (a no-op unless the `std`-only test harness captures it;
/// kept as a parameter rather than a global so the checker has no hidden
/// side channel).
pub fn check<const N: usize>(
    arena: &Arena<N>,
    topology: &Topology,
    wilderness: Node,
    verbose: bool,
) -> bool {
    let prologue = block::header(arena, topology.prologue);
    if prologue.size != 0 || !prologue.alloc {
        return false;
    }

    // The prologue is a zero-size sentinel (I8), so `next_block`'s generic
    // `nd + size` formula can't step over it; go straight to the first real
    // block, immediately past the prologue's own header word.
    let mut bp = Node(topology.prologue.0 + HSIZE);
    let mut previous_was_free = false;
    let mut free_block_count: u32 = 0;

    loop {
        let h = block::header(arena, bp);
        if verbose {
            report(bp, &h);
        }
        if h.size == 0 {
            // reached the epilogue
            if bp != topology.epilogue {
                return false;
            }
            if !h.alloc {
                return false;
            }
            break;
        }
        if h.size < MINSIZE || h.size % block::DSIZE != 0 {
            return false;
        }
        if !arena.in_bounds(bp.0) {
            return false;
        }
        if bp.0 % 2 != 0 {
            return false; // 8-byte alignment of the user payload implies
                           // an even node offset; odd offsets can't happen
                           // from any valid split, so this is a cheap tripwire
        }

        let has_footer = !h.alloc || h.large;
        if has_footer {
            let f = block::footer(arena, bp, h.size);
            if f != h {
                return false;
            }
        }

        if !h.alloc {
            if previous_was_free {
                return false; // I3: no two adjacent free blocks
            }
            free_block_count += 1;
        }
        previous_was_free = !h.alloc;

        bp = super::topology::next_block(arena, bp);
    }

    if super::topology::prev_block(arena, bp) != wilderness {
        return false;
    }

    let mut seg_list_count: u32 = 0;
    for index in 0..SEGLISTS {
        for nd in free_list::iter(arena, index) {
            seg_list_count += 1;
            let h = block::header(arena, nd);
            if h.alloc || h.size < MINSIZE {
                return false;
            }
            if free_list::bin(h.size) != index {
                return false;
            }
            let f = block::footer(arena, nd, h.size);
            if f != h {
                return false;
            }
        }
    }

    // I6: every free block except the wilderness is reachable from
    // exactly one list; the wilderness itself is free but list-less.
    free_block_count == seg_list_count + 1
}

fn report(bp: Node, header: &block::Header) {
    #[cfg(feature = "std")]
    std::println!(
        "checking node {}: size {}, alloc {}, large {}",
        bp.0,
        header.size,
        header.alloc,
        header.large
    );
    #[cfg(not(feature = "std"))]
    let _ = (bp, header);
}
