//! Eager coalescing of a newly-freed block with its free neighbors.
//!
//! Four cases based on `(prev_alloc, next_alloc)` of the block being freed,
//! exactly as spec.md section 4.4 lays out. The wilderness is never a
//! seg-list member, so every absorption checks identity against it before
//! calling [`free_list::remove`]. The returned node's `prev_alloc` is
//! always `PALLOC` in every case: by I3/I4 the block before `prev` must
//! already be allocated, or `prev` itself would have coalesced with it on
//! an earlier call.
use super::block::{self, Node};
use super::free_list;
use super::arena::Arena;
use super::topology;

/// Coalesce `nd` (already marked free) with any free neighbor(s).
///
/// `wilderness` identifies the current wilderness node so it's never
/// spliced out of a seg-list it was never in. Returns the resulting
/// block's node reference (may be `nd`, its predecessor, or unchanged,
/// depending on which case applied) along with whether the *next* block's
/// `prev_alloc` bit needs to be re-stamped by the caller (it always does,
/// to `PFREE`, since the result is always free) — the caller does that via
/// [`topology::next_block`] once it knows where the final block ended up.
pub fn coalesce<const N: usize>(arena: &mut Arena<N>, nd: Node, wilderness: Node) -> Node {
    let next = topology::next_block(arena, nd);
    let this = block::header(arena, nd);
    let next_alloc = block::header(arena, next).alloc;

    match (this.prev_alloc, next_alloc) {
        (true, true) => {
            // Case 1: nothing to merge; `nd`'s header/footer already say
            // FREE (the caller wrote that before calling coalesce).
            nd
        }
        (true, false) => {
            // Case 2: absorb `next`.
            let size = this.size + block::header(arena, next).size;
            if next != wilderness {
                free_list::remove(arena, next);
            }
            block::write_free(arena, nd, size, true);
            nd
        }
        (false, true) => {
            // Case 3: absorb `prev`.
            let prev = topology::prev_block(arena, nd);
            let prev_header = block::header(arena, prev);
            let size = prev_header.size + this.size;
            if prev != wilderness {
                free_list::remove(arena, prev);
            }
            block::write_free(arena, prev, size, prev_header.prev_alloc);
            prev
        }
        (false, false) => {
            // Case 4: absorb both.
            let prev = topology::prev_block(arena, nd);
            let prev_header = block::header(arena, prev);
            let next_header = block::header(arena, next);
            let size = prev_header.size + this.size + next_header.size;
            if prev != wilderness {
                free_list::remove(arena, prev);
            }
            if next != wilderness {
                free_list::remove(arena, next);
            }
            block::write_free(arena, prev, size, prev_header.prev_alloc);
            prev
        }
    }
}
