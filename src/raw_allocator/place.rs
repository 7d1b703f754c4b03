//! The placement engine: best-fit search within a bin, splitting on
//! placement, and wilderness-backed heap growth.
use super::arena::{Arena, OutOfMemory};
use super::block::{self, Node, CHUNKSIZE, MINSIZE, SEGLISTS};
use super::coalesce;
use super::free_list;
use super::topology::{self, Topology};

/// Skip bins `>= LARGE_BIN_LOCKOUT_FROM` when the request itself maps to a
/// bin `<= LARGE_BIN_LOCKOUT_UPTO`. Disabled by default (spec.md section 9,
/// open question 3): the source carried this behind a dead branch and
/// measurements were supposed to decide whether it helps; absent those
/// measurements this stays off.
const LARGE_BIN_LOCKOUT: bool = false;
const LARGE_BIN_LOCKOUT_FROM: usize = 13;
const LARGE_BIN_LOCKOUT_UPTO: usize = 5;

/// Search the segregated lists (and, as a fallback, the wilderness) for a
/// free block able to hold `asize` bytes.
///
/// Bins below 5 are exact-size bins, so the first (and only) candidate
/// size is automatically optimal — no need to scan for a smaller
/// remainder. Bins 5 and up get a genuine best-fit scan of the whole bin.
pub fn find_fit<const N: usize>(arena: &Arena<N>, wilderness: Node, asize: u32) -> Option<Node> {
    let start = free_list::bin(asize);
    for i in start..SEGLISTS {
        if LARGE_BIN_LOCKOUT && i >= LARGE_BIN_LOCKOUT_FROM && start <= LARGE_BIN_LOCKOUT_UPTO {
            break;
        }
        if i <= 4 {
            // exact-size bin: first entry (if any) is the only candidate
            if let Some(nd) = free_list::iter(arena, i).next() {
                return Some(nd);
            }
            continue;
        }
        let mut best: Option<(Node, u32)> = None;
        for nd in free_list::iter(arena, i) {
            let size = block::header(arena, nd).size;
            if size < asize {
                continue;
            }
            let slack = size - asize;
            if best.map_or(true, |(_, best_slack)| slack < best_slack) {
                best = Some((nd, slack));
            }
        }
        if let Some((nd, _)) = best {
            return Some(nd);
        }
    }

    // The wilderness must always retain at least MINSIZE bytes after the
    // split, so it keeps existing (I5); `place` relies on this never
    // consuming the wilderness whole.
    let wilderness_size = block::header(arena, wilderness).size;
    if wilderness_size >= asize + MINSIZE {
        return Some(wilderness);
    }
    None
}

/// Outcome of [`place`]: whether the wilderness was consumed, and if so,
/// its replacement (or `None` if the wilderness was allocated whole and a
/// future `extend_heap` must mint a fresh one before the next allocation).
pub struct Placed {
    pub new_wilderness: Option<Node>,
}

/// Place an allocation of `asize` bytes at `bp`, splitting off a free
/// remainder when there's room for one.
///
/// Preserves `bp`'s existing `prev_alloc` on the allocated fragment (open
/// question 1 in spec.md section 9); stamps `PALLOC` on any split-off free
/// remainder and propagates `PFREE` to the remainder's successor.
pub fn place<const N: usize>(
    arena: &mut Arena<N>,
    wilderness: Node,
    bp: Node,
    asize: u32,
) -> Placed {
    let was_wilderness = bp == wilderness;
    let header = block::header(arena, bp);
    let csize = header.size;
    let prev_alloc = header.prev_alloc;

    if csize - asize >= MINSIZE {
        block::write_alloc(arena, bp, asize, prev_alloc);

        let remainder = Node(bp.0 + asize);
        let remainder_size = csize - asize;
        block::write_free(arena, remainder, remainder_size, true);
        let successor = topology::next_block(arena, remainder);
        block::set_prev_alloc(arena, successor, false);

        if was_wilderness {
            Placed {
                new_wilderness: Some(remainder),
            }
        } else {
            free_list::insert(arena, remainder);
            Placed {
                new_wilderness: None,
            }
        }
    } else {
        debug_assert!(!was_wilderness, "the wilderness must always split");
        block::write_alloc(arena, bp, csize, prev_alloc);
        let successor = topology::next_block(arena, bp);
        block::set_prev_alloc(arena, successor, true);
        Placed {
            new_wilderness: None,
        }
    }
}

/// Grow the heap by at least `n_words` words (rounded to a double-word
/// multiple by [`topology::extend`]), coalescing the new block with the
/// old final block if it was free. The result is always the new
/// wilderness; it is never inserted into a seg-list.
pub fn extend_heap<const N: usize>(
    arena: &mut Arena<N>,
    topology: &mut Topology,
    wilderness: Node,
    n_words: u32,
) -> Result<Node, OutOfMemory> {
    let n_bytes = n_words.saturating_mul(block::WSIZE);
    let new_block = topology::extend(arena, topology, n_bytes.max(CHUNKSIZE))?;
    Ok(coalesce::coalesce(arena, new_block, wilderness))
}
