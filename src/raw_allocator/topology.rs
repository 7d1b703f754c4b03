//! Fixed initial heap layout and boundary-tag neighbor navigation.
//!
//! The heap, from low to high, is laid out as:
//!
//! ```text
//! [ 16 x 4B seg-list roots ][ 2B pad ][ prologue (size 0) ][ payload region ][ wilderness ][ epilogue (size 0) ]
//! ```
//!
//! The prologue and epilogue are zero-size allocated sentinels (I8) that let
//! every other piece of code navigate blocks without special-casing the
//! ends of the heap.
use super::block::{self, Node, DSIZE, HSIZE, MINSIZE, SEGLISTS, WSIZE};
use super::arena::{Arena, OutOfMemory};

/// Byte offset, from the arena's start, of the Nth seg-list root slot.
pub fn root_slot(index: usize) -> u32 {
    (index as u32) * WSIZE
}

/// Byte offset right after the seg-list root table.
const ROOTS_END: u32 = SEGLISTS as u32 * WSIZE;

/// Fixed heap layout produced by [`initialize`].
#[derive(Debug, Clone, Copy)]
pub struct Topology {
    /// Node reference of the prologue (zero-size, allocated).
    pub prologue: Node,
    /// Node reference of the epilogue (zero-size, allocated), updated every
    /// time the heap grows.
    pub epilogue: Node,
}

/// Lay out the seg-list root table, prologue, and an initial epilogue, then
/// grow the heap by one `CHUNKSIZE` block to create the first wilderness.
///
/// Returns the topology plus the node reference of that first wilderness
/// block.
pub fn initialize<const N: usize>(arena: &mut Arena<N>) -> Result<(Topology, Node), OutOfMemory> {
    // roots + 2-byte pad + prologue header + epilogue header
    arena.extend((ROOTS_END + 3 * HSIZE) as usize)?;
    for i in 0..SEGLISTS {
        arena.write_u32(root_slot(i), 0);
    }
    // 2 bytes of alignment padding, then the prologue's node sits right
    // after it so the prologue's own 2-byte header lines up on the pad.
    let prologue = Node(ROOTS_END + 2 * HSIZE);
    block::write_header(arena, prologue, 0, true, false);
    let epilogue = Node(prologue.0 + HSIZE);
    block::write_header(arena, epilogue, 0, true, true);

    let mut topology = Topology { prologue, epilogue };
    let wilderness = extend(arena, &mut topology, block::CHUNKSIZE)?;
    Ok((topology, wilderness))
}

/// Grow the heap by `n_bytes` (rounded up to a double-word multiple),
/// overlaying a new free block and a fresh epilogue.
///
/// This only performs the raw layout change; it does not coalesce the new
/// block with whatever was the final block before — that policy lives in
/// [`super::place::extend_heap`], which calls this and then coalesces.
/// Returns the node reference of the new free block.
pub fn extend<const N: usize>(
    arena: &mut Arena<N>,
    topology: &mut Topology,
    n_bytes: u32,
) -> Result<Node, OutOfMemory> {
    let size = if n_bytes % DSIZE != 0 {
        n_bytes + (DSIZE - n_bytes % DSIZE)
    } else {
        n_bytes
    };
    let size = size.max(MINSIZE);

    let old_epilogue = topology.epilogue;
    let prev_alloc = block::header(arena, old_epilogue).prev_alloc;

    // commit `size` bytes for the new block plus HSIZE for the epilogue
    // header that follows it.
    let new_block_header_offset = arena.extend((size + HSIZE) as usize)?;
    let nd = Node(new_block_header_offset + HSIZE);
    block::write_free(arena, nd, size, prev_alloc);

    let new_epilogue = next_block(arena, nd);
    block::write_header(arena, new_epilogue, 0, true, false);
    topology.epilogue = new_epilogue;

    Ok(nd)
}

/// The node reference of the block physically following `nd`.
pub fn next_block<const N: usize>(arena: &Arena<N>, nd: Node) -> Node {
    let size = block::header(arena, nd).size;
    Node(nd.0 + size)
}

/// The node reference of the block physically preceding `nd`.
///
/// Only valid when the predecessor is free (its footer exists) or is the
/// zero-size prologue.
pub fn prev_block<const N: usize>(arena: &Arena<N>, nd: Node) -> Node {
    // the footer's compact word sits right before this block's header
    let prev_footer_compact = nd.header() - HSIZE;
    // SAFETY: caller guarantees the predecessor is free or the prologue,
    // both of which keep this word populated.
    let raw = unsafe { arena.read_u16(prev_footer_compact) };
    let size = if raw & 0b100 != 0 {
        unsafe { arena.read_u32(prev_footer_compact - WSIZE) }
    } else {
        (raw & !0b111u16) as u32
    };
    Node(nd.0 - size)
}
