//! First-fit free-list heap allocator with overflow to an alternate heap.
//!
//! Grounded in `OS_HeapCreate`/`OS_HeapMalloc`/`OS_HeapFree`/
//! `OS_HeapAlternate`/`OS_HeapRegister` from
//! `original_source/trunk/kernel/rtos.c` for the allocator's external
//! behavior, and in the teacher's own `mm/hole.rs` sorted-hole-list for the
//! free-list mechanics (itself a from-scratch first-fit allocator, not a
//! wrapped crate). The original C stashes the owning heap's raw pointer in
//! each block's header; here that becomes a small index into a
//! process-wide heap table (`config::HEAP_COUNT` slots) since an index
//! survives being copied around far more safely than a raw pointer would.

use core::alloc::{GlobalAlloc, Layout};
use core::mem::size_of;
use core::ptr::NonNull;

use hermit_sync::InterruptTicketMutex;

use crate::align_up;
use crate::config::{HEAP_BLOCK_MAGIC, HEAP_COUNT};
use crate::sync::semaphore::Semaphore;

/// A free block. Lives inside the free memory it describes, forming an
/// address-ordered singly linked list (`mm::hole::HoleList`'s approach).
struct Hole {
    size: usize,
    next: Option<&'static mut Hole>,
}

struct HoleInfo {
    addr: usize,
    size: usize,
}

struct HoleList {
    first: Hole,
}

impl HoleList {
    const fn empty() -> Self {
        Self { first: Hole { size: 0, next: None } }
    }

    const fn min_size() -> usize {
        size_of::<usize>() * 2
    }

    unsafe fn new(addr: usize, size: usize) -> Self {
        let hole_ptr = addr as *mut Hole;
        unsafe { hole_ptr.write(Hole { size, next: None }) };
        Self { first: Hole { size: 0, next: Some(unsafe { &mut *hole_ptr }) } }
    }

    fn allocate_first_fit(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let required_size = layout.size().max(Self::min_size());
        let required_align = layout.align();

        let allocation = find_and_remove_fit(&mut self.first, required_size, required_align)?;
        if let Some(front) = allocation.front_padding {
            deallocate_raw(&mut self.first, front.addr, front.size);
        }
        if let Some(back) = allocation.back_padding {
            deallocate_raw(&mut self.first, back.addr, back.size);
        }
        NonNull::new(allocation.addr as *mut u8)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        let size = layout.size().max(Self::min_size());
        deallocate_raw(&mut self.first, ptr.as_ptr() as usize, size);
    }
}

struct Allocation {
    addr: usize,
    front_padding: Option<HoleInfo>,
    back_padding: Option<HoleInfo>,
}

/// Walks the list looking for the first hole `split_hole` accepts, unlinks
/// it, and returns the split result. Computing `info` as a plain `Copy`
/// struct before touching `previous.next` again is what lets this satisfy
/// the borrow checker without unsafe: the borrow backing `info` ends at
/// the match, so the following `take()`/advance each start a fresh one.
fn find_and_remove_fit(
    mut previous: &mut Hole,
    required_size: usize,
    required_align: usize,
) -> Option<Allocation> {
    loop {
        let info = match previous.next {
            Some(ref hole) => HoleInfo { addr: &**hole as *const Hole as usize, size: hole.size },
            None => return None,
        };

        if let Some(allocation) = split_hole(&info, required_size, required_align) {
            let mut removed = previous.next.take().unwrap();
            previous.next = removed.next.take();
            return Some(allocation);
        }

        previous = previous.next.as_mut().unwrap();
    }
}

fn split_hole(hole: &HoleInfo, required_size: usize, required_align: usize) -> Option<Allocation> {
    let (aligned_addr, front_padding) = if hole.addr == align_up!(hole.addr, required_align) {
        (hole.addr, None)
    } else {
        let aligned_addr = align_up!(hole.addr + HoleList::min_size(), required_align);
        (aligned_addr, Some(HoleInfo { addr: hole.addr, size: aligned_addr - hole.addr }))
    };

    let aligned_hole_size = hole.size.checked_sub(aligned_addr - hole.addr)?;
    if aligned_hole_size < required_size {
        return None;
    }

    let back_size = aligned_hole_size - required_size;
    let back_padding = if back_size == 0 {
        None
    } else if back_size < HoleList::min_size() {
        return None;
    } else {
        Some(HoleInfo { addr: aligned_addr + required_size, size: back_size })
    };

    Some(Allocation { addr: aligned_addr, front_padding, back_padding })
}

/// Inserts a hole of `size` bytes at `addr`, keeping the list sorted by
/// address. Adjacent free blocks are not coalesced: the original RTOS
/// didn't coalesce either (`OS_HeapFree` just relinks the block), and
/// skipping it keeps the intrusive ownership bookkeeping here tractable.
fn deallocate_raw(mut previous: &mut Hole, addr: usize, size: usize) {
    loop {
        let advance = match previous.next {
            Some(ref next) => (&**next as *const Hole as usize) <= addr,
            None => false,
        };
        if !advance {
            break;
        }
        previous = previous.next.as_mut().unwrap();
    }

    let next = previous.next.take();
    let new_hole = addr as *mut Hole;
    unsafe {
        new_hole.write(Hole { size, next });
    }
    previous.next = Some(unsafe { &mut *new_hole });
}

/// Header stashed immediately before every block this allocator hands out.
#[repr(C)]
struct BlockHeader {
    magic: u32,
    heap_index: u8,
}

struct HeapSlot {
    list: HoleList,
    /// Guards concurrent access the way the original's per-heap semaphore
    /// does (spec.md §2: "first-fit free-list allocator protected by one
    /// semaphore").
    guard: Semaphore,
    alternate: Option<u8>,
    in_use: bool,
}

impl HeapSlot {
    const fn empty() -> Self {
        Self { list: HoleList::empty(), guard: Semaphore::new(1), alternate: None, in_use: false }
    }
}

/// Owns up to [`HEAP_COUNT`] independently-locked heaps, mirroring
/// `OS_HeapRegister`'s fixed-size heap table.
pub struct Heap {
    slots: InterruptTicketMutex<[HeapSlot; HEAP_COUNT]>,
}

impl Heap {
    pub const fn new() -> Self {
        const EMPTY: HeapSlot = HeapSlot::empty();
        Self { slots: InterruptTicketMutex::new([EMPTY; HEAP_COUNT]) }
    }

    /// Registers a new heap backed by `memory`. Returns its index, used as
    /// the handle passed to [`Heap::allocate`]/[`Heap::set_alternate`].
    ///
    /// # Safety
    /// `memory` must be valid for the lifetime of this `Heap` and not
    /// aliased by any other heap or allocator.
    pub unsafe fn register(&self, memory: &'static mut [u8]) -> u8 {
        let mut slots = self.slots.lock();
        let index = slots
            .iter()
            .position(|s| !s.in_use)
            .expect("exceeded config::HEAP_COUNT registered heaps");
        slots[index].list = unsafe { HoleList::new(memory.as_mut_ptr() as usize, memory.len()) };
        slots[index].in_use = true;
        index as u8
    }

    /// Chains `overflow` as the heap to try when `primary` runs out of
    /// space, matching `OS_HeapAlternate`.
    pub fn set_alternate(&self, primary: u8, overflow: u8) {
        self.slots.lock()[primary as usize].alternate = Some(overflow);
    }

    fn alloc_from(slots: &mut [HeapSlot; HEAP_COUNT], index: u8, layout: Layout) -> Option<NonNull<u8>> {
        let header_layout = Layout::new::<BlockHeader>();
        let (full_layout, offset) = header_layout.extend(layout).ok()?;
        let ptr = slots[index as usize].list.allocate_first_fit(full_layout)?;
        unsafe {
            let header = ptr.as_ptr() as *mut BlockHeader;
            header.write(BlockHeader { magic: HEAP_BLOCK_MAGIC, heap_index: index });
            NonNull::new(ptr.as_ptr().add(offset))
        }
    }

    /// Allocates `layout`, falling back through the alternate-heap chain on
    /// exhaustion (`OS_HeapMalloc`'s overflow behavior).
    pub fn allocate(&self, start: u8, layout: Layout) -> Option<NonNull<u8>> {
        let mut slots = self.slots.lock();
        let mut index = start;
        loop {
            slots[index as usize].guard.try_pend();
            let result = Self::alloc_from(&mut slots, index, layout);
            if result.is_some() {
                return result;
            }
            match slots[index as usize].alternate {
                Some(next) => index = next,
                None => return None,
            }
        }
    }

    /// Frees a block previously returned by [`Heap::allocate`].
    ///
    /// # Safety
    /// `ptr` must have been returned by this `Heap` with the same `layout`.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let header_layout = Layout::new::<BlockHeader>();
        let (full_layout, offset) = header_layout.extend(layout).unwrap();
        let block_start = unsafe { ptr.as_ptr().sub(offset) };
        let header = unsafe { &*(block_start as *const BlockHeader) };
        crate::kernel_assert_eq!(header.magic, HEAP_BLOCK_MAGIC);
        let heap_index = header.heap_index;

        let mut slots = self.slots.lock();
        unsafe {
            slots[heap_index as usize]
                .list
                .deallocate(NonNull::new_unchecked(block_start), full_layout);
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps [`Heap`] as the process's `#[global_allocator]`, always starting
/// the search at heap 0 (the primary heap registered by `Kernel::new`).
pub struct LockedHeapAllocator {
    heap: Heap,
}

impl LockedHeapAllocator {
    pub const fn new() -> Self {
        Self { heap: Heap::new() }
    }

    pub fn inner(&self) -> &Heap {
        &self.heap
    }
}

unsafe impl GlobalAlloc for LockedHeapAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.heap.allocate(0, layout).map_or(core::ptr::null_mut(), |p| p.as_ptr())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            unsafe { self.heap.deallocate(ptr, layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaked(size: usize) -> &'static mut [u8] {
        alloc::vec![0u8; size].leak()
    }

    #[test]
    fn allocate_and_free_round_trips() {
        let heap = Heap::new();
        let index = unsafe { heap.register(leaked(4096)) };
        let layout = Layout::from_size_align(64, 8).unwrap();
        let ptr = heap.allocate(index, layout).unwrap();
        unsafe { heap.deallocate(ptr, layout) };
    }

    #[test]
    fn overflows_to_alternate_heap_when_primary_is_full() {
        let heap = Heap::new();
        let primary = unsafe { heap.register(leaked(64)) };
        let overflow = unsafe { heap.register(leaked(4096)) };
        heap.set_alternate(primary, overflow);

        let layout = Layout::from_size_align(256, 8).unwrap();
        let ptr = heap.allocate(primary, layout);
        assert!(ptr.is_some());
    }
}
