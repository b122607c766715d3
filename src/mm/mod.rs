//! Memory management: the first-fit heap allocator. The raw backing memory
//! itself (a reserved array, or whatever the board's linker script carves
//! out) is the out-of-scope external collaborator named in spec.md §1;
//! what's implemented here is the RTOS's own allocator built on top of it.

pub mod heap;
