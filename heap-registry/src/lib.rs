//! Heaps that keep track of the objects allocated from them.
//!
//! A heap owns a range of addresses and a list of the objects that
//! currently belong to it. Destroying a heap destroys every object
//! that still belongs to it, in the order the objects joined the heap.
//! Objects that are destroyed earlier leave the heap on their own.
//!
//! # Components
//!
//!  - [`Region`] is the range of addresses owned by a heap.
//!  - [`Heap`] is a region with a name and a list of children.
//!    Every live heap is registered in a per-thread registry,
//!    which answers which heap contains a given address.
//!  - [`Disposer`] is the link between an object and its heap.
//!    Every heap object embeds one.
//!  - [`HeapObject`] is a disposer followed by a value.
//!    It is either boxed by [`Heap::create`], which returns an [`Owned`]
//!    handle, or placed into memory provided by an allocation strategy.
//!  - [`Leaked`] is a shared handle to an object left to its heap.
//!    It can tell whether the heap has already destroyed the object.
//!
//! ## Notes
//!
//!  1. A heap points to its children and a child points to its heap.
//!     Neither may move while the other points to it.
//!  2. An object joins its heap before its value is constructed,
//!     so objects created while constructing it are destroyed after it.
//!  3. Heaps are destroyed when [`Heap::with`] returns,
//!     so nested heaps are destroyed before the heaps around them.
//!  4. During teardown, a heap drops the values of all its objects before
//!     it frees the memory of any of them.

#![warn(missing_docs)]

pub use self::{disposer::*, heap::*, object::*, region::*};

mod disposer;
mod heap;
mod object;
mod region;
