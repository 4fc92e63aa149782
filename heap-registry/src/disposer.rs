use {
    super::{Heap, heap::ErasedHeap},
    intrusive_list::{Link, Linked},
    std::{cell::Cell, fmt, marker::PhantomPinned, ptr::NonNull},
};

/// Destroys the object that embeds a disposer.
pub (super) type Teardown = unsafe fn(NonNull<Disposer>);

/// Frees the memory of a destroyed object that embeds a disposer.
pub (super) type Release = unsafe fn(NonNull<Disposer>);

/// Membership of a heap's children.
///
/// Every heap object embeds a disposer as its first member.
/// While the object is alive, its disposer is linked into the children
/// of exactly one heap, or of none if no heap owns the object.
/// The disposer is unlinked when the object is destroyed,
/// whether that happens explicitly or during the heap's teardown.
///
/// A disposer does not free any resources itself.
/// It only records how to destroy the object that embeds it,
/// so that the heap can do so when it is destroyed first.
pub struct Disposer
{
    /// The heap whose children include this disposer, if any.
    ///
    /// The heap does not belong to the disposer.
    heap: Cell<Option<ErasedHeap>>,

    /// Membership of the heap's children, or of its released objects.
    link: Link<Disposer>,

    /// Destroys the object that embeds this disposer.
    teardown: Teardown,

    /// Frees the object once the heap's teardown is done with it.
    release: Release,

    /// Heaps point to their children.
    _pinned: PhantomPinned,
}

impl Disposer
{
    /// Create a disposer that belongs to no heap.
    pub (super) const fn new(teardown: Teardown, release: Release) -> Self
    {
        Self{
            heap: Cell::new(None),
            link: Link::new(),
            teardown,
            release,
            _pinned: PhantomPinned,
        }
    }

    /// Whether the disposer is linked into a heap's children.
    pub fn is_attached(&self) -> bool
    {
        self.heap.get().is_some()
    }

    /// Whether the disposer is linked into the children of the given heap.
    pub fn belongs_to(&self, heap: &Heap) -> bool
    {
        self.heap.get() == Some(heap.erase())
    }

    /// The heap whose children include this disposer, if any.
    pub (super) fn heap(&self) -> Option<ErasedHeap>
    {
        self.heap.get()
    }

    /// Link the disposer into a heap's children.
    ///
    /// # Safety
    ///
    /// The disposer must not be attached,
    /// and must neither move nor be freed until it is detached.
    pub (super) unsafe fn attach(this: NonNull<Self>, heap: &Heap)
    {
        let disposer = this.as_ref();
        debug_assert!(!disposer.is_attached(), "Disposer is already attached");
        disposer.heap.set(Some(heap.erase()));
        // SAFETY: Called from Disposer::attach.
        heap.append_disposer(this);
    }

    /// Unlink the disposer from its heap's children, if any.
    pub (super) fn detach(&self)
    {
        if let Some(heap) = self.heap.take() {
            // SAFETY: Attached disposers are detached before
            //         their heap finishes its teardown.
            let heap = unsafe { heap.as_ref() };
            // SAFETY: Called from Disposer::detach.
            unsafe { heap.remove_disposer(NonNull::from(self)); }
        }
    }

    /// Destroy the object that embeds the disposer.
    ///
    /// # Safety
    ///
    /// The disposer must be embedded in a live object.
    pub (super) unsafe fn dispose(this: NonNull<Self>)
    {
        let teardown = this.as_ref().teardown;
        teardown(this);
    }

    /// Free the memory of the object that embeds the disposer.
    ///
    /// # Safety
    ///
    /// The object must have been destroyed by [`dispose`][`Self::dispose`],
    /// and nothing may use it afterwards.
    pub (super) unsafe fn release(this: NonNull<Self>)
    {
        let release = this.as_ref().release;
        release(this);
    }
}

impl Drop for Disposer
{
    fn drop(&mut self)
    {
        self.detach();
    }
}

// SAFETY: The link is only used by the heap's children.
unsafe impl Linked for Disposer
{
    fn link(&self) -> &Link<Self>
    {
        &self.link
    }
}

impl fmt::Debug for Disposer
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("Disposer")
            .field("heap", &self.heap.get())
            .field("link", &self.link)
            .finish()
    }
}
