use {
    super::{Disposer, Region},
    intrusive_list::{Link, Linked, List},
    log::debug,
    scope_exit::{ScopeExit, scope_exit},
    std::{
        cell::Cell,
        fmt,
        marker::{PhantomData, PhantomPinned},
        ptr::NonNull,
    },
    thiserror::Error,
};

/// Ensure that `'h` is an invariant lifetime.
pub (super) type HeapId<'h> = PhantomData<fn(&'h ()) -> &'h ()>;

/// Pointer to a heap whose `'h` parameter is not known.
///
/// Heaps have the same layout for every `'h`,
/// so methods that do not involve `'h` may be called through this.
pub (super) type ErasedHeap = NonNull<Heap<'static>>;

thread_local! {
    /// Every live heap on this thread, oldest first.
    ///
    /// Heaps cannot be sent to other threads,
    /// so a per-thread registry sees every heap that code on the thread can.
    static LIVE_HEAPS: List<Heap<'static>> = List::new();
}

/// Memory region that keeps track of the objects allocated from it.
///
/// Every object allocated from the heap embeds a [`Disposer`],
/// which is linked into the heap's children for as long as the object lives.
/// When the heap is destroyed, it destroys each remaining object
/// in the order the objects were registered.
///
/// The `'h` parameter identifies the heap at the type level.
/// Objects created by the heap may borrow anything that outlives `'h`,
/// and handles to them cannot escape the heap's lifetime.
pub struct Heap<'h>
{
    /// Uniquely identifies this heap.
    _heap_id: HeapId<'h>,

    /// Disposers and the registry point to the heap.
    _pinned: PhantomPinned,

    name: String,

    region: Region,

    /// Membership of the registry of live heaps.
    link: Link<Heap<'h>>,

    /// Disposers of the objects that currently belong to this heap.
    children: List<Disposer>,

    /// Disposers of objects whose values the teardown has dropped,
    /// but whose memory it has not yet freed.
    released: List<Disposer>,

    /// Number of traversals of the children in progress.
    traversals: Cell<usize>,
}

/// Returned when creating a heap whose region overlaps that of a live heap.
#[derive(Debug, Error)]
#[error("Region {region:?} overlaps the region of heap `{name}`")]
pub struct OverlapError
{
    /// The requested region.
    pub region: Region,

    /// The name of the live heap that already owns part of the region.
    pub name: String,
}

impl<'h> Heap<'h>
{
    /// Create a heap with a unique `'h` parameter.
    ///
    /// The heap is passed to the given function.
    /// When the function returns or panics, the heap is destroyed,
    /// which destroys every object that still belongs to it.
    ///
    /// Fails if the region overlaps the region of another live heap.
    pub fn with<F, R>(name: impl Into<String>, region: Region, f: F)
        -> Result<R, OverlapError>
        // NOTE: Using Self here would allow the caller to choose 'h.
        //       That could result in multiple heaps with the same 'h.
        // NOTE: The heap must be behind a reference.
        //       Disposers and the registry point to it.
        where F: for<'i> FnOnce(&'i Heap<'i>) -> R
    {
        let name = name.into();

        if let Some(other) = Self::find_overlapping(region) {
            return Err(OverlapError{region, name: other});
        }

        let heap = Heap{
            _heap_id: PhantomData,
            _pinned: PhantomPinned,
            name,
            region,
            link: Link::new(),
            children: List::new(),
            released: List::new(),
            traversals: Cell::new(0),
        };

        // SAFETY: The heap is not moved until it is destroyed below.
        LIVE_HEAPS.with(|heaps| unsafe { heaps.append(heap.erase()) });
        debug!("Created heap `{}` over {:?}", heap.name, heap.region);

        scope_exit! { heap.destroy(); }

        Ok(f(&heap))
    }

    /// Find the live heap whose region contains an address.
    ///
    /// The heap, or [`None`] if no live heap contains the address,
    /// is passed to the given function.
    /// Addresses of stack and static memory are usually in no heap.
    pub fn find_contain_heap<T, F, R>(address: *const T, f: F) -> R
        where F: for<'a, 'i> FnOnce(Option<&'a Heap<'i>>) -> R
    {
        let address = address as usize;

        let heap = LIVE_HEAPS.with(|heaps| {
            // SAFETY: Registered heaps are live.
            unsafe { heaps.iter() }
                .find(|heap| unsafe { heap.as_ref() }.region.contains(address))
        });

        // SAFETY: A heap is only registered while its Heap::with call
        //         is active, and that call encloses this one.
        f(heap.map(|heap| unsafe { heap.as_ref() }))
    }

    /// The name given to the heap on creation.
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// The addresses owned by the heap.
    pub fn region(&self) -> Region
    {
        self.region
    }

    /// Whether the heap's region contains an address.
    pub fn contains<T>(&self, address: *const T) -> bool
    {
        self.region.contains(address as usize)
    }

    /// The number of objects that belong to the heap.
    pub fn len(&self) -> usize
    {
        self.children.len()
    }

    /// Whether no objects belong to the heap.
    pub fn is_empty(&self) -> bool
    {
        self.children.is_empty()
    }

    /// Call a function on the disposer of each of the heap's objects,
    /// in registration order.
    ///
    /// Objects may be created during the walk, and are visited too.
    /// Destroying an object of this heap during the walk panics.
    /// The disposers cannot be retained past the call:
    ///
    /// ```compile_fail
    /// # use heap_registry::{Heap, Region};
    /// Heap::with("h", Region::new(0x1000, 0x1000).unwrap(), |heap| {
    ///     let object = heap.create(0);
    ///     let mut retained = None;
    ///     heap.for_each_disposer(|disposer| retained = Some(disposer));
    ///     drop(object);
    ///     println!("{:?}", retained);
    /// }).unwrap();
    /// ```
    pub fn for_each_disposer<F>(&self, mut f: F)
        where F: FnMut(&Disposer)
    {
        self.traversals.set(self.traversals.get() + 1);
        scope_exit! { self.traversals.set(self.traversals.get() - 1); }

        // SAFETY: Children are live, and removal is prohibited
        //         until the traversal ends.
        for disposer in unsafe { self.children.iter() } {
            // SAFETY: Same as above.
            f(unsafe { disposer.as_ref() });
        }
    }

    /// Add a disposer to the heap's children.
    ///
    /// # Safety
    ///
    /// Must only be called by [`Disposer::attach`].
    pub (super) unsafe fn append_disposer(&self, disposer: NonNull<Disposer>)
    {
        self.children.append(disposer);
    }

    /// Remove a disposer from the heap's children.
    ///
    /// # Safety
    ///
    /// Must only be called by [`Disposer::detach`].
    pub (super) unsafe fn remove_disposer(&self, disposer: NonNull<Disposer>)
    {
        self.children.remove(disposer);
    }

    /// Keep the memory of a disposed object until the teardown ends.
    ///
    /// # Safety
    ///
    /// The disposer must be detached, and must be embedded in an object
    /// whose value is dropped and whose memory is only freed by
    /// [`Disposer::release`].
    pub (super) unsafe fn defer_release(&self, disposer: NonNull<Disposer>)
    {
        self.released.append(disposer);
    }

    /// Panic if a traversal of the heap's children is in progress.
    pub (super) fn assert_not_traversing(&self)
    {
        assert!(
            self.traversals.get() == 0,
            "Object of heap `{}` destroyed during traversal",
            self.name,
        );
    }

    /// Forget the `'h` parameter.
    pub (super) fn erase(&self) -> ErasedHeap
    {
        NonNull::from(self).cast()
    }

    fn find_overlapping(region: Region) -> Option<String>
    {
        LIVE_HEAPS.with(|heaps| {
            // SAFETY: Registered heaps are live.
            unsafe { heaps.iter() }
                .map(|heap| unsafe { heap.as_ref() })
                .find(|heap| heap.region.overlaps(region))
                .map(|heap| heap.name.clone())
        })
    }

    /// Dispose the remaining children, free the memory of those
    /// that nothing else frees, then leave the registry.
    fn destroy(&self)
    {
        let len = self.children.len();

        scope_exit! {
            // SAFETY: Registered in Heap::with.
            LIVE_HEAPS.with(|heaps| unsafe { heaps.remove(self.erase()) });
        }

        scope_exit! { self.release_disposed(); }

        self.dispose_children();

        debug!("Destroyed heap `{}` with {} remaining objects", self.name, len);
    }

    /// Dispose children until there are none left.
    ///
    /// Disposing an object unlinks it and possibly other objects,
    /// so the head is looked up again after every disposal.
    fn dispose_children(&self)
    {
        while let Some(head) = self.children.head() {
            // If a destructor panics, finish the teardown while unwinding.
            let guard = ScopeExit::new(|| self.dispose_children());

            // SAFETY: Children are live objects that embed their disposers.
            unsafe { Disposer::dispose(head); }

            ScopeExit::dismiss(guard);

            debug_assert_ne!(
                self.children.head(), Some(head),
                "Disposed object is still linked",
            );
        }
    }

    /// Free the memory of the objects passed to
    /// [`defer_release`][`Self::defer_release`].
    fn release_disposed(&self)
    {
        while let Some(head) = self.released.head() {
            // SAFETY: Released disposers are embedded in objects
            //         whose memory is freed by nothing else.
            unsafe {
                self.released.remove(head);
                Disposer::release(head);
            }
        }
    }
}

// SAFETY: The link is only used by the registry.
unsafe impl<'h> Linked for Heap<'h>
{
    fn link(&self) -> &Link<Self>
    {
        &self.link
    }
}

impl<'h> fmt::Debug for Heap<'h>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("Heap")
            .field("name", &self.name)
            .field("region", &self.region)
            .field("len", &self.children.len())
            .finish()
    }
}
