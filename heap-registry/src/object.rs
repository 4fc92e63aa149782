use {
    super::{Disposer, Heap},
    log::trace,
    scope_exit::{ScopeExit, scope_exit},
    std::{
        cell::{Cell, UnsafeCell},
        fmt,
        marker::PhantomData,
        mem::{MaybeUninit, forget},
        ops::{Deref, DerefMut},
        ptr::{self, NonNull, addr_of_mut},
    },
};

/// Object that belongs to a heap.
///
/// A heap object is a [`Disposer`] followed by a value.
/// Heap objects are either boxed by [`Heap::create`],
/// or placed into memory provided by an allocation strategy
/// with [`HeapObject::emplace`].
#[repr(C)]
pub struct HeapObject<T>
{
    // NOTE: This must be the first field.
    //       Teardown casts the disposer back to the object.
    disposer: Disposer,

    storage: Storage,

    /// Whether the value is initialized and not yet dropped.
    live: Cell<bool>,

    /// Whether an [`Owned`] handle references the object.
    ///
    /// While it does, the handle is responsible for freeing the box.
    owned: Cell<bool>,

    value: UnsafeCell<MaybeUninit<T>>,
}

/// Who provides the memory for a heap object.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Storage
{
    Boxed,
    Placed,
}

/// Unique handle to an object created by [`Heap::create`].
///
/// Dropping the handle destroys the object, unless the heap already has.
/// The latter happens when the handle is stored inside another object
/// that the heap destroys after destroying this one.
/// Use [`Owned::leak`] to leave the object to the heap.
pub struct Owned<'h, T>
    where T: 'h
{
    object: NonNull<HeapObject<T>>,
    _heap: PhantomData<(&'h Heap<'h>, T)>,
}

/// Shared handle to an object left to the heap by [`Owned::leak`].
///
/// The heap destroys the object during its teardown,
/// after destroying the objects that joined the heap before it.
/// Objects destroyed later may still hold a handle to it,
/// and find it disposed.
/// The memory of the object stays valid until the heap has
/// destroyed all of its objects, so the handle can always tell.
pub struct Leaked<'h, T>
    where T: 'h
{
    object: NonNull<HeapObject<T>>,
    _heap: PhantomData<(&'h Heap<'h>, &'h T)>,
}

impl<'h> Heap<'h>
{
    /// Create an object that belongs to this heap.
    pub fn create<T>(&self, value: T) -> Owned<'h, T>
        where T: 'h
    {
        self.create_with(|| value)
    }

    /// Create an object that belongs to this heap,
    /// with a value returned by the given function.
    ///
    /// The object joins the heap before the function is called.
    /// Objects the function creates on this heap therefore come after it,
    /// and if the heap destroys them, it does so after this object.
    /// If the function panics, the object leaves the heap again.
    pub fn create_with<T, F>(&self, f: F) -> Owned<'h, T>
        where T: 'h, F: FnOnce() -> T
    {
        let object = Box::new(HeapObject::<T>::uninit(Storage::Boxed));
        let object = NonNull::from(Box::leak(object));

        // SAFETY: The box was just leaked.
        let free = ScopeExit::new(|| unsafe {
            drop(Box::from_raw(object.as_ptr()));
        });

        // SAFETY: The box is only freed after the disposer is detached.
        unsafe { HeapObject::construct(object, Some(self), f); }

        ScopeExit::dismiss(free);

        trace!("Created object {:p} in heap `{}`", object, self.name());

        Owned{object, _heap: PhantomData}
    }
}

impl<T> HeapObject<T>
{
    fn uninit(storage: Storage) -> Self
    {
        Self{
            disposer: Disposer::new(Self::teardown, Self::release),
            storage,
            live: Cell::new(false),
            owned: Cell::new(storage == Storage::Boxed),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Construct an object in memory provided by an allocation strategy.
    ///
    /// The object joins the live heap whose region contains `slot`.
    /// If there is no such heap, the object belongs to no heap.
    ///
    /// # Safety
    ///
    ///  - `slot` must be valid for writes and suitably aligned.
    ///  - The memory must neither be reused nor freed until the object
    ///    is destroyed, by [`destroy`][`Self::destroy`] or by its heap.
    ///  - The value must outlive the heap that contains `slot`.
    pub unsafe fn emplace(slot: NonNull<Self>, value: T)
    {
        Self::emplace_with(slot, || value);
    }

    /// Like [`emplace`][`Self::emplace`], but the value
    /// is returned by a function called after the object joins its heap.
    ///
    /// # Safety
    ///
    /// See [`emplace`][`Self::emplace`].
    pub unsafe fn emplace_with<F>(slot: NonNull<Self>, f: F)
        where F: FnOnce() -> T
    {
        ptr::write(slot.as_ptr(), Self::uninit(Storage::Placed));

        Heap::find_contain_heap(slot.as_ptr(), |heap| {
            if heap.is_none() {
                trace!("Placed object {:p} outside every heap", slot);
            }
            Self::construct(slot, heap, f);
        });
    }

    /// Destroy an object constructed by [`emplace`][`Self::emplace`].
    ///
    /// The object leaves its heap, but its memory is not freed.
    ///
    /// # Safety
    ///
    /// The object must not have been destroyed already,
    /// neither by this method nor by the heap's teardown.
    pub unsafe fn destroy(this: NonNull<Self>)
    {
        debug_assert_eq!(this.as_ref().storage, Storage::Placed);
        this.as_ref().assert_destroyable();
        Self::drop_value(this);
    }

    /// The value, unless the object has been destroyed.
    pub fn get(&self) -> Option<&T>
    {
        // SAFETY: The value is initialized while the object is live.
        self.live.get()
            .then(|| unsafe { (*self.value.get()).assume_init_ref() })
    }

    /// Whether the value has been dropped.
    pub fn is_disposed(&self) -> bool
    {
        !self.live.get()
    }

    /// The disposer embedded in the object.
    pub fn disposer(&self) -> &Disposer
    {
        &self.disposer
    }

    /// Attach the disposer, then initialize the value.
    ///
    /// # Safety
    ///
    /// The object must be uninitialized and must stay in place
    /// until its disposer is detached.
    unsafe fn construct<F>(this: NonNull<Self>, heap: Option<&Heap>, f: F)
        where F: FnOnce() -> T
    {
        let disposer = addr_of_mut!((*this.as_ptr()).disposer);
        let disposer = NonNull::new_unchecked(disposer);

        if let Some(heap) = heap {
            Disposer::attach(disposer, heap);
        }

        let detach = ScopeExit::new(|| disposer.as_ref().detach());
        let value = f();
        ScopeExit::dismiss(detach);

        let object = this.as_ref();
        (*object.value.get()).write(value);
        object.live.set(true);
    }

    /// Panic if destroying the object would disturb a heap traversal.
    fn assert_destroyable(&self)
    {
        if let Some(heap) = self.disposer.heap() {
            // SAFETY: The heap of an attached disposer is live.
            unsafe { heap.as_ref().assert_not_traversing(); }
        }
    }

    /// Drop the value and detach the disposer.
    ///
    /// The disposer is detached even if dropping the value panics.
    ///
    /// # Safety
    ///
    /// The object must be live.
    unsafe fn drop_value(this: NonNull<Self>)
    {
        let object = this.as_ref();
        debug_assert!(object.live.get(), "Heap object disposed twice");
        object.live.set(false);

        scope_exit! { object.disposer.detach(); }

        (*object.value.get()).assume_init_drop();
    }

    /// Destroy the object during its heap's teardown.
    ///
    /// # Safety
    ///
    /// `disposer` must be embedded in a live `HeapObject<T>`.
    unsafe fn teardown(disposer: NonNull<Disposer>)
    {
        let this = disposer.cast::<Self>();
        let object = this.as_ref();

        trace!("Disposing object {:p}", this);

        // A handle still owns the box; it frees it when dropped.
        let free = object.storage == Storage::Boxed && !object.owned.get();
        let heap = object.disposer.heap().filter(|_| free);

        // SAFETY: The heap is tearing down, so it is live.
        //         The box is freed once every value of the heap is dropped.
        scope_exit! {
            if let Some(heap) = heap {
                heap.as_ref().defer_release(disposer);
            }
        }

        Self::drop_value(this);
    }

    /// Free a boxed object destroyed during its heap's teardown.
    ///
    /// # Safety
    ///
    /// `disposer` must be embedded in a disposed, boxed `HeapObject<T>`.
    unsafe fn release(disposer: NonNull<Disposer>)
    {
        let this = disposer.cast::<Self>();
        debug_assert_eq!(this.as_ref().storage, Storage::Boxed);
        drop(Box::from_raw(this.as_ptr()));
    }
}

impl<'h, T> Owned<'h, T>
    where T: 'h
{
    /// The value, unless the heap has already destroyed the object.
    pub fn get(&self) -> Option<&T>
    {
        self.object().get()
    }

    /// The value, unless the heap has already destroyed the object.
    pub fn get_mut(&mut self) -> Option<&mut T>
    {
        let object = self.object();
        // SAFETY: The handle is unique, and the value is initialized.
        object.live.get()
            .then(|| unsafe { (*object.value.get()).assume_init_mut() })
    }

    /// Whether the heap has already destroyed the object.
    pub fn is_disposed(&self) -> bool
    {
        self.object().is_disposed()
    }

    /// The disposer embedded in the object.
    pub fn disposer(&self) -> &Disposer
    {
        self.object().disposer()
    }

    /// Give up the handle, leaving the object to the heap.
    ///
    /// The object is destroyed during the heap's teardown.
    pub fn leak(this: Self) -> Leaked<'h, T>
    {
        assert!(!this.is_disposed(), "Use-after-dispose of heap object");

        let object = this.object;
        forget(this);

        // SAFETY: From now on the heap frees the box.
        unsafe { object.as_ref() }.owned.set(false);

        Leaked{object, _heap: PhantomData}
    }

    fn object(&self) -> &HeapObject<T>
    {
        // SAFETY: The box is only freed by the handle.
        unsafe { self.object.as_ref() }
    }
}

impl<'h, T> Deref for Owned<'h, T>
    where T: 'h
{
    type Target = T;

    fn deref(&self) -> &Self::Target
    {
        self.get().expect("Use-after-dispose of heap object")
    }
}

impl<'h, T> DerefMut for Owned<'h, T>
    where T: 'h
{
    fn deref_mut(&mut self) -> &mut Self::Target
    {
        self.get_mut().expect("Use-after-dispose of heap object")
    }
}

impl<'h, T> Drop for Owned<'h, T>
    where T: 'h
{
    fn drop(&mut self)
    {
        let object = self.object;

        if self.is_disposed() {
            // SAFETY: The heap left the box to the handle.
            unsafe { drop(Box::from_raw(object.as_ptr())); }
            return;
        }

        self.object().assert_destroyable();

        // SAFETY: Nothing uses the object after it is destroyed.
        scope_exit! { unsafe { drop(Box::from_raw(object.as_ptr())); } }

        // SAFETY: The object is live.
        unsafe { HeapObject::drop_value(object); }
    }
}

impl<'h, T> fmt::Debug for Owned<'h, T>
    where T: 'h + fmt::Debug
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        fmt_object(self.object(), f)
    }
}

impl<'h, T> Leaked<'h, T>
    where T: 'h
{
    /// The value, unless the heap has already destroyed the object.
    pub fn get(&self) -> Option<&T>
    {
        self.object().get()
    }

    /// Whether the heap has already destroyed the object.
    pub fn is_disposed(&self) -> bool
    {
        self.object().is_disposed()
    }

    /// The disposer embedded in the object.
    pub fn disposer(&self) -> &Disposer
    {
        self.object().disposer()
    }

    fn object(&self) -> &HeapObject<T>
    {
        // SAFETY: The heap frees the box only after it has destroyed
        //         every object, including those that hold this handle.
        unsafe { self.object.as_ref() }
    }
}

impl<'h, T> Clone for Leaked<'h, T>
    where T: 'h
{
    fn clone(&self) -> Self
    {
        *self
    }
}

impl<'h, T> Copy for Leaked<'h, T>
    where T: 'h
{
}

impl<'h, T> Deref for Leaked<'h, T>
    where T: 'h
{
    type Target = T;

    fn deref(&self) -> &Self::Target
    {
        self.get().expect("Use-after-dispose of heap object")
    }
}

impl<'h, T> fmt::Debug for Leaked<'h, T>
    where T: 'h + fmt::Debug
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        fmt_object(self.object(), f)
    }
}

fn fmt_object<T>(object: &HeapObject<T>, f: &mut fmt::Formatter)
    -> fmt::Result
    where T: fmt::Debug
{
    match object.get() {
        Some(value) => fmt::Debug::fmt(value, f),
        None        => f.write_str("<disposed>"),
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::Region,
        proptest::{collection::vec, prelude::*, sample::Index},
        std::{
            cell::RefCell,
            panic::{AssertUnwindSafe, catch_unwind},
            rc::Rc,
        },
    };

    fn region(base: usize, len: usize) -> Region
    {
        Region::new(base, len).unwrap()
    }

    type Log = Rc<RefCell<Vec<&'static str>>>;

    /// Object that records its destruction.
    struct Probe
    {
        name: &'static str,
        log: Log,
    }

    fn probe(name: &'static str, log: &Log) -> Probe
    {
        Probe{name, log: log.clone()}
    }

    impl Drop for Probe
    {
        fn drop(&mut self)
        {
            self.log.borrow_mut().push(self.name);
        }
    }

    /// Object that holds a handle to another object.
    ///
    /// Records its destruction and whether the other object
    /// was still live at that point.
    struct Holder<'h>
    {
        name: &'static str,
        log: Log,
        child: Owned<'h, Probe>,
    }

    impl<'h> Drop for Holder<'h>
    {
        fn drop(&mut self)
        {
            let state = if self.child.is_disposed() { "disposed" }
                        else { "live" };
            self.log.borrow_mut().extend([self.name, state]);
        }
    }

    /// Object that records, when destroyed,
    /// whether the objects it watches were destroyed before it.
    struct Witness<'h>
    {
        log: Log,
        watched: Vec<Leaked<'h, Probe>>,
    }

    impl<'h> Drop for Witness<'h>
    {
        fn drop(&mut self)
        {
            for object in &self.watched {
                let state = if object.is_disposed() { "disposed" }
                            else { "live" };
                self.log.borrow_mut().push(state);
            }
        }
    }

    /// Object that reads another object when destroyed.
    struct Reader<'h>
    {
        target: Leaked<'h, String>,
        seen: Rc<RefCell<Vec<Option<String>>>>,
    }

    impl<'h> Drop for Reader<'h>
    {
        fn drop(&mut self)
        {
            self.seen.borrow_mut().push(self.target.get().cloned());
        }
    }

    fn walk(heap: &Heap) -> Vec<*const Disposer>
    {
        let mut walked = Vec::new();
        heap.for_each_disposer(|disposer| walked.push(disposer as *const _));
        walked
    }

    #[test]
    fn heap_disposes_what_is_left()
    {
        let log = Rc::new(RefCell::new(Vec::new()));

        Heap::with("H", region(0x1000, 0x1000), |heap| {
            let o1 = heap.create(probe("O1", &log));
            let o2 = heap.create(probe("O2", &log));
            let o3 = heap.create(probe("O3", &log));

            let walked = walk(heap);
            assert_eq!(walked.len(), 3);
            assert!(ptr::eq(walked[0], o1.disposer()));
            assert!(ptr::eq(walked[1], o2.disposer()));
            assert!(ptr::eq(walked[2], o3.disposer()));

            let found = Heap::find_contain_heap(0x1010 as *const u8, |h| {
                h.map(|h| h.name().to_owned())
            });
            assert_eq!(found.as_deref(), Some("H"));

            drop(o2);
            assert_eq!(*log.borrow(), ["O2"]);

            let walked = walk(heap);
            assert_eq!(walked.len(), 2);
            assert!(ptr::eq(walked[0], o1.disposer()));
            assert!(ptr::eq(walked[1], o3.disposer()));

            let watched = vec![Owned::leak(o1), Owned::leak(o3)];
            assert!(watched.iter().all(|object| !object.is_disposed()));
            assert_eq!(watched[0].name, "O1");

            let witness = Witness{log: log.clone(), watched};
            Owned::leak(heap.create(witness));
        }).unwrap();

        // O1 and O3 were disposed, in order, before the witness checked.
        assert_eq!(*log.borrow(), ["O2", "O1", "O3", "disposed", "disposed"]);
    }

    #[test]
    fn later_object_finds_earlier_object_disposed()
    {
        let seen = Rc::new(RefCell::new(Vec::new()));

        Heap::with("h", region(0x1000, 0x1000), |heap| {
            let text = Owned::leak(heap.create(String::from("earlier")));
            let reader = Reader{target: text, seen: seen.clone()};
            Owned::leak(heap.create(reader));
            assert_eq!(*text, "earlier");
        }).unwrap();

        assert_eq!(*seen.borrow(), vec![None::<String>]);
    }

    #[test]
    fn earlier_object_finds_later_object_live()
    {
        let seen = Rc::new(RefCell::new(Vec::new()));

        Heap::with("h", region(0x1000, 0x1000), |heap| {
            let reader = heap.create_with(|| {
                let text = Owned::leak(heap.create(String::from("later")));
                Reader{target: text, seen: seen.clone()}
            });
            Owned::leak(reader);
        }).unwrap();

        assert_eq!(*seen.borrow(), vec![Some(String::from("later"))]);
    }

    #[test]
    #[should_panic(expected = "Use-after-dispose of heap object")]
    fn dereferencing_disposed_object_panics()
    {
        struct Strict<'h>(Leaked<'h, String>);

        impl<'h> Drop for Strict<'h>
        {
            fn drop(&mut self)
            {
                assert!(!self.0.is_empty());
            }
        }

        Heap::with("h", region(0x1000, 0x1000), |heap| {
            let text = Owned::leak(heap.create(String::from("earlier")));
            Owned::leak(heap.create(Strict(text)));
        }).unwrap();
    }

    #[test]
    fn dropping_handle_leaves_heap()
    {
        let log = Rc::new(RefCell::new(Vec::new()));

        Heap::with("h", region(0x1000, 0x1000), |heap| {
            let a = heap.create(probe("a", &log));
            let b = heap.create(probe("b", &log));
            assert!(a.disposer().belongs_to(heap));
            assert_eq!(heap.len(), 2);

            drop(a);
            assert_eq!(heap.len(), 1);
            assert_eq!(*log.borrow(), ["a"]);

            let walked = walk(heap);
            assert_eq!(walked.len(), 1);
            assert!(ptr::eq(walked[0], b.disposer()));
        }).unwrap();

        // Each destructor ran exactly once.
        assert_eq!(*log.borrow(), ["a", "b"]);
    }

    #[test]
    fn objects_created_during_construction_come_after()
    {
        let log = Rc::new(RefCell::new(Vec::new()));

        Heap::with("h", region(0x1000, 0x1000), |heap| {
            let holder = heap.create_with(|| {
                Owned::leak(heap.create(probe("C", &log)));
                let child = heap.create(probe("B", &log));
                Holder{name: "A", log: log.clone(), child}
            });
            assert_eq!(heap.len(), 3);

            let walked = walk(heap);
            assert!(ptr::eq(walked[0], holder.disposer()));
            assert!(ptr::eq(walked[2], holder.child.disposer()));

            Owned::leak(holder);
        }).unwrap();

        assert_eq!(*log.borrow(), ["A", "live", "B", "C"]);
    }

    #[test]
    fn handle_outlives_its_object()
    {
        let log = Rc::new(RefCell::new(Vec::new()));

        Heap::with("h", region(0x1000, 0x1000), |heap| {
            let child = heap.create(probe("B", &log));
            let holder = Holder{name: "A", log: log.clone(), child};
            let holder = heap.create(holder);
            Owned::leak(holder);
        }).unwrap();

        // B is disposed once, by the heap, before A drops its handle.
        assert_eq!(*log.borrow(), ["B", "A", "disposed"]);
    }

    #[test]
    fn panicking_constructor_leaves_heap()
    {
        let log = Rc::new(RefCell::new(Vec::new()));

        Heap::with("h", region(0x1000, 0x1000), |heap| {
            Owned::leak(heap.create(0));

            let result = catch_unwind(AssertUnwindSafe(|| {
                heap.create_with::<Probe, _>(|| {
                    Owned::leak(heap.create(probe("inner", &log)));
                    panic!("construction failed");
                })
            }));
            assert!(result.is_err());

            // Only the object created by the constructor remains.
            assert_eq!(heap.len(), 2);
            assert!(log.borrow().is_empty());
        }).unwrap();

        assert_eq!(*log.borrow(), ["inner"]);
    }

    #[test]
    fn handle_accessors()
    {
        Heap::with("h", region(0x1000, 0x1000), |heap| {
            let mut counter = heap.create(0);
            *counter += 1;
            *counter.get_mut().unwrap() += 1;
            assert_eq!(*counter, 2);
            assert_eq!(counter.get(), Some(&2));
            assert!(!counter.is_disposed());
            assert!(counter.disposer().is_attached());
            assert_eq!(format!("{:?}", counter), "2");

            let leaked = Owned::leak(counter);
            let copy = leaked;
            assert_eq!(*leaked, 2);
            assert_eq!(copy.get(), Some(&2));
            assert!(ptr::eq(copy.disposer(), leaked.disposer()));
            assert_eq!(format!("{:?}", copy), "2");
            assert_eq!(heap.len(), 1);
        }).unwrap();
    }

    #[test]
    fn placed_objects_join_containing_heap()
    {
        let log = Rc::new(RefCell::new(Vec::new()));

        let mut buffer: Vec<MaybeUninit<HeapObject<Probe>>> =
            (0 .. 3).map(|_| MaybeUninit::uninit()).collect();
        let region = Region::from_slice(&buffer);
        let base = buffer.as_mut_ptr().cast::<HeapObject<Probe>>();
        let slot = |i: usize| NonNull::new(base.wrapping_add(i)).unwrap();

        Heap::with("pool", region, |heap| {
            for (i, name) in ["p0", "p1", "p2"].into_iter().enumerate() {
                // SAFETY: The buffer outlives the heap.
                unsafe { HeapObject::emplace(slot(i), probe(name, &log)); }
            }
            assert_eq!(heap.len(), 3);

            // SAFETY: The slot was initialized above.
            let p1 = unsafe { slot(1).as_ref() };
            assert!(p1.disposer().belongs_to(heap));
            assert_eq!(p1.get().map(|p| p.name), Some("p1"));

            // SAFETY: Not destroyed yet.
            unsafe { HeapObject::destroy(slot(1)); }
            assert!(p1.is_disposed());
            assert!(p1.get().is_none());
            assert!(!p1.disposer().is_attached());
            assert_eq!(heap.len(), 2);
            assert_eq!(*log.borrow(), ["p1"]);
        }).unwrap();

        assert_eq!(*log.borrow(), ["p1", "p0", "p2"]);

        for i in 0 .. 3 {
            // SAFETY: The buffer still holds the destroyed objects.
            let object = unsafe { slot(i).as_ref() };
            assert!(object.is_disposed());
            assert!(!object.disposer().is_attached());
        }
    }

    #[test]
    fn placed_object_outside_heaps_belongs_to_none()
    {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut storage = MaybeUninit::<HeapObject<Probe>>::uninit();
        let slot = NonNull::from(&mut storage).cast::<HeapObject<Probe>>();

        Heap::with("h", region(0x1000, 0x1000), |heap| {
            // SAFETY: The storage outlives the object.
            unsafe { HeapObject::emplace(slot, probe("stray", &log)); }
            assert!(heap.is_empty());

            // SAFETY: The slot was initialized above.
            let object = unsafe { slot.as_ref() };
            assert!(!object.disposer().is_attached());

            // SAFETY: Not destroyed yet.
            unsafe { HeapObject::destroy(slot); }
            assert_eq!(*log.borrow(), ["stray"]);
        }).unwrap();

        assert_eq!(*log.borrow(), ["stray"]);
    }

    /// Object that records its destruction by number.
    struct Numbered
    {
        id: usize,
        log: Rc<RefCell<Vec<usize>>>,
    }

    impl Drop for Numbered
    {
        fn drop(&mut self)
        {
            self.log.borrow_mut().push(self.id);
        }
    }

    proptest!
    {
        /// `None` creates an object, `Some` drops the handle to one.
        #[test]
        fn teardown_disposes_survivors_in_order(
            operations in vec(any::<Option<Index>>(), 0 .. 64),
        )
        {
            let log = Rc::new(RefCell::new(Vec::new()));
            let mut expected = Vec::new();

            Heap::with("h", region(0x1000, 0x1000), |heap| {
                let mut handles = Vec::new();
                let mut model = Vec::new();

                for (id, operation) in operations.into_iter().enumerate() {
                    match operation {
                        Some(index) if !handles.is_empty() => {
                            let index = index.index(handles.len());
                            drop(handles.remove(index));
                            expected.push(model.remove(index));
                        },
                        _ => {
                            let log = log.clone();
                            handles.push(heap.create(Numbered{id, log}));
                            model.push(id);
                        },
                    }
                    assert_eq!(heap.len(), model.len());
                }

                assert_eq!(*log.borrow(), expected);
                expected.extend(model);
                handles.into_iter().for_each(|handle| { Owned::leak(handle); });
            }).unwrap();

            assert_eq!(*log.borrow(), expected);
        }
    }
}
