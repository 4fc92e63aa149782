//! Doubly-linked lists whose links live inside the linked objects.
//!
//! A [`List`] never allocates.
//! Each object that can be put in a list embeds a [`Link`],
//! and exposes it through the [`Linked`] trait.
//! The list only stores the addresses of its first and last objects;
//! the remaining structure is stored in the links themselves.
//!
//! Links and lists use [`Cell`]s, so all operations work on shared references.
//! This allows an object to unlink itself from a list
//! while the owner of the list is walking it.
//! The flip side is that the list cannot know whether its objects are alive,
//! so mutating and traversing operations are unsafe.

#![warn(missing_docs)]

use std::{
    cell::Cell,
    fmt,
    iter::FusedIterator,
    marker::PhantomData,
    ptr::NonNull,
};

/// Links embedded in an object that can be put in a [`List`].
pub struct Link<T>
{
    prev: Cell<Option<NonNull<T>>>,
    next: Cell<Option<NonNull<T>>>,
}

impl<T> Link<T>
{
    /// Create a link that is not part of any list.
    pub const fn new() -> Self
    {
        Self{prev: Cell::new(None), next: Cell::new(None)}
    }

    /// The object before this one, or [`None`] if this is the head.
    pub fn prev(&self) -> Option<NonNull<T>>
    {
        self.prev.get()
    }

    /// The object after this one, or [`None`] if this is the tail.
    pub fn next(&self) -> Option<NonNull<T>>
    {
        self.next.get()
    }

    fn clear(&self)
    {
        self.prev.set(None);
        self.next.set(None);
    }
}

impl<T> Default for Link<T>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<T> fmt::Debug for Link<T>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("Link")
            .field("prev", &self.prev.get())
            .field("next", &self.next.get())
            .finish()
    }
}

/// Objects that embed a [`Link`].
///
/// # Safety
///
/// [`link`][`Self::link`] must return the same link
/// every time it is called on the same object,
/// and that link must not be used by anything but [`List`].
pub unsafe trait Linked: Sized
{
    /// The link embedded in this object.
    fn link(&self) -> &Link<Self>;
}

/// Intrusive doubly-linked list.
///
/// # Invariants
///
/// The head and tail are [`None`] if and only if the length is zero.
/// Following [`Link::next`] from the head reaches [`None`]
/// after exactly [`len`][`Self::len`] objects.
pub struct List<T>
    where T: Linked
{
    head: Cell<Option<NonNull<T>>>,
    tail: Cell<Option<NonNull<T>>>,
    len: Cell<usize>,
}

impl<T> List<T>
    where T: Linked
{
    /// Create an empty list.
    pub const fn new() -> Self
    {
        Self{head: Cell::new(None), tail: Cell::new(None), len: Cell::new(0)}
    }

    /// The number of objects in the list.
    pub fn len(&self) -> usize
    {
        self.len.get()
    }

    /// Whether the list contains no objects.
    pub fn is_empty(&self) -> bool
    {
        self.len.get() == 0
    }

    /// The first object in the list.
    pub fn head(&self) -> Option<NonNull<T>>
    {
        self.head.get()
    }

    /// The last object in the list.
    pub fn tail(&self) -> Option<NonNull<T>>
    {
        self.tail.get()
    }

    /// Insert an object at the end of the list.
    ///
    /// # Safety
    ///
    /// The object must be live, must not currently be in any list,
    /// and must stay live and in place until it is removed.
    pub unsafe fn append(&self, object: NonNull<T>)
    {
        self.insert(None, object);
    }

    /// Insert an object at the start of the list.
    ///
    /// # Safety
    ///
    /// See [`append`][`Self::append`].
    pub unsafe fn prepend(&self, object: NonNull<T>)
    {
        self.insert(self.head.get(), object);
    }

    /// Insert an object before `before`, or at the end if `before` is [`None`].
    ///
    /// # Safety
    ///
    /// See [`append`][`Self::append`].
    /// In addition, `before` must be in this list.
    pub unsafe fn insert(&self, before: Option<NonNull<T>>, object: NonNull<T>)
    {
        let link = object.as_ref().link();

        debug_assert!(
            link.prev().is_none() && link.next().is_none()
                && self.head.get() != Some(object),
            "Object is already linked",
        );

        let prev = match before {
            Some(before) => before.as_ref().link().prev(),
            None         => self.tail.get(),
        };

        link.prev.set(prev);
        link.next.set(before);

        match prev {
            Some(prev) => prev.as_ref().link().next.set(Some(object)),
            None       => self.head.set(Some(object)),
        }

        match before {
            Some(before) => before.as_ref().link().prev.set(Some(object)),
            None         => self.tail.set(Some(object)),
        }

        self.len.set(self.len.get() + 1);
    }

    /// Remove an object from the list.
    ///
    /// The object's link is cleared, so it may be inserted again afterwards.
    ///
    /// # Safety
    ///
    /// The object must be in this list.
    pub unsafe fn remove(&self, object: NonNull<T>)
    {
        debug_assert!(self.len.get() != 0, "Removing from an empty list");

        let link = object.as_ref().link();
        let prev = link.prev();
        let next = link.next();

        match prev {
            Some(prev) => prev.as_ref().link().next.set(next),
            None => {
                debug_assert_eq!(
                    self.head.get(), Some(object),
                    "Object is not in this list",
                );
                self.head.set(next);
            },
        }

        match next {
            Some(next) => next.as_ref().link().prev.set(prev),
            None       => self.tail.set(prev),
        }

        link.clear();
        self.len.set(self.len.get() - 1);
    }

    /// The object at the given position, counting from the head.
    ///
    /// # Safety
    ///
    /// All objects in the list must be live.
    pub unsafe fn nth(&self, index: usize) -> Option<NonNull<T>>
    {
        self.iter().nth(index)
    }

    /// Walk the list from head to tail.
    ///
    /// The iterator reads the link of each object as it returns the object,
    /// so the most recently returned object may be removed during the walk.
    ///
    /// # Safety
    ///
    /// All objects in the list must be live during the walk.
    /// No object other than the most recently returned one may be removed.
    pub unsafe fn iter(&self) -> Iter<T>
    {
        Iter{next: self.head.get(), _list: PhantomData}
    }
}

impl<T> Default for List<T>
    where T: Linked
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<T> fmt::Debug for List<T>
    where T: Linked
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("List")
            .field("head", &self.head.get())
            .field("tail", &self.tail.get())
            .field("len", &self.len.get())
            .finish()
    }
}

/// Iterator returned by [`List::iter`].
pub struct Iter<'a, T>
    where T: Linked
{
    /// The object to return next.
    next: Option<NonNull<T>>,

    _list: PhantomData<&'a List<T>>,
}

impl<'a, T> Iterator for Iter<'a, T>
    where T: Linked
{
    type Item = NonNull<T>;

    fn next(&mut self) -> Option<Self::Item>
    {
        let object = self.next?;
        // SAFETY: Guaranteed by the caller of List::iter.
        self.next = unsafe { object.as_ref().link().next() };
        Some(object)
    }
}

impl<'a, T> FusedIterator for Iter<'a, T>
    where T: Linked
{
}
