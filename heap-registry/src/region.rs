use {std::{fmt, mem::size_of_val}, thiserror::Error};

/// Range of addresses owned by a heap.
///
/// A region includes its base address and excludes its end address.
/// Regions only describe memory; they do not own it.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Region
{
    base: usize,
    len: usize,
}

/// Returned when a region would extend past the end of the address space.
#[derive(Debug, Error)]
#[error("Region of {len} bytes at {base:#x} wraps around the address space")]
pub struct RegionOverflowError
{
    /// The requested base address.
    pub base: usize,

    /// The requested length.
    pub len: usize,
}

impl Region
{
    /// Create a region of `len` bytes starting at `base`.
    pub fn new(base: usize, len: usize) -> Result<Self, RegionOverflowError>
    {
        base.checked_add(len).ok_or(RegionOverflowError{base, len})?;
        Ok(Self{base, len})
    }

    /// The region occupied by the elements of a slice.
    pub fn from_slice<T>(slice: &[T]) -> Self
    {
        // A slice never wraps around the address space.
        Self{base: slice.as_ptr() as usize, len: size_of_val(slice)}
    }

    /// The first address in the region.
    pub fn base(self) -> usize
    {
        self.base
    }

    /// The number of bytes in the region.
    pub fn len(self) -> usize
    {
        self.len
    }

    /// Whether the region contains no addresses.
    pub fn is_empty(self) -> bool
    {
        self.len == 0
    }

    /// The first address past the region.
    pub fn end(self) -> usize
    {
        self.base + self.len
    }

    /// Whether the region contains the given address.
    pub fn contains(self, address: usize) -> bool
    {
        self.base <= address && address < self.end()
    }

    /// Whether the two regions have any address in common.
    pub fn overlaps(self, other: Region) -> bool
    {
        !self.is_empty() && !other.is_empty()
            && self.base < other.end()
            && other.base < self.end()
    }
}

impl fmt::Debug for Region
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "{:#x}..{:#x}", self.base, self.end())
    }
}
