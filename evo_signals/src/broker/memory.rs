//! Byte arenas backing broker entries.

use serde::Serialize;

/// Index of a memory area inside one broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AreaId(pub usize);

/// The broker's own module-local area.
pub const LOCAL_AREA: AreaId = AreaId(0);

/// Growable arena: space is reserved while building, then allocated once.
#[derive(Debug, Clone, Default)]
pub struct MemoryArea {
    data: Vec<u8>,
    reserved: usize,
}

impl MemoryArea {
    /// Empty arena in the reserving phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Already allocated arena of `size` zero bytes (externally owned layout).
    pub fn with_size(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
            reserved: size,
        }
    }

    /// Reserve `size` bytes, returning their offset.
    pub fn reserve(&mut self, size: usize) -> usize {
        let offset = self.reserved;
        self.reserved += size;
        offset
    }

    #[inline]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Back every reserved byte with zeroed memory.
    pub fn allocate(&mut self) {
        if self.data.len() < self.reserved {
            self.data.resize(self.reserved, 0);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn region(&self, offset: usize, size: usize) -> Option<&[u8]> {
        self.data.get(offset..offset.checked_add(size)?)
    }

    pub fn region_mut(&mut self, offset: usize, size: usize) -> Option<&mut [u8]> {
        self.data.get_mut(offset..offset.checked_add(size)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_then_allocate() {
        let mut area = MemoryArea::new();
        assert_eq!(area.reserve(8), 0);
        assert_eq!(area.reserve(4), 8);
        assert!(area.is_empty());
        assert!(area.region(0, 4).is_none());

        area.allocate();
        assert_eq!(area.len(), 12);
        assert_eq!(area.region(8, 4).unwrap(), &[0, 0, 0, 0]);
        assert!(area.region(10, 4).is_none());
        assert!(area.region(usize::MAX, 2).is_none());
    }

    #[test]
    fn external_area_is_allocated() {
        let mut area = MemoryArea::with_size(16);
        assert_eq!(area.len(), 16);
        area.region_mut(4, 2).unwrap().copy_from_slice(&[1, 2]);
        assert_eq!(&area.as_slice()[4..6], &[1, 2]);
    }
}
