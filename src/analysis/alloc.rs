//! Occupancy trackers for the simulated address space.
//!
//! The analysis only ever notes allocations here; nothing is freed and overlaps
//! are not detected. Generation consults the trackers afterwards to place new
//! pointers away from memory earlier calls already use.

use hashbrown::HashSet;

/// Granularity of [`MemAlloc`] in bytes.
pub const MEM_ALLOC_GRANULE: u64 = 64;

/// Byte-granular tracker of memory referenced by pointers with subtrees.
#[derive(Debug, Clone)]
pub struct MemAlloc {
    granules: u64,
    bits: Vec<u64>,
}

impl MemAlloc {
    pub fn new(total_size: u64) -> Self {
        let granules = total_size.div_ceil(MEM_ALLOC_GRANULE);
        Self {
            granules,
            bits: vec![0; granules.div_ceil(64) as usize],
        }
    }

    /// Mark `[addr, addr+size)` as used.
    pub fn note_alloc(&mut self, addr: u64, size: u64) {
        let first = addr / MEM_ALLOC_GRANULE;
        let end = addr
            .saturating_add(size)
            .saturating_add(MEM_ALLOC_GRANULE - 1)
            / MEM_ALLOC_GRANULE;
        if end > self.granules {
            log::trace!(
                "allocation {:#x}+{:#x} runs past the simulated address space",
                addr,
                size
            );
        }
        for granule in first..end.min(self.granules) {
            self.bits[(granule / 64) as usize] |= 1 << (granule % 64);
        }
    }

    /// Whether the granule containing `addr` was noted.
    pub fn is_allocated(&self, addr: u64) -> bool {
        let granule = addr / MEM_ALLOC_GRANULE;
        granule < self.granules && self.bits[(granule / 64) as usize] & (1 << (granule % 64)) != 0
    }

    /// Number of granules noted so far.
    pub fn used_granules(&self) -> u64 {
        self.bits.iter().map(|w| w.count_ones() as u64).sum()
    }
}

/// Page-granular tracker of raw anonymous mappings.
#[derive(Debug, Clone)]
pub struct VmaAlloc {
    num_pages: u64,
    used: Vec<u64>,
    seen: HashSet<u64>,
}

impl VmaAlloc {
    pub fn new(num_pages: u64) -> Self {
        Self {
            num_pages,
            used: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Mark `npages` pages starting at page `start` as used.
    pub fn note_alloc(&mut self, start: u64, npages: u64) {
        let end = start.saturating_add(npages);
        if end > self.num_pages {
            log::trace!(
                "mapping of {} pages at page {} runs past the simulated address space",
                npages,
                start
            );
        }
        for page in start..end.min(self.num_pages) {
            if self.seen.insert(page) {
                self.used.push(page);
            }
        }
    }

    /// Pages noted so far, in the order they were first seen.
    pub fn used_pages(&self) -> &[u64] {
        &self.used
    }

    pub fn is_used(&self, page: u64) -> bool {
        self.seen.contains(&page)
    }

    pub fn num_pages(&self) -> u64 {
        self.num_pages
    }
}
