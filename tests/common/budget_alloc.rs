use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time view of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocStats {
    pub current_bytes: usize,
    pub peak_bytes: usize,
    pub allocs: usize,
}

/// System allocator wrapper tracking live bytes, high-water mark and call count.
pub struct BudgetAlloc {
    current: AtomicUsize,
    peak: AtomicUsize,
    count: AtomicUsize,
}

impl BudgetAlloc {
    pub const fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
        }
    }

    /// Zero every counter. Bytes allocated before the reset and freed after
    /// it saturate at zero instead of wrapping.
    pub fn reset(&self) {
        self.current.store(0, Ordering::SeqCst);
        self.peak.store(0, Ordering::SeqCst);
        self.count.store(0, Ordering::SeqCst);
    }

    /// Restart high-water tracking from the current live byte count.
    pub fn reset_peak(&self) {
        self.peak
            .store(self.current.load(Ordering::SeqCst), Ordering::SeqCst);
    }

    pub fn stats(&self) -> AllocStats {
        AllocStats {
            current_bytes: self.current.load(Ordering::SeqCst),
            peak_bytes: self.peak.load(Ordering::SeqCst),
            allocs: self.count.load(Ordering::SeqCst),
        }
    }

    pub fn peak_bytes(&self) -> usize {
        self.stats().peak_bytes
    }

    pub fn current_bytes(&self) -> usize {
        self.stats().current_bytes
    }

    pub fn alloc_count(&self) -> usize {
        self.stats().allocs
    }

    fn grow(&self, bytes: usize) {
        let live = self.current.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.peak.fetch_max(live, Ordering::SeqCst);
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn shrink(&self, bytes: usize) {
        let _ = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                Some(live.saturating_sub(bytes))
            });
    }
}

unsafe impl GlobalAlloc for BudgetAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            self.grow(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        self.shrink(layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            self.grow(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if new_ptr.is_null() {
            return new_ptr;
        }
        match new_size.checked_sub(layout.size()) {
            Some(extra) => self.grow(extra),
            None => {
                self.shrink(layout.size() - new_size);
                self.count.fetch_add(1, Ordering::SeqCst);
            }
        }
        new_ptr
    }
}
