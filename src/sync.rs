//! Home of [`HeapLock`], a mutex-locked wrapper of [`Heap`].

use core::{
    alloc::{GlobalAlloc, Layout},
    ptr::{null_mut, NonNull},
};

use allocator_api2::alloc::{AllocError, Allocator};

use crate::{
    heap::{Addr, Heap},
    source::{RawSource, Source},
    ALIGNMENT,
};

/// Heap lock, contains a mutex-locked [`Heap`].
///
/// Every operation takes the lock exactly once. Over a [`RawSource`],
/// this implements [`GlobalAlloc`] and [`Allocator`] for layouts aligned
/// to at most [`ALIGNMENT`]. Requests for stricter alignment fail.
///
/// # Example
/// ```rust
/// use bintag::{Heap, HeapLock, VecSource};
///
/// let lock = HeapLock::<spin::Mutex<()>, _>::new(Heap::new(VecSource::new()).unwrap());
///
/// let addr = lock.allocate(64).unwrap();
/// lock.lock().payload_mut(addr)[0] = 1;
/// lock.release(addr);
/// ```
#[derive(Debug)]
pub struct HeapLock<R: lock_api::RawMutex, S: Source> {
    mutex: lock_api::Mutex<R, Heap<S>>,
}

impl<R: lock_api::RawMutex, S: Source> HeapLock<R, S> {
    /// Create a new `HeapLock`.
    pub const fn new(heap: Heap<S>) -> Self {
        Self { mutex: lock_api::Mutex::new(heap) }
    }

    /// Lock the mutex and access the inner `Heap`.
    pub fn lock(&self) -> lock_api::MutexGuard<'_, R, Heap<S>> {
        self.mutex.lock()
    }

    /// Try to lock the mutex and access the inner `Heap`.
    pub fn try_lock(&self) -> Option<lock_api::MutexGuard<'_, R, Heap<S>>> {
        self.mutex.try_lock()
    }

    /// Access the inner `Heap` without locking.
    pub fn get_mut(&mut self) -> &mut Heap<S> {
        self.mutex.get_mut()
    }

    /// Retrieve the inner `Heap`.
    pub fn into_inner(self) -> Heap<S> {
        self.mutex.into_inner()
    }

    /// See [`Heap::allocate`].
    pub fn allocate(&self, size: usize) -> Option<Addr> {
        self.lock().allocate(size)
    }

    /// See [`Heap::release`].
    pub fn release(&self, addr: Addr) {
        self.lock().release(addr)
    }

    /// See [`Heap::reallocate`].
    pub fn reallocate(&self, addr: Option<Addr>, size: usize) -> Option<Addr> {
        self.lock().reallocate(addr, size)
    }

    /// See [`Heap::zero_allocate`].
    pub fn zero_allocate(&self, count: usize, elem_size: usize) -> Option<Addr> {
        self.lock().zero_allocate(count, elem_size)
    }
}

fn addr_to_ptr<S: RawSource>(heap: &Heap<S>, addr: Addr) -> Option<NonNull<u8>> {
    let base = heap.source().base()?;
    NonNull::new(base.as_ptr().wrapping_add(addr.get()))
}

/// # Safety
/// `ptr` must point into `heap`'s arena.
unsafe fn ptr_to_addr<S: RawSource>(heap: &Heap<S>, ptr: NonNull<u8>) -> Option<Addr> {
    let base = heap.source().base()?;
    Addr::new((ptr.as_ptr() as usize).wrapping_sub(base.as_ptr() as usize))
}

/// Convert a nonnull and length to a nonnull slice.
fn nonnull_slice_from_raw_parts(ptr: NonNull<u8>, len: usize) -> NonNull<[u8]> {
    unsafe { NonNull::new_unchecked(core::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)) }
}

/// A well-aligned dangling pointer for zero-sized allocations.
fn dangling(layout: Layout) -> NonNull<u8> {
    // SAFETY: alignments are non-zero
    unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
}

unsafe impl<R: lock_api::RawMutex, S: RawSource> GlobalAlloc for HeapLock<R, S> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return null_mut();
        }

        let mut heap = self.lock();
        heap.allocate(layout.size().max(1))
            .and_then(|addr| addr_to_ptr(&heap, addr))
            .map_or(null_mut(), NonNull::as_ptr)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return null_mut();
        }

        let mut heap = self.lock();
        heap.zero_allocate(1, layout.size().max(1))
            .and_then(|addr| addr_to_ptr(&heap, addr))
            .map_or(null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let mut heap = self.lock();
        if let Some(addr) = NonNull::new(ptr).and_then(|ptr| ptr_to_addr(&heap, ptr)) {
            heap.release(addr);
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
        let mut heap = self.lock();
        let Some(addr) = NonNull::new(ptr).and_then(|ptr| ptr_to_addr(&heap, ptr)) else {
            return null_mut();
        };

        if new_size <= heap.usable_size(addr) {
            return ptr;
        }

        heap.reallocate(Some(addr), new_size)
            .and_then(|addr| addr_to_ptr(&heap, addr))
            .map_or(null_mut(), NonNull::as_ptr)
    }
}

unsafe impl<R: lock_api::RawMutex, S: RawSource> Allocator for HeapLock<R, S> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.align() > ALIGNMENT {
            return Err(AllocError);
        }
        if layout.size() == 0 {
            return Ok(nonnull_slice_from_raw_parts(dangling(layout), 0));
        }

        let mut heap = self.lock();
        heap.allocate(layout.size())
            .and_then(|addr| addr_to_ptr(&heap, addr))
            .map(|nn| nonnull_slice_from_raw_parts(nn, layout.size()))
            .ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            let mut heap = self.lock();
            if let Some(addr) = ptr_to_addr(&heap, ptr) {
                heap.release(addr);
            }
        }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() >= old_layout.size());

        if old_layout.size() == 0 {
            return Allocator::allocate(self, new_layout);
        }
        if new_layout.align() > ALIGNMENT {
            return Err(AllocError);
        }

        let mut heap = self.lock();
        let addr = ptr_to_addr(&heap, ptr).ok_or(AllocError)?;

        if new_layout.size() <= heap.usable_size(addr) {
            return Ok(nonnull_slice_from_raw_parts(ptr, new_layout.size()));
        }

        heap.reallocate(Some(addr), new_layout.size())
            .and_then(|addr| addr_to_ptr(&heap, addr))
            .map(|nn| nonnull_slice_from_raw_parts(nn, new_layout.size()))
            .ok_or(AllocError)
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() <= old_layout.size());

        if new_layout.size() == 0 {
            self.deallocate(ptr, old_layout);
            return Ok(nonnull_slice_from_raw_parts(dangling(new_layout), 0));
        }
        if new_layout.align() > ALIGNMENT {
            return Err(AllocError);
        }

        // the block keeps its size, there's no in-place shrinking
        Ok(nonnull_slice_from_raw_parts(ptr, new_layout.size()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Region, VecSource};

    type Lock<S> = HeapLock<spin::Mutex<()>, S>;

    fn region_lock(size: usize) -> Lock<Region> {
        let arena = Box::leak(vec![0u8; size].into_boxed_slice());
        let region = unsafe { Region::new(arena.as_mut_ptr(), arena.len()) };
        Lock::new(Heap::new(region).unwrap())
    }

    #[test]
    fn delegates_to_heap() {
        let lock = Lock::new(Heap::new(VecSource::new()).unwrap());

        let a = lock.allocate(100).unwrap();
        let b = lock.reallocate(Some(a), 200).unwrap();
        let c = lock.zero_allocate(4, 4).unwrap();
        lock.release(b);
        lock.release(c);

        assert!(lock.try_lock().is_some());
        let mut lock = lock;
        assert!(lock.get_mut().validate_heap(line!()));
        assert!(lock.into_inner().blocks().all(|(_, view)| view.is_free()));
    }

    #[test]
    fn global_alloc() {
        let lock = region_lock(1 << 20);

        unsafe {
            let layout = Layout::from_size_align(100, 16).unwrap();
            let ptr = lock.alloc(layout);
            assert!(!ptr.is_null());
            assert_eq!(ptr as usize % ALIGNMENT, 0);
            ptr.write_bytes(0xab, 100);

            let ptr = lock.realloc(ptr, layout, 5000);
            assert!(!ptr.is_null());
            assert!(core::slice::from_raw_parts(ptr, 100).iter().all(|&b| b == 0xab));

            let zeroed = lock.alloc_zeroed(Layout::from_size_align(300, 8).unwrap());
            assert!(core::slice::from_raw_parts(zeroed, 300).iter().all(|&b| b == 0));

            lock.dealloc(ptr, Layout::from_size_align(5000, 16).unwrap());
            lock.dealloc(zeroed, Layout::from_size_align(300, 8).unwrap());

            assert!(lock.alloc(Layout::from_size_align(8, 32).unwrap()).is_null());
        }

        assert!(lock.lock().validate_heap(line!()));
    }

    #[test]
    fn realloc_within_block_stays_put() {
        let lock = region_lock(1 << 16);

        unsafe {
            let layout = Layout::from_size_align(20, 4).unwrap();
            let ptr = lock.alloc(layout);
            // a 20 byte request gets a 48 byte block, 32 usable
            assert_eq!(lock.realloc(ptr, layout, 32), ptr);
            assert_ne!(lock.realloc(ptr, layout, 33), ptr);
        }
    }

    #[test]
    fn allocator_api() {
        let lock = region_lock(1 << 20);

        let mut vec = allocator_api2::vec::Vec::new_in(&lock);
        for i in 0..10_000u32 {
            vec.push(i);
        }
        assert!(vec.iter().copied().eq(0..10_000));

        vec.truncate(10);
        vec.shrink_to_fit();
        assert_eq!(vec.len(), 10);
        drop(vec);

        assert!(Allocator::allocate(&lock, Layout::from_size_align(0, 8).unwrap()).is_ok());
        assert!(Allocator::allocate(&lock, Layout::from_size_align(64, 64).unwrap()).is_err());

        let heap = lock.lock();
        assert!(heap.validate_heap(line!()));
        assert!(heap.blocks().all(|(_, view)| view.is_free()));
    }

    #[test]
    fn shared_between_threads() {
        let lock = region_lock(4 << 20);

        std::thread::scope(|scope| {
            for t in 0..4u8 {
                let lock = &lock;
                scope.spawn(move || {
                    let mut held = Vec::new();
                    for i in 0..500 {
                        let addr = lock.allocate(16 + i % 300).unwrap();
                        lock.lock().payload_mut(addr)[0] = t;
                        held.push(addr);

                        if i % 3 == 0 {
                            let addr = held.swap_remove(i % held.len());
                            assert_eq!(lock.lock().payload(addr)[0], t);
                            lock.release(addr);
                        }
                    }
                    for addr in held {
                        lock.release(addr);
                    }
                });
            }
        });

        let heap = lock.into_inner();
        assert!(heap.validate_heap(line!()));
        assert!(heap.blocks().all(|(_, view)| view.is_free()));
    }
}
