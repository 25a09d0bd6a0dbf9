use bintag::{Addr, BlockView, Heap, HeapConfig, Region, Source, VecSource, ALIGNMENT, MIN_BLOCK_SIZE};

fn heap() -> Heap<VecSource> {
    let _ = env_logger::builder().is_test(true).try_init();
    Heap::new(VecSource::new()).unwrap()
}

fn is_free(heap: &Heap<VecSource>, addr: Addr) -> bool {
    heap.blocks().any(|(a, view)| a == addr && view.is_free())
}

#[test]
fn allocate_zero_is_none() {
    let mut heap = heap();
    let size = heap.source().heap_size();

    assert_eq!(heap.allocate(0), None);
    assert_eq!(heap.source().heap_size(), size);
}

#[test]
fn payloads_are_aligned_and_disjoint() {
    let mut heap = heap();

    let addrs = (1..200).map(|i| heap.allocate(i * 7).unwrap()).collect::<Vec<_>>();

    for &addr in &addrs {
        assert_eq!(addr.get() % ALIGNMENT, 0);
    }

    let mut spans = addrs.iter().map(|&a| (a.get(), a.get() + heap.usable_size(a))).collect::<Vec<_>>();
    spans.sort();
    for pair in spans.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
    }

    assert!(heap.validate_heap(line!()));
}

#[test]
fn reallocate_none_allocates() {
    let mut a = heap();
    let mut b = heap();

    assert_eq!(a.reallocate(None, 300), b.allocate(300));
    assert_eq!(a.source().heap_size(), b.source().heap_size());
}

#[test]
fn reallocate_to_zero_releases() {
    let mut heap = heap();
    let addr = heap.allocate(100).unwrap();
    let _guard = heap.allocate(100).unwrap();

    assert_eq!(heap.reallocate(Some(addr), 0), None);
    assert!(is_free(&heap, addr));
}

#[test]
fn reallocate_preserves_contents() {
    let mut heap = heap();

    let addr = heap.allocate(50).unwrap();
    for (i, byte) in heap.payload_mut(addr)[..50].iter_mut().enumerate() {
        *byte = i as u8;
    }

    let addr = heap.reallocate(Some(addr), 5000).unwrap();
    assert!(heap.payload(addr)[..50].iter().enumerate().all(|(i, &b)| b == i as u8));

    let addr = heap.reallocate(Some(addr), 20).unwrap();
    assert!(heap.payload(addr)[..20].iter().enumerate().all(|(i, &b)| b == i as u8));

    assert!(heap.validate_heap(line!()));
}

#[test]
fn alloc_release_alloc_does_not_grow() {
    let mut heap = heap();
    let size = heap.source().heap_size();

    let a = heap.allocate(16).unwrap();
    heap.release(a);
    let b = heap.allocate(16).unwrap();

    assert_eq!(a, b);
    assert_eq!(heap.source().heap_size(), size);
}

#[test]
fn neighbours_coalesce() {
    let mut heap = heap();

    let a = heap.allocate(40).unwrap();
    let b = heap.allocate(40).unwrap();
    let _c = heap.allocate(40).unwrap();

    heap.release(a);
    heap.release(b);

    let (addr, view) = heap.blocks().next().unwrap();
    assert_eq!(addr, a);
    assert!(matches!(view, BlockView::Free { size: 128, .. }));

    // no two free blocks are ever adjacent
    let views = heap.blocks().map(|(_, v)| v).collect::<Vec<_>>();
    assert!(views.windows(2).all(|w| !(w[0].is_free() && w[1].is_free())));
}

#[test]
fn oversize_request_grows_exactly_once() {
    let mut heap = heap();
    let size = heap.source().heap_size();

    let addr = heap.allocate(1 << 20).unwrap();

    // the trailing free block is merged in, so the growth is the aligned request
    assert_eq!(heap.source().heap_size(), size + (1 << 20) + 16);
    assert!(heap.usable_size(addr) >= 1 << 20);
    assert!(heap.validate_heap(line!()));
}

#[test]
fn exhaustion_is_recoverable() {
    let mut heap = Heap::new(VecSource::with_max_heap(256 << 10)).unwrap();

    let mut addrs = vec![];
    while let Some(addr) = heap.allocate(10_000) {
        addrs.push(addr);
    }
    assert!(!addrs.is_empty());
    assert!(heap.source().heap_size() <= 256 << 10);
    assert!(heap.validate_heap(line!()));

    for addr in addrs.drain(..) {
        heap.release(addr);
    }
    assert_eq!(heap.blocks().count(), 1);
    assert!(heap.allocate(100_000).is_some());
}

#[test]
fn multiple_heaps_are_independent() {
    let mut a = heap();
    let mut b = heap();

    let x = a.allocate(64).unwrap();
    a.payload_mut(x).fill(1);

    let y = b.allocate(64).unwrap();
    b.payload_mut(y).fill(2);

    assert_eq!(x, y);
    assert!(a.payload(x).iter().all(|&byte| byte == 1));
    assert!(b.payload(y).iter().all(|&byte| byte == 2));
}

#[test]
fn custom_growth_size() {
    let config = HeapConfig::default().with_growth_size(1000);
    let mut heap = Heap::with_config(VecSource::new(), config).unwrap();

    assert_eq!(heap.source().heap_size(), 32 + 1008);

    // 1024 needed: grows by that much, merging with the 1008 free bytes
    let _ = heap.allocate(1000).unwrap();
    assert_eq!(heap.source().heap_size(), 32 + 1008 + 1024);

    // served from the 1008 left over
    let _ = heap.allocate(16).unwrap();
    assert_eq!(heap.source().heap_size(), 32 + 1008 + 1024);
}

#[test]
fn usable_size_is_at_least_requested() {
    let mut heap = heap();

    for size in 1..=512 {
        let addr = heap.allocate(size).unwrap();
        let usable = heap.usable_size(addr);

        assert!(usable >= size);
        assert!(usable + 16 >= MIN_BLOCK_SIZE);
        assert!(usable < size.max(16) + MIN_BLOCK_SIZE + ALIGNMENT);
        heap.release(addr);
    }
}

#[test]
fn static_region() {
    static mut ARENA: [u8; 128 << 10] = [0; 128 << 10];

    let region = unsafe { Region::array(core::ptr::addr_of_mut!(ARENA)) };
    let mut heap = Heap::new(region).unwrap();

    let a = heap.zero_allocate(100, 100).unwrap();
    assert!(heap.payload(a)[..10_000].iter().all(|&b| b == 0));

    assert!(heap.allocate(200 << 10).is_none());
    heap.release(a);
    assert!(heap.validate_heap(line!()));
}

#[test]
fn tiny_growth_sizes() {
    for growth in [0, 1, 16, 17, 31, 32, 48] {
        let config = HeapConfig::default().with_growth_size(growth);
        let mut heap = Heap::with_config(VecSource::new(), config).unwrap();
        assert!(heap.validate_heap(line!()), "growth {}", growth);

        let mut addrs = vec![];
        for size in [1, 16, 17, 100, 33, 5000] {
            addrs.push(heap.allocate(size).unwrap());
            assert!(heap.validate_heap(line!()), "growth {} size {}", growth, size);
        }

        for addr in addrs.into_iter().rev() {
            heap.release(addr);
            assert!(heap.validate_heap(line!()), "growth {}", growth);
        }

        assert_eq!(heap.blocks().count(), 1);
    }
}

#[test]
fn huge_requests_fail_cleanly() {
    let mut heap = heap();
    let size = heap.source().heap_size();

    assert_eq!(heap.allocate(usize::MAX), None);
    assert_eq!(heap.allocate(usize::MAX - 31), None);
    assert_eq!(heap.zero_allocate(usize::MAX, 2), None);
    assert_eq!(heap.source().heap_size(), size);

    let addr = heap.allocate(64).unwrap();
    assert_eq!(heap.reallocate(Some(addr), usize::MAX), None);
    assert!(!is_free(&heap, addr));
    assert!(heap.validate_heap(line!()));
}

#[test]
fn ceiling_is_reusable_after_exhaustion() {
    let config = HeapConfig::default().with_growth_size(1024);
    let mut heap = Heap::with_config(VecSource::with_max_heap(4096), config).unwrap();

    let mut addrs = vec![];
    while let Some(addr) = heap.allocate(100) {
        addrs.push(addr);
    }
    let count = addrs.len();
    assert!(heap.source().heap_size() <= 4096);
    assert!(heap.validate_heap(line!()));

    for addr in addrs.drain(..) {
        heap.release(addr);
    }

    let size = heap.source().heap_size();
    while let Some(addr) = heap.allocate(100) {
        addrs.push(addr);
    }
    assert!(addrs.len() >= count);
    assert!(heap.source().heap_size() <= 4096);
    assert!(heap.validate_heap(line!()));
    assert!(size <= heap.source().heap_size());
}
