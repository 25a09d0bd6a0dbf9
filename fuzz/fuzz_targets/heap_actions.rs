#![no_main]

use bintag::*;

use libfuzzer_sys::fuzz_target;

use libfuzzer_sys::arbitrary::Arbitrary;

#[derive(Arbitrary, Debug)]
enum Actions {
    /// Allocate `size` bytes
    Allocate { size: u16 },
    /// Allocate `count * elem_size` zeroed bytes
    ZeroAllocate { count: u8, elem_size: u8 },
    /// Release the ith allocation
    Release { index: u8 },
    /// Reallocate the ith allocation
    Reallocate { index: u8, new_size: u16 },
    /// Start over
    Initialize,
}
use Actions::*;

fuzz_target!(|data: (Option<u8>, Vec<Actions>)| {
    let (threshold, actions) = data;

    let config = HeapConfig::default()
        .with_growth_size(4096)
        .with_back_placement_threshold(threshold.map(|t| t as usize * 16));

    let Ok(mut heap) = Heap::with_config(VecSource::with_max_heap(1 << 20), config) else {
        return;
    };

    // (address, requested size, fill byte)
    let mut allocations: Vec<(Addr, usize, u8)> = vec![];

    for (i, action) in actions.into_iter().enumerate() {
        let fill = i as u8;

        match action {
            Allocate { size } => {
                let size = size as usize;

                if let Some(addr) = heap.allocate(size) {
                    heap.payload_mut(addr)[..size].fill(fill);
                    allocations.push((addr, size, fill));
                } else {
                    // only empty requests and exhaustion fail
                    assert!(size == 0 || heap.source().heap_size() + size > (1 << 20) - 4096);
                }
            }
            ZeroAllocate { count, elem_size } => {
                let size = count as usize * elem_size as usize;

                if let Some(addr) = heap.zero_allocate(count as usize, elem_size as usize) {
                    assert!(heap.payload(addr)[..size].iter().all(|&b| b == 0));
                    heap.payload_mut(addr)[..size].fill(fill);
                    allocations.push((addr, size, fill));
                }
            }
            Release { index } => {
                if index as usize >= allocations.len() { continue; }

                let (addr, size, byte) = allocations.swap_remove(index as usize);
                assert!(heap.payload(addr)[..size].iter().all(|&b| b == byte));
                heap.release(addr);
            }
            Reallocate { index, new_size } => {
                if index as usize >= allocations.len() { continue; }

                let (addr, size, byte) = allocations[index as usize];
                let new_size = new_size as usize;

                if new_size == 0 {
                    assert_eq!(heap.reallocate(Some(addr), 0), None);
                    allocations.swap_remove(index as usize);
                    continue;
                }

                if let Some(new_addr) = heap.reallocate(Some(addr), new_size) {
                    let kept = size.min(new_size);
                    assert!(heap.payload(new_addr)[..kept].iter().all(|&b| b == byte));

                    heap.payload_mut(new_addr)[..new_size].fill(fill);
                    allocations[index as usize] = (new_addr, new_size, fill);
                } else {
                    // untouched on failure
                    assert!(heap.payload(addr)[..size].iter().all(|&b| b == byte));
                }
            }
            Initialize => {
                if heap.initialize().is_err() { return; }
                allocations.clear();
            }
        }

        assert!(heap.validate_heap(line!()));
        assert_eq!(heap.counters().allocation_count, allocations.len());
        assert_eq!(heap.counters().overhead_bytes(), 32);
    }

    for (addr, _, _) in allocations {
        heap.release(addr);
    }

    assert!(heap.blocks().all(|(_, view)| view.is_free()));
});
