mod heap;
mod slab;
mod system;

pub use heap::{Heap, HeapSettings, HeapStats, RootProvider, TraceFn};
pub use slab::{align_alloc, Slab, SlabIter, SlabList, ALLOC_ALIGN, CARD_SHIFT, CARD_SIZE};
pub use system::{map_memory, unmap_memory, OS_PAGE_SIZE};

#[cfg(test)]
mod tests {
    use super::*;
    use object::{
        box_array_allocation_size, init_box_array, init_u32_array,
        u32_array_allocation_size, BoxArray, Generation, HeapFormat, HeapHeader,
        U32Array, ValBox,
    };

    /// Minimal tracer: only box arrays carry edges in these tests.
    unsafe fn trace_test_object(obj: *mut u8, visitor: &mut dyn FnMut(&mut ValBox)) {
        let header = &*(obj as *const HeapHeader);
        if header.format() == HeapFormat::BoxArray {
            let arr = &*(obj as *const BoxArray);
            let base = (obj as *mut ValBox).add(2);
            for i in 0..arr.len() {
                visitor(&mut *base.add(i));
            }
        }
    }

    #[derive(Default)]
    struct TestRoots {
        strong: Vec<ValBox>,
        weak: Vec<ValBox>,
    }

    impl RootProvider for TestRoots {
        fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ValBox)) {
            for slot in &mut self.strong {
                visitor(slot);
            }
        }

        fn sweep_weak(&mut self, resolver: &mut dyn FnMut(ValBox) -> Option<ValBox>) {
            self.weak.retain_mut(|slot| match resolver(*slot) {
                Some(updated) => {
                    *slot = updated;
                    true
                }
                None => false,
            });
        }
    }

    fn new_heap() -> Heap {
        Heap::new(HeapSettings::default(), trace_test_object)
    }

    fn alloc_box_array(heap: &mut Heap, roots: &mut TestRoots, len: usize) -> ValBox {
        let size = box_array_allocation_size(len);
        let ptr = heap.allocate(size, true, roots).expect("allocation");
        unsafe { init_box_array(ptr.as_ptr() as *mut BoxArray, len) };
        ValBox::object_ref(ptr.as_ptr())
    }

    fn alloc_u32s(heap: &mut Heap, roots: &mut TestRoots, len: usize) -> ValBox {
        let size = u32_array_allocation_size(len);
        let ptr = heap.allocate(size, false, roots).expect("allocation");
        unsafe { init_u32_array(ptr.as_ptr() as *mut U32Array, len) };
        ValBox::object_ref(ptr.as_ptr())
    }

    unsafe fn generation_of(v: ValBox) -> Generation {
        v.as_ref::<HeapHeader>().generation()
    }

    #[test]
    fn allocation_is_word_aligned() {
        let mut heap = new_heap();
        let mut roots = TestRoots::default();
        for len in [0, 1, 2, 3, 5, 17] {
            let traced = alloc_box_array(&mut heap, &mut roots, len);
            let leaf = alloc_u32s(&mut heap, &mut roots, len);
            assert_eq!(traced.ref_bits() & 0b111, 0);
            assert_eq!(leaf.ref_bits() & 0b111, 0);
        }
    }

    #[test]
    fn minor_collection_relocates_roots_and_edges() {
        let mut heap = new_heap();
        let mut roots = TestRoots::default();

        let inner = alloc_box_array(&mut heap, &mut roots, 1);
        unsafe { inner.as_mut::<BoxArray>().set(0, ValBox::int32(77)) };
        let outer = alloc_box_array(&mut heap, &mut roots, 2);
        unsafe {
            outer.as_mut::<BoxArray>().set(0, inner);
            outer.as_mut::<BoxArray>().set(1, ValBox::int32(5));
        }
        roots.strong.push(outer);

        let old_outer = outer.ref_bits();
        let old_inner = inner.ref_bits();
        heap.collect_minor(&mut roots);

        let outer = roots.strong[0];
        assert_ne!(outer.ref_bits(), old_outer, "outer should move");
        unsafe {
            assert_eq!(generation_of(outer), Generation::Nursery);
            let arr: &BoxArray = outer.as_ref();
            let inner = arr.at(0);
            assert_ne!(inner.ref_bits(), old_inner, "inner should move");
            assert_eq!(generation_of(inner), Generation::Nursery);
            assert_eq!(inner.as_ref::<BoxArray>().at(0).as_int32(), 77);
            assert_eq!(arr.at(1).as_int32(), 5);
        }
    }

    #[test]
    fn garbage_is_not_copied() {
        let mut heap = new_heap();
        let mut roots = TestRoots::default();

        let live = alloc_box_array(&mut heap, &mut roots, 1);
        roots.strong.push(live);
        for _ in 0..16 {
            let _ = alloc_box_array(&mut heap, &mut roots, 8);
        }
        heap.collect_minor(&mut roots);
        assert_eq!(heap.stats().objects_copied, 1);
    }

    #[test]
    fn weak_entries_die_with_their_referents() {
        let mut heap = new_heap();
        let mut roots = TestRoots::default();

        let live = alloc_box_array(&mut heap, &mut roots, 1);
        let dead = alloc_box_array(&mut heap, &mut roots, 1);
        roots.strong.push(live);
        roots.weak.push(live);
        roots.weak.push(dead);

        heap.collect_minor(&mut roots);
        assert_eq!(roots.weak.len(), 1);
        assert_eq!(roots.weak[0].raw(), roots.strong[0].raw());
    }

    #[test]
    fn write_barrier_keeps_old_to_young_edges() {
        let mut heap = new_heap();
        let mut roots = TestRoots::default();

        let holder = alloc_box_array(&mut heap, &mut roots, 1);
        roots.strong.push(holder);
        heap.collect_minor(&mut roots);
        let holder = roots.strong[0];
        unsafe { assert_eq!(generation_of(holder), Generation::Nursery) };

        // Young object referenced only through the old holder.
        let young = alloc_box_array(&mut heap, &mut roots, 1);
        unsafe {
            young.as_mut::<BoxArray>().set(0, ValBox::int32(123));
            holder.as_mut::<BoxArray>().set(0, young);
        }
        heap.record_write(holder.ref_bits() as *mut u8);

        heap.collect_minor(&mut roots);
        let holder = roots.strong[0];
        unsafe {
            let survivor = holder.as_ref::<BoxArray>().at(0);
            assert_eq!(generation_of(survivor), Generation::Nursery);
            assert_eq!(survivor.as_ref::<BoxArray>().at(0).as_int32(), 123);
        }
    }

    #[test]
    fn major_collection_promotes_to_tenured() {
        let mut heap = new_heap();
        let mut roots = TestRoots::default();

        let v = alloc_box_array(&mut heap, &mut roots, 1);
        roots.strong.push(v);
        heap.collect_minor(&mut roots);
        unsafe { assert_eq!(generation_of(roots.strong[0]), Generation::Nursery) };
        heap.collect_major(&mut roots);
        unsafe { assert_eq!(generation_of(roots.strong[0]), Generation::Tenured) };
        // Tenured objects stay put on later cycles.
        let fixed = roots.strong[0].ref_bits();
        heap.collect_major(&mut roots);
        assert_eq!(roots.strong[0].ref_bits(), fixed);
    }

    #[test]
    fn singleton_objects_survive_in_place() {
        let mut heap = new_heap();
        let mut roots = TestRoots::default();

        // Larger than the standard object limit.
        let big = alloc_u32s(&mut heap, &mut roots, 4096);
        roots.strong.push(big);
        let fixed = big.ref_bits();

        heap.collect_minor(&mut roots);
        assert_eq!(roots.strong[0].ref_bits(), fixed);
        unsafe { assert_eq!(generation_of(roots.strong[0]), Generation::Nursery) };

        // Dropped from the roots, the resident dies with its slab.
        roots.strong.clear();
        heap.collect_major(&mut roots);
    }

    #[test]
    fn allocation_triggers_collection_under_pressure() {
        let mut heap = new_heap();
        let mut roots = TestRoots::default();

        let keep = alloc_box_array(&mut heap, &mut roots, 2);
        roots.strong.push(keep);

        // Far more than one hatchery budget's worth of garbage.
        for _ in 0..20_000 {
            let _ = alloc_box_array(&mut heap, &mut roots, 8);
        }
        assert!(heap.stats().minor_collections > 0);
        unsafe {
            let arr: &BoxArray = roots.strong[0].as_ref();
            assert_eq!(arr.len(), 2);
        }
    }
}
