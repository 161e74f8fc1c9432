//! Generational copying collector over slab-allocated memory.
//!
//! The heap is decoupled from any specific object model. Consumers
//! provide:
//! - A [`TraceFn`] to enumerate the `ValBox` edges of a heap object.
//! - A [`RootProvider`] to supply live roots at collection time.
//!
//! Three generations in allocation-age order: hatchery (new objects),
//! nursery (survived one collection), tenured (long-lived). A minor
//! cycle copies hatchery survivors into the nursery; a major cycle
//! additionally promotes nursery survivors into tenured slabs.
//! Relocation leaves a forwarding pointer in the first payload word of
//! the old copy, with the forwarded bit set in its header.

use std::ptr::NonNull;

use object::{Generation, HeaderFlags, HeapHeader, ValBox};

use crate::slab::{align_alloc, Slab, SlabList};

/// Function that visits every heap-valued field of a heap object.
///
/// Given a pointer to an object (whose first word is a
/// [`HeapHeader`]), the function must call `visitor` for every
/// [`ValBox`] field that may be a heap reference. The visitor may
/// rewrite the slot in place (relocation).
///
/// # Safety
///
/// `obj` must point to a valid, live heap object with a valid header.
pub type TraceFn = unsafe fn(obj: *mut u8, visitor: &mut dyn FnMut(&mut ValBox));

/// Consumers implement this to provide GC roots.
pub trait RootProvider {
    /// Visit every root slot. The visitor may rewrite slots in place
    /// during relocation.
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ValBox));

    /// Called after the copy phase with a resolver that maps a weakly
    /// held value to its surviving location, or `None` if its referent
    /// was collected. Weak holders drop dead entries here; the
    /// transition is observable before the next user-visible step.
    fn sweep_weak(&mut self, _resolver: &mut dyn FnMut(ValBox) -> Option<ValBox>) {}
}

#[derive(Debug)]
pub struct HeapSettings {
    /// Region size of a standard slab. Must be a multiple of the card
    /// size.
    pub standard_slab_size: usize,
    /// Objects larger than this get a singleton slab.
    pub standard_max_object_size: usize,
    /// Hatchery slabs allowed before allocation triggers a collection.
    pub hatchery_slab_budget: usize,
    /// Consecutive minor cycles before a major cycle is forced.
    pub max_minor_before_major: u32,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            standard_slab_size: 64 * 1024,
            standard_max_object_size: 8 * 1024,
            hatchery_slab_budget: 8,
            max_minor_before_major: 8,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HeapStats {
    pub minor_collections: u64,
    pub major_collections: u64,
    pub objects_copied: u64,
    pub bytes_copied: u64,
    pub singletons_allocated: u64,
}

pub struct Heap {
    settings: HeapSettings,
    trace_fn: TraceFn,
    hatchery: SlabList,
    nursery: SlabList,
    tenured: SlabList,
    singletons: SlabList,
    /// Old-generation objects holding young references, recorded by
    /// the write barrier, deduplicated through the header bit.
    remembered: Vec<*mut u8>,
    minors_since_major: u32,
    stats: HeapStats,
}

impl Heap {
    /// Construction maps no memory; the first hatchery slab is pushed
    /// lazily by [`allocate`](Self::allocate).
    pub fn new(settings: HeapSettings, trace_fn: TraceFn) -> Self {
        Self {
            settings,
            trace_fn,
            hatchery: SlabList::new(),
            nursery: SlabList::new(),
            tenured: SlabList::new(),
            singletons: SlabList::new(),
            remembered: Vec::new(),
            minors_since_major: 0,
            stats: HeapStats::default(),
        }
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    // ── Allocation ─────────────────────────────────────────────────

    /// Allocate `size` bytes in the hatchery. `traced` objects come
    /// from the head of the slab, leaf objects from the tail. Returns
    /// `None` only when the system is out of memory.
    ///
    /// May run a collection; every value the caller still needs must be
    /// reachable from `roots`.
    pub fn allocate(
        &mut self,
        size: usize,
        traced: bool,
        roots: &mut dyn RootProvider,
    ) -> Option<NonNull<u8>> {
        let size = align_alloc(size);
        if size > self.settings.standard_max_object_size {
            return self.allocate_singleton(size);
        }

        if let Some(ptr) = self.try_allocate_hatchery(size, traced) {
            return NonNull::new(ptr);
        }
        if self.hatchery.len() < self.settings.hatchery_slab_budget {
            self.push_slab(Generation::Hatchery)?;
            return NonNull::new(self.try_allocate_hatchery(size, traced)?);
        }

        self.collect(roots);

        if let Some(ptr) = self.try_allocate_hatchery(size, traced) {
            return NonNull::new(ptr);
        }
        self.push_slab(Generation::Hatchery)?;
        NonNull::new(self.try_allocate_hatchery(size, traced)?)
    }

    fn try_allocate_hatchery(&mut self, size: usize, traced: bool) -> Option<*mut u8> {
        for slab in self.hatchery.iter() {
            let slab = unsafe { &mut *slab };
            let ptr = if traced {
                slab.allocate_head(size)
            } else {
                slab.allocate_tail(size)
            };
            if ptr.is_some() {
                return ptr;
            }
        }
        None
    }

    fn allocate_singleton(&mut self, size: usize) -> Option<NonNull<u8>> {
        let slab = Slab::allocate_singleton(size, Generation::Hatchery)?;
        unsafe {
            let ptr = (*slab).allocate_head(size)?;
            (*slab).resident = ptr;
            self.singletons.push(slab);
            self.stats.singletons_allocated += 1;
            NonNull::new(ptr)
        }
    }

    /// Map and link a fresh standard slab; `None` when the system is
    /// out of memory.
    fn push_slab(&mut self, generation: Generation) -> Option<()> {
        let slab =
            Slab::allocate_standard(self.settings.standard_slab_size, generation)?;
        unsafe {
            match generation {
                Generation::Hatchery => self.hatchery.push(slab),
                Generation::Nursery => self.nursery.push(slab),
                Generation::Tenured => self.tenured.push(slab),
            }
        }
        Some(())
    }

    /// Bump into an old generation during a collection. Never triggers
    /// a nested collection; `None` when the copy space cannot be grown.
    fn allocate_in_generation(
        &mut self,
        generation: Generation,
        size: usize,
        traced: bool,
    ) -> Option<*mut u8> {
        debug_assert!(generation != Generation::Hatchery);
        {
            let list = match generation {
                Generation::Nursery => &self.nursery,
                _ => &self.tenured,
            };
            for slab in list.iter() {
                let slab = unsafe { &mut *slab };
                let ptr = if traced {
                    slab.allocate_head(size)
                } else {
                    slab.allocate_tail(size)
                };
                if ptr.is_some() {
                    return ptr;
                }
            }
        }
        // A copy larger than a standard slab can hold gets its own
        // singleton slab in the target generation.
        if size > self.settings.standard_max_object_size {
            let slab = Slab::allocate_singleton(size, generation)?;
            unsafe {
                let ptr = (*slab).allocate_head(size)?;
                (*slab).resident = ptr;
                self.singletons.push(slab);
                self.stats.singletons_allocated += 1;
                return Some(ptr);
            }
        }
        self.push_slab(generation)?;
        let head = match generation {
            Generation::Nursery => self.nursery.head(),
            _ => self.tenured.head(),
        };
        let slab = unsafe { &mut *head };
        if traced {
            slab.allocate_head(size)
        } else {
            slab.allocate_tail(size)
        }
    }

    // ── Write barrier ──────────────────────────────────────────────

    /// Record a heap-field write into an already-allocated object so
    /// old-to-young references survive the next minor cycle. Cheap
    /// no-op for hatchery containers.
    pub fn record_write(&mut self, container: *mut u8) {
        let header = unsafe { &mut *(container as *mut HeapHeader) };
        if header.generation() == Generation::Hatchery {
            return;
        }
        if header.is_remembered() {
            return;
        }
        header.set_remembered();
        self.remembered.push(container);
    }

    // ── Collection ─────────────────────────────────────────────────

    /// Run a collection cycle; minor unless the minor budget since the
    /// last major cycle is exhausted.
    pub fn collect(&mut self, roots: &mut dyn RootProvider) {
        if self.minors_since_major >= self.settings.max_minor_before_major {
            self.collect_major(roots);
        } else {
            self.collect_minor(roots);
        }
    }

    /// Copy hatchery survivors into the nursery.
    pub fn collect_minor(&mut self, roots: &mut dyn RootProvider) {
        self.run_cycle(roots, Generation::Hatchery);
        self.minors_since_major += 1;
        self.stats.minor_collections += 1;
    }

    /// Copy hatchery survivors into the nursery and promote nursery
    /// survivors into tenured slabs.
    pub fn collect_major(&mut self, roots: &mut dyn RootProvider) {
        self.run_cycle(roots, Generation::Nursery);
        self.minors_since_major = 0;
        self.stats.major_collections += 1;
    }

    fn run_cycle(&mut self, roots: &mut dyn RootProvider, up_to: Generation) {
        let trace_fn = self.trace_fn;
        let major = up_to >= Generation::Nursery;
        let mut worklist: Vec<*mut u8> = Vec::new();
        let mut visited_old: Vec<*mut u8> = Vec::new();

        // Remembered set. For a minor cycle the recorded old objects
        // are extra roots; for a major cycle the root traversal reaches
        // every live old object itself.
        let remembered = core::mem::take(&mut self.remembered);
        for &obj in &remembered {
            unsafe { (*(obj as *mut HeapHeader)).clear_remembered() };
        }

        roots.visit_roots(&mut |slot| {
            self.forward_value(slot, up_to, major, &mut worklist, &mut visited_old);
        });

        if !major {
            for obj in remembered {
                unsafe {
                    trace_fn(obj, &mut |slot| {
                        self.forward_value(
                            slot,
                            up_to,
                            major,
                            &mut worklist,
                            &mut visited_old,
                        );
                    });
                }
            }
        }

        while let Some(obj) = worklist.pop() {
            unsafe {
                trace_fn(obj, &mut |slot| {
                    self.forward_value(
                        slot,
                        up_to,
                        major,
                        &mut worklist,
                        &mut visited_old,
                    );
                });
            }
        }

        // Weak holders observe death now, before the spaces are freed.
        roots.sweep_weak(&mut |value| Self::resolve_weak(value, up_to));

        for obj in visited_old {
            unsafe { (*(obj as *mut HeapHeader)).clear_marked() };
        }

        self.release_collected(up_to);
    }

    fn forward_value(
        &mut self,
        slot: &mut ValBox,
        up_to: Generation,
        major: bool,
        worklist: &mut Vec<*mut u8>,
        visited_old: &mut Vec<*mut u8>,
    ) {
        if !slot.is_ref() {
            return;
        }
        let ptr = slot.ref_bits() as *mut u8;
        let header = unsafe { &mut *(ptr as *mut HeapHeader) };
        let generation = header.generation();

        if generation > up_to {
            // Old object. A major cycle still traverses it to rewrite
            // its edges into the moving generations.
            if major && !header.is_marked() {
                header.set_marked();
                visited_old.push(ptr);
                if !header.format().is_leaf() {
                    worklist.push(ptr);
                }
            }
            return;
        }

        if header.is_forwarded() {
            let new_ptr = unsafe { *(ptr.add(8) as *const *mut u8) };
            *slot = slot.with_ptr(new_ptr);
            return;
        }

        if header.has_flag(HeaderFlags::SINGLETON) || self.in_singleton(ptr) {
            // Singleton residents are promoted in place; the slab is
            // relabeled after the cycle. The flag is a sticky cache of
            // the slab-list membership test: residents never move, so
            // once set it stays correct.
            header.add_flag(HeaderFlags::SINGLETON);
            header.set_generation(generation.next());
            if !header.format().is_leaf() {
                worklist.push(ptr);
            }
            return;
        }

        let size = header.size_in_bytes();
        let traced = !header.format().is_leaf();
        let target = generation.next();
        let Some(new_ptr) = self.allocate_in_generation(target, align_alloc(size), traced)
        else {
            // The copy space cannot be grown. Keep the object where it
            // is: its whole slab is relabeled into a surviving list, so
            // the memory stays valid, and dead neighbours leak until a
            // later cycle collects the slab's new generation.
            self.retain_slab_of(ptr, major);
            header.set_generation(target);
            if traced {
                worklist.push(ptr);
            }
            return;
        };
        unsafe {
            core::ptr::copy_nonoverlapping(ptr, new_ptr, size);
            let new_header = &mut *(new_ptr as *mut HeapHeader);
            new_header.set_generation(target);
            new_header.clear_remembered();
            header.set_forwarded();
            *(ptr.add(8) as *mut *mut u8) = new_ptr;
        }
        self.stats.objects_copied += 1;
        self.stats.bytes_copied += size as u64;
        *slot = slot.with_ptr(new_ptr);
        if traced {
            worklist.push(new_ptr);
        }
    }

    /// Unlink the standard slab containing `ptr` from its collected
    /// list and relink it into a list that survives this cycle: the
    /// nursery for a minor cycle, the tenured list for a major one
    /// (whose nursery is itself being emptied).
    fn retain_slab_of(&mut self, ptr: *const u8, major: bool) {
        unsafe {
            let mut cursor = self.hatchery.head();
            while !cursor.is_null() {
                if (*cursor).contains(ptr) {
                    self.hatchery.unlink(cursor);
                    if major {
                        (*cursor).generation = Generation::Tenured;
                        self.tenured.push(cursor);
                    } else {
                        (*cursor).generation = Generation::Nursery;
                        self.nursery.push(cursor);
                    }
                    return;
                }
                cursor = (*cursor).next;
            }
            let mut cursor = self.nursery.head();
            while !cursor.is_null() {
                if (*cursor).contains(ptr) {
                    debug_assert!(major);
                    self.nursery.unlink(cursor);
                    (*cursor).generation = Generation::Tenured;
                    self.tenured.push(cursor);
                    return;
                }
                cursor = (*cursor).next;
            }
            // Already retained by an earlier failure in this cycle.
        }
    }

    fn resolve_weak(value: ValBox, up_to: Generation) -> Option<ValBox> {
        if !value.is_ref() {
            return Some(value);
        }
        let ptr = value.ref_bits() as *mut u8;
        let header = unsafe { &*(ptr as *const HeapHeader) };
        if header.is_forwarded() {
            let new_ptr = unsafe { *(ptr.add(8) as *const *mut u8) };
            return Some(value.with_ptr(new_ptr));
        }
        if header.generation() > up_to {
            // Survived in place: an old object, or a singleton resident
            // whose generation was advanced by the cycle.
            return Some(value);
        }
        None
    }

    fn in_singleton(&self, ptr: *const u8) -> bool {
        self.singletons
            .iter()
            .any(|slab| unsafe { (*slab).contains(ptr) })
    }

    fn release_collected(&mut self, up_to: Generation) {
        unsafe {
            self.hatchery.destroy_all();
            if up_to >= Generation::Nursery {
                self.nursery.destroy_all();
            }

            // Singleton slabs: relabel survivors, free dead residents.
            let mut cursor = self.singletons.head();
            while !cursor.is_null() {
                let next = (*cursor).next;
                let header = &*((*cursor).resident as *const HeapHeader);
                if header.generation() <= up_to {
                    self.singletons.unlink(cursor);
                    Slab::destroy(cursor);
                } else {
                    (*cursor).generation = header.generation();
                }
                cursor = next;
            }
        }
        // The next hatchery slab is mapped lazily by `allocate`.
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        unsafe {
            self.hatchery.destroy_all();
            self.nursery.destroy_all();
            self.tenured.destroy_all();
            self.singletons.destroy_all();
        }
    }
}
