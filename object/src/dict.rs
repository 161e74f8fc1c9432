use crate::header::{words_for_bytes, HeapFormat, HeapHeader};
use crate::string::{string_eq, string_hash};
use crate::ValBox;

/// Descriptor kinds, stored in the low bits of an entry's `meta` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DescriptorKind {
    Empty = 0,
    Value = 1,
    Method = 2,
    Accessor = 3,
}

const KIND_MASK: u64 = 0b11;
const WRITABLE_BIT: u64 = 1 << 2;

/// A property binding: a plain value (optionally read-only), a method
/// (reified into a bound function object on read), or a getter/setter
/// pair.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDescriptor {
    pub kind: DescriptorKind,
    pub writable: bool,
    /// Value / method function / getter.
    pub value: ValBox,
    /// Accessor setter; `Undefined` otherwise.
    pub aux: ValBox,
}

impl PropertyDescriptor {
    pub fn make_slot(value: ValBox, writable: bool) -> Self {
        Self {
            kind: DescriptorKind::Value,
            writable,
            value,
            aux: ValBox::undefined(),
        }
    }

    pub fn method(func: ValBox) -> Self {
        Self {
            kind: DescriptorKind::Method,
            writable: true,
            value: func,
            aux: ValBox::undefined(),
        }
    }

    pub fn accessor(getter: ValBox, setter: ValBox) -> Self {
        Self {
            kind: DescriptorKind::Accessor,
            writable: true,
            value: getter,
            aux: setter,
        }
    }

    pub fn is_value(&self) -> bool {
        self.kind == DescriptorKind::Value
    }

    pub fn is_method(&self) -> bool {
        self.kind == DescriptorKind::Method
    }

    fn meta(&self) -> u64 {
        self.kind as u8 as u64 | if self.writable { WRITABLE_BIT } else { 0 }
    }

    fn from_entry(entry: &DictEntry) -> Self {
        Self {
            kind: match entry.meta & KIND_MASK {
                1 => DescriptorKind::Value,
                2 => DescriptorKind::Method,
                3 => DescriptorKind::Accessor,
                _ => DescriptorKind::Empty,
            },
            writable: entry.meta & WRITABLE_BIT != 0,
            value: entry.value,
            aux: entry.aux,
        }
    }
}

/// One open-addressed table entry. `name.raw() == 0` marks an empty
/// entry; there is no deletion, so no tombstones.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct DictEntry {
    pub name: ValBox,
    pub meta: u64,
    pub value: ValBox,
    pub aux: ValBox,
}

const _: () = assert!(size_of::<DictEntry>() == 32);

/// A hash-backed property dictionary.
///
/// ```text
/// [HeapHeader 8B] [capacity: u32; used: u32] [DictEntry_0 32B] ...
/// ```
///
/// Capacity is a power of two; probing is linear. The owner replaces
/// the dictionary with a doubled copy when insertion reports the table
/// as past its load limit.
#[repr(C)]
pub struct PropertyDict {
    pub header: HeapHeader,
    capacity: u32,
    used: u32,
}

const _: () = assert!(size_of::<PropertyDict>() == 16);

/// Outcome of [`dict_insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Done,
    /// Past the ¾ load limit; the owner must grow and retry.
    NeedsGrow,
}

impl PropertyDict {
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    #[inline(always)]
    pub fn used(&self) -> usize {
        self.used as usize
    }

    #[inline(always)]
    fn entries_ptr(&self) -> *const DictEntry {
        unsafe { (self as *const PropertyDict).add(1) as *const DictEntry }
    }

    /// # Safety
    ///
    /// The inline memory after this struct must contain `capacity`
    /// valid entries.
    #[inline(always)]
    pub unsafe fn entries(&self) -> &[DictEntry] {
        core::slice::from_raw_parts(self.entries_ptr(), self.capacity as usize)
    }
}

pub const fn dict_allocation_size(capacity: usize) -> usize {
    size_of::<PropertyDict>() + capacity * size_of::<DictEntry>()
}

/// # Safety
///
/// `ptr` must point to at least `dict_allocation_size(capacity)` bytes
/// of writable memory; `capacity` must be a power of two.
pub unsafe fn init_property_dict(ptr: *mut PropertyDict, capacity: usize) {
    debug_assert!(capacity.is_power_of_two());
    ptr.write(PropertyDict {
        header: HeapHeader::new(
            HeapFormat::PropertyDict,
            words_for_bytes(dict_allocation_size(capacity)),
        ),
        capacity: capacity as u32,
        used: 0,
    });
    let entries = ptr.add(1) as *mut DictEntry;
    for i in 0..capacity {
        *entries.add(i) = DictEntry {
            name: ValBox::from_raw(0),
            meta: 0,
            value: ValBox::undefined(),
            aux: ValBox::undefined(),
        };
    }
}

/// Find `name` in the dictionary.
///
/// # Safety
///
/// The dictionary and every name it contains must be valid and live;
/// `name` must be a string value.
pub unsafe fn dict_lookup(
    dict: &PropertyDict,
    name: ValBox,
    spoiler: u64,
) -> Option<PropertyDescriptor> {
    debug_assert!(name.is_string());
    let cap = dict.capacity();
    if cap == 0 {
        return None;
    }
    let mask = cap - 1;
    let entries = dict.entries();
    let mut idx = string_hash(name, spoiler) as usize & mask;
    for _ in 0..cap {
        let entry = &entries[idx];
        if !entry.name.is_valid() {
            return None;
        }
        if string_eq(entry.name, name) {
            return Some(PropertyDescriptor::from_entry(entry));
        }
        idx = (idx + 1) & mask;
    }
    None
}

/// Reinsert a raw entry into a freshly grown dictionary. The caller
/// guarantees spare capacity and that `entry.name` is not yet present.
///
/// # Safety
///
/// As [`dict_lookup`], with exclusive access to the dictionary.
pub unsafe fn dict_reinsert(dict: &mut PropertyDict, entry: DictEntry, spoiler: u64) {
    debug_assert!(entry.name.is_valid());
    let cap = dict.capacity();
    debug_assert!((dict.used + 1) as usize <= cap);
    let mask = cap - 1;
    let entries = dict.entries_ptr() as *mut DictEntry;
    let mut idx = string_hash(entry.name, spoiler) as usize & mask;
    loop {
        let slot = &mut *entries.add(idx);
        if !slot.name.is_valid() {
            *slot = entry;
            dict.used += 1;
            return;
        }
        idx = (idx + 1) & mask;
    }
}

/// Insert or replace a binding. Replacement never grows; fresh inserts
/// report [`InsertOutcome::NeedsGrow`] past the ¾ load limit.
///
/// The write is raw; the caller records it with the write barrier when
/// the dictionary is outside the hatchery.
///
/// # Safety
///
/// As [`dict_lookup`], with exclusive access to the dictionary.
pub unsafe fn dict_insert(
    dict: &mut PropertyDict,
    name: ValBox,
    descriptor: PropertyDescriptor,
    spoiler: u64,
) -> InsertOutcome {
    debug_assert!(name.is_string());
    let cap = dict.capacity();
    let mask = cap - 1;
    let entries = dict.entries_ptr() as *mut DictEntry;
    let mut idx = string_hash(name, spoiler) as usize & mask;
    loop {
        let entry = &mut *entries.add(idx);
        if !entry.name.is_valid() {
            if (dict.used + 1) as usize * 4 > cap * 3 {
                return InsertOutcome::NeedsGrow;
            }
            *entry = DictEntry {
                name,
                meta: descriptor.meta(),
                value: descriptor.value,
                aux: descriptor.aux,
            };
            dict.used += 1;
            return InsertOutcome::Done;
        }
        if string_eq(entry.name, name) {
            entry.meta = descriptor.meta();
            entry.value = descriptor.value;
            entry.aux = descriptor.aux;
            return InsertOutcome::Done;
        }
        idx = (idx + 1) & mask;
    }
}
