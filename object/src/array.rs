use crate::header::{words_for_bytes, HeapFormat, HeapHeader};
use crate::ValBox;

// ── U32Array ───────────────────────────────────────────────────────

/// A variable-length array of raw `u32` words (the packed syntax text).
///
/// ```text
/// [HeapHeader 8B] [length: u64 8B] [word_0: u32] [word_1: u32] ...
/// ```
///
/// Leaf format.
#[repr(C)]
pub struct U32Array {
    pub header: HeapHeader,
    length: u64,
}

const _: () = assert!(size_of::<U32Array>() == 16);

impl U32Array {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.length as usize
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// # Safety
    ///
    /// The inline memory after this struct must contain `len()` words.
    #[inline(always)]
    pub unsafe fn words(&self) -> &[u32] {
        let ptr = (self as *const U32Array).add(1) as *const u32;
        core::slice::from_raw_parts(ptr, self.length as usize)
    }
}

pub const fn u32_array_allocation_size(len: usize) -> usize {
    size_of::<U32Array>() + len * size_of::<u32>()
}

/// # Safety
///
/// `ptr` must point to at least `u32_array_allocation_size(len)` bytes
/// of writable memory.
pub unsafe fn init_u32_array(ptr: *mut U32Array, len: usize) {
    ptr.write(U32Array {
        header: HeapHeader::new(
            HeapFormat::U32Array,
            words_for_bytes(u32_array_allocation_size(len)),
        ),
        length: len as u64,
    });
}

// ── BoxArray ───────────────────────────────────────────────────────

/// A variable-length array of tagged values.
///
/// ```text
/// [HeapHeader 8B] [length: u64 8B] [elem_0 8B] [elem_1 8B] ...
/// ```
#[repr(C)]
pub struct BoxArray {
    pub header: HeapHeader,
    length: u64,
}

const _: () = assert!(size_of::<BoxArray>() == 16);

impl BoxArray {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.length as usize
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// # Safety
    ///
    /// The inline memory after this struct must contain `len()` valid
    /// elements.
    #[inline(always)]
    pub unsafe fn elements(&self) -> &[ValBox] {
        let ptr = (self as *const BoxArray).add(1) as *const ValBox;
        core::slice::from_raw_parts(ptr, self.length as usize)
    }

    /// # Safety
    ///
    /// `index < len()` and the inline memory must be valid.
    #[inline(always)]
    pub unsafe fn at(&self, index: usize) -> ValBox {
        debug_assert!(index < self.len());
        let ptr = (self as *const BoxArray).add(1) as *const ValBox;
        *ptr.add(index)
    }

    /// Raw write without a barrier; the caller is responsible for
    /// recording the write when the array is outside the hatchery.
    ///
    /// # Safety
    ///
    /// `index < len()` and the inline memory must be valid.
    #[inline(always)]
    pub unsafe fn set(&mut self, index: usize, value: ValBox) {
        debug_assert!(index < self.len());
        let ptr = (self as *mut BoxArray).add(1) as *mut ValBox;
        *ptr.add(index) = value;
    }
}

pub const fn box_array_allocation_size(len: usize) -> usize {
    size_of::<BoxArray>() + len * size_of::<ValBox>()
}

/// Initialize a box array with every element `Undefined`.
///
/// # Safety
///
/// `ptr` must point to at least `box_array_allocation_size(len)` bytes
/// of writable memory.
pub unsafe fn init_box_array(ptr: *mut BoxArray, len: usize) {
    ptr.write(BoxArray {
        header: HeapHeader::new(
            HeapFormat::BoxArray,
            words_for_bytes(box_array_allocation_size(len)),
        ),
        length: len as u64,
    });
    let elems = ptr.add(1) as *mut ValBox;
    for i in 0..len {
        *elems.add(i) = ValBox::undefined();
    }
}

// ── PackedSyntaxTree ───────────────────────────────────────────────

/// The compact read-only AST: a `U32Array` of node words plus a
/// `BoxArray` of constants (identifier strings).
#[repr(C)]
pub struct PackedSyntaxTree {
    pub header: HeapHeader,
    pub data: ValBox,
    pub constants: ValBox,
}

const _: () = assert!(size_of::<PackedSyntaxTree>() == 24);

impl PackedSyntaxTree {
    /// # Safety
    ///
    /// `data` must reference a valid, live [`U32Array`].
    #[inline(always)]
    pub unsafe fn words(&self) -> &[u32] {
        self.data.as_ref::<U32Array>().words()
    }

    /// # Safety
    ///
    /// `constants` must reference a valid, live [`BoxArray`] and `cid`
    /// must be in bounds.
    #[inline(always)]
    pub unsafe fn constant(&self, cid: u32) -> ValBox {
        self.constants.as_ref::<BoxArray>().at(cid as usize)
    }
}

/// # Safety
///
/// `ptr` must point to at least `size_of::<PackedSyntaxTree>()` bytes;
/// `data` and `constants` must be valid tagged references.
pub unsafe fn init_packed_syntax_tree(
    ptr: *mut PackedSyntaxTree,
    data: ValBox,
    constants: ValBox,
) {
    ptr.write(PackedSyntaxTree {
        header: HeapHeader::new(
            HeapFormat::PackedSyntaxTree,
            words_for_bytes(size_of::<PackedSyntaxTree>()),
        ),
        data,
        constants,
    });
}
