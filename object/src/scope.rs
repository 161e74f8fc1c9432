use crate::header::{words_for_bytes, HeapFormat, HeapHeader};
use crate::ValBox;

/// Common prefix of every hash-backed object: an ordered delegate list
/// for prototype-style lookup plus a property dictionary.
///
/// ```text
/// [HeapHeader 8B] [delegates: BoxArray ref] [dict: PropertyDict ref]
/// ```
///
/// Formats sharing this prefix: `CallScope`, `ModuleScope`,
/// `GlobalScope`, and `FunctionObject` (which appends its own fields).
#[repr(C)]
pub struct HashObject {
    pub header: HeapHeader,
    pub delegates: ValBox,
    pub dict: ValBox,
}

const _: () = assert!(size_of::<HashObject>() == 24);

/// Formats that participate in property lookup.
#[inline(always)]
pub const fn is_hash_object_format(format: HeapFormat) -> bool {
    matches!(
        format,
        HeapFormat::CallScope
            | HeapFormat::ModuleScope
            | HeapFormat::GlobalScope
            | HeapFormat::FunctionObject
    )
}

/// Scope-object formats (function activations, modules, the global).
#[inline(always)]
pub const fn is_scope_format(format: HeapFormat) -> bool {
    matches!(
        format,
        HeapFormat::CallScope | HeapFormat::ModuleScope | HeapFormat::GlobalScope
    )
}

/// Initialize a hash-object prefix at a raw allocation. Used for the
/// three scope formats; function objects write their own layout.
///
/// # Safety
///
/// `ptr` must point to at least `size_of::<HashObject>()` bytes of
/// writable memory; `delegates` and `dict` must be valid references.
pub unsafe fn init_hash_object(
    ptr: *mut HashObject,
    format: HeapFormat,
    delegates: ValBox,
    dict: ValBox,
) {
    debug_assert!(is_scope_format(format));
    ptr.write(HashObject {
        header: HeapHeader::new(format, words_for_bytes(size_of::<HashObject>())),
        delegates,
        dict,
    });
}
