use object::{words_for_bytes, HeapFormat, HeapHeader, ValBox};

// ── SyntaxNode ─────────────────────────────────────────────────────

/// Heap-allocated reference into a packed syntax tree, used whenever a
/// `(pst, offset)` pair must escape into a frame field.
#[repr(C)]
pub struct SyntaxNode {
    pub header: HeapHeader,
    pub pst: ValBox,
    pub offset: u32,
    _pad: u32,
}

const _: () = assert!(size_of::<SyntaxNode>() == 24);

/// Stack-only `(pst, offset)` pair.
#[derive(Debug, Clone, Copy)]
pub struct SyntaxNodeRef {
    pub pst: ValBox,
    pub offset: u32,
}

/// # Safety
///
/// `ptr` must point to at least `size_of::<SyntaxNode>()` writable
/// bytes; `pst` must be a valid tagged reference.
pub unsafe fn init_syntax_node(ptr: *mut SyntaxNode, pst: ValBox, offset: u32) {
    ptr.write(SyntaxNode {
        header: HeapHeader::new(
            HeapFormat::SyntaxNode,
            words_for_bytes(size_of::<SyntaxNode>()),
        ),
        pst,
        offset,
        _pad: 0,
    });
}

// ── Slist ──────────────────────────────────────────────────────────

/// Singly-linked operand list node; `Null` terminates a list.
#[repr(C)]
pub struct SlistNode {
    pub header: HeapHeader,
    pub value: ValBox,
    pub next: ValBox,
}

const _: () = assert!(size_of::<SlistNode>() == 24);

/// # Safety
///
/// `ptr` must point to at least `size_of::<SlistNode>()` writable
/// bytes; `value` and `next` must be valid tagged values.
pub unsafe fn init_slist_node(ptr: *mut SlistNode, value: ValBox, next: ValBox) {
    ptr.write(SlistNode {
        header: HeapHeader::new(
            HeapFormat::SlistNode,
            words_for_bytes(size_of::<SlistNode>()),
        ),
        value,
        next,
    });
}

/// Number of nodes in an operand list.
///
/// # Safety
///
/// Every node in the list must be valid and live.
pub unsafe fn slist_len(mut list: ValBox) -> usize {
    let mut len = 0;
    while list.is_object_ref() {
        len += 1;
        list = list.as_ref::<SlistNode>().next;
    }
    len
}

// ── Exception ──────────────────────────────────────────────────────

/// A raised exception: a static message plus zero or more boxed
/// arguments for context. Exceptions are data, not control constructs.
///
/// ```text
/// [HeapHeader] [msg_ptr] [msg_len] [num_args: u64] [arg_0] [arg_1] ...
/// ```
#[repr(C)]
pub struct Exception {
    pub header: HeapHeader,
    message_ptr: *const u8,
    message_len: usize,
    num_args: u64,
}

const _: () = assert!(size_of::<Exception>() == 32);

impl Exception {
    pub fn message(&self) -> &'static str {
        // SAFETY: constructed from a &'static str in init_exception.
        unsafe {
            core::str::from_utf8_unchecked(core::slice::from_raw_parts(
                self.message_ptr,
                self.message_len,
            ))
        }
    }

    #[inline(always)]
    pub fn num_args(&self) -> usize {
        self.num_args as usize
    }

    /// # Safety
    ///
    /// The inline memory after this struct must contain `num_args()`
    /// valid values.
    #[inline(always)]
    pub unsafe fn args(&self) -> &[ValBox] {
        let ptr = (self as *const Exception).add(1) as *const ValBox;
        core::slice::from_raw_parts(ptr, self.num_args as usize)
    }
}

pub const fn exception_allocation_size(num_args: usize) -> usize {
    size_of::<Exception>() + num_args * size_of::<ValBox>()
}

/// Initialize an exception header; the caller copies the arguments
/// into place afterwards.
///
/// # Safety
///
/// `ptr` must point to at least `exception_allocation_size(num_args)`
/// writable bytes.
pub unsafe fn init_exception(
    ptr: *mut Exception,
    message: &'static str,
    num_args: usize,
) {
    ptr.write(Exception {
        header: HeapHeader::new(
            HeapFormat::Exception,
            words_for_bytes(exception_allocation_size(num_args)),
        ),
        message_ptr: message.as_ptr(),
        message_len: message.len(),
        num_args: num_args as u64,
    });
}

// ── Continuation ───────────────────────────────────────────────────

/// A captured frame offered as a `continue_with` target; `return`
/// long-jumps through the continuation bound under `@retcont`.
#[repr(C)]
pub struct Continuation {
    pub header: HeapHeader,
    pub frame: ValBox,
}

const _: () = assert!(size_of::<Continuation>() == 16);

/// # Safety
///
/// `ptr` must point to at least `size_of::<Continuation>()` writable
/// bytes; `frame` must reference a valid frame.
pub unsafe fn init_continuation(ptr: *mut Continuation, frame: ValBox) {
    ptr.write(Continuation {
        header: HeapHeader::new(
            HeapFormat::Continuation,
            words_for_bytes(size_of::<Continuation>()),
        ),
        frame,
    });
}

// ── LookupState ────────────────────────────────────────────────────

/// Where a property lookup found its binding: the original receiver,
/// the looked-up name, and the delegate that holds the binding.
#[repr(C)]
pub struct LookupState {
    pub header: HeapHeader,
    pub receiver: ValBox,
    pub name: ValBox,
    pub holder: ValBox,
}

const _: () = assert!(size_of::<LookupState>() == 32);

/// # Safety
///
/// `ptr` must point to at least `size_of::<LookupState>()` writable
/// bytes; the fields must be valid tagged values.
pub unsafe fn init_lookup_state(
    ptr: *mut LookupState,
    receiver: ValBox,
    name: ValBox,
    holder: ValBox,
) {
    ptr.write(LookupState {
        header: HeapHeader::new(
            HeapFormat::LookupState,
            words_for_bytes(size_of::<LookupState>()),
        ),
        receiver,
        name,
        holder,
    });
}
