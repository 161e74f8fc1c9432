use object::{
    words_for_bytes, BoxArray, HashObject, HeapFormat, HeapHeader, ValBox,
};

use crate::handles::Handle;
use crate::objects::{SyntaxNode, SyntaxNodeRef};
use crate::result::{CallResult, EvalResult};
use crate::runtime::ThreadContext;

/// User-data flag marking an operative function (arguments passed as
/// raw syntax rather than evaluated by the call site).
pub const FUNCTION_OPERATIVE: u8 = 1 << 0;

/// Call context handed to every native function: where the binding was
/// found, the scope of the caller, the callee function object, and the
/// bound receiver. All four are rooted slots owned by the invoking
/// frame, so natives may allocate freely and re-read current values.
pub struct NativeCallInfo<'s> {
    pub lookup_state: Handle<'s>,
    pub caller_scope: Handle<'s>,
    pub callee_func: Handle<'s>,
    pub receiver: Handle<'s>,
}

/// Evaluated arguments of an applicative call, backed by a rooted heap
/// array.
pub struct ValArgs<'s> {
    pub arr: Handle<'s>,
}

impl ValArgs<'_> {
    pub fn len(&self) -> usize {
        unsafe { self.arr.as_obj::<BoxArray>().len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: usize) -> ValBox {
        unsafe { self.arr.as_obj::<BoxArray>().at(idx) }
    }
}

/// Unevaluated syntax arguments of an operative call: a rooted heap
/// array of [`SyntaxNode`] objects.
pub struct SyntaxArgs<'s> {
    pub arr: Handle<'s>,
}

impl SyntaxArgs<'_> {
    pub fn len(&self) -> usize {
        unsafe { self.arr.as_obj::<BoxArray>().len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The idx-th argument as a heap syntax node.
    pub fn node(&self, idx: usize) -> ValBox {
        unsafe { self.arr.as_obj::<BoxArray>().at(idx) }
    }

    pub fn node_ref(&self, idx: usize) -> SyntaxNodeRef {
        unsafe {
            let node_val = self.node(idx);
            let node: &SyntaxNode = node_val.as_ref();
            SyntaxNodeRef {
                pst: node.pst,
                offset: node.offset,
            }
        }
    }
}

pub type NativeApplicativeFn =
    fn(&mut ThreadContext, &NativeCallInfo, &ValArgs) -> CallResult;

pub type NativeOperativeFn =
    fn(&mut ThreadContext, &NativeCallInfo, &SyntaxArgs) -> CallResult;

/// Continuation of a suspended native: invoked by a resume frame with
/// the saved opaque state and the sub-evaluation's result.
pub type NativeResumeFn =
    fn(&mut ThreadContext, &NativeCallInfo, Handle<'_>, EvalResult) -> CallResult;

#[derive(Clone, Copy)]
pub union NativeFnPtr {
    applicative: NativeApplicativeFn,
    operative: NativeOperativeFn,
}

/// A host function: a function pointer plus the operative flag in the
/// header's user data. Leaf format.
#[repr(C)]
pub struct NativeFunction {
    pub header: HeapHeader,
    func: NativeFnPtr,
}

const _: () = assert!(size_of::<NativeFunction>() == 16);

impl NativeFunction {
    #[inline(always)]
    pub fn is_operative(&self) -> bool {
        self.header.user_data() & FUNCTION_OPERATIVE != 0
    }

    pub fn applicative(&self) -> NativeApplicativeFn {
        debug_assert!(!self.is_operative());
        // SAFETY: the flag discriminates which union arm was written.
        unsafe { self.func.applicative }
    }

    pub fn operative(&self) -> NativeOperativeFn {
        debug_assert!(self.is_operative());
        // SAFETY: the flag discriminates which union arm was written.
        unsafe { self.func.operative }
    }
}

/// # Safety
///
/// `ptr` must point to at least `size_of::<NativeFunction>()` writable
/// bytes.
pub unsafe fn init_native_applicative(
    ptr: *mut NativeFunction,
    func: NativeApplicativeFn,
) {
    ptr.write(NativeFunction {
        header: HeapHeader::new(
            HeapFormat::NativeFunction,
            words_for_bytes(size_of::<NativeFunction>()),
        ),
        func: NativeFnPtr { applicative: func },
    });
}

/// # Safety
///
/// As [`init_native_applicative`].
pub unsafe fn init_native_operative(
    ptr: *mut NativeFunction,
    func: NativeOperativeFn,
) {
    ptr.write(NativeFunction {
        header: {
            let mut header = HeapHeader::new(
                HeapFormat::NativeFunction,
                words_for_bytes(size_of::<NativeFunction>()),
            );
            header.set_user_data(FUNCTION_OPERATIVE);
            header
        },
        func: NativeFnPtr { operative: func },
    });
}

/// A function defined in script: a packed subtree (the `def` node), the
/// captured lexical scope, and the operative flag in user data.
#[repr(C)]
pub struct ScriptedFunction {
    pub header: HeapHeader,
    pub pst: ValBox,
    pub offset: u32,
    _pad: u32,
    pub scope_chain: ValBox,
}

const _: () = assert!(size_of::<ScriptedFunction>() == 32);

impl ScriptedFunction {
    #[inline(always)]
    pub fn is_operative(&self) -> bool {
        self.header.user_data() & FUNCTION_OPERATIVE != 0
    }
}

/// # Safety
///
/// `ptr` must point to at least `size_of::<ScriptedFunction>()`
/// writable bytes; `pst` and `scope_chain` must be valid references.
pub unsafe fn init_scripted_function(
    ptr: *mut ScriptedFunction,
    pst: ValBox,
    offset: u32,
    scope_chain: ValBox,
    is_operative: bool,
) {
    let mut header = HeapHeader::new(
        HeapFormat::ScriptedFunction,
        words_for_bytes(size_of::<ScriptedFunction>()),
    );
    if is_operative {
        header.set_user_data(FUNCTION_OPERATIVE);
    }
    ptr.write(ScriptedFunction {
        header,
        pst,
        offset,
        _pad: 0,
        scope_chain,
    });
}

/// A callable object: a hash object (so functions carry properties)
/// wrapping a [`NativeFunction`] or [`ScriptedFunction`], bound to a
/// receiver and the lookup state the method was found at.
#[repr(C)]
pub struct FunctionObject {
    pub base: HashObject,
    pub func: ValBox,
    pub receiver: ValBox,
    pub lookup_state: ValBox,
}

const _: () = assert!(size_of::<FunctionObject>() == 48);

/// # Safety
///
/// `ptr` must point to at least `size_of::<FunctionObject>()` writable
/// bytes; all fields must be valid tagged values.
pub unsafe fn init_function_object(
    ptr: *mut FunctionObject,
    delegates: ValBox,
    dict: ValBox,
    func: ValBox,
    receiver: ValBox,
    lookup_state: ValBox,
) {
    ptr.write(FunctionObject {
        base: HashObject {
            header: HeapHeader::new(
                HeapFormat::FunctionObject,
                words_for_bytes(size_of::<FunctionObject>()),
            ),
            delegates,
            dict,
        },
        func,
        receiver,
        lookup_state,
    });
}

/// True when `value` is a callable function object.
pub fn is_function_object(value: ValBox) -> bool {
    value.is_object_ref()
        && unsafe { value.as_ref::<HeapHeader>().format() }
            == HeapFormat::FunctionObject
}

/// Whether the wrapped function is operative, for either function
/// representation.
///
/// # Safety
///
/// `func` must reference a valid native or scripted function.
pub unsafe fn function_is_operative(func: ValBox) -> bool {
    let header: &HeapHeader = func.as_ref();
    debug_assert!(matches!(
        header.format(),
        HeapFormat::NativeFunction | HeapFormat::ScriptedFunction
    ));
    header.user_data() & FUNCTION_OPERATIVE != 0
}
