//! Typed allocation helpers.
//!
//! Every helper pins its tagged-value parameters in a handle scope
//! before allocating, so callers only need to root values they carry
//! across multiple calls.

use std::ptr::NonNull;

use object::{
    box_array_allocation_size, dict_allocation_size, dict_insert, dict_reinsert,
    init_box_array, init_hash_object, init_heap_double, init_heap_string,
    init_packed_syntax_tree, init_property_dict, init_u32_array,
    string_allocation_size, u32_array_allocation_size, BoxArray, HashObject,
    HeapDouble, HeapFormat, HeapString, InsertOutcome, PackedSyntaxTree,
    PropertyDescriptor, PropertyDict, U32Array, ValBox,
};
use syntax::Program;

use crate::frame::{
    frame_header, BlockSyntaxFrame, CallExprSyntaxFrame, DotExprSyntaxFrame,
    EntryFrame, FileSyntaxFrame, FrameCore, FrameKind, InvokeApplicativeFrame,
    InvokeOperativeFrame, InvokeSyntaxNodeFrame, NativeCallResumeFrame,
    ReturnStmtSyntaxFrame, TerminalFrame, VarSyntaxFrame, CALL_STATE_CALLEE,
    RESULT_NONE,
};
use crate::function::{
    init_function_object, init_native_applicative, init_native_operative,
    init_scripted_function, FunctionObject, NativeApplicativeFn,
    NativeFunction, NativeOperativeFn, NativeResumeFn, ScriptedFunction,
};
use crate::handles::HandleScope;
use crate::objects::{
    exception_allocation_size, init_continuation, init_exception,
    init_lookup_state, init_slist_node, init_syntax_node, slist_len,
    Continuation, Exception, LookupState, SlistNode, SyntaxNode,
};
use crate::runtime::ThreadContext;

// ── Leaf objects ───────────────────────────────────────────────────

pub fn alloc_heap_string(cx: &mut ThreadContext, units: &[u16]) -> Option<ValBox> {
    let ptr = cx.allocate_raw(string_allocation_size(units.len()), false)?;
    unsafe {
        let string = ptr.as_ptr() as *mut HeapString;
        init_heap_string(string, units.len());
        let dst = string.add(1) as *mut u16;
        core::ptr::copy_nonoverlapping(units.as_ptr(), dst, units.len());
        Some(ValBox::heap_string_ref(string))
    }
}

pub fn alloc_heap_double(cx: &mut ThreadContext, value: f64) -> Option<ValBox> {
    let ptr = cx.allocate_raw(16, false)?;
    unsafe {
        init_heap_double(ptr.as_ptr() as *mut HeapDouble, value);
        Some(ValBox::heap_double_ref(ptr.as_ptr()))
    }
}

/// Box a numeric result: immediate when the encoding allows, heap
/// double otherwise.
pub fn number_box(cx: &mut ThreadContext, value: f64) -> Option<ValBox> {
    if ValBox::fits_immediate_double(value) {
        Some(ValBox::immediate_double(value))
    } else {
        alloc_heap_double(cx, value)
    }
}

pub fn alloc_u32_array(cx: &mut ThreadContext, words: &[u32]) -> Option<ValBox> {
    let ptr = cx.allocate_raw(u32_array_allocation_size(words.len()), false)?;
    unsafe {
        let arr = ptr.as_ptr() as *mut U32Array;
        init_u32_array(arr, words.len());
        let dst = arr.add(1) as *mut u32;
        core::ptr::copy_nonoverlapping(words.as_ptr(), dst, words.len());
        Some(ValBox::object_ref(arr))
    }
}

// ── Traced objects ─────────────────────────────────────────────────

pub fn alloc_box_array(cx: &mut ThreadContext, len: usize) -> Option<ValBox> {
    let ptr = cx.allocate_raw(box_array_allocation_size(len), true)?;
    unsafe {
        init_box_array(ptr.as_ptr() as *mut BoxArray, len);
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

/// Materialize a parsed program into the heap: the packed words, the
/// interned constants, and the tree object tying them together.
pub fn alloc_packed_syntax_tree(
    cx: &mut ThreadContext,
    program: &Program,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let data = alloc_u32_array(cx, &program.data)?;
    let data_h = hs.pin(data);
    let constants = alloc_box_array(cx, program.constants.len())?;
    let constants_h = hs.pin(constants);
    for (i, name) in program.constants.iter().enumerate() {
        // Constants are identifier strings; interning keeps name
        // comparisons cheap.
        let value = cx.intern(name)?;
        unsafe {
            constants_h.get().as_mut::<BoxArray>().set(i, value);
        }
        cx.barrier(constants_h.get());
    }
    let ptr = cx.allocate_raw(size_of::<PackedSyntaxTree>(), true)?;
    unsafe {
        init_packed_syntax_tree(
            ptr.as_ptr() as *mut PackedSyntaxTree,
            data_h.get(),
            constants_h.get(),
        );
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_syntax_node(
    cx: &mut ThreadContext,
    pst: ValBox,
    offset: u32,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let pst_h = hs.pin(pst);
    let ptr = cx.allocate_raw(size_of::<SyntaxNode>(), true)?;
    unsafe {
        init_syntax_node(ptr.as_ptr() as *mut SyntaxNode, pst_h.get(), offset);
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_property_dict(cx: &mut ThreadContext, capacity: usize) -> Option<ValBox> {
    let ptr = cx.allocate_raw(dict_allocation_size(capacity), true)?;
    unsafe {
        init_property_dict(ptr.as_ptr() as *mut PropertyDict, capacity);
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

/// Allocate a scope object with the given delegates and an empty
/// dictionary of `dict_capacity` entries.
pub fn alloc_scope(
    cx: &mut ThreadContext,
    format: HeapFormat,
    delegates: &[ValBox],
    dict_capacity: usize,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let delegate_handles: Vec<_> = delegates.iter().map(|&d| hs.pin(d)).collect();

    let array = alloc_box_array(cx, delegates.len())?;
    let array_h = hs.pin(array);
    for (i, handle) in delegate_handles.iter().enumerate() {
        unsafe {
            array_h.get().as_mut::<BoxArray>().set(i, handle.get());
        }
    }

    let dict = alloc_property_dict(cx, dict_capacity)?;
    let dict_h = hs.pin(dict);

    let ptr = cx.allocate_raw(size_of::<HashObject>(), true)?;
    unsafe {
        init_hash_object(
            ptr.as_ptr() as *mut HashObject,
            format,
            array_h.get(),
            dict_h.get(),
        );
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_native_operative(
    cx: &mut ThreadContext,
    func: NativeOperativeFn,
) -> Option<ValBox> {
    let ptr = cx.allocate_raw(size_of::<NativeFunction>(), false)?;
    unsafe {
        init_native_operative(ptr.as_ptr() as *mut NativeFunction, func);
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_native_applicative(
    cx: &mut ThreadContext,
    func: NativeApplicativeFn,
) -> Option<ValBox> {
    let ptr = cx.allocate_raw(size_of::<NativeFunction>(), false)?;
    unsafe {
        init_native_applicative(ptr.as_ptr() as *mut NativeFunction, func);
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_scripted_function(
    cx: &mut ThreadContext,
    pst: ValBox,
    offset: u32,
    scope_chain: ValBox,
    is_operative: bool,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let pst_h = hs.pin(pst);
    let scope_h = hs.pin(scope_chain);
    let ptr = cx.allocate_raw(size_of::<ScriptedFunction>(), true)?;
    unsafe {
        init_scripted_function(
            ptr.as_ptr() as *mut ScriptedFunction,
            pst_h.get(),
            offset,
            scope_h.get(),
            is_operative,
        );
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

/// Bind a function to a receiver at a lookup position.
pub fn alloc_function_object(
    cx: &mut ThreadContext,
    func: ValBox,
    receiver: ValBox,
    lookup_state: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let func_h = hs.pin(func);
    let receiver_h = hs.pin(receiver);
    let lookup_h = hs.pin(lookup_state);

    let delegates = alloc_box_array(cx, 0)?;
    let delegates_h = hs.pin(delegates);
    let dict = alloc_property_dict(cx, 4)?;
    let dict_h = hs.pin(dict);

    let ptr = cx.allocate_raw(size_of::<FunctionObject>(), true)?;
    unsafe {
        init_function_object(
            ptr.as_ptr() as *mut FunctionObject,
            delegates_h.get(),
            dict_h.get(),
            func_h.get(),
            receiver_h.get(),
            lookup_h.get(),
        );
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_lookup_state(
    cx: &mut ThreadContext,
    receiver: ValBox,
    name: ValBox,
    holder: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let receiver_h = hs.pin(receiver);
    let name_h = hs.pin(name);
    let holder_h = hs.pin(holder);
    let ptr = cx.allocate_raw(size_of::<LookupState>(), true)?;
    unsafe {
        init_lookup_state(
            ptr.as_ptr() as *mut LookupState,
            receiver_h.get(),
            name_h.get(),
            holder_h.get(),
        );
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_exception(
    cx: &mut ThreadContext,
    message: &'static str,
    args: &[ValBox],
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let arg_handles: Vec<_> = args.iter().map(|&a| hs.pin(a)).collect();
    let ptr = cx.allocate_raw(exception_allocation_size(args.len()), true)?;
    unsafe {
        let exception = ptr.as_ptr() as *mut Exception;
        init_exception(exception, message, args.len());
        let dst = exception.add(1) as *mut ValBox;
        for (i, handle) in arg_handles.iter().enumerate() {
            *dst.add(i) = handle.get();
        }
        Some(ValBox::object_ref(exception))
    }
}

pub fn alloc_continuation(cx: &mut ThreadContext, frame: ValBox) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let ptr = cx.allocate_raw(size_of::<Continuation>(), true)?;
    unsafe {
        init_continuation(ptr.as_ptr() as *mut Continuation, frame_h.get());
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_slist_node(
    cx: &mut ThreadContext,
    value: ValBox,
    next: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let value_h = hs.pin(value);
    let next_h = hs.pin(next);
    let ptr = cx.allocate_raw(size_of::<SlistNode>(), true)?;
    unsafe {
        init_slist_node(ptr.as_ptr() as *mut SlistNode, value_h.get(), next_h.get());
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

/// Reverse an invoke frame's operand slist into a fresh argument
/// array; the slist head holds the last argument.
pub fn alloc_reversed_operand_array(
    cx: &mut ThreadContext,
    invoke_frame: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(invoke_frame);
    let len = unsafe {
        slist_len(invoke_frame.as_ref::<InvokeApplicativeFrame>().operands)
    };
    let array = alloc_box_array(cx, len)?;
    unsafe {
        let arr: &mut BoxArray = array.as_mut();
        let mut list = frame_h
            .get()
            .as_ref::<InvokeApplicativeFrame>()
            .operands;
        for i in (0..len).rev() {
            let node: &SlistNode = list.as_ref();
            arr.set(i, node.value);
            list = node.next;
        }
    }
    Some(array)
}

// ── Property definition ────────────────────────────────────────────

/// `DefineProperty`: write a binding into the object's own dictionary,
/// replacing any existing one, growing the table as needed.
pub fn define_property(
    cx: &mut ThreadContext,
    obj: ValBox,
    name: ValBox,
    descriptor: PropertyDescriptor,
) -> Option<()> {
    debug_assert!(name.is_string());
    let hs = HandleScope::new(cx);
    let obj_h = hs.pin(obj);
    let name_h = hs.pin(name);
    let value_h = hs.pin(descriptor.value);
    let aux_h = hs.pin(descriptor.aux);

    loop {
        let spoiler = cx.state.spoiler;
        let current = PropertyDescriptor {
            kind: descriptor.kind,
            writable: descriptor.writable,
            value: value_h.get(),
            aux: aux_h.get(),
        };
        let outcome = unsafe {
            let obj_h_val = obj_h.get();
            let hash_obj: &HashObject = obj_h_val.as_ref();
            let dict: &mut PropertyDict = hash_obj.dict.as_mut();
            dict_insert(dict, name_h.get(), current, spoiler)
        };
        match outcome {
            InsertOutcome::Done => {
                let dict = unsafe { obj_h.get().as_ref::<HashObject>().dict };
                cx.barrier(dict);
                return Some(());
            }
            InsertOutcome::NeedsGrow => {
                let old_capacity = unsafe {
                    obj_h.get()
                        .as_ref::<HashObject>()
                        .dict
                        .as_ref::<PropertyDict>()
                        .capacity()
                };
                let grown = alloc_property_dict(cx, old_capacity * 2)?;
                unsafe {
                    let old_dict = obj_h.get().as_ref::<HashObject>().dict;
                    let old: &PropertyDict = old_dict.as_ref();
                    let new: &mut PropertyDict = grown.as_mut();
                    for entry in old.entries() {
                        if entry.name.is_valid() {
                            dict_reinsert(new, *entry, spoiler);
                        }
                    }
                    obj_h.get().as_mut::<HashObject>().dict = grown;
                }
                cx.barrier(obj_h.get());
            }
        }
    }
}

pub fn define_value_property(
    cx: &mut ThreadContext,
    obj: ValBox,
    name: ValBox,
    value: ValBox,
    writable: bool,
) -> Option<()> {
    define_property(cx, obj, name, PropertyDescriptor::make_slot(value, writable))
}

pub fn define_method_property(
    cx: &mut ThreadContext,
    obj: ValBox,
    name: ValBox,
    func: ValBox,
) -> Option<()> {
    define_property(cx, obj, name, PropertyDescriptor::method(func))
}

// ── Frames ─────────────────────────────────────────────────────────

fn alloc_frame_raw(cx: &mut ThreadContext, size: usize) -> Option<NonNull<u8>> {
    cx.allocate_raw(size, true)
}

pub fn alloc_terminal_frame(cx: &mut ThreadContext) -> Option<ValBox> {
    let ptr = alloc_frame_raw(cx, size_of::<TerminalFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut TerminalFrame).write(TerminalFrame {
            core: FrameCore {
                header: frame_header(FrameKind::Terminal, size_of::<TerminalFrame>()),
                parent: ValBox::undefined(),
            },
            result_kind: RESULT_NONE,
            result_value: ValBox::undefined(),
            exc_frame: ValBox::undefined(),
            exc_exception: ValBox::undefined(),
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_entry_frame(
    cx: &mut ThreadContext,
    parent: ValBox,
    syntax_node: ValBox,
    scope: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let syntax_h = hs.pin(syntax_node);
    let scope_h = hs.pin(scope);
    let ptr = alloc_frame_raw(cx, size_of::<EntryFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut EntryFrame).write(EntryFrame {
            core: FrameCore {
                header: frame_header(FrameKind::Entry, size_of::<EntryFrame>()),
                parent: parent_h.get(),
            },
            syntax_node: syntax_h.get(),
            scope: scope_h.get(),
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_invoke_syntax_frame(
    cx: &mut ThreadContext,
    parent: ValBox,
    entry: ValBox,
    syntax_node: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let entry_h = hs.pin(entry);
    let syntax_h = hs.pin(syntax_node);
    let ptr = alloc_frame_raw(cx, size_of::<InvokeSyntaxNodeFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut InvokeSyntaxNodeFrame).write(InvokeSyntaxNodeFrame {
            core: FrameCore {
                header: frame_header(
                    FrameKind::InvokeSyntaxNode,
                    size_of::<InvokeSyntaxNodeFrame>(),
                ),
                parent: parent_h.get(),
            },
            entry: entry_h.get(),
            syntax_node: syntax_h.get(),
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_file_frame(
    cx: &mut ThreadContext,
    parent: ValBox,
    entry: ValBox,
    syntax_node: ValBox,
    statement_no: u32,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let entry_h = hs.pin(entry);
    let syntax_h = hs.pin(syntax_node);
    let ptr = alloc_frame_raw(cx, size_of::<FileSyntaxFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut FileSyntaxFrame).write(FileSyntaxFrame {
            core: FrameCore {
                header: frame_header(FrameKind::FileSyntax, size_of::<FileSyntaxFrame>()),
                parent: parent_h.get(),
            },
            entry: entry_h.get(),
            syntax_node: syntax_h.get(),
            statement_no,
            _pad: 0,
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_block_frame(
    cx: &mut ThreadContext,
    parent: ValBox,
    entry: ValBox,
    syntax_node: ValBox,
    statement_no: u32,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let entry_h = hs.pin(entry);
    let syntax_h = hs.pin(syntax_node);
    let ptr = alloc_frame_raw(cx, size_of::<BlockSyntaxFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut BlockSyntaxFrame).write(BlockSyntaxFrame {
            core: FrameCore {
                header: frame_header(FrameKind::BlockSyntax, size_of::<BlockSyntaxFrame>()),
                parent: parent_h.get(),
            },
            entry: entry_h.get(),
            syntax_node: syntax_h.get(),
            statement_no,
            _pad: 0,
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_return_frame(
    cx: &mut ThreadContext,
    parent: ValBox,
    entry: ValBox,
    syntax_node: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let entry_h = hs.pin(entry);
    let syntax_h = hs.pin(syntax_node);
    let ptr = alloc_frame_raw(cx, size_of::<ReturnStmtSyntaxFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut ReturnStmtSyntaxFrame).write(ReturnStmtSyntaxFrame {
            core: FrameCore {
                header: frame_header(
                    FrameKind::ReturnStmtSyntax,
                    size_of::<ReturnStmtSyntaxFrame>(),
                ),
                parent: parent_h.get(),
            },
            entry: entry_h.get(),
            syntax_node: syntax_h.get(),
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_var_frame(
    cx: &mut ThreadContext,
    parent: ValBox,
    entry: ValBox,
    syntax_node: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let entry_h = hs.pin(entry);
    let syntax_h = hs.pin(syntax_node);
    let ptr = alloc_frame_raw(cx, size_of::<VarSyntaxFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut VarSyntaxFrame).write(VarSyntaxFrame {
            core: FrameCore {
                header: frame_header(FrameKind::VarSyntax, size_of::<VarSyntaxFrame>()),
                parent: parent_h.get(),
            },
            entry: entry_h.get(),
            syntax_node: syntax_h.get(),
            binding_no: 0,
            _pad: 0,
            last_value: ValBox::undefined(),
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_call_expr_frame(
    cx: &mut ThreadContext,
    parent: ValBox,
    entry: ValBox,
    syntax_node: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let entry_h = hs.pin(entry);
    let syntax_h = hs.pin(syntax_node);
    let ptr = alloc_frame_raw(cx, size_of::<CallExprSyntaxFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut CallExprSyntaxFrame).write(CallExprSyntaxFrame {
            core: FrameCore {
                header: frame_header(
                    FrameKind::CallExprSyntax,
                    size_of::<CallExprSyntaxFrame>(),
                ),
                parent: parent_h.get(),
            },
            entry: entry_h.get(),
            syntax_node: syntax_h.get(),
            state: CALL_STATE_CALLEE,
            arg_no: 0,
            callee: ValBox::undefined(),
            callee_func: ValBox::undefined(),
            operands: ValBox::null(),
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_invoke_applicative_frame(
    cx: &mut ThreadContext,
    parent: ValBox,
    callee: ValBox,
    callee_func: ValBox,
    operands: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let callee_h = hs.pin(callee);
    let func_h = hs.pin(callee_func);
    let operands_h = hs.pin(operands);
    let ptr = alloc_frame_raw(cx, size_of::<InvokeApplicativeFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut InvokeApplicativeFrame).write(InvokeApplicativeFrame {
            core: FrameCore {
                header: frame_header(
                    FrameKind::InvokeApplicative,
                    size_of::<InvokeApplicativeFrame>(),
                ),
                parent: parent_h.get(),
            },
            callee: callee_h.get(),
            callee_func: func_h.get(),
            operands: operands_h.get(),
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_invoke_operative_frame(
    cx: &mut ThreadContext,
    parent: ValBox,
    callee: ValBox,
    callee_func: ValBox,
    syntax_node: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let callee_h = hs.pin(callee);
    let func_h = hs.pin(callee_func);
    let syntax_h = hs.pin(syntax_node);
    let ptr = alloc_frame_raw(cx, size_of::<InvokeOperativeFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut InvokeOperativeFrame).write(InvokeOperativeFrame {
            core: FrameCore {
                header: frame_header(
                    FrameKind::InvokeOperative,
                    size_of::<InvokeOperativeFrame>(),
                ),
                parent: parent_h.get(),
            },
            callee: callee_h.get(),
            callee_func: func_h.get(),
            syntax_node: syntax_h.get(),
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub fn alloc_dot_frame(
    cx: &mut ThreadContext,
    parent: ValBox,
    entry: ValBox,
    syntax_node: ValBox,
    is_arrow: bool,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let entry_h = hs.pin(entry);
    let syntax_h = hs.pin(syntax_node);
    let ptr = alloc_frame_raw(cx, size_of::<DotExprSyntaxFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut DotExprSyntaxFrame).write(DotExprSyntaxFrame {
            core: FrameCore {
                header: frame_header(
                    FrameKind::DotExprSyntax,
                    size_of::<DotExprSyntaxFrame>(),
                ),
                parent: parent_h.get(),
            },
            entry: entry_h.get(),
            syntax_node: syntax_h.get(),
            is_arrow: is_arrow as u64,
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}

pub struct ResumeCapture {
    pub lookup_state: ValBox,
    pub caller_scope: ValBox,
    pub callee_func: ValBox,
    pub receiver: ValBox,
}

pub fn alloc_resume_frame(
    cx: &mut ThreadContext,
    parent: ValBox,
    capture: ResumeCapture,
    eval_scope: ValBox,
    syntax_node: ValBox,
    resume_fn: NativeResumeFn,
    resume_state: ValBox,
) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let lookup_h = hs.pin(capture.lookup_state);
    let caller_h = hs.pin(capture.caller_scope);
    let callee_h = hs.pin(capture.callee_func);
    let receiver_h = hs.pin(capture.receiver);
    let eval_h = hs.pin(eval_scope);
    let syntax_h = hs.pin(syntax_node);
    let state_h = hs.pin(resume_state);
    let ptr = alloc_frame_raw(cx, size_of::<NativeCallResumeFrame>())?;
    unsafe {
        (ptr.as_ptr() as *mut NativeCallResumeFrame).write(NativeCallResumeFrame {
            core: FrameCore {
                header: frame_header(
                    FrameKind::NativeCallResume,
                    size_of::<NativeCallResumeFrame>(),
                ),
                parent: parent_h.get(),
            },
            lookup_state: lookup_h.get(),
            caller_scope: caller_h.get(),
            callee_func: callee_h.get(),
            receiver: receiver_h.get(),
            eval_scope: eval_h.get(),
            syntax_node: syntax_h.get(),
            resume_fn,
            resume_state: state_h.get(),
        });
        Some(ValBox::object_ref(ptr.as_ptr()))
    }
}
