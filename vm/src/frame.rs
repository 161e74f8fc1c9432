//! The heap-allocated continuation-style frame machine.
//!
//! Every frame offers two operations: [`step`] advances the
//! computation by one small action and [`resolve`] consumes the result
//! a child produced. Both return the next top frame (possibly the same
//! frame in a new internal state) or a fatal error; the trampoline in
//! `interp` drives [`step`] until the terminal frame absorbs a result.
//!
//! A frame's `parent` field is the only owning path to its ancestors;
//! frames abandoned by a continuation jump simply become garbage.

use object::{
    words_for_bytes, HeapFormat, HeapHeader, PackedSyntaxTree, ValBox,
};
use syntax::{NodeRef, NodeType, SizedBlockRef};

use crate::alloc;
use crate::function::{
    function_is_operative, is_function_object, FunctionObject, NativeResumeFn,
    ScriptedFunction,
};
use crate::handles::HandleScope;
use crate::interp::{self, PropertyFlow};
use crate::objects::{Continuation, SyntaxNode};
use crate::result::{try_step, EvalResult, StepResult};
use crate::runtime::ThreadContext;
use crate::spew::spew;

/// Frame kinds, stored in the header's user-data byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Terminal = 0,
    Entry,
    InvokeSyntaxNode,
    FileSyntax,
    BlockSyntax,
    ReturnStmtSyntax,
    VarSyntax,
    CallExprSyntax,
    InvokeApplicative,
    InvokeOperative,
    DotExprSyntax,
    NativeCallResume,
}

impl FrameKind {
    pub fn from_u8(raw: u8) -> Self {
        debug_assert!(raw <= FrameKind::NativeCallResume as u8);
        unsafe { core::mem::transmute::<u8, FrameKind>(raw) }
    }
}

/// Common prefix of every frame struct.
#[repr(C)]
pub struct FrameCore {
    pub header: HeapHeader,
    pub parent: ValBox,
}

pub(crate) fn frame_header(kind: FrameKind, size: usize) -> HeapHeader {
    let mut header = HeapHeader::new(HeapFormat::Frame, words_for_bytes(size));
    header.set_user_data(kind as u8);
    header
}

pub fn frame_kind(frame: ValBox) -> FrameKind {
    debug_assert!(frame.is_object_ref());
    let header: &HeapHeader = unsafe { frame.as_ref() };
    debug_assert!(header.format() == HeapFormat::Frame);
    FrameKind::from_u8(header.user_data())
}

pub fn frame_parent(frame: ValBox) -> ValBox {
    unsafe { frame.as_ref::<FrameCore>().parent }
}

// ── Frame layouts ──────────────────────────────────────────────────

pub const RESULT_NONE: u64 = 0;
pub const RESULT_VALUE: u64 = 1;
pub const RESULT_VOID: u64 = 2;
pub const RESULT_ERROR: u64 = 3;
pub const RESULT_EXC: u64 = 4;

/// Sentinel root of the frame spine; `parent` is the invalid value.
/// Absorbs the final result instead of forwarding it.
#[repr(C)]
pub struct TerminalFrame {
    pub core: FrameCore,
    pub result_kind: u64,
    pub result_value: ValBox,
    pub exc_frame: ValBox,
    pub exc_exception: ValBox,
}

/// Entry into a new evaluation scope on a syntax subtree.
#[repr(C)]
pub struct EntryFrame {
    pub core: FrameCore,
    pub syntax_node: ValBox,
    pub scope: ValBox,
}

/// The universal dispatch frame: maps its node's type to a handler
/// name, looks the handler up on the scope, and invokes it.
#[repr(C)]
pub struct InvokeSyntaxNodeFrame {
    pub core: FrameCore,
    pub entry: ValBox,
    pub syntax_node: ValBox,
}

/// Statement iterator over a `File` node.
#[repr(C)]
pub struct FileSyntaxFrame {
    pub core: FrameCore,
    pub entry: ValBox,
    pub syntax_node: ValBox,
    pub statement_no: u32,
    pub _pad: u32,
}

/// Statement iterator over a sized block; the last statement's result
/// becomes the block's result.
#[repr(C)]
pub struct BlockSyntaxFrame {
    pub core: FrameCore,
    pub entry: ValBox,
    /// Points at the sized-block prefix, not a node header.
    pub syntax_node: ValBox,
    pub statement_no: u32,
    pub _pad: u32,
}

#[repr(C)]
pub struct ReturnStmtSyntaxFrame {
    pub core: FrameCore,
    pub entry: ValBox,
    pub syntax_node: ValBox,
}

/// Binding iterator for `var` and `const` statements.
#[repr(C)]
pub struct VarSyntaxFrame {
    pub core: FrameCore,
    pub entry: ValBox,
    pub syntax_node: ValBox,
    pub binding_no: u32,
    pub _pad: u32,
    pub last_value: ValBox,
}

pub const CALL_STATE_CALLEE: u32 = 0;
pub const CALL_STATE_ARG: u32 = 1;
pub const CALL_STATE_INVOKE: u32 = 2;

/// Call-expression state machine: evaluate the callee, evaluate each
/// argument (applicatives only), then invoke.
#[repr(C)]
pub struct CallExprSyntaxFrame {
    pub core: FrameCore,
    pub entry: ValBox,
    pub syntax_node: ValBox,
    pub state: u32,
    pub arg_no: u32,
    pub callee: ValBox,
    pub callee_func: ValBox,
    /// Reversed operand slist; `Null` when empty.
    pub operands: ValBox,
}

#[repr(C)]
pub struct InvokeApplicativeFrame {
    pub core: FrameCore,
    pub callee: ValBox,
    pub callee_func: ValBox,
    pub operands: ValBox,
}

#[repr(C)]
pub struct InvokeOperativeFrame {
    pub core: FrameCore,
    pub callee: ValBox,
    pub callee_func: ValBox,
    pub syntax_node: ValBox,
}

/// Evaluates the target of a `.` / `->` access, then invokes the
/// dotting protocol found on the resulting value.
#[repr(C)]
pub struct DotExprSyntaxFrame {
    pub core: FrameCore,
    pub entry: ValBox,
    pub syntax_node: ValBox,
    pub is_arrow: u64,
}

/// Heap-saved continuation of a native handler that requested a
/// sub-evaluation and will resume with its result.
#[repr(C)]
pub struct NativeCallResumeFrame {
    pub core: FrameCore,
    pub lookup_state: ValBox,
    pub caller_scope: ValBox,
    pub callee_func: ValBox,
    pub receiver: ValBox,
    pub eval_scope: ValBox,
    pub syntax_node: ValBox,
    pub resume_fn: NativeResumeFn,
    pub resume_state: ValBox,
}

// ── Syntax access ──────────────────────────────────────────────────

pub(crate) fn node_pst(syntax_node: ValBox) -> ValBox {
    unsafe { syntax_node.as_ref::<SyntaxNode>().pst }
}

pub(crate) fn node_offset(syntax_node: ValBox) -> u32 {
    unsafe { syntax_node.as_ref::<SyntaxNode>().offset }
}

/// Run `f` over the packed node a heap syntax node references.
///
/// `f` must not allocate: it borrows the packed text directly.
pub(crate) fn with_node<R>(syntax_node: ValBox, f: impl FnOnce(NodeRef<'_>) -> R) -> R {
    unsafe {
        let node: &SyntaxNode = syntax_node.as_ref();
        let pst: &PackedSyntaxTree = node.pst.as_ref();
        f(NodeRef::new(pst.words(), node.offset as usize))
    }
}

/// As [`with_node`] for a syntax node referencing a sized block.
pub(crate) fn with_sized_block<R>(
    syntax_node: ValBox,
    f: impl FnOnce(SizedBlockRef<'_>) -> R,
) -> R {
    unsafe {
        let node: &SyntaxNode = syntax_node.as_ref();
        let pst: &PackedSyntaxTree = node.pst.as_ref();
        f(SizedBlockRef::new(pst.words(), node.offset as usize))
    }
}

/// Read a string constant out of a syntax node's tree.
///
/// The returned value is a tagged string; the constants array only
/// holds strings, checked at materialization time.
pub(crate) fn node_constant(syntax_node: ValBox, cid: u32) -> ValBox {
    unsafe {
        let node: &SyntaxNode = syntax_node.as_ref();
        let pst: &PackedSyntaxTree = node.pst.as_ref();
        pst.constant(cid)
    }
}

/// Nearest enclosing [`EntryFrame`], following the syntax frames'
/// entry fields and otherwise the parent chain.
pub fn ancestor_entry_frame(frame: ValBox) -> Option<ValBox> {
    let mut cursor = frame;
    loop {
        match frame_kind(cursor) {
            FrameKind::Terminal => return None,
            FrameKind::Entry => return Some(cursor),
            FrameKind::InvokeSyntaxNode => {
                return Some(unsafe { cursor.as_ref::<InvokeSyntaxNodeFrame>().entry })
            }
            FrameKind::FileSyntax => {
                return Some(unsafe { cursor.as_ref::<FileSyntaxFrame>().entry })
            }
            FrameKind::BlockSyntax => {
                return Some(unsafe { cursor.as_ref::<BlockSyntaxFrame>().entry })
            }
            FrameKind::ReturnStmtSyntax => {
                return Some(unsafe { cursor.as_ref::<ReturnStmtSyntaxFrame>().entry })
            }
            FrameKind::VarSyntax => {
                return Some(unsafe { cursor.as_ref::<VarSyntaxFrame>().entry })
            }
            FrameKind::CallExprSyntax => {
                return Some(unsafe { cursor.as_ref::<CallExprSyntaxFrame>().entry })
            }
            FrameKind::DotExprSyntax => {
                return Some(unsafe { cursor.as_ref::<DotExprSyntaxFrame>().entry })
            }
            _ => cursor = frame_parent(cursor),
        }
    }
}

/// Entry scope governing `frame`'s evaluation.
pub(crate) fn entry_scope(entry: ValBox) -> ValBox {
    unsafe { entry.as_ref::<EntryFrame>().scope }
}

// ── Raising ────────────────────────────────────────────────────────

/// Allocate an exception and resolve `frame`'s parent with it.
pub(crate) fn raise(
    cx: &mut ThreadContext,
    frame: ValBox,
    message: &'static str,
    args: &[ValBox],
) -> StepResult {
    spew!(cx, "raise: {message}");
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let exception = try_step!(cx, alloc::alloc_exception(cx, message, args));
    let raising_frame = frame_h.get();
    resolve(
        cx,
        frame_parent(raising_frame),
        EvalResult::Exc {
            raising_frame,
            exception,
        },
    )
}

// ── Dispatch ───────────────────────────────────────────────────────

/// Advance the top frame by one small action.
pub fn step(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    match frame_kind(frame) {
        FrameKind::Terminal => {
            cx.set_internal_error("terminal frame cannot be stepped");
            StepResult::Error
        }
        FrameKind::Entry => step_entry(cx, frame),
        FrameKind::InvokeSyntaxNode => step_invoke_syntax_node(cx, frame),
        FrameKind::FileSyntax => step_file(cx, frame),
        FrameKind::BlockSyntax => step_block(cx, frame),
        FrameKind::ReturnStmtSyntax => step_return(cx, frame),
        FrameKind::VarSyntax => step_var(cx, frame),
        FrameKind::CallExprSyntax => step_call_expr(cx, frame),
        FrameKind::InvokeApplicative => step_invoke_applicative(cx, frame),
        FrameKind::InvokeOperative => step_invoke_operative(cx, frame),
        FrameKind::DotExprSyntax => step_dot(cx, frame),
        FrameKind::NativeCallResume => step_native_resume(cx, frame),
    }
}

/// Deliver a finished child's result to `frame`.
pub fn resolve(cx: &mut ThreadContext, frame: ValBox, result: EvalResult) -> StepResult {
    match frame_kind(frame) {
        FrameKind::Terminal => resolve_terminal(cx, frame, result),
        FrameKind::Entry
        | FrameKind::InvokeSyntaxNode
        | FrameKind::InvokeOperative => forward_resolve(cx, frame, result),
        FrameKind::FileSyntax => resolve_file(cx, frame, result),
        FrameKind::BlockSyntax => resolve_block(cx, frame, result),
        FrameKind::ReturnStmtSyntax => resolve_return(cx, frame, result),
        FrameKind::VarSyntax => resolve_var(cx, frame, result),
        FrameKind::CallExprSyntax => resolve_call_expr(cx, frame, result),
        FrameKind::InvokeApplicative => resolve_invoke_applicative(cx, frame, result),
        FrameKind::DotExprSyntax => resolve_dot(cx, frame, result),
        FrameKind::NativeCallResume => resolve_native_resume(cx, frame, result),
    }
}

fn forward_resolve(cx: &mut ThreadContext, frame: ValBox, result: EvalResult) -> StepResult {
    resolve(cx, frame_parent(frame), result)
}

// ── TerminalFrame ──────────────────────────────────────────────────

fn resolve_terminal(cx: &mut ThreadContext, frame: ValBox, result: EvalResult) -> StepResult {
    unsafe {
        let terminal: &mut TerminalFrame = frame.as_mut();
        match result {
            EvalResult::Value(v) => {
                terminal.result_kind = RESULT_VALUE;
                terminal.result_value = v;
            }
            EvalResult::Void => terminal.result_kind = RESULT_VOID,
            EvalResult::Error => terminal.result_kind = RESULT_ERROR,
            EvalResult::Exc {
                raising_frame,
                exception,
            } => {
                terminal.result_kind = RESULT_EXC;
                terminal.exc_frame = raising_frame;
                terminal.exc_exception = exception;
            }
        }
    }
    cx.barrier(frame);
    StepResult::Continue(frame)
}

/// True once the terminal frame has absorbed a result.
pub fn terminal_has_result(frame: ValBox) -> bool {
    debug_assert!(frame_kind(frame) == FrameKind::Terminal);
    unsafe { frame.as_ref::<TerminalFrame>().result_kind != RESULT_NONE }
}

pub fn terminal_result(frame: ValBox) -> EvalResult {
    let terminal: &TerminalFrame = unsafe { frame.as_ref() };
    match terminal.result_kind {
        RESULT_VALUE => EvalResult::Value(terminal.result_value),
        RESULT_VOID => EvalResult::Void,
        RESULT_EXC => EvalResult::Exc {
            raising_frame: terminal.exc_frame,
            exception: terminal.exc_exception,
        },
        _ => EvalResult::Error,
    }
}

// ── EntryFrame ─────────────────────────────────────────────────────

fn step_entry(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let (syntax_node, _scope) = unsafe {
        let entry: &EntryFrame = frame.as_ref();
        (entry.syntax_node, entry.scope)
    };
    let child = try_step!(
        cx,
        alloc::alloc_invoke_syntax_frame(cx, frame_h.get(), frame_h.get(), syntax_node)
    );
    StepResult::Continue(child)
}

// ── InvokeSyntaxNodeFrame ──────────────────────────────────────────

fn step_invoke_syntax_node(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let (entry, syntax_node) = unsafe {
        let f: &InvokeSyntaxNodeFrame = frame.as_ref();
        (f.entry, f.syntax_node)
    };
    let scope = entry_scope(entry);
    let node_type = with_node(syntax_node, |node| node.node_type());
    let Some(node_type) = node_type else {
        cx.set_internal_error("unknown syntax node type");
        return StepResult::Error;
    };
    spew!(cx, "dispatch {}", node_type.name());

    let name = cx.syntax_name(node_type);
    let scope_h = hs.pin(scope);
    let name_h = hs.pin(name);
    let syntax_h = hs.pin(syntax_node);

    match interp::get_object_property(cx, scope, name) {
        PropertyFlow::NotFound => {
            raise(cx, frame_h.get(), "Syntax method binding not found.", &[name_h.get()])
        }
        PropertyFlow::Error => StepResult::Error,
        PropertyFlow::Value(binding) => {
            if !is_function_object(binding) {
                return raise(
                    cx,
                    frame_h.get(),
                    "Syntax method binding is not a function.",
                    &[name_h.get()],
                );
            }
            let func = unsafe { binding.as_ref::<FunctionObject>().func };
            if !unsafe { function_is_operative(func) } {
                return raise(
                    cx,
                    frame_h.get(),
                    "Syntax method binding is applicative.",
                    &[name_h.get()],
                );
            }
            cx.state.top_frame = frame_h.get();
            let result = interp::invoke_operative(
                cx,
                binding,
                scope_h.get(),
                &[syntax_h.get()],
            );
            interp::finish_call(cx, frame_h.get(), result)
        }
    }
}

// ── FileSyntaxFrame ────────────────────────────────────────────────

fn step_file(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let (entry, syntax_node, statement_no) = unsafe {
        let f: &FileSyntaxFrame = frame.as_ref();
        (f.entry, f.syntax_node, f.statement_no)
    };
    let (count, stmt_offset) = with_node(syntax_node, |node| {
        let count = node.file_num_statements();
        let offset = if (statement_no as usize) < count {
            node.file_statement(statement_no as usize).offset as u32
        } else {
            0
        };
        (count, offset)
    });
    if statement_no as usize >= count {
        return resolve(
            cx,
            frame_parent(frame_h.get()),
            EvalResult::Value(ValBox::undefined()),
        );
    }

    let entry_h = hs.pin(entry);
    let pst = node_pst(syntax_node);
    let child_node = try_step!(cx, alloc::alloc_syntax_node(cx, pst, stmt_offset));
    let child = try_step!(
        cx,
        alloc::alloc_invoke_syntax_frame(cx, frame_h.get(), entry_h.get(), child_node)
    );
    StepResult::Continue(child)
}

fn resolve_file(cx: &mut ThreadContext, frame: ValBox, result: EvalResult) -> StepResult {
    if result.is_abrupt() {
        return forward_resolve(cx, frame, result);
    }
    let hs = HandleScope::new(cx);
    let _frame_h = hs.pin(frame);
    let (entry, syntax_node, statement_no, parent) = unsafe {
        let f: &FileSyntaxFrame = frame.as_ref();
        (f.entry, f.syntax_node, f.statement_no, f.core.parent)
    };
    let count = with_node(syntax_node, |node| node.file_num_statements());
    if statement_no as usize + 1 >= count {
        // The last statement's result is the file's result.
        return resolve(cx, parent, result);
    }
    let next = try_step!(
        cx,
        alloc::alloc_file_frame(cx, parent, entry, syntax_node, statement_no + 1)
    );
    StepResult::Continue(next)
}

// ── BlockSyntaxFrame ───────────────────────────────────────────────

fn step_block(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let (entry, syntax_node, statement_no) = unsafe {
        let f: &BlockSyntaxFrame = frame.as_ref();
        (f.entry, f.syntax_node, f.statement_no)
    };
    let (count, stmt_offset) = with_sized_block(syntax_node, |block| {
        let count = block.num_statements();
        let offset = if (statement_no as usize) < count {
            block.statement(statement_no as usize).offset as u32
        } else {
            0
        };
        (count, offset)
    });
    if statement_no as usize >= count {
        return resolve(cx, frame_parent(frame_h.get()), EvalResult::Void);
    }

    let entry_h = hs.pin(entry);
    let pst = node_pst(syntax_node);
    let child_node = try_step!(cx, alloc::alloc_syntax_node(cx, pst, stmt_offset));
    let child = try_step!(
        cx,
        alloc::alloc_invoke_syntax_frame(cx, frame_h.get(), entry_h.get(), child_node)
    );
    StepResult::Continue(child)
}

fn resolve_block(cx: &mut ThreadContext, frame: ValBox, result: EvalResult) -> StepResult {
    if result.is_abrupt() {
        return forward_resolve(cx, frame, result);
    }
    let hs = HandleScope::new(cx);
    let _frame_h = hs.pin(frame);
    let (entry, syntax_node, statement_no, parent) = unsafe {
        let f: &BlockSyntaxFrame = frame.as_ref();
        (f.entry, f.syntax_node, f.statement_no, f.core.parent)
    };
    let count = with_sized_block(syntax_node, |block| block.num_statements());
    if statement_no as usize + 1 >= count {
        // The last statement's result is the block's result.
        return resolve(cx, parent, result);
    }
    let next = try_step!(
        cx,
        alloc::alloc_block_frame(cx, parent, entry, syntax_node, statement_no + 1)
    );
    StepResult::Continue(next)
}

// ── ReturnStmtSyntaxFrame ──────────────────────────────────────────

fn step_return(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let (entry, syntax_node) = unsafe {
        let f: &ReturnStmtSyntaxFrame = frame.as_ref();
        (f.entry, f.syntax_node)
    };
    let expr_offset = with_node(syntax_node, |node| {
        if node.return_has_expression() {
            Some(node.return_expression().offset as u32)
        } else {
            None
        }
    });
    let Some(expr_offset) = expr_offset else {
        return resolve(cx, frame_h.get(), EvalResult::Value(ValBox::undefined()));
    };

    let entry_h = hs.pin(entry);
    let pst = node_pst(syntax_node);
    let child_node = try_step!(cx, alloc::alloc_syntax_node(cx, pst, expr_offset));
    let child = try_step!(
        cx,
        alloc::alloc_invoke_syntax_frame(cx, frame_h.get(), entry_h.get(), child_node)
    );
    StepResult::Continue(child)
}

fn resolve_return(cx: &mut ThreadContext, frame: ValBox, result: EvalResult) -> StepResult {
    if result.is_abrupt() {
        return forward_resolve(cx, frame, result);
    }
    let value = match result {
        EvalResult::Value(v) => v,
        _ => {
            return raise(cx, frame, "Return expression resolved to a void value.", &[])
        }
    };

    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let value_h = hs.pin(value);
    let entry = unsafe { frame.as_ref::<ReturnStmtSyntaxFrame>().entry };
    let scope = entry_scope(entry);
    let retcont_name = cx.state.name_retcont;

    match interp::get_object_property(cx, scope, retcont_name) {
        PropertyFlow::NotFound => {
            raise(cx, frame_h.get(), "return used in non-returnable context.", &[])
        }
        PropertyFlow::Error => StepResult::Error,
        PropertyFlow::Value(binding) => {
            if !binding.is_object_ref() {
                return raise(
                    cx,
                    frame_h.get(),
                    "@retcont binding is not an object.",
                    &[binding],
                );
            }
            let format = unsafe { binding.as_ref::<HeapHeader>().format() };
            if format != HeapFormat::Continuation {
                return raise(
                    cx,
                    frame_h.get(),
                    "@retcont binding is not a continuation.",
                    &[binding],
                );
            }
            // Long-jump: resolve the continuation's captured frame with
            // the returned value. Frames between become garbage.
            let target = unsafe { binding.as_ref::<Continuation>().frame };
            spew!(cx, "return continues at captured frame");
            resolve(cx, target, EvalResult::Value(value_h.get()))
        }
    }
}

// ── VarSyntaxFrame ─────────────────────────────────────────────────

fn step_var(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);

    loop {
        let (entry, syntax_node, binding_no, last_value) = unsafe {
            let frame_h_val = frame_h.get();
            let f: &VarSyntaxFrame = frame_h_val.as_ref();
            (f.entry, f.syntax_node, f.binding_no, f.last_value)
        };
        let (count, is_const, name_cid, has_init, init_offset) =
            with_node(syntax_node, |node| {
                let count = node.var_num_bindings();
                let is_const = node.node_type() == Some(NodeType::ConstStmt);
                if (binding_no as usize) < count {
                    let has_init = node.var_has_init(binding_no as usize);
                    let init_offset = if has_init {
                        node.var_init(binding_no as usize).offset as u32
                    } else {
                        0
                    };
                    (
                        count,
                        is_const,
                        node.var_name_cid(binding_no as usize),
                        has_init,
                        init_offset,
                    )
                } else {
                    (count, is_const, 0, false, 0)
                }
            });

        if binding_no as usize >= count {
            return resolve(
                cx,
                frame_parent(frame_h.get()),
                EvalResult::Value(last_value),
            );
        }

        if !has_init {
            if is_const {
                cx.set_internal_error("const binding without initializer");
                return StepResult::Error;
            }
            // Uninitialized `var` bindings are pre-bound to Undefined.
            let name = node_constant(syntax_node, name_cid);
            let scope = entry_scope(entry);
            if alloc::define_value_property(cx, scope, name, ValBox::undefined(), true)
                .is_none()
            {
                return StepResult::Error;
            }
            unsafe {
                frame_h.get().as_mut::<VarSyntaxFrame>().binding_no = binding_no + 1;
            }
            continue;
        }

        let entry_h = hs.pin(entry);
        let pst = node_pst(syntax_node);
        let child_node = try_step!(cx, alloc::alloc_syntax_node(cx, pst, init_offset));
        let child = try_step!(
            cx,
            alloc::alloc_invoke_syntax_frame(cx, frame_h.get(), entry_h.get(), child_node)
        );
        return StepResult::Continue(child);
    }
}

fn resolve_var(cx: &mut ThreadContext, frame: ValBox, result: EvalResult) -> StepResult {
    if result.is_abrupt() {
        return forward_resolve(cx, frame, result);
    }
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let (entry, syntax_node, binding_no) = unsafe {
        let f: &VarSyntaxFrame = frame.as_ref();
        (f.entry, f.syntax_node, f.binding_no)
    };
    let (is_const, name_cid) = with_node(syntax_node, |node| {
        (
            node.node_type() == Some(NodeType::ConstStmt),
            node.var_name_cid(binding_no as usize),
        )
    });
    let name = node_constant(syntax_node, name_cid);

    let value = match result {
        EvalResult::Value(v) => v,
        _ => {
            return raise(
                cx,
                frame_h.get(),
                "Variable initializer resolved to a void value.",
                &[name],
            )
        }
    };

    let value_h = hs.pin(value);
    let scope = entry_scope(entry);
    if alloc::define_value_property(cx, scope, name, value, !is_const).is_none() {
        return StepResult::Error;
    }
    unsafe {
        let frame_h_val = frame_h.get();
        let f: &mut VarSyntaxFrame = frame_h_val.as_mut();
        f.last_value = value_h.get();
        f.binding_no = binding_no + 1;
    }
    cx.barrier(frame_h.get());
    // Continue scanning remaining bindings from step.
    StepResult::Continue(frame_h.get())
}

// ── CallExprSyntaxFrame ────────────────────────────────────────────

fn step_call_expr(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let (entry, syntax_node, state, arg_no, callee, callee_func, operands) = unsafe {
        let f: &CallExprSyntaxFrame = frame.as_ref();
        (
            f.entry,
            f.syntax_node,
            f.state,
            f.arg_no,
            f.callee,
            f.callee_func,
            f.operands,
        )
    };

    match state {
        CALL_STATE_CALLEE => {
            let callee_offset =
                with_node(syntax_node, |node| node.call_callee().offset as u32);
            let entry_h = hs.pin(entry);
            let pst = node_pst(syntax_node);
            let child_node = try_step!(cx, alloc::alloc_syntax_node(cx, pst, callee_offset));
            let child = try_step!(
                cx,
                alloc::alloc_invoke_syntax_frame(cx, frame_h.get(), entry_h.get(), child_node)
            );
            StepResult::Continue(child)
        }
        CALL_STATE_ARG => {
            let arg_offset = with_node(syntax_node, |node| {
                node.call_arg(arg_no as usize).offset as u32
            });
            let entry_h = hs.pin(entry);
            let pst = node_pst(syntax_node);
            let child_node = try_step!(cx, alloc::alloc_syntax_node(cx, pst, arg_offset));
            let child = try_step!(
                cx,
                alloc::alloc_invoke_syntax_frame(cx, frame_h.get(), entry_h.get(), child_node)
            );
            StepResult::Continue(child)
        }
        _ => {
            debug_assert_eq!(state, CALL_STATE_INVOKE);
            let operative = unsafe {
                function_is_operative(callee_func.as_ref::<FunctionObject>().func)
            };
            if operative {
                debug_assert!(operands.is_null());
                let child = try_step!(
                    cx,
                    alloc::alloc_invoke_operative_frame(
                        cx,
                        frame_h.get(),
                        callee,
                        callee_func,
                        syntax_node,
                    )
                );
                StepResult::Continue(child)
            } else {
                let child = try_step!(
                    cx,
                    alloc::alloc_invoke_applicative_frame(
                        cx,
                        frame_h.get(),
                        callee,
                        callee_func,
                        operands,
                    )
                );
                StepResult::Continue(child)
            }
        }
    }
}

fn resolve_call_expr(cx: &mut ThreadContext, frame: ValBox, result: EvalResult) -> StepResult {
    if result.is_abrupt() {
        return forward_resolve(cx, frame, result);
    }
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let (syntax_node, state, arg_no) = unsafe {
        let f: &CallExprSyntaxFrame = frame.as_ref();
        (f.syntax_node, f.state, f.arg_no)
    };

    match state {
        CALL_STATE_CALLEE => {
            let value = match result {
                EvalResult::Value(v) => v,
                _ => {
                    return raise(
                        cx,
                        frame_h.get(),
                        "Callee expression resolved to a void value.",
                        &[],
                    )
                }
            };
            if !is_function_object(value) {
                return raise(
                    cx,
                    frame_h.get(),
                    "Callee expression is not callable",
                    &[value],
                );
            }
            let operative = unsafe {
                function_is_operative(value.as_ref::<FunctionObject>().func)
            };
            let num_args = with_node(syntax_node, |node| node.call_num_args());
            unsafe {
                let frame_h_val = frame_h.get();
                let f: &mut CallExprSyntaxFrame = frame_h_val.as_mut();
                f.callee = value;
                f.callee_func = value;
                if operative || num_args == 0 {
                    // Operatives take their arguments unevaluated;
                    // zero-arity applicatives have nothing to evaluate.
                    f.state = CALL_STATE_INVOKE;
                    f.operands = ValBox::null();
                } else {
                    f.state = CALL_STATE_ARG;
                    f.arg_no = 0;
                    f.operands = ValBox::null();
                }
            }
            cx.barrier(frame_h.get());
            StepResult::Continue(frame_h.get())
        }
        CALL_STATE_ARG => {
            let value = match result {
                EvalResult::Value(v) => v,
                _ => {
                    return raise(
                        cx,
                        frame_h.get(),
                        "Call argument resolved to a void value.",
                        &[],
                    )
                }
            };
            let num_args = with_node(syntax_node, |node| node.call_num_args());
            let operands = unsafe {
                frame.as_ref::<CallExprSyntaxFrame>().operands
            };
            // Prepend; invocation reverses into positional order.
            let node = try_step!(cx, alloc::alloc_slist_node(cx, value, operands));
            unsafe {
                let frame_h_val = frame_h.get();
                let f: &mut CallExprSyntaxFrame = frame_h_val.as_mut();
                f.operands = node;
                if arg_no as usize + 1 >= num_args {
                    f.state = CALL_STATE_INVOKE;
                } else {
                    f.arg_no = arg_no + 1;
                }
            }
            cx.barrier(frame_h.get());
            StepResult::Continue(frame_h.get())
        }
        _ => {
            debug_assert_eq!(state, CALL_STATE_INVOKE);
            forward_resolve(cx, frame_h.get(), result)
        }
    }
}

// ── InvokeApplicativeFrame ─────────────────────────────────────────

fn step_invoke_applicative(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let callee_func = unsafe { frame.as_ref::<InvokeApplicativeFrame>().callee_func };
    let func = unsafe { callee_func.as_ref::<FunctionObject>().func };
    let format = unsafe { func.as_ref::<HeapHeader>().format() };

    match format {
        HeapFormat::NativeFunction => {
            // Reverse the operand slist into a rooted argument array.
            let args = try_step!(cx, alloc::alloc_reversed_operand_array(cx, frame_h.get()));
            cx.state.top_frame = frame_h.get();
            let result =
                interp::invoke_native_applicative(cx, frame_h.get(), args);
            interp::finish_call(cx, frame_h.get(), result)
        }
        HeapFormat::ScriptedFunction => step_invoke_scripted(cx, &hs, frame_h.get()),
        _ => {
            cx.set_internal_error("unknown function kind");
            StepResult::Error
        }
    }
}

/// Enter a scripted function body: fresh call scope over the captured
/// scope, positional parameters bound, a fresh continuation bound
/// under `@retcont`, then the body block.
fn step_invoke_scripted(
    cx: &mut ThreadContext,
    hs: &HandleScope,
    frame: ValBox,
) -> StepResult {
    let frame_h = hs.pin(frame);
    let (func, operands) = unsafe {
        let f: &InvokeApplicativeFrame = frame.as_ref();
        (f.callee_func.as_ref::<FunctionObject>().func, f.operands)
    };
    let (pst, def_offset, captured_scope) = unsafe {
        let scripted: &ScriptedFunction = func.as_ref();
        (scripted.pst, scripted.offset, scripted.scope_chain)
    };
    let num_params = {
        let data = unsafe { pst.as_ref::<PackedSyntaxTree>().words() };
        NodeRef::new(data, def_offset as usize).def_num_params()
    };
    let num_args = unsafe { crate::objects::slist_len(operands) };
    if num_args != num_params {
        return raise(cx, frame_h.get(), "Arguments do not match formal parameters.", &[]);
    }

    let func_h = hs.pin(func);
    let call_scope = try_step!(
        cx,
        alloc::alloc_scope(cx, HeapFormat::CallScope, &[captured_scope], 8)
    );
    let scope_h = hs.pin(call_scope);

    // Bind positional parameters. The operand slist is reversed, so
    // walk from the tail index downward.
    for i in 0..num_params {
        let (pst_now, name_cid) = unsafe {
            let func_h_val = func_h.get();
            let scripted: &ScriptedFunction = func_h_val.as_ref();
            let data = scripted.pst.as_ref::<PackedSyntaxTree>().words();
            (
                scripted.pst,
                NodeRef::new(data, scripted.offset as usize).def_param_cid(i),
            )
        };
        let name = unsafe { pst_now.as_ref::<PackedSyntaxTree>().constant(name_cid) };
        let value = unsafe {
            let operands_now = frame_h.get().as_ref::<InvokeApplicativeFrame>().operands;
            nth_from_reversed(operands_now, num_params - 1 - i)
        };
        if alloc::define_value_property(cx, scope_h.get(), name, value, true).is_none() {
            return StepResult::Error;
        }
    }

    // `return` resolves this frame's parent with the returned value.
    let retcont = try_step!(
        cx,
        alloc::alloc_continuation(cx, frame_parent(frame_h.get()))
    );
    let retcont_name = cx.state.name_retcont;
    if alloc::define_value_property(cx, scope_h.get(), retcont_name, retcont, false)
        .is_none()
    {
        return StepResult::Error;
    }

    let (pst_now, def_offset, body_offset) = unsafe {
        let func_h_val = func_h.get();
        let scripted: &ScriptedFunction = func_h_val.as_ref();
        let data = scripted.pst.as_ref::<PackedSyntaxTree>().words();
        let node = NodeRef::new(data, scripted.offset as usize);
        (
            scripted.pst,
            scripted.offset,
            node.def_body_block().offset as u32,
        )
    };
    let def_node = try_step!(cx, alloc::alloc_syntax_node(cx, pst_now, def_offset));
    let body_entry = try_step!(
        cx,
        alloc::alloc_entry_frame(cx, frame_h.get(), def_node, scope_h.get())
    );
    let entry_h = hs.pin(body_entry);
    let pst_now = unsafe { func_h.get().as_ref::<ScriptedFunction>().pst };
    let body_node = try_step!(cx, alloc::alloc_syntax_node(cx, pst_now, body_offset));
    let block = try_step!(
        cx,
        alloc::alloc_block_frame(cx, entry_h.get(), entry_h.get(), body_node, 0)
    );
    StepResult::Continue(block)
}

/// Element at `index` of a reversed operand slist, counting from the
/// list head.
///
/// # Safety callers: the list nodes must be live.
fn nth_from_reversed(mut list: ValBox, index: usize) -> ValBox {
    unsafe {
        for _ in 0..index {
            list = list.as_ref::<crate::objects::SlistNode>().next;
        }
        list.as_ref::<crate::objects::SlistNode>().value
    }
}

fn resolve_invoke_applicative(
    cx: &mut ThreadContext,
    frame: ValBox,
    result: EvalResult,
) -> StepResult {
    match result {
        EvalResult::Error | EvalResult::Exc { .. } => forward_resolve(cx, frame, result),
        // A body that completes without `return` yields Undefined.
        EvalResult::Void => resolve(
            cx,
            frame_parent(frame),
            EvalResult::Value(ValBox::undefined()),
        ),
        EvalResult::Value(_) => forward_resolve(cx, frame, result),
    }
}

// ── InvokeOperativeFrame ───────────────────────────────────────────

fn step_invoke_operative(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let (callee_func, syntax_node) = unsafe {
        let f: &InvokeOperativeFrame = frame.as_ref();
        (f.callee_func, f.syntax_node)
    };
    let func = unsafe { callee_func.as_ref::<FunctionObject>().func };
    let format = unsafe { func.as_ref::<HeapHeader>().format() };

    match format {
        HeapFormat::NativeFunction => {
            // One unevaluated syntax node per raw argument.
            let num_args = with_node(syntax_node, |node| node.call_num_args());
            let args_arr = try_step!(cx, alloc::alloc_box_array(cx, num_args));
            let args_h = hs.pin(args_arr);
            for i in 0..num_args {
                let syntax_now = unsafe {
                    frame_h.get().as_ref::<InvokeOperativeFrame>().syntax_node
                };
                let arg_offset = with_node(syntax_now, |node| {
                    node.call_arg(i).offset as u32
                });
                let pst = node_pst(syntax_now);
                let arg_node = try_step!(cx, alloc::alloc_syntax_node(cx, pst, arg_offset));
                unsafe {
                    args_h.get().as_mut::<object::BoxArray>().set(i, arg_node);
                }
                cx.barrier(args_h.get());
            }
            cx.state.top_frame = frame_h.get();
            let result =
                interp::invoke_native_operative_with(cx, frame_h.get(), args_h.get());
            interp::finish_call(cx, frame_h.get(), result)
        }
        HeapFormat::ScriptedFunction => {
            cx.set_internal_error("cannot invoke a scripted operative");
            StepResult::Error
        }
        _ => {
            cx.set_internal_error("unknown function kind");
            StepResult::Error
        }
    }
}

// ── DotExprSyntaxFrame ─────────────────────────────────────────────

fn step_dot(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let (entry, syntax_node) = unsafe {
        let f: &DotExprSyntaxFrame = frame.as_ref();
        (f.entry, f.syntax_node)
    };
    let target_offset =
        with_node(syntax_node, |node| node.access_target().offset as u32);
    let entry_h = hs.pin(entry);
    let pst = node_pst(syntax_node);
    let child_node = try_step!(cx, alloc::alloc_syntax_node(cx, pst, target_offset));
    let child = try_step!(
        cx,
        alloc::alloc_invoke_syntax_frame(cx, frame_h.get(), entry_h.get(), child_node)
    );
    StepResult::Continue(child)
}

fn resolve_dot(cx: &mut ThreadContext, frame: ValBox, result: EvalResult) -> StepResult {
    if result.is_abrupt() {
        return forward_resolve(cx, frame, result);
    }
    let target = match result {
        EvalResult::Value(v) => v,
        _ => {
            return raise(
                cx,
                frame,
                "Property access target resolved to a void value.",
                &[],
            )
        }
    };

    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let target_h = hs.pin(target);
    let (entry, syntax_node, is_arrow) = unsafe {
        let f: &DotExprSyntaxFrame = frame.as_ref();
        (f.entry, f.syntax_node, f.is_arrow != 0)
    };
    let selector = if is_arrow {
        cx.state.name_arrow
    } else {
        cx.state.name_dot
    };
    let (missing, not_function, applicative) = if is_arrow {
        (
            "@Arrow binding not found.",
            "@Arrow binding is not a function.",
            "@Arrow binding is applicative.",
        )
    } else {
        (
            "@Dot binding not found.",
            "@Dot binding is not a function.",
            "@Dot binding is applicative.",
        )
    };

    let scope = entry_scope(entry);
    let scope_h = hs.pin(scope);
    let syntax_h = hs.pin(syntax_node);

    match interp::get_object_property(cx, target_h.get(), selector) {
        PropertyFlow::NotFound => raise(cx, frame_h.get(), missing, &[target_h.get()]),
        PropertyFlow::Error => StepResult::Error,
        PropertyFlow::Value(binding) => {
            if !is_function_object(binding) {
                return raise(cx, frame_h.get(), not_function, &[binding]);
            }
            let func = unsafe { binding.as_ref::<FunctionObject>().func };
            if !unsafe { function_is_operative(func) } {
                return raise(cx, frame_h.get(), applicative, &[binding]);
            }
            cx.state.top_frame = frame_h.get();
            let call_result = interp::invoke_operative(
                cx,
                binding,
                scope_h.get(),
                &[syntax_h.get()],
            );
            interp::finish_call(cx, frame_h.get(), call_result)
        }
    }
}

// ── NativeCallResumeFrame ──────────────────────────────────────────

fn step_native_resume(cx: &mut ThreadContext, frame: ValBox) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    let (eval_scope, syntax_node) = unsafe {
        let f: &NativeCallResumeFrame = frame.as_ref();
        (f.eval_scope, f.syntax_node)
    };
    let child = try_step!(
        cx,
        alloc::alloc_entry_frame(cx, frame_h.get(), syntax_node, eval_scope)
    );
    StepResult::Continue(child)
}

fn resolve_native_resume(
    cx: &mut ThreadContext,
    frame: ValBox,
    result: EvalResult,
) -> StepResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(frame);
    // Natives running on behalf of this frame see it as the top, so
    // their own children parent correctly.
    cx.state.top_frame = frame;
    let result = interp::call_resume(cx, frame_h.get(), result);
    interp::finish_call(cx, frame_h.get(), result)
}
