//! The default native syntactic handlers.
//!
//! The runtime seeds every new global scope with operative bindings
//! implementing the default semantics of each node type. Because
//! dispatch happens per node, rebinding any `@…` method on a scope
//! changes the language's semantics for that subtree and nothing else.
//!
//! Handlers that need a sub-expression evaluated return
//! `CallResult::Continue` with a resume frame instead of re-entering
//! the trampoline; the saved state rides along as a heap value.

use object::{number_value, BoxArray, ValBox};
use syntax::NodeType;

use crate::alloc::{self, ResumeCapture};
use crate::frame::{
    self, frame_parent, node_constant, node_pst, with_node,
};
use crate::function::{NativeCallInfo, NativeOperativeFn, SyntaxArgs};
use crate::handles::{Handle, HandleScope};
use crate::interp::{self, PropertyFlow};
use crate::result::{try_call, CallResult, EvalResult};
use crate::runtime::ThreadContext;
use crate::spew::spew;

/// Bind the default operative handlers plus the value-level dotting
/// protocol onto a freshly created global scope.
pub fn bind_syntax_handlers(cx: &mut ThreadContext, scope: ValBox) -> Option<()> {
    const HANDLERS: [(NodeType, NativeOperativeFn); 21] = [
        (NodeType::File, lift_file),
        (NodeType::EmptyStmt, lift_empty_stmt),
        (NodeType::ExprStmt, lift_expr_stmt),
        (NodeType::ReturnStmt, lift_return_stmt),
        (NodeType::IfStmt, lift_if_stmt),
        (NodeType::DefStmt, lift_def_stmt),
        (NodeType::ConstStmt, lift_binding_stmt),
        (NodeType::VarStmt, lift_binding_stmt),
        (NodeType::LoopStmt, lift_loop_stmt),
        (NodeType::CallExpr, lift_call_expr),
        (NodeType::DotExpr, lift_dot_expr),
        (NodeType::ArrowExpr, lift_arrow_expr),
        (NodeType::PosExpr, lift_unary_expr),
        (NodeType::NegExpr, lift_unary_expr),
        (NodeType::AddExpr, lift_binary_expr),
        (NodeType::SubExpr, lift_binary_expr),
        (NodeType::MulExpr, lift_binary_expr),
        (NodeType::DivExpr, lift_binary_expr),
        (NodeType::ParenExpr, lift_paren_expr),
        (NodeType::NameExpr, lift_name_expr),
        (NodeType::IntegerExpr, lift_integer_expr),
    ];

    let hs = HandleScope::new(cx);
    let scope_h = hs.pin(scope);
    for (node_type, handler) in HANDLERS {
        let func = alloc::alloc_native_operative(cx, handler)?;
        let name = cx.syntax_name(node_type);
        alloc::define_method_property(cx, scope_h.get(), name, func)?;
    }

    // Default dotting protocol looked up on values by the dot frame.
    let dot = alloc::alloc_native_operative(cx, value_property_access)?;
    let dot_name = cx.state.name_dot;
    alloc::define_method_property(cx, scope_h.get(), dot_name, dot)?;
    let arrow = alloc::alloc_native_operative(cx, value_property_access)?;
    let arrow_name = cx.state.name_arrow;
    alloc::define_method_property(cx, scope_h.get(), arrow_name, arrow)?;
    Some(())
}

// ── Plumbing ───────────────────────────────────────────────────────

fn raise_call(
    cx: &mut ThreadContext,
    message: &'static str,
    args: &[ValBox],
) -> CallResult {
    spew!(cx, "raise: {message}");
    let exception = try_call!(cx, alloc::alloc_exception(cx, message, args));
    CallResult::Exc {
        raising_frame: cx.state.top_frame,
        exception,
    }
}

fn capture(info: &NativeCallInfo) -> ResumeCapture {
    ResumeCapture {
        lookup_state: info.lookup_state.get(),
        caller_scope: info.caller_scope.get(),
        callee_func: info.callee_func.get(),
        receiver: info.receiver.get(),
    }
}

/// Suspend the current native: evaluate `(pst, offset)` under the
/// caller scope, then re-enter through `resume_fn` with `state`. The
/// resume frame's parent is the frame the native runs on behalf of.
fn suspend_over(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    parent: ValBox,
    pst: ValBox,
    offset: u32,
    resume_fn: crate::function::NativeResumeFn,
    state: ValBox,
) -> CallResult {
    let hs = HandleScope::new(cx);
    let parent_h = hs.pin(parent);
    let state_h = hs.pin(state);
    let node = try_call!(cx, alloc::alloc_syntax_node(cx, pst, offset));
    let scope = info.caller_scope.get();
    let resume = try_call!(
        cx,
        alloc::alloc_resume_frame(
            cx,
            parent_h.get(),
            capture(info),
            scope,
            node,
            resume_fn,
            state_h.get(),
        )
    );
    CallResult::Continue(resume)
}

/// Forward a sub-evaluation's result unchanged.
fn resume_forward(
    _cx: &mut ThreadContext,
    _info: &NativeCallInfo,
    _state: Handle<'_>,
    result: EvalResult,
) -> CallResult {
    eval_to_call(result)
}

fn eval_to_call(result: EvalResult) -> CallResult {
    match result {
        EvalResult::Value(v) => CallResult::Value(v),
        EvalResult::Void => CallResult::Void,
        EvalResult::Error => CallResult::Error,
        EvalResult::Exc {
            raising_frame,
            exception,
        } => CallResult::Exc {
            raising_frame,
            exception,
        },
    }
}

/// Arity guard: every syntactic handler takes exactly one syntax
/// argument.
macro_rules! expect_one_arg {
    ($cx:expr, $args:expr, $msg:expr) => {
        if $args.len() != 1 {
            return raise_call($cx, $msg, &[]);
        }
    };
}

fn current_entry(cx: &mut ThreadContext) -> Option<ValBox> {
    frame::ancestor_entry_frame(cx.state.top_frame)
}

// ── Statement handlers ─────────────────────────────────────────────

fn lift_file(
    cx: &mut ThreadContext,
    _info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@File called with wrong number of arguments.");
    let Some(entry) = current_entry(cx) else {
        cx.set_internal_error("no entry frame for @File");
        return CallResult::Error;
    };
    let top = cx.state.top_frame;
    let file = try_call!(cx, alloc::alloc_file_frame(cx, top, entry, args.node(0), 0));
    CallResult::Continue(file)
}

fn lift_empty_stmt(
    cx: &mut ThreadContext,
    _info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@EmptyStmt called with wrong number of arguments.");
    CallResult::Void
}

fn lift_expr_stmt(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@ExprStmt called with wrong number of arguments.");
    let node = args.node(0);
    let offset = with_node(node, |n| n.subexpression().offset as u32);
    let top = cx.state.top_frame;
    suspend_over(
        cx,
        info,
        top,
        node_pst(node),
        offset,
        resume_forward,
        ValBox::undefined(),
    )
}

fn lift_return_stmt(
    cx: &mut ThreadContext,
    _info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@ReturnStmt called with wrong number of arguments.");
    let Some(entry) = current_entry(cx) else {
        cx.set_internal_error("no entry frame for @ReturnStmt");
        return CallResult::Error;
    };
    let top = cx.state.top_frame;
    let ret = try_call!(cx, alloc::alloc_return_frame(cx, top, entry, args.node(0)));
    CallResult::Continue(ret)
}

fn lift_def_stmt(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@DefStmt called with wrong number of arguments.");
    let receiver = info.receiver.get();
    if !receiver.is_object_ref() {
        return raise_call(cx, "Cannot define method on primitive.", &[receiver]);
    }

    let node = args.node(0);
    let (offset, name_cid) = (
        crate::frame::node_offset(node),
        with_node(node, |n| n.def_name_cid()),
    );
    let func = try_call!(
        cx,
        alloc::alloc_scripted_function(
            cx,
            node_pst(node),
            offset,
            info.caller_scope.get(),
            false,
        )
    );
    // Bind the function as a method so calls reify it against the
    // scope they find it on.
    let name = node_constant(args.node(0), name_cid);
    let receiver = info.receiver.get();
    if alloc::define_method_property(cx, receiver, name, func).is_none() {
        return CallResult::Error;
    }
    CallResult::Void
}

fn lift_binding_stmt(
    cx: &mut ThreadContext,
    _info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    if args.len() != 1 {
        let is_const = args.len() >= 1
            && with_node(args.node(0), |n| n.node_type()) == Some(NodeType::ConstStmt);
        let message = if is_const {
            "@ConstStmt called with wrong number of arguments."
        } else {
            "@VarStmt called with wrong number of arguments."
        };
        return raise_call(cx, message, &[]);
    }
    let Some(entry) = current_entry(cx) else {
        cx.set_internal_error("no entry frame for binding statement");
        return CallResult::Error;
    };
    let top = cx.state.top_frame;
    let var = try_call!(cx, alloc::alloc_var_frame(cx, top, entry, args.node(0)));
    CallResult::Continue(var)
}

// ── If / loop ──────────────────────────────────────────────────────

fn lift_if_stmt(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@IfStmt called with wrong number of arguments.");
    let node = args.node(0);
    let cond_offset = with_node(node, |n| n.if_cond().offset as u32);
    let state = try_call!(cx, branch_state(cx, node, 0));
    // Re-read through the rooted argument array; the state allocation
    // may have moved the node.
    let node = args.node(0);
    let top = cx.state.top_frame;
    suspend_over(
        cx,
        info,
        top,
        node_pst(node),
        cond_offset,
        resume_if_cond,
        state,
    )
}

/// `[syntax_node, Magic(branch_index)]`; index 0 is the main
/// condition, `i > 0` is elsif `i - 1`.
fn branch_state(cx: &mut ThreadContext, node: ValBox, index: u32) -> Option<ValBox> {
    let hs = HandleScope::new(cx);
    let node_h = hs.pin(node);
    let arr = alloc::alloc_box_array(cx, 2)?;
    unsafe {
        let boxed: &mut BoxArray = arr.as_mut();
        boxed.set(0, node_h.get());
        boxed.set(1, ValBox::magic(index));
    }
    Some(arr)
}

fn truthiness(value: ValBox) -> Option<bool> {
    if value.is_bool() {
        Some(value.as_bool())
    } else if value.is_int32() {
        Some(value.as_int32() != 0)
    } else {
        None
    }
}

fn resume_if_cond(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    state: Handle<'_>,
    result: EvalResult,
) -> CallResult {
    if result.is_abrupt() {
        return eval_to_call(result);
    }
    let value = match result {
        EvalResult::Value(v) => v,
        _ => return raise_call(cx, "If condition resolved to a void value.", &[]),
    };
    let Some(truthy) = truthiness(value) else {
        return raise_call(cx, "If condition is not a boolean.", &[value]);
    };

    let (node, index) = unsafe {
        let state_val = state.get();
        let arr: &BoxArray = state_val.as_ref();
        (arr.at(0), arr.at(1).magic_payload())
    };
    let (num_elsifs, has_else) =
        with_node(node, |n| (n.if_num_elsifs(), n.if_has_else()));

    if truthy {
        let block_offset = with_node(node, |n| {
            if index == 0 {
                n.if_block().offset as u32
            } else {
                n.if_elsif_block(index as usize - 1).offset as u32
            }
        });
        return continue_block(cx, node, block_offset);
    }

    // This branch was false; test the next one.
    let next = index + 1;
    if (next as usize) <= num_elsifs {
        let cond_offset = with_node(node, |n| {
            n.if_elsif_cond(next as usize - 1).offset as u32
        });
        let hs = HandleScope::new(cx);
        let node_h = hs.pin(node);
        let state = try_call!(cx, branch_state(cx, node_h.get(), next));
        let parent = frame_parent(cx.state.top_frame);
        return suspend_over(
            cx,
            info,
            parent,
            node_pst(node_h.get()),
            cond_offset,
            resume_if_cond,
            state,
        );
    }
    if has_else {
        let block_offset = with_node(node, |n| n.if_else_block().offset as u32);
        return continue_block(cx, node, block_offset);
    }
    CallResult::Void
}

/// Run a sized block in place of the current resume frame.
fn continue_block(cx: &mut ThreadContext, node: ValBox, block_offset: u32) -> CallResult {
    let Some(entry) = current_entry(cx) else {
        cx.set_internal_error("no entry frame for block");
        return CallResult::Error;
    };
    let hs = HandleScope::new(cx);
    let entry_h = hs.pin(entry);
    let block_node = try_call!(
        cx,
        alloc::alloc_syntax_node(cx, node_pst(node), block_offset)
    );
    let parent = frame_parent(cx.state.top_frame);
    let block = try_call!(
        cx,
        alloc::alloc_block_frame(cx, parent, entry_h.get(), block_node, 0)
    );
    CallResult::Continue(block)
}

fn lift_loop_stmt(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@LoopStmt called with wrong number of arguments.");
    let node = args.node(0);
    let count = with_node(node, |n| n.loop_body().num_statements());
    if count == 0 {
        // A body-less loop has no statement to park the resume cycle
        // on; it completes instead of spinning.
        return CallResult::Void;
    }
    let first_offset = with_node(node, |n| n.loop_body().statement(0).offset as u32);
    let state = try_call!(cx, branch_state(cx, node, 0));
    let node = args.node(0);
    let top = cx.state.top_frame;
    suspend_over(
        cx,
        info,
        top,
        node_pst(node),
        first_offset,
        resume_loop,
        state,
    )
}

fn resume_loop(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    state: Handle<'_>,
    result: EvalResult,
) -> CallResult {
    if result.is_abrupt() {
        return eval_to_call(result);
    }
    let (node, index) = unsafe {
        let state_val = state.get();
        let arr: &BoxArray = state_val.as_ref();
        (arr.at(0), arr.at(1).magic_payload())
    };
    let count = with_node(node, |n| n.loop_body().num_statements()) as u32;
    let next = (index + 1) % count;
    let offset = with_node(node, |n| {
        n.loop_body().statement(next as usize).offset as u32
    });
    let hs = HandleScope::new(cx);
    let node_h = hs.pin(node);
    let state = try_call!(cx, branch_state(cx, node_h.get(), next));
    let parent = frame_parent(cx.state.top_frame);
    suspend_over(
        cx,
        info,
        parent,
        node_pst(node_h.get()),
        offset,
        resume_loop,
        state,
    )
}

// ── Call / access handlers ─────────────────────────────────────────

fn lift_call_expr(
    cx: &mut ThreadContext,
    _info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@CallExpr called with wrong number of arguments.");
    let Some(entry) = current_entry(cx) else {
        cx.set_internal_error("no entry frame for @CallExpr");
        return CallResult::Error;
    };
    let top = cx.state.top_frame;
    let call = try_call!(cx, alloc::alloc_call_expr_frame(cx, top, entry, args.node(0)));
    CallResult::Continue(call)
}

fn lift_dot_expr(
    cx: &mut ThreadContext,
    _info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@DotExpr called with wrong number of arguments.");
    lift_access(cx, args, false)
}

fn lift_arrow_expr(
    cx: &mut ThreadContext,
    _info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@ArrowExpr called with wrong number of arguments.");
    lift_access(cx, args, true)
}

fn lift_access(cx: &mut ThreadContext, args: &SyntaxArgs, is_arrow: bool) -> CallResult {
    let Some(entry) = current_entry(cx) else {
        cx.set_internal_error("no entry frame for property access");
        return CallResult::Error;
    };
    let top = cx.state.top_frame;
    let dot = try_call!(
        cx,
        alloc::alloc_dot_frame(cx, top, entry, args.node(0), is_arrow)
    );
    CallResult::Continue(dot)
}

/// The value-level `@Dot` / `@Arrow` protocol: read the named property
/// off the bound receiver.
fn value_property_access(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@Dot called with wrong number of arguments.");
    let receiver = info.receiver.get();
    if !receiver.is_object_ref() {
        return raise_call(
            cx,
            "Cannot look up property on a primitive value.",
            &[receiver],
        );
    }
    let name_cid = with_node(args.node(0), |n| n.access_name_cid());
    let name = node_constant(args.node(0), name_cid);
    match interp::get_object_property(cx, receiver, name) {
        PropertyFlow::Value(value) => CallResult::Value(value),
        PropertyFlow::NotFound => raise_call(cx, "Property not found", &[name]),
        PropertyFlow::Error => CallResult::Error,
    }
}

// ── Expression handlers ────────────────────────────────────────────

fn lift_paren_expr(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@ParenExpr called with wrong number of arguments.");
    let node = args.node(0);
    let offset = with_node(node, |n| n.subexpression().offset as u32);
    let top = cx.state.top_frame;
    suspend_over(
        cx,
        info,
        top,
        node_pst(node),
        offset,
        resume_forward,
        ValBox::undefined(),
    )
}

fn lift_name_expr(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@NameExpr called with wrong number of arguments.");
    let name_cid = with_node(args.node(0), |n| n.name_cid());
    let name = node_constant(args.node(0), name_cid);
    let scope = info.caller_scope.get();
    match interp::get_object_property(cx, scope, name) {
        PropertyFlow::Value(value) => CallResult::Value(value),
        PropertyFlow::NotFound => raise_call(cx, "Name not found", &[name]),
        PropertyFlow::Error => CallResult::Error,
    }
}

fn lift_integer_expr(
    cx: &mut ThreadContext,
    _info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    expect_one_arg!(cx, args, "@Integer called with wrong number of arguments.");
    let value = with_node(args.node(0), |n| n.integer_value());
    CallResult::Value(ValBox::int32(value))
}

// ── Arithmetic ─────────────────────────────────────────────────────

fn lift_unary_expr(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    if args.len() != 1 {
        let negating = args.len() >= 1
            && with_node(args.node(0), |n| n.node_type()) == Some(NodeType::NegExpr);
        let message = if negating {
            "@Neg called with wrong number of arguments."
        } else {
            "@Pos called with wrong number of arguments."
        };
        return raise_call(cx, message, &[]);
    }
    let node = args.node(0);
    let offset = with_node(node, |n| n.subexpression().offset as u32);
    let state = try_call!(cx, branch_state(cx, node, 0));
    let node = args.node(0);
    let top = cx.state.top_frame;
    suspend_over(
        cx,
        info,
        top,
        node_pst(node),
        offset,
        resume_unary,
        state,
    )
}

fn resume_unary(
    cx: &mut ThreadContext,
    _info: &NativeCallInfo,
    state: Handle<'_>,
    result: EvalResult,
) -> CallResult {
    if result.is_abrupt() {
        return eval_to_call(result);
    }
    let value = match result {
        EvalResult::Value(v) => v,
        _ => return raise_call(cx, "Unary operand resolved to a void value.", &[]),
    };
    if !value.is_number() {
        return raise_call(cx, "Unary operand is not a number.", &[value]);
    }
    let node = unsafe { state.get().as_ref::<BoxArray>().at(0) };
    let negate = with_node(node, |n| n.node_type()) == Some(NodeType::NegExpr);
    if !negate {
        return CallResult::Value(value);
    }
    if value.is_int32() {
        if let Some(negated) = value.as_int32().checked_neg() {
            return CallResult::Value(ValBox::int32(negated));
        }
    }
    let negated = -unsafe { number_value(value) };
    CallResult::Value(try_call!(cx, alloc::number_box(cx, negated)))
}

fn lift_binary_expr(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    args: &SyntaxArgs,
) -> CallResult {
    if args.len() != 1 {
        let node_type = if args.is_empty() {
            None
        } else {
            with_node(args.node(0), |n| n.node_type())
        };
        let message = match node_type {
            Some(NodeType::SubExpr) => "@Sub called with wrong number of arguments.",
            Some(NodeType::MulExpr) => "@Mul called with wrong number of arguments.",
            Some(NodeType::DivExpr) => "@Div called with wrong number of arguments.",
            _ => "@Add called with wrong number of arguments.",
        };
        return raise_call(cx, message, &[]);
    }
    let node = args.node(0);
    let lhs_offset = with_node(node, |n| n.binary_lhs().offset as u32);
    let state = try_call!(cx, branch_state(cx, node, 0));
    let node = args.node(0);
    let top = cx.state.top_frame;
    suspend_over(
        cx,
        info,
        top,
        node_pst(node),
        lhs_offset,
        resume_binary_lhs,
        state,
    )
}

fn checked_operand(
    cx: &mut ThreadContext,
    result: EvalResult,
) -> Result<ValBox, CallResult> {
    if result.is_abrupt() {
        return Err(eval_to_call(result));
    }
    let value = match result {
        EvalResult::Value(v) => v,
        _ => {
            return Err(raise_call(
                cx,
                "Arithmetic operand resolved to a void value.",
                &[],
            ))
        }
    };
    if !value.is_number() {
        return Err(raise_call(cx, "Arithmetic operand is not a number.", &[value]));
    }
    Ok(value)
}

fn resume_binary_lhs(
    cx: &mut ThreadContext,
    info: &NativeCallInfo,
    state: Handle<'_>,
    result: EvalResult,
) -> CallResult {
    let lhs = match checked_operand(cx, result) {
        Ok(v) => v,
        Err(abrupt) => return abrupt,
    };
    let node = unsafe { state.get().as_ref::<BoxArray>().at(0) };
    let rhs_offset = with_node(node, |n| n.binary_rhs().offset as u32);

    // Stash the node and the left value for the second resume.
    let hs = HandleScope::new(cx);
    let node_h = hs.pin(node);
    let lhs_h = hs.pin(lhs);
    let pair = try_call!(cx, alloc::alloc_box_array(cx, 2));
    unsafe {
        let arr: &mut BoxArray = pair.as_mut();
        arr.set(0, node_h.get());
        arr.set(1, lhs_h.get());
    }
    let parent = frame_parent(cx.state.top_frame);
    suspend_over(
        cx,
        info,
        parent,
        node_pst(node_h.get()),
        rhs_offset,
        resume_binary_rhs,
        pair,
    )
}

fn resume_binary_rhs(
    cx: &mut ThreadContext,
    _info: &NativeCallInfo,
    state: Handle<'_>,
    result: EvalResult,
) -> CallResult {
    let rhs = match checked_operand(cx, result) {
        Ok(v) => v,
        Err(abrupt) => return abrupt,
    };
    let (node, lhs) = unsafe {
        let state_val = state.get();
        let arr: &BoxArray = state_val.as_ref();
        (arr.at(0), arr.at(1))
    };
    let op = with_node(node, |n| n.node_type()).unwrap_or(NodeType::AddExpr);

    if lhs.is_int32() && rhs.is_int32() {
        let (a, b) = (lhs.as_int32(), rhs.as_int32());
        let computed = match op {
            NodeType::AddExpr => a.checked_add(b),
            NodeType::SubExpr => a.checked_sub(b),
            NodeType::MulExpr => a.checked_mul(b),
            _ => {
                if b == 0 {
                    return raise_call(cx, "Division by zero.", &[]);
                }
                a.checked_div(b)
            }
        };
        return match computed {
            Some(value) => CallResult::Value(ValBox::int32(value)),
            None => raise_call(cx, "Integer overflow.", &[lhs, rhs]),
        };
    }

    let (a, b) = unsafe { (number_value(lhs), number_value(rhs)) };
    let computed = match op {
        NodeType::AddExpr => a + b,
        NodeType::SubExpr => a - b,
        NodeType::MulExpr => a * b,
        _ => a / b,
    };
    CallResult::Value(try_call!(cx, alloc::number_box(cx, computed)))
}
