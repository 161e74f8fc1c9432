//! The interpreter trampoline and native invocation plumbing.

use object::{lookup_property, DescriptorKind, LookupOutcome, ValBox};
use syntax::{ParseError, Program};

use crate::alloc;
use crate::frame::{
    self, frame_kind, frame_parent, FrameKind, InvokeApplicativeFrame,
    InvokeOperativeFrame, NativeCallResumeFrame,
};
use crate::function::{
    FunctionObject, NativeCallInfo, NativeFunction, SyntaxArgs, ValArgs,
};
use crate::handles::HandleScope;
use crate::objects::Exception;
use crate::result::{try_call, CallResult, EvalResult, StepResult};
use crate::runtime::ThreadContext;
use crate::spew::spew;

// ── Property access ────────────────────────────────────────────────

/// Outcome of reading a property for the interpreter.
pub enum PropertyFlow {
    NotFound,
    Value(ValBox),
    Error,
}

/// Read `name` on `obj` through the delegate-walking lookup. A value
/// binding yields its value; a method binding is reified into a
/// function object bound to the receiver the lookup started from,
/// preserving `self` semantics under delegation.
pub fn get_object_property(
    cx: &mut ThreadContext,
    obj: ValBox,
    name: ValBox,
) -> PropertyFlow {
    if !obj.is_object_ref() {
        return PropertyFlow::NotFound;
    }
    let outcome = unsafe { lookup_property(obj, name, cx.state.spoiler) };
    match outcome {
        LookupOutcome::NotFound => PropertyFlow::NotFound,
        LookupOutcome::Found { holder, descriptor } => match descriptor.kind {
            DescriptorKind::Value => PropertyFlow::Value(descriptor.value),
            DescriptorKind::Method => {
                let hs = HandleScope::new(cx);
                let obj_h = hs.pin(obj);
                let func_h = hs.pin(descriptor.value);
                let Some(lookup_state) = alloc::alloc_lookup_state(cx, obj, name, holder)
                else {
                    return PropertyFlow::Error;
                };
                let Some(bound) = alloc::alloc_function_object(
                    cx,
                    func_h.get(),
                    obj_h.get(),
                    lookup_state,
                ) else {
                    return PropertyFlow::Error;
                };
                PropertyFlow::Value(bound)
            }
            DescriptorKind::Accessor => {
                // Accessor evaluation needs its own frame machinery;
                // nothing in the core defines bindings of this kind.
                cx.set_internal_error("accessor property read is not supported");
                PropertyFlow::Error
            }
            DescriptorKind::Empty => PropertyFlow::NotFound,
        },
    }
}

// ── Native invocation ──────────────────────────────────────────────

/// Invoke an operative function object with pre-built syntax node
/// arguments. Scripted operatives are not interpretable.
pub(crate) fn invoke_operative(
    cx: &mut ThreadContext,
    func_obj: ValBox,
    caller_scope: ValBox,
    nodes: &[ValBox],
) -> CallResult {
    let hs = HandleScope::new(cx);
    let func_h = hs.pin(func_obj);
    let scope_h = hs.pin(caller_scope);
    let node_handles: Vec<_> = nodes.iter().map(|&n| hs.pin(n)).collect();

    let args = try_call!(cx, alloc::alloc_box_array(cx, nodes.len()));
    let args_h = hs.pin(args);
    for (i, handle) in node_handles.iter().enumerate() {
        unsafe {
            args_h.get().as_mut::<object::BoxArray>().set(i, handle.get());
        }
    }

    let func = unsafe { func_h.get().as_ref::<FunctionObject>().func };
    let format = unsafe { func.as_ref::<object::HeapHeader>().format() };
    match format {
        object::HeapFormat::NativeFunction => {
            let fp = unsafe { func.as_ref::<NativeFunction>().operative() };
            let (lookup_state, receiver) = unsafe {
                let func_h_val = func_h.get();
                let fo: &FunctionObject = func_h_val.as_ref();
                (fo.lookup_state, fo.receiver)
            };
            let info = NativeCallInfo {
                lookup_state: hs.pin(lookup_state),
                caller_scope: scope_h,
                callee_func: func_h,
                receiver: hs.pin(receiver),
            };
            fp(cx, &info, &SyntaxArgs { arr: args_h })
        }
        object::HeapFormat::ScriptedFunction => {
            cx.set_internal_error("cannot invoke a scripted operative");
            CallResult::Error
        }
        _ => {
            cx.set_internal_error("unknown function kind");
            CallResult::Error
        }
    }
}

/// Call the native applicative held by an [`InvokeApplicativeFrame`]
/// with an argument array already reversed into positional order.
pub(crate) fn invoke_native_applicative(
    cx: &mut ThreadContext,
    invoke_frame: ValBox,
    args_array: ValBox,
) -> CallResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(invoke_frame);
    let args_h = hs.pin(args_array);

    let (func_obj, func) = unsafe {
        let frame_h_val = frame_h.get();
        let f: &InvokeApplicativeFrame = frame_h_val.as_ref();
        (f.callee_func, f.callee_func.as_ref::<FunctionObject>().func)
    };
    let fp = unsafe { func.as_ref::<NativeFunction>().applicative() };
    let (lookup_state, receiver) = unsafe {
        let fo: &FunctionObject = func_obj.as_ref();
        (fo.lookup_state, fo.receiver)
    };
    // An invoke frame has no scope of its own; natives that need one
    // receive it through the lookup state captured at binding time.
    let caller_scope = unsafe {
        lookup_state
            .as_ref::<crate::objects::LookupState>()
            .receiver
    };
    let info = NativeCallInfo {
        lookup_state: hs.pin(lookup_state),
        caller_scope: hs.pin(caller_scope),
        callee_func: hs.pin(func_obj),
        receiver: hs.pin(receiver),
    };
    fp(cx, &info, &ValArgs { arr: args_h })
}

/// Call the native operative held by an [`InvokeOperativeFrame`] with
/// a pre-built array of unevaluated argument nodes.
pub(crate) fn invoke_native_operative_with(
    cx: &mut ThreadContext,
    invoke_frame: ValBox,
    args_array: ValBox,
) -> CallResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(invoke_frame);
    let args_h = hs.pin(args_array);

    let (func_obj, func) = unsafe {
        let frame_h_val = frame_h.get();
        let f: &InvokeOperativeFrame = frame_h_val.as_ref();
        (f.callee_func, f.callee_func.as_ref::<FunctionObject>().func)
    };
    let fp = unsafe { func.as_ref::<NativeFunction>().operative() };
    let (lookup_state, receiver) = unsafe {
        let fo: &FunctionObject = func_obj.as_ref();
        (fo.lookup_state, fo.receiver)
    };
    let caller_scope = unsafe {
        lookup_state
            .as_ref::<crate::objects::LookupState>()
            .receiver
    };
    let info = NativeCallInfo {
        lookup_state: hs.pin(lookup_state),
        caller_scope: hs.pin(caller_scope),
        callee_func: hs.pin(func_obj),
        receiver: hs.pin(receiver),
    };
    fp(cx, &info, &SyntaxArgs { arr: args_h })
}

/// Re-enter a suspended native with its saved state and the
/// sub-evaluation's result.
pub(crate) fn call_resume(
    cx: &mut ThreadContext,
    resume_frame: ValBox,
    result: EvalResult,
) -> CallResult {
    let hs = HandleScope::new(cx);
    let frame_h = hs.pin(resume_frame);
    let (lookup_state, caller_scope, callee_func, receiver, resume_fn, resume_state) = unsafe {
        let frame_h_val = frame_h.get();
        let f: &NativeCallResumeFrame = frame_h_val.as_ref();
        (
            f.lookup_state,
            f.caller_scope,
            f.callee_func,
            f.receiver,
            f.resume_fn,
            f.resume_state,
        )
    };
    let info = NativeCallInfo {
        lookup_state: hs.pin(lookup_state),
        caller_scope: hs.pin(caller_scope),
        callee_func: hs.pin(callee_func),
        receiver: hs.pin(receiver),
    };
    let state_h = hs.pin(resume_state);
    resume_fn(cx, &info, state_h, result)
}

/// Route a native's [`CallResult`] back into the frame machine on
/// behalf of `frame`.
pub(crate) fn finish_call(
    cx: &mut ThreadContext,
    frame: ValBox,
    result: CallResult,
) -> StepResult {
    match result {
        CallResult::Value(v) => {
            frame::resolve(cx, frame_parent(frame), EvalResult::Value(v))
        }
        CallResult::Void => frame::resolve(cx, frame_parent(frame), EvalResult::Void),
        CallResult::Error => frame::resolve(cx, frame_parent(frame), EvalResult::Error),
        CallResult::Exc {
            raising_frame,
            exception,
        } => frame::resolve(
            cx,
            frame_parent(frame),
            EvalResult::Exc {
                raising_frame,
                exception,
            },
        ),
        CallResult::Continue(next) => StepResult::Continue(next),
    }
}

// ── Trampoline ─────────────────────────────────────────────────────

/// Drive an entry frame over `(pst, offset)` under `scope` to
/// completion.
pub fn interpret_syntax(
    cx: &mut ThreadContext,
    scope: ValBox,
    pst: ValBox,
    offset: u32,
) -> EvalResult {
    debug_assert!(
        cx.state.top_frame.is_undefined(),
        "one execution per thread context at a time"
    );
    let hs = HandleScope::new(cx);
    let scope_h = hs.pin(scope);
    let pst_h = hs.pin(pst);

    let Some(terminal) = alloc::alloc_terminal_frame(cx) else {
        return EvalResult::Error;
    };
    let terminal_h = hs.pin(terminal);
    let Some(node) = alloc::alloc_syntax_node(cx, pst_h.get(), offset) else {
        return EvalResult::Error;
    };
    let Some(entry) = alloc::alloc_entry_frame(cx, terminal_h.get(), node, scope_h.get())
    else {
        return EvalResult::Error;
    };

    cx.state.top_frame = entry;
    let result = loop {
        let top = cx.state.top_frame;
        if frame_kind(top) == FrameKind::Terminal {
            if frame::terminal_has_result(top) {
                break frame::terminal_result(top);
            }
            cx.set_internal_error("terminal frame stepped without a result");
            break EvalResult::Error;
        }
        match frame::step(cx, top) {
            StepResult::Continue(next) => cx.state.top_frame = next,
            StepResult::Error => break EvalResult::Error,
        }
    };
    cx.state.top_frame = ValBox::undefined();
    spew!(cx, "trampoline finished: {result:?}");
    result
}

/// Materialize a parsed program and interpret it from its root node.
pub fn interpret_program(
    cx: &mut ThreadContext,
    scope: ValBox,
    program: &Program,
) -> EvalResult {
    let hs = HandleScope::new(cx);
    let scope_h = hs.pin(scope);
    let Some(pst) = alloc::alloc_packed_syntax_tree(cx, program) else {
        return EvalResult::Error;
    };
    interpret_syntax(cx, scope_h.get(), pst, 0)
}

/// Parse source text and drive the trampoline to completion.
pub fn interpret_source_file(
    cx: &mut ThreadContext,
    source: &str,
    scope: ValBox,
) -> Result<EvalResult, ParseError> {
    let program = syntax::parse_source(source)?;
    Ok(interpret_program(cx, scope, &program))
}

/// Human-readable rendering of a value, for the command-line driver.
pub fn value_to_display(value: ValBox) -> String {
    unsafe {
        if value.is_undefined() {
            "undefined".to_string()
        } else if value.is_null() {
            "null".to_string()
        } else if value.is_bool() {
            value.as_bool().to_string()
        } else if value.is_int32() {
            value.as_int32().to_string()
        } else if value.is_number() {
            object::number_value(value).to_string()
        } else if value.is_string() {
            format!("{:?}", object::string_to_rust(value))
        } else if crate::function::is_function_object(value) {
            "<function>".to_string()
        } else {
            "<object>".to_string()
        }
    }
}

/// Human-readable rendering of an exception, for diagnostics.
pub fn exception_to_string(exception: ValBox) -> String {
    unsafe {
        let exc: &Exception = exception.as_ref();
        let mut out = String::from(exc.message());
        for arg in exc.args() {
            out.push(' ');
            if arg.is_string() {
                out.push_str(&object::string_to_rust(*arg));
            } else {
                out.push_str(&format!("{arg:?}"));
            }
        }
        out
    }
}
