pub mod alloc;
pub mod behaviour;
pub mod frame;
pub mod function;
pub mod handles;
pub mod interp;
pub mod objects;
pub mod result;
pub mod runtime;
mod spew;
pub mod trace;

pub use interp::{
    exception_to_string, interpret_program, interpret_source_file,
    interpret_syntax, value_to_display,
};
pub use result::{CallResult, EvalResult, StepResult};
pub use runtime::{Runtime, RuntimeError, ThreadContext, ThreadContextHandle};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{NativeCallInfo, SyntaxArgs, ValArgs};
    use crate::handles::HandleScope;
    use crate::objects::Exception;
    use heap::HeapSettings;
    use object::{HeapFormat, ValBox};
    use syntax::NodeType;

    /// A fresh context with a seeded global scope rooted in the
    /// scratch vector (slot 0), so helper copies never go stale.
    fn new_vm() -> ThreadContextHandle {
        new_vm_with(HeapSettings::default())
    }

    fn new_vm_with(settings: HeapSettings) -> ThreadContextHandle {
        let runtime = Runtime::new();
        let handle = runtime.register_thread_with(settings).expect("register");
        handle.with(|cx| {
            let scope = cx.make_global_scope().expect("global scope");
            cx.state.scratch.push(scope);
        });
        handle
    }

    fn global(cx: &ThreadContext) -> ValBox {
        cx.state.scratch[0]
    }

    fn eval(cx: &mut ThreadContext, source: &str) -> EvalResult {
        let scope = global(cx);
        interpret_source_file(cx, source, scope).expect("parse")
    }

    fn expect_int(result: EvalResult, expected: i32) {
        match result {
            EvalResult::Value(v) => {
                assert!(v.is_int32(), "expected Int32, got {v:?}");
                assert_eq!(v.as_int32(), expected);
            }
            other => panic!("expected Value(Int32({expected})), got {other:?}"),
        }
    }

    fn expect_exc(result: EvalResult, message: &str) -> Vec<ValBox> {
        match result {
            EvalResult::Exc { exception, .. } => unsafe {
                let exc: &Exception = exception.as_ref();
                assert_eq!(exc.message(), message);
                exc.args().to_vec()
            },
            other => panic!("expected Exc({message:?}), got {other:?}"),
        }
    }

    // ── End-to-end scenarios ───────────────────────────────────────

    #[test]
    fn var_then_name_yields_bound_value() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_int(eval(&mut cx, "var x = 3; x"), 3);
    }

    #[test]
    fn def_call_and_return() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_int(eval(&mut cx, "def f(x) { return x + 1 } f(41)"), 42);
    }

    #[test]
    fn top_level_return_raises() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_exc(
            eval(&mut cx, "return 7"),
            "return used in non-returnable context.",
        );
    }

    #[test]
    fn unbound_name_raises_with_the_name() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        let args = expect_exc(eval(&mut cx, "y"), "Name not found");
        assert_eq!(args.len(), 1);
        unsafe {
            assert_eq!(object::string_to_rust(args[0]), "y");
        }
    }

    #[test]
    fn parenthesized_arithmetic() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_int(eval(&mut cx, "(1 + 2) * 10"), 30);
    }

    #[test]
    fn arithmetic_precedence_without_parens() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_int(eval(&mut cx, "1 + 2 * 10"), 21);
        expect_int(eval(&mut cx, "7 - 2 - 1"), 4);
        expect_int(eval(&mut cx, "-3 + +5"), 2);
        expect_int(eval(&mut cx, "9 / 2"), 4);
    }

    #[test]
    fn division_by_zero_raises() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_exc(eval(&mut cx, "1 / 0"), "Division by zero.");
    }

    #[test]
    fn integer_overflow_raises() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_exc(
            eval(&mut cx, "2147483647 + 1"),
            "Integer overflow.",
        );
    }

    #[test]
    fn non_callable_callee_raises_and_leaves_binding_undefined() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        let args = expect_exc(
            eval(&mut cx, "var f = 3; var a = f(); a"),
            "Callee expression is not callable",
        );
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].as_int32(), 3);
        // The failed initializer never defined `a`.
        expect_exc(eval(&mut cx, "a"), "Name not found");
    }

    #[test]
    fn empty_file_yields_undefined() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        match eval(&mut cx, "") {
            EvalResult::Value(v) => assert!(v.is_undefined()),
            other => panic!("expected Undefined, got {other:?}"),
        }
    }

    #[test]
    fn const_binds_and_reads_back() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_int(eval(&mut cx, "const k = 9; k"), 9);
    }

    #[test]
    fn var_scans_uninitialized_bindings() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        let result = eval(&mut cx, "var a, b = 4, c; b");
        expect_int(result, 4);
        match eval(&mut cx, "a") {
            EvalResult::Value(v) => assert!(v.is_undefined()),
            other => panic!("expected Undefined, got {other:?}"),
        }
    }

    #[test]
    fn if_elsif_else_selects_the_first_true_branch() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_int(
            eval(&mut cx, "var x = 0; if (x) { 1 } elsif (1) { 2 } else { 3 }"),
            2,
        );
        expect_int(eval(&mut cx, "if (0) { 1 } else { 3 }"), 3);
        expect_int(eval(&mut cx, "if (1) { 7 }"), 7);
    }

    #[test]
    fn non_boolean_condition_raises() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_exc(
            eval(&mut cx, "def f() { return 1 } if (f) { 2 }"),
            "If condition is not a boolean.",
        );
    }

    #[test]
    fn return_escapes_a_loop() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_int(eval(&mut cx, "def f() { loop { return 5 } } f()"), 5);
    }

    #[test]
    fn functions_compose_through_calls() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_int(
            eval(
                &mut cx,
                "def add(a, b) { return a + b } \
                 def twice(x) { return add(x, x) } \
                 twice(21)",
            ),
            42,
        );
    }

    #[test]
    fn functions_are_first_class_values() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_int(eval(&mut cx, "def f(x) { return x } var g = f; g(3)"), 3);
    }

    #[test]
    fn body_without_return_yields_last_statement_value() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_int(eval(&mut cx, "def f() { 1; 2 } f()"), 2);
    }

    #[test]
    fn arity_mismatch_raises() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_exc(
            eval(&mut cx, "def f(x) { return x } f(1, 2)"),
            "Arguments do not match formal parameters.",
        );
    }

    // ── Handler rebinding (the central extensibility mechanism) ────

    fn constant_name_handler(
        _cx: &mut ThreadContext,
        _info: &NativeCallInfo,
        _args: &SyntaxArgs,
    ) -> CallResult {
        CallResult::Value(ValBox::int32(999))
    }

    fn inert_applicative(
        _cx: &mut ThreadContext,
        _info: &NativeCallInfo,
        _args: &ValArgs,
    ) -> CallResult {
        CallResult::Void
    }

    #[test]
    fn rebinding_name_expr_changes_evaluation() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        let func = alloc::alloc_native_operative(&mut cx, constant_name_handler)
            .expect("alloc");
        let name = cx.syntax_name(NodeType::NameExpr);
        let scope = global(&cx);
        alloc::define_method_property(&mut cx, scope, name, func).expect("bind");
        expect_int(eval(&mut cx, "anything"), 999);
        // Other syntax is untouched.
        expect_int(eval(&mut cx, "1 + 1"), 2);
    }

    #[test]
    fn applicative_syntax_binding_is_rejected() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        let func = alloc::alloc_native_applicative(&mut cx, inert_applicative)
            .expect("alloc");
        let name = cx.syntax_name(NodeType::IntegerExpr);
        let scope = global(&cx);
        alloc::define_method_property(&mut cx, scope, name, func).expect("bind");
        expect_exc(eval(&mut cx, "5"), "Syntax method binding is applicative.");
    }

    #[test]
    fn non_function_syntax_binding_is_rejected() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        let name = cx.syntax_name(NodeType::IntegerExpr);
        let scope = global(&cx);
        alloc::define_value_property(&mut cx, scope, name, ValBox::int32(1), true)
            .expect("bind");
        expect_exc(eval(&mut cx, "5"), "Syntax method binding is not a function.");
    }

    // ── Dotting protocol ───────────────────────────────────────────

    #[test]
    fn dot_reads_properties_through_the_value_protocol() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        let scope = global(&cx);
        let hs = HandleScope::new(&mut cx);
        let module = alloc::alloc_scope(&mut cx, HeapFormat::ModuleScope, &[scope], 8)
            .expect("module scope");
        let module_h = hs.pin(module);
        let x = cx.intern("x").expect("intern");
        alloc::define_value_property(&mut cx, module_h.get(), x, ValBox::int32(7), true)
            .expect("bind x");
        let obj = cx.intern("obj").expect("intern");
        let scope = global(&cx);
        alloc::define_value_property(&mut cx, scope, obj, module_h.get(), true)
            .expect("bind obj");
        drop(hs);

        expect_int(eval(&mut cx, "obj.x"), 7);
        expect_int(eval(&mut cx, "obj->x"), 7);
        expect_exc(eval(&mut cx, "obj.missing"), "Property not found");
    }

    #[test]
    fn dot_on_a_primitive_raises() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_exc(eval(&mut cx, "3 .x"), "@Dot binding not found.");
    }

    // ── Collector integration ──────────────────────────────────────

    #[test]
    fn interpreter_state_survives_collection_pressure() {
        let vm = new_vm_with(HeapSettings {
            standard_slab_size: 16 * 1024,
            hatchery_slab_budget: 2,
            ..HeapSettings::default()
        });
        let mut cx = vm.borrow_mut();
        // A long chain of bindings, each reading the previous one, so
        // live interpreter state spans many collections.
        let mut source = String::from("var x0 = 1; ");
        for i in 1..300 {
            source.push_str(&format!("var x{i} = x{} + 1; ", i - 1));
        }
        source.push_str("x299");
        expect_int(eval(&mut cx, &source), 300);
        assert!(
            cx.heap.stats().minor_collections > 0,
            "the chain should outgrow two small hatchery slabs"
        );
    }

    #[test]
    fn repeated_evaluation_reuses_one_scope() {
        let vm = new_vm();
        let mut cx = vm.borrow_mut();
        expect_int(eval(&mut cx, "var counter = 1; counter"), 1);
        expect_int(eval(&mut cx, "var counter = counter + 1; counter"), 2);
        expect_int(eval(&mut cx, "counter + 40"), 42);
    }

    // ── Embedding API ──────────────────────────────────────────────

    #[test]
    fn register_thread_is_idempotent_per_thread() {
        let runtime = Runtime::new();
        let first = runtime.register_thread().expect("register");
        first.with(|cx| {
            let scope = cx.make_global_scope().expect("global scope");
            cx.state.scratch.push(scope);
        });

        // A repeat registration hands back the same live context:
        // bindings made through one handle are visible through the
        // other.
        let second = runtime.register_thread().expect("register again");
        {
            let mut cx = second.borrow_mut();
            expect_int(eval(&mut cx, "var shared = 11; shared"), 11);
        }
        let mut cx = first.borrow_mut();
        expect_int(eval(&mut cx, "shared + 1"), 12);
    }
}
