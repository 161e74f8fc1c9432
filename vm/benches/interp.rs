use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vm::{interpret_program, EvalResult, Runtime};

fn bench_interp(c: &mut Criterion) {
    let runtime = Runtime::new();
    let vm = runtime.register_thread().expect("register thread");
    let mut cx = vm.borrow_mut();
    let scope = cx.make_global_scope().expect("global scope");
    cx.state.scratch.push(scope);

    let arith = syntax::parse_source("(1 + 2) * (3 + 4) - 5 / (1 + 0)").expect("parse");
    c.bench_function("arith_expression", |b| {
        b.iter(|| {
            let scope = cx.state.scratch[0];
            let result = interpret_program(&mut cx, scope, black_box(&arith));
            assert!(matches!(result, EvalResult::Value(_)));
        })
    });

    let call = syntax::parse_source(
        "def add(a, b) { return a + b } \
         def quad(x) { return add(add(x, x), add(x, x)) } \
         quad(10)",
    )
    .expect("parse");
    c.bench_function("scripted_calls", |b| {
        b.iter(|| {
            let scope = cx.state.scratch[0];
            let result = interpret_program(&mut cx, scope, black_box(&call));
            assert!(matches!(result, EvalResult::Value(_)));
        })
    });
}

criterion_group!(benches, bench_interp);
criterion_main!(benches);
