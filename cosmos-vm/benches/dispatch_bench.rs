use std::sync::Arc;

use cosmos_vm::{
    bytecode::{
        opcode::{jump, BinaryOp, Scope, SpecialOp, UnaryOp},
        BytecodeBuilder, BytecodeObject, Major,
    },
    vmio::{decode_real, encode_real},
    Environment, Process, ProcessId, ProcessState, Value,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// `i = 0; while i < n: i = i + 1; return i`
fn counting_loop(n: i32) -> Arc<BytecodeObject> {
    let mut b = BytecodeBuilder::new("COUNT", false);
    let i = b.add_local_variable("I");
    let limit = b.add_literal(Value::Integer(n));
    let top = b.make_label();
    let done = b.make_label();
    b.add_instruction(Major::Push, Scope::Integer as u8, 0)
        .add_instruction(Major::Pop, Scope::Local as u8, i);
    b.place_label(top).unwrap();
    b.add_instruction(Major::Push, Scope::Local as u8, i)
        .add_instruction(Major::Push, Scope::Literal as u8, limit)
        .add_instruction(Major::Binary, BinaryOp::Lt as u8, 0)
        .add_jump(jump::IF_FALSE | jump::IF_EMPTY | jump::POP, done)
        .add_instruction(Major::Push, Scope::Local as u8, i)
        .add_instruction(Major::Unary, UnaryOp::Inc as u8, 0)
        .add_instruction(Major::Pop, Scope::Local as u8, i)
        .add_jump(jump::ALWAYS, top);
    b.place_label(done).unwrap();
    b.add_instruction(Major::Push, Scope::Local as u8, i)
        .add_instruction(Major::Special, SpecialOp::Return as u8, 1);
    b.finalize().unwrap()
}

fn run_to_end(bco: Arc<BytecodeObject>, env: &mut Environment) {
    let mut process = Process::new(ProcessId(1), "bench");
    process.start(bco, &[]).unwrap();
    process.continue_process().unwrap();
    assert_eq!(process.run(env), ProcessState::Ended);
    black_box(process.result());
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    for n in [1_000, 100_000] {
        let bco = counting_loop(n);
        group.throughput(Throughput::Elements(n as u64 * 8));
        group.bench_with_input(BenchmarkId::new("counting_loop", n), &bco, |b, bco| {
            let mut env = Environment::new();
            b.iter(|| run_to_end(bco.clone(), &mut env));
        });
    }
    group.finish();
}

fn bench_real_codec(c: &mut Criterion) {
    let values: Vec<f64> = (0..1000).map(|i| (i as f64 - 500.0) * 1.37e3 / 7.0).collect();
    c.bench_function("real_encode_decode", |b| {
        b.iter(|| {
            for v in &values {
                black_box(decode_real(encode_real(black_box(*v))));
            }
        })
    });
}

criterion_group!(benches, bench_dispatch, bench_real_codec);
criterion_main!(benches);
