//! Island demo: compiles a three-step island and runs it on the device queue.
//!
//! Run with: `RUST_LOG=islet=debug cargo run -p islet --example island_demo`
//!
//! This example shows:
//!   1. Registering the device backend
//!   2. Declaring kernels as closures and as a `DeviceKernel` type
//!   3. Running the same executable on several inputs
//!   4. Buffer pool statistics after internal buffers are recycled

use islet::{
    BackendRegistry, DeviceBackend, DeviceKernel, ExecutionContext, Graph, Meta, Operand, Result,
    Value,
};
use islet_core::{Access, Depth, MatrixDescriptor, Size};
use islet_device::{Buffer, BufferAdapter, Device, DeviceConfig};
use tracing_subscriber::EnvFilter;

const WIDTH: usize = 8;
const HEIGHT: usize = 4;

/// dst = 255 - src
struct Invert;

impl DeviceKernel for Invert {
    const NAME: &'static str = "demo.invert";

    fn run(ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let src = ctx.input_buffer::<u8>(0)?.clone();
        let dst = ctx.output_buffer::<u8>(0)?.clone();
        ctx.queue()
            .submit(move |dev| dev.parallel_map(&src, &dst, |v: u8| 255 - v))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // ── 1. Device and backend ──────────────────────────────────────────
    let device = Device::new(DeviceConfig::new().with_name("demo0")).expect("device");
    let mut registry = BackendRegistry::new();
    DeviceBackend::new(device.clone())
        .register(&mut registry)
        .expect("register");
    println!("backends: {:?}", registry.names());

    // ── 2. Island: src -> threshold -> invert -> dst, plus a count
    let desc = MatrixDescriptor::new(Depth::U8, 1, Size::new(WIDTH, HEIGHT));
    let threshold = DeviceBackend::kernel("threshold", |ctx| {
        let level = *ctx.input::<u8>(1)?;
        let src = ctx.input_buffer::<u8>(0)?.clone();
        let dst = ctx.output_buffer::<u8>(0)?.clone();
        ctx.queue().submit(move |dev| {
            dev.parallel_map(&src, &dst, move |v: u8| if v > level { 255 } else { 0 })
        })
    });
    let count = DeviceBackend::kernel("count", |ctx| {
        let view = ctx.input_matrix(0)?.access(Access::R)?;
        let above = view.as_slice::<u8>()?.iter().filter(|&&v| v == 0).count();
        drop(view);
        ctx.output_scalar(0)?[0] = above as f64;
        Ok(())
    });

    let mut g = Graph::new();
    let src = g.input("src", Meta::Mat(desc));
    let mask = g.internal("mask", Meta::Mat(desc));
    let dst = g.output("dst", Meta::Mat(desc));
    let above = g.output("above", Meta::Scalar);
    let t = g.add_op(
        "threshold",
        threshold,
        vec![src.into(), Operand::constant(128u8)],
        vec![mask],
    );
    let i = g.add_op("invert", Invert::kernel(), vec![mask.into()], vec![dst]);
    let c = g.add_op("count", count, vec![dst.into()], vec![above]);
    let nodes = [src, mask, dst, above, t, i, c];

    let mut exe = registry
        .compile(DeviceBackend::NAME, &g, &nodes)
        .expect("compile");

    // ── 3. Runs ────────────────────────────────────────────────────────
    for step in [16u8, 40, 64] {
        let data: Vec<u8> = (0..WIDTH * HEIGHT)
            .map(|k| (k as u8).wrapping_mul(step))
            .collect();
        let buffer = Buffer::from_vec(&device, &[HEIGHT, WIDTH, 1], data).expect("buffer");
        let input = Value::Mat(BufferAdapter::new(buffer).expect("adapter").into_rmat());

        let mut out = Value::Empty;
        let mut count = Value::Empty;
        exe.run(&[(src, &input)], vec![(dst, &mut out), (above, &mut count)])
            .expect("run");
        let n = count.as_scalar().map(|s| s[0]).unwrap_or_default();
        println!("step {step:>3}: {n} of {} pixels above threshold", WIDTH * HEIGHT);
    }

    // ── 4. Pool ────────────────────────────────────────────────────────
    let stats = device.pool_stats();
    println!(
        "pool: {} hits, {} misses, {} cached buffers ({} bytes)",
        stats.hits, stats.misses, stats.cached_buffers, stats.cached_bytes
    );
}
