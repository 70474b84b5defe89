use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use picocompute::{Buffer, BufferDescriptor, DescriptorSet, DispatchContext, HostProgram, Invocation, Kernel, Step};
use std::hint::black_box;

#[derive(DescriptorSet)]
#[repr(C)]
struct Set {
    binding0: BufferDescriptor,
}

#[derive(Default)]
struct Saxpy;

impl Kernel for Saxpy {
    type DescriptorSet = Set;
    const WORKGROUP_SIZE: [u32; 3] = [64, 1, 1];

    fn resume(&mut self, inv: &Invocation<Set>) -> Step {
        let index = inv.global_id[0] as usize;
        unsafe {
            let buffer = &inv.descriptor_set().binding0;
            let x = buffer.read::<f32>(index);
            buffer.write(index, 2.0 * x + 1.0);
        }
        Step::Done
    }
}

/// Every invocation of a workgroup meets at a barrier twice.
#[derive(Default)]
struct Barriers {
    stage: u8,
}

impl Kernel for Barriers {
    type DescriptorSet = Set;
    const WORKGROUP_SIZE: [u32; 3] = [64, 1, 1];
    const MEMORY_SIZE: usize = 64 * 4;
    const HAS_BARRIERS: bool = true;

    fn resume(&mut self, inv: &Invocation<Set>) -> Step {
        let shared = inv.shared::<[f32; 64]>();
        let local = inv.local_index as usize;
        let index = inv.global_id[0] as usize;
        unsafe {
            match self.stage {
                0 => (*shared)[local] = inv.descriptor_set().binding0.read::<f32>(index),
                1 => (*shared)[local] += (*shared)[63 - local],
                _ => {
                    inv.descriptor_set().binding0.write(index, (*shared)[local]);
                    return Step::Done;
                }
            }
        }
        self.stage += 1;
        Step::Barrier
    }
}

fn run<K: Kernel<DescriptorSet = Set>>(program: &HostProgram<K>, buffer: &mut Buffer, threads: usize) {
    let mut set = Set {
        binding0: buffer.descriptor(),
    };
    let workgroups = (buffer.len() / 4 / 64) as u32;

    let mut ctx = DispatchContext::new();
    unsafe { ctx.prepare(threads, &program.program(), &mut set, workgroups, 1, 1).unwrap() };
    ctx.run().unwrap();
}

fn criterion_benchmark(c: &mut Criterion) {
    let threads = std::thread::available_parallelism().map_or(4, |n| n.get());

    let mut group = c.benchmark_group("saxpy (1M)");
    let saxpy = HostProgram::<Saxpy>::new();
    let mut buffer = Buffer::new(1 << 22);
    for threads in [1, threads] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                run(&saxpy, &mut buffer, threads);
                black_box(buffer.data());
            })
        });
    }
    group.finish();

    c.bench_function("barriers (64k)", |b| {
        let barriers = HostProgram::<Barriers>::new();
        let mut buffer = Buffer::new(1 << 18);
        b.iter(|| {
            run(&barriers, &mut buffer, threads);
            black_box(buffer.data());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
