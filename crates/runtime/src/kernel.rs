//! Compute kernels written in Rust.
//!
//! A [`Kernel`] is one invocation written as a state machine: [`Kernel::resume`] runs it up to the
//! next barrier or to the end. [`HostProgram`] wraps a kernel in the same coroutine triple a compiled
//! program exports, so the runtime drives both the same way.

use picocompute_core::{
    ContentHash, Coroutine, DescriptorSet, Program, ProgramData, ProgramInfo, SIMD_WIDTH, YIELD_CONTROL_BARRIER,
    YieldResult,
};
use std::{ffi::c_void, marker::PhantomData, mem::size_of};

/// Where a kernel invocation stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Waiting at a control barrier for the rest of the workgroup.
    Barrier,
    /// Finished.
    Done,
}

pub trait Kernel: Default {
    type DescriptorSet: DescriptorSet;

    const WORKGROUP_SIZE: [u32; 3];

    /// Bytes of workgroup memory shared by the invocations of one workgroup.
    const MEMORY_SIZE: usize = 0;

    /// Whether [`Kernel::resume`] may return [`Step::Barrier`].
    /// A kernel without barriers that returns one anyway is simply resumed again.
    const HAS_BARRIERS: bool = false;

    fn resume(&mut self, invocation: &Invocation<Self::DescriptorSet>) -> Step;
}

/// Built-in inputs of one invocation.
pub struct Invocation<D> {
    pub global_id: [u32; 3],
    pub local_id: [u32; 3],
    pub workgroup_id: [u32; 3],
    pub local_index: u32,
    pub num_workgroups: [u32; 3],
    pub workgroup_size: [u32; 3],
    descriptor_set: *const D,
    memory: *mut u8,
    memory_size: usize,
}

impl<D> Invocation<D> {
    /// # Safety
    /// The descriptor set handed to `prepare` must still be alive, which holds for the whole dispatch.
    pub unsafe fn descriptor_set(&self) -> &D {
        unsafe { &*self.descriptor_set }
    }

    /// Workgroup memory, shared with every other invocation of the workgroup.
    pub fn workgroup_memory(&self) -> *mut u8 {
        self.memory
    }

    /// Workgroup memory viewed as an array of `T`.
    pub fn shared<T>(&self) -> *mut T {
        assert!(
            size_of::<T>() <= self.memory_size,
            "kernel declares {} bytes of workgroup memory",
            self.memory_size
        );
        self.memory as *mut T
    }
}

/// A [`Kernel`] packaged as a program.
pub struct HostProgram<K> {
    info: ProgramInfo,
    kernel: PhantomData<fn() -> K>,
}

impl<K: Kernel> HostProgram<K> {
    pub fn new() -> Self {
        let [x, y, z] = K::WORKGROUP_SIZE;

        Self {
            info: ProgramInfo {
                has_cbarriers: K::HAS_BARRIERS,
                min_memory_size: K::MEMORY_SIZE,
                desc_set_size: size_of::<K::DescriptorSet>(),
                workgroup_size_x: x as i32,
                workgroup_size_y: y as i32,
                workgroup_size_z: z as i32,
                begin: begin::<K>,
                await_: await_::<K>,
                destroy: destroy::<K>,
                content_hash: Self::content_hash(),
            },
            kernel: PhantomData,
        }
    }

    /// Hash identifying the kernel type.
    pub fn content_hash() -> ContentHash {
        ContentHash::of(std::any::type_name::<K>())
    }

    pub fn info(&self) -> &ProgramInfo {
        &self.info
    }

    pub fn program(&self) -> Program<'_> {
        Program::new(&self.info, self.info.content_hash)
    }
}

impl<K: Kernel> Default for HostProgram<K> {
    fn default() -> Self {
        Self::new()
    }
}

struct HostCoroutine<K: Kernel> {
    lanes: Vec<(Invocation<K::DescriptorSet>, K, bool)>,
}

impl<K: Kernel> HostCoroutine<K> {
    /// Advances every unfinished lane to its next barrier. Returns whether any lane is still suspended.
    fn resume(&mut self) -> bool {
        let mut suspended = false;
        for (invocation, kernel, done) in self.lanes.iter_mut().filter(|(_, _, done)| !*done) {
            loop {
                match kernel.resume(invocation) {
                    Step::Done => {
                        *done = true;
                        break;
                    }
                    Step::Barrier if K::HAS_BARRIERS => {
                        suspended = true;
                        break;
                    }
                    Step::Barrier => {}
                }
            }
        }
        suspended
    }
}

unsafe extern "C" fn begin<K: Kernel>(
    data: *mut ProgramData,
    workgroup_x: i32,
    workgroup_y: i32,
    workgroup_z: i32,
    workgroup_memory: *mut c_void,
    first_subgroup: i32,
    subgroup_count: i32,
) -> Coroutine {
    // SAFETY: the scheduler always passes the program data of the running dispatch
    let data = unsafe { &*data };
    let size = [data.workgroup_size[0], data.workgroup_size[1], data.workgroup_size[2]];
    let workgroup_id = [workgroup_x as u32, workgroup_y as u32, workgroup_z as u32];

    let first = first_subgroup as u32 * SIMD_WIDTH;
    let last = ((first_subgroup + subgroup_count) as u32 * SIMD_WIDTH).min(data.invocations_per_workgroup);

    let lanes = (first..last)
        .map(|local_index| {
            let local_id = [
                local_index % size[0],
                local_index / size[0] % size[1],
                local_index / (size[0] * size[1]),
            ];

            let invocation = Invocation {
                global_id: [0, 1, 2].map(|i| workgroup_id[i] * size[i] + local_id[i]),
                local_id,
                workgroup_id,
                local_index,
                num_workgroups: [data.num_workgroups[0], data.num_workgroups[1], data.num_workgroups[2]],
                workgroup_size: size,
                descriptor_set: data.descriptor_sets[0] as *const K::DescriptorSet,
                memory: workgroup_memory as *mut u8,
                memory_size: K::MEMORY_SIZE,
            };

            (invocation, K::default(), false)
        })
        .collect();

    Box::into_raw(Box::new(HostCoroutine::<K> { lanes })) as Coroutine
}

unsafe extern "C" fn await_<K: Kernel>(coroutine: Coroutine, result: *mut YieldResult) -> bool {
    // SAFETY: created by `begin::<K>` and not destroyed yet
    let coroutine = unsafe { &mut *(coroutine as *mut HostCoroutine<K>) };
    let suspended = coroutine.resume();
    if suspended && !result.is_null() {
        // SAFETY: checked for null, the scheduler passes a valid pointer
        unsafe { *result = YIELD_CONTROL_BARRIER };
    }
    suspended
}

unsafe extern "C" fn destroy<K: Kernel>(coroutine: Coroutine) {
    // SAFETY: created by `begin::<K>`, the scheduler destroys each coroutine once
    drop(unsafe { Box::from_raw(coroutine as *mut HostCoroutine<K>) });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Buffer, DispatchContext};
    use picocompute_core::BufferDescriptor;

    #[repr(C)]
    #[derive(Default)]
    struct Set {
        binding0: BufferDescriptor,
    }

    unsafe impl DescriptorSet for Set {}

    /// Every invocation writes its id to shared memory, waits, then sums the whole workgroup.
    #[derive(Default)]
    struct Reduce {
        stage: u8,
    }

    impl Kernel for Reduce {
        type DescriptorSet = Set;

        const WORKGROUP_SIZE: [u32; 3] = [8, 1, 1];
        const MEMORY_SIZE: usize = 8 * 4;
        const HAS_BARRIERS: bool = true;

        fn resume(&mut self, invocation: &Invocation<Set>) -> Step {
            let shared = invocation.shared::<[u32; 8]>();
            match self.stage {
                0 => {
                    unsafe { (*shared)[invocation.local_index as usize] = invocation.global_id[0] + 1 };
                    self.stage = 1;
                    Step::Barrier
                }
                _ => {
                    let sum: u32 = unsafe { (*shared).iter().sum() };
                    let out = unsafe { &invocation.descriptor_set().binding0 };
                    unsafe { out.write(invocation.global_id[0] as usize, sum) };
                    Step::Done
                }
            }
        }
    }

    #[test]
    fn barrier_makes_shared_writes_visible() {
        let program = HostProgram::<Reduce>::new();
        let mut buffer = Buffer::new(4 * 8 * 3);
        let mut set = Set {
            binding0: buffer.descriptor(),
        };

        let mut ctx = DispatchContext::new();
        unsafe { ctx.prepare(2, &program.program(), &mut set, 3, 1, 1).unwrap() };
        ctx.run().unwrap();
        drop(ctx);

        let out = buffer.as_slice::<u32>();
        for group in 0..3u32 {
            let expected: u32 = (group * 8 + 1..=group * 8 + 8).sum();
            assert!(out[group as usize * 8..][..8].iter().all(|&x| x == expected));
        }
    }

    #[test]
    fn lanes_cover_requested_subgroups() {
        #[derive(Default)]
        struct Nop;

        impl Kernel for Nop {
            type DescriptorSet = Set;
            const WORKGROUP_SIZE: [u32; 3] = [3, 2, 1];

            fn resume(&mut self, _: &Invocation<Set>) -> Step {
                Step::Done
            }
        }

        let mut data = ProgramData {
            workgroup_size: [3, 2, 1, 0],
            num_workgroups: [1, 1, 1, 0],
            invocations_per_workgroup: 6,
            ..Default::default()
        };

        unsafe {
            let coroutine = begin::<Nop>(&mut data, 0, 0, 0, std::ptr::null_mut(), 1, 1);
            let lanes = &(*(coroutine as *mut HostCoroutine<Nop>)).lanes;
            assert_eq!(lanes.len(), 2);
            assert_eq!(lanes[0].0.local_id, [1, 1, 0]);
            assert_eq!(lanes[1].0.local_id, [2, 1, 0]);

            assert!(!await_::<Nop>(coroutine, std::ptr::null_mut()));
            destroy::<Nop>(coroutine);
        }
    }
}
