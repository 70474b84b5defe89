use crate::{RuntimeError, ThreadContext, scheduler, util::ThreadPool};
use log::{debug, trace};
use picocompute_core::{DescriptorSet, Program, ProgramData, ProgramInfo, SIMD_WIDTH};
use std::{
    marker::PhantomData,
    mem::size_of,
    ops::Range,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Uninitialized,
    Prepared,
    Dispatching,
    Completed,
}

impl DispatchState {
    fn from_u8(state: u8) -> Self {
        match state {
            1 => DispatchState::Prepared,
            2 => DispatchState::Dispatching,
            3 => DispatchState::Completed,
            _ => DispatchState::Uninitialized,
        }
    }
}

/// One run of a program over a grid of workgroups.
///
/// The grid is split into `threads` contiguous subgroups of workgroups, and every subgroup
/// is handed to [`DispatchContext::dispatch`] exactly once, typically from its own thread.
pub struct DispatchContext<'a> {
    state: AtomicU8,
    prepared: Option<Prepared<'a>>,
    claimed: Box<[AtomicBool]>,
    remaining: AtomicUsize,
    descriptor_set: PhantomData<&'a mut ()>,
}

struct Prepared<'a> {
    info: &'a ProgramInfo,
    data: ProgramData,
    grid: [u32; 3],
    threads: usize,
    workgroups: u64,
}

// SAFETY: the context only hands out copies of its program data, and the descriptor set behind it
// is borrowed for `'a`; concurrent writes to bound memory are the program's business, as on a GPU
unsafe impl Send for DispatchContext<'_> {}
unsafe impl Sync for DispatchContext<'_> {}

impl<'a> DispatchContext<'a> {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(DispatchState::Uninitialized as u8),
            prepared: None,
            claimed: Box::new([]),
            remaining: AtomicUsize::new(0),
            descriptor_set: PhantomData,
        }
    }

    /// Validates `program` against `descriptor_set` and splits the `x * y * z` workgroup grid
    /// into `threads` subgroups. Earlier subgroups get one extra workgroup when the grid does
    /// not divide evenly.
    ///
    /// # Safety
    /// Every descriptor in `descriptor_set` must point at memory that stays alive and is not
    /// otherwise accessed until the dispatch has completed.
    pub unsafe fn prepare<D: DescriptorSet>(
        &mut self,
        threads: usize,
        program: &Program<'a>,
        descriptor_set: &'a mut D,
        x: u32,
        y: u32,
        z: u32,
    ) -> Result<(), RuntimeError> {
        if self.state() == DispatchState::Dispatching {
            return Err(RuntimeError::Incomplete {
                remaining: self.remaining.load(Ordering::Acquire),
            });
        }

        if threads == 0 {
            return Err(RuntimeError::InvalidThreadCount);
        }

        if [x, y, z].iter().any(|&n| n == 0 || n > i32::MAX as u32) {
            return Err(RuntimeError::InvalidGrid { x, y, z });
        }

        let info = program.info().ok_or(RuntimeError::Unsupported)?;
        if info.content_hash != program.expected_hash() {
            return Err(RuntimeError::HashMismatch {
                expected: program.expected_hash(),
                found: info.content_hash,
            });
        }

        let size = [info.workgroup_size_x, info.workgroup_size_y, info.workgroup_size_z];
        let workgroup_size = info
            .workgroup_size()
            .ok_or(RuntimeError::InvalidWorkgroupSize { size })?;
        let invocations = workgroup_size
            .iter()
            .try_fold(1u32, |n, &dim| n.checked_mul(dim))
            .ok_or(RuntimeError::InvalidWorkgroupSize { size })?;

        if info.desc_set_size != size_of::<D>() {
            return Err(RuntimeError::DescriptorSetSize {
                expected: info.desc_set_size,
                found: size_of::<D>(),
            });
        }

        let data = ProgramData {
            num_workgroups: [x, y, z, 0],
            workgroup_size: [workgroup_size[0], workgroup_size[1], workgroup_size[2], 0],
            invocations_per_subgroup: SIMD_WIDTH,
            subgroups_per_workgroup: invocations.div_ceil(SIMD_WIDTH),
            invocations_per_workgroup: invocations,
            descriptor_sets: {
                let mut sets = ProgramData::default().descriptor_sets;
                sets[0] = descriptor_set.as_mut_ptr();
                sets
            },
            ..Default::default()
        };

        let workgroups = (x as u64 * y as u64)
            .checked_mul(z as u64)
            .ok_or(RuntimeError::InvalidGrid { x, y, z })?;
        debug!(
            "prepared dispatch of {}x{}x{} workgroups ({:?} invocations each) over {} threads",
            x, y, z, workgroup_size, threads
        );

        self.prepared = Some(Prepared {
            info,
            data,
            grid: [x, y, z],
            threads,
            workgroups,
        });
        self.claimed = (0..threads).map(|_| AtomicBool::new(false)).collect();
        self.remaining.store(threads, Ordering::Release);
        self.state.store(DispatchState::Prepared as u8, Ordering::Release);

        Ok(())
    }

    /// Runs every workgroup of subgroup `index` on the calling thread.
    pub fn dispatch(&self, index: usize, thread: &mut ThreadContext) -> Result<(), RuntimeError> {
        let prepared = self.prepared.as_ref().ok_or(RuntimeError::NotPrepared)?;

        if index >= prepared.threads {
            return Err(RuntimeError::SubgroupOutOfRange {
                index,
                threads: prepared.threads,
            });
        }

        if self.claimed[index].swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::AlreadyDispatched { index });
        }

        let _ = self.state.compare_exchange(
            DispatchState::Prepared as u8,
            DispatchState::Dispatching as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let workgroups = partition(prepared.workgroups, prepared.threads, index);
        trace!("subgroup {} runs workgroups {:?}", index, workgroups);

        thread.data = prepared.data;
        thread.arena.reset();
        let memory = thread.workgroup_memory(prepared.info.min_memory_size);

        // SAFETY: the program data was built for this program in `prepare`, and the
        // descriptor set it points to is borrowed for the lifetime of the context
        unsafe {
            scheduler::run_subgroup(prepared.info, &mut thread.data, memory, workgroups, &thread.arena);
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.store(DispatchState::Completed as u8, Ordering::Release);
            debug!("dispatch completed");
        }

        Ok(())
    }

    /// Dispatches every subgroup on a fresh pool with one thread per subgroup and waits for all of them.
    pub fn run(&self) -> Result<(), RuntimeError> {
        let threads = self.thread_count().ok_or(RuntimeError::NotPrepared)?;

        let mut pool = ThreadPool::with_threads(threads);
        let contexts = (0..pool.num_threads())
            .map(|_| Mutex::new(ThreadContext::new()))
            .collect::<Vec<_>>();
        let error = Mutex::new(None);

        let subgroups = (0..threads).collect::<Vec<_>>();
        pool.execute(&subgroups, |&index, thread| {
            let mut context = contexts[thread].lock().unwrap();
            if let Err(err) = self.dispatch(index, &mut context) {
                error.lock().unwrap().get_or_insert(err);
            }
        });

        match error.into_inner().unwrap() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> DispatchState {
        DispatchState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_completed(&self) -> bool {
        self.state() == DispatchState::Completed
    }

    pub fn thread_count(&self) -> Option<usize> {
        self.prepared.as_ref().map(|p| p.threads)
    }

    pub fn grid(&self) -> Option<[u32; 3]> {
        self.prepared.as_ref().map(|p| p.grid)
    }

    pub fn workgroup_count(&self) -> Option<u64> {
        self.prepared.as_ref().map(|p| p.workgroups)
    }

    pub fn invocation_count(&self) -> Option<u64> {
        self.prepared
            .as_ref()
            .and_then(|p| p.workgroups.checked_mul(p.data.invocations_per_workgroup as u64))
    }

    /// Linear workgroup indices assigned to subgroup `index`.
    pub fn subgroup(&self, index: usize) -> Option<Range<u64>> {
        let prepared = self.prepared.as_ref()?;
        (index < prepared.threads).then(|| partition(prepared.workgroups, prepared.threads, index))
    }
}

impl Default for DispatchContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn partition(total: u64, parts: usize, index: usize) -> Range<u64> {
    let (parts, index) = (parts as u64, index as u64);
    let base = total / parts;
    let rem = total % parts;

    let start = index * base + index.min(rem);
    let len = base + (index < rem) as u64;
    start..start + len
}
