use bumpalo::{Bump, collections::Vec};
use picocompute_core::{ProgramData, ProgramInfo, YIELD_CONTROL_BARRIER};
use std::{ffi::c_void, ops::Range};

/// Runs the workgroups with linear indices in `workgroups` one after another.
///
/// Linear indices are decomposed with `x` varying fastest.
///
/// # Safety
/// `data` must point at program data prepared for `info`, and `memory` at
/// `info.min_memory_size` bytes of workgroup memory, both valid for the whole call.
pub(crate) unsafe fn run_subgroup(
    info: &ProgramInfo,
    data: *mut ProgramData,
    memory: *mut c_void,
    workgroups: Range<u64>,
    arena: &Bump,
) {
    // SAFETY: guaranteed by the caller
    let (grid, subgroups) = unsafe { ((*data).num_workgroups, (*data).subgroups_per_workgroup) };
    let (nx, ny) = (grid[0] as u64, grid[1] as u64);

    for index in workgroups {
        let x = index % nx;
        let y = index / nx % ny;
        let z = index / (nx * ny);

        // SAFETY: guaranteed by the caller
        unsafe {
            run_workgroup(info, data, memory, [x as i32, y as i32, z as i32], subgroups as i32, arena);
        }
    }
}

/// Runs every invocation of one workgroup to completion on the calling thread.
///
/// Programs with control barriers get one coroutine per invocation group, resumed round-robin,
/// so every coroutine reaches a barrier before any of them is resumed past it.
/// Programs without barriers run as one coroutine covering all invocation groups.
///
/// # Safety
/// See [`run_subgroup`].
pub(crate) unsafe fn run_workgroup(
    info: &ProgramInfo,
    data: *mut ProgramData,
    memory: *mut c_void,
    workgroup: [i32; 3],
    subgroups: i32,
    arena: &Bump,
) {
    let [x, y, z] = workgroup;
    let mut result = YIELD_CONTROL_BARRIER;

    if !info.has_cbarriers {
        // SAFETY: the coroutine triple comes from the same program and is used in order
        unsafe {
            let coroutine = (info.begin)(data, x, y, z, memory, 0, subgroups);
            while (info.await_)(coroutine, &mut result) {}
            (info.destroy)(coroutine);
        }
        return;
    }

    let mut coroutines = Vec::with_capacity_in(subgroups as usize, arena);
    for subgroup in 0..subgroups {
        // SAFETY: see above
        coroutines.push(unsafe { (info.begin)(data, x, y, z, memory, subgroup, 1) });
    }

    while !coroutines.is_empty() {
        // SAFETY: see above, finished coroutines are destroyed exactly once and dropped from the list
        coroutines.retain(|coroutine| unsafe {
            let coroutine = *coroutine;
            if (info.await_)(coroutine, &mut result) {
                true
            } else {
                (info.destroy)(coroutine);
                false
            }
        });
    }
}
