//! Runs a small kernel over a `0:buffer,1:image` descriptor set and writes the image to `dump.png`.

use picocompute::{
    Buffer, BufferDescriptor, DescriptorSet, DispatchContext, HostProgram, Image, ImageDescriptor, Invocation, Kernel,
    Step,
};

#[derive(DescriptorSet)]
#[repr(C)]
struct Scenario {
    binding0: BufferDescriptor,
    binding1: ImageDescriptor,
}

#[derive(Default)]
struct Gradient;

impl Kernel for Gradient {
    type DescriptorSet = Scenario;
    const WORKGROUP_SIZE: [u32; 3] = [2, 2, 1];

    fn resume(&mut self, inv: &Invocation<Scenario>) -> Step {
        let [x, y, z] = inv.global_id;
        let width = inv.num_workgroups[0] * inv.workgroup_size[0];
        let height = inv.num_workgroups[1] * inv.workgroup_size[1];
        let index = (z * height + y) * width + x;

        unsafe {
            let set = inv.descriptor_set();
            set.binding0.write(index as usize, index as i32);
            if z == 0 {
                let r = (x * 255 / (width - 1)) as u8;
                let g = (y * 255 / (height - 1)) as u8;
                set.binding1.write_pixel(x as i32, y as i32, [r, g, 0x80, 0xff]);
            }
        }

        Step::Done
    }
}

fn main() {
    let (gx, gy, gz) = (4, 3, 2);
    let [wx, wy, wz] = Gradient::WORKGROUP_SIZE;
    let (width, height) = ((gx * wx) as usize, (gy * wy) as usize);

    let mut buffer = Buffer::new((gx * gy * gz * wx * wy * wz) as usize * size_of::<i32>());
    let mut image = Image::new_rgba(width, height);
    let program = HostProgram::<Gradient>::new();
    let threads = std::thread::available_parallelism().map_or(4, |n| n.get());

    {
        let mut set = Scenario {
            binding0: buffer.descriptor(),
            binding1: image.descriptor(),
        };

        let mut ctx = DispatchContext::new();
        unsafe { ctx.prepare(threads, &program.program(), &mut set, gx, gy, gz) }.expect("prepare dispatch");
        ctx.run().expect("dispatch");
    }

    println!("buffer: {:?}", buffer.as_slice::<i32>());

    image::RgbaImage::from_raw(width as u32, height as u32, image.data().to_vec())
        .expect("image data is width * height * 4 bytes")
        .save("dump.png")
        .expect("write dump.png");
}
