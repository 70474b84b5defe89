//! Source files describing a compiled program to C and Rust.

use crate::frontend::ProgramMetadata;
use picocompute_core::{ABI_H, ContentHash, Descriptor, DescriptorKind, DescriptorSetLayout, RUNTIME_H};
use std::fmt::Write;

const GENERATED: &str = "// Code generated by picocompute-compile. DO NOT EDIT.\n\n";

const SUPPORTED_CFG: &str =
    r#"all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "arm"))"#;

const SUPPORTED_C: &str = "defined(__linux__) && (defined(__x86_64__) || defined(__aarch64__) || defined(__arm__))";

/// Generates every file that accompanies the native object of one program.
pub struct Emitter<'a> {
    name: &'a str,
    layout: &'a DescriptorSetLayout,
    program: &'a ProgramMetadata,
    hash: ContentHash,
    crate_path: &'a str,
}

impl<'a> Emitter<'a> {
    pub fn new(
        name: &'a str,
        layout: &'a DescriptorSetLayout,
        program: &'a ProgramMetadata,
        hash: ContentHash,
        crate_path: &'a str,
    ) -> Self {
        Self {
            name,
            layout,
            program,
            hash,
            crate_path,
        }
    }

    /// All files as `(file name, contents)`, the shared support headers included.
    pub fn files(&self) -> Vec<(String, String)> {
        vec![
            (format!("{}_abi.h", self.name), self.header()),
            (format!("{}_abi.c", self.name), self.c_impl()),
            (format!("{}_abi.rs", self.name), self.rust_impl()),
            (format!("{}_abi_nosupport.rs", self.name), self.rust_fallback()),
            ("runtime.h".to_string(), RUNTIME_H.to_string()),
            ("abi.h".to_string(), ABI_H.to_string()),
        ]
    }

    /// C declarations of the descriptor set layout and the renamed coroutine entry points.
    pub fn header(&self) -> String {
        let name = self.name;
        let mut b = String::from(GENERATED);

        writeln!(b, "struct {}_descriptor_set_layout {{", name).ok();
        for desc in self.layout {
            write!(b, "\tstruct {}_descriptor binding{}", desc.kind, desc.binding).ok();
            if desc.is_array() {
                write!(b, "[{}]", desc.count).ok();
            }
            b.push_str(";\n");
        }
        b.push_str("};\n\n");

        writeln!(b, "extern coroutine {}_coroutine_begin(struct program_data *data,", name).ok();
        b.push_str("\tint32_t workgroupX, int32_t workgroupY, int32_t workgroupZ,\n");
        b.push_str("\tvoid *workgroupMemory,\n");
        b.push_str("\tint32_t firstSubgroup,\n");
        b.push_str("\tint32_t subgroupCount) ATTR_HIDDEN;\n\n");
        writeln!(b, "extern bool {}_coroutine_await(coroutine r, yield_result *res) ATTR_HIDDEN;", name).ok();
        writeln!(b, "extern void {}_coroutine_destroy(coroutine r) ATTR_HIDDEN;\n", name).ok();
        writeln!(b, "extern const struct program_info {}_program_info;", name).ok();
        b
    }

    /// Definition of `<name>_program_info`.
    pub fn c_impl(&self) -> String {
        let name = self.name;
        let program = self.program;
        let mut b = String::from(GENERATED);

        writeln!(b, "#if {}\n", SUPPORTED_C).ok();
        b.push_str("#include <stdint.h>\n");
        b.push_str("#include <stddef.h>\n");
        b.push_str("#include \"abi.h\"\n");
        b.push_str("#include \"runtime.h\"\n");
        writeln!(b, "#include \"{}_abi.h\"\n", name).ok();

        writeln!(b, "const struct program_info {}_program_info = {{", name).ok();
        writeln!(b, "\t.has_cbarriers = {},", program.has_control_barriers as u8).ok();
        writeln!(b, "\t.min_memory_size = {},", program.memory_size).ok();
        writeln!(b, "\t.desc_set_size = sizeof(struct {}_descriptor_set_layout),", name).ok();
        writeln!(b, "\t.workgroup_size_x = {},", program.workgroup_size[0]).ok();
        writeln!(b, "\t.workgroup_size_y = {},", program.workgroup_size[1]).ok();
        writeln!(b, "\t.workgroup_size_z = {},", program.workgroup_size[2]).ok();
        writeln!(b, "\t.begin = {}_coroutine_begin,", name).ok();
        writeln!(b, "\t.await = {}_coroutine_await,", name).ok();
        writeln!(b, "\t.destroy = {}_coroutine_destroy,", name).ok();
        writeln!(b, "\t.content_hash = {{{}}},", byte_list(&self.hash, "\t\t", "\t")).ok();
        b.push_str("};\n\n");
        b.push_str("#endif\n");
        b
    }

    /// Rust view of the program for supported platforms.
    pub fn rust_impl(&self) -> String {
        let krate = self.crate_path;
        let layout = self.layout_type();
        let mut b = String::from(GENERATED);

        writeln!(b, "#![cfg({})]\n", SUPPORTED_CFG).ok();

        b.push_str("#[repr(C)]\n#[derive(Clone, Copy, Debug)]\n");
        writeln!(b, "pub struct {} {{", layout).ok();
        for desc in self.layout {
            writeln!(b, "    binding{}: {},", desc.binding, self.field_type(desc)).ok();
        }
        b.push_str("}\n\n");

        writeln!(b, "impl Default for {} {{", layout).ok();
        b.push_str("    fn default() -> Self {\n        Self {\n");
        for desc in self.layout {
            let elem = self.descriptor_type(desc.kind);
            if desc.is_array() {
                writeln!(b, "            binding{}: [{}::default(); {}],", desc.binding, elem, desc.count).ok();
            } else {
                writeln!(b, "            binding{}: {}::default(),", desc.binding, elem).ok();
            }
        }
        b.push_str("        }\n    }\n}\n\n");

        writeln!(b, "unsafe impl {}::DescriptorSet for {} {{}}\n", krate, layout).ok();

        writeln!(b, "impl {} {{", layout).ok();
        for (i, desc) in self.layout.iter().enumerate() {
            if i > 0 {
                b.push('\n');
            }

            b.push_str(&self.accessor_signature(desc));
            b.push_str(" {\n");
            if desc.is_array() {
                writeln!(b, "        let count = self.binding{}.len();", desc.binding).ok();
                writeln!(b, "        self.binding{}", desc.binding).ok();
                b.push_str("            .get_mut(index)\n");
                writeln!(
                    b,
                    "            .ok_or({}::RuntimeError::BindingIndex {{ binding: {}, index, count }})",
                    krate, desc.binding
                )
                .ok();
            } else {
                writeln!(b, "        Ok(&mut self.binding{})", desc.binding).ok();
            }
            b.push_str("    }\n");
        }
        b.push_str("}\n\n");

        b.push_str("unsafe extern \"C\" {\n");
        writeln!(b, "    static {}_program_info: {}::ProgramInfo;", self.name, krate).ok();
        b.push_str("}\n\n");

        writeln!(
            b,
            "pub const {}: {}::ContentHash = {}::ContentHash::from_bytes([{}]);\n",
            self.hash_const(),
            krate,
            krate,
            byte_list(&self.hash, "    ", "")
        )
        .ok();

        writeln!(b, "pub fn {}_program() -> {}::Program<'static> {{", self.name, krate).ok();
        writeln!(b, "    // SAFETY: defined in {}_abi.c and never written", self.name).ok();
        writeln!(
            b,
            "    {}::Program::new(unsafe {{ &{}_program_info }}, {})",
            krate,
            self.name,
            self.hash_const()
        )
        .ok();
        b.push_str("}\n");
        b
    }

    /// Same surface as [`Emitter::rust_impl`] for platforms without native support.
    pub fn rust_fallback(&self) -> String {
        let krate = self.crate_path;
        let layout = self.layout_type();
        let mut b = String::from(GENERATED);

        writeln!(b, "#![cfg(not({}))]\n", SUPPORTED_CFG).ok();

        b.push_str("#[derive(Clone, Copy, Debug, Default)]\n");
        writeln!(b, "pub struct {} {{}}\n", layout).ok();
        writeln!(b, "unsafe impl {}::DescriptorSet for {} {{}}\n", krate, layout).ok();

        writeln!(b, "impl {} {{", layout).ok();
        for (i, desc) in self.layout.iter().enumerate() {
            if i > 0 {
                b.push('\n');
            }

            let signature = self.accessor_signature(desc).replace("index: usize", "_index: usize");
            b.push_str(&signature);
            b.push_str(" {\n");
            writeln!(b, "        Err({}::RuntimeError::Unsupported)", krate).ok();
            b.push_str("    }\n");
        }
        b.push_str("}\n\n");

        writeln!(
            b,
            "pub const {}: {}::ContentHash = {}::ContentHash::EMPTY;\n",
            self.hash_const(),
            krate,
            krate
        )
        .ok();

        writeln!(b, "pub fn {}_program() -> {}::Program<'static> {{", self.name, krate).ok();
        writeln!(b, "    {}::Program::unsupported()", krate).ok();
        b.push_str("}\n");
        b
    }

    fn layout_type(&self) -> String {
        format!("{}DescriptorSetLayout", camel_case(self.name))
    }

    fn hash_const(&self) -> String {
        format!("{}_HASH", self.name.to_ascii_uppercase())
    }

    fn descriptor_type(&self, kind: DescriptorKind) -> String {
        match kind {
            DescriptorKind::Buffer => format!("{}::BufferDescriptor", self.crate_path),
            DescriptorKind::Image => format!("{}::ImageDescriptor", self.crate_path),
        }
    }

    fn field_type(&self, desc: &Descriptor) -> String {
        if desc.is_array() {
            format!("[{}; {}]", self.descriptor_type(desc.kind), desc.count)
        } else {
            self.descriptor_type(desc.kind)
        }
    }

    fn accessor_signature(&self, desc: &Descriptor) -> String {
        let index = if desc.is_array() { ", index: usize" } else { "" };
        format!(
            "    pub fn binding{}(&mut self{}) -> Result<&mut {}, {}::RuntimeError>",
            desc.binding,
            index,
            self.descriptor_type(desc.kind),
            self.crate_path
        )
    }
}

/// Turns a program name into an identifier usable in C and Rust.
pub fn identifier(name: &str) -> String {
    let mut ident = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>();

    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }

    ident
}

fn camel_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Hash bytes as a comma separated list, eight per line, for array initializers.
fn byte_list(hash: &ContentHash, indent: &str, close: &str) -> String {
    let mut b = String::from("\n");
    for chunk in hash.as_bytes().chunks(8) {
        b.push_str(indent);
        for byte in chunk {
            write!(b, "0x{:02x}, ", byte).ok();
        }
        b.truncate(b.trim_end().len());
        b.push('\n');
    }
    b.push_str(close);
    b
}
