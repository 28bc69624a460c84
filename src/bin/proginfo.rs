//! Inspect built-in targets and run the program passes on a demo program.
//!
//! With `--demo`, every syscall of the target is called once with default
//! arguments. Resource inputs take the latest compatible producer reported by
//! the analysis, then complex pointers are squashed and the result is dumped.

use clap::Parser;
use std::sync::Arc;
use sysprog::core::{Call, Dir, ResourceDesc, StructKey, Syscall, Type, TypeKind};
use sysprog::{analyze, required_features, sys, ArgId, ProgError, ProgResult, Program, Snapshot};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Target OS
    #[arg(long, default_value = "test")]
    os: String,

    /// Target architecture
    #[arg(long, default_value = "64")]
    arch: String,

    /// List registered targets and exit
    #[arg(long)]
    list: bool,

    /// Build, analyze and squash a demo program
    #[arg(long)]
    demo: bool,
}

/// Most recently created resource whose kind can stand in for `want`.
fn latest_producer(prog: &Program, snapshot: &Snapshot, want: &ResourceDesc) -> Option<ArgId> {
    snapshot
        .resource_kinds()
        .flat_map(|kind| snapshot.resources(kind).iter().copied())
        .filter(|&id| match &prog.arg(id).ty.kind {
            TypeKind::Resource(have) => have.compatible_with(want),
            _ => false,
        })
        .max()
}

/// Builds default-valued arguments, handing out fresh addresses as it goes.
struct DemoBuilder {
    next_addr: u64,
    next_page: u64,
}

impl DemoBuilder {
    fn new() -> Self {
        Self {
            next_addr: 0,
            next_page: 0,
        }
    }

    fn call(&mut self, prog: &mut Program, meta: &Arc<Syscall>) -> ProgResult<Call> {
        let snapshot = analyze(prog, None)?;
        let mut args = Vec::with_capacity(meta.args.len());
        for ty in &meta.args {
            args.push(self.arg(prog, &snapshot, ty.clone())?);
        }
        let mut call = Call::new(meta.clone(), args);
        if let Some(ret) = meta.ret.as_ref().filter(|t| t.resource_desc().is_some()) {
            call = call.with_ret(prog.make_result(ret.clone(), None, 0));
        }
        Ok(call)
    }

    fn arg(&mut self, prog: &mut Program, snapshot: &Snapshot, ty: Arc<Type>) -> ProgResult<ArgId> {
        let id = match &ty.kind {
            TypeKind::Int(_)
            | TypeKind::Flags { .. }
            | TypeKind::Len { .. }
            | TypeKind::Proc { .. }
            | TypeKind::Csum { .. } => prog.make_const(ty, 0),
            TypeKind::Const { val, .. } => {
                let val = *val;
                prog.make_const(ty, val)
            }
            TypeKind::Resource(desc) => {
                if ty.dir == Dir::In {
                    let producer = latest_producer(prog, snapshot, desc);
                    let val = desc.values.first().copied().unwrap_or(0);
                    prog.make_result(ty, producer, val)
                } else {
                    prog.make_result(ty, None, 0)
                }
            }
            TypeKind::Vma => {
                let page_size = prog.target.page_size;
                let addr = self.next_page * page_size;
                self.next_page += 1;
                prog.make_vma(ty, addr, page_size)
            }
            TypeKind::Ptr { elem } => {
                let res = self.arg(prog, snapshot, elem.clone())?;
                let addr = self.next_addr;
                self.next_addr += prog.arg_size(res).div_ceil(64).max(1) * 64;
                prog.make_pointer(ty, addr, res)
            }
            TypeKind::Buffer(_) => {
                if ty.dir == Dir::Out {
                    prog.make_out_data(ty, 8)
                } else {
                    prog.make_data(ty, b"./file0".to_vec())
                }
            }
            TypeKind::Array { elem } => {
                let count = if ty.varlen || elem.size == 0 {
                    1
                } else {
                    ty.size / elem.size
                };
                let mut inner = Vec::new();
                for _ in 0..count {
                    inner.push(self.arg(prog, snapshot, elem.clone())?);
                }
                prog.make_group(ty, inner)
            }
            TypeKind::Struct { key, .. } => {
                let fields = self.fields(prog, key)?;
                let mut inner = Vec::with_capacity(fields.len());
                for field in fields {
                    inner.push(self.arg(prog, snapshot, field)?);
                }
                prog.make_group(ty, inner)
            }
            TypeKind::Union { key } => {
                let fields = self.fields(prog, key)?;
                let first = fields.into_iter().next().ok_or(ProgError::UnknownStruct {
                    name: key.name.clone(),
                })?;
                let option = self.arg(prog, snapshot, first)?;
                prog.make_union(ty, option)
            }
        };
        Ok(id)
    }

    fn fields(&self, prog: &Program, key: &StructKey) -> ProgResult<Vec<Arc<Type>>> {
        prog.target
            .struct_desc(key)
            .map(|desc| desc.fields.clone())
            .ok_or_else(|| ProgError::UnknownStruct {
                name: key.name.clone(),
            })
    }
}

fn run_demo(prog: &mut Program) -> ProgResult<()> {
    let mut builder = DemoBuilder::new();
    let syscalls = prog.target.syscalls.clone();
    for meta in &syscalls {
        let call = builder.call(prog, meta)?;
        prog.push_call(call);
    }
    println!("{}", prog);

    let snapshot = analyze(prog, None)?;
    let mut kinds: Vec<_> = snapshot.resource_kinds().collect();
    kinds.sort_unstable();
    for kind in kinds {
        let producers: Vec<_> = snapshot.resources(kind).iter().map(|id| id.to_string()).collect();
        println!("Resource {}: {}", kind, producers.join(", "));
    }
    println!("Files: {}", snapshot.files().len());
    println!("Strings: {}", snapshot.strings().len());
    println!("Mapped pages: {:?}", snapshot.vma_alloc().used_pages());

    let features = required_features(prog)?;
    println!(
        "Features: bitmasks={} checksums={}",
        features.bitmasks, features.checksums
    );

    let complex = prog.complex_ptrs()?;
    println!("Complex pointers: {}", complex.len());
    for ptr in complex {
        prog.squash_ptr(ptr, true)?;
    }
    println!();
    println!("{}", prog);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    if args.list {
        for (os, arch) in sys::targets() {
            println!("{}/{}", os, arch);
        }
        return Ok(());
    }

    let target = sys::target(&args.os, &args.arch)?;
    print!("{}", target);

    if args.demo {
        let mut prog = Program::new(target);
        if let Err(e) = run_demo(&mut prog) {
            if e.is_corrupt() {
                eprintln!("Corrupt program: {}", e);
            }
            return Err(e.into());
        }
    }
    Ok(())
}
