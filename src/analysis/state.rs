// This module implements the conservative forward dataflow analysis the generator runs
// before inserting or mutating a call. A Snapshot is built by walking every call that
// precedes the cutoff in program order and recording what it makes available: resource
// producers grouped by kind name (in the order they were seen), the distinct contents of
// input strings and filenames, and the memory those calls touch. Pointers with a subtree
// reserve their byte range in the MemAlloc; raw mappings reserve their pages in the
// VmaAlloc. The analysis only over-approximates; it never removes anything it recorded and
// it never reads the arguments of the cutoff call or anything after it.

//! Resource and memory analysis.

use super::alloc::{MemAlloc, VmaAlloc};
use super::foreach::foreach_arg;
use crate::core::arg::{ArgId, ArgKind, PointerPayload};
use crate::core::error::{ProgError, ProgResult};
use crate::core::prog::{Call, Program};
use crate::core::target::Target;
use crate::core::types::{BufferKind, Dir, TypeKind};
use hashbrown::{HashMap, HashSet};
use std::sync::Arc;

/// What is available to a call, as computed by [`analyze`].
#[derive(Debug, Clone)]
pub struct Snapshot {
    target: Arc<Target>,
    resources: HashMap<String, Vec<ArgId>>,
    files: HashSet<Vec<u8>>,
    strings: HashSet<Vec<u8>>,
    ma: MemAlloc,
    va: VmaAlloc,
}

/// Analyze `prog` up to but not including call `before`, or the whole program
/// for `None`.
pub fn analyze(prog: &Program, before: Option<usize>) -> ProgResult<Snapshot> {
    let end = match before {
        Some(idx) if idx > prog.len() => {
            return Err(ProgError::CallOutOfRange {
                idx,
                len: prog.len(),
            })
        }
        Some(idx) => idx,
        None => prog.len(),
    };
    let mut snapshot = Snapshot::new(prog.target.clone());
    for call in &prog.calls()[..end] {
        snapshot.analyze_call(prog, call)?;
    }
    Ok(snapshot)
}

impl Snapshot {
    /// Empty snapshot with allocators sized for `target`.
    pub fn new(target: Arc<Target>) -> Self {
        Self {
            ma: MemAlloc::new(target.mem_size()),
            va: VmaAlloc::new(target.num_pages),
            target,
            resources: HashMap::new(),
            files: HashSet::new(),
            strings: HashSet::new(),
        }
    }

    /// Record everything `call` makes available to later calls.
    pub fn analyze_call(&mut self, prog: &Program, call: &Call) -> ProgResult<()> {
        log::trace!("analyzing call {}", call.meta.name);
        let page_size = self.target.page_size;
        foreach_arg(prog, call, |id, arg, _| {
            if let ArgKind::Pointer { address, payload } = arg.kind {
                match payload {
                    PointerPayload::Null => {}
                    PointerPayload::Vma(size) => {
                        self.va.note_alloc(address / page_size, size / page_size)
                    }
                    PointerPayload::Res(res) => self.ma.note_alloc(address, prog.arg_size(res)),
                }
            }
            match &arg.ty.kind {
                TypeKind::Resource(desc) if arg.ty.dir != Dir::In => {
                    self.resources.entry(desc.name.clone()).or_default().push(id);
                }
                TypeKind::Buffer(kind) if arg.ty.dir != Dir::Out => {
                    let Some(data) = arg.data().filter(|d| !d.is_empty()) else {
                        return;
                    };
                    match kind {
                        BufferKind::String => {
                            self.strings.insert(data.to_vec());
                        }
                        BufferKind::Filename => {
                            self.files.insert(data.to_vec());
                        }
                        BufferKind::Blob => {}
                    }
                }
                _ => {}
            }
        })
    }

    /// Producers of resource kind `name`, in program order.
    pub fn resources(&self, name: &str) -> &[ArgId] {
        self.resources.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resource kinds with at least one producer.
    pub fn resource_kinds(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn files(&self) -> &HashSet<Vec<u8>> {
        &self.files
    }

    pub fn strings(&self) -> &HashSet<Vec<u8>> {
        &self.strings
    }

    pub fn mem_alloc(&self) -> &MemAlloc {
        &self.ma
    }

    pub fn vma_alloc(&self) -> &VmaAlloc {
        &self.va
    }
}
