// This module implements Target, the immutable per-architecture description every program
// is built against. A Target is constructed once from a TargetDesc (os/arch identity,
// pointer width, page size and page count of the simulated address space, the data
// offset at which that space is mapped, and the syscall/resource/struct/constant tables)
// and then shared read-only as Arc<Target>. Construction validates the configuration,
// assigns syscall ids, indexes the tables with hashbrown maps and builds the five ANY
// types used by pointer squashing, registering the ANY union's option list next to the
// descriptor structs so that lookups by StructKey treat it like any other union.

//! Per-architecture target descriptions.

use super::error::{ProgError, ProgResult};
use super::types::{ConstValue, ResourceDesc, StructDesc, StructKey, Syscall};
use crate::any::AnyTypes;
use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default size of a simulated page.
pub const DEFAULT_PAGE_SIZE: u64 = 4 << 10;

/// Default number of pages in the simulated address space.
pub const DEFAULT_NUM_PAGES: u64 = 4 << 10;

/// Default address at which the simulated address space is mapped.
pub const DEFAULT_DATA_OFFSET: u64 = 512 << 20;

/// Input for [`Target::new`].
#[derive(Debug, Clone)]
pub struct TargetDesc {
    pub os: String,
    pub arch: String,
    pub revision: String,
    pub ptr_size: u64,
    pub page_size: u64,
    pub num_pages: u64,
    pub data_offset: u64,
    pub syscalls: Vec<Syscall>,
    pub resources: Vec<Arc<ResourceDesc>>,
    pub structs: Vec<StructDesc>,
    pub consts: Vec<ConstValue>,
}

impl Default for TargetDesc {
    fn default() -> Self {
        Self {
            os: String::new(),
            arch: String::new(),
            revision: String::new(),
            ptr_size: 8,
            page_size: DEFAULT_PAGE_SIZE,
            num_pages: DEFAULT_NUM_PAGES,
            data_offset: DEFAULT_DATA_OFFSET,
            syscalls: Vec::new(),
            resources: Vec::new(),
            structs: Vec::new(),
            consts: Vec::new(),
        }
    }
}

/// Immutable description of one OS/architecture pair.
pub struct Target {
    pub os: String,
    pub arch: String,
    pub revision: String,
    pub ptr_size: u64,
    pub page_size: u64,
    pub num_pages: u64,
    pub data_offset: u64,
    pub syscalls: Vec<Arc<Syscall>>,
    pub resources: Vec<Arc<ResourceDesc>>,
    pub consts: Vec<ConstValue>,
    syscall_map: HashMap<String, Arc<Syscall>>,
    resource_map: HashMap<String, Arc<ResourceDesc>>,
    struct_descs: HashMap<StructKey, Arc<StructDesc>>,
    any: AnyTypes,
}

impl Target {
    /// Validate `desc` and build the target, including the ANY types.
    pub fn new(desc: TargetDesc) -> ProgResult<Self> {
        if desc.ptr_size != 4 && desc.ptr_size != 8 {
            return Err(ProgError::BadPointerSize {
                size: desc.ptr_size,
            });
        }
        if !desc.page_size.is_power_of_two() {
            return Err(ProgError::InvalidTarget {
                reason: format!("page size {} is not a power of two", desc.page_size),
            });
        }
        if desc.num_pages == 0 {
            return Err(ProgError::InvalidTarget {
                reason: "empty address space".to_string(),
            });
        }

        let mut syscalls = Vec::with_capacity(desc.syscalls.len());
        let mut syscall_map = HashMap::new();
        for (id, mut call) in desc.syscalls.into_iter().enumerate() {
            call.id = id;
            let call = Arc::new(call);
            if syscall_map.insert(call.name.clone(), call.clone()).is_some() {
                return Err(ProgError::InvalidTarget {
                    reason: format!("duplicate syscall {}", call.name),
                });
            }
            syscalls.push(call);
        }

        let mut resource_map = HashMap::new();
        for res in &desc.resources {
            resource_map.insert(res.name.clone(), res.clone());
        }

        let any = AnyTypes::new(desc.ptr_size);
        let mut struct_descs = HashMap::new();
        for st in desc.structs.into_iter().chain(std::iter::once(any.union_desc())) {
            let key = st.key.clone();
            if struct_descs.insert(key.clone(), Arc::new(st)).is_some() {
                return Err(ProgError::InvalidTarget {
                    reason: format!("duplicate struct {} ({})", key.name, key.dir),
                });
            }
        }

        log::debug!(
            "target {}/{}: {} syscalls, {} resources, {} structs",
            desc.os,
            desc.arch,
            syscalls.len(),
            resource_map.len(),
            struct_descs.len()
        );

        Ok(Self {
            os: desc.os,
            arch: desc.arch,
            revision: desc.revision,
            ptr_size: desc.ptr_size,
            page_size: desc.page_size,
            num_pages: desc.num_pages,
            data_offset: desc.data_offset,
            syscalls,
            resources: desc.resources,
            consts: desc.consts,
            syscall_map,
            resource_map,
            struct_descs,
            any,
        })
    }

    pub fn syscall(&self, name: &str) -> Option<&Arc<Syscall>> {
        self.syscall_map.get(name)
    }

    pub fn resource(&self, name: &str) -> Option<&Arc<ResourceDesc>> {
        self.resource_map.get(name)
    }

    pub fn struct_desc(&self, key: &StructKey) -> Option<&Arc<StructDesc>> {
        self.struct_descs.get(key)
    }

    pub fn const_value(&self, name: &str) -> Option<u64> {
        self.consts.iter().find(|c| c.name == name).map(|c| c.value)
    }

    /// The ANY types shared by every program on this target.
    pub fn any(&self) -> &AnyTypes {
        &self.any
    }

    /// Size of the simulated address space in bytes.
    pub fn mem_size(&self) -> u64 {
        self.num_pages * self.page_size
    }

    /// Address of a pointer as seen by the executor.
    pub fn physical_addr(&self, address: u64, is_null: bool) -> u64 {
        if is_null {
            return 0;
        }
        self.data_offset.wrapping_add(address)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("os", &self.os)
            .field("arch", &self.arch)
            .field("ptr_size", &self.ptr_size)
            .field("page_size", &self.page_size)
            .field("num_pages", &self.num_pages)
            .field("syscalls", &self.syscalls.len())
            .finish()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Target {}/{}:", self.os, self.arch)?;
        if !self.revision.is_empty() {
            writeln!(f, "  Revision: {}", self.revision)?;
        }
        writeln!(f, "  Pointer size: {}", self.ptr_size)?;
        writeln!(
            f,
            "  Address space: {} pages of {} bytes at {:#x}",
            self.num_pages, self.page_size, self.data_offset
        )?;
        writeln!(f, "  Syscalls: {}", self.syscalls.len())?;
        for call in &self.syscalls {
            writeln!(f, "    {} (nr {})", call.name, call.nr)?;
        }
        writeln!(f, "  Resources: {}", self.resources.len())?;
        for res in &self.resources {
            writeln!(f, "    {} ({} bytes)", res.name, res.size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Dir, IntCommon, Type, TypeKind};

    fn desc() -> TargetDesc {
        TargetDesc {
            os: "test".to_string(),
            arch: "64".to_string(),
            ..TargetDesc::default()
        }
    }

    #[test]
    fn test_target_registers_any_union() {
        let target = Target::new(desc()).unwrap();
        let key = target.any().union.struct_key().unwrap().clone();
        let union = target.struct_desc(&key).unwrap();
        assert_eq!(union.fields.len(), 5);
        assert_eq!(target.mem_size(), DEFAULT_NUM_PAGES * DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_target_assigns_syscall_ids() {
        let int = Type::new("int32", 4, TypeKind::Int(IntCommon::default())).into_ref();
        let mut d = desc();
        d.syscalls.push(Syscall::new("foo", 1, vec![int.clone()]));
        d.syscalls.push(Syscall::new("bar", 2, vec![int]));
        let target = Target::new(d).unwrap();
        assert_eq!(target.syscall("foo").unwrap().id, 0);
        assert_eq!(target.syscall("bar").unwrap().id, 1);
        assert!(target.syscall("baz").is_none());
    }

    #[test]
    fn test_target_rejects_bad_config() {
        let mut d = desc();
        d.ptr_size = 2;
        assert_eq!(
            Target::new(d).unwrap_err(),
            ProgError::BadPointerSize { size: 2 }
        );

        let mut d = desc();
        d.page_size = 1000;
        assert!(matches!(
            Target::new(d),
            Err(ProgError::InvalidTarget { .. })
        ));

        let mut d = desc();
        d.structs.push(StructDesc {
            key: StructKey::new("ANYUNION", Dir::In),
            fields: Vec::new(),
        });
        assert!(Target::new(d).is_err());
    }

    #[test]
    fn test_physical_addr() {
        let target = Target::new(desc()).unwrap();
        assert_eq!(target.physical_addr(0x1000, false), DEFAULT_DATA_OFFSET + 0x1000);
        assert_eq!(target.physical_addr(0, true), 0);
        assert_eq!(
            target.physical_addr(u64::MAX - 0xfff, false),
            DEFAULT_DATA_OFFSET.wrapping_add(u64::MAX - 0xfff)
        );
    }
}
