//! Pointer squashing.
//!
//! [`Program::squash_ptr`] rewrites the subtree behind a pointer into an
//! ANYARRAY of ANYUNION elements. Scalars, raw addresses, input data and
//! padding are concatenated into blob elements; resources become kind-erased
//! 4- or 8-byte placeholders; nested pointers are squashed recursively and
//! kept as their own elements. The rewritten subtree has exactly the byte size
//! of the original one.
//!
//! Only the last member of a packed bitfield run contributes bytes. Middle
//! members are skipped, like the size accounting in traversal does.

use crate::core::arg::{ArgId, ArgKind, DataContent, PointerPayload};
use crate::core::error::{ProgError, ProgResult};
use crate::core::prog::Program;
use crate::core::types::{Dir, TypeKind};

impl Program {
    /// Replace the subtree behind pointer `id` with its universal encoding.
    ///
    /// The pointer keeps its id, address and width; its type becomes the
    /// matching ANY pointer, named after the original field when
    /// `preserve_field` is set.
    pub fn squash_ptr(&mut self, id: ArgId, preserve_field: bool) -> ProgResult<()> {
        let arg = self.arg(id);
        let res = match arg.kind {
            ArgKind::Pointer {
                payload: PointerPayload::Res(res),
                ..
            } => res,
            _ => {
                return Err(ProgError::BadPointer {
                    ty: arg.ty.to_string(),
                    reason: "squashed pointer has no pointee",
                })
            }
        };
        let ptr_size = arg.ty.size;
        let field = preserve_field.then(|| arg.ty.field_name.clone());
        let res_ty = self.arg(res).ty.to_string();
        let size0 = self.arg_size(res);

        let mut elems = Vec::new();
        self.squash_ptr_impl(res, &mut elems)?;

        let target = self.target.clone();
        let any = target.any();
        let ty = any.make_any_ptr_type(ptr_size, field.as_deref())?;
        let count = elems.len();
        let group = self.make_group(any.array.clone(), elems);
        let ptr = self.arg_mut(id);
        ptr.ty = ty;
        if let ArgKind::Pointer { payload, .. } = &mut ptr.kind {
            *payload = PointerPayload::Res(group);
        }

        let size = self.arg_size(group);
        if size != size0 {
            return Err(ProgError::SquashSize {
                before: size0,
                after: size,
                ty: res_ty,
            });
        }
        log::debug!(
            "squashed {} ({}): {} bytes into {} elements",
            id,
            res_ty,
            size,
            count
        );
        Ok(())
    }

    fn squash_ptr_impl(&mut self, id: ArgId, elems: &mut Vec<ArgId>) -> ProgResult<()> {
        let arg = self.arg(id);
        let ty = arg.ty.clone();
        if ty.bitfield_middle() {
            return Err(ProgError::BitfieldInSquash { ty: ty.to_string() });
        }
        let mut pad = 0;
        match arg.kind.clone() {
            ArgKind::Const { .. } => {
                if ty.is_pad() {
                    pad = ty.size;
                } else {
                    let v = arg.value_for_proc(0);
                    self.append_blob(elems, &le_bytes(v, ty.size));
                }
            }
            ArgKind::Result { .. } => {
                let any = self.target.any();
                let placeholder = match ty.size {
                    4 => any.res32.clone(),
                    8 => any.res64.clone(),
                    size => {
                        return Err(ProgError::BadResourceSize {
                            size,
                            ty: ty.to_string(),
                        })
                    }
                };
                self.arg_mut(id).ty = placeholder;
                self.push_elem(elems, id);
            }
            ArgKind::Pointer { address, payload } => match payload {
                PointerPayload::Res(_) => {
                    self.squash_ptr(id, false)?;
                    self.push_elem(elems, id);
                }
                PointerPayload::Null | PointerPayload::Vma(_) => {
                    let is_null = payload == PointerPayload::Null;
                    let addr = self.target.physical_addr(address, is_null);
                    self.append_blob(elems, &le_bytes(addr, ty.size));
                }
            },
            ArgKind::Union { option } => {
                if !ty.varlen {
                    pad = self.arg_size(id).saturating_sub(self.arg_size(option));
                }
                self.squash_ptr_impl(option, elems)?;
            }
            ArgKind::Data(content) => {
                if ty.dir == Dir::Out {
                    pad = self.arg_size(id);
                } else if let DataContent::Bytes(data) = content {
                    self.append_blob(elems, &data);
                }
            }
            ArgKind::Group { inner } => {
                let inner: Vec<_> = inner
                    .into_iter()
                    .filter(|&child| !self.arg(child).ty.bitfield_middle())
                    .collect();
                if let TypeKind::Struct { align_attr, .. } = ty.kind {
                    if ty.varlen && align_attr != 0 {
                        let fields_size: u64 = inner.iter().map(|&f| self.arg_size(f)).sum();
                        if fields_size % align_attr != 0 {
                            pad = align_attr - fields_size % align_attr;
                        }
                    }
                }
                for child in inner {
                    self.squash_ptr_impl(child, elems)?;
                }
            }
        }
        if pad != 0 {
            self.append_blob(elems, &vec![0; pad as usize]);
        }
        Ok(())
    }

    /// Wrap `option` in an ANY union and append it.
    fn push_elem(&mut self, elems: &mut Vec<ArgId>, option: ArgId) {
        let union = self.target.any().union.clone();
        let elem = self.make_union(union, option);
        elems.push(elem);
    }

    /// Append `bytes` to the trailing blob element, opening one if needed.
    fn append_blob(&mut self, elems: &mut Vec<ArgId>, bytes: &[u8]) {
        let open = elems.last().and_then(|&last| match self.arg(last).kind {
            ArgKind::Union { option } if self.arg(option).data().is_some() => Some(option),
            _ => None,
        });
        let blob = match open {
            Some(blob) => blob,
            None => {
                let ty = self.target.any().blob.clone();
                let blob = self.make_data(ty, Vec::new());
                self.push_elem(elems, blob);
                blob
            }
        };
        if let ArgKind::Data(DataContent::Bytes(data)) = &mut self.arg_mut(blob).kind {
            data.extend_from_slice(bytes);
        }
    }
}

/// The low `size` bytes of `v`, little-endian, zero-extended past 8.
fn le_bytes(v: u64, size: u64) -> Vec<u8> {
    (0..size)
        .map(|i| if i < 8 { (v >> (8 * i)) as u8 } else { 0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arg::Arg;
    use crate::core::prog::Call;
    use crate::core::test_utils::test::TestContext;

    /// Option args of the squashed array behind `ptr`.
    fn squashed_options(prog: &Program, ptr: ArgId) -> Vec<&Arg> {
        let array = prog.arg(ptr).pointee().unwrap();
        let ArgKind::Group { inner } = &prog.arg(array).kind else {
            panic!("squashed pointee is not a group");
        };
        inner
            .iter()
            .map(|&elem| match prog.arg(elem).kind {
                ArgKind::Union { option } => prog.arg(option),
                _ => panic!("element is not a union"),
            })
            .collect()
    }

    #[test]
    fn test_le_bytes() {
        assert_eq!(le_bytes(0x0102, 2), vec![0x02, 0x01]);
        assert_eq!(le_bytes(0x11223344, 4), vec![0x44, 0x33, 0x22, 0x11]);
        assert_eq!(le_bytes(u64::MAX, 10)[8..], [0, 0]);
    }

    #[test]
    fn test_squash_varlen_struct() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let ptr = ctx.varlen_arg(&mut prog, b"abc");
        let before = prog.arg_size(prog.arg(ptr).pointee().unwrap());

        prog.squash_ptr(ptr, true).unwrap();

        let ty = &prog.arg(ptr).ty;
        assert!(prog.target.any().is_any_ptr(ty));
        assert_eq!(ty.field_name, "a");
        assert_eq!(prog.arg_size(prog.arg(ptr).pointee().unwrap()), before);

        let opts = squashed_options(&prog, ptr);
        assert_eq!(opts.len(), 1);
        assert_eq!(opts[0].data().unwrap(), [0x44, 0x33, 0x22, 0x11, b'a', b'b', b'c']);
    }

    #[test]
    fn test_squash_without_preserve_uses_default_name() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let ptr = ctx.varlen_arg(&mut prog, b"abc");
        prog.squash_ptr(ptr, false).unwrap();
        assert_eq!(prog.arg(ptr).ty.field_name, "ANYPTR");
    }

    #[test]
    fn test_squash_aligned_struct_pads() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let ptr = ctx.aligned_arg(&mut prog, b"abc");
        prog.squash_ptr(ptr, false).unwrap();

        let opts = squashed_options(&prog, ptr);
        assert_eq!(opts.len(), 1);
        assert_eq!(opts[0].data().unwrap(), [7, 0, 0, 0, b'a', b'b', b'c', 0]);
    }

    #[test]
    fn test_squash_skips_middle_bitfields() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let ptr = ctx.bitfield_arg(&mut prog);
        prog.squash_ptr(ptr, false).unwrap();

        // f0 = 1 is a middle bitfield and is dropped; f1 = 2 and f2 = 3 remain.
        let opts = squashed_options(&prog, ptr);
        assert_eq!(opts[0].data().unwrap(), [2, 0, 3, 0]);
    }

    #[test]
    fn test_squash_resource_becomes_placeholder() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let ptr = ctx.union_arg(&mut prog, "test_union6", 5);
        prog.squash_ptr(ptr, false).unwrap();

        let opts = squashed_options(&prog, ptr);
        assert_eq!(opts.len(), 1);
        assert!(matches!(opts[0].kind, ArgKind::Result { .. }));
        assert_eq!(opts[0].ty.name, "ANYRES32");
    }

    #[test]
    fn test_squash_fixed_union_pads_to_declared_size() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let ptr = ctx.fixed_union_arg(&mut prog);
        prog.squash_ptr(ptr, false).unwrap();

        let opts = squashed_options(&prog, ptr);
        assert_eq!(opts[0].data().unwrap(), [4, 3, 2, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_squash_pointer_without_pointee_is_bytes() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let ptr = ctx.complex_arg(&mut prog);
        let st = prog.arg(ptr).pointee().unwrap();
        let ArgKind::Group { inner } = &prog.arg(st).kind else {
            panic!("complex_struct is not a group");
        };
        let inner_ptr = inner[1];
        let null = prog.make_null(prog.arg(inner_ptr).ty.clone());
        if let ArgKind::Group { inner } = &mut prog.arg_mut(st).kind {
            inner[1] = null;
        }

        prog.squash_ptr(ptr, false).unwrap();
        let opts = squashed_options(&prog, ptr);
        // fd placeholder, then one blob: 8 null address bytes, union, array, pad.
        assert_eq!(opts.len(), 2);
        assert_eq!(opts[0].ty.name, "ANYRES32");
        let blob = opts[1].data().unwrap();
        assert_eq!(blob.len(), 8 + 8 + 4 + 4);
        assert_eq!(blob[..8], [0; 8]);
        assert_eq!(blob[8..12], [0x55, 0, 0, 0]);
        assert_eq!(blob[16..20], [0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn test_squash_out_data_is_zero_padding() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let fields = ctx.fields("varlen_struct", Dir::In);
        let ptr_ty = ctx.arg_type("test_varlen", 0);
        let out_ty = (*fields[1]).clone().with_dir(Dir::Out).into_ref();
        let hdr = prog.make_const(fields[0].clone(), 0);
        let data = prog.make_out_data(out_ty, 6);
        let st = prog.make_group(ptr_ty.ptr_elem().unwrap().clone(), vec![hdr, data]);
        let ptr = prog.make_pointer(ptr_ty, 0, st);

        prog.squash_ptr(ptr, false).unwrap();
        let opts = squashed_options(&prog, ptr);
        assert_eq!(opts[0].data().unwrap(), [0; 10]);
    }

    #[test]
    fn test_squash_rejects_non_pointer_and_null() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let (_, [rfd, _]) = ctx.pipe_arg(&mut prog);
        assert!(matches!(
            prog.squash_ptr(rfd, false),
            Err(ProgError::BadPointer { .. })
        ));

        let null = prog.make_null(ctx.arg_type("test_varlen", 0));
        let err = prog.squash_ptr(null, false).unwrap_err();
        assert!(err.is_corrupt());

        let vma = prog.make_vma(ctx.arg_type("mmap", 0), 0x1000, 0x1000);
        assert!(matches!(
            prog.squash_ptr(vma, false),
            Err(ProgError::BadPointer { .. })
        ));
    }

    #[test]
    fn test_squash_raw_address_near_top_wraps() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let ptr = ctx.complex_arg(&mut prog);
        let st = prog.arg(ptr).pointee().unwrap();
        let ArgKind::Group { inner } = &prog.arg(st).kind else {
            panic!("complex_struct is not a group");
        };
        let field = inner[1];
        let address = u64::MAX - 0xfff;
        prog.arg_mut(field).kind = ArgKind::Pointer {
            address,
            payload: PointerPayload::Vma(0x1000),
        };

        prog.squash_ptr(ptr, false).unwrap();
        let opts = squashed_options(&prog, ptr);
        let blob = opts[1].data().unwrap();
        let expected = prog.target.data_offset.wrapping_add(address);
        assert_eq!(blob[..8], le_bytes(expected, 8)[..]);
    }

    #[test]
    fn test_squash_detects_corrupt_group() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let ptr = ctx.fixed_union_arg(&mut prog);
        // Swap the 4-byte option for a 16-byte blob: wider than the union itself.
        let blob = prog.make_data(prog.target.any().blob.clone(), vec![1; 16]);
        let union = prog.arg(ptr).pointee().unwrap();
        if let ArgKind::Union { option } = &mut prog.arg_mut(union).kind {
            *option = blob;
        }
        assert!(matches!(
            prog.squash_ptr(ptr, false),
            Err(ProgError::SquashSize {
                before: 8,
                after: 16,
                ..
            })
        ));
    }

    #[test]
    fn test_squash_nested_on_32bit() {
        let ctx = TestContext::for_arch("32");
        let mut prog = ctx.program();
        let ptr = ctx.nested_arg(&mut prog, None);
        prog.squash_ptr(ptr, false).unwrap();

        assert_eq!(prog.arg(ptr).ty.size, 4);
        let opts = squashed_options(&prog, ptr);
        assert_eq!(opts.len(), 2);
        assert_eq!(opts[0].ty.name, "ANYRES64");
        assert_eq!(opts[1].ty.name, "ptr64");
    }

    #[test]
    fn test_squash_keeps_call_arguments() {
        let ctx = TestContext::new();
        let mut prog = ctx.program();
        let ptr = ctx.union_arg(&mut prog, "test_union6", 4);
        let idx = prog.push_call(Call::new(ctx.syscall("test_union6"), vec![ptr]));

        prog.squash_ptr(ptr, true).unwrap();
        let call = prog.call(idx).unwrap();
        assert_eq!(call.args, vec![ptr]);
        assert!(prog.call_contains_any(call).unwrap());
    }
}
