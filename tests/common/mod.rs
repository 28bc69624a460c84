//! Program-building helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use sysprog::core::{Call, Dir, StructKey, Type, TypeKind};
use sysprog::{sys, ArgId, Program};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Builds calls into a program, assigning each pointee its own 64-byte-aligned address.
pub struct Builder {
    pub prog: Program,
    next_addr: u64,
}

impl Builder {
    pub fn new(os: &str, arch: &str) -> Self {
        init_logging();
        Self {
            prog: Program::new(sys::target(os, arch).unwrap()),
            next_addr: 0,
        }
    }

    pub fn arg_type(&self, call: &str, idx: usize) -> Arc<Type> {
        self.prog.target.syscall(call).unwrap().args[idx].clone()
    }

    pub fn fields(&self, name: &str, dir: Dir) -> Vec<Arc<Type>> {
        self.prog
            .target
            .struct_desc(&StructKey::new(name, dir))
            .unwrap()
            .fields
            .clone()
    }

    pub fn ptr(&mut self, ty: Arc<Type>, res: ArgId) -> ArgId {
        let addr = self.next_addr;
        self.next_addr += self.prog.arg_size(res).div_ceil(64).max(1) * 64;
        self.prog.make_pointer(ty, addr, res)
    }

    pub fn push(&mut self, name: &str, args: Vec<ArgId>, ret: Option<ArgId>) -> usize {
        let meta = self.prog.target.syscall(name).unwrap().clone();
        let mut call = Call::new(meta, args);
        if let Some(ret) = ret {
            call = call.with_ret(ret);
        }
        self.prog.push_call(call)
    }

    /// `pipe(&pipefd{rfd, wfd})`, returning both fds.
    pub fn pipe(&mut self) -> [ArgId; 2] {
        let ptr_ty = self.arg_type("pipe", 0);
        let fields = self.fields("pipefd", Dir::Out);
        let rfd = self.prog.make_result(fields[0].clone(), None, 0);
        let wfd = self.prog.make_result(fields[1].clone(), None, 0);
        let st = self
            .prog
            .make_group(ptr_ty.ptr_elem().unwrap().clone(), vec![rfd, wfd]);
        let ptr = self.ptr(ptr_ty, st);
        self.push("pipe", vec![ptr], None);
        [rfd, wfd]
    }

    /// `close(fd)`, returning the input result.
    pub fn close(&mut self, fd: ArgId) -> ArgId {
        let ty = self.arg_type("close", 0);
        let arg = self.prog.make_result(ty, Some(fd), 0);
        self.push("close", vec![arg], None);
        arg
    }

    /// `open(file, 0)`, returning the produced fd.
    pub fn open(&mut self, file: &[u8]) -> ArgId {
        let ptr_ty = self.arg_type("open", 0);
        let data = self.prog.make_data(ptr_ty.ptr_elem().unwrap().clone(), file);
        let ptr = self.ptr(ptr_ty, data);
        let flags_ty = self.arg_type("open", 1);
        let flags = self.prog.make_const(flags_ty, 0);
        let ret_ty = self.prog.target.syscall("open").unwrap().ret.clone().unwrap();
        let ret = self.prog.make_result(ret_ty, None, 0);
        self.push("open", vec![ptr, flags], Some(ret));
        ret
    }

    /// `test_handle()`, returning the produced 8-byte handle.
    pub fn handle(&mut self) -> ArgId {
        let ret_ty = self.prog.target.syscall("test_handle").unwrap().ret.clone().unwrap();
        let ret = self.prog.make_result(ret_ty, None, 0);
        self.push("test_handle", Vec::new(), Some(ret));
        ret
    }

    /// A `varlen_struct` behind a pointer of type `ptr_ty`.
    pub fn varlen(&mut self, ptr_ty: Arc<Type>, data: &[u8]) -> ArgId {
        let fields = self.fields("varlen_struct", Dir::In);
        let hdr = self.prog.make_const(fields[0].clone(), 0xdeadbeef);
        let data = self.prog.make_data(fields[1].clone(), data);
        let st = self
            .prog
            .make_group(ptr_ty.ptr_elem().unwrap().clone(), vec![hdr, data]);
        self.ptr(ptr_ty, st)
    }

    /// `test_complex(&complex_struct{fd, &varlen_struct, u, arr, pad})`.
    ///
    /// Returns the call's pointer argument.
    pub fn complex(&mut self, fd: Option<ArgId>) -> ArgId {
        let ptr_ty = self.arg_type("test_complex", 0);
        let fields = self.fields("complex_struct", Dir::In);

        let fd = self.prog.make_result(fields[0].clone(), fd, u64::MAX);
        let inner = self.varlen(fields[1].clone(), b"payload");

        let union_fields = self.fields("fixed_union", Dir::In);
        let opt = self.prog.make_const(union_fields[1].clone(), 0x0807060504030201);
        let union = self.prog.make_union(fields[2].clone(), opt);

        let TypeKind::Array { elem } = &fields[3].kind else {
            panic!("arr is not an array");
        };
        let elems = vec![
            self.prog.make_const(elem.clone(), 0xaaaa),
            self.prog.make_const(elem.clone(), 0xbbbb),
        ];
        let arr = self.prog.make_group(fields[3].clone(), elems);
        let pad = self.prog.make_const(fields[4].clone(), 0);

        let st = self.prog.make_group(
            ptr_ty.ptr_elem().unwrap().clone(),
            vec![fd, inner, union, arr, pad],
        );
        let ptr = self.ptr(ptr_ty, st);
        self.push("test_complex", vec![ptr], None);
        ptr
    }

    /// `test_nested(&nested_struct{handle, ptr64 &bf_struct})`.
    ///
    /// Returns the call's pointer argument.
    pub fn nested(&mut self, handle: Option<ArgId>) -> ArgId {
        let ptr_ty = self.arg_type("test_nested", 0);
        let fields = self.fields("nested_struct", Dir::In);
        let h = self.prog.make_result(fields[0].clone(), handle, 0);

        let bf_fields = self.fields("bf_struct", Dir::In);
        let bf_inner = bf_fields
            .iter()
            .zip([5, 6, 7])
            .map(|(f, v)| self.prog.make_const(f.clone(), v))
            .collect();
        let wide_ty = fields[1].clone();
        let bf = self
            .prog
            .make_group(wide_ty.ptr_elem().unwrap().clone(), bf_inner);
        let wide = self.ptr(wide_ty, bf);

        let st = self
            .prog
            .make_group(ptr_ty.ptr_elem().unwrap().clone(), vec![h, wide]);
        let ptr = self.ptr(ptr_ty, st);
        self.push("test_nested", vec![ptr], None);
        ptr
    }
}
