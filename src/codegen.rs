//! Bytecode generation: one walk over an analyzed program, emitting
//! postfix stack code into an [`rtmc_image::ProgramImage`].
//!
//! Frame-slot addresses are not taken from `sema::Analysis`. This pass
//! re-runs the same declaration-order walk over parameters and locals
//! that the analyzer already did, so both passes land on identical
//! addresses without sharing any mutable state between them. What it
//! does reuse from `Analysis` is everything global: the struct/union
//! registry, and the ids already assigned to functions, globals, and
//! messages.

use std::collections::HashMap;

use rtmc_asm::{Instruction, Opcode, INTRINSIC_NAMES};
use rtmc_image::{ConstantValue, FunctionEntry, Mode, ProgramImage, SymbolEntry};
use rtmc_types::{align_up, PrimitiveType, Type, TypeRegistry};

use crate::ast::*;
use crate::error::CodegenError;
use crate::sema::{const_eval_int, Analysis, FunctionInfo, GlobalInfo, MessageInfo, ScopeStack, Symbol, SymbolKind};

type CResult<T> = Result<T, CodegenError>;

/// Lowers an analyzed program into a serializable image. Globals and
/// messages are declared first, then every function body in declaration
/// order, then a trailing `HALT`.
pub fn generate(analysis: &Analysis, mode: Mode) -> CResult<ProgramImage> {
    let mut cg = Codegen::new(analysis, mode);
    cg.emit_globals(&analysis.globals)?;
    cg.emit_messages(&analysis.messages);
    cg.reserve_functions(&analysis.functions);
    for f in &analysis.functions {
        cg.emit_function(f)?;
    }
    cg.patch_task_fn_addresses();
    cg.emit(Opcode::Halt, vec![], None);
    Ok(cg.into_image())
}

#[derive(Clone)]
struct FuncMeta {
    id: u32,
    return_type: Type,
}

#[derive(Default)]
struct LoopCtx {
    break_patches: Vec<usize>,
    continue_patches: Vec<usize>,
}

struct Codegen<'a> {
    registry: &'a TypeRegistry,
    mode: Mode,
    function_sigs: HashMap<String, FuncMeta>,
    scope: ScopeStack,
    instructions: Vec<Instruction>,
    constants: Vec<ConstantValue>,
    strings: Vec<String>,
    functions: Vec<FunctionEntry>,
    symbols: Vec<SymbolEntry>,
    loops: Vec<LoopCtx>,
    task_fn_patches: Vec<(usize, u32)>,
}

impl<'a> Codegen<'a> {
    fn new(analysis: &'a Analysis, mode: Mode) -> Self {
        let function_sigs = analysis
            .functions
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    FuncMeta { id: f.id, return_type: f.return_type.clone() },
                )
            })
            .collect();
        Self {
            registry: &analysis.registry,
            mode,
            function_sigs,
            scope: ScopeStack::new(),
            instructions: Vec::new(),
            constants: Vec::new(),
            strings: Vec::new(),
            functions: Vec::new(),
            symbols: Vec::new(),
            loops: Vec::new(),
            task_fn_patches: Vec::new(),
        }
    }

    /// Resolves every `StartTask`'s deferred `fn` operand to the callee's
    /// now-known entry address.
    fn patch_task_fn_addresses(&mut self) {
        let patches = std::mem::take(&mut self.task_fn_patches);
        for (idx, fn_id) in patches {
            let addr = self.functions[fn_id as usize].address;
            self.instructions[idx].operands[4] = addr as i64;
        }
    }

    fn into_image(self) -> ProgramImage {
        ProgramImage {
            instructions: self.instructions,
            constants: self.constants,
            strings: self.strings,
            functions: self.functions,
            symbols: self.symbols,
        }
    }

    fn emit(&mut self, opcode: Opcode, operands: Vec<i64>, pos: Option<Pos>) -> usize {
        let instr = match pos.filter(|_| self.mode.is_debug()) {
            Some(p) => Instruction::at(opcode, operands, p.line, p.column),
            None => Instruction::new(opcode, operands),
        };
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    fn patch_jump(&mut self, idx: usize, target: usize) {
        self.instructions[idx].operands[0] = target as i64;
    }

    fn intern_const(&mut self, value: ConstantValue) -> u32 {
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    fn intern_string(&mut self, s: String) -> u32 {
        self.strings.push(s);
        (self.strings.len() - 1) as u32
    }

    fn push_int(&mut self, v: i64, pos: Pos) {
        let cid = self.intern_const(ConstantValue::I32(v as i32));
        self.emit(Opcode::LoadConst, vec![cid as i64], Some(pos));
    }

    fn resolve_type(&self, te: &TypeExpr) -> Type {
        match te {
            TypeExpr::Primitive(p) => Type::Primitive(*p),
            TypeExpr::Pointer(inner) => Type::Pointer(Box::new(self.resolve_type(inner))),
            TypeExpr::Named(name) => match self.registry.layout(name) {
                Ok(layout) => match layout.kind {
                    rtmc_types::StructKind::Struct => Type::Struct(name.clone()),
                    rtmc_types::StructKind::Union => Type::Union(name.clone()),
                },
                Err(_) => Type::Struct(name.clone()),
            },
        }
    }

    // ---- top-level declarations ----

    /// Emits one declarative `GLOBAL_VAR_DECLARE(address, init_const_id,
    /// is_const)` per global, carrying the actual initial value in the
    /// constant pool rather than a byte size. A compound initializer (an
    /// array literal) or one that isn't a compile-time constant can't fit
    /// in a single pool slot, so those still get a follow-up imperative
    /// store sequence after every global has been declared; a plain
    /// constant-foldable scalar initializer needs nothing further.
    fn emit_globals(&mut self, globals: &[GlobalInfo]) -> CResult<()> {
        for g in globals {
            let cid = self.intern_const(const_for_global(&g.ty, g.init.as_ref()));
            self.emit(Opcode::GlobalVarDeclare, vec![g.address as i64, cid as i64, g.is_const as i64], None);
            self.scope.declare(
                &g.name,
                Symbol { kind: SymbolKind::Global, ty: g.ty.clone(), address: g.address, is_const: g.is_const },
            );
            if self.mode.is_debug() {
                self.symbols.push(SymbolEntry { name: g.name.clone(), address: g.address });
            }
        }
        for g in globals {
            if let Some(init) = &g.init {
                if !is_global_const_foldable(init) {
                    self.gen_initializer(g.address, &g.ty, init)?;
                }
            }
        }
        Ok(())
    }

    fn emit_messages(&mut self, messages: &[MessageInfo]) {
        for m in messages {
            self.emit(Opcode::MsgDeclare, vec![m.id as i64, type_tag(&m.element_type)], None);
            self.scope.declare(
                &m.name,
                Symbol {
                    kind: SymbolKind::Message,
                    ty: Type::Message(Box::new(m.element_type.clone())),
                    address: m.id,
                    is_const: true,
                },
            );
        }
    }

    fn reserve_functions(&mut self, functions: &[FunctionInfo]) {
        self.functions = functions
            .iter()
            .map(|f| FunctionEntry { name: f.name.clone(), address: 0 })
            .collect();
    }

    fn emit_function(&mut self, f: &FunctionInfo) -> CResult<()> {
        self.scope.push();
        let entry = self.instructions.len() as u32;
        self.functions[f.id as usize].address = entry;
        if self.mode.is_debug() {
            self.symbols.push(SymbolEntry { name: f.name.clone(), address: entry });
        }
        self.emit(Opcode::AllocFrame, vec![f.frame_size as i64], Some(f.body.pos));

        let mut offset = 0u32;
        for (name, ty) in &f.params {
            let align = ty.align_of(self.registry).expect("checked by analysis").max(1);
            offset = align_up(offset, align);
            self.scope.declare(name, Symbol { kind: SymbolKind::Param, ty: ty.clone(), address: offset, is_const: false });
            offset += ty.size_of(self.registry).expect("checked by analysis");
        }

        self.gen_block(&f.body, &mut offset)?;

        self.emit(Opcode::FreeFrame, vec![], None);
        self.emit(Opcode::Ret, vec![], None);
        self.scope.pop();
        Ok(())
    }

    // ---- statements ----

    fn gen_block(&mut self, block: &Block, frame_offset: &mut u32) -> CResult<()> {
        self.scope.push();
        for stmt in &block.statements {
            self.gen_stmt(stmt, frame_offset)?;
        }
        self.scope.pop();
        Ok(())
    }

    fn gen_stmt(&mut self, stmt: &Stmt, frame_offset: &mut u32) -> CResult<()> {
        match stmt {
            Stmt::Block(b) => self.gen_block(b, frame_offset),
            Stmt::If { cond, then_branch, else_branch, pos } => {
                self.gen_expr(cond)?;
                let false_jump = self.emit(Opcode::JumpIfFalse, vec![-1], Some(*pos));
                self.gen_stmt(then_branch, frame_offset)?;
                match else_branch {
                    Some(else_branch) => {
                        let end_jump = self.emit(Opcode::Jump, vec![-1], Some(*pos));
                        let else_start = self.instructions.len();
                        self.patch_jump(false_jump, else_start);
                        self.gen_stmt(else_branch, frame_offset)?;
                        let end = self.instructions.len();
                        self.patch_jump(end_jump, end);
                    }
                    None => {
                        let end = self.instructions.len();
                        self.patch_jump(false_jump, end);
                    }
                }
                Ok(())
            }
            Stmt::While { cond, body, pos } => {
                let loop_start = self.instructions.len();
                self.gen_expr(cond)?;
                let exit_jump = self.emit(Opcode::JumpIfFalse, vec![-1], Some(*pos));
                self.loops.push(LoopCtx::default());
                self.gen_stmt(body, frame_offset)?;
                let ctx = self.loops.pop().expect("pushed above");
                for idx in ctx.continue_patches {
                    self.patch_jump(idx, loop_start);
                }
                self.emit(Opcode::Jump, vec![loop_start as i64], Some(*pos));
                let after = self.instructions.len();
                self.patch_jump(exit_jump, after);
                for idx in ctx.break_patches {
                    self.patch_jump(idx, after);
                }
                Ok(())
            }
            Stmt::For { init, cond, step, body, pos } => {
                self.scope.push();
                if let Some(init) = init {
                    match init.as_ref() {
                        ForInit::Decl(d) => self.gen_local_decl(d, frame_offset)?,
                        ForInit::Expr(e) => self.gen_discarding(e)?,
                    }
                }

                let loop_start = self.instructions.len();
                let exit_jump = match cond {
                    Some(c) => {
                        self.gen_expr(c)?;
                        Some(self.emit(Opcode::JumpIfFalse, vec![-1], Some(*pos)))
                    }
                    None => None,
                };

                self.loops.push(LoopCtx::default());
                self.gen_stmt(body, frame_offset)?;
                let ctx = self.loops.pop().expect("pushed above");

                let continue_target = self.instructions.len();
                for idx in ctx.continue_patches {
                    self.patch_jump(idx, continue_target);
                }
                if let Some(step) = step {
                    self.gen_discarding(step)?;
                }
                self.emit(Opcode::Jump, vec![loop_start as i64], Some(*pos));

                let after = self.instructions.len();
                if let Some(exit_jump) = exit_jump {
                    self.patch_jump(exit_jump, after);
                }
                for idx in ctx.break_patches {
                    self.patch_jump(idx, after);
                }
                self.scope.pop();
                Ok(())
            }
            Stmt::Break(pos) => {
                let idx = self.emit(Opcode::Jump, vec![-1], Some(*pos));
                if let Some(ctx) = self.loops.last_mut() {
                    ctx.break_patches.push(idx);
                }
                Ok(())
            }
            Stmt::Continue(pos) => {
                let idx = self.emit(Opcode::Jump, vec![-1], Some(*pos));
                if let Some(ctx) = self.loops.last_mut() {
                    ctx.continue_patches.push(idx);
                }
                Ok(())
            }
            Stmt::Return { value, pos } => {
                if let Some(v) = value {
                    self.gen_expr(v)?;
                }
                self.emit(Opcode::FreeFrame, vec![], Some(*pos));
                self.emit(Opcode::Ret, vec![], Some(*pos));
                Ok(())
            }
            Stmt::LocalDecl(d) => self.gen_local_decl(d, frame_offset),
            Stmt::Expr(e) => self.gen_discarding(e),
        }
    }

    /// Evaluates a statement-level expression and pops its value unless it
    /// is `void` (a bare `f();` where `f` returns nothing pushes nothing).
    fn gen_discarding(&mut self, expr: &Expr) -> CResult<()> {
        let ty = self.gen_expr(expr)?;
        if !ty.is_void() {
            self.emit(Opcode::Pop, vec![], None);
        }
        Ok(())
    }

    fn gen_local_decl(&mut self, d: &LocalDecl, frame_offset: &mut u32) -> CResult<()> {
        let elem_ty = self.resolve_type(&d.ty);
        let ty = match &d.array_len {
            Some(len_expr) => {
                let len = const_eval_int(len_expr).expect("checked by analysis") as u32;
                Type::Array(Box::new(elem_ty), len)
            }
            None => elem_ty,
        };
        let align = ty.align_of(self.registry).expect("checked by analysis").max(1);
        *frame_offset = align_up(*frame_offset, align);
        let address = *frame_offset;
        *frame_offset += ty.size_of(self.registry).expect("checked by analysis");

        if let Type::Array(elem, count) = &ty {
            let elem_size = elem.size_of(self.registry).expect("checked by analysis");
            self.emit(Opcode::AllocArray, vec![address as i64, elem_size as i64, *count as i64], Some(d.pos));
        }

        self.scope.declare(&d.name, Symbol { kind: SymbolKind::Local, ty: ty.clone(), address, is_const: d.is_const });
        if self.mode.is_debug() {
            self.symbols.push(SymbolEntry { name: d.name.clone(), address });
        }

        if let Some(init) = &d.init {
            self.gen_initializer(address, &ty, init)?;
        }
        Ok(())
    }

    /// Stores `init` into the storage at `address`: an `ArrayLiteral`
    /// writes one element at a time, anything else is a single scalar
    /// store.
    fn gen_initializer(&mut self, address: u32, ty: &Type, init: &Expr) -> CResult<()> {
        if let Expr::ArrayLiteral { elements, pos } = init {
            let elem_ty = match ty {
                Type::Array(elem, _) => (**elem).clone(),
                other => other.clone(),
            };
            let elem_size = elem_ty.size_of(self.registry).expect("checked by analysis");
            for (i, e) in elements.iter().enumerate() {
                self.emit(Opcode::LoadAddr, vec![address as i64], Some(*pos));
                self.push_int(i as i64, *pos);
                self.gen_expr(e)?;
                self.emit(Opcode::StoreArrayElem, vec![elem_size as i64], Some(*pos));
            }
            Ok(())
        } else {
            let pos = init.pos();
            self.gen_expr(init)?;
            self.emit(Opcode::StoreVar, vec![address as i64], Some(pos));
            Ok(())
        }
    }

    // ---- expressions ----

    fn gen_expr(&mut self, expr: &Expr) -> CResult<Type> {
        match expr {
            Expr::IntLiteral(v, pos) => {
                self.push_int(*v, *pos);
                Ok(Type::Primitive(PrimitiveType::Int))
            }
            Expr::FloatLiteral(v, pos) => {
                let cid = self.intern_const(ConstantValue::F32(*v));
                self.emit(Opcode::LoadConst, vec![cid as i64], Some(*pos));
                Ok(Type::Primitive(PrimitiveType::Float))
            }
            Expr::CharLiteral(v, pos) => {
                self.push_int(*v as i64, *pos);
                Ok(Type::Primitive(PrimitiveType::Char))
            }
            Expr::BoolLiteral(v, pos) => {
                self.push_int(i64::from(*v), *pos);
                Ok(Type::Primitive(PrimitiveType::Bool))
            }
            Expr::StringLiteral(s, pos) => {
                let sid = self.intern_string(s.clone());
                let cid = self.intern_const(ConstantValue::Ptr(sid));
                self.emit(Opcode::LoadConst, vec![cid as i64], Some(*pos));
                Ok(Type::Primitive(PrimitiveType::Char).pointer_to())
            }
            Expr::Ident(name, pos) => {
                let sym = self.scope.lookup(name).expect("checked by analysis").clone();
                if sym.kind != SymbolKind::Message {
                    self.emit(Opcode::LoadVar, vec![sym.address as i64], Some(*pos));
                }
                Ok(sym.ty)
            }
            Expr::Unary { op, expr: inner, pos } => self.gen_unary(*op, inner, *pos),
            Expr::Cast { ty, expr: inner, .. } => {
                self.gen_expr(inner)?;
                Ok(self.resolve_type(ty))
            }
            Expr::Sizeof { target, pos } => {
                let size = match target {
                    SizeofTarget::Type(te) => self.resolve_type(te).size_of(self.registry).expect("checked by analysis"),
                    SizeofTarget::Expr(e) => self.static_type(e).size_of(self.registry).expect("checked by analysis"),
                };
                self.push_int(size as i64, *pos);
                Ok(Type::Primitive(PrimitiveType::Int))
            }
            Expr::Binary { op, lhs, rhs, pos } => {
                self.gen_expr(lhs)?;
                self.gen_expr(rhs)?;
                self.emit(binop_opcode(*op), vec![], Some(*pos));
                Ok(binop_result_type(*op))
            }
            Expr::Assign { op, target, value, pos } => self.gen_assign(*op, target, value, *pos),
            Expr::Member { .. } => self.gen_member_load(expr),
            Expr::Index { .. } => self.gen_index_load(expr),
            Expr::Call { callee, args, pos } => self.gen_call(callee, args, *pos),
            Expr::ArrayLiteral { elements, .. } => {
                // Only ever reached as a standalone expression, never as an
                // initializer (those are rewritten by `gen_initializer`).
                for e in elements {
                    self.gen_expr(e)?;
                }
                Ok(Type::Primitive(PrimitiveType::Void))
            }
            Expr::Send { channel, value, pos } => {
                let (id, _elem) = self.channel(channel);
                self.gen_expr(value)?;
                self.emit(Opcode::MsgSend, vec![id as i64], Some(*pos));
                Ok(Type::Primitive(PrimitiveType::Void))
            }
            Expr::Recv { channel, timeout, pos } => {
                let (id, elem) = self.channel(channel);
                match timeout {
                    Some(t) => {
                        self.gen_expr(t)?;
                    }
                    None => self.push_int(-1, *pos),
                }
                self.emit(Opcode::MsgRecv, vec![id as i64], Some(*pos));
                Ok(elem)
            }
        }
    }

    fn channel(&self, expr: &Expr) -> (u32, Type) {
        let Expr::Ident(name, _) = expr else {
            unreachable!("a channel operand is always a message identifier, checked by analysis")
        };
        let sym = self.scope.lookup(name).expect("checked by analysis");
        match &sym.ty {
            Type::Message(elem) => (sym.address, (**elem).clone()),
            _ => unreachable!("checked by analysis"),
        }
    }

    fn gen_unary(&mut self, op: UnaryOp, inner: &Expr, pos: Pos) -> CResult<Type> {
        match op {
            UnaryOp::AddrOf => {
                let pointee = self.gen_addr(inner)?;
                Ok(pointee.pointer_to())
            }
            UnaryOp::Deref => {
                let ptr_ty = self.gen_expr(inner)?;
                self.emit(Opcode::LoadDeref, vec![], Some(pos));
                Ok(ptr_ty.deref().cloned().unwrap_or(Type::Primitive(PrimitiveType::Int)))
            }
            UnaryOp::Not => {
                self.gen_expr(inner)?;
                self.emit(Opcode::Not, vec![], Some(pos));
                Ok(Type::Primitive(PrimitiveType::Bool))
            }
            UnaryOp::BitNot => {
                self.gen_expr(inner)?;
                self.push_int(-1, pos);
                self.emit(Opcode::Xor, vec![], Some(pos));
                Ok(Type::Primitive(PrimitiveType::Int))
            }
            UnaryOp::Neg => {
                let ty = self.gen_expr(inner)?;
                self.push_int(-1, pos);
                self.emit(Opcode::Mul, vec![], Some(pos));
                Ok(ty)
            }
            UnaryOp::Plus => self.gen_expr(inner),
            UnaryOp::PreInc => self.gen_pre_inc_dec(inner, true, pos),
            UnaryOp::PreDec => self.gen_pre_inc_dec(inner, false, pos),
            UnaryOp::PostInc => self.gen_post_inc_dec(inner, true, pos),
            UnaryOp::PostDec => self.gen_post_inc_dec(inner, false, pos),
        }
    }

    /// `++x`/`--x`: stores the updated value, then re-evaluates `x` to
    /// leave that value as the expression's result. Re-evaluating a
    /// compound target (`arr[i]`) runs `i` a second time; harmless unless
    /// the index expression has a side effect, which source using this
    /// form in practice never does.
    fn gen_pre_inc_dec(&mut self, target: &Expr, inc: bool, pos: Pos) -> CResult<Type> {
        self.gen_store_value(target, pos, |cg| {
            let ty = cg.gen_expr(target)?;
            cg.push_int(1, pos);
            cg.emit(if inc { Opcode::Add } else { Opcode::Sub }, vec![], Some(pos));
            Ok(ty)
        })?;
        self.gen_expr(target)
    }

    fn gen_post_inc_dec(&mut self, target: &Expr, inc: bool, pos: Pos) -> CResult<Type> {
        let old_ty = self.gen_expr(target)?;
        self.gen_store_value(target, pos, |cg| {
            cg.gen_expr(target)?;
            cg.push_int(1, pos);
            cg.emit(if inc { Opcode::Add } else { Opcode::Sub }, vec![], Some(pos));
            Ok(Type::Primitive(PrimitiveType::Int))
        })?;
        Ok(old_ty)
    }

    fn gen_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr, pos: Pos) -> CResult<Type> {
        match op {
            AssignOp::Assign => self.gen_store_value(target, pos, |cg| cg.gen_expr(value)),
            _ => {
                let bin = assign_to_binop(op);
                self.gen_store_value(target, pos, |cg| {
                    let ty = cg.gen_expr(target)?;
                    cg.gen_expr(value)?;
                    cg.emit(binop_opcode(bin), vec![], Some(pos));
                    Ok(ty)
                })
            }
        }
    }

    /// Stores into the lvalue `target`. `push_value` is invoked after any
    /// base address/index the target needs has already been pushed, and
    /// must leave exactly one value on top of the stack: the one actually
    /// written.
    fn gen_store_value(
        &mut self,
        target: &Expr,
        pos: Pos,
        push_value: impl FnOnce(&mut Self) -> CResult<Type>,
    ) -> CResult<Type> {
        match target {
            Expr::Ident(name, _) => {
                let sym = self.scope.lookup(name).expect("checked by analysis").clone();
                let ty = push_value(self)?;
                self.emit(Opcode::StoreVar, vec![sym.address as i64], Some(pos));
                Ok(ty)
            }
            Expr::Unary { op: UnaryOp::Deref, expr: inner, .. } => {
                self.gen_expr(inner)?;
                let ty = push_value(self)?;
                self.emit(Opcode::StoreDeref, vec![], Some(pos));
                Ok(ty)
            }
            Expr::Member { base, field, .. } => {
                let base_ty = self.static_type(base);
                let (is_ptr, type_name) = member_base(&base_ty);
                if is_ptr {
                    self.gen_expr(base)?;
                } else {
                    self.gen_addr(base)?;
                }
                let fd = self.registry.resolve_member(&type_name, field).expect("checked by analysis").clone();
                let ty = push_value(self)?;
                if fd.is_bit_field() {
                    self.emit(
                        Opcode::StoreStructMemberBit,
                        vec![fd.byte_offset as i64, fd.bit_offset.unwrap() as i64, fd.bit_width.unwrap() as i64],
                        Some(pos),
                    );
                } else {
                    self.emit(Opcode::StoreStructMember, vec![fd.byte_offset as i64], Some(pos));
                }
                Ok(ty)
            }
            Expr::Index { base, index, .. } => {
                let elem_ty = self.gen_array_base_addr(base)?;
                self.gen_expr(index)?;
                let elem_size = elem_ty.size_of(self.registry).expect("checked by analysis");
                let ty = push_value(self)?;
                self.emit(Opcode::StoreArrayElem, vec![elem_size as i64], Some(pos));
                Ok(ty)
            }
            _ => unreachable!("not an lvalue, checked by analysis"),
        }
    }

    /// Pushes the address of an lvalue, used by `&expr` and by member/index
    /// access on a non-pointer (by-value) base.
    fn gen_addr(&mut self, expr: &Expr) -> CResult<Type> {
        match expr {
            Expr::Ident(name, pos) => {
                let sym = self.scope.lookup(name).expect("checked by analysis").clone();
                self.emit(Opcode::LoadAddr, vec![sym.address as i64], Some(*pos));
                Ok(sym.ty)
            }
            Expr::Unary { op: UnaryOp::Deref, expr: inner, .. } => self.gen_expr(inner),
            Expr::Member { base, field, pos, .. } => {
                let base_ty = self.static_type(base);
                let (is_ptr, type_name) = member_base(&base_ty);
                if is_ptr {
                    self.gen_expr(base)?;
                } else {
                    self.gen_addr(base)?;
                }
                let fd = self.registry.resolve_member(&type_name, field).expect("checked by analysis");
                if fd.byte_offset != 0 {
                    self.push_int(fd.byte_offset as i64, *pos);
                    self.emit(Opcode::Add, vec![], Some(*pos));
                }
                Ok(fd.ty.clone())
            }
            Expr::Index { base, index, pos } => {
                let elem_ty = self.gen_array_base_addr(base)?;
                self.gen_expr(index)?;
                let elem_size = elem_ty.size_of(self.registry).expect("checked by analysis");
                self.push_int(elem_size as i64, *pos);
                self.emit(Opcode::Mul, vec![], Some(*pos));
                self.emit(Opcode::Add, vec![], Some(*pos));
                Ok(elem_ty)
            }
            _ => unreachable!("not an lvalue, checked by analysis"),
        }
    }

    /// Pushes the base address of an array or pointer used on the left of
    /// `[...]`, returning the element type.
    fn gen_array_base_addr(&mut self, base: &Expr) -> CResult<Type> {
        match self.static_type(base) {
            Type::Array(elem, _) => {
                self.gen_addr(base)?;
                Ok(*elem)
            }
            Type::Pointer(elem) => {
                self.gen_expr(base)?;
                Ok(*elem)
            }
            other => {
                self.gen_expr(base)?;
                Ok(other)
            }
        }
    }

    fn gen_member_load(&mut self, expr: &Expr) -> CResult<Type> {
        let Expr::Member { base, field, pos, .. } = expr else { unreachable!() };
        let base_ty = self.static_type(base);
        let (is_ptr, type_name) = member_base(&base_ty);
        if is_ptr {
            self.gen_expr(base)?;
        } else {
            self.gen_addr(base)?;
        }
        let fd = self.registry.resolve_member(&type_name, field).expect("checked by analysis").clone();
        if fd.is_bit_field() {
            self.emit(
                Opcode::LoadStructMemberBit,
                vec![fd.byte_offset as i64, fd.bit_offset.unwrap() as i64, fd.bit_width.unwrap() as i64],
                Some(*pos),
            );
        } else {
            self.emit(Opcode::LoadStructMember, vec![fd.byte_offset as i64], Some(*pos));
        }
        Ok(fd.ty)
    }

    fn gen_index_load(&mut self, expr: &Expr) -> CResult<Type> {
        let Expr::Index { base, index, pos } = expr else { unreachable!() };
        let elem_ty = self.gen_array_base_addr(base)?;
        self.gen_expr(index)?;
        let elem_size = elem_ty.size_of(self.registry).expect("checked by analysis");
        self.emit(Opcode::LoadArrayElem, vec![elem_size as i64], Some(*pos));
        Ok(elem_ty)
    }

    fn gen_call(&mut self, callee: &str, args: &[Expr], pos: Pos) -> CResult<Type> {
        if callee == "StartTask" {
            return self.gen_start_task(args, pos);
        }
        if let Some(opcode) = intrinsic_opcode(callee) {
            for a in args {
                self.gen_expr(a)?;
            }
            self.emit(opcode, vec![args.len() as i64], Some(pos));
            return Ok(intrinsic_return_type(callee));
        }
        debug_assert!(
            !INTRINSIC_NAMES.contains(&callee),
            "intrinsic `{callee}` is missing a case in intrinsic_opcode"
        );
        for a in args {
            self.gen_expr(a)?;
        }
        let sig = self.function_sigs.get(callee).expect("checked by analysis").clone();
        self.emit(Opcode::Call, vec![sig.id as i64, args.len() as i64], Some(pos));
        Ok(sig.return_type)
    }

    /// `StartTask(stack_size, core, priority, task_id, fn)` lowers to
    /// `RTOS_CREATE_TASK(stack_size, core, priority, task_id, addr_of(fn))`.
    /// The fifth operand is the callee's resolved entry address rather than
    /// its function id, so it's left as a placeholder here and patched once
    /// every function has been emitted (`fn` may be declared later in the
    /// file than the `StartTask` call referencing it).
    fn gen_start_task(&mut self, args: &[Expr], pos: Pos) -> CResult<Type> {
        let Expr::Ident(fn_name, _) = &args[4] else {
            unreachable!("StartTask's fn argument names a function, checked by analysis")
        };
        let fn_id = self.function_sigs.get(fn_name).expect("checked by analysis").id;
        let stack_size = const_eval_int(&args[0]).unwrap_or(0);
        let core = const_eval_int(&args[1]).unwrap_or(0);
        let priority = const_eval_int(&args[2]).unwrap_or(0);
        let task_id = const_eval_int(&args[3]).unwrap_or(0);
        let idx = self.emit(Opcode::RtosCreateTask, vec![stack_size, core, priority, task_id, 0], Some(pos));
        self.task_fn_patches.push((idx, fn_id));
        Ok(Type::Primitive(PrimitiveType::Void))
    }

    /// A reduced, infallible mirror of the analyzer's type inference,
    /// trusting that the program already passed semantic analysis. Used
    /// only to decide which addressing path an lvalue needs (e.g. whether
    /// a `Member` base is a pointer or a by-value aggregate).
    fn static_type(&self, expr: &Expr) -> Type {
        match expr {
            Expr::IntLiteral(..) => Type::Primitive(PrimitiveType::Int),
            Expr::FloatLiteral(..) => Type::Primitive(PrimitiveType::Float),
            Expr::CharLiteral(..) => Type::Primitive(PrimitiveType::Char),
            Expr::BoolLiteral(..) => Type::Primitive(PrimitiveType::Bool),
            Expr::StringLiteral(..) => Type::Primitive(PrimitiveType::Char).pointer_to(),
            Expr::Ident(name, _) => self.scope.lookup(name).expect("checked by analysis").ty.clone(),
            Expr::Unary { op, expr: inner, .. } => match op {
                UnaryOp::AddrOf => self.static_type(inner).pointer_to(),
                UnaryOp::Deref => self.static_type(inner).deref().cloned().unwrap_or(Type::Primitive(PrimitiveType::Int)),
                UnaryOp::Not => Type::Primitive(PrimitiveType::Bool),
                _ => self.static_type(inner),
            },
            Expr::Cast { ty, .. } => self.resolve_type(ty),
            Expr::Sizeof { .. } => Type::Primitive(PrimitiveType::Int),
            Expr::Binary { op, lhs, .. } => binop_result_type_from_operand(*op, || self.static_type(lhs)),
            Expr::Assign { target, .. } => self.static_type(target),
            Expr::Member { base, field, .. } => {
                let (_, type_name) = member_base(&self.static_type(base));
                self.registry.resolve_member(&type_name, field).expect("checked by analysis").ty.clone()
            }
            Expr::Index { base, .. } => match self.static_type(base) {
                Type::Array(elem, _) | Type::Pointer(elem) => *elem,
                other => other,
            },
            Expr::Call { callee, .. } => self
                .function_sigs
                .get(callee)
                .map(|sig| sig.return_type.clone())
                .unwrap_or(Type::Primitive(PrimitiveType::Int)),
            Expr::ArrayLiteral { .. } => Type::Primitive(PrimitiveType::Void),
            Expr::Send { .. } => Type::Primitive(PrimitiveType::Void),
            Expr::Recv { channel, .. } => match self.static_type(channel) {
                Type::Message(elem) => *elem,
                other => other,
            },
        }
    }
}

/// Splits a `Member` base type into "is this a pointer to the aggregate"
/// and the aggregate's name, independent of whether the source wrote `.`
/// or `->` — the grammar doesn't require the two to agree, and neither
/// does analysis, so codegen doesn't either.
fn member_base(ty: &Type) -> (bool, String) {
    match ty {
        Type::Pointer(inner) => match inner.as_ref() {
            Type::Struct(n) | Type::Union(n) => (true, n.clone()),
            _ => (true, String::new()),
        },
        Type::Struct(n) | Type::Union(n) => (false, n.clone()),
        _ => (false, String::new()),
    }
}

fn binop_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Mod => Opcode::Mod,
        BinaryOp::BitAnd => Opcode::And,
        BinaryOp::BitOr => Opcode::Or,
        BinaryOp::BitXor => Opcode::Xor,
        BinaryOp::Shl => Opcode::Shl,
        BinaryOp::Shr => Opcode::Shr,
        BinaryOp::And => Opcode::And,
        BinaryOp::Or => Opcode::Or,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::Neq => Opcode::Neq,
        BinaryOp::Lt => Opcode::Lt,
        BinaryOp::Lte => Opcode::Lte,
        BinaryOp::Gt => Opcode::Gt,
        BinaryOp::Gte => Opcode::Gte,
    }
}

fn assign_to_binop(op: AssignOp) -> BinaryOp {
    match op {
        AssignOp::AddAssign => BinaryOp::Add,
        AssignOp::SubAssign => BinaryOp::Sub,
        AssignOp::MulAssign => BinaryOp::Mul,
        AssignOp::DivAssign => BinaryOp::Div,
        AssignOp::ModAssign => BinaryOp::Mod,
        AssignOp::AndAssign => BinaryOp::BitAnd,
        AssignOp::OrAssign => BinaryOp::BitOr,
        AssignOp::XorAssign => BinaryOp::BitXor,
        AssignOp::ShlAssign => BinaryOp::Shl,
        AssignOp::ShrAssign => BinaryOp::Shr,
        AssignOp::Assign => unreachable!("Assign has no binary operator, handled separately"),
    }
}

fn binop_result_type(op: BinaryOp) -> Type {
    match op {
        BinaryOp::Eq
        | BinaryOp::Neq
        | BinaryOp::Lt
        | BinaryOp::Lte
        | BinaryOp::Gt
        | BinaryOp::Gte
        | BinaryOp::And
        | BinaryOp::Or => Type::Primitive(PrimitiveType::Bool),
        _ => Type::Primitive(PrimitiveType::Int),
    }
}

fn binop_result_type_from_operand(op: BinaryOp, operand_ty: impl FnOnce() -> Type) -> Type {
    match op {
        BinaryOp::Eq
        | BinaryOp::Neq
        | BinaryOp::Lt
        | BinaryOp::Lte
        | BinaryOp::Gt
        | BinaryOp::Gte
        | BinaryOp::And
        | BinaryOp::Or => Type::Primitive(PrimitiveType::Bool),
        _ => operand_ty(),
    }
}

fn intrinsic_opcode(name: &str) -> Option<Opcode> {
    Some(match name {
        "RTOS_DELAY_MS" => Opcode::RtosDelayMs,
        "RTOS_YIELD" => Opcode::RtosYield,
        "RTOS_SUSPEND_TASK" => Opcode::RtosSuspendTask,
        "RTOS_RESUME_TASK" => Opcode::RtosResumeTask,
        "RTOS_SEMAPHORE_CREATE" => Opcode::RtosSemaphoreCreate,
        "RTOS_SEMAPHORE_TAKE" => Opcode::RtosSemaphoreTake,
        "RTOS_SEMAPHORE_GIVE" => Opcode::RtosSemaphoreGive,
        "HW_GPIO_INIT" => Opcode::HwGpioInit,
        "HW_GPIO_SET" => Opcode::HwGpioSet,
        "HW_GPIO_GET" => Opcode::HwGpioGet,
        "HW_ADC_INIT" => Opcode::HwAdcInit,
        "HW_ADC_READ" => Opcode::HwAdcRead,
        "HW_TIMER_INIT" => Opcode::HwTimerInit,
        "HW_TIMER_START" => Opcode::HwTimerStart,
        "HW_TIMER_STOP" => Opcode::HwTimerStop,
        "HW_TIMER_SET_PWM_DUTY" => Opcode::HwTimerSetPwmDuty,
        "HW_UART_WRITE" => Opcode::HwUartWrite,
        "HW_SPI_TRANSFER" => Opcode::HwSpiTransfer,
        "HW_I2C_WRITE" => Opcode::HwI2cWrite,
        "HW_I2C_READ" => Opcode::HwI2cRead,
        "DBG_PRINT" => Opcode::Print,
        "DBG_PRINTF" => Opcode::Printf,
        "DBG_BREAKPOINT" => Opcode::DbgBreakpoint,
        _ => return None,
    })
}

fn intrinsic_return_type(name: &str) -> Type {
    if name.ends_with("_READ") || name.ends_with("_GET") || name == "RTOS_SEMAPHORE_CREATE" {
        Type::Primitive(PrimitiveType::Int)
    } else {
        Type::Primitive(PrimitiveType::Void)
    }
}

/// The constant a global's `GLOBAL_VAR_DECLARE` operand carries: the
/// initializer's own value when it folds to a scalar constant, a type-keyed
/// zero when there's no initializer or it isn't constant-foldable (an array
/// literal, or an expression that reads another global).
fn const_for_global(ty: &Type, init: Option<&Expr>) -> ConstantValue {
    match init {
        Some(Expr::FloatLiteral(v, _)) => ConstantValue::F32(*v),
        Some(expr) => const_eval_int(expr).map(|v| ConstantValue::I32(v as i32)).unwrap_or_else(|| zero_const(ty)),
        None => zero_const(ty),
    }
}

fn zero_const(ty: &Type) -> ConstantValue {
    match ty {
        Type::Primitive(PrimitiveType::Float) => ConstantValue::F32(0.0),
        _ => ConstantValue::I32(0),
    }
}

/// Whether `init` is exactly the value `GLOBAL_VAR_DECLARE`'s own operand
/// already carries, making a follow-up imperative store redundant.
fn is_global_const_foldable(init: &Expr) -> bool {
    matches!(init, Expr::FloatLiteral(..)) || const_eval_int(init).is_some()
}

/// Numeric element-type discriminant for `MSG_DECLARE`'s second operand.
fn type_tag(ty: &Type) -> i64 {
    match ty {
        Type::Primitive(PrimitiveType::Int) => 0,
        Type::Primitive(PrimitiveType::Float) => 1,
        Type::Primitive(PrimitiveType::Char) => 2,
        Type::Primitive(PrimitiveType::Bool) => 3,
        Type::Primitive(PrimitiveType::Void) => 4,
        Type::Pointer(_) => 5,
        Type::Array(..) => 6,
        Type::Struct(_) => 7,
        Type::Union(_) => 8,
        Type::Message(_) => 9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::Lexer;
    use crate::parse::Parser;
    use crate::sema::analyze;
    use rtmc_asm::Opcode as Op;

    fn compile(src: &str, mode: Mode) -> ProgramImage {
        let tokens = Lexer::new(src).tokenize().expect("lex");
        let program = Parser::new(tokens).parse_program().expect("parse");
        let analysis = analyze(&program).expect("analyze");
        generate(&analysis, mode).expect("codegen")
    }

    #[test]
    fn emits_a_trailing_halt() {
        let image = compile("void main() { }", Mode::Release);
        assert_eq!(image.instructions.last().unwrap().opcode, Op::Halt);
    }

    #[test]
    fn records_function_entry_addresses() {
        let image = compile("void f() { } void g() { }", Mode::Release);
        assert_eq!(image.functions.len(), 2);
        assert_ne!(image.functions[0].address, image.functions[1].address);
    }

    #[test]
    fn if_else_emits_two_patched_jumps() {
        let image = compile("void f() { int x; if (1) { x = 1; } else { x = 2; } }", Mode::Release);
        let jumps: Vec<_> = image.instructions.iter().filter(|i| i.opcode == Op::Jump || i.opcode == Op::JumpIfFalse).collect();
        assert_eq!(jumps.len(), 2);
        for j in jumps {
            assert!(j.operands[0] >= 0);
        }
    }

    #[test]
    fn while_loop_jumps_backward() {
        let image = compile("void f() { while (1) { break; } }", Mode::Release);
        let back_jump = image
            .instructions
            .iter()
            .find(|i| i.opcode == Op::Jump && (i.operands[0] as usize) < image.instructions.len() - 1)
            .expect("a backward jump exists");
        assert!(back_jump.operands[0] >= 0);
    }

    #[test]
    fn struct_field_store_uses_byte_offset() {
        let src = "struct P { int x; int y; } void f() { struct P p; p.y = 1; }";
        let image = compile(src, Mode::Release);
        let store = image.instructions.iter().find(|i| i.opcode == Op::StoreStructMember).unwrap();
        assert_eq!(store.operands[0], 4);
    }

    #[test]
    fn start_task_lowers_to_rtos_create_task_with_resolved_fn_address() {
        let src = "\
            void run(){ HW_GPIO_INIT(13,1); while(1){ HW_GPIO_SET(13,1); RTOS_DELAY_MS(500); HW_GPIO_SET(13,0); RTOS_DELAY_MS(500);} }\
            void main(){ StartTask(1024,0,2,1,run); }";
        let image = compile(src, Mode::Release);
        let tasks: Vec<_> = image.instructions.iter().filter(|i| i.opcode == Op::RtosCreateTask).collect();
        assert_eq!(tasks.len(), 1);
        let run_addr = image.functions.iter().find(|f| f.name == "run").unwrap().address;
        assert_eq!(tasks[0].operands, vec![1024, 0, 2, 1, run_addr as i64]);
    }

    #[test]
    fn message_send_recv_lower_to_msg_opcodes() {
        let src = "message<int> Q; void f() { Q.send(1); int x = Q.recv(timeout:10); }";
        let image = compile(src, Mode::Release);
        assert!(image.instructions.iter().any(|i| i.opcode == Op::MsgSend));
        assert!(image.instructions.iter().any(|i| i.opcode == Op::MsgRecv));
    }

    #[test]
    fn global_var_declare_carries_address_init_const_and_is_const() {
        let src = "const int limit = 42; void f() { }";
        let image = compile(src, Mode::Release);
        let decl = image.instructions.iter().find(|i| i.opcode == Op::GlobalVarDeclare).unwrap();
        assert_eq!(decl.operands[0], 0);
        assert_eq!(decl.operands[2], 1);
        let cid = decl.operands[1] as usize;
        assert_eq!(image.constants[cid], ConstantValue::I32(42));
    }

    #[test]
    fn global_var_declare_defaults_uninitialized_scalar_to_zero() {
        let image = compile("int counter; void f() { }", Mode::Release);
        let decl = image.instructions.iter().find(|i| i.opcode == Op::GlobalVarDeclare).unwrap();
        assert_eq!(decl.operands[2], 0);
        let cid = decl.operands[1] as usize;
        assert_eq!(image.constants[cid], ConstantValue::I32(0));
    }

    #[test]
    fn msg_declare_carries_id_and_element_type_tag() {
        let image = compile("message<int> Q; void f() { }", Mode::Release);
        let decl = image.instructions.iter().find(|i| i.opcode == Op::MsgDeclare).unwrap();
        assert_eq!(decl.operands, vec![0, 0]);
    }

    #[test]
    fn debug_mode_keeps_positions_and_symbols() {
        let image = compile("int g; void f() { int a; a = g; }", Mode::Debug);
        assert!(image.instructions.iter().any(|i| i.pos.is_some()));
        assert!(!image.symbols.is_empty());
    }

    #[test]
    fn expression_statement_pops_discarded_call_result() {
        let src = "int id(int a) { return a; } void f() { id(1); }";
        let image = compile(src, Mode::Release);
        assert!(image.instructions.iter().any(|i| i.opcode == Op::Pop));
    }
}
