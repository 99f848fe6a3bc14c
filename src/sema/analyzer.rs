use std::collections::HashMap;

use rtmc_asm::INTRINSIC_NAMES;
use rtmc_types::{
    align_up, FieldSpec, PrimitiveType, RawLayout, StructKind, Type, TypeRegistry,
};

use crate::ast::*;
use crate::error::SemaError;
use crate::sema::optimize::const_eval_int;
use crate::sema::symbol::{ScopeStack, Symbol, SymbolKind};

/// A fully analyzed function: its signature plus a frame size the codegen
/// pass can use to size its `ALLOC_FRAME` without re-deriving it.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub id: u32,
    pub name: String,
    pub return_type: Type,
    pub params: Vec<(String, Type)>,
    pub frame_size: u32,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct GlobalInfo {
    pub name: String,
    pub ty: Type,
    pub address: u32,
    pub is_const: bool,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct MessageInfo {
    pub id: u32,
    pub name: String,
    pub element_type: Type,
}

/// Everything the bytecode generator needs: resolved types, assigned
/// addresses/ids, and the (still-unlowered) function bodies to walk.
#[derive(Debug)]
pub struct Analysis {
    pub registry: TypeRegistry,
    pub globals: Vec<GlobalInfo>,
    pub functions: Vec<FunctionInfo>,
    pub messages: Vec<MessageInfo>,
}

struct FuncSig {
    id: u32,
    return_type: Type,
    params: Vec<Type>,
}

pub fn analyze(program: &Program) -> Result<Analysis, SemaError> {
    let mut az = Analyzer::new();
    az.register_types(program)?;
    az.register_functions_and_messages(program)?;
    let globals = az.analyze_globals(program)?;
    let functions = az.analyze_functions(program)?;
    Ok(Analysis {
        registry: az.registry,
        globals,
        functions,
        messages: az.messages,
    })
}

/// Three-phase walk over the program: (1) struct/union layouts, so every
/// named type is sized before anything else runs; (2) function and message
/// signatures, so forward calls and channel references resolve; (3) bodies,
/// checked and assigned frame slots in declaration order.
///
/// `decl_kind` exists because `TypeRegistry` itself only knows a name is
/// declared, not whether it is a struct or a union, until after
/// `resolve_all` — the analyzer needs that distinction earlier, to turn a
/// bare `TypeExpr::Named` into `Type::Struct` or `Type::Union` while still
/// building the raw layouts to stage.
struct Analyzer {
    registry: TypeRegistry,
    decl_kind: HashMap<String, StructKind>,
    scope: ScopeStack,
    functions: HashMap<String, FuncSig>,
    messages: Vec<MessageInfo>,
    next_global_addr: u32,
    next_func_id: u32,
    next_msg_id: u32,
}

impl Analyzer {
    fn new() -> Self {
        Self {
            registry: TypeRegistry::new(),
            decl_kind: HashMap::new(),
            scope: ScopeStack::new(),
            functions: HashMap::new(),
            messages: Vec::new(),
            next_global_addr: 0,
            next_func_id: 0,
            next_msg_id: 0,
        }
    }

    fn register_types(&mut self, program: &Program) -> Result<(), SemaError> {
        for decl in &program.decls {
            match decl {
                Decl::Struct(agg) => {
                    if let Some(name) = &agg.name {
                        self.registry.declare_placeholder(name);
                        self.decl_kind.insert(name.clone(), StructKind::Struct);
                    }
                }
                Decl::Union(agg) => {
                    if let Some(name) = &agg.name {
                        self.registry.declare_placeholder(name);
                        self.decl_kind.insert(name.clone(), StructKind::Union);
                    }
                }
                _ => {}
            }
        }

        for decl in &program.decls {
            let agg = match decl {
                Decl::Struct(agg) | Decl::Union(agg) => agg,
                _ => continue,
            };
            if let Some(name) = &agg.name {
                let raw = self.raw_layout(agg)?;
                self.registry.stage(name, raw);
            }
        }

        self.registry.resolve_all()?;
        Ok(())
    }

    fn raw_layout(&self, agg: &AggregateDecl) -> Result<RawLayout, SemaError> {
        let mut fields = Vec::new();
        for member in &agg.members {
            match member {
                AggregateMember::Field(f) => {
                    let ty = self.resolve_type_expr(&f.ty)?;
                    let bit_width = match &f.bit_width {
                        Some(e) => Some(
                            const_eval_int(e)
                                .ok_or(SemaError::ArraySizeNotConstant(f.pos))? as u32,
                        ),
                        None => None,
                    };
                    fields.push(FieldSpec::Plain { name: f.name.clone(), ty, bit_width });
                }
                AggregateMember::Anonymous(nested) => {
                    fields.push(FieldSpec::Anonymous(self.raw_layout(nested)?));
                }
            }
        }
        let kind = if agg.is_union { StructKind::Union } else { StructKind::Struct };
        Ok(RawLayout { kind, fields })
    }

    fn resolve_type_expr(&self, te: &TypeExpr) -> Result<Type, SemaError> {
        match te {
            TypeExpr::Primitive(p) => Ok(Type::Primitive(*p)),
            TypeExpr::Pointer(inner) => Ok(Type::Pointer(Box::new(self.resolve_type_expr(inner)?))),
            TypeExpr::Named(name) => match self.decl_kind.get(name) {
                Some(StructKind::Struct) => Ok(Type::Struct(name.clone())),
                Some(StructKind::Union) => Ok(Type::Union(name.clone())),
                None => Err(SemaError::Layout(rtmc_types::LayoutError::UnknownType(name.clone()))),
            },
        }
    }

    fn register_functions_and_messages(&mut self, program: &Program) -> Result<(), SemaError> {
        for decl in &program.decls {
            match decl {
                Decl::Function(f) => {
                    let return_type = self.resolve_type_expr(&f.return_type)?;
                    let mut params = Vec::new();
                    for p in &f.params {
                        params.push(self.resolve_type_expr(&p.ty)?);
                    }
                    let id = self.next_func_id;
                    self.next_func_id += 1;
                    if self.functions.contains_key(&f.name) {
                        return Err(SemaError::DuplicateDefinition(f.pos, f.name.clone()));
                    }
                    self.functions.insert(f.name.clone(), FuncSig { id, return_type, params });
                }
                Decl::Message(m) => {
                    let elem = self.resolve_type_expr(&m.element_type)?;
                    let id = self.next_msg_id;
                    self.next_msg_id += 1;
                    let sym = Symbol {
                        kind: SymbolKind::Message,
                        ty: Type::Message(Box::new(elem.clone())),
                        address: id,
                        is_const: true,
                    };
                    if !self.scope.declare(&m.name, sym) {
                        return Err(SemaError::DuplicateDefinition(m.pos, m.name.clone()));
                    }
                    self.messages.push(MessageInfo { id, name: m.name.clone(), element_type: elem });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn analyze_globals(&mut self, program: &Program) -> Result<Vec<GlobalInfo>, SemaError> {
        let mut globals = Vec::new();
        for decl in &program.decls {
            let g = match decl {
                Decl::Global(g) => g,
                _ => continue,
            };
            let mut ty = self.resolve_type_expr(&g.ty)?;
            if let Some(len_expr) = &g.array_len {
                let len = const_eval_int(len_expr).ok_or(SemaError::ArraySizeNotConstant(g.pos))?;
                ty = Type::Array(Box::new(ty), len as u32);
            }
            if let Some(init) = &g.init {
                let init_ty = self.infer_expr(init)?;
                self.check_assignable(&ty, &init_ty, g.pos)?;
            }
            let size = ty.size_of(&self.registry)?;
            let align = ty.align_of(&self.registry)?;
            let addr = align_up(self.next_global_addr, align.max(1));
            self.next_global_addr = addr + size;

            let sym = Symbol { kind: SymbolKind::Global, ty: ty.clone(), address: addr, is_const: g.is_const };
            if !self.scope.declare(&g.name, sym) {
                return Err(SemaError::DuplicateDefinition(g.pos, g.name.clone()));
            }
            globals.push(GlobalInfo {
                name: g.name.clone(),
                ty,
                address: addr,
                is_const: g.is_const,
                init: g.init.as_ref().map(|b| (**b).clone()),
            });
        }
        Ok(globals)
    }

    fn analyze_functions(&mut self, program: &Program) -> Result<Vec<FunctionInfo>, SemaError> {
        let mut out = Vec::new();
        for decl in &program.decls {
            let f = match decl {
                Decl::Function(f) => f,
                _ => continue,
            };
            self.scope.push();
            let mut frame_offset: u32 = 0;
            let mut params = Vec::new();
            for p in &f.params {
                let ty = self.resolve_type_expr(&p.ty)?;
                let size = ty.size_of(&self.registry)?;
                let align = ty.align_of(&self.registry)?;
                frame_offset = align_up(frame_offset, align.max(1));
                let sym = Symbol { kind: SymbolKind::Param, ty: ty.clone(), address: frame_offset, is_const: false };
                if !self.scope.declare(&p.name, sym) {
                    return Err(SemaError::DuplicateDefinition(p.pos, p.name.clone()));
                }
                frame_offset += size;
                params.push((p.name.clone(), ty));
            }

            let return_type = self.resolve_type_expr(&f.return_type)?;
            self.analyze_block(&f.body, &mut frame_offset, &return_type)?;
            self.scope.pop();

            let sig = &self.functions[&f.name];
            out.push(FunctionInfo {
                id: sig.id,
                name: f.name.clone(),
                return_type,
                params,
                frame_size: frame_offset,
                body: f.body.clone(),
            });
        }
        Ok(out)
    }

    fn analyze_block(&mut self, block: &Block, frame_offset: &mut u32, return_type: &Type) -> Result<(), SemaError> {
        self.scope.push();
        for stmt in &block.statements {
            self.analyze_stmt(stmt, frame_offset, return_type)?;
        }
        self.scope.pop();
        Ok(())
    }

    fn analyze_stmt(&mut self, stmt: &Stmt, frame_offset: &mut u32, return_type: &Type) -> Result<(), SemaError> {
        match stmt {
            Stmt::Block(b) => self.analyze_block(b, frame_offset, return_type),
            Stmt::If { cond, then_branch, else_branch, .. } => {
                let t = self.infer_expr(cond)?;
                self.check_condition_type(&t, cond.pos())?;
                self.analyze_stmt(then_branch, frame_offset, return_type)?;
                if let Some(e) = else_branch {
                    self.analyze_stmt(e, frame_offset, return_type)?;
                }
                Ok(())
            }
            Stmt::While { cond, body, .. } => {
                let t = self.infer_expr(cond)?;
                self.check_condition_type(&t, cond.pos())?;
                self.analyze_stmt(body, frame_offset, return_type)
            }
            Stmt::For { init, cond, step, body, .. } => {
                self.scope.push();
                if let Some(init) = init {
                    match init.as_ref() {
                        ForInit::Decl(d) => self.analyze_local_decl(d, frame_offset)?,
                        ForInit::Expr(e) => {
                            self.infer_expr(e)?;
                        }
                    }
                }
                if let Some(c) = cond {
                    let t = self.infer_expr(c)?;
                    self.check_condition_type(&t, c.pos())?;
                }
                if let Some(s) = step {
                    self.infer_expr(s)?;
                }
                self.analyze_stmt(body, frame_offset, return_type)?;
                self.scope.pop();
                Ok(())
            }
            Stmt::Break(_) | Stmt::Continue(_) => Ok(()),
            Stmt::Return { value, pos } => {
                if let Some(v) = value {
                    let t = self.infer_expr(v)?;
                    self.check_assignable(return_type, &t, *pos)?;
                }
                Ok(())
            }
            Stmt::LocalDecl(d) => self.analyze_local_decl(d, frame_offset),
            Stmt::Expr(e) => {
                self.infer_expr(e)?;
                Ok(())
            }
        }
    }

    fn analyze_local_decl(&mut self, d: &LocalDecl, frame_offset: &mut u32) -> Result<(), SemaError> {
        let mut ty = self.resolve_type_expr(&d.ty)?;
        if let Some(len_expr) = &d.array_len {
            let len = const_eval_int(len_expr).ok_or(SemaError::ArraySizeNotConstant(d.pos))?;
            ty = Type::Array(Box::new(ty), len as u32);
        }
        if let Some(init) = &d.init {
            let init_ty = self.infer_expr(init)?;
            self.check_assignable(&ty, &init_ty, d.pos)?;
        }
        let size = ty.size_of(&self.registry)?;
        let align = ty.align_of(&self.registry)?;
        *frame_offset = align_up(*frame_offset, align.max(1));
        let addr = *frame_offset;
        *frame_offset += size;

        let sym = Symbol { kind: SymbolKind::Local, ty, address: addr, is_const: d.is_const };
        if !self.scope.declare(&d.name, sym) {
            return Err(SemaError::DuplicateDefinition(d.pos, d.name.clone()));
        }
        Ok(())
    }

    fn infer_expr(&self, expr: &Expr) -> Result<Type, SemaError> {
        match expr {
            Expr::IntLiteral(..) => Ok(Type::Primitive(PrimitiveType::Int)),
            Expr::FloatLiteral(..) => Ok(Type::Primitive(PrimitiveType::Float)),
            Expr::CharLiteral(..) => Ok(Type::Primitive(PrimitiveType::Char)),
            Expr::BoolLiteral(..) => Ok(Type::Primitive(PrimitiveType::Bool)),
            Expr::StringLiteral(..) => Ok(Type::Pointer(Box::new(Type::Primitive(PrimitiveType::Char)))),
            Expr::Ident(name, pos) => self
                .scope
                .lookup(name)
                .map(|s| s.ty.clone())
                .ok_or_else(|| SemaError::UndefinedSymbol(*pos, name.clone())),
            Expr::Unary { op, expr, pos } => {
                let t = self.infer_expr(expr)?;
                match op {
                    UnaryOp::AddrOf => Ok(Type::Pointer(Box::new(t))),
                    UnaryOp::Deref => t.deref().cloned().ok_or_else(|| SemaError::TypeMismatch {
                        pos: *pos,
                        expected: "pointer".to_string(),
                        found: t.to_string(),
                    }),
                    UnaryOp::Not => Ok(Type::Primitive(PrimitiveType::Bool)),
                    _ => Ok(t),
                }
            }
            Expr::Cast { ty, expr, .. } => {
                self.infer_expr(expr)?;
                self.resolve_type_expr(ty)
            }
            Expr::Sizeof { .. } => Ok(Type::Primitive(PrimitiveType::Int)),
            Expr::Binary { op, lhs, rhs, pos } => {
                let l = self.infer_expr(lhs)?;
                let r = self.infer_expr(rhs)?;
                match op {
                    BinaryOp::And
                    | BinaryOp::Or
                    | BinaryOp::Eq
                    | BinaryOp::Neq
                    | BinaryOp::Lt
                    | BinaryOp::Lte
                    | BinaryOp::Gt
                    | BinaryOp::Gte => Ok(Type::Primitive(PrimitiveType::Bool)),
                    _ => {
                        if l.is_numeric() && r.is_numeric() {
                            if l == Type::Primitive(PrimitiveType::Float) || r == Type::Primitive(PrimitiveType::Float) {
                                Ok(Type::Primitive(PrimitiveType::Float))
                            } else {
                                Ok(Type::Primitive(PrimitiveType::Int))
                            }
                        } else if l.is_pointer() {
                            Ok(l)
                        } else if r.is_pointer() {
                            Ok(r)
                        } else {
                            Err(SemaError::TypeMismatch {
                                pos: *pos,
                                expected: "numeric operands".to_string(),
                                found: format!("{l} and {r}"),
                            })
                        }
                    }
                }
            }
            Expr::Assign { op, target, value, pos } => {
                self.check_lvalue(target)?;
                if let Expr::Ident(name, _) = target.as_ref() {
                    if let Some(sym) = self.scope.lookup(name) {
                        if sym.is_const {
                            return Err(SemaError::ConstAssignment(*pos, name.clone()));
                        }
                    }
                }
                let t = self.infer_expr(target)?;
                let v = self.infer_expr(value)?;
                let _ = op;
                self.check_assignable(&t, &v, *pos)?;
                Ok(t)
            }
            Expr::Member { base, field, pos, .. } => {
                let bt = self.infer_expr(base)?;
                let type_name = match &bt {
                    Type::Struct(n) | Type::Union(n) => n.clone(),
                    Type::Pointer(inner) => match inner.as_ref() {
                        Type::Struct(n) | Type::Union(n) => n.clone(),
                        _ => {
                            return Err(SemaError::TypeMismatch {
                                pos: *pos,
                                expected: "struct or union".to_string(),
                                found: bt.to_string(),
                            })
                        }
                    },
                    _ => {
                        return Err(SemaError::TypeMismatch {
                            pos: *pos,
                            expected: "struct or union".to_string(),
                            found: bt.to_string(),
                        })
                    }
                };
                let fd = self
                    .registry
                    .resolve_member(&type_name, field)
                    .ok_or_else(|| SemaError::FieldNotFound(*pos, field.clone()))?;
                Ok(fd.ty.clone())
            }
            Expr::Index { base, index, pos } => {
                let bt = self.infer_expr(base)?;
                self.infer_expr(index)?;
                match bt {
                    Type::Array(elem, _) => Ok(*elem),
                    Type::Pointer(elem) => Ok(*elem),
                    _ => Err(SemaError::TypeMismatch {
                        pos: *pos,
                        expected: "array or pointer".to_string(),
                        found: bt.to_string(),
                    }),
                }
            }
            Expr::Call { callee, args, pos } if callee == "StartTask" => self.infer_start_task(args, *pos),
            Expr::Call { callee, args, pos } if INTRINSIC_NAMES.contains(&callee.as_str()) => {
                for a in args {
                    self.infer_expr(a)?;
                }
                Ok(intrinsic_return_type(callee))
            }
            Expr::Call { callee, args, pos } => {
                let sig = self
                    .functions
                    .get(callee)
                    .ok_or_else(|| SemaError::UndefinedSymbol(*pos, callee.clone()))?;
                if sig.params.len() != args.len() {
                    return Err(SemaError::ArityMismatch {
                        pos: *pos,
                        expected: sig.params.len(),
                        found: args.len(),
                    });
                }
                for a in args {
                    self.infer_expr(a)?;
                }
                Ok(sig.return_type.clone())
            }
            Expr::ArrayLiteral { elements, .. } => {
                if elements.is_empty() {
                    return Ok(Type::Array(Box::new(Type::Primitive(PrimitiveType::Int)), 0));
                }
                let elem_ty = self.infer_expr(&elements[0])?;
                for e in &elements[1..] {
                    self.infer_expr(e)?;
                }
                Ok(Type::Array(Box::new(elem_ty), elements.len() as u32))
            }
            Expr::Send { channel, value, pos } => {
                let ct = self.infer_expr(channel)?;
                let elem = match &ct {
                    Type::Message(e) => (**e).clone(),
                    _ => {
                        return Err(SemaError::TypeMismatch {
                            pos: *pos,
                            expected: "message channel".to_string(),
                            found: ct.to_string(),
                        })
                    }
                };
                let vt = self.infer_expr(value)?;
                self.check_assignable(&elem, &vt, *pos)?;
                Ok(Type::Primitive(PrimitiveType::Void))
            }
            Expr::Recv { channel, timeout, pos } => {
                let ct = self.infer_expr(channel)?;
                let elem = match &ct {
                    Type::Message(e) => (**e).clone(),
                    _ => {
                        return Err(SemaError::TypeMismatch {
                            pos: *pos,
                            expected: "message channel".to_string(),
                            found: ct.to_string(),
                        })
                    }
                };
                if let Some(t) = timeout {
                    let tt = self.infer_expr(t)?;
                    if !tt.is_numeric() {
                        return Err(SemaError::TypeMismatch {
                            pos: *pos,
                            expected: "integer timeout".to_string(),
                            found: tt.to_string(),
                        });
                    }
                }
                Ok(elem)
            }
        }
    }

    /// `StartTask(stack_size, core, priority, task_id, fn)`: the first four
    /// arguments must be numeric, and `fn` must name a declared function (by
    /// identifier, not a call or computed value).
    fn infer_start_task(&self, args: &[Expr], pos: Pos) -> Result<Type, SemaError> {
        if args.len() != 5 {
            return Err(SemaError::ArityMismatch { pos, expected: 5, found: args.len() });
        }
        for a in &args[..4] {
            let t = self.infer_expr(a)?;
            if !t.is_numeric() {
                return Err(SemaError::TypeMismatch {
                    pos: a.pos(),
                    expected: "numeric argument".to_string(),
                    found: t.to_string(),
                });
            }
        }
        match &args[4] {
            Expr::Ident(name, fn_pos) if self.functions.contains_key(name) => {
                let _ = fn_pos;
            }
            Expr::Ident(name, fn_pos) => {
                return Err(SemaError::UndefinedSymbol(*fn_pos, name.clone()));
            }
            other => {
                return Err(SemaError::TypeMismatch {
                    pos: other.pos(),
                    expected: "function name".to_string(),
                    found: "expression".to_string(),
                })
            }
        }
        Ok(Type::Primitive(PrimitiveType::Void))
    }

    fn check_lvalue(&self, expr: &Expr) -> Result<(), SemaError> {
        match expr {
            Expr::Ident(..) | Expr::Member { .. } | Expr::Index { .. } => Ok(()),
            Expr::Unary { op: UnaryOp::Deref, .. } => Ok(()),
            _ => Err(SemaError::NonLValueAssignment(expr.pos())),
        }
    }

    fn check_assignable(&self, target: &Type, value: &Type, pos: Pos) -> Result<(), SemaError> {
        if target == value {
            return Ok(());
        }
        if target.is_numeric() && value.is_numeric() {
            return Ok(());
        }
        if target.is_pointer() && value.is_pointer() {
            return Ok(());
        }
        Err(SemaError::TypeMismatch {
            pos,
            expected: target.to_string(),
            found: value.to_string(),
        })
    }

    /// `if`/`while`/`for` conditions accept any numeric, boolean, or pointer
    /// type; struct/union/message/array values are rejected.
    fn check_condition_type(&self, t: &Type, pos: Pos) -> Result<(), SemaError> {
        if t.is_numeric() || t.is_pointer() {
            return Ok(());
        }
        Err(SemaError::TypeMismatch {
            pos,
            expected: "numeric, boolean, or pointer condition".to_string(),
            found: t.to_string(),
        })
    }
}

/// Return type of a source-level RTOS/hardware/debug intrinsic. Read
/// operations return `int`; everything else (init/config/control calls)
/// returns `void`. Kept in lockstep with `codegen::intrinsic_return_type`.
fn intrinsic_return_type(name: &str) -> Type {
    if name.ends_with("_READ") || name.ends_with("_GET") || name == "RTOS_SEMAPHORE_CREATE" {
        Type::Primitive(PrimitiveType::Int)
    } else {
        Type::Primitive(PrimitiveType::Void)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::Lexer;
    use crate::parse::Parser;

    fn analyze_source(src: &str) -> Result<Analysis, SemaError> {
        let tokens = Lexer::new(src).tokenize().expect("lex");
        let program = Parser::new(tokens).parse_program().expect("parse");
        analyze(&program)
    }

    #[test]
    fn assigns_increasing_frame_slots_in_declaration_order() {
        let src = "void f() { int a; char b; int c; }";
        let analysis = analyze_source(src).unwrap();
        assert_eq!(analysis.functions.len(), 1);
        assert_eq!(analysis.functions[0].frame_size, 12);
    }

    #[test]
    fn undefined_symbol_is_reported() {
        let src = "void f() { int a; a = y; }";
        let err = analyze_source(src).unwrap_err();
        assert!(matches!(err, SemaError::UndefinedSymbol(_, name) if name == "y"));
    }

    #[test]
    fn reassigning_a_const_local_is_rejected() {
        let src = "void f() { const int a = 1; a = 2; }";
        let err = analyze_source(src).unwrap_err();
        assert!(matches!(err, SemaError::ConstAssignment(_, name) if name == "a"));
    }

    #[test]
    fn struct_member_access_resolves_through_layout() {
        let src = "struct Point { int x; int y; } int main() { struct Point p; p.x = 1; return 0; }";
        let analysis = analyze_source(src).unwrap();
        assert!(analysis.registry.layout("Point").is_ok());
    }

    #[test]
    fn duplicate_locals_in_the_same_block_are_rejected() {
        let src = "void f() { int a; int a; }";
        let err = analyze_source(src).unwrap_err();
        assert!(matches!(err, SemaError::DuplicateDefinition(_, name) if name == "a"));
    }

    #[test]
    fn shadowing_in_a_nested_block_is_allowed() {
        let src = "void f() { int a; { int a; } }";
        assert!(analyze_source(src).is_ok());
    }

    #[test]
    fn message_send_checks_element_type() {
        let src = "message<int> Q; void f() { Q.send(1); }";
        assert!(analyze_source(src).is_ok());
    }

    #[test]
    fn call_arity_mismatch_is_reported() {
        let src = "int add(int a, int b) { return a + b; } void f() { add(1); }";
        let err = analyze_source(src).unwrap_err();
        assert!(matches!(err, SemaError::ArityMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn struct_valued_if_condition_is_rejected() {
        let src = "struct Point { int x; int y; } void f() { struct Point p; if (p) {} }";
        let err = analyze_source(src).unwrap_err();
        assert!(matches!(err, SemaError::TypeMismatch { .. }));
    }

    #[test]
    fn pointer_valued_while_condition_is_accepted() {
        let src = "void f() { int a; int *p = &a; while (p) { break; } }";
        assert!(analyze_source(src).is_ok());
    }
}
