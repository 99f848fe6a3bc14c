use crate::ast::*;

/// Folds a constant-foldable expression tree into a single integer value,
/// or returns `None` if any leaf is not itself a compile-time constant.
/// Shared by bit-field width/array-size validation and the optional
/// constant-folding optimizer pass.
pub(crate) fn const_eval_int(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::IntLiteral(v, _) => Some(*v),
        Expr::BoolLiteral(b, _) => Some(if *b { 1 } else { 0 }),
        Expr::CharLiteral(c, _) => Some(*c as i64),
        Expr::Unary { op, expr, .. } => {
            let v = const_eval_int(expr)?;
            Some(match op {
                UnaryOp::Neg => -v,
                UnaryOp::Plus => v,
                UnaryOp::BitNot => !v,
                UnaryOp::Not => i64::from(v == 0),
                _ => return None,
            })
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let l = const_eval_int(lhs)?;
            let r = const_eval_int(rhs)?;
            Some(match op {
                BinaryOp::Add => l.wrapping_add(r),
                BinaryOp::Sub => l.wrapping_sub(r),
                BinaryOp::Mul => l.wrapping_mul(r),
                BinaryOp::Div if r != 0 => l / r,
                BinaryOp::Mod if r != 0 => l % r,
                BinaryOp::BitAnd => l & r,
                BinaryOp::BitOr => l | r,
                BinaryOp::BitXor => l ^ r,
                BinaryOp::Shl => l << r,
                BinaryOp::Shr => l >> r,
                BinaryOp::Eq => i64::from(l == r),
                BinaryOp::Neq => i64::from(l != r),
                BinaryOp::Lt => i64::from(l < r),
                BinaryOp::Lte => i64::from(l <= r),
                BinaryOp::Gt => i64::from(l > r),
                BinaryOp::Gte => i64::from(l >= r),
                BinaryOp::And => i64::from(l != 0 && r != 0),
                BinaryOp::Or => i64::from(l != 0 || r != 0),
                _ => return None,
            })
        }
        _ => None,
    }
}

/// True for expressions that cannot have a side effect, and so are safe to
/// drop when an algebraic identity makes them redundant.
fn is_pure(expr: &Expr) -> bool {
    match expr {
        Expr::IntLiteral(..)
        | Expr::FloatLiteral(..)
        | Expr::CharLiteral(..)
        | Expr::StringLiteral(..)
        | Expr::BoolLiteral(..)
        | Expr::Ident(..) => true,
        Expr::Unary { expr, .. } => is_pure(expr),
        Expr::Binary { lhs, rhs, .. } => is_pure(lhs) && is_pure(rhs),
        Expr::Cast { expr, .. } => is_pure(expr),
        Expr::Sizeof { .. } => true,
        _ => false,
    }
}

/// Folds arithmetic/bitwise/comparison operators on constant operands,
/// applies a handful of algebraic identities (`x+0`, `x*1`, `x&0`, ...)
/// when both sides are pure, and eliminates `if` branches whose condition
/// folds to a constant. Runs only when `CompilerConfig::optimize` is set;
/// the unoptimized tree is always valid input to codegen on its own.
pub fn optimize_program(program: Program) -> Program {
    Program {
        decls: program.decls.into_iter().map(optimize_decl).collect(),
    }
}

fn optimize_decl(decl: Decl) -> Decl {
    match decl {
        Decl::Function(mut f) => {
            f.body = optimize_block(f.body);
            Decl::Function(f)
        }
        Decl::Global(mut g) => {
            g.init = g.init.map(|e| Box::new(optimize_expr(*e)));
            Decl::Global(g)
        }
        other => other,
    }
}

fn optimize_block(block: Block) -> Block {
    Block {
        statements: block.statements.into_iter().map(optimize_stmt).collect(),
        pos: block.pos,
    }
}

fn optimize_stmt(stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::Block(b) => Stmt::Block(optimize_block(b)),
        Stmt::If { cond, then_branch, else_branch, pos } => {
            let cond = optimize_expr(cond);
            let then_branch = Box::new(optimize_stmt(*then_branch));
            let else_branch = else_branch.map(|e| Box::new(optimize_stmt(*e)));
            match const_eval_int(&cond) {
                Some(v) if v != 0 => *then_branch,
                Some(_) => match else_branch {
                    Some(e) => *e,
                    None => Stmt::Block(Block { statements: vec![], pos }),
                },
                None => Stmt::If { cond, then_branch, else_branch, pos },
            }
        }
        Stmt::While { cond, body, pos } => Stmt::While {
            cond: optimize_expr(cond),
            body: Box::new(optimize_stmt(*body)),
            pos,
        },
        Stmt::For { init, cond, step, body, pos } => Stmt::For {
            init: init.map(|i| {
                Box::new(match *i {
                    ForInit::Decl(mut d) => {
                        d.init = d.init.map(|e| Box::new(optimize_expr(*e)));
                        ForInit::Decl(d)
                    }
                    ForInit::Expr(e) => ForInit::Expr(optimize_expr(e)),
                })
            }),
            cond: cond.map(optimize_expr),
            step: step.map(optimize_expr),
            body: Box::new(optimize_stmt(*body)),
            pos,
        },
        Stmt::Return { value, pos } => Stmt::Return { value: value.map(optimize_expr), pos },
        Stmt::LocalDecl(mut d) => {
            d.init = d.init.map(|e| Box::new(optimize_expr(*e)));
            Stmt::LocalDecl(d)
        }
        Stmt::Expr(e) => Stmt::Expr(optimize_expr(e)),
        other @ (Stmt::Break(_) | Stmt::Continue(_)) => other,
    }
}

fn optimize_expr(expr: Expr) -> Expr {
    match expr {
        Expr::Unary { op, expr, pos } => {
            let expr = Box::new(optimize_expr(*expr));
            let folded = Expr::Unary { op, expr, pos };
            if let Some(v) = const_eval_int(&folded) {
                Expr::IntLiteral(v, pos)
            } else {
                folded
            }
        }
        Expr::Binary { op, lhs, rhs, pos } => {
            let lhs = Box::new(optimize_expr(*lhs));
            let rhs = Box::new(optimize_expr(*rhs));

            if let (true, true) = (is_pure(&lhs), is_pure(&rhs)) {
                if let Some(identity) = algebraic_identity(op, &lhs, &rhs, pos) {
                    return identity;
                }
            }

            let folded = Expr::Binary { op, lhs, rhs, pos };
            if let Some(v) = const_eval_int(&folded) {
                Expr::IntLiteral(v, pos)
            } else {
                folded
            }
        }
        Expr::Cast { ty, expr, pos } => Expr::Cast { ty, expr: Box::new(optimize_expr(*expr)), pos },
        Expr::Assign { op, target, value, pos } => Expr::Assign {
            op,
            target: Box::new(optimize_expr(*target)),
            value: Box::new(optimize_expr(*value)),
            pos,
        },
        Expr::Member { base, field, arrow, pos } => {
            Expr::Member { base: Box::new(optimize_expr(*base)), field, arrow, pos }
        }
        Expr::Index { base, index, pos } => Expr::Index {
            base: Box::new(optimize_expr(*base)),
            index: Box::new(optimize_expr(*index)),
            pos,
        },
        Expr::Call { callee, args, pos } => Expr::Call {
            callee,
            args: args.into_iter().map(optimize_expr).collect(),
            pos,
        },
        Expr::ArrayLiteral { elements, pos } => Expr::ArrayLiteral {
            elements: elements.into_iter().map(optimize_expr).collect(),
            pos,
        },
        Expr::Send { channel, value, pos } => Expr::Send {
            channel: Box::new(optimize_expr(*channel)),
            value: Box::new(optimize_expr(*value)),
            pos,
        },
        Expr::Recv { channel, timeout, pos } => Expr::Recv {
            channel: Box::new(optimize_expr(*channel)),
            timeout: timeout.map(|t| Box::new(optimize_expr(*t))),
            pos,
        },
        other => other,
    }
}

fn algebraic_identity(op: BinaryOp, lhs: &Expr, rhs: &Expr, pos: Pos) -> Option<Expr> {
    let zero = |e: &Expr| matches!(const_eval_int(e), Some(0));
    let one = |e: &Expr| matches!(const_eval_int(e), Some(1));

    match op {
        BinaryOp::Add if zero(rhs) => Some(lhs.clone()),
        BinaryOp::Add if zero(lhs) => Some(rhs.clone()),
        BinaryOp::Sub if zero(rhs) => Some(lhs.clone()),
        BinaryOp::Mul if one(rhs) => Some(lhs.clone()),
        BinaryOp::Mul if one(lhs) => Some(rhs.clone()),
        BinaryOp::Mul if zero(rhs) || zero(lhs) => Some(Expr::IntLiteral(0, pos)),
        BinaryOp::BitAnd if zero(rhs) || zero(lhs) => Some(Expr::IntLiteral(0, pos)),
        BinaryOp::BitOr if zero(rhs) => Some(lhs.clone()),
        BinaryOp::BitOr if zero(lhs) => Some(rhs.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p() -> Pos {
        Pos::new(1, 1)
    }

    #[test]
    fn folds_arithmetic_constants() {
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Expr::IntLiteral(2, p())),
            rhs: Box::new(Expr::Binary {
                op: BinaryOp::Mul,
                lhs: Box::new(Expr::IntLiteral(3, p())),
                rhs: Box::new(Expr::IntLiteral(4, p())),
                pos: p(),
            }),
            pos: p(),
        };
        assert_eq!(optimize_expr(expr), Expr::IntLiteral(14, p()));
    }

    #[test]
    fn eliminates_dead_if_branch() {
        let stmt = Stmt::If {
            cond: Expr::BoolLiteral(false, p()),
            then_branch: Box::new(Stmt::Expr(Expr::IntLiteral(1, p()))),
            else_branch: Some(Box::new(Stmt::Expr(Expr::IntLiteral(2, p())))),
            pos: p(),
        };
        assert_eq!(optimize_stmt(stmt), Stmt::Expr(Expr::IntLiteral(2, p())));
    }

    #[test]
    fn applies_additive_identity() {
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Expr::Ident("x".to_string(), p())),
            rhs: Box::new(Expr::IntLiteral(0, p())),
            pos: p(),
        };
        assert_eq!(optimize_expr(expr), Expr::Ident("x".to_string(), p()));
    }
}
