#![forbid(unsafe_code)]

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

use crate::array::ArrayRef;

/// Bit-vector width of an expression. Width 1 is boolean.
pub type Width = u32;

pub const BOOL: Width = 1;
pub const INT8: Width = 8;
pub const INT16: Width = 16;
pub const INT32: Width = 32;
pub const INT64: Width = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,

    And,
    Or,
    Xor,

    Shl,
    LShr,
    AShr,
}

impl BinOp {
    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "Add",
            BinOp::Sub => "Sub",
            BinOp::Mul => "Mul",
            BinOp::UDiv => "UDiv",
            BinOp::SDiv => "SDiv",
            BinOp::URem => "URem",
            BinOp::SRem => "SRem",
            BinOp::And => "And",
            BinOp::Or => "Or",
            BinOp::Xor => "Xor",
            BinOp::Shl => "Shl",
            BinOp::LShr => "LShr",
            BinOp::AShr => "AShr",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ult,
    Ule,
    Slt,
    Sle,
}

impl CmpOp {
    pub fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "Eq",
            CmpOp::Ult => "Ult",
            CmpOp::Ule => "Ule",
            CmpOp::Slt => "Slt",
            CmpOp::Sle => "Sle",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Constant(u64),

    /// Byte read from a symbolic array.
    Read { array: ArrayRef, index: ExprRef },

    /// `left` holds the most significant bits.
    Concat(ExprRef, ExprRef),

    Extract { expr: ExprRef, offset: Width },

    ZExt(ExprRef),
    SExt(ExprRef),

    Not(ExprRef),

    Binary(BinOp, ExprRef, ExprRef),

    /// Comparisons always have width 1.
    Cmp(CmpOp, ExprRef, ExprRef),
}

/// Immutable expression node.
///
/// Nodes are shared through [`ExprRef`]; equality is structural and the structural hash is
/// computed once at construction.
#[derive(Debug, PartialEq, Eq)]
pub struct Expr {
    kind: ExprKind,
    width: Width,
    hash: u64,
}

#[derive(Clone)]
pub struct ExprRef(Rc<Expr>);

impl Deref for ExprRef {
    type Target = Expr;

    fn deref(&self) -> &Expr {
        &self.0
    }
}

impl PartialEq for ExprRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || (self.0.hash == other.0.hash && *self.0 == *other.0)
    }
}

impl Eq for ExprRef {}

impl Hash for ExprRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl fmt::Debug for ExprRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

pub fn width_mask(width: Width) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Interpret the low `width` bits of `value` as a two's complement integer.
pub fn sign_extend_to_i64(value: u64, width: Width) -> i64 {
    if width >= 64 {
        return value as i64;
    }
    let shift = 64 - width;
    ((value << shift) as i64) >> shift
}

/// Concrete semantics of a binary operator on `width`-bit operands.
///
/// Division and remainder by zero follow SMT-LIB: `udiv x 0` is all ones, `urem x 0` is `x`.
/// Shift amounts at or above the width shift every bit out.
pub fn eval_binary(op: BinOp, a: u64, b: u64, width: Width) -> u64 {
    let mask = width_mask(width);
    let (a, b) = (a & mask, b & mask);
    let sa = sign_extend_to_i64(a, width);
    let sb = sign_extend_to_i64(b, width);
    let v = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::UDiv => {
            if b == 0 {
                mask
            } else {
                a / b
            }
        }
        BinOp::SDiv => {
            if b == 0 {
                if sa < 0 { 1 } else { mask }
            } else {
                sa.wrapping_div(sb) as u64
            }
        }
        BinOp::URem => {
            if b == 0 {
                a
            } else {
                a % b
            }
        }
        BinOp::SRem => {
            if b == 0 {
                a
            } else {
                sa.wrapping_rem(sb) as u64
            }
        }
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => {
            if b >= width as u64 {
                0
            } else {
                a << b
            }
        }
        BinOp::LShr => {
            if b >= width as u64 {
                0
            } else {
                a >> b
            }
        }
        BinOp::AShr => {
            if b >= width as u64 {
                if sa < 0 { mask } else { 0 }
            } else {
                (sa >> b) as u64
            }
        }
    };
    v & mask
}

pub fn eval_cmp(op: CmpOp, a: u64, b: u64, width: Width) -> bool {
    let mask = width_mask(width);
    let (a, b) = (a & mask, b & mask);
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ult => a < b,
        CmpOp::Ule => a <= b,
        CmpOp::Slt => sign_extend_to_i64(a, width) < sign_extend_to_i64(b, width),
        CmpOp::Sle => sign_extend_to_i64(a, width) <= sign_extend_to_i64(b, width),
    }
}

impl Expr {
    fn alloc(kind: ExprKind, width: Width) -> ExprRef {
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        width.hash(&mut hasher);
        ExprRef(Rc::new(Expr {
            kind,
            width,
            hash: hasher.finish(),
        }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn width(&self) -> Width {
        self.width
    }

    /// Structural hash; equal expressions always share it.
    pub fn structural_hash(&self) -> u64 {
        self.hash
    }

    pub fn as_constant(&self) -> Option<u64> {
        match self.kind {
            ExprKind::Constant(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(_))
    }

    pub fn is_true(&self) -> bool {
        self.width == BOOL && self.as_constant() == Some(1)
    }

    pub fn is_false(&self) -> bool {
        self.width == BOOL && self.as_constant() == Some(0)
    }

    /// Direct sub-expressions, left to right. Array indices count as kids.
    pub fn kids(&self) -> Vec<&ExprRef> {
        match &self.kind {
            ExprKind::Constant(_) => Vec::new(),
            ExprKind::Read { index, .. } => vec![index],
            ExprKind::Concat(l, r) | ExprKind::Binary(_, l, r) | ExprKind::Cmp(_, l, r) => {
                vec![l, r]
            }
            ExprKind::Extract { expr, .. } => vec![expr],
            ExprKind::ZExt(e) | ExprKind::SExt(e) | ExprKind::Not(e) => vec![e],
        }
    }

    pub fn kid(&self, i: usize) -> Option<&ExprRef> {
        self.kids().get(i).copied()
    }

    pub fn constant(value: u64, width: Width) -> ExprRef {
        assert!(
            (1..=64).contains(&width),
            "unsupported constant width {width}"
        );
        Self::alloc(ExprKind::Constant(value & width_mask(width)), width)
    }

    pub fn bool(value: bool) -> ExprRef {
        Self::constant(value as u64, BOOL)
    }

    pub fn zero(width: Width) -> ExprRef {
        Self::constant(0, width)
    }

    pub fn read(array: &ArrayRef, index: ExprRef) -> ExprRef {
        assert_eq!(
            index.width(),
            array.domain,
            "read index width does not match the domain of `{}`",
            array.name
        );
        Self::alloc(
            ExprKind::Read {
                array: array.clone(),
                index,
            },
            array.range,
        )
    }

    pub fn concat(left: ExprRef, right: ExprRef) -> ExprRef {
        let width = left.width() + right.width();
        assert!(width <= 64, "concat wider than 64 bits");
        if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
            return Self::constant((l << right.width()) | r, width);
        }
        Self::alloc(ExprKind::Concat(left, right), width)
    }

    pub fn extract(expr: ExprRef, offset: Width, width: Width) -> ExprRef {
        assert!(
            offset + width <= expr.width(),
            "extract of {width} bits at {offset} out of a {}-bit expression",
            expr.width()
        );
        if offset == 0 && width == expr.width() {
            return expr;
        }
        if let Some(v) = expr.as_constant() {
            return Self::constant(v >> offset, width);
        }
        Self::alloc(ExprKind::Extract { expr, offset }, width)
    }

    /// Zero-extend to `width`. A narrower target extracts the low bits instead.
    pub fn zext(expr: ExprRef, width: Width) -> ExprRef {
        if width == expr.width() {
            return expr;
        }
        if width < expr.width() {
            return Self::extract(expr, 0, width);
        }
        if let Some(v) = expr.as_constant() {
            return Self::constant(v, width);
        }
        Self::alloc(ExprKind::ZExt(expr), width)
    }

    /// Sign-extend to `width`. A narrower target extracts the low bits instead.
    pub fn sext(expr: ExprRef, width: Width) -> ExprRef {
        if width == expr.width() {
            return expr;
        }
        if width < expr.width() {
            return Self::extract(expr, 0, width);
        }
        if let Some(v) = expr.as_constant() {
            return Self::constant(sign_extend_to_i64(v, expr.width()) as u64, width);
        }
        Self::alloc(ExprKind::SExt(expr), width)
    }

    pub fn not(expr: ExprRef) -> ExprRef {
        let width = expr.width();
        if let Some(v) = expr.as_constant() {
            return Self::constant(!v, width);
        }
        if let ExprKind::Not(inner) = expr.kind() {
            return inner.clone();
        }
        Self::alloc(ExprKind::Not(expr), width)
    }

    pub fn binary(op: BinOp, left: ExprRef, right: ExprRef) -> ExprRef {
        assert_eq!(
            left.width(),
            right.width(),
            "{} operands of different widths",
            op.name()
        );
        let width = left.width();
        if let (Some(a), Some(b)) = (left.as_constant(), right.as_constant()) {
            return Self::constant(eval_binary(op, a, b, width), width);
        }
        Self::alloc(ExprKind::Binary(op, left, right), width)
    }

    pub fn cmp(op: CmpOp, left: ExprRef, right: ExprRef) -> ExprRef {
        assert_eq!(
            left.width(),
            right.width(),
            "{} operands of different widths",
            op.name()
        );
        if let (Some(a), Some(b)) = (left.as_constant(), right.as_constant()) {
            return Self::bool(eval_cmp(op, a, b, left.width()));
        }
        Self::alloc(ExprKind::Cmp(op, left, right), BOOL)
    }

    pub fn add(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::binary(BinOp::Add, l, r)
    }

    pub fn sub(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::binary(BinOp::Sub, l, r)
    }

    pub fn mul(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::binary(BinOp::Mul, l, r)
    }

    pub fn udiv(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::binary(BinOp::UDiv, l, r)
    }

    pub fn sdiv(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::binary(BinOp::SDiv, l, r)
    }

    pub fn shl(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::binary(BinOp::Shl, l, r)
    }

    pub fn and(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::binary(BinOp::And, l, r)
    }

    pub fn or(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::binary(BinOp::Or, l, r)
    }

    pub fn eq(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::cmp(CmpOp::Eq, l, r)
    }

    pub fn ne(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::not(Self::eq(l, r))
    }

    pub fn ult(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::cmp(CmpOp::Ult, l, r)
    }

    pub fn ule(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::cmp(CmpOp::Ule, l, r)
    }

    pub fn ugt(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::cmp(CmpOp::Ult, r, l)
    }

    pub fn uge(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::cmp(CmpOp::Ule, r, l)
    }

    pub fn slt(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::cmp(CmpOp::Slt, l, r)
    }

    pub fn sle(l: ExprRef, r: ExprRef) -> ExprRef {
        Self::cmp(CmpOp::Sle, l, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array;

    #[test]
    fn constants_fold_through_arithmetic() {
        let e = Expr::add(Expr::constant(250, INT8), Expr::constant(10, INT8));
        assert_eq!(e.as_constant(), Some(4));
        assert_eq!(e.width(), INT8);

        let d = Expr::udiv(Expr::constant(7, INT32), Expr::zero(INT32));
        assert_eq!(d.as_constant(), Some(u32::MAX as u64));
    }

    #[test]
    fn structural_equality_ignores_allocation() {
        let arr = Array::new("x", 4);
        let a = Expr::read(&arr, Expr::constant(0, INT32));
        let b = Expr::read(&arr, Expr::constant(0, INT32));
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());
        assert_ne!(a, Expr::read(&arr, Expr::constant(1, INT32)));
    }

    #[test]
    fn shifts_past_width_produce_zero() {
        assert_eq!(eval_binary(BinOp::Shl, 2, 32, INT32), 0);
        assert_eq!(eval_binary(BinOp::LShr, u32::MAX as u64, 40, INT32), 0);
        assert_eq!(eval_binary(BinOp::AShr, 0x8000_0000, 33, INT32), u32::MAX as u64);
        assert_eq!(eval_binary(BinOp::Shl, 2, 31, INT32), 0);
        assert_eq!(eval_binary(BinOp::Shl, 1, 31, INT32), 0x8000_0000);
    }

    #[test]
    fn signed_division_by_zero_follows_smtlib() {
        assert_eq!(eval_binary(BinOp::SDiv, 0xFF, 0, INT8), 1);
        assert_eq!(eval_binary(BinOp::SDiv, 5, 0, INT8), 0xFF);
        assert_eq!(eval_binary(BinOp::SDiv, 0xFA, 2, INT8), 0xFD);
    }

    #[test]
    fn zext_to_narrower_width_extracts() {
        let arr = Array::new("y", 4);
        let r = Expr::read(&arr, Expr::constant(0, INT32));
        let wide = Expr::zext(r.clone(), INT32);
        assert_eq!(wide.width(), INT32);
        assert!(matches!(wide.kind(), ExprKind::ZExt(_)));
        assert_eq!(Expr::zext(r.clone(), INT8), r);
        let narrowed = Expr::zext(wide, INT8);
        assert!(matches!(narrowed.kind(), ExprKind::Extract { offset: 0, .. }));
        assert_eq!(Expr::sext(Expr::constant(0x80, INT8), INT16).as_constant(), Some(0xFF80));
    }

    #[test]
    fn double_negation_collapses() {
        let arr = Array::new("z", 1);
        let c = Expr::eq(Expr::read(&arr, Expr::constant(0, INT32)), Expr::zero(INT8));
        assert_eq!(Expr::not(Expr::not(c.clone())), c);
        assert!(Expr::not(Expr::bool(true)).is_false());
    }
}
