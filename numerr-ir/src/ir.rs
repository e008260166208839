#![forbid(unsafe_code)]

use std::fmt;

use serde::Deserialize;

use crate::debug::DebugLoc;

/// Identity of a program value (instruction result, argument, constant).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Opcode {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,

    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,

    ZExt,
    SExt,
    Trunc,

    Load,
    Store,
    Call,
    Phi,
    Select,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::UDiv => "udiv",
            Opcode::SDiv => "sdiv",
            Opcode::URem => "urem",
            Opcode::SRem => "srem",
            Opcode::Shl => "shl",
            Opcode::LShr => "lshr",
            Opcode::AShr => "ashr",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::ZExt => "zext",
            Opcode::SExt => "sext",
            Opcode::Trunc => "trunc",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Call => "call",
            Opcode::Phi => "phi",
            Opcode::Select => "select",
        }
    }

    pub fn is_cast(self) -> bool {
        matches!(self, Opcode::ZExt | Opcode::SExt | Opcode::Trunc)
    }
}

/// One executed instruction as seen by the error tracker.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub id: ValueId,
    pub opcode: Opcode,
    pub operands: Vec<ValueId>,
    pub loc: Option<DebugLoc>,
    /// Enclosing function, when known.
    pub function: Option<String>,
}

impl Instruction {
    pub fn new(id: ValueId, opcode: Opcode, operands: Vec<ValueId>) -> Self {
        Self {
            id,
            opcode,
            operands,
            loc: None,
            function: None,
        }
    }

    pub fn with_loc(mut self, loc: DebugLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    pub fn in_function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }

    pub fn operand(&self, i: usize) -> Option<ValueId> {
        self.operands.get(i).copied()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.id, self.opcode.name())?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{op}")?;
        }
        Ok(())
    }
}

#[derive(Default, Debug)]
pub struct IdGen {
    // One past the largest id in use; may reach 2^32.
    next_value: u64,
}

impl IdGen {
    /// `None` once every `u32` id has been handed out or reserved.
    pub fn fresh_value(&mut self) -> Option<ValueId> {
        let id = u32::try_from(self.next_value).ok()?;
        self.next_value += 1;
        Some(ValueId(id))
    }

    /// Make sure ids handed out later do not collide with `id`.
    pub fn reserve(&mut self, id: ValueId) {
        self.next_value = self.next_value.max(u64::from(id.0) + 1);
    }
}
