use std::fmt;

use crate::metadata::{FieldRef, MethodRef, TypeRef};

/// Instruction set understood by the analysis. One variant per opcode; the
/// short forms (`ldloc.0`, `ldc.i4.3`, ...) are kept distinct so that the
/// decoded stream mirrors the code array one-to-one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OpCode {
    Nop,
    Ldarg0,
    Ldarg1,
    Ldarg2,
    Ldarg3,
    Ldloc0,
    Ldloc1,
    Ldloc2,
    Ldloc3,
    Stloc0,
    Stloc1,
    Stloc2,
    Stloc3,
    LdargS,
    LdargaS,
    StargS,
    LdlocS,
    LdlocaS,
    StlocS,
    Ldarg,
    Ldarga,
    Starg,
    Ldloc,
    Ldloca,
    Stloc,
    Ldnull,
    LdcI4M1,
    LdcI40,
    LdcI41,
    LdcI42,
    LdcI43,
    LdcI44,
    LdcI45,
    LdcI46,
    LdcI47,
    LdcI48,
    LdcI4S,
    LdcI4,
    LdcI8,
    LdcR4,
    LdcR8,
    Ldstr,
    Dup,
    Pop,
    Call,
    Callvirt,
    Newobj,
    Ret,
    BrS,
    Br,
    LeaveS,
    Leave,
    BrfalseS,
    BrtrueS,
    Brfalse,
    Brtrue,
    BeqS,
    BgeS,
    BgtS,
    BleS,
    BltS,
    BneUnS,
    Beq,
    Bge,
    Bgt,
    Ble,
    Blt,
    BneUn,
    Switch,
    LdindRef,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Neg,
    Not,
    ConvI4,
    ConvI8,
    ConvR8,
    Ceq,
    Cgt,
    Clt,
    Castclass,
    Isinst,
    Box,
    Unbox,
    UnboxAny,
    Throw,
    Ldfld,
    Ldflda,
    Stfld,
    Ldsfld,
    Ldsflda,
    Stsfld,
    Newarr,
    Ldlen,
    Ldelema,
    LdelemI4,
    LdelemRef,
    Ldelem,
    StelemI4,
    StelemRef,
    Stelem,
    Ldtoken,
    Initobj,
    Endfinally,
    Constrained,
    Volatile,
    Tail,
    Readonly,
}

/// How many values an opcode pushes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StackPush {
    Push0,
    Push1,
    /// `dup`: the top value twice
    Push1Push1,
    /// Depends on the callee's return type
    VarPush,
}

/// How many values an opcode pops.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StackPop {
    Pop0,
    Pop1,
    Pop2,
    Pop3,
    /// Depends on the callee's signature
    VarPop,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlowControl {
    Next,
    Branch,
    CondBranch,
    Call,
    Return,
    Throw,
    /// Prefixes that only annotate the following instruction
    Meta,
}

impl OpCode {
    pub fn push_behaviour(self) -> StackPush {
        match self {
            OpCode::Nop
            | OpCode::Stloc0
            | OpCode::Stloc1
            | OpCode::Stloc2
            | OpCode::Stloc3
            | OpCode::StargS
            | OpCode::StlocS
            | OpCode::Starg
            | OpCode::Stloc
            | OpCode::Pop
            | OpCode::Ret
            | OpCode::Throw
            | OpCode::Stfld
            | OpCode::Stsfld
            | OpCode::StelemI4
            | OpCode::StelemRef
            | OpCode::Stelem
            | OpCode::Initobj
            | OpCode::Endfinally
            | OpCode::Constrained
            | OpCode::Volatile
            | OpCode::Tail
            | OpCode::Readonly => StackPush::Push0,

            // Branches
            OpCode::BrS
            | OpCode::Br
            | OpCode::LeaveS
            | OpCode::Leave
            | OpCode::BrfalseS
            | OpCode::BrtrueS
            | OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::BeqS
            | OpCode::BgeS
            | OpCode::BgtS
            | OpCode::BleS
            | OpCode::BltS
            | OpCode::BneUnS
            | OpCode::Beq
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt
            | OpCode::BneUn
            | OpCode::Switch => StackPush::Push0,

            OpCode::Dup => StackPush::Push1Push1,

            OpCode::Call | OpCode::Callvirt => StackPush::VarPush,

            _ => StackPush::Push1,
        }
    }

    pub fn pop_behaviour(self) -> StackPop {
        match self {
            // Loads and constants
            OpCode::Nop
            | OpCode::Ldarg0
            | OpCode::Ldarg1
            | OpCode::Ldarg2
            | OpCode::Ldarg3
            | OpCode::Ldloc0
            | OpCode::Ldloc1
            | OpCode::Ldloc2
            | OpCode::Ldloc3
            | OpCode::LdargS
            | OpCode::LdargaS
            | OpCode::LdlocS
            | OpCode::LdlocaS
            | OpCode::Ldarg
            | OpCode::Ldarga
            | OpCode::Ldloc
            | OpCode::Ldloca
            | OpCode::Ldnull
            | OpCode::LdcI4M1
            | OpCode::LdcI40
            | OpCode::LdcI41
            | OpCode::LdcI42
            | OpCode::LdcI43
            | OpCode::LdcI44
            | OpCode::LdcI45
            | OpCode::LdcI46
            | OpCode::LdcI47
            | OpCode::LdcI48
            | OpCode::LdcI4S
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR4
            | OpCode::LdcR8
            | OpCode::Ldstr
            | OpCode::Ldsfld
            | OpCode::Ldsflda
            | OpCode::Ldtoken => StackPop::Pop0,

            // Unconditional control transfer and prefixes
            OpCode::BrS
            | OpCode::Br
            | OpCode::LeaveS
            | OpCode::Leave
            | OpCode::Endfinally
            | OpCode::Constrained
            | OpCode::Volatile
            | OpCode::Tail
            | OpCode::Readonly => StackPop::Pop0,

            OpCode::Stloc0
            | OpCode::Stloc1
            | OpCode::Stloc2
            | OpCode::Stloc3
            | OpCode::StargS
            | OpCode::StlocS
            | OpCode::Starg
            | OpCode::Stloc
            | OpCode::Dup
            | OpCode::Pop
            | OpCode::BrfalseS
            | OpCode::BrtrueS
            | OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::Switch
            | OpCode::LdindRef
            | OpCode::Neg
            | OpCode::Not
            | OpCode::ConvI4
            | OpCode::ConvI8
            | OpCode::ConvR8
            | OpCode::Castclass
            | OpCode::Isinst
            | OpCode::Box
            | OpCode::Unbox
            | OpCode::UnboxAny
            | OpCode::Throw
            | OpCode::Ldfld
            | OpCode::Ldflda
            | OpCode::Stsfld
            | OpCode::Newarr
            | OpCode::Ldlen
            | OpCode::Initobj => StackPop::Pop1,

            OpCode::BeqS
            | OpCode::BgeS
            | OpCode::BgtS
            | OpCode::BleS
            | OpCode::BltS
            | OpCode::BneUnS
            | OpCode::Beq
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt
            | OpCode::BneUn
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::Ceq
            | OpCode::Cgt
            | OpCode::Clt
            | OpCode::Stfld
            | OpCode::Ldelema
            | OpCode::LdelemI4
            | OpCode::LdelemRef
            | OpCode::Ldelem => StackPop::Pop2,

            OpCode::StelemI4 | OpCode::StelemRef | OpCode::Stelem => StackPop::Pop3,

            OpCode::Call | OpCode::Callvirt | OpCode::Newobj | OpCode::Ret => StackPop::VarPop,
        }
    }

    pub fn flow_control(self) -> FlowControl {
        match self {
            OpCode::BrS | OpCode::Br | OpCode::LeaveS | OpCode::Leave => FlowControl::Branch,
            OpCode::BrfalseS
            | OpCode::BrtrueS
            | OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::BeqS
            | OpCode::BgeS
            | OpCode::BgtS
            | OpCode::BleS
            | OpCode::BltS
            | OpCode::BneUnS
            | OpCode::Beq
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt
            | OpCode::BneUn
            | OpCode::Switch => FlowControl::CondBranch,
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => FlowControl::Call,
            OpCode::Ret | OpCode::Endfinally => FlowControl::Return,
            OpCode::Throw => FlowControl::Throw,
            OpCode::Constrained | OpCode::Volatile | OpCode::Tail | OpCode::Readonly => FlowControl::Meta,
            _ => FlowControl::Next,
        }
    }

    /// Prefixes never touch the stack themselves.
    pub fn is_prefix(self) -> bool {
        self.flow_control() == FlowControl::Meta
    }

    /// Operand carried implicitly by the short forms.
    pub fn implied_operand(self) -> Operand {
        match self {
            OpCode::Ldarg0 => Operand::Parameter(0),
            OpCode::Ldarg1 => Operand::Parameter(1),
            OpCode::Ldarg2 => Operand::Parameter(2),
            OpCode::Ldarg3 => Operand::Parameter(3),
            OpCode::Ldloc0 | OpCode::Stloc0 => Operand::Variable(0),
            OpCode::Ldloc1 | OpCode::Stloc1 => Operand::Variable(1),
            OpCode::Ldloc2 | OpCode::Stloc2 => Operand::Variable(2),
            OpCode::Ldloc3 | OpCode::Stloc3 => Operand::Variable(3),
            OpCode::LdcI4M1 => Operand::Int(-1),
            OpCode::LdcI40 => Operand::Int(0),
            OpCode::LdcI41 => Operand::Int(1),
            OpCode::LdcI42 => Operand::Int(2),
            OpCode::LdcI43 => Operand::Int(3),
            OpCode::LdcI44 => Operand::Int(4),
            OpCode::LdcI45 => Operand::Int(5),
            OpCode::LdcI46 => Operand::Int(6),
            OpCode::LdcI47 => Operand::Int(7),
            OpCode::LdcI48 => Operand::Int(8),
            _ => Operand::None,
        }
    }

    /// Assembly mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Nop => "nop",
            OpCode::Ldarg0 => "ldarg.0",
            OpCode::Ldarg1 => "ldarg.1",
            OpCode::Ldarg2 => "ldarg.2",
            OpCode::Ldarg3 => "ldarg.3",
            OpCode::Ldloc0 => "ldloc.0",
            OpCode::Ldloc1 => "ldloc.1",
            OpCode::Ldloc2 => "ldloc.2",
            OpCode::Ldloc3 => "ldloc.3",
            OpCode::Stloc0 => "stloc.0",
            OpCode::Stloc1 => "stloc.1",
            OpCode::Stloc2 => "stloc.2",
            OpCode::Stloc3 => "stloc.3",
            OpCode::LdargS => "ldarg.s",
            OpCode::LdargaS => "ldarga.s",
            OpCode::StargS => "starg.s",
            OpCode::LdlocS => "ldloc.s",
            OpCode::LdlocaS => "ldloca.s",
            OpCode::StlocS => "stloc.s",
            OpCode::Ldarg => "ldarg",
            OpCode::Ldarga => "ldarga",
            OpCode::Starg => "starg",
            OpCode::Ldloc => "ldloc",
            OpCode::Ldloca => "ldloca",
            OpCode::Stloc => "stloc",
            OpCode::Ldnull => "ldnull",
            OpCode::LdcI4M1 => "ldc.i4.m1",
            OpCode::LdcI40 => "ldc.i4.0",
            OpCode::LdcI41 => "ldc.i4.1",
            OpCode::LdcI42 => "ldc.i4.2",
            OpCode::LdcI43 => "ldc.i4.3",
            OpCode::LdcI44 => "ldc.i4.4",
            OpCode::LdcI45 => "ldc.i4.5",
            OpCode::LdcI46 => "ldc.i4.6",
            OpCode::LdcI47 => "ldc.i4.7",
            OpCode::LdcI48 => "ldc.i4.8",
            OpCode::LdcI4S => "ldc.i4.s",
            OpCode::LdcI4 => "ldc.i4",
            OpCode::LdcI8 => "ldc.i8",
            OpCode::LdcR4 => "ldc.r4",
            OpCode::LdcR8 => "ldc.r8",
            OpCode::Ldstr => "ldstr",
            OpCode::Dup => "dup",
            OpCode::Pop => "pop",
            OpCode::Call => "call",
            OpCode::Callvirt => "callvirt",
            OpCode::Newobj => "newobj",
            OpCode::Ret => "ret",
            OpCode::BrS => "br.s",
            OpCode::Br => "br",
            OpCode::LeaveS => "leave.s",
            OpCode::Leave => "leave",
            OpCode::BrfalseS => "brfalse.s",
            OpCode::BrtrueS => "brtrue.s",
            OpCode::Brfalse => "brfalse",
            OpCode::Brtrue => "brtrue",
            OpCode::BeqS => "beq.s",
            OpCode::BgeS => "bge.s",
            OpCode::BgtS => "bgt.s",
            OpCode::BleS => "ble.s",
            OpCode::BltS => "blt.s",
            OpCode::BneUnS => "bne.un.s",
            OpCode::Beq => "beq",
            OpCode::Bge => "bge",
            OpCode::Bgt => "bgt",
            OpCode::Ble => "ble",
            OpCode::Blt => "blt",
            OpCode::BneUn => "bne.un",
            OpCode::Switch => "switch",
            OpCode::LdindRef => "ldind.ref",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Mul => "mul",
            OpCode::Div => "div",
            OpCode::Rem => "rem",
            OpCode::And => "and",
            OpCode::Or => "or",
            OpCode::Xor => "xor",
            OpCode::Neg => "neg",
            OpCode::Not => "not",
            OpCode::ConvI4 => "conv.i4",
            OpCode::ConvI8 => "conv.i8",
            OpCode::ConvR8 => "conv.r8",
            OpCode::Ceq => "ceq",
            OpCode::Cgt => "cgt",
            OpCode::Clt => "clt",
            OpCode::Castclass => "castclass",
            OpCode::Isinst => "isinst",
            OpCode::Box => "box",
            OpCode::Unbox => "unbox",
            OpCode::UnboxAny => "unbox.any",
            OpCode::Throw => "throw",
            OpCode::Ldfld => "ldfld",
            OpCode::Ldflda => "ldflda",
            OpCode::Stfld => "stfld",
            OpCode::Ldsfld => "ldsfld",
            OpCode::Ldsflda => "ldsflda",
            OpCode::Stsfld => "stsfld",
            OpCode::Newarr => "newarr",
            OpCode::Ldlen => "ldlen",
            OpCode::Ldelema => "ldelema",
            OpCode::LdelemI4 => "ldelem.i4",
            OpCode::LdelemRef => "ldelem.ref",
            OpCode::Ldelem => "ldelem",
            OpCode::StelemI4 => "stelem.i4",
            OpCode::StelemRef => "stelem.ref",
            OpCode::Stelem => "stelem",
            OpCode::Ldtoken => "ldtoken",
            OpCode::Initobj => "initobj",
            OpCode::Endfinally => "endfinally",
            OpCode::Constrained => "constrained.",
            OpCode::Volatile => "volatile.",
            OpCode::Tail => "tail.",
            OpCode::Readonly => "readonly.",
        }
    }
}

/// Typed instruction operand.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    None,
    Int(i64),
    Float(f64),
    String(String),
    Method(MethodRef),
    Field(FieldRef),
    Type(TypeRef),
    /// Local variable index
    Variable(u16),
    /// Raw argument slot; slot 0 of an instance method is the receiver
    Parameter(u16),
    /// Index of the target instruction
    Branch(usize),
    Switch(Vec<usize>),
}

impl Operand {
    /// References whose producer needs no look at its own inputs to type the
    /// value it pushes.
    pub fn is_member_reference(&self) -> bool {
        match self {
            Operand::Method(_)
            | Operand::Field(_)
            | Operand::Type(_)
            | Operand::Variable(_)
            | Operand::Parameter(_) => true,
            Operand::None
            | Operand::Int(_)
            | Operand::Float(_)
            | Operand::String(_)
            | Operand::Branch(_)
            | Operand::Switch(_) => false,
        }
    }
}

/// A decoded instruction: its byte offset in the code array, opcode and operand.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub offset: u32,
    pub opcode: OpCode,
    pub operand: Operand,
}

impl Instruction {
    /// An instruction whose operand is implied by the opcode (or absent).
    pub fn new(opcode: OpCode) -> Self {
        Instruction {
            offset: 0,
            opcode,
            operand: opcode.implied_operand(),
        }
    }

    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            offset: 0,
            opcode,
            operand,
        }
    }

    pub fn at(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn branch_targets(&self) -> Vec<usize> {
        match &self.operand {
            Operand::Branch(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    pub fn branch_target(&self) -> Option<usize> {
        match self.operand {
            Operand::Branch(target) => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.opcode.name())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int(v) => write!(f, " {}", v),
            Operand::Float(v) => write!(f, " {}", v),
            Operand::String(s) => write!(f, " {:?}", s),
            Operand::Method(m) => write!(f, " {} {}", m.return_type, m.full_name()),
            Operand::Field(fr) => write!(f, " {} {}::{}", fr.field_type, fr.declaring_type, fr.name),
            Operand::Type(t) => write!(f, " {}", t),
            Operand::Variable(i) => write!(f, " V_{}", i),
            Operand::Parameter(i) => write!(f, " A_{}", i),
            Operand::Branch(t) => write!(f, " #{}", t),
            Operand::Switch(ts) => {
                let ts: Vec<String> = ts.iter().map(|t| format!("#{}", t)).collect();
                write!(f, " ({})", ts.join(", "))
            }
        }
    }
}
