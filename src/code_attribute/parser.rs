use std::collections::HashMap;
use std::io::Cursor;

use binrw::{binrw, BinRead};

use crate::error::DecodeError;
use crate::metadata::{FieldRef, MethodRef, TypeRef};

use super::types::{Instruction, OpCode, Operand};

/// A metadata token as it appears inline in the code array.
pub type Token = u32;

/// Maps inline metadata tokens to the references they stand for.
pub trait TokenResolver {
    fn method(&self, token: Token) -> Option<MethodRef>;
    fn field(&self, token: Token) -> Option<FieldRef>;
    fn type_ref(&self, token: Token) -> Option<TypeRef>;
    fn string(&self, token: Token) -> Option<String>;
}

/// In-memory token table.
#[derive(Clone, Debug, Default)]
pub struct TokenTable {
    pub methods: HashMap<Token, MethodRef>,
    pub fields: HashMap<Token, FieldRef>,
    pub types: HashMap<Token, TypeRef>,
    pub strings: HashMap<Token, String>,
}

impl TokenResolver for TokenTable {
    fn method(&self, token: Token) -> Option<MethodRef> {
        self.methods.get(&token).cloned()
    }

    fn field(&self, token: Token) -> Option<FieldRef> {
        self.fields.get(&token).cloned()
    }

    fn type_ref(&self, token: Token) -> Option<TypeRef> {
        self.types.get(&token).cloned()
    }

    fn string(&self, token: Token) -> Option<String> {
        self.strings.get(&token).cloned()
    }
}

/// Encoded form of a single instruction.
#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[br(return_unexpected_error)]
#[brw(little)]
pub enum RawInstruction {
    #[brw(magic = 0x00u8)]
    Nop,
    #[brw(magic = 0x02u8)]
    Ldarg0,
    #[brw(magic = 0x03u8)]
    Ldarg1,
    #[brw(magic = 0x04u8)]
    Ldarg2,
    #[brw(magic = 0x05u8)]
    Ldarg3,
    #[brw(magic = 0x06u8)]
    Ldloc0,
    #[brw(magic = 0x07u8)]
    Ldloc1,
    #[brw(magic = 0x08u8)]
    Ldloc2,
    #[brw(magic = 0x09u8)]
    Ldloc3,
    #[brw(magic = 0x0au8)]
    Stloc0,
    #[brw(magic = 0x0bu8)]
    Stloc1,
    #[brw(magic = 0x0cu8)]
    Stloc2,
    #[brw(magic = 0x0du8)]
    Stloc3,
    #[brw(magic = 0x0eu8)]
    LdargS(u8),
    #[brw(magic = 0x0fu8)]
    LdargaS(u8),
    #[brw(magic = 0x10u8)]
    StargS(u8),
    #[brw(magic = 0x11u8)]
    LdlocS(u8),
    #[brw(magic = 0x12u8)]
    LdlocaS(u8),
    #[brw(magic = 0x13u8)]
    StlocS(u8),
    #[brw(magic = 0x14u8)]
    Ldnull,
    #[brw(magic = 0x15u8)]
    LdcI4M1,
    #[brw(magic = 0x16u8)]
    LdcI40,
    #[brw(magic = 0x17u8)]
    LdcI41,
    #[brw(magic = 0x18u8)]
    LdcI42,
    #[brw(magic = 0x19u8)]
    LdcI43,
    #[brw(magic = 0x1au8)]
    LdcI44,
    #[brw(magic = 0x1bu8)]
    LdcI45,
    #[brw(magic = 0x1cu8)]
    LdcI46,
    #[brw(magic = 0x1du8)]
    LdcI47,
    #[brw(magic = 0x1eu8)]
    LdcI48,
    #[brw(magic = 0x1fu8)]
    LdcI4S(i8),
    #[brw(magic = 0x20u8)]
    LdcI4(i32),
    #[brw(magic = 0x21u8)]
    LdcI8(i64),
    #[brw(magic = 0x22u8)]
    LdcR4(f32),
    #[brw(magic = 0x23u8)]
    LdcR8(f64),
    #[brw(magic = 0x25u8)]
    Dup,
    #[brw(magic = 0x26u8)]
    Pop,
    #[brw(magic = 0x28u8)]
    Call(Token),
    #[brw(magic = 0x2au8)]
    Ret,
    #[brw(magic = 0x2bu8)]
    BrS(i8),
    #[brw(magic = 0x2cu8)]
    BrfalseS(i8),
    #[brw(magic = 0x2du8)]
    BrtrueS(i8),
    #[brw(magic = 0x2eu8)]
    BeqS(i8),
    #[brw(magic = 0x2fu8)]
    BgeS(i8),
    #[brw(magic = 0x30u8)]
    BgtS(i8),
    #[brw(magic = 0x31u8)]
    BleS(i8),
    #[brw(magic = 0x32u8)]
    BltS(i8),
    #[brw(magic = 0x33u8)]
    BneUnS(i8),
    #[brw(magic = 0x38u8)]
    Br(i32),
    #[brw(magic = 0x39u8)]
    Brfalse(i32),
    #[brw(magic = 0x3au8)]
    Brtrue(i32),
    #[brw(magic = 0x3bu8)]
    Beq(i32),
    #[brw(magic = 0x3cu8)]
    Bge(i32),
    #[brw(magic = 0x3du8)]
    Bgt(i32),
    #[brw(magic = 0x3eu8)]
    Ble(i32),
    #[brw(magic = 0x3fu8)]
    Blt(i32),
    #[brw(magic = 0x40u8)]
    BneUn(i32),
    #[brw(magic = 0x45u8)]
    Switch {
        count: u32,
        #[br(count = count)]
        offsets: Vec<i32>,
    },
    #[brw(magic = 0x50u8)]
    LdindRef,
    #[brw(magic = 0x58u8)]
    Add,
    #[brw(magic = 0x59u8)]
    Sub,
    #[brw(magic = 0x5au8)]
    Mul,
    #[brw(magic = 0x5bu8)]
    Div,
    #[brw(magic = 0x5du8)]
    Rem,
    #[brw(magic = 0x5fu8)]
    And,
    #[brw(magic = 0x60u8)]
    Or,
    #[brw(magic = 0x61u8)]
    Xor,
    #[brw(magic = 0x65u8)]
    Neg,
    #[brw(magic = 0x66u8)]
    Not,
    #[brw(magic = 0x69u8)]
    ConvI4,
    #[brw(magic = 0x6au8)]
    ConvI8,
    #[brw(magic = 0x6cu8)]
    ConvR8,
    #[brw(magic = 0x6fu8)]
    Callvirt(Token),
    #[brw(magic = 0x72u8)]
    Ldstr(Token),
    #[brw(magic = 0x73u8)]
    Newobj(Token),
    #[brw(magic = 0x74u8)]
    Castclass(Token),
    #[brw(magic = 0x75u8)]
    Isinst(Token),
    #[brw(magic = 0x79u8)]
    Unbox(Token),
    #[brw(magic = 0x7au8)]
    Throw,
    #[brw(magic = 0x7bu8)]
    Ldfld(Token),
    #[brw(magic = 0x7cu8)]
    Ldflda(Token),
    #[brw(magic = 0x7du8)]
    Stfld(Token),
    #[brw(magic = 0x7eu8)]
    Ldsfld(Token),
    #[brw(magic = 0x7fu8)]
    Ldsflda(Token),
    #[brw(magic = 0x80u8)]
    Stsfld(Token),
    #[brw(magic = 0x8cu8)]
    Box(Token),
    #[brw(magic = 0x8du8)]
    Newarr(Token),
    #[brw(magic = 0x8eu8)]
    Ldlen,
    #[brw(magic = 0x8fu8)]
    Ldelema(Token),
    #[brw(magic = 0x94u8)]
    LdelemI4,
    #[brw(magic = 0x9au8)]
    LdelemRef,
    #[brw(magic = 0x9eu8)]
    StelemI4,
    #[brw(magic = 0xa2u8)]
    StelemRef,
    #[brw(magic = 0xa3u8)]
    Ldelem(Token),
    #[brw(magic = 0xa4u8)]
    Stelem(Token),
    #[brw(magic = 0xa5u8)]
    UnboxAny(Token),
    #[brw(magic = 0xd0u8)]
    Ldtoken(Token),
    #[brw(magic = 0xdcu8)]
    Endfinally,
    #[brw(magic = 0xddu8)]
    Leave(i32),
    #[brw(magic = 0xdeu8)]
    LeaveS(i8),
    #[brw(magic = b"\xfe\x01")]
    Ceq,
    #[brw(magic = b"\xfe\x02")]
    Cgt,
    #[brw(magic = b"\xfe\x04")]
    Clt,
    #[brw(magic = b"\xfe\x09")]
    Ldarg(u16),
    #[brw(magic = b"\xfe\x0a")]
    Ldarga(u16),
    #[brw(magic = b"\xfe\x0b")]
    Starg(u16),
    #[brw(magic = b"\xfe\x0c")]
    Ldloc(u16),
    #[brw(magic = b"\xfe\x0d")]
    Ldloca(u16),
    #[brw(magic = b"\xfe\x0e")]
    Stloc(u16),
    #[brw(magic = b"\xfe\x13")]
    Volatile,
    #[brw(magic = b"\xfe\x14")]
    Tail,
    #[brw(magic = b"\xfe\x15")]
    Initobj(Token),
    #[brw(magic = b"\xfe\x16")]
    Constrained(Token),
    #[brw(magic = b"\xfe\x1e")]
    Readonly,
}

/// Parse the instruction starting at `offset`, returning it with the offset
/// of the instruction that follows.
pub fn instruction_parser(code: &[u8], offset: u32) -> Result<(RawInstruction, u32), DecodeError> {
    let mut cursor = Cursor::new(code);
    cursor.set_position(offset as u64);
    let instr = RawInstruction::read(&mut cursor).map_err(|e| DecodeError::Malformed {
        offset,
        message: e.to_string(),
    })?;
    Ok((instr, cursor.position() as u32))
}

/// Decode a whole code array. Tokens are resolved through `tokens`; branch
/// displacements become indices into the returned vector.
pub fn code_parser(code: &[u8], tokens: &impl TokenResolver) -> Result<Vec<Instruction>, DecodeError> {
    if code.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut raw = Vec::new();
    let mut offset = 0u32;
    while (offset as usize) < code.len() {
        let (instr, next) = instruction_parser(code, offset)?;
        raw.push((offset, next, instr));
        offset = next;
    }

    let index_of: HashMap<u32, usize> = raw
        .iter()
        .enumerate()
        .map(|(idx, (offset, _, _))| (*offset, idx))
        .collect();

    raw.into_iter()
        .map(|(offset, next, instr)| {
            let ctx = Resolution {
                offset,
                next,
                tokens,
                index_of: &index_of,
            };
            let (opcode, operand) = ctx.resolve(instr)?;
            Ok(Instruction {
                offset,
                opcode,
                operand,
            })
        })
        .collect()
}

struct Resolution<'a, R: TokenResolver> {
    offset: u32,
    next: u32,
    tokens: &'a R,
    index_of: &'a HashMap<u32, usize>,
}

impl<R: TokenResolver> Resolution<'_, R> {
    /// Displacements are relative to the start of the next instruction.
    fn target(&self, displacement: i64) -> Result<usize, DecodeError> {
        let target = self.next as i64 + displacement;
        u32::try_from(target)
            .ok()
            .and_then(|t| self.index_of.get(&t).copied())
            .ok_or(DecodeError::BadBranchTarget {
                offset: self.offset,
                target,
            })
    }

    fn branch(&self, displacement: i64) -> Result<Operand, DecodeError> {
        Ok(Operand::Branch(self.target(displacement)?))
    }

    fn unknown(&self, kind: &'static str, token: Token) -> DecodeError {
        DecodeError::UnknownToken {
            kind,
            token,
            offset: self.offset,
        }
    }

    fn method(&self, token: Token) -> Result<Operand, DecodeError> {
        self.tokens
            .method(token)
            .map(Operand::Method)
            .ok_or_else(|| self.unknown("method", token))
    }

    fn field(&self, token: Token) -> Result<Operand, DecodeError> {
        self.tokens
            .field(token)
            .map(Operand::Field)
            .ok_or_else(|| self.unknown("field", token))
    }

    fn type_ref(&self, token: Token) -> Result<Operand, DecodeError> {
        self.tokens
            .type_ref(token)
            .map(Operand::Type)
            .ok_or_else(|| self.unknown("type", token))
    }

    fn resolve(&self, instr: RawInstruction) -> Result<(OpCode, Operand), DecodeError> {
        use RawInstruction as R;

        let implied = |op: OpCode| Ok::<_, DecodeError>((op, op.implied_operand()));

        match instr {
            R::Nop => implied(OpCode::Nop),
            R::Ldarg0 => implied(OpCode::Ldarg0),
            R::Ldarg1 => implied(OpCode::Ldarg1),
            R::Ldarg2 => implied(OpCode::Ldarg2),
            R::Ldarg3 => implied(OpCode::Ldarg3),
            R::Ldloc0 => implied(OpCode::Ldloc0),
            R::Ldloc1 => implied(OpCode::Ldloc1),
            R::Ldloc2 => implied(OpCode::Ldloc2),
            R::Ldloc3 => implied(OpCode::Ldloc3),
            R::Stloc0 => implied(OpCode::Stloc0),
            R::Stloc1 => implied(OpCode::Stloc1),
            R::Stloc2 => implied(OpCode::Stloc2),
            R::Stloc3 => implied(OpCode::Stloc3),
            R::LdargS(i) => Ok((OpCode::LdargS, Operand::Parameter(i as u16))),
            R::LdargaS(i) => Ok((OpCode::LdargaS, Operand::Parameter(i as u16))),
            R::StargS(i) => Ok((OpCode::StargS, Operand::Parameter(i as u16))),
            R::LdlocS(i) => Ok((OpCode::LdlocS, Operand::Variable(i as u16))),
            R::LdlocaS(i) => Ok((OpCode::LdlocaS, Operand::Variable(i as u16))),
            R::StlocS(i) => Ok((OpCode::StlocS, Operand::Variable(i as u16))),
            R::Ldarg(i) => Ok((OpCode::Ldarg, Operand::Parameter(i))),
            R::Ldarga(i) => Ok((OpCode::Ldarga, Operand::Parameter(i))),
            R::Starg(i) => Ok((OpCode::Starg, Operand::Parameter(i))),
            R::Ldloc(i) => Ok((OpCode::Ldloc, Operand::Variable(i))),
            R::Ldloca(i) => Ok((OpCode::Ldloca, Operand::Variable(i))),
            R::Stloc(i) => Ok((OpCode::Stloc, Operand::Variable(i))),

            R::Ldnull => implied(OpCode::Ldnull),
            R::LdcI4M1 => implied(OpCode::LdcI4M1),
            R::LdcI40 => implied(OpCode::LdcI40),
            R::LdcI41 => implied(OpCode::LdcI41),
            R::LdcI42 => implied(OpCode::LdcI42),
            R::LdcI43 => implied(OpCode::LdcI43),
            R::LdcI44 => implied(OpCode::LdcI44),
            R::LdcI45 => implied(OpCode::LdcI45),
            R::LdcI46 => implied(OpCode::LdcI46),
            R::LdcI47 => implied(OpCode::LdcI47),
            R::LdcI48 => implied(OpCode::LdcI48),
            R::LdcI4S(v) => Ok((OpCode::LdcI4S, Operand::Int(v as i64))),
            R::LdcI4(v) => Ok((OpCode::LdcI4, Operand::Int(v as i64))),
            R::LdcI8(v) => Ok((OpCode::LdcI8, Operand::Int(v))),
            R::LdcR4(v) => Ok((OpCode::LdcR4, Operand::Float(v as f64))),
            R::LdcR8(v) => Ok((OpCode::LdcR8, Operand::Float(v))),
            R::Ldstr(token) => {
                let s = self.tokens.string(token).ok_or_else(|| self.unknown("string", token))?;
                Ok((OpCode::Ldstr, Operand::String(s)))
            }

            R::Dup => implied(OpCode::Dup),
            R::Pop => implied(OpCode::Pop),
            R::Call(token) => Ok((OpCode::Call, self.method(token)?)),
            R::Callvirt(token) => Ok((OpCode::Callvirt, self.method(token)?)),
            R::Newobj(token) => Ok((OpCode::Newobj, self.method(token)?)),
            R::Ret => implied(OpCode::Ret),

            // ============================================================
            // Branches
            // ============================================================
            R::BrS(d) => Ok((OpCode::BrS, self.branch(d as i64)?)),
            R::BrfalseS(d) => Ok((OpCode::BrfalseS, self.branch(d as i64)?)),
            R::BrtrueS(d) => Ok((OpCode::BrtrueS, self.branch(d as i64)?)),
            R::BeqS(d) => Ok((OpCode::BeqS, self.branch(d as i64)?)),
            R::BgeS(d) => Ok((OpCode::BgeS, self.branch(d as i64)?)),
            R::BgtS(d) => Ok((OpCode::BgtS, self.branch(d as i64)?)),
            R::BleS(d) => Ok((OpCode::BleS, self.branch(d as i64)?)),
            R::BltS(d) => Ok((OpCode::BltS, self.branch(d as i64)?)),
            R::BneUnS(d) => Ok((OpCode::BneUnS, self.branch(d as i64)?)),
            R::Br(d) => Ok((OpCode::Br, self.branch(d as i64)?)),
            R::Brfalse(d) => Ok((OpCode::Brfalse, self.branch(d as i64)?)),
            R::Brtrue(d) => Ok((OpCode::Brtrue, self.branch(d as i64)?)),
            R::Beq(d) => Ok((OpCode::Beq, self.branch(d as i64)?)),
            R::Bge(d) => Ok((OpCode::Bge, self.branch(d as i64)?)),
            R::Bgt(d) => Ok((OpCode::Bgt, self.branch(d as i64)?)),
            R::Ble(d) => Ok((OpCode::Ble, self.branch(d as i64)?)),
            R::Blt(d) => Ok((OpCode::Blt, self.branch(d as i64)?)),
            R::BneUn(d) => Ok((OpCode::BneUn, self.branch(d as i64)?)),
            R::Leave(d) => Ok((OpCode::Leave, self.branch(d as i64)?)),
            R::LeaveS(d) => Ok((OpCode::LeaveS, self.branch(d as i64)?)),
            R::Switch { offsets, .. } => {
                let targets = offsets
                    .iter()
                    .map(|&d| self.target(d as i64))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((OpCode::Switch, Operand::Switch(targets)))
            }

            R::LdindRef => implied(OpCode::LdindRef),
            R::Add => implied(OpCode::Add),
            R::Sub => implied(OpCode::Sub),
            R::Mul => implied(OpCode::Mul),
            R::Div => implied(OpCode::Div),
            R::Rem => implied(OpCode::Rem),
            R::And => implied(OpCode::And),
            R::Or => implied(OpCode::Or),
            R::Xor => implied(OpCode::Xor),
            R::Neg => implied(OpCode::Neg),
            R::Not => implied(OpCode::Not),
            R::ConvI4 => implied(OpCode::ConvI4),
            R::ConvI8 => implied(OpCode::ConvI8),
            R::ConvR8 => implied(OpCode::ConvR8),
            R::Ceq => implied(OpCode::Ceq),
            R::Cgt => implied(OpCode::Cgt),
            R::Clt => implied(OpCode::Clt),

            R::Castclass(token) => Ok((OpCode::Castclass, self.type_ref(token)?)),
            R::Isinst(token) => Ok((OpCode::Isinst, self.type_ref(token)?)),
            R::Box(token) => Ok((OpCode::Box, self.type_ref(token)?)),
            R::Unbox(token) => Ok((OpCode::Unbox, self.type_ref(token)?)),
            R::UnboxAny(token) => Ok((OpCode::UnboxAny, self.type_ref(token)?)),
            R::Throw => implied(OpCode::Throw),

            R::Ldfld(token) => Ok((OpCode::Ldfld, self.field(token)?)),
            R::Ldflda(token) => Ok((OpCode::Ldflda, self.field(token)?)),
            R::Stfld(token) => Ok((OpCode::Stfld, self.field(token)?)),
            R::Ldsfld(token) => Ok((OpCode::Ldsfld, self.field(token)?)),
            R::Ldsflda(token) => Ok((OpCode::Ldsflda, self.field(token)?)),
            R::Stsfld(token) => Ok((OpCode::Stsfld, self.field(token)?)),

            R::Newarr(token) => Ok((OpCode::Newarr, self.type_ref(token)?)),
            R::Ldlen => implied(OpCode::Ldlen),
            R::Ldelema(token) => Ok((OpCode::Ldelema, self.type_ref(token)?)),
            R::LdelemI4 => implied(OpCode::LdelemI4),
            R::LdelemRef => implied(OpCode::LdelemRef),
            R::StelemI4 => implied(OpCode::StelemI4),
            R::StelemRef => implied(OpCode::StelemRef),
            R::Ldelem(token) => Ok((OpCode::Ldelem, self.type_ref(token)?)),
            R::Stelem(token) => Ok((OpCode::Stelem, self.type_ref(token)?)),

            // ldtoken may name a type, a field or a method
            R::Ldtoken(token) => {
                let operand = if let Some(t) = self.tokens.type_ref(token) {
                    Operand::Type(t)
                } else if let Some(f) = self.tokens.field(token) {
                    Operand::Field(f)
                } else if let Some(m) = self.tokens.method(token) {
                    Operand::Method(m)
                } else {
                    return Err(self.unknown("member", token));
                };
                Ok((OpCode::Ldtoken, operand))
            }
            R::Initobj(token) => Ok((OpCode::Initobj, self.type_ref(token)?)),
            R::Endfinally => implied(OpCode::Endfinally),
            R::Constrained(token) => Ok((OpCode::Constrained, self.type_ref(token)?)),
            R::Volatile => implied(OpCode::Volatile),
            R::Tail => implied(OpCode::Tail),
            R::Readonly => implied(OpCode::Readonly),
        }
    }
}
