//! Pointer words: the tagged 64-bit cell encoding
//!
//! Every heap cell is one `u64`. A cell holding a pointer packs, from most-
//! to least-significant bits:
//!
//! - **tag** (4 bits): the node kind at the target position,
//! - **ext** (24 bits): auxiliary payload (duplication color, operator id, or
//!   function/constructor id),
//! - **val** (32 bits): a heap position.
//!
//! [`Tag::Num`] is the exception: only the tag nibble is reserved and the
//! remaining 60 bits carry an unboxed unsigned integer. Every arithmetic
//! result is folded back into that range through [`NUM_MASK`].
//!
//! These widths are observable through program outputs, so they are fixed
//! constants of the format rather than tuning knobs.

use std::fmt;

use num_enum::TryFromPrimitive;

/// A tagged cell word. `Copy` and exactly one machine word wide.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Ptr(u64);

/// Shift that positions the tag nibble.
const TAG_SHIFT: u64 = 60;
/// Shift that positions the ext field.
const EXT_SHIFT: u64 = 32;
/// Mask of the 24-bit ext field (after shifting).
const EXT_MASK: u64 = 0xFF_FFFF;
/// Mask of the 32-bit val field.
const VAL_MASK: u64 = 0xFFFF_FFFF;

/// Mask of the 60-bit unboxed numeric payload.
pub const NUM_MASK: u64 = 0x0FFF_FFFF_FFFF_FFFF;

/// Node kinds, in tag-nibble order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive)]
#[repr(u64)]
pub enum Tag {
    /// First duplication endpoint; points at slot 0 of a DUP node.
    Dp0 = 0x0,
    /// Second duplication endpoint; points at slot 1 of a DUP node.
    Dp1 = 0x1,
    /// Bound variable occurrence; points at slot 0 of a LAM node.
    Var = 0x2,
    /// Sentinel occupying a binder slot while no value was delivered.
    Arg = 0x3,
    /// Erasure marker; absorbs any substitution.
    Era = 0x4,
    /// Lambda node: slot 0 is the binder, slot 1 the body.
    Lam = 0x5,
    /// Application node: slot 0 is the function, slot 1 the argument.
    App = 0x6,
    /// Superposition node: two alternatives under one color.
    Sup = 0x7,
    /// Constructor node; ext is the constructor id, arity from the table.
    Ctr = 0x8,
    /// Function call node; ext is the function id, arity from the table.
    Cal = 0x9,
    /// Binary numeric operation; ext is the operator id.
    Op2 = 0xA,
    /// Unboxed 60-bit unsigned integer.
    Num = 0xB,
    /// Reserved for floating point; never produced.
    Flo = 0xC,
    /// Vacant cell. Reaching this during reduction is a graph corruption.
    Nil = 0xF,
}

/// Binary operator ids carried in the ext field of an OP2 node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u64)]
#[allow(missing_docs)]
pub enum Oper {
    Add = 0x0,
    Sub = 0x1,
    Mul = 0x2,
    Div = 0x3,
    Mod = 0x4,
    And = 0x5,
    Or = 0x6,
    Xor = 0x7,
    Shl = 0x8,
    Shr = 0x9,
    Ltn = 0xA,
    Lte = 0xB,
    Eql = 0xC,
    Gte = 0xD,
    Gtn = 0xE,
    Neq = 0xF,
}

impl Oper {
    /// Source-level symbol, used by the readback printer.
    pub fn symbol(self) -> &'static str {
        match self {
            Oper::Add => "+",
            Oper::Sub => "-",
            Oper::Mul => "*",
            Oper::Div => "/",
            Oper::Mod => "%",
            Oper::And => "&",
            Oper::Or => "|",
            Oper::Xor => "^",
            Oper::Shl => "<<",
            Oper::Shr => ">>",
            Oper::Ltn => "<",
            Oper::Lte => "<=",
            Oper::Eql => "==",
            Oper::Gte => ">=",
            Oper::Gtn => ">",
            Oper::Neq => "!=",
        }
    }

    /// Applies the operator to two 60-bit operands. Arithmetic wraps modulo
    /// 2^60; comparisons yield 0 or 1; division and modulo by zero yield 0;
    /// shift counts are taken modulo the machine word width.
    pub fn apply(self, a: u64, b: u64) -> u64 {
        let c = match self {
            Oper::Add => a.wrapping_add(b),
            Oper::Sub => a.wrapping_sub(b),
            Oper::Mul => a.wrapping_mul(b),
            Oper::Div => {
                if b == 0 {
                    0
                } else {
                    a / b
                }
            }
            Oper::Mod => {
                if b == 0 {
                    0
                } else {
                    a % b
                }
            }
            Oper::And => a & b,
            Oper::Or => a | b,
            Oper::Xor => a ^ b,
            Oper::Shl => a.wrapping_shl(b as u32),
            Oper::Shr => a.wrapping_shr(b as u32),
            Oper::Ltn => (a < b) as u64,
            Oper::Lte => (a <= b) as u64,
            Oper::Eql => (a == b) as u64,
            Oper::Gte => (a >= b) as u64,
            Oper::Gtn => (a > b) as u64,
            Oper::Neq => (a != b) as u64,
        };
        c & NUM_MASK
    }
}

impl Ptr {
    /// Rebuilds a pointer from its raw word.
    pub fn from_word(word: u64) -> Self {
        Ptr(word)
    }

    /// The raw word.
    pub fn word(self) -> u64 {
        self.0
    }

    /// Variable occurrence pointing at the binder slot of the LAM at `pos`.
    pub fn var(pos: u64) -> Self {
        Ptr(((Tag::Var as u64) << TAG_SHIFT) | pos)
    }

    /// First endpoint of the DUP node at `pos`, under color `col`.
    pub fn dp0(col: u64, pos: u64) -> Self {
        Ptr(((Tag::Dp0 as u64) << TAG_SHIFT) | (col << EXT_SHIFT) | pos)
    }

    /// Second endpoint of the DUP node at `pos`, under color `col`.
    pub fn dp1(col: u64, pos: u64) -> Self {
        Ptr(((Tag::Dp1 as u64) << TAG_SHIFT) | (col << EXT_SHIFT) | pos)
    }

    /// Unbound-binder sentinel.
    pub fn arg(pos: u64) -> Self {
        Ptr(((Tag::Arg as u64) << TAG_SHIFT) | pos)
    }

    /// Erasure marker.
    pub fn era() -> Self {
        Ptr((Tag::Era as u64) << TAG_SHIFT)
    }

    /// Lambda node at `pos`.
    pub fn lam(pos: u64) -> Self {
        Ptr(((Tag::Lam as u64) << TAG_SHIFT) | pos)
    }

    /// Application node at `pos`.
    pub fn app(pos: u64) -> Self {
        Ptr(((Tag::App as u64) << TAG_SHIFT) | pos)
    }

    /// Superposition node at `pos` under color `col`.
    pub fn sup(col: u64, pos: u64) -> Self {
        Ptr(((Tag::Sup as u64) << TAG_SHIFT) | (col << EXT_SHIFT) | pos)
    }

    /// Binary operation node at `pos` applying operator `ope`.
    pub fn op2(ope: u64, pos: u64) -> Self {
        Ptr(((Tag::Op2 as u64) << TAG_SHIFT) | (ope << EXT_SHIFT) | pos)
    }

    /// Unboxed number. The value is folded into the 60-bit payload.
    pub fn num(val: u64) -> Self {
        Ptr(((Tag::Num as u64) << TAG_SHIFT) | (val & NUM_MASK))
    }

    /// Constructor node at `pos` for constructor id `fun`.
    pub fn ctr(fun: u64, pos: u64) -> Self {
        Ptr(((Tag::Ctr as u64) << TAG_SHIFT) | (fun << EXT_SHIFT) | pos)
    }

    /// Function call node at `pos` for function id `fun`.
    pub fn cal(fun: u64, pos: u64) -> Self {
        Ptr(((Tag::Cal as u64) << TAG_SHIFT) | (fun << EXT_SHIFT) | pos)
    }

    /// Vacant cell marker.
    pub fn nil() -> Self {
        Ptr((Tag::Nil as u64) << TAG_SHIFT)
    }

    /// The tag nibble. Unassigned nibbles decode as [`Tag::Nil`].
    pub fn tag(self) -> Tag {
        Tag::try_from(self.0 >> TAG_SHIFT).unwrap_or(Tag::Nil)
    }

    /// The 24-bit auxiliary field.
    pub fn ext(self) -> u64 {
        (self.0 >> EXT_SHIFT) & EXT_MASK
    }

    /// The 32-bit position field.
    pub fn val(self) -> u64 {
        self.0 & VAL_MASK
    }

    /// The 60-bit numeric payload of a NUM word.
    pub fn num_val(self) -> u64 {
        self.0 & NUM_MASK
    }

    /// Position of the `slot`-th cell of the node this word points at.
    pub fn loc(self, slot: u64) -> u64 {
        self.val() + slot
    }
}

impl fmt::Debug for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{:x}:{:x}", self.tag(), self.ext(), self.val())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_round_trip() {
        let p = Ptr::sup(0xABCDEF, 0x1234_5678);
        assert_eq!(p.tag(), Tag::Sup);
        assert_eq!(p.ext(), 0xABCDEF);
        assert_eq!(p.val(), 0x1234_5678);

        let q = Ptr::cal(7, 42);
        assert_eq!(q.tag(), Tag::Cal);
        assert_eq!(q.ext(), 7);
        assert_eq!(q.loc(3), 45);
    }

    #[test]
    fn num_payload_is_masked_to_60_bits() {
        let n = Ptr::num(u64::MAX);
        assert_eq!(n.tag(), Tag::Num);
        assert_eq!(n.num_val(), NUM_MASK);
    }

    #[test]
    fn unassigned_tag_nibbles_decode_as_nil() {
        let raw = Ptr::from_word(0xD << TAG_SHIFT);
        assert_eq!(raw.tag(), Tag::Nil);
        let raw = Ptr::from_word(0xE << TAG_SHIFT);
        assert_eq!(raw.tag(), Tag::Nil);
    }

    #[test]
    fn arithmetic_wraps_modulo_2_pow_60() {
        assert_eq!(Oper::Add.apply(NUM_MASK, 1), 0);
        assert_eq!(Oper::Sub.apply(0, 1), NUM_MASK);
        assert_eq!(Oper::Mul.apply(1 << 59, 2), 0);
    }

    #[test]
    fn comparisons_yield_zero_or_one() {
        assert_eq!(Oper::Ltn.apply(3, 4), 1);
        assert_eq!(Oper::Gte.apply(3, 4), 0);
        assert_eq!(Oper::Eql.apply(9, 9), 1);
        assert_eq!(Oper::Neq.apply(9, 9), 0);
    }

    #[test]
    fn division_by_zero_is_defined() {
        assert_eq!(Oper::Div.apply(10, 0), 0);
        assert_eq!(Oper::Mod.apply(10, 0), 0);
    }

    #[test]
    fn debug_rendering_shows_all_fields() {
        let p = Ptr::app(0x89);
        assert_eq!(format!("{p:?}"), "App:0:89");
    }
}
