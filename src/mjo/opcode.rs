// Opcode -> operand grammar table.
//
// Every 16-bit opcode either maps to exactly one `Grammar` or is unknown.
// Explicit opcodes take precedence over the range rules, which are checked
// in order; anything above `MAX_GENERIC_OPCODE` that is not listed is
// unknown and makes the rest of the stream undecodable.

/// Source line marker (`u16` line number).
pub const OP_LINE: u16 = 0x83A;
/// Jump table: `u16` count followed by `count` 4-byte entries.
pub const OP_SWITCH: u16 = 0x850;
/// Length-prefixed operand kept as raw bytes.
pub const OP_RAW_STRING: u16 = 0x829;

/// Largest opcode covered by the generic `u16, u32, u16` rule (decimal 850).
pub const MAX_GENERIC_OPCODE: u16 = 850;

/// Opcodes below the generic rule that carry no operands.
pub const BARE_RANGE: std::ops::RangeInclusive<u16> = 0x100..=0x1A9;

/// Operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    /// No operands.
    Bare,
    /// Fixed-width numeric fields, widths in stream order.
    Fixed(&'static [u8]),
    /// `u16` byte count, then that many bytes of encoded text.
    Text,
    /// `u16` byte count, then that many raw bytes.
    RawBytes,
    /// `u16` element count, then `count * stride` raw bytes.
    Table { stride: u8 },
}

const U32: &[u8] = &[4];
const U16: &[u8] = &[2];
const U16_U32_U16: &[u8] = &[2, 4, 2];
const U32_U32_U16: &[u8] = &[4, 4, 2];
const U32_U16: &[u8] = &[4, 2];
const U32_U32: &[u8] = &[4, 4];

/// Look up the grammar for `opcode`. `None` means unknown.
pub fn grammar_for(opcode: u16) -> Option<Grammar> {
    let grammar = match opcode {
        0x800 | 0x803 | 0x82C | 0x82D | 0x82E | 0x830 | 0x831 | 0x832 | 0x833 | 0x838
        | 0x839 | 0x83B | 0x83C | 0x83D | 0x843 | 0x845 | 0x847 => Grammar::Fixed(U32),
        0x801 | 0x836 | 0x840 | 0x842 => Grammar::Text,
        OP_RAW_STRING => Grammar::RawBytes,
        0x802 => Grammar::Fixed(U16_U32_U16),
        0x80F | 0x810 => Grammar::Fixed(U32_U32_U16),
        0x834 | 0x835 => Grammar::Fixed(U32_U16),
        0x837 => Grammar::Fixed(U32_U32),
        OP_LINE => Grammar::Fixed(U16),
        OP_SWITCH => Grammar::Table { stride: 4 },
        0x82B | 0x82F | 0x83E | 0x83F | 0x841 | 0x844 | 0x846 => Grammar::Bare,
        0x100..=0x1A9 => Grammar::Bare,
        0x1B8..=0x200 | 0x218..=0x260 | 0x270..=0x2C0 | 0x2D0..=0x320 => {
            Grammar::Fixed(U16_U32_U16)
        }
        0..=MAX_GENERIC_OPCODE => Grammar::Fixed(U16_U32_U16),
        _ => return None,
    };
    Some(grammar)
}

impl Grammar {
    /// Minimum operand bytes following the opcode.
    pub fn min_operand_len(self) -> usize {
        match self {
            Self::Bare => 0,
            Self::Fixed(widths) => widths.iter().map(|&w| w as usize).sum(),
            Self::Text | Self::RawBytes | Self::Table { .. } => 2,
        }
    }

    /// Bytes of payload behind an embedded length prefix of `declared`.
    pub fn payload_len(self, declared: u16) -> usize {
        match self {
            Self::Table { stride } => declared as usize * stride as usize,
            _ => declared as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_opcodes() {
        assert_eq!(grammar_for(0x800), Some(Grammar::Fixed(&[4])));
        assert_eq!(grammar_for(0x801), Some(Grammar::Text));
        assert_eq!(grammar_for(0x829), Some(Grammar::RawBytes));
        assert_eq!(grammar_for(0x802), Some(Grammar::Fixed(&[2, 4, 2])));
        assert_eq!(grammar_for(0x810), Some(Grammar::Fixed(&[4, 4, 2])));
        assert_eq!(grammar_for(0x835), Some(Grammar::Fixed(&[4, 2])));
        assert_eq!(grammar_for(0x837), Some(Grammar::Fixed(&[4, 4])));
        assert_eq!(grammar_for(OP_LINE), Some(Grammar::Fixed(&[2])));
        assert_eq!(grammar_for(OP_SWITCH), Some(Grammar::Table { stride: 4 }));
        assert_eq!(grammar_for(0x846), Some(Grammar::Bare));
    }

    #[test]
    fn range_rules() {
        assert_eq!(grammar_for(0x100), Some(Grammar::Bare));
        assert_eq!(grammar_for(0x1A9), Some(Grammar::Bare));
        assert_eq!(grammar_for(0x1AA), Some(Grammar::Fixed(&[2, 4, 2])));
        assert_eq!(grammar_for(0x1B8), Some(Grammar::Fixed(&[2, 4, 2])));
        assert_eq!(grammar_for(0x320), Some(Grammar::Fixed(&[2, 4, 2])));
        assert_eq!(grammar_for(0x000), Some(Grammar::Fixed(&[2, 4, 2])));
        assert_eq!(grammar_for(0x0FF), Some(Grammar::Fixed(&[2, 4, 2])));
        assert_eq!(grammar_for(850), Some(Grammar::Fixed(&[2, 4, 2])));
    }

    #[test]
    fn unknown_above_generic_limit() {
        assert_eq!(grammar_for(851), None);
        assert_eq!(grammar_for(0x7FF), None);
        assert_eq!(grammar_for(0x804), None);
        assert_eq!(grammar_for(0x999), None);
        assert_eq!(grammar_for(u16::MAX), None);
    }

    #[test]
    fn totality_over_opcode_space() {
        for opcode in 0..=u16::MAX {
            match grammar_for(opcode) {
                Some(_) => {}
                None => assert!(opcode > MAX_GENERIC_OPCODE, "opcode {opcode:#x}"),
            }
        }
        assert!(BARE_RANGE.clone().all(|op| grammar_for(op) == Some(Grammar::Bare)));
    }

    #[test]
    fn payload_len_uses_stride() {
        assert_eq!(Grammar::Table { stride: 4 }.payload_len(3), 12);
        assert_eq!(Grammar::Text.payload_len(3), 3);
        assert_eq!(Grammar::Fixed(&[2, 4, 2]).min_operand_len(), 8);
    }
}
