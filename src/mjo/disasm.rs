// Text disassembly of an instruction list.
//
// One line per instruction: the opcode in hex, then every operand payload
// separated by tabs.  Rendering is lazy; nothing is built until a line is
// formatted, and `lines()` can be called again to start over.

use std::fmt;
use std::io::{self, Write};

use super::instruction::Instruction;

/// Restartable, lazily formatted disassembly view.
#[derive(Debug, Clone, Copy)]
pub struct Disassembly<'a> {
    instructions: &'a [Instruction],
}

impl<'a> Disassembly<'a> {
    pub fn new(instructions: &'a [Instruction]) -> Self {
        Self { instructions }
    }

    /// Iterate over the lines from the beginning.
    pub fn lines(&self) -> Lines<'a> {
        Lines {
            inner: self.instructions.iter(),
        }
    }

    /// Stream the full listing to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for line in self.lines() {
            writeln!(w, "{line}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for Disassembly<'a> {
    type Item = Line<'a>;
    type IntoIter = Lines<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines()
    }
}

/// A single disassembly line, without its terminating newline.
#[derive(Debug, Clone, Copy)]
pub struct Line<'a> {
    instruction: &'a Instruction,
}

impl<'a> Line<'a> {
    pub fn instruction(&self) -> &'a Instruction {
        self.instruction
    }
}

impl fmt::Display for Line<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.instruction.opcode)?;
        for operand in &self.instruction.operands {
            write!(f, "\t{}", operand.payload)?;
        }
        Ok(())
    }
}

/// Iterator returned by [`Disassembly::lines`].
#[derive(Debug, Clone)]
pub struct Lines<'a> {
    inner: std::slice::Iter<'a, Instruction>,
}

impl<'a> Iterator for Lines<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|instruction| Line { instruction })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Lines<'_> {}
