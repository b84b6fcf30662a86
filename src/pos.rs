// Source positions.
//
// Grounded on the teacher's `aex/util/pos.rs` `Pos` struct (byte/line/
// column/file fields with `advance`/`newline` helpers), generalized to
// carry an interned source-file name instead of a numeric file id, since
// this assembler's include stack is shallow (~100 levels) and names are
// cheap to clone at that depth.

use std::fmt;
use std::rc::Rc;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Pos {
    pub file:   Rc<str>,
    pub line:   u32,
    pub column: u16,
}

impl Pos {
    pub fn start(file: Rc<str>) -> Self {
        Pos { file, line: 1, column: 1 }
    }

    pub fn newline(&mut self) {
        self.line  += 1;
        self.column = 1;
    }

    pub fn advance_cols(&mut self, n: u16) {
        self.column += n;
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

impl fmt::Debug for Pos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<{}:{}:{}>", self.file, self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start() {
        let p = Pos::start("f.asm".into());
        assert_eq!(p.line, 1);
        assert_eq!(p.column, 1);
    }

    #[test]
    fn newline_resets_column() {
        let mut p = Pos::start("f.asm".into());
        p.advance_cols(5);
        p.newline();
        assert_eq!(p.line, 2);
        assert_eq!(p.column, 1);
    }
}
