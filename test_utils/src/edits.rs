//! Random statement-level edit scripts for property-based testing.
//!
//! An `EditScript` starts from a few JavaScript statements and then inserts,
//! deletes and replaces whole statements. Every intermediate text is valid
//! JavaScript, so an incrementally maintained tree can be compared with a
//! full parse after each step without error recovery getting in the way.
//!
//! Edits are expressed as byte ranges against the text they apply to, in the
//! same shape a host editor would report them.

use std::fmt;
use std::ops::Range;

use quickcheck::{Arbitrary, Gen};
use ropey::Rope;

/// Statements the scripts are built from. Each ends with a newline so
/// concatenations stay on separate lines.
pub const STATEMENTS: &[&str] = &[
    "let a = 1;\n",
    "foo(a, b);\n",
    "const xs = [1, 2, 3];\n",
    "if (a) { b(); }\n",
    "function f(x, y) { return x + y; }\n",
    "obj.method(1, 'two');\n",
    "while (i < 10) { i++; }\n",
    "let point = { x: 1, y: [2, 3] };\n",
    "call(first, xs[0], () => {});\n",
    "label = `template ${a}`;\n",
];

/// Byte offset of an identifier character in each statement.
const RENAME_AT: &[usize] = &[4, 0, 6, 4, 9, 0, 7, 4, 0, 0];

const MAX_INITIAL: u32 = 6;
const MAX_EDITS: u32 = 12;

/// One statement-level operation. Indices are reduced modulo the current
/// statement count when the script is replayed.
#[derive(Clone, Debug)]
pub enum StatementEdit {
    Insert { at: usize, statement: usize },
    Delete { at: usize },
    Replace { at: usize, statement: usize },
    /// Rewrites one identifier character of a statement to `z`.
    Rename { at: usize },
}

/// A byte-range replacement against the text it applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ByteEdit {
    pub range: Range<usize>,
    pub text: String,
}

#[derive(Clone)]
pub struct EditScript {
    pub initial: Vec<usize>,
    pub edits: Vec<StatementEdit>,
}

impl EditScript {
    pub fn initial_text(&self) -> String {
        self.initial.iter().map(|&i| STATEMENTS[i]).collect()
    }

    /// Replays the script, returning one byte edit per step together with
    /// the text after that step.
    pub fn replay(&self) -> Vec<(ByteEdit, String)> {
        let mut statements: Vec<Statement> =
            self.initial.iter().map(|&i| Statement::new(i)).collect();
        let mut steps = Vec::with_capacity(self.edits.len());

        for edit in &self.edits {
            let Some(byte_edit) = step(&mut statements, edit) else {
                continue;
            };
            steps.push((byte_edit, statements.iter().map(|s| s.text.as_str()).collect()));
        }
        steps
    }

    /// Final text after every step.
    pub fn final_text(&self) -> String {
        self.replay().pop().map(|(_, text)| text).unwrap_or_else(|| self.initial_text())
    }
}

struct Statement {
    text: String,
    rename_at: usize,
}

impl Statement {
    fn new(index: usize) -> Self {
        let index = index % STATEMENTS.len();
        Statement { text: STATEMENTS[index].to_string(), rename_at: RENAME_AT[index] }
    }
}

fn offset_of(statements: &[Statement], index: usize) -> usize {
    statements[..index].iter().map(|s| s.text.len()).sum()
}

fn step(statements: &mut Vec<Statement>, edit: &StatementEdit) -> Option<ByteEdit> {
    match *edit {
        StatementEdit::Insert { at, statement } => {
            let at = at % (statements.len() + 1);
            let offset = offset_of(statements, at);
            let inserted = Statement::new(statement);
            let text = inserted.text.clone();
            statements.insert(at, inserted);
            Some(ByteEdit { range: offset..offset, text })
        }
        StatementEdit::Delete { at } => {
            if statements.is_empty() {
                return None;
            }
            let at = at % statements.len();
            let offset = offset_of(statements, at);
            let removed = statements.remove(at);
            Some(ByteEdit { range: offset..offset + removed.text.len(), text: String::new() })
        }
        StatementEdit::Replace { at, statement } => {
            if statements.is_empty() {
                return None;
            }
            let at = at % statements.len();
            let offset = offset_of(statements, at);
            let replacement = Statement::new(statement);
            let text = replacement.text.clone();
            let old = std::mem::replace(&mut statements[at], replacement);
            Some(ByteEdit { range: offset..offset + old.text.len(), text })
        }
        StatementEdit::Rename { at } => {
            if statements.is_empty() {
                return None;
            }
            let at = at % statements.len();
            let offset = offset_of(statements, at);
            let statement = &mut statements[at];
            let target = statement.rename_at;
            if statement.text.as_bytes()[target] == b'z' {
                return None;
            }
            statement.text.replace_range(target..target + 1, "z");
            let start = offset + target;
            Some(ByteEdit { range: start..start + 1, text: "z".to_string() })
        }
    }
}

/// Applies `edit` to `rope`, using byte offsets.
pub fn apply_to_rope(rope: &mut Rope, edit: &ByteEdit) {
    let start = rope.byte_to_char(edit.range.start);
    let end = rope.byte_to_char(edit.range.end);
    rope.remove(start..end);
    rope.insert(start, &edit.text);
}

/// Generates a random number in the range [min, max] inclusive.
fn gen_range(g: &mut Gen, min: u32, max: u32) -> u32 {
    min + (u32::arbitrary(g) % (max - min + 1))
}

fn gen_statement(g: &mut Gen) -> usize {
    gen_range(g, 0, STATEMENTS.len() as u32 - 1) as usize
}

fn gen_index(g: &mut Gen) -> usize {
    gen_range(g, 0, MAX_INITIAL + MAX_EDITS) as usize
}

impl Arbitrary for StatementEdit {
    fn arbitrary(g: &mut Gen) -> Self {
        match gen_range(g, 0, 3) {
            0 => StatementEdit::Insert { at: gen_index(g), statement: gen_statement(g) },
            1 => StatementEdit::Delete { at: gen_index(g) },
            2 => StatementEdit::Replace { at: gen_index(g), statement: gen_statement(g) },
            _ => StatementEdit::Rename { at: gen_index(g) },
        }
    }
}

impl Arbitrary for EditScript {
    fn arbitrary(g: &mut Gen) -> Self {
        let initial_len = gen_range(g, 0, MAX_INITIAL);
        let edit_len = gen_range(g, 1, MAX_EDITS);
        EditScript {
            initial: (0..initial_len).map(|_| gen_statement(g)).collect(),
            edits: (0..edit_len).map(|_| StatementEdit::arbitrary(g)).collect(),
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let initial = self.initial.clone();
        let edits = self.edits.clone();
        let shorter = (0..edits.len()).rev().map(move |len| EditScript {
            initial: initial.clone(),
            edits: edits[..len].to_vec(),
        });
        Box::new(shorter)
    }
}

impl fmt::Debug for EditScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "initial:\n{}", self.initial_text())?;
        for (edit, text) in self.replay() {
            writeln!(f, "-- {:?} => {:?}\n{}", edit.range, edit.text, text)?;
        }
        Ok(())
    }
}
