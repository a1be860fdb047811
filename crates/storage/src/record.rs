//! Variable record codec

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stored variable value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegValue {
    Int(i64),
    Str(String),
}

impl RegValue {
    /// Zero and the empty string are "no value": writing them deletes the slot
    pub fn is_empty(&self) -> bool {
        match self {
            RegValue::Int(n) => *n == 0,
            RegValue::Str(s) => s.is_empty(),
        }
    }
}

impl fmt::Display for RegValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegValue::Int(n) => write!(f, "{}", n),
            RegValue::Str(s) => f.write_str(s),
        }
    }
}

/// One persisted variable slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarRecord {
    pub name: String,
    pub index: u32,
    pub value: RegValue,
}

impl VarRecord {
    pub fn new(name: impl Into<String>, index: u32, value: RegValue) -> Self {
        Self { name: name.into(), index, value }
    }

    /// Parse a single `name[,index]\tvalue` line
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let parse_err = |message: &str| StorageError::Parse {
            line: line_no,
            message: message.to_string(),
        };

        let (key, raw) = line.split_once('\t').ok_or_else(|| parse_err("missing tab separator"))?;
        let (name, index) = match key.split_once(',') {
            Some((name, index)) => {
                let index = index.trim().parse::<u32>().map_err(|_| parse_err("bad index"))?;
                (name.trim(), index)
            }
            None => (key.trim(), 0),
        };

        if name.is_empty() {
            return Err(parse_err("empty variable name"));
        }

        let value = if name.ends_with('$') {
            RegValue::Str(unescape(raw))
        } else {
            let n = raw.trim().parse::<i64>().map_err(|_| parse_err("bad integer value"))?;
            RegValue::Int(n)
        };

        Ok(Self { name: name.to_ascii_lowercase(), index, value })
    }

    /// Render the record as one line (no trailing newline)
    pub fn to_line(&self) -> String {
        let value = match &self.value {
            RegValue::Int(n) => n.to_string(),
            RegValue::Str(s) => escape(s),
        };
        if self.index == 0 {
            format!("{}\t{}", self.name, value)
        } else {
            format!("{},{}\t{}", self.name, self.index, value)
        }
    }
}

/// Parse a whole file; malformed lines are skipped with a warning
pub fn parse_records(content: &str) -> Vec<VarRecord> {
    let mut records = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with("//") {
            continue;
        }
        match VarRecord::parse_line(line, i + 1) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Skipping variable record: {}", e),
        }
    }

    records
}

/// Render records, one per line
pub fn format_records<'a>(records: impl IntoIterator<Item = &'a VarRecord>) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&record.to_line());
        out.push('\n');
    }
    out
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_and_string_records() {
        let rec = VarRecord::parse_line("$Event_Open\t1", 1).unwrap();
        assert_eq!(rec, VarRecord::new("$event_open", 0, RegValue::Int(1)));

        let rec = VarRecord::parse_line("$winners$,2\tAlice the Brave", 2).unwrap();
        assert_eq!(rec.index, 2);
        assert_eq!(rec.value, RegValue::Str("Alice the Brave".into()));
    }

    #[test]
    fn test_string_escapes_survive() {
        let rec = VarRecord::new("$motd$", 0, RegValue::Str("line1\nline2\tend\\".into()));
        let line = rec.to_line();
        assert!(!line[line.find('\t').unwrap() + 1..].contains('\t'));
        assert_eq!(VarRecord::parse_line(&line, 1).unwrap(), rec);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let content = "// header\n$a\t5\nno-tab-here\n$b,x\t1\n$c\tnot-a-number\n$d,3\t-7\n";
        let records = parse_records(content);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], VarRecord::new("$d", 3, RegValue::Int(-7)));
    }

    #[test]
    fn test_format_omits_zero_index() {
        let text = format_records(&[
            VarRecord::new("$a", 0, RegValue::Int(1)),
            VarRecord::new("$a", 4, RegValue::Int(2)),
        ]);
        assert_eq!(text, "$a\t1\n$a,4\t2\n");
    }
}
