use regex::Regex;

use crate::error::{CompileError, Result};
use crate::ic::{validate, ICArg, ICEntry, ICProgram, Opcode};
use crate::ice;

lazy_static::lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"'(?:\\.|[^'\\])'|#.*|[^\s#]+").unwrap();
    static ref LABEL_RE: Regex = Regex::new(r"^([A-Za-z_]\w*):$").unwrap();
    static ref VAR_RE: Regex = Regex::new(r"^([sa])([0-9]+)$").unwrap();
}

/// Read a program back from the text `print_ic` produces.
///
/// Blank lines and lines holding only a comment are skipped. Operands spelled `s<N>` are
/// scalars, `a<N>` arrays, and anything else is taken as a literal.
pub fn parse_ic(text: &str) -> Result<ICProgram> {
    let mut program = ICProgram::new();

    for (idx, raw) in text.lines().enumerate() {
        if let Some(entry) = parse_line(raw, idx + 1)? {
            program.entries.push(entry);
        }
    }

    Ok(program)
}

fn parse_line(raw: &str, line_no: usize) -> Result<Option<ICEntry>> {
    let mut entry = ICEntry::default();

    for token in TOKEN_RE.find_iter(raw).map(|m| m.as_str()) {
        if let Some(comment) = token.strip_prefix('#') {
            let comment = comment.strip_prefix(' ').unwrap_or(comment).trim_end();
            if !comment.is_empty() {
                entry.comment = Some(comment.to_owned());
            }
            break;
        }

        if entry.opcode.is_none() && entry.label.is_none() {
            if let Some(caps) = LABEL_RE.captures(token) {
                entry.label = Some(caps[1].to_owned());
                continue;
            }
        }

        match entry.opcode {
            None => match Opcode::from_name(token) {
                Some(opcode) => entry.opcode = Some(opcode),
                None => ice!("line {}: unknown instruction '{}'", line_no, token),
            },
            Some(_) => entry.args.push(parse_arg(token)),
        }
    }

    if let Some(opcode) = entry.opcode {
        if let Err(CompileError::Internal(message)) = validate(opcode, &entry.args) {
            ice!("line {}: {}", line_no, message);
        }
    }

    if entry.opcode.is_none() && entry.label.is_none() {
        return Ok(None);
    }

    Ok(Some(entry))
}

fn parse_arg(token: &str) -> ICArg {
    match VAR_RE.captures(token) {
        Some(caps) => match (&caps[1], caps[2].parse::<usize>()) {
            ("s", Ok(id)) => ICArg::Scalar(id),
            ("a", Ok(id)) => ICArg::Array(id),
            _ => ICArg::constant(token),
        },
        None => ICArg::constant(token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_labels_operands_and_comments() {
        let text = "\
            \x20 val_copy 0 s4                         # Init loop variable for printing array.\n\
            print_array_start_1:\n\
            \x20 jump_if_n0 s6 print_array_end_2       #  ...and jump to end if so.\n\
            \x20 out_char ' '\n\
            \x20 out_char '#'\n\
            \n\
            # a comment on its own\n\
            done: ar_get_size a3 s9\n";

        let program = parse_ic(text).expect("parses");
        assert_eq!(program.len(), 6);

        let first = &program.entries[0];
        assert_eq!(first.opcode, Some(Opcode::ValCopy));
        assert_eq!(first.args, vec![ICArg::constant("0"), ICArg::Scalar(4)]);
        assert_eq!(first.comment.as_deref(), Some("Init loop variable for printing array."));

        assert_eq!(program.entries[1].label.as_deref(), Some("print_array_start_1"));
        assert!(program.entries[1].is_label_only());

        assert_eq!(program.entries[2].comment.as_deref(), Some(" ...and jump to end if so."));
        assert_eq!(program.entries[3].args, vec![ICArg::constant("' '")]);
        assert_eq!(program.entries[4].args, vec![ICArg::constant("'#'")]);

        let last = &program.entries[5];
        assert_eq!(last.label.as_deref(), Some("done"));
        assert_eq!(last.args, vec![ICArg::Array(3), ICArg::Scalar(9)]);
    }

    #[test]
    fn printed_programs_read_back_unchanged() {
        let text = format!(
            "  val_copy 'x' s1\nloop:\n{:<39} # Increment to the next index.\n  jump loop\n",
            "  add s1 1 s1"
        );
        let program = parse_ic(&text).expect("parses");
        assert_eq!(program.to_string(), text);
    }

    #[test]
    fn rejects_unknown_instructions_and_bad_operands() {
        let err = parse_ic("  frob s1\n").expect_err("unknown opcode");
        assert!(err.is_internal());
        assert!(err.to_string().contains("line 1"));

        let err = parse_ic("  nop\n  val_copy s1 7\n").expect_err("destination is a literal");
        assert!(err.is_internal());
        assert!(err.to_string().contains("line 2"));
    }
}
