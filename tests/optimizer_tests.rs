mod common;

use common::{lines, optimize_all, run};
use tubec::ast::{BinaryOp, Node};
use tubec::cfg::{assign_block_ids, CFG};
use tubec::compile;
use tubec::ic_text::parse_ic;
use tubec::symbol_table::SymbolTable;
use tubec::types::Type;
use tubec::{ICProgram, Optimization, Optimize, Result};

fn optimized_lines(text: &str) -> Vec<String> {
    let program = parse_ic(text).expect("valid IC");
    lines(&optimize_all(&program))
}

#[test]
fn sum_assignment_collapses_to_one_copy() -> Result<()> {
    let mut table = SymbolTable::new();
    table.declare("x", Type::Int, 1)?;

    let sum = Node::binary(BinaryOp::Add, Node::int_literal(3, 1), Node::int_literal(4, 1), 1)?;
    let ast = Node::assign(Node::variable("x", &table, 1)?, sum, 1)?;
    let ic = compile(&ast, &mut table)?;

    assert_eq!(lines(&ic.optimize(&Optimization::ALL)?), ["val_copy 7 s1"]);
    Ok(())
}

#[test]
fn element_store_keeps_only_array_writes() -> Result<()> {
    let mut table = SymbolTable::new();
    table.declare("arr", Type::IntArray, 1)?;

    let arr = |table: &SymbolTable| Node::variable("arr", table, 1);
    let resize = Node::method_call(arr(&table)?, "resize", vec![Node::int_literal(5, 1)], 1)?;
    let element = Node::array_access(arr(&table)?, Node::int_literal(2, 2), 2)?;
    let store = Node::assign(element, Node::int_literal(9, 2), 2)?;
    let ic = compile(&Node::block(vec![resize, store], 1), &mut table)?;

    assert_eq!(
        lines(&ic.optimize(&Optimization::ALL)?),
        ["ar_set_size a1 5", "ar_set_idx a1 2 9"]
    );
    Ok(())
}

#[test]
fn not_equal_folds_with_the_right_truth_table() {
    assert_eq!(
        optimized_lines("  test_nequ 3 4 s1\n  out_int s1\n"),
        ["out_int 1"]
    );
    assert_eq!(
        optimized_lines("  test_nequ 4 4 s1\n  out_int s1\n"),
        ["out_int 0"]
    );
    assert_eq!(
        optimized_lines("  test_equ 'a' 'a' s1\n  out_int s1\n"),
        ["out_int 1"]
    );
}

#[test]
fn division_by_zero_is_left_for_run_time() {
    assert_eq!(
        optimized_lines("  div 1 0 s1\n  out_int s1\n"),
        ["div 1 0 s1", "out_int s1"]
    );
}

#[test]
fn multiplying_by_zero_or_one() {
    assert_eq!(
        optimized_lines("  mult s1 0 s2\n  out_int s2\n"),
        ["out_int 0"]
    );
    assert_eq!(
        optimized_lines("  mult 1 s1 s2\n  out_int s2\n"),
        ["out_int s1"]
    );
}

#[test]
fn unread_results_are_dropped() {
    assert_eq!(
        optimized_lines("  val_copy 5 s1\n  val_copy 6 s2\n  out_int s2\n"),
        ["out_int 6"]
    );
}

#[test]
fn overwritten_stores_are_dropped() {
    assert_eq!(
        optimized_lines("  add s3 s4 s1\n  add s3 s5 s1\n  out_int s1\n"),
        ["add s3 s5 s1", "out_int s1"]
    );
}

#[test]
fn pinned_variables_keep_their_final_value() -> Result<()> {
    let mut program = parse_ic("  val_copy 5 s1\n  val_copy 6 s2\n")?;
    program.pin(1);

    assert_eq!(lines(&optimize_all(&program)), ["val_copy 5 s1"]);
    Ok(())
}

#[test]
fn values_read_after_a_loop_survive() -> Result<()> {
    let text = "\
  val_copy 5 s1
loop: add s1 1 s1
  test_less s1 10 s2
  jump_if_n0 s2 loop
  out_int s1
";
    let program = parse_ic(text)?;
    let optimized = optimize_all(&program);

    assert_eq!(run(&program), Ok("10".to_owned()));
    assert_eq!(run(&optimized), run(&program));
    assert!(optimized
        .instructions()
        .any(|entry| entry.to_string().contains("add s1 1 s1")));
    Ok(())
}

#[test]
fn code_after_an_unconditional_jump_is_removed() {
    assert_eq!(
        optimized_lines("  jump end\n  out_int 1\nend: out_int 2\n"),
        ["out_int 2"]
    );
}

#[test]
fn constant_conditions_become_plain_jumps() {
    let taken = "\
  val_copy 0 s1
  jump_if_0 s1 skip
  out_int 1
skip: out_int 2
";
    assert_eq!(optimized_lines(taken), ["out_int 2"]);

    let never = "\
  val_copy 0 s1
  jump_if_n0 s1 skip
  out_int 1
skip: out_int 2
";
    assert_eq!(optimized_lines(never), ["out_int 1", "out_int 2"]);
}

#[test]
fn return_addresses_stay_reachable() -> Result<()> {
    let text = "\
  push back
  jump sub
back: out_int s9
  jump done
sub: val_copy 4 s9
  pop s1
  jump s1
done: nop
";
    let program = parse_ic(text)?;
    let optimized = optimize_all(&program);

    assert_eq!(run(&program), Ok("4".to_owned()));
    assert_eq!(run(&optimized), run(&program));

    let labels: Vec<&str> = optimized
        .entries
        .iter()
        .filter_map(|entry| entry.label.as_deref())
        .collect();
    assert!(labels.contains(&"back"));
    assert!(labels.contains(&"sub"));
    Ok(())
}

#[test]
fn disabled_passes_do_nothing() -> Result<()> {
    let text = "  val_copy 2 s1\n  add s1 3 s2\n  out_int s2\n";
    let program = parse_ic(text)?;

    assert_eq!(lines(&program.optimize(&[])?), lines(&program));
    assert_eq!(
        lines(&program.optimize(&[Optimization::ConstantPropagation])?),
        ["add 2 3 s2", "out_int s2"]
    );
    assert_eq!(
        lines(&program.optimize(&[
            Optimization::ConstantPropagation,
            Optimization::ConstantFolding,
        ])?),
        ["out_int 5"]
    );
    Ok(())
}

#[test]
fn optimizing_twice_changes_nothing() -> Result<()> {
    let texts = [
        "  val_copy 5 s1\nloop: add s1 1 s1\n  test_less s1 10 s2\n  jump_if_n0 s2 loop\n  out_int s1\n",
        "  val_copy 1 s1\n  val_copy s1 s2\n  mult s2 s2 s3\n  out_int s3\n",
        "  jump end\n  val_copy 3 s1\nend: out_int s1\n",
    ];

    for text in texts {
        let once = optimize_all(&parse_ic(text)?);
        let twice = optimize_all(&once);
        assert_eq!(once, twice, "not a fixpoint:\n{}", once);
    }
    Ok(())
}

#[test]
fn printed_output_reads_back() -> Result<()> {
    let mut table = SymbolTable::new();
    let ast = Node::print(
        vec![Node::string_literal("\"ok\"", 1)?, Node::int_literal(3, 1)],
        1,
    )?;
    let ic = compile(&ast, &mut table)?;

    let reparsed = parse_ic(&ic.to_string())?;
    assert_eq!(reparsed.to_string(), ic.to_string());
    assert_eq!(run(&reparsed), run(&ic));
    Ok(())
}

#[test]
fn blocks_split_at_labels_and_after_jumps() -> Result<()> {
    let mut program = parse_ic("  val_copy 1 s1\n  jump_if_0 s1 out\n  out_int s1\nout: nop\n")?;
    assign_block_ids(&mut program.entries);

    let ids: Vec<Option<usize>> = program.entries.iter().map(|e| e.block_id).collect();
    assert_eq!(ids, [Some(0), Some(0), Some(1), Some(2)]);

    let mut printed = vec![];
    program.print_blocks(&mut printed).expect("writes to a Vec");
    let printed = String::from_utf8(printed).expect("utf-8");
    assert!(printed.starts_with("[  0]   val_copy 1 s1\n"));

    let cfg = CFG::build(&program.entries)?;
    assert_eq!(cfg.basic_blocks.len(), 3);
    assert_eq!(cfg.reachable_blocks().len(), 3);
    Ok(())
}

#[test]
fn malformed_programs_are_internal_errors() {
    let err = parse_ic("  jump nowhere\n")
        .and_then(|program| program.optimize(&Optimization::ALL))
        .expect_err("undefined label");
    assert!(err.is_internal());

    let err = parse_ic("  val_copy s1 7\n").expect_err("literal destination");
    assert!(err.is_internal());
}

#[test]
fn empty_program_stays_empty() {
    let program = ICProgram::new();
    assert_eq!(optimize_all(&program), program);
}
