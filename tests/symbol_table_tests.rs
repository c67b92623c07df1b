use tubec::ast::Node;
use tubec::symbol_table::SymbolTable;
use tubec::types::Type;
use tubec::Result;

#[test]
fn exiting_a_scope_restores_the_shadowed_binding() -> Result<()> {
    let mut table = SymbolTable::new();
    let outer = table.declare("x", Type::Int, 1)?;

    table.enter_scope();
    let middle = table.declare("x", Type::Char, 2)?;
    assert_eq!(table.current_scope(), 1);

    table.enter_scope();
    let inner = table.declare("x", Type::IntArray, 3)?;
    let only_inner = table.declare("y", Type::Int, 3)?;
    assert_eq!(table.lookup("x"), Some(inner));
    assert_eq!(table.entry(inner).shadowed, Some(middle));
    assert_eq!(table.lookup("y"), Some(only_inner));

    table.exit_scope()?;
    assert_eq!(table.lookup("x"), Some(middle));
    assert_eq!(table.lookup("y"), None);

    table.exit_scope()?;
    assert_eq!(table.lookup("x"), Some(outer));
    assert_eq!(table.entry(outer).ty, Type::Int);
    assert_eq!(table.current_scope(), 0);
    Ok(())
}

#[test]
fn redeclaring_in_the_same_scope_is_an_error() -> Result<()> {
    let mut table = SymbolTable::new();
    table.declare("count", Type::Int, 1)?;

    let err = table.declare("count", Type::Char, 2).expect_err("same scope");
    assert_eq!(err.to_string(), "ERROR(line 2): redeclaration of variable 'count'");

    table.enter_scope();
    table.declare("count", Type::Char, 3)?;
    Ok(())
}

#[test]
fn void_variables_are_rejected() {
    let mut table = SymbolTable::new();
    let err = table.declare("nothing", Type::Void, 5).expect_err("void");
    assert_eq!(
        err.to_string(),
        "ERROR(line 5): cannot declare variable 'nothing' of type 'void'"
    );
}

#[test]
fn the_global_scope_cannot_be_exited() {
    let mut table = SymbolTable::new();
    let err = table.exit_scope().expect_err("nothing to pop");
    assert!(err.is_internal());
}

#[test]
fn variable_ids_are_unique_across_names_and_temporaries() -> Result<()> {
    let mut table = SymbolTable::new();
    let a = table.declare("a", Type::Int, 1)?;
    let t = table.new_temp(Type::Char);
    table.enter_scope();
    let b = table.declare("a", Type::Int, 2)?;

    let ids: Vec<usize> = [a, t, b].iter().map(|id| table.entry(*id).var_id).collect();
    assert_eq!(ids, [1, 2, 3]);

    let temp = table.entry(t);
    assert!(temp.is_temp);
    assert_eq!(temp.scope, -1);
    assert!(temp.name.is_empty());
    Ok(())
}

#[test]
fn releasing_an_element_releases_what_computed_it() -> Result<()> {
    let mut table = SymbolTable::new();
    let named = table.declare("arr", Type::IntArray, 1)?;
    let index = table.new_temp(Type::Int);
    let element = table.new_temp(Type::Int);
    table.link_array_element(element, named, index);
    assert!(table.entry(element).is_array_element());

    table.release(element);
    assert!(table.entry(element).released);
    assert!(table.entry(index).released);
    assert!(!table.entry(named).released);

    table.release(named);
    assert!(!table.entry(named).released);
    Ok(())
}

#[test]
fn labels_are_unique_per_table() {
    let mut table = SymbolTable::new();
    assert_eq!(table.next_label("while_start_"), "while_start_0");
    assert_eq!(table.next_label("while_end_"), "while_end_1");
    assert_eq!(table.next_label("if_end_"), "if_end_2");

    let mut fresh = SymbolTable::new();
    assert_eq!(fresh.next_label("if_end_"), "if_end_0");
}

#[test]
fn loop_ends_nest() {
    let mut table = SymbolTable::new();
    assert_eq!(table.current_loop_end(), None);

    table.push_loop_end("while_end_1".to_owned());
    table.push_loop_end("for_end_3".to_owned());
    assert_eq!(table.current_loop_end(), Some("for_end_3"));

    assert_eq!(table.pop_loop_end().as_deref(), Some("for_end_3"));
    assert_eq!(table.current_loop_end(), Some("while_end_1"));
}

#[test]
fn functions_live_in_their_own_namespace() -> Result<()> {
    let mut table = SymbolTable::new();
    table.declare("f", Type::Int, 1)?;

    let f = table.begin_function("f", Type::Char, &[("n", Type::Int), ("c", Type::Char)], 2)?;
    assert_eq!(table.current_function(), Some(f));
    assert!(table.lookup("n").is_some());

    let err = table
        .begin_function("g", Type::Int, &[], 3)
        .expect_err("nested function");
    assert_eq!(
        err.to_string(),
        "ERROR(line 3): function 'g' cannot be declared inside another function"
    );

    table.end_function(Node::block(vec![], 2))?;
    assert_eq!(table.current_function(), None);
    assert_eq!(table.lookup("n"), None);
    assert!(table.lookup("f").is_some());

    let entry = table.function(f);
    assert_eq!(entry.label, "function_f");
    assert_eq!(entry.return_type, Type::Char);
    assert_eq!(entry.params.len(), 2);
    assert_eq!(table.entry(entry.return_value_slot).ty, Type::Char);
    assert!(table.entry(entry.return_slot).is_temp);
    assert_eq!(table.lookup_function("f"), Some(f));

    let err = table
        .begin_function("f", Type::Int, &[], 4)
        .expect_err("declared twice");
    assert_eq!(err.to_string(), "ERROR(line 4): redeclaration of function 'f'");
    Ok(())
}

#[test]
fn duplicate_parameters_are_redeclarations() {
    let mut table = SymbolTable::new();
    let err = table
        .begin_function("h", Type::Void, &[("p", Type::Int), ("p", Type::Int)], 6)
        .expect_err("same parameter twice");
    assert_eq!(err.to_string(), "ERROR(line 6): redeclaration of variable 'p'");
}
