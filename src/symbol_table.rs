use std::collections::HashMap;

use crate::ast::Node;
use crate::error::Result;
use crate::types::Type;
use crate::{bail_at, ice};

/// Handle to a variable or temporary in the table's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

/// Handle to a declared function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    pub var_id: usize,
    pub ty: Type,
    pub name: String,
    pub scope: i32, // -1 for temporaries
    pub is_temp: bool,
    pub shadowed: Option<EntryId>,
    // Set when this entry holds `array[index]`, so that assigning to it stores back into the array.
    pub array_ref: Option<EntryId>,
    pub index_ref: Option<EntryId>,
    pub released: bool,
}

impl TableEntry {
    pub fn is_array_element(&self) -> bool {
        self.array_ref.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionEntry {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<EntryId>,
    pub return_slot: EntryId,
    pub return_value_slot: EntryId,
    pub label: String,
    pub body: Option<Node>,
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    entries: Vec<TableEntry>,
    scopes: Vec<Vec<EntryId>>,
    active: HashMap<String, EntryId>,
    functions: Vec<FunctionEntry>,
    function_names: HashMap<String, FunctionId>,
    current_function: Option<FunctionId>,
    next_var_id: usize,
    next_label_id: usize,
    loop_ends: Vec<String>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            entries: Vec::new(),
            scopes: vec![Vec::new()],
            active: HashMap::new(),
            functions: Vec::new(),
            function_names: HashMap::new(),
            current_function: None,
            next_var_id: 1,
            next_label_id: 0,
            loop_ends: Vec::new(),
        }
    }

    pub fn current_scope(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    pub fn exit_scope(&mut self) -> Result<()> {
        if self.scopes.len() == 1 {
            ice!("attempted to exit the global scope");
        }

        let Some(scope) = self.scopes.pop() else {
            ice!("scope stack is empty");
        };

        for id in scope.into_iter().rev() {
            let entry = &self.entries[id.0];
            match entry.shadowed {
                Some(prev) => {
                    self.active.insert(entry.name.clone(), prev);
                }
                None => {
                    self.active.remove(&entry.name);
                }
            }
        }

        Ok(())
    }

    pub fn declare(&mut self, name: &str, ty: Type, line: usize) -> Result<EntryId> {
        if ty == Type::Void {
            bail_at!(line, "cannot declare variable '{}' of type 'void'", name);
        }

        let scope = self.current_scope();
        let shadowed = self.active.get(name).copied();

        if let Some(prev) = shadowed {
            if self.entries[prev.0].scope == scope as i32 {
                bail_at!(line, "redeclaration of variable '{}'", name);
            }
        }

        let id = self.push_entry(TableEntry {
            var_id: 0,
            ty,
            name: name.to_owned(),
            scope: scope as i32,
            is_temp: false,
            shadowed,
            array_ref: None,
            index_ref: None,
            released: false,
        });

        self.scopes[scope].push(id);
        self.active.insert(name.to_owned(), id);

        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<EntryId> {
        self.active.get(name).copied()
    }

    pub fn entry(&self, id: EntryId) -> &TableEntry {
        &self.entries[id.0]
    }

    pub fn entries(&self) -> impl Iterator<Item = &TableEntry> {
        self.entries.iter()
    }

    pub fn new_temp(&mut self, ty: Type) -> EntryId {
        self.push_entry(TableEntry {
            var_id: 0,
            ty,
            name: String::new(),
            scope: -1,
            is_temp: true,
            shadowed: None,
            array_ref: None,
            index_ref: None,
            released: false,
        })
    }

    /// Hand a consumed temporary back. Named variables are left alone, and releasing an
    /// array element also releases the temporaries that computed its array and index.
    pub fn release(&mut self, id: EntryId) {
        let mut pending = vec![id];

        while let Some(id) = pending.pop() {
            let entry = &mut self.entries[id.0];
            if !entry.is_temp || entry.released {
                continue;
            }
            entry.released = true;
            pending.extend(entry.array_ref);
            pending.extend(entry.index_ref);
        }
    }

    pub fn link_array_element(&mut self, element: EntryId, array: EntryId, index: EntryId) {
        let entry = &mut self.entries[element.0];
        entry.array_ref = Some(array);
        entry.index_ref = Some(index);
    }

    pub fn next_label(&mut self, prefix: &str) -> String {
        let label = format!("{}{}", prefix, self.next_label_id);
        self.next_label_id += 1;
        label
    }

    pub fn push_loop_end(&mut self, label: String) {
        self.loop_ends.push(label);
    }

    pub fn pop_loop_end(&mut self) -> Option<String> {
        self.loop_ends.pop()
    }

    pub fn current_loop_end(&self) -> Option<&str> {
        self.loop_ends.last().map(String::as_str)
    }

    /// Register a function and open the scope its parameters and body live in.
    ///
    /// The function is visible to lookups immediately so that its body may call it.
    pub fn begin_function(
        &mut self,
        name: &str,
        return_type: Type,
        params: &[(&str, Type)],
        line: usize,
    ) -> Result<FunctionId> {
        if self.current_function.is_some() {
            bail_at!(line, "function '{}' cannot be declared inside another function", name);
        }
        if self.function_names.contains_key(name) {
            bail_at!(line, "redeclaration of function '{}'", name);
        }

        let return_slot = self.new_temp(Type::Int);
        let value_type = if return_type == Type::Void {
            Type::Int
        } else {
            return_type
        };
        let return_value_slot = self.new_temp(value_type);

        self.enter_scope();
        let params = params
            .iter()
            .map(|(param, ty)| self.declare(param, *ty, line))
            .collect::<Result<Vec<_>>>()?;

        let id = FunctionId(self.functions.len());
        self.functions.push(FunctionEntry {
            name: name.to_owned(),
            return_type,
            params,
            return_slot,
            return_value_slot,
            label: format!("function_{}", name),
            body: None,
        });
        self.function_names.insert(name.to_owned(), id);
        self.current_function = Some(id);

        Ok(id)
    }

    /// Attach the body of the function opened by `begin_function` and close its scope.
    pub fn end_function(&mut self, body: Node) -> Result<()> {
        let Some(id) = self.current_function.take() else {
            ice!("end_function called outside of a function");
        };
        self.functions[id.0].body = Some(body);
        self.exit_scope()
    }

    pub fn current_function(&self) -> Option<FunctionId> {
        self.current_function
    }

    pub fn lookup_function(&self, name: &str) -> Option<FunctionId> {
        self.function_names.get(name).copied()
    }

    pub fn function(&self, id: FunctionId) -> &FunctionEntry {
        &self.functions[id.0]
    }

    /// Move every function body out of the table, in declaration order.
    pub fn take_function_bodies(&mut self) -> Vec<(FunctionId, Node)> {
        self.functions
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, func)| func.body.take().map(|body| (FunctionId(idx), body)))
            .collect()
    }

    fn push_entry(&mut self, mut entry: TableEntry) -> EntryId {
        entry.var_id = self.next_var_id;
        self.next_var_id += 1;

        let id = EntryId(self.entries.len());
        self.entries.push(entry);
        id
    }
}
