// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Scoped symbol tables and the predefined builtins.

use std::sync::LazyLock;

use expression::Value;
use indexmap::IndexMap;

use crate::ast::DeclarationKind;

/// How a builtin argument reaches the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Any value; materialized into a data-memory variable.
    Slot,
    /// Compile-time integer placed in the channel field.
    Channel,
    /// Evaluated into the W register before the template runs.
    Accumulator,
    /// Name of a variable the builtin writes to.
    Target,
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub optional: bool,
}

const fn required(name: &'static str, kind: ParamKind) -> Param {
    Param {
        name,
        kind,
        optional: false,
    }
}

const fn optional(name: &'static str, kind: ParamKind) -> Param {
    Param {
        name,
        kind,
        optional: true,
    }
}

/// A builtin command and the assembly it expands to.
///
/// Each template line names arguments as `{param}`; a line that references an
/// omitted optional argument is dropped.
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub params: &'static [Param],
    pub template: &'static [&'static str],
    /// Leaves a result in W and can appear inside expressions.
    pub yields_value: bool,
    /// Only meaningful as a branch condition.
    pub condition_only: bool,
}

impl Builtin {
    const fn command(name: &'static str, params: &'static [Param], template: &'static [&'static str]) -> Self {
        Builtin {
            name,
            params,
            template,
            yields_value: false,
            condition_only: false,
        }
    }

    const fn value(name: &'static str, params: &'static [Param], template: &'static [&'static str]) -> Self {
        Builtin {
            name,
            params,
            template,
            yields_value: true,
            condition_only: false,
        }
    }
}

use ParamKind::{Accumulator, Channel, Slot, Target};

pub static BUILTINS: &[Builtin] = &[
    Builtin::command("update", &[required("duration", Slot)], &["UPDATE {duration}"]),
    Builtin::command("trigger", &[required("mask", Slot)], &["TRIGGER {mask}"]),
    Builtin::command("set_shutter", &[required("mask", Slot)], &["SHUTTERMASK {mask}"]),
    Builtin::command("set_inv_shutter", &[required("mask", Slot)], &["ASYNCINVSHUTTER {mask}"]),
    Builtin::command("set_counter", &[required("mask", Slot)], &["COUNTERMASK {mask}"]),
    Builtin::command(
        "set_dds",
        &[
            required("channel", Channel),
            optional("frequency", Slot),
            optional("amplitude", Slot),
            optional("phase", Slot),
        ],
        &[
            "DDSFRQ {channel}, {frequency}",
            "DDSAMP {channel}, {amplitude}",
            "DDSPHS {channel}, {phase}",
        ],
    ),
    Builtin::command("write_pipe", &[required("value", Accumulator)], &["WRITEPIPE"]),
    Builtin::value("read_pipe", &[optional("target", Target)], &["READPIPE", "STWR {target}"]),
    Builtin::command("set_ram_address", &[required("address", Slot)], &["SETRAMADDR {address}"]),
    Builtin::value("read_ram", &[], &["RAMREAD"]),
    Builtin::command("exit", &[required("code", Slot)], &["LDWR {code}", "WRITEPIPE", "END"]),
    Builtin::command("wait_trigger", &[required("mask", Slot)], &["WAITFORTRIGGER {mask}"]),
    Builtin::value("load_count", &[required("counter", Slot)], &["LDCOUNT {counter}"]),
    Builtin::command(
        "dac_out",
        &[required("channel", Channel), required("value", Slot)],
        &["DACOUT {channel}, {value}"],
    ),
    Builtin::command("serial_write", &[required("value", Slot)], &["SERIALWRITE 0, {value}"]),
    Builtin::value("rand", &[], &["RAND 0"]),
    Builtin::command("rand_seed", &[required("value", Slot)], &["RANDSEED 0, {value}"]),
    Builtin {
        name: "pipe_empty",
        params: &[],
        template: &[],
        yields_value: false,
        condition_only: true,
    },
    Builtin::command(
        "write_result",
        &[required("channel", Channel), required("value", Slot)],
        &["WRITERESULTTOPIPE {channel}, {value}"],
    ),
    Builtin::command("set_sync_time", &[], &["SETSYNCTIME"]),
    Builtin::command("wait_sync", &[], &["WAITFORSYNC"]),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    /// A data-memory variable, possibly under a different assembly name.
    Variable {
        kind: DeclarationKind,
        slot: usize,
        assembly_name: String,
    },
    /// Compile-time constant, substituted at use sites.
    Constant { value: Value, slot: usize },
    Procedure { parameters: Vec<String> },
    Builtin(&'static Builtin),
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

static PREDEFINED: LazyLock<SymbolTable<'static>> = LazyLock::new(|| {
    let mut table = SymbolTable::default();
    for builtin in BUILTINS {
        table.symbols.insert(builtin.name.to_string(), Symbol::Builtin(builtin));
    }
    table
});

/// A scope of names, falling back to its parent scope.
#[derive(Debug, Default)]
pub struct SymbolTable<'p> {
    parent: Option<&'p SymbolTable<'p>>,
    symbols: IndexMap<String, Symbol>,
    next_slot: usize,
}

impl SymbolTable<'_> {
    /// The builtin scope every program scope derives from.
    pub fn predefined() -> &'static SymbolTable<'static> {
        &PREDEFINED
    }

    pub fn child(&self) -> SymbolTable<'_> {
        SymbolTable {
            parent: Some(self),
            symbols: IndexMap::new(),
            next_slot: self.next_slot,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols
            .get(name)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }

    /// Symbols defined in this scope, excluding parents.
    pub fn local(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.symbols.iter().map(|(name, symbol)| (name.as_str(), symbol))
    }

    /// Add a symbol; fails with the existing one when the name is taken in
    /// this scope or names a builtin.
    pub fn define(&mut self, name: &str, symbol: Symbol) -> Result<(), &Symbol> {
        if self.symbols.contains_key(name) {
            return Err(&self.symbols[name]);
        }
        if let Some(builtin @ Symbol::Builtin(_)) = self.parent.and_then(|parent| parent.lookup(name)) {
            return Err(builtin);
        }
        self.symbols.insert(name.to_string(), symbol);
        Ok(())
    }

    /// Next data-memory slot index.
    pub fn allocate_slot(&mut self) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_builtins() {
        let table = SymbolTable::predefined();
        let Some(Symbol::Builtin(update)) = table.lookup("update") else {
            panic!("update is predefined");
        };
        assert_eq!(update.template, &["UPDATE {duration}"]);
        assert!(matches!(table.lookup("rand"), Some(Symbol::Builtin(b)) if b.yields_value));
        assert!(table.lookup("x").is_none());
    }

    #[test]
    fn test_scopes() {
        let mut program = SymbolTable::predefined().child();
        let slot = program.allocate_slot();
        program
            .define(
                "x",
                Symbol::Variable {
                    kind: DeclarationKind::Var,
                    slot,
                    assembly_name: "x".to_string(),
                },
            )
            .unwrap();
        assert!(program.define("x", Symbol::Procedure { parameters: vec![] }).is_err());
        assert!(program.define("update", Symbol::Procedure { parameters: vec![] }).is_err());

        let mut procedure = program.child();
        procedure
            .define(
                "a",
                Symbol::Variable {
                    kind: DeclarationKind::Var,
                    slot: 1,
                    assembly_name: "f__a".to_string(),
                },
            )
            .unwrap();
        assert!(procedure.lookup("x").is_some());
        assert!(procedure.lookup("update").is_some());
        assert!(program.lookup("a").is_none());
        assert_eq!(procedure.local().count(), 1);
    }
}
