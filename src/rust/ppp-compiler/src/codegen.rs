// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Lowering of the ppp syntax tree to pulse-program assembly.
//!
//! Run-time arithmetic goes through the W register of the sequencer. Values
//! that are known at compile time are folded and stored in generated
//! variables, so that every instruction operand names a data-memory cell.

use expression::parser::{BinaryOp, Expr, ExprKind, UnaryOp};
use expression::{Evaluator, Value};
use indexmap::IndexMap;
use ionpulse_units::Unit;
use pulse_program::VariableType;

use crate::ast::*;
use crate::lexer::SourceMap;
use crate::parser::expression_error;
use crate::symbols::{Builtin, ParamKind, Symbol, SymbolTable};
use crate::{CompileError, Result};

/// Assembly text plus the map from assembly lines back to ppp lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompiledProgram {
    pub assembly: String,
    /// 1-based assembly line to 1-based ppp line.
    pub reverse_line_lookup: IndexMap<usize, usize>,
}

#[derive(Debug)]
struct Line {
    text: String,
    source_line: Option<usize>,
}

pub fn generate(program: &Program, map: &SourceMap) -> Result<CompiledProgram> {
    let mut scope = SymbolTable::predefined().child();
    let mut generator = Generator {
        map,
        constants: IndexMap::new(),
        initial_values: IndexMap::new(),
        declarations: Vec::new(),
        literals: IndexMap::new(),
        code: Vec::new(),
        temporaries: IndexMap::new(),
        temp_depth: 0,
        labels: 0,
        line: 0,
        procedure: None,
    };
    for item in &program.items {
        match item {
            Item::Declaration(declaration) => generator.declare(&mut scope, declaration)?,
            Item::Procedure(procedure) => generator.declare_procedure(&mut scope, procedure)?,
            Item::Statement(_) => {}
        }
    }
    for item in &program.items {
        if let Item::Statement(statement) = item {
            generator.statement(&scope, statement)?;
        }
    }
    let procedures: Vec<&Procedure> = program
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Procedure(procedure) => Some(procedure),
            _ => None,
        })
        .collect();
    if !procedures.is_empty() && generator.code.last().is_none_or(|line| line.text != "END") {
        generator.emit("END");
    }
    for procedure in procedures {
        generator.procedure(&scope, procedure)?;
    }
    Ok(generator.finish())
}

struct Generator<'a> {
    map: &'a SourceMap,
    /// Compile-time constants, used for folding.
    constants: IndexMap<String, Value>,
    /// Declared initial values, visible to later declarations.
    initial_values: IndexMap<String, Value>,
    declarations: Vec<Line>,
    /// Folded literal text to the generated variable holding it.
    literals: IndexMap<String, String>,
    code: Vec<Line>,
    /// High-water mark of scratch variables per procedure ("" for the main program).
    temporaries: IndexMap<String, usize>,
    temp_depth: usize,
    labels: usize,
    line: usize,
    procedure: Option<String>,
}

impl Generator<'_> {
    fn error(&self, offset: usize, message: impl Into<String>) -> CompileError {
        CompileError::at(self.map.position(offset), message)
    }

    fn emit(&mut self, text: impl Into<String>) {
        self.code.push(Line {
            text: text.into(),
            source_line: Some(self.line),
        });
    }

    fn label(&mut self, label: &str) {
        self.emit(format!("{label}:"));
    }

    fn new_label(&mut self, kind: &str) -> String {
        self.labels += 1;
        format!("__{kind}_{}", self.labels)
    }

    fn push_temporary(&mut self) -> String {
        let prefix = self.procedure.clone().unwrap_or_default();
        let name = temporary_name(&prefix, self.temp_depth);
        self.temp_depth += 1;
        let count = self.temporaries.entry(prefix).or_default();
        *count = (*count).max(self.temp_depth);
        name
    }

    fn finish(self) -> CompiledProgram {
        let mut lines = self.declarations;
        for (prefix, &count) in &self.temporaries {
            for index in 0..count {
                lines.push(Line {
                    text: format!("var {} 0", temporary_name(prefix, index)),
                    source_line: None,
                });
            }
        }
        lines.extend(self.code);
        let mut assembly = String::new();
        let mut reverse_line_lookup = IndexMap::new();
        for (index, line) in lines.iter().enumerate() {
            assembly.push_str(&line.text);
            assembly.push('\n');
            if let Some(source_line) = line.source_line {
                reverse_line_lookup.insert(index + 1, source_line);
            }
        }
        CompiledProgram {
            assembly,
            reverse_line_lookup,
        }
    }

    fn evaluate_constant(&self, expr: &Expr, start: usize, scope: &IndexMap<String, Value>) -> Result<Value> {
        Evaluator::new()
            .evaluate_expr(expr, scope)
            .map(|evaluation| evaluation.value)
            .map_err(|err| expression_error(self.map, start, &err))
    }

    fn declare(&mut self, scope: &mut SymbolTable, declaration: &Declaration) -> Result<()> {
        self.line = declaration.position.line;
        let mut visible = self.constants.clone();
        for (name, value) in &self.initial_values {
            visible.entry(name.clone()).or_insert_with(|| value.clone());
        }
        let value = declaration
            .value
            .as_ref()
            .map(|source| self.evaluate_constant(&source.expr, source.start, &visible))
            .transpose()?;

        let slot = scope.allocate_slot();
        if declaration.kind == DeclarationKind::Const {
            let (value, text) = match (value, &declaration.value) {
                (Some(value), Some(source)) => (value, &source.text),
                _ => return Err(CompileError::at(declaration.position, "constants need a value")),
            };
            self.define(scope, declaration, Symbol::Constant {
                value: value.clone(),
                slot,
            })?;
            self.constants.insert(declaration.name.clone(), value);
            self.declare_line(format!("const {} {}", declaration.name, text));
            return Ok(());
        }

        let mut var_type = declaration.kind.type_name().map(str::to_string);
        let mut unit = None;
        let mut encoding = declaration.encoding.clone();
        if let Some(name) = &encoding {
            encodings::lookup(name).map_err(|err| CompileError::at(declaration.position, err.to_string()))?;
        }
        for (attribute, position) in &declaration.attributes {
            if declaration.kind == DeclarationKind::Var && attribute.parse::<VariableType>().is_ok() {
                var_type = Some(attribute.clone());
            } else if encodings::lookup(attribute).is_ok() {
                encoding = Some(attribute.clone());
            } else if let Ok(parsed) = Unit::parse(attribute) {
                unit = Some(parsed);
            } else {
                return Err(CompileError::at(
                    *position,
                    format!("'{attribute}' is neither a variable type, a unit nor an encoding"),
                ));
            }
        }
        if let Some(Value::Quantity(quantity)) = &value {
            if !quantity.is_plain_number() {
                let text = declaration.value.as_ref().map_or("", |source| source.text.as_str());
                if let Some(unit) = &unit {
                    if unit.dims() != quantity.dims() {
                        return Err(CompileError::at(
                            declaration.position,
                            format!("value '{text}' does not match unit '{unit}'"),
                        ));
                    }
                }
                if let Some(name) = &encoding {
                    let encoding_unit = encodings::lookup(name)
                        .ok()
                        .and_then(|enc| Unit::parse(enc.unit).ok())
                        .unwrap_or_else(Unit::dimensionless);
                    if encoding_unit.dims() != quantity.dims() {
                        return Err(CompileError::at(
                            declaration.position,
                            format!("value '{text}' does not match encoding '{name}'"),
                        ));
                    }
                }
            }
        }

        self.define(scope, declaration, Symbol::Variable {
            kind: declaration.kind,
            slot,
            assembly_name: declaration.name.clone(),
        })?;
        if let Some(value) = value {
            self.initial_values.insert(declaration.name.clone(), value);
        }
        let fields = [
            declaration
                .value
                .as_ref()
                .map_or_else(|| "0".to_string(), |source| source.text.clone()),
            var_type.unwrap_or_default(),
            unit.map(|unit| unit.symbol().to_string()).unwrap_or_default(),
            encoding.unwrap_or_default(),
        ];
        self.declare_line(format!("var {} {}", declaration.name, join_fields(&fields)));
        Ok(())
    }

    fn define(&self, scope: &mut SymbolTable, declaration: &Declaration, symbol: Symbol) -> Result<()> {
        scope.define(&declaration.name, symbol).map_err(|existing| {
            let what = match existing {
                Symbol::Builtin(_) => "a builtin",
                Symbol::Procedure { .. } => "a procedure",
                _ => "already declared",
            };
            CompileError::at(
                declaration.position,
                format!("'{}' is {what}", declaration.name),
            )
        })
    }

    fn declare_line(&mut self, text: String) {
        self.declarations.push(Line {
            text,
            source_line: Some(self.line),
        });
    }

    fn declare_procedure(&mut self, scope: &mut SymbolTable, procedure: &Procedure) -> Result<()> {
        self.line = procedure.position.line;
        let parameters: Vec<String> = procedure
            .parameters
            .iter()
            .map(|parameter| format!("{}__{parameter}", procedure.name))
            .collect();
        for parameter in &parameters {
            self.declare_line(format!("var {parameter} 0"));
        }
        scope
            .define(&procedure.name, Symbol::Procedure { parameters })
            .map_err(|_| {
                CompileError::at(
                    procedure.position,
                    format!("'{}' is already declared", procedure.name),
                )
            })
    }

    fn procedure(&mut self, scope: &SymbolTable, procedure: &Procedure) -> Result<()> {
        self.line = procedure.position.line;
        let mut local = scope.child();
        for parameter in &procedure.parameters {
            let slot = local.allocate_slot();
            local
                .define(parameter, Symbol::Variable {
                    kind: DeclarationKind::Var,
                    slot,
                    assembly_name: format!("{}__{parameter}", procedure.name),
                })
                .map_err(|_| {
                    CompileError::at(
                        procedure.position,
                        format!("parameter '{parameter}' shadows a builtin"),
                    )
                })?;
        }
        self.procedure = Some(procedure.name.clone());
        self.label(&procedure.name);
        for statement in &procedure.body {
            self.statement(&local, statement)?;
        }
        if !matches!(
            procedure.body.last(),
            Some(Statement {
                kind: StatementKind::Return(_),
                ..
            })
        ) {
            self.emit("JMPPOP");
        }
        self.procedure = None;
        Ok(())
    }

    fn statement(&mut self, scope: &SymbolTable, statement: &Statement) -> Result<()> {
        self.line = statement.position.line;
        let mark = self.temp_depth;
        match &statement.kind {
            StatementKind::Assign { target, op, value } => {
                let target = self.target(scope, target, statement.position)?;
                match op {
                    None => self.load(scope, &value.expr, value.start)?,
                    Some(op) => {
                        let operand = self.operand(scope, &value.expr, value.start)?;
                        self.emit(format!("LDWR {target}"));
                        self.emit(format!("{} {operand}", op.mnemonic()));
                    }
                }
                self.emit(format!("STWR {target}"));
            }
            StatementKind::If { branches, otherwise } => {
                let end = self.new_label("endif");
                for (index, (condition, body)) in branches.iter().enumerate() {
                    let last = index + 1 == branches.len() && otherwise.is_empty();
                    let next = if last { end.clone() } else { self.new_label("else") };
                    self.temp_depth = mark;
                    self.jump_unless(scope, &condition.expr, condition.start, &next)?;
                    self.block(scope, body)?;
                    self.line = statement.position.line;
                    if !last {
                        self.emit(format!("JMP {end}"));
                        self.label(&next);
                    }
                }
                self.block(scope, otherwise)?;
                self.line = statement.position.line;
                self.label(&end);
            }
            StatementKind::While { condition, body } => {
                let top = self.new_label("while");
                let end = self.new_label("endwhile");
                self.label(&top);
                self.jump_unless(scope, &condition.expr, condition.start, &end)?;
                self.block(scope, body)?;
                self.line = statement.position.line;
                self.emit(format!("JMP {top}"));
                self.label(&end);
            }
            StatementKind::Call { name, arguments } => {
                self.call(scope, name, arguments, statement.position, false)?;
            }
            StatementKind::Return(value) => {
                if self.procedure.is_none() {
                    return Err(CompileError::at(statement.position, "'return' outside of a procedure"));
                }
                if let Some(value) = value {
                    self.load(scope, &value.expr, value.start)?;
                }
                self.emit("JMPPOP");
            }
            StatementKind::Pass => {}
            StatementKind::Asm(text) => self.emit(text.clone()),
        }
        self.temp_depth = mark;
        Ok(())
    }

    fn block(&mut self, scope: &SymbolTable, body: &[Statement]) -> Result<()> {
        for statement in body {
            self.statement(scope, statement)?;
        }
        Ok(())
    }

    fn target(&self, scope: &SymbolTable, name: &str, position: Position) -> Result<String> {
        match scope.lookup(name) {
            Some(Symbol::Variable { assembly_name, .. }) => Ok(assembly_name.clone()),
            Some(Symbol::Constant { .. }) => Err(CompileError::at(position, format!("cannot assign to constant '{name}'"))),
            Some(_) => Err(CompileError::at(position, format!("cannot assign to '{name}'"))),
            None => Err(CompileError::at(position, format!("undeclared variable '{name}'"))),
        }
    }

    /// True when `expr` can be folded at compile time.
    fn is_constant(&self, scope: &SymbolTable, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Quantity(..) | ExprKind::Str(_) => true,
            ExprKind::Ident(name) => match scope.lookup(name) {
                Some(Symbol::Constant { .. }) => true,
                Some(_) => false,
                None => expression::constant(name).is_some(),
            },
            ExprKind::Unary(_, inner) => self.is_constant(scope, inner),
            ExprKind::Binary(_, lhs, rhs) | ExprKind::Index(lhs, rhs) => {
                self.is_constant(scope, lhs) && self.is_constant(scope, rhs)
            }
            ExprKind::Call(name, args) => {
                scope.lookup(name).is_none() && args.iter().all(|arg| self.is_constant(scope, arg))
            }
            ExprKind::List(items) => items.iter().all(|item| self.is_constant(scope, item)),
            ExprKind::Dict(items) => items
                .iter()
                .all(|(key, value)| self.is_constant(scope, key) && self.is_constant(scope, value)),
        }
    }

    /// Name of a generated variable holding the folded value of `expr`.
    fn literal(&mut self, expr: &Expr, start: usize) -> Result<String> {
        let value = self.evaluate_constant(expr, start, &self.constants)?;
        let (magnitude, unit) = match &value {
            Value::Int(i) => (i.to_string(), String::new()),
            Value::Bool(b) => (i64::from(*b).to_string(), String::new()),
            Value::Float(x) if x.is_finite() => (x.to_string(), String::new()),
            Value::Quantity(q) if q.magnitude().is_finite() => {
                (q.magnitude().to_string(), q.unit().symbol().to_string())
            }
            other => {
                return Err(self.error(
                    start + expr.offset,
                    format!("cannot store {other} in a variable"),
                ));
            }
        };
        let key = format!("{magnitude} {unit}");
        if let Some(name) = self.literals.get(&key) {
            return Ok(name.clone());
        }
        let name = format!("__literal_{}", self.literals.len());
        self.declare_line(format!("var {name} {}", join_fields(&[magnitude, String::new(), unit])));
        self.literals.insert(key, name.clone());
        Ok(name)
    }

    /// A data-memory name holding the value of `expr`; may clobber W.
    fn operand(&mut self, scope: &SymbolTable, expr: &Expr, start: usize) -> Result<String> {
        if self.is_constant(scope, expr) {
            return self.literal(expr, start);
        }
        if let ExprKind::Ident(name) = &expr.kind {
            if let Some(Symbol::Variable { assembly_name, .. }) = scope.lookup(name) {
                return Ok(assembly_name.clone());
            }
        }
        self.load(scope, expr, start)?;
        let temporary = self.push_temporary();
        self.emit(format!("STWR {temporary}"));
        Ok(temporary)
    }

    /// Evaluate `expr` into the W register.
    fn load(&mut self, scope: &SymbolTable, expr: &Expr, start: usize) -> Result<()> {
        if self.is_constant(scope, expr) {
            let literal = self.literal(expr, start)?;
            self.emit(format!("LDWR {literal}"));
            return Ok(());
        }
        let offset = start + expr.offset;
        match &expr.kind {
            ExprKind::Ident(name) => match scope.lookup(name) {
                Some(Symbol::Variable { assembly_name, .. }) => {
                    self.emit(format!("LDWR {assembly_name}"));
                    Ok(())
                }
                Some(_) => Err(self.error(offset, format!("'{name}' is not a value"))),
                None => Err(self.error(offset, format!("undeclared variable '{name}'"))),
            },
            ExprKind::Binary(op @ (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div), lhs, rhs) => {
                let operand = self.operand(scope, rhs, start)?;
                self.load(scope, lhs, start)?;
                let mnemonic = match op {
                    BinaryOp::Add => "ADDW",
                    BinaryOp::Sub => "SUBW",
                    BinaryOp::Mul => "MULTW",
                    _ => "DIVW",
                };
                self.emit(format!("{mnemonic} {operand}"));
                Ok(())
            }
            ExprKind::Binary(BinaryOp::Rem | BinaryOp::Pow, ..) => Err(self.error(
                offset,
                "'%' and '**' are only supported on compile-time values",
            )),
            ExprKind::Binary(..) | ExprKind::Unary(UnaryOp::Not, _) => Err(self.error(
                offset,
                "comparisons and logic operators can only be used as conditions",
            )),
            ExprKind::Unary(UnaryOp::Plus, inner) => self.load(scope, inner, start),
            ExprKind::Unary(UnaryOp::Neg, inner) => {
                let operand = self.operand(scope, inner, start)?;
                self.emit("CLRW");
                self.emit(format!("SUBW {operand}"));
                Ok(())
            }
            ExprKind::Call(name, args) => {
                let arguments: Vec<Argument> = args
                    .iter()
                    .map(|arg| Argument {
                        keyword: None,
                        value: SourceExpr {
                            expr: arg.clone(),
                            text: String::new(),
                            start,
                        },
                    })
                    .collect();
                let position = self.map.position(offset);
                self.call(scope, name, &arguments, position, true)
            }
            _ => Err(self.error(offset, "expression cannot be evaluated at run time")),
        }
    }

    /// Jump to `label` when `expr` is false.
    fn jump_unless(&mut self, scope: &SymbolTable, expr: &Expr, start: usize, label: &str) -> Result<()> {
        self.conditional_jump(scope, expr, start, label, false)
    }

    /// Jump to `label` when `expr` evaluates to `when`.
    fn conditional_jump(
        &mut self,
        scope: &SymbolTable,
        expr: &Expr,
        start: usize,
        label: &str,
        when: bool,
    ) -> Result<()> {
        if self.is_constant(scope, expr) {
            let value = self.evaluate_constant(expr, start, &self.constants)?;
            if value.is_truthy() == when {
                self.emit(format!("JMP {label}"));
            }
            return Ok(());
        }
        match &expr.kind {
            ExprKind::Unary(UnaryOp::Not, inner) => self.conditional_jump(scope, inner, start, label, !when),
            ExprKind::Binary(BinaryOp::And, lhs, rhs) if !when => {
                self.conditional_jump(scope, lhs, start, label, false)?;
                self.conditional_jump(scope, rhs, start, label, false)
            }
            ExprKind::Binary(BinaryOp::Or, lhs, rhs) if when => {
                self.conditional_jump(scope, lhs, start, label, true)?;
                self.conditional_jump(scope, rhs, start, label, true)
            }
            ExprKind::Binary(op @ (BinaryOp::And | BinaryOp::Or), lhs, rhs) => {
                // `a and b` jumping on true, or `a or b` jumping on false.
                let skip = self.new_label(if *op == BinaryOp::And { "and" } else { "or" });
                self.conditional_jump(scope, lhs, start, &skip, !when)?;
                self.conditional_jump(scope, rhs, start, label, when)?;
                self.label(&skip);
                Ok(())
            }
            ExprKind::Binary(op, lhs, rhs) if comparison(*op).is_some() => {
                let operand = self.operand(scope, rhs, start)?;
                self.load(scope, lhs, start)?;
                let mnemonic = comparison(*op).unwrap_or("CMPEQUAL");
                self.emit(format!("{mnemonic} {operand}"));
                self.emit(format!("{} {label}", if when { "JMPCMP" } else { "JMPNCMP" }));
                Ok(())
            }
            ExprKind::Call(name, args) if name == "pipe_empty" && matches!(scope.lookup(name), Some(Symbol::Builtin(_))) => {
                if !args.is_empty() {
                    return Err(self.error(start + expr.offset, "pipe_empty() takes no arguments"));
                }
                self.emit(format!("{} {label}", if when { "JMPPIPEEMPTY" } else { "JMPPIPEAVAIL" }));
                Ok(())
            }
            _ => {
                self.load(scope, expr, start)?;
                self.emit(format!("{} {label}", if when { "JMPNZ" } else { "JMPZ" }));
                Ok(())
            }
        }
    }

    fn call(
        &mut self,
        scope: &SymbolTable,
        name: &str,
        arguments: &[Argument],
        position: Position,
        as_value: bool,
    ) -> Result<()> {
        match scope.lookup(name) {
            Some(Symbol::Builtin(builtin)) => {
                if builtin.condition_only {
                    return Err(CompileError::at(position, format!("{name}() can only be used as a condition")));
                }
                if as_value && !builtin.yields_value {
                    return Err(CompileError::at(position, format!("{name}() does not return a value")));
                }
                self.builtin(scope, *builtin, arguments, position)
            }
            Some(Symbol::Procedure { parameters }) => {
                if arguments.len() != parameters.len() {
                    return Err(CompileError::at(
                        position,
                        format!(
                            "{name}() takes {} argument(s), got {}",
                            parameters.len(),
                            arguments.len()
                        ),
                    ));
                }
                for (parameter, argument) in parameters.iter().zip(arguments) {
                    if argument.keyword.is_some() {
                        return Err(CompileError::at(position, "procedures take positional arguments only"));
                    }
                    self.load(scope, &argument.value.expr, argument.value.start)?;
                    self.emit(format!("STWR {parameter}"));
                }
                self.emit(format!("JMPPUSH {name}"));
                Ok(())
            }
            Some(_) => Err(CompileError::at(position, format!("'{name}' is not callable"))),
            None => Err(CompileError::at(position, format!("unknown procedure '{name}'"))),
        }
    }

    fn builtin(
        &mut self,
        scope: &SymbolTable,
        builtin: &'static Builtin,
        arguments: &[Argument],
        position: Position,
    ) -> Result<()> {
        let name = builtin.name;
        if arguments.len() > builtin.params.len() {
            return Err(CompileError::at(
                position,
                format!(
                    "{name}() takes at most {} argument(s), got {}",
                    builtin.params.len(),
                    arguments.len()
                ),
            ));
        }
        let mut bound: Vec<Option<&SourceExpr>> = vec![None; builtin.params.len()];
        for (index, argument) in arguments.iter().enumerate() {
            let slot = match &argument.keyword {
                None => index,
                Some(keyword) => builtin
                    .params
                    .iter()
                    .position(|param| param.name == keyword)
                    .ok_or_else(|| CompileError::at(position, format!("{name}() has no argument '{keyword}'")))?,
            };
            if bound[slot].replace(&argument.value).is_some() {
                return Err(CompileError::at(
                    position,
                    format!("{name}() got argument '{}' twice", builtin.params[slot].name),
                ));
            }
        }

        let mut values: IndexMap<&str, String> = IndexMap::new();
        let mut accumulator = None;
        for (param, argument) in builtin.params.iter().zip(&bound) {
            let Some(argument) = argument else {
                if param.optional {
                    continue;
                }
                return Err(CompileError::at(
                    position,
                    format!("{name}() is missing argument '{}'", param.name),
                ));
            };
            let value = match param.kind {
                ParamKind::Slot => self.operand(scope, &argument.expr, argument.start)?,
                ParamKind::Channel => self.channel(scope, argument)?,
                ParamKind::Target => match &argument.expr.kind {
                    ExprKind::Ident(target) => self.target(scope, target, position)?,
                    _ => {
                        return Err(self.error(
                            argument.start + argument.expr.offset,
                            format!("{name}() needs a variable for '{}'", param.name),
                        ));
                    }
                },
                ParamKind::Accumulator => {
                    accumulator = Some(*argument);
                    continue;
                }
            };
            values.insert(param.name, value);
        }
        if let Some(argument) = accumulator {
            self.load(scope, &argument.expr, argument.start)?;
        }
        'lines: for template in builtin.template {
            let mut text = (*template).to_string();
            for param in builtin.params {
                let placeholder = format!("{{{}}}", param.name);
                if text.contains(&placeholder) {
                    match values.get(param.name) {
                        Some(value) => text = text.replace(&placeholder, value),
                        None => continue 'lines,
                    }
                }
            }
            self.emit(text);
        }
        Ok(())
    }

    fn channel(&mut self, scope: &SymbolTable, argument: &SourceExpr) -> Result<String> {
        let offset = argument.start + argument.expr.offset;
        if !self.is_constant(scope, &argument.expr) {
            return Err(self.error(offset, "channel must be a compile-time constant"));
        }
        let value = self.evaluate_constant(&argument.expr, argument.start, &self.constants)?;
        match value.to_i64() {
            Ok(channel @ 0..=0xff) => Ok(channel.to_string()),
            _ => Err(self.error(offset, format!("invalid channel {value}"))),
        }
    }
}

fn comparison(op: BinaryOp) -> Option<&'static str> {
    Some(match op {
        BinaryOp::Eq => "CMPEQUAL",
        BinaryOp::Ne => "CMPNOTEQUAL",
        BinaryOp::Lt => "CMPLESS",
        BinaryOp::Gt => "CMPGREATER",
        BinaryOp::Ge => "CMPGE",
        BinaryOp::Le => "CMPLE",
        _ => return None,
    })
}

fn temporary_name(prefix: &str, index: usize) -> String {
    if prefix.is_empty() {
        format!("__temp_{index}")
    } else {
        format!("__{prefix}_temp_{index}")
    }
}

/// Join `var` fields, dropping empty trailing ones.
fn join_fields(fields: &[String]) -> String {
    let used = fields
        .iter()
        .rposition(|field| !field.is_empty())
        .map_or(1, |last| last + 1);
    fields[..used].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_fields() {
        let fields = |f: &[&str]| f.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(join_fields(&fields(&["0", "", "", ""])), "0");
        assert_eq!(join_fields(&fields(&["1", "", "us"])), "1, , us");
        assert_eq!(join_fields(&fields(&["x", "parameter", "", "AD9912_FRQ"])), "x, parameter, , AD9912_FRQ");
    }

    #[test]
    fn test_temporary_names() {
        assert_eq!(temporary_name("", 0), "__temp_0");
        assert_eq!(temporary_name("wait", 2), "__wait_temp_2");
    }

    #[test]
    fn test_comparison_mnemonics() {
        assert_eq!(comparison(BinaryOp::Ge), Some("CMPGE"));
        assert_eq!(comparison(BinaryOp::Add), None);
    }
}
