//! Stack-based bytecode virtual machine.
//!
//! This module executes a loaded [`Program`]. It uses a simple
//! fetch-decode-execute loop over the flat instruction vector. All mutable
//! runtime state — frames, the data stack, the call stack, and the program
//! counter — lives here; `operators` and `io` are stateless helpers the VM
//! calls into.

use std::io::{BufRead, Write};

use crate::error::{Error, Result};
use crate::frame::{CallStack, DataStack, FrameStore};
use crate::io::InputReader;
use crate::operand::{Arg, VarRef};
use crate::operators;
use crate::opcode::Opcode;
use crate::program::{Instruction, Program};
use crate::value::{Slot, Value};

/// Either a concrete value or the `Undefined` marker of a declared-but-
/// unassigned variable. Only `TYPE` is allowed to see the latter.
enum Resolved {
    Value(Value),
    Undefined,
}

/// The virtual machine: frame store, stacks, and I/O endpoints.
pub struct Vm<R, W1, W2> {
    frames: FrameStore,
    data_stack: DataStack,
    call_stack: CallStack,
    input: InputReader<R>,
    stdout: W1,
    stderr: W2,
}

impl<R: BufRead, W1: Write, W2: Write> Vm<R, W1, W2> {
    pub fn new(input: R, stdout: W1, stderr: W2) -> Self {
        Self {
            frames: FrameStore::new(),
            data_stack: DataStack::new(),
            call_stack: CallStack::new(),
            input: InputReader::new(input),
            stdout,
            stderr,
        }
    }

    /// Execute `program` to completion. Returns the process exit code: `0`
    /// for falling off the end of the instruction vector, or the operand of
    /// an executed `EXIT`.
    pub fn run(&mut self, program: &Program) -> Result<i32> {
        let mut pc = 0usize;
        while pc < program.instructions.len() {
            let ins = &program.instructions[pc];
            tracing::trace!(pc, order = ins.order, opcode = ?ins.opcode, "dispatch");
            match self.step(program, ins, pc)? {
                Outcome::Continue(next) => pc = next,
                Outcome::Exit(code) => return Ok(code),
            }
        }
        Ok(0)
    }

    fn step(&mut self, program: &Program, ins: &Instruction, pc: usize) -> Result<Outcome> {
        use Opcode::*;
        let order = ins.order;
        let next = Outcome::Continue(pc + 1);

        match ins.opcode {
            CreateFrame => {
                self.frames.create_temporary();
                Ok(next)
            }
            PushFrame => {
                self.frames.push_frame(order)?;
                tracing::debug!(local_depth = self.frames.local_depth(), "pushframe");
                Ok(next)
            }
            PopFrame => {
                self.frames.pop_frame(order)?;
                tracing::debug!(local_depth = self.frames.local_depth(), "popframe");
                Ok(next)
            }
            Return => Ok(Outcome::Continue(self.call_stack.pop(order)?)),
            Break => {
                self.write_break(pc, ins);
                Ok(next)
            }

            DefVar => {
                self.frames.define(order, var_ref(&ins.args[0]))?;
                Ok(next)
            }
            Pops => {
                let value = self.data_stack.pop(order)?;
                self.frames.write(order, var_ref(&ins.args[0]), value)?;
                Ok(next)
            }
            Call => {
                let target = self.label_index(program, order, &ins.args[0])?;
                self.call_stack.push(pc + 1);
                Ok(Outcome::Continue(target))
            }
            Label => Ok(next),
            Jump => {
                let target = self.label_index(program, order, &ins.args[0])?;
                Ok(Outcome::Continue(target))
            }

            Pushs => {
                let value = self.resolve(order, &ins.args[0])?;
                self.data_stack.push(value);
                Ok(next)
            }
            Write => {
                let value = self.resolve(order, &ins.args[0])?;
                let _ = write!(self.stdout, "{value}");
                Ok(next)
            }
            Exit => {
                let value = self.resolve(order, &ins.args[0])?;
                let code = value.as_int().ok_or_else(|| Error::TypeError {
                    order,
                    message: format!("EXIT requires int, found {}", value.type_name()),
                })?;
                if !(0..=49).contains(&code) {
                    return Err(Error::BadValue {
                        order,
                        message: format!("exit code {code} is outside 0..=49"),
                    });
                }
                Ok(Outcome::Exit(code as i32))
            }
            DPrint => {
                let value = self.resolve(order, &ins.args[0])?;
                let _ = writeln!(self.stderr, "{value}");
                Ok(next)
            }

            Move => {
                let value = self.resolve(order, &ins.args[1])?;
                self.frames.write(order, var_ref(&ins.args[0]), value)?;
                Ok(next)
            }
            Int2Char => {
                let code = self.resolve(order, &ins.args[1])?;
                let code = code.as_int().ok_or_else(|| Error::TypeError {
                    order,
                    message: format!("INT2CHAR requires int, found {}", code.type_name()),
                })?;
                let ch = u32::try_from(code)
                    .ok()
                    .filter(|c| (1..=255).contains(c))
                    .and_then(char::from_u32)
                    .ok_or_else(|| Error::StringError {
                        order,
                        message: format!("{code} is not a valid character code in 1..=255"),
                    })?;
                self.frames
                    .write(order, var_ref(&ins.args[0]), Value::Str(ch.to_string()))?;
                Ok(next)
            }
            Strlen => {
                let s = self.resolve(order, &ins.args[1])?;
                let s = s.as_str().ok_or_else(|| Error::TypeError {
                    order,
                    message: format!("STRLEN requires string, found {}", s.type_name()),
                })?;
                let len = s.chars().count() as i64;
                self.frames.write(order, var_ref(&ins.args[0]), Value::Int(len))?;
                Ok(next)
            }
            Type => {
                let name = match self.resolve_any(order, &ins.args[1])? {
                    Resolved::Value(v) => v.type_name(),
                    Resolved::Undefined => "",
                };
                self.frames
                    .write(order, var_ref(&ins.args[0]), Value::Str(name.to_string()))?;
                Ok(next)
            }
            Read => {
                let kind = type_literal(&ins.args[1]);
                let value = self.input.read_typed(kind);
                self.frames.write(order, var_ref(&ins.args[0]), value)?;
                Ok(next)
            }
            Not => {
                let a = self.resolve(order, &ins.args[1])?;
                let result = operators::not(order, &a)?;
                self.frames.write(order, var_ref(&ins.args[0]), result)?;
                Ok(next)
            }

            Add | Sub | Mul | Idiv => {
                let a = self.resolve(order, &ins.args[1])?;
                let b = self.resolve(order, &ins.args[2])?;
                let result = match ins.opcode {
                    Add => operators::add(order, &a, &b),
                    Sub => operators::sub(order, &a, &b),
                    Mul => operators::mul(order, &a, &b),
                    Idiv => operators::idiv(order, &a, &b),
                    _ => unreachable!(),
                }?;
                self.frames.write(order, var_ref(&ins.args[0]), result)?;
                Ok(next)
            }
            Lt | Gt | Eq => {
                let a = self.resolve(order, &ins.args[1])?;
                let b = self.resolve(order, &ins.args[2])?;
                let result = match ins.opcode {
                    Lt => operators::less_than(order, &a, &b),
                    Gt => operators::greater_than(order, &a, &b),
                    Eq => operators::equal(order, &a, &b),
                    _ => unreachable!(),
                }?;
                self.frames.write(order, var_ref(&ins.args[0]), Value::Bool(result))?;
                Ok(next)
            }
            Or | And => {
                let a = self.resolve(order, &ins.args[1])?;
                let b = self.resolve(order, &ins.args[2])?;
                let result = match ins.opcode {
                    Or => operators::or(order, &a, &b),
                    And => operators::and(order, &a, &b),
                    _ => unreachable!(),
                }?;
                self.frames.write(order, var_ref(&ins.args[0]), result)?;
                Ok(next)
            }

            Stri2Int => {
                let s = self.resolve(order, &ins.args[1])?;
                let s = s.as_str().ok_or_else(|| Error::TypeError {
                    order,
                    message: format!("STRI2INT requires string, found {}", s.type_name()),
                })?;
                let i = self.resolve(order, &ins.args[2])?;
                let i = i.as_int().ok_or_else(|| Error::TypeError {
                    order,
                    message: format!("STRI2INT requires int index, found {}", i.type_name()),
                })?;
                let ch = index_char(s, i).ok_or_else(|| Error::StringError {
                    order,
                    message: format!("index {i} is out of range for a {}-scalar string", s.chars().count()),
                })?;
                self.frames
                    .write(order, var_ref(&ins.args[0]), Value::Int(ch as i64))?;
                Ok(next)
            }
            Concat => {
                let a = self.resolve(order, &ins.args[1])?;
                let b = self.resolve(order, &ins.args[2])?;
                let result = operators::concat(order, &a, &b)?;
                self.frames.write(order, var_ref(&ins.args[0]), result)?;
                Ok(next)
            }
            GetChar => {
                let s = self.resolve(order, &ins.args[1])?;
                let s = s.as_str().ok_or_else(|| Error::TypeError {
                    order,
                    message: format!("GETCHAR requires string, found {}", s.type_name()),
                })?;
                let i = self.resolve(order, &ins.args[2])?;
                let i = i.as_int().ok_or_else(|| Error::TypeError {
                    order,
                    message: format!("GETCHAR requires int index, found {}", i.type_name()),
                })?;
                let ch = index_char(s, i).ok_or_else(|| Error::StringError {
                    order,
                    message: format!("index {i} is out of range for a {}-scalar string", s.chars().count()),
                })?;
                self.frames
                    .write(order, var_ref(&ins.args[0]), Value::Str(ch.to_string()))?;
                Ok(next)
            }
            SetChar => {
                let target_ref = var_ref(&ins.args[0]).clone();
                let current = self.frames.read(order, &target_ref)?;
                let target = match current {
                    Slot::Value(Value::Str(s)) => s.clone(),
                    Slot::Undefined => {
                        return Err(Error::MissingValue {
                            order,
                            message: "SETCHAR target is undefined".to_string(),
                        })
                    }
                    Slot::Value(other) => {
                        return Err(Error::TypeError {
                            order,
                            message: format!("SETCHAR target must be string, found {}", other.type_name()),
                        })
                    }
                };
                let i = self.resolve(order, &ins.args[1])?;
                let i = i.as_int().ok_or_else(|| Error::TypeError {
                    order,
                    message: format!("SETCHAR requires int index, found {}", i.type_name()),
                })?;
                let replacement = self.resolve(order, &ins.args[2])?;
                let replacement = replacement.as_str().ok_or_else(|| Error::TypeError {
                    order,
                    message: format!("SETCHAR requires string replacement, found {}", replacement.type_name()),
                })?;
                let first = replacement.chars().next().ok_or_else(|| Error::StringError {
                    order,
                    message: "SETCHAR replacement string is empty".to_string(),
                })?;
                let mut chars: Vec<char> = target.chars().collect();
                let idx = usize::try_from(i)
                    .ok()
                    .filter(|idx| *idx < chars.len())
                    .ok_or_else(|| Error::StringError {
                        order,
                        message: format!("index {i} is out of range for a {}-scalar string", chars.len()),
                    })?;
                chars[idx] = first;
                let updated: String = chars.into_iter().collect();
                self.frames.write(order, &target_ref, Value::Str(updated))?;
                Ok(next)
            }

            JumpIfEq | JumpIfNeq => {
                let target = self.label_index(program, order, &ins.args[0])?;
                let a = self.resolve(order, &ins.args[1])?;
                let b = self.resolve(order, &ins.args[2])?;
                let equal = operators::equal(order, &a, &b)?;
                let take = if ins.opcode == JumpIfEq { equal } else { !equal };
                Ok(if take { Outcome::Continue(target) } else { next })
            }
        }
    }

    fn resolve_any(&self, order: u32, arg: &Arg) -> Result<Resolved> {
        match arg {
            Arg::Immediate(v) => Ok(Resolved::Value(v.clone())),
            Arg::Var(var_ref) => match self.frames.read(order, var_ref)? {
                Slot::Value(v) => Ok(Resolved::Value(v.clone())),
                Slot::Undefined => Ok(Resolved::Undefined),
            },
            _ => unreachable!("only SYMB slots are resolved to values"),
        }
    }

    fn resolve(&self, order: u32, arg: &Arg) -> Result<Value> {
        match self.resolve_any(order, arg)? {
            Resolved::Value(v) => Ok(v),
            Resolved::Undefined => Err(Error::MissingValue {
                order,
                message: "read of an undefined variable".to_string(),
            }),
        }
    }

    fn label_index(&self, program: &Program, order: u32, arg: &Arg) -> Result<usize> {
        let name = label_name(arg);
        program.labels.get(name).copied().ok_or_else(|| {
            Error::SemanticError(format!("instruction {order}: undefined label `{name}`"))
        })
    }

    fn write_break(&mut self, pc: usize, ins: &Instruction) {
        let counts = self.frames.variable_counts();
        let _ = writeln!(
            self.stderr,
            "-- BREAK at instruction {} (pc={pc}): global={}, temporary={:?}, local_top={:?}, local_depth={} --",
            ins.order, counts.global, counts.temporary, counts.local_top, counts.local_depth
        );
    }
}

enum Outcome {
    Continue(usize),
    Exit(i32),
}

fn var_ref(arg: &Arg) -> &VarRef {
    match arg {
        Arg::Var(v) => v,
        _ => unreachable!("loader guarantees a Var slot here"),
    }
}

fn label_name(arg: &Arg) -> &str {
    match arg {
        Arg::Label(name) => name,
        _ => unreachable!("loader guarantees a Label slot here"),
    }
}

fn type_literal(arg: &Arg) -> &str {
    match arg {
        Arg::Type(name) => name,
        _ => unreachable!("loader guarantees a Type slot here"),
    }
}

/// `GETCHAR`/`STRI2INT` share this index rule: `0 <= i < length(s)`.
fn index_char(s: &str, i: i64) -> Option<char> {
    usize::try_from(i).ok().and_then(|i| s.chars().nth(i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program;
    use pretty_assertions::assert_eq;

    fn run(doc: &str, stdin: &str) -> Result<(i32, String, String)> {
        let program = program::load(doc)?;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = {
            let mut vm = Vm::new(stdin.as_bytes(), &mut stdout, &mut stderr);
            vm.run(&program)?
        };
        Ok((code, String::from_utf8(stdout).unwrap(), String::from_utf8(stderr).unwrap()))
    }

    fn wrap(body: &str) -> String {
        format!(r#"<program language="IPPcode23">{body}</program>"#)
    }

    #[test]
    fn idiv_by_zero_exits_fifty_seven() {
        let doc = wrap(
            r#"
            <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@x</arg1></instruction>
            <instruction order="2" opcode="IDIV">
                <arg1 type="var">GF@x</arg1>
                <arg2 type="int">1</arg2>
                <arg3 type="int">0</arg3>
            </instruction>
            "#,
        );
        assert_eq!(run(&doc, "").unwrap_err().exit_code(), 57);
    }

    #[test]
    fn exit_boundary_values() {
        let exit = |code: i64| {
            wrap(&format!(
                r#"<instruction order="1" opcode="EXIT"><arg1 type="int">{code}</arg1></instruction>"#
            ))
        };
        assert_eq!(run(&exit(0), "").unwrap().0, 0);
        assert_eq!(run(&exit(49), "").unwrap().0, 49);
        assert_eq!(run(&exit(-1), "").unwrap_err().exit_code(), 57);
        assert_eq!(run(&exit(50), "").unwrap_err().exit_code(), 57);
    }

    #[test]
    fn getchar_out_of_range_is_string_error() {
        let doc = wrap(
            r#"
            <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@c</arg1></instruction>
            <instruction order="2" opcode="GETCHAR">
                <arg1 type="var">GF@c</arg1>
                <arg2 type="string">hi</arg2>
                <arg3 type="int">2</arg3>
            </instruction>
            "#,
        );
        assert_eq!(run(&doc, "").unwrap_err().exit_code(), 58);
    }

    #[test]
    fn setchar_with_empty_replacement_is_string_error() {
        let doc = wrap(
            r#"
            <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@s</arg1></instruction>
            <instruction order="2" opcode="MOVE">
                <arg1 type="var">GF@s</arg1>
                <arg2 type="string">hi</arg2>
            </instruction>
            <instruction order="3" opcode="SETCHAR">
                <arg1 type="var">GF@s</arg1>
                <arg2 type="int">0</arg2>
                <arg3 type="string"></arg3>
            </instruction>
            "#,
        );
        assert_eq!(run(&doc, "").unwrap_err().exit_code(), 58);
    }

    #[test]
    fn stri2int_and_getchar_agree_at_index_zero() {
        let doc = wrap(
            r#"
            <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@n</arg1></instruction>
            <instruction order="2" opcode="STRI2INT">
                <arg1 type="var">GF@n</arg1>
                <arg2 type="string">hi</arg2>
                <arg3 type="int">0</arg3>
            </instruction>
            <instruction order="3" opcode="WRITE"><arg1 type="var">GF@n</arg1></instruction>
            "#,
        );
        let (code, stdout, _) = run(&doc, "").unwrap();
        assert_eq!(code, 0);
        assert_eq!(stdout, (u32::from('h')).to_string());
    }

    #[test]
    fn pushs_pops_round_trips_a_value() {
        let doc = wrap(
            r#"
            <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@x</arg1></instruction>
            <instruction order="2" opcode="PUSHS"><arg1 type="int">7</arg1></instruction>
            <instruction order="3" opcode="POPS"><arg1 type="var">GF@x</arg1></instruction>
            <instruction order="4" opcode="WRITE"><arg1 type="var">GF@x</arg1></instruction>
            "#,
        );
        assert_eq!(run(&doc, "").unwrap(), (0, "7".to_string(), String::new()));
    }

    #[test]
    fn pops_on_empty_stack_is_missing_value() {
        let doc = wrap(
            r#"
            <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@x</arg1></instruction>
            <instruction order="2" opcode="POPS"><arg1 type="var">GF@x</arg1></instruction>
            "#,
        );
        assert_eq!(run(&doc, "").unwrap_err().exit_code(), 56);
    }

    #[test]
    fn call_and_return_round_trip_the_program_counter() {
        let doc = wrap(
            r#"
            <instruction order="1" opcode="CALL"><arg1 type="label">fn</arg1></instruction>
            <instruction order="2" opcode="WRITE"><arg1 type="string">after</arg1></instruction>
            <instruction order="3" opcode="JUMP"><arg1 type="label">end</arg1></instruction>
            <instruction order="4" opcode="LABEL"><arg1 type="label">fn</arg1></instruction>
            <instruction order="5" opcode="WRITE"><arg1 type="string">in-fn</arg1></instruction>
            <instruction order="6" opcode="RETURN"></instruction>
            <instruction order="7" opcode="LABEL"><arg1 type="label">end</arg1></instruction>
            "#,
        );
        assert_eq!(run(&doc, "").unwrap(), (0, "in-fnafter".to_string(), String::new()));
    }

    #[test]
    fn jumpifeq_and_jumpifneq_target_a_label_operand() {
        let doc = wrap(
            r#"
            <instruction order="1" opcode="JUMPIFNEQ">
                <arg1 type="label">skip</arg1>
                <arg2 type="int">1</arg2>
                <arg3 type="int">2</arg3>
            </instruction>
            <instruction order="2" opcode="WRITE"><arg1 type="string">unreached</arg1></instruction>
            <instruction order="3" opcode="LABEL"><arg1 type="label">skip</arg1></instruction>
            <instruction order="4" opcode="WRITE"><arg1 type="string">reached</arg1></instruction>
            "#,
        );
        assert_eq!(run(&doc, "").unwrap(), (0, "reached".to_string(), String::new()));
    }

    #[test]
    fn type_of_undefined_variable_writes_empty_string() {
        let doc = wrap(
            r#"
            <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@x</arg1></instruction>
            <instruction order="2" opcode="DEFVAR"><arg1 type="var">GF@t</arg1></instruction>
            <instruction order="3" opcode="TYPE">
                <arg1 type="var">GF@t</arg1>
                <arg2 type="var">GF@x</arg2>
            </instruction>
            <instruction order="4" opcode="WRITE"><arg1 type="var">GF@t</arg1></instruction>
            "#,
        );
        assert_eq!(run(&doc, "").unwrap(), (0, String::new(), String::new()));
    }
}
