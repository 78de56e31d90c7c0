//! Program loader / validator.
//!
//! Consumes the element tree produced by [`crate::document`] and produces an
//! ordered instruction vector plus a label index, or a typed error. This is
//! the only module that inspects the raw tree shape; everything downstream
//! (the VM) works against [`Instruction`]/[`Arg`] values that are already
//! known to be well-formed.

use std::collections::HashMap;

use crate::document::Element;
use crate::error::{Error, Result};
use crate::opcode::{Opcode, Slot};
use crate::operand::{parse_arg, Arg};

/// One loaded instruction: its opcode, source `order` (kept for error
/// messages), and its resolved arguments in slot order.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub order: u32,
    pub args: Vec<Arg>,
}

/// The ordered instruction vector and label index the executor steps over.
#[derive(Debug, Clone)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub labels: HashMap<String, usize>,
}

impl Program {
    fn empty() -> Self {
        Program {
            instructions: Vec::new(),
            labels: HashMap::new(),
        }
    }
}

/// Load and validate a program document into a [`Program`].
pub fn load(source: &str) -> Result<Program> {
    let Some(root) = crate::document::parse(source)? else {
        return Ok(Program::empty());
    };

    if root.tag != "program" {
        return Err(Error::BadStructure(format!(
            "root element must be `program`, found `{}`",
            root.tag
        )));
    }
    if root.attr("language") != Some("IPPcode23") {
        return Err(Error::BadStructure(
            "root element must carry language=\"IPPcode23\"".to_string(),
        ));
    }

    let mut raw: Vec<(u32, &Element)> = Vec::with_capacity(root.children.len());
    let mut seen_orders = std::collections::HashSet::new();

    for child in &root.children {
        if child.tag != "instruction" {
            return Err(Error::BadStructure(format!(
                "program children must be `instruction`, found `{}`",
                child.tag
            )));
        }
        let order: u32 = child
            .attr("order")
            .ok_or_else(|| Error::BadStructure("instruction missing `order` attribute".to_string()))?
            .parse()
            .map_err(|_| Error::BadStructure("`order` must be a positive integer".to_string()))?;
        if order == 0 {
            return Err(Error::BadStructure("`order` must be positive".to_string()));
        }
        if !seen_orders.insert(order) {
            return Err(Error::BadStructure(format!("duplicate instruction order {order}")));
        }
        raw.push((order, child));
    }

    raw.sort_by_key(|(order, _)| *order);

    let mut instructions = Vec::with_capacity(raw.len());
    for (order, el) in raw {
        instructions.push(load_instruction(order, el)?);
    }

    let mut labels = HashMap::new();
    for (index, ins) in instructions.iter().enumerate() {
        if ins.opcode == Opcode::Label {
            let name = match &ins.args[0] {
                Arg::Label(name) => name.clone(),
                _ => unreachable!("LABEL's sole slot is always a Label arg"),
            };
            if labels.insert(name.clone(), index).is_some() {
                return Err(Error::SemanticError(format!("duplicate label `{name}`")));
            }
        }
    }

    Ok(Program { instructions, labels })
}

fn load_instruction(order: u32, el: &Element) -> Result<Instruction> {
    let opcode_name = el
        .attr("opcode")
        .ok_or_else(|| Error::BadStructure(format!("instruction {order} missing `opcode`")))?;
    let opcode: Opcode = opcode_name
        .parse()
        .map_err(|_| Error::BadStructure(format!("instruction {order}: unknown opcode `{opcode_name}`")))?;

    let slots = opcode.slots();

    for child in &el.children {
        if !matches!(child.tag.as_str(), "arg1" | "arg2" | "arg3") {
            return Err(Error::BadStructure(format!(
                "instruction {order}: unexpected child `{}`",
                child.tag
            )));
        }
    }
    if el.children.len() != slots.len() {
        return Err(Error::BadStructure(format!(
            "instruction {order}: `{opcode_name}` expects {} argument(s), found {}",
            slots.len(),
            el.children.len()
        )));
    }

    let mut sorted_args = el.children.clone();
    sorted_args.sort_by(|a, b| a.tag.cmp(&b.tag));

    for (i, arg_el) in sorted_args.iter().enumerate() {
        let expected_tag = format!("arg{}", i + 1);
        if arg_el.tag != expected_tag {
            return Err(Error::BadStructure(format!(
                "instruction {order}: expected `{expected_tag}`, found `{}`",
                arg_el.tag
            )));
        }
    }

    let mut args = Vec::with_capacity(slots.len());
    for (slot, arg_el) in slots.iter().zip(sorted_args.iter()) {
        let declared_type = arg_el
            .attr("type")
            .ok_or_else(|| Error::BadStructure(format!("instruction {order}: argument missing `type`")))?;
        if !slot_accepts(*slot, declared_type) {
            return Err(Error::BadStructure(format!(
                "instruction {order}: argument of type `{declared_type}` is not valid here"
            )));
        }
        let arg = parse_arg(declared_type, &arg_el.text)
            .map_err(|msg| Error::BadStructure(format!("instruction {order}: {msg}")))?;
        args.push(arg);
    }

    Ok(Instruction { opcode, order, args })
}

fn slot_accepts(slot: Slot, declared_type: &str) -> bool {
    match slot {
        Slot::Var => declared_type == "var",
        Slot::Label => declared_type == "label",
        Slot::Type => declared_type == "type",
        Slot::Symb => matches!(declared_type, "var" | "int" | "string" | "bool" | "nil"),
    }
}
