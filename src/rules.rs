use crate::args::{to_compact, to_expanded};
use crate::emit::Generator;
use crate::error::BlockError;
use crate::order::Order;
use crate::schema::{BlockSchema, Shape};
use crate::workspace::{ArgMode, Block};

pub const ARGS_FIELD: &str = "ARGS";

pub type NativeRule = fn(&mut Generator<'_>, &Block) -> Result<Emission, BlockError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    Statement(String),
    Expression(String, Order),
}

impl Emission {
    pub fn code(&self) -> &str {
        match self {
            Emission::Statement(code) | Emission::Expression(code, _) => code,
        }
    }

    pub fn shaped(shape: Shape, code: String, order: Order) -> Emission {
        match shape {
            Shape::Statement => Emission::Statement(code + "\n"),
            Shape::Expression | Shape::Hybrid => Emission::Expression(code, order),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgFallback {
    /// A blanked argument field emits an empty argument list.
    Blank,
    /// A blanked argument field emits the declared parameter names.
    ParamNames,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRule {
    pub callee: String,
    pub params: Vec<String>,
    /// Shows the compact argument field even when no parameters are declared.
    pub free_args: bool,
    pub fallback: ArgFallback,
}

impl CallRule {
    pub fn new(callee: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            callee: callee.into(),
            params,
            free_args: false,
            fallback: ArgFallback::Blank,
        }
    }

    pub fn has_arg_field(&self) -> bool {
        self.free_args || !self.params.is_empty()
    }

    /// Block schema for this call: the compact argument field seeded with the
    /// parameter names, then one optional socket per parameter.
    pub fn schema(&self, type_id: &str, shape: Shape) -> BlockSchema {
        let mut schema = BlockSchema::new(type_id, shape);
        if self.has_arg_field() {
            schema = schema.text(ARGS_FIELD, &self.params.join(", "));
        }
        for index in 0..self.params.len() {
            schema = schema.optional_value(&socket_slot(index));
        }
        schema
    }

    fn arguments(&self, gen: &mut Generator<'_>, block: &Block) -> Result<String, BlockError> {
        let mut sockets = Vec::with_capacity(self.params.len());
        for index in 0..self.params.len() {
            sockets.push(gen.value_opt(block, &socket_slot(index), Order::None)?);
        }

        if block.arg_mode == ArgMode::Expanded && !self.params.is_empty() {
            let values = self
                .params
                .iter()
                .enumerate()
                .map(|(index, param)| {
                    sockets[index].clone().unwrap_or_else(|| {
                        block
                            .field(&expanded_field(index))
                            .filter(|v| !v.trim().is_empty())
                            .unwrap_or(param)
                            .to_string()
                    })
                })
                .collect::<Vec<_>>();
            return Ok(to_compact(&values));
        }

        if !self.has_arg_field() {
            return Ok(String::new());
        }
        let raw = gen.field(block, ARGS_FIELD);
        let text = if raw.trim().is_empty() {
            match self.fallback {
                ArgFallback::Blank => String::new(),
                ArgFallback::ParamNames => self.params.join(", "),
            }
        } else {
            raw
        };
        if sockets.iter().all(Option::is_none) {
            return Ok(text);
        }
        let mut values = to_expanded(&text, &self.params);
        for (index, socket) in sockets.into_iter().enumerate() {
            if let Some(code) = socket {
                values[index] = code;
            }
        }
        Ok(to_compact(&values))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRule {
    pub receiver: String,
    pub method: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum EmitRule {
    Native(NativeRule),
    Call(CallRule),
    Method(MethodRule),
    Constant(String),
}

impl EmitRule {
    pub fn emit(
        &self,
        gen: &mut Generator<'_>,
        block: &Block,
        shape: Shape,
    ) -> Result<Emission, BlockError> {
        match self {
            EmitRule::Native(rule) => rule(gen, block),
            EmitRule::Call(call) => {
                let args = call.arguments(gen, block)?;
                let code = format!("{}({})", call.callee, args);
                Ok(Emission::shaped(shape, code, Order::FunctionCall))
            }
            EmitRule::Method(method) => {
                let receiver = gen.value(block, &method.receiver, Order::Member)?;
                let mut args = Vec::with_capacity(method.args.len());
                for slot in &method.args {
                    args.push(gen.value(block, slot, Order::None)?);
                }
                let code = format!("{}.{}({})", receiver, method.method, args.join(", "));
                Ok(Emission::shaped(shape, code, Order::FunctionCall))
            }
            EmitRule::Constant(text) => Ok(Emission::shaped(shape, text.clone(), Order::Atomic)),
        }
    }
}

pub fn socket_slot(index: usize) -> String {
    format!("IN{}", index)
}

pub fn expanded_field(index: usize) -> String {
    format!("ARG_{}", index)
}
