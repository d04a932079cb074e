use crate::emit::EmitOptions;
use crate::imports::sanitize_identifier;
use crate::palette::{hex_to_hue, Category};
use crate::registry::BlockRegistry;
use crate::rules::{ArgFallback, CallRule, EmitRule};
use crate::schema::Shape;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const MY_BLOCKS_CATEGORY: &str = "My Blocks";
pub const MY_BLOCKS_COLOUR: &str = "#8b5cf6";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomBlockDefinition {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default, alias = "bodyText")]
    pub body_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    MY_BLOCKS_COLOUR.to_string()
}

impl CustomBlockDefinition {
    pub fn safe_name(&self) -> String {
        safe_name(&self.name)
    }

    pub fn call_type_id(&self) -> String {
        format!("myblock_call_{}", self.safe_name())
    }

    pub fn expr_type_id(&self) -> String {
        format!("myblock_expr_{}", self.safe_name())
    }
}

pub fn safe_name(name: &str) -> String {
    let sanitized = sanitize_identifier(name);
    match sanitized.chars().next() {
        None => "_".to_string(),
        Some(first) if first.is_ascii_digit() => format!("_{}", sanitized),
        Some(_) => sanitized,
    }
}

pub fn load_custom_blocks(path: &Path) -> Result<Vec<CustomBlockDefinition>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read custom blocks '{}'.", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid custom block definitions in '{}'.", path.display()))
}

/// Registers the statement and expression callers for `definition` and returns
/// their type ids. Existing callers are left as they are.
pub fn register_custom_block(
    registry: &mut BlockRegistry,
    definition: &CustomBlockDefinition,
) -> [String; 2] {
    let safe = definition.safe_name();
    let call = CallRule {
        callee: safe.clone(),
        params: definition.params.clone(),
        free_args: false,
        fallback: ArgFallback::ParamNames,
    };
    let hue = hex_to_hue(&definition.color);
    let tooltip = if definition.description.trim().is_empty() {
        format!("Custom block: {}", safe)
    } else {
        definition.description.clone()
    };

    let ids = [definition.call_type_id(), definition.expr_type_id()];
    for (type_id, shape) in ids.iter().zip([Shape::Statement, Shape::Expression]) {
        let schema = call
            .schema(type_id, shape)
            .in_category(MY_BLOCKS_CATEGORY)
            .with_hue(hue)
            .with_tooltip(tooltip.clone());
        if !registry.register(schema, EmitRule::Call(call.clone())) {
            debug!(type_id = %type_id, "custom block caller already registered");
        }
    }
    ids
}

pub fn my_blocks_category(definitions: &[CustomBlockDefinition]) -> Category {
    let mut category = Category::new(MY_BLOCKS_CATEGORY, MY_BLOCKS_COLOUR);
    for definition in definitions {
        category.push(&definition.call_type_id());
        category.push(&definition.expr_type_id());
    }
    category
}

pub fn prologue(definitions: &[CustomBlockDefinition], options: &EmitOptions) -> String {
    let mut out = String::new();
    for definition in definitions {
        let body = if definition.body_code.trim().is_empty() {
            options.placeholder.as_str()
        } else {
            definition.body_code.as_str()
        };
        let body = body
            .lines()
            .map(|line| {
                if line.trim().is_empty() {
                    String::new()
                } else {
                    format!("{}{}", options.indent, line)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        out.push_str(&format!(
            "def {}({}):\n{}\n\n",
            definition.safe_name(),
            definition.params.join(", "),
            body
        ));
    }
    out
}

pub fn program_source(
    definitions: &[CustomBlockDefinition],
    code: &str,
    options: &EmitOptions,
) -> String {
    let mut source = prologue(definitions, options);
    source.push_str(code);
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::workspace_to_code;
    use crate::workspace::Workspace;

    fn double() -> CustomBlockDefinition {
        serde_json::from_str(r#"{"name": "double", "params": ["x"], "body_code": "return x * 2"}"#)
            .unwrap()
    }

    #[test]
    fn names_become_identifiers() {
        assert_eq!(safe_name("my block!"), "my_block_");
        assert_eq!(safe_name("2fast"), "_2fast");
        assert_eq!(safe_name("ok_name"), "ok_name");
    }

    #[test]
    fn blank_body_gets_the_placeholder() {
        let mut definition = double();
        definition.body_code = "   ".to_string();
        definition.params.push("y".to_string());
        assert_eq!(
            prologue(&[definition], &EmitOptions::default()),
            "def double(x, y):\n  pass\n\n"
        );
    }

    #[test]
    fn multi_line_bodies_keep_relative_indent() {
        let mut definition = double();
        definition.body_code = "if x:\n    return 1\n\nreturn 2".to_string();
        assert_eq!(
            prologue(&[definition], &EmitOptions::default()),
            "def double(x):\n  if x:\n      return 1\n\n  return 2\n\n"
        );
    }

    #[test]
    fn callers_fall_back_to_parameter_names() {
        let mut registry = BlockRegistry::new();
        let [call_id, expr_id] = register_custom_block(&mut registry, &double());
        assert_eq!(call_id, "myblock_call_double");
        assert_eq!(expr_id, "myblock_expr_double");
        let schema = &registry.lookup(&call_id).unwrap().schema;
        assert_eq!(schema.hue, Some(258));

        let mut ws = Workspace::new();
        let caller = ws.add_block(call_id.as_str());
        ws.set_field(caller, "ARGS", " ").unwrap();
        let code = workspace_to_code(&registry, &ws, &EmitOptions::default()).unwrap();
        assert_eq!(code, "double(x)\n");
    }

    #[test]
    fn registering_twice_keeps_one_pair() {
        let mut registry = BlockRegistry::new();
        register_custom_block(&mut registry, &double());
        register_custom_block(&mut registry, &double());
        assert_eq!(registry.len(), 2);
        let category = my_blocks_category(&[double(), double()]);
        assert_eq!(category.block_types.len(), 2);
        assert_eq!(category.colour, MY_BLOCKS_COLOUR);
    }
}
