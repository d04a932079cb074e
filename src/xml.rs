use crate::error::BlockError;
use crate::registry::BlockRegistry;
use crate::schema::SlotKind;
use crate::workspace::{ArgMode, Block, BlockId, Link, Workspace};
use xmltree::{Element, EmitterConfig, XMLNode};

/// Serializes every top-level stack. The registry decides whether an input is
/// written as `<value>` or `<statement>`; unknown slots are written as values.
pub fn graph_to_text(
    workspace: &Workspace,
    registry: &BlockRegistry,
) -> Result<String, BlockError> {
    let mut root = Element::new("xml");
    for id in workspace.top_blocks() {
        let element = block_element(workspace, registry, id, true)?;
        root.children.push(XMLNode::Element(element));
    }

    let mut out = Vec::new();
    let config = EmitterConfig::new()
        .perform_indent(true)
        .write_document_declaration(false);
    root.write_with_config(&mut out, config)
        .map_err(|e| BlockError::Xml(e.to_string()))?;
    String::from_utf8(out).map_err(|e| BlockError::Xml(e.to_string()))
}

/// Rebuilds a workspace from Blockly XML. Block types are not checked against a
/// registry; unknown types load fine and fail later at emission.
pub fn text_to_graph(text: &str) -> Result<Workspace, BlockError> {
    let root = Element::parse(text.as_bytes()).map_err(|e| BlockError::Xml(e.to_string()))?;
    let mut workspace = Workspace::new();
    for element in child_elements(&root) {
        if is_block(element) {
            load_block(&mut workspace, element)?;
        }
    }
    Ok(workspace)
}

fn block_element(
    workspace: &Workspace,
    registry: &BlockRegistry,
    id: BlockId,
    top_level: bool,
) -> Result<Element, BlockError> {
    let block = workspace.get(id)?;
    let mut element = Element::new("block");
    element
        .attributes
        .insert("type".to_string(), block.type_id.clone());
    element.attributes.insert("id".to_string(), id.0.to_string());
    if top_level {
        if let Some((x, y)) = block.position {
            element.attributes.insert("x".to_string(), x.to_string());
            element.attributes.insert("y".to_string(), y.to_string());
        }
    }

    if block.arg_mode == ArgMode::Expanded {
        let mut mutation = Element::new("mutation");
        mutation
            .attributes
            .insert("expanded".to_string(), "true".to_string());
        element.children.push(XMLNode::Element(mutation));
    }

    for (name, value) in &block.fields {
        let mut field = Element::new("field");
        field.attributes.insert("name".to_string(), name.clone());
        field.children.push(XMLNode::Text(value.clone()));
        element.children.push(XMLNode::Element(field));
    }

    for (slot, child) in &block.inputs {
        let tag = if is_statement_slot(registry, block, slot) {
            "statement"
        } else {
            "value"
        };
        let mut input = Element::new(tag);
        input.attributes.insert("name".to_string(), slot.clone());
        let nested = block_element(workspace, registry, *child, false)?;
        input.children.push(XMLNode::Element(nested));
        element.children.push(XMLNode::Element(input));
    }

    if let Some(next) = block.next {
        let mut wrapper = Element::new("next");
        let nested = block_element(workspace, registry, next, false)?;
        wrapper.children.push(XMLNode::Element(nested));
        element.children.push(XMLNode::Element(wrapper));
    }
    Ok(element)
}

fn is_statement_slot(registry: &BlockRegistry, block: &Block, slot: &str) -> bool {
    registry
        .lookup(&block.type_id)
        .ok()
        .and_then(|d| d.schema.slot(slot))
        .map(|s| s.kind == SlotKind::Statement)
        .unwrap_or(false)
}

fn load_block(workspace: &mut Workspace, element: &Element) -> Result<BlockId, BlockError> {
    let Some(type_id) = element.attributes.get("type") else {
        return Err(BlockError::Xml("block element without a type attribute".to_string()));
    };
    let id = workspace.add_block(type_id.clone());
    if let (Some(x), Some(y)) = (coordinate(element, "x"), coordinate(element, "y")) {
        workspace.set_position(id, x, y)?;
    }

    for child in child_elements(element) {
        match child.name.as_str() {
            "mutation" => {
                if child.attributes.get("expanded").map(String::as_str) == Some("true") {
                    workspace.get_mut(id)?.arg_mode = ArgMode::Expanded;
                }
            }
            "field" => {
                let Some(name) = child.attributes.get("name") else {
                    continue;
                };
                let value = child.get_text().map(|t| t.into_owned()).unwrap_or_default();
                workspace.set_field(id, name.clone(), value)?;
            }
            "value" | "statement" => {
                let Some(name) = child.attributes.get("name") else {
                    continue;
                };
                if let Some(nested) = nested_block(child) {
                    let nested = load_block(workspace, nested)?;
                    workspace.attach(id, Link::Input(name.clone()), nested)?;
                }
            }
            "next" => {
                if let Some(nested) = nested_block(child) {
                    let nested = load_block(workspace, nested)?;
                    workspace.attach(id, Link::Next, nested)?;
                }
            }
            _ => {}
        }
    }
    Ok(id)
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(e) => Some(e),
        _ => None,
    })
}

fn is_block(element: &Element) -> bool {
    element.name == "block" || element.name == "shadow"
}

fn nested_block(element: &Element) -> Option<&Element> {
    child_elements(element)
        .find(|e| e.name == "block")
        .or_else(|| child_elements(element).find(|e| e.name == "shadow"))
}

fn coordinate(element: &Element, name: &str) -> Option<i64> {
    let value: f64 = element.attributes.get(name)?.trim().parse().ok()?;
    value.is_finite().then(|| value.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{workspace_to_code, EmitOptions};

    const SAMPLE: &str = r#"<xml xmlns="https://developers.google.com/blockly/xml">
  <block type="python_while" id="w" x="20" y="40">
    <value name="CONDITION">
      <shadow type="python_boolean"><field name="BOOL">False</field></shadow>
      <block type="python_boolean"><field name="BOOL">True</field></block>
    </value>
    <statement name="DO">
      <block type="python_print">
        <value name="VALUE">
          <block type="python_string"><field name="TEXT">hi</field></block>
        </value>
        <next><block type="python_break"></block></next>
      </block>
    </statement>
  </block>
  <block type="python_comment" x="0" y="5"><field name="TEXT">first</field></block>
</xml>"#;

    #[test]
    fn loads_blockly_xml() {
        let registry = BlockRegistry::with_builtins();
        let workspace = text_to_graph(SAMPLE).unwrap();
        assert_eq!(workspace.len(), 6);
        let code = workspace_to_code(&registry, &workspace, &EmitOptions::default()).unwrap();
        assert_eq!(code, "# first\n\nwhile True:\n  print(\"hi\")\n  break\n");
    }

    #[test]
    fn saved_text_loads_back_to_the_same_program() {
        let registry = BlockRegistry::with_builtins();
        let workspace = text_to_graph(SAMPLE).unwrap();
        let text = graph_to_text(&workspace, &registry).unwrap();
        assert!(text.contains("<statement name=\"DO\">"));
        let reloaded = text_to_graph(&text).unwrap();
        let options = EmitOptions::default();
        assert_eq!(
            workspace_to_code(&registry, &reloaded, &options).unwrap(),
            workspace_to_code(&registry, &workspace, &options).unwrap()
        );
    }

    #[test]
    fn expanded_mode_survives_a_round_trip() {
        let registry = BlockRegistry::with_builtins();
        let mut workspace = Workspace::new();
        let call = workspace.add_block("python_builtin_pow");
        crate::args::toggle_arg_mode(&mut workspace, &registry, call).unwrap();
        let text = graph_to_text(&workspace, &registry).unwrap();
        let reloaded = text_to_graph(&text).unwrap();
        let block = reloaded.iter().next().unwrap();
        assert_eq!(block.arg_mode, ArgMode::Expanded);
        assert_eq!(block.field("ARG_1"), Some("exp"));
    }

    #[test]
    fn blocks_need_a_type() {
        let err = text_to_graph("<xml><block id=\"a\"/></xml>").unwrap_err();
        assert!(matches!(err, BlockError::Xml(_)));
        assert!(matches!(text_to_graph("<xml><block"), Err(BlockError::Xml(_))));
    }
}
