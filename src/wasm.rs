use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub fn generate_python(
    workspace_xml: &str,
    custom_blocks_json: &str,
    imports_json: &str,
) -> Result<String, JsValue> {
    crate::generate_python(workspace_xml, custom_blocks_json, imports_json)
        .map_err(|e| JsValue::from_str(&format!("{:#}", e)))
}

#[wasm_bindgen]
pub fn categories_json(custom_blocks_json: &str, imports_json: &str) -> Result<String, JsValue> {
    let mut toolbox = crate::Toolbox::new(crate::imports::SynthesisLimits::default());
    if !custom_blocks_json.trim().is_empty() {
        let definitions = serde_json::from_str(custom_blocks_json)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        toolbox.add_custom_blocks(definitions);
    }
    if !imports_json.trim().is_empty() {
        let modules = crate::imports::parse_descriptors(imports_json)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        toolbox.add_imports(modules);
    }
    serde_json::to_string(&toolbox.categories()).map_err(|e| JsValue::from_str(&e.to_string()))
}
