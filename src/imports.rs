use crate::palette::{hash_hue, hue_to_hex, Category};
use crate::registry::BlockRegistry;
use crate::rules::{ArgFallback, CallRule, EmitRule};
use crate::schema::{BlockSchema, Shape};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

pub const DEFAULT_STATEMENT_CALL_LIMIT: usize = 20;
pub const DEFAULT_CONSTANT_LIMIT: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisLimits {
    /// Functions that also get a statement-shaped call block.
    pub statement_calls: usize,
    pub constants: usize,
}

impl Default for SynthesisLimits {
    fn default() -> Self {
        Self {
            statement_calls: DEFAULT_STATEMENT_CALL_LIMIT,
            constants: DEFAULT_CONSTANT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    #[serde(default, alias = "parameterNames")]
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    #[serde(default)]
    pub methods: Vec<FunctionDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantDescriptor {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedModuleDescriptor {
    #[serde(alias = "moduleName")]
    pub name: String,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub functions: Vec<FunctionDescriptor>,
    #[serde(default)]
    pub classes: Vec<ClassDescriptor>,
    #[serde(default)]
    pub constants: Vec<ConstantDescriptor>,
}

fn default_available() -> bool {
    true
}

impl ImportedModuleDescriptor {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.classes.is_empty() && self.constants.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorFile {
    List(Vec<ImportedModuleDescriptor>),
    Response { imports: Vec<ImportedModuleDescriptor> },
}

/// Reads descriptors from a JSON file holding either a bare list or a scanner
/// response object with an `imports` list.
pub fn load_descriptors(path: &Path) -> Result<Vec<ImportedModuleDescriptor>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import descriptors '{}'.", path.display()))?;
    parse_descriptors(&text)
        .with_context(|| format!("Invalid import descriptors in '{}'.", path.display()))
}

pub fn parse_descriptors(text: &str) -> Result<Vec<ImportedModuleDescriptor>> {
    Ok(match serde_json::from_str(text)? {
        DescriptorFile::List(list) => list,
        DescriptorFile::Response { imports } => imports,
    })
}

pub fn sanitize_identifier(text: &str) -> String {
    static NON_IDENT: OnceLock<Option<Regex>> = OnceLock::new();
    match NON_IDENT.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").ok()) {
        Some(re) => re.replace_all(text, "_").into_owned(),
        None => text.to_string(),
    }
}

pub fn function_type_id(module: &str, function: &str) -> String {
    sanitize_identifier(&format!("import_{}_{}", module, function))
}

pub fn statement_type_id(module: &str, function: &str) -> String {
    sanitize_identifier(&format!("import_{}_{}_stmt", module, function))
}

pub fn constant_type_id(module: &str, constant: &str) -> String {
    sanitize_identifier(&format!("import_{}_const_{}", module, constant))
}

/// Registers call, constructor and constant blocks for `module` and returns its
/// palette category. Block types that already exist are reused as they are.
pub fn synthesize_module(
    registry: &mut BlockRegistry,
    module: &ImportedModuleDescriptor,
    limits: SynthesisLimits,
) -> Category {
    let name = module.name.as_str();
    let mut category = Category::new(name, hue_to_hex(hash_hue(name)));
    let mut added = 0usize;

    for function in &module.functions {
        let call = module_call(name, &function.name, &function.params, false);
        let base = function_type_id(name, &function.name);
        let (type_id, new) = register_call(registry, base, call, Shape::Expression, name);
        added += usize::from(new);
        category.push(&type_id);
    }

    for function in module.functions.iter().take(limits.statement_calls) {
        let call = module_call(name, &function.name, &function.params, false);
        let base = statement_type_id(name, &function.name);
        let (type_id, new) = register_call(registry, base, call, Shape::Statement, name);
        added += usize::from(new);
        category.push(&type_id);
    }

    for class in &module.classes {
        let call = module_call(name, &class.name, &[], true);
        let base = function_type_id(name, &class.name);
        let (type_id, new) = register_call(registry, base, call, Shape::Expression, name);
        added += usize::from(new);
        category.push(&type_id);
    }

    for constant in module.constants.iter().take(limits.constants) {
        let text = format!("{}.{}", name, constant.name);
        let base = constant_type_id(name, &constant.name);
        let type_id = claim_type_id(registry, base, &text, Shape::Expression);
        let schema = BlockSchema::expression(type_id.as_str())
            .in_category(name)
            .with_hue(hash_hue(name))
            .with_tooltip(text.clone());
        added += usize::from(registry.register(schema, EmitRule::Constant(text)));
        category.push(&type_id);
    }

    info!(
        module = name,
        blocks = category.block_types.len(),
        new = added,
        "synthesized import blocks"
    );
    category
}

pub fn synthesize_scan(
    registry: &mut BlockRegistry,
    modules: &[ImportedModuleDescriptor],
    limits: SynthesisLimits,
) -> Vec<Category> {
    modules
        .iter()
        .filter(|module| {
            let usable = module.available && !module.is_empty();
            if !usable {
                debug!(module = %module.name, available = module.available, "skipping module");
            }
            usable
        })
        .map(|module| synthesize_module(registry, module, limits))
        .collect()
}

fn module_call(module: &str, member: &str, params: &[String], free_args: bool) -> CallRule {
    CallRule {
        callee: format!("{}.{}", module, member),
        params: params.to_vec(),
        free_args,
        fallback: ArgFallback::Blank,
    }
}

fn register_call(
    registry: &mut BlockRegistry,
    base: String,
    call: CallRule,
    shape: Shape,
    category: &str,
) -> (String, bool) {
    let type_id = claim_type_id(registry, base, &call.callee, shape);
    let schema = call
        .schema(&type_id, shape)
        .in_category(category)
        .with_hue(hash_hue(category))
        .with_tooltip(format!("{}({})", call.callee, call.params.join(", ")));
    let new = registry.register(schema, EmitRule::Call(call));
    (type_id, new)
}

/// Sanitizing can map two members onto one id (`a_b.c` and `a.b_c`). An id held by
/// a block emitting different text gets a digest suffix derived from `target`.
fn claim_type_id(
    registry: &BlockRegistry,
    base: String,
    target: &str,
    shape: Shape,
) -> String {
    let Ok(existing) = registry.lookup(&base) else {
        return base;
    };
    let same_target = match &existing.rule {
        EmitRule::Call(call) => call.callee == target,
        EmitRule::Constant(text) => text == target,
        _ => false,
    };
    if same_target && existing.schema.shape == shape {
        return base;
    }
    let digest = format!("{:x}", md5::compute(format!("{}:{:?}", target, shape)));
    let type_id = format!("{}_{}", base, &digest[..8]);
    debug!(base = %base, type_id = %type_id, member = target, "type id taken by another member");
    type_id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(json: &str) -> ImportedModuleDescriptor {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn ids_are_sanitized() {
        assert_eq!(function_type_id("os.path", "join"), "import_os_path_join");
        assert_eq!(constant_type_id("my-mod", "PI"), "import_my_mod_const_PI");
        assert_eq!(statement_type_id("m", "f"), "import_m_f_stmt");
    }

    #[test]
    fn caps_limit_statement_calls_and_constants() {
        let functions = (0..25)
            .map(|i| format!(r#"{{"name": "f{}", "params": []}}"#, i))
            .collect::<Vec<_>>()
            .join(",");
        let constants = (0..20)
            .map(|i| format!(r#"{{"name": "C{}"}}"#, i))
            .collect::<Vec<_>>()
            .join(",");
        let module = descriptor(&format!(
            r#"{{"name": "big", "functions": [{}], "constants": [{}]}}"#,
            functions, constants
        ));
        let mut registry = BlockRegistry::new();
        let category = synthesize_module(&mut registry, &module, SynthesisLimits::default());
        assert_eq!(category.block_types.len(), 25 + 20 + 15);
        assert!(registry.contains("import_big_f19_stmt"));
        assert!(!registry.contains("import_big_f20_stmt"));
        assert!(registry.contains("import_big_const_C14"));
        assert!(!registry.contains("import_big_const_C15"));

        let tight = SynthesisLimits {
            statement_calls: 1,
            constants: 0,
        };
        let mut registry = BlockRegistry::new();
        let category = synthesize_module(&mut registry, &module, tight);
        assert_eq!(category.block_types.len(), 26);
    }

    #[test]
    fn synthesis_is_idempotent() {
        let module = descriptor(
            r#"{"name": "mathx", "functions": [{"name": "square", "params": ["n"]}],
                "constants": [{"name": "TAU", "type": "float"}]}"#,
        );
        let mut registry = BlockRegistry::new();
        let first = synthesize_module(&mut registry, &module, SynthesisLimits::default());
        let count = registry.len();
        let second = synthesize_module(&mut registry, &module, SynthesisLimits::default());
        assert_eq!(first, second);
        assert_eq!(registry.len(), count);
        assert_eq!(first.colour, hue_to_hex(hash_hue("mathx")));
    }

    #[test]
    fn colliding_ids_keep_their_own_callee() {
        let modules = parse_descriptors(
            r#"[{"name": "a_b", "functions": [{"name": "c"}]},
                {"name": "a", "functions": [{"name": "b_c"}]},
                {"name": "m", "functions": [{"name": "f"}, {"name": "f_stmt"}]}]"#,
        )
        .unwrap();
        let mut registry = BlockRegistry::new();
        let categories = synthesize_scan(&mut registry, &modules, SynthesisLimits::default());

        let callee = |type_id: &str| {
            let definition = registry.lookup(type_id).unwrap();
            definition.call_rule().unwrap().callee.clone()
        };
        assert_eq!(categories[0].block_types[0], "import_a_b_c");
        assert_eq!(callee("import_a_b_c"), "a_b.c");
        let other = &categories[1].block_types[0];
        assert_ne!(other, "import_a_b_c");
        assert!(other.starts_with("import_a_b_c_"));
        assert_eq!(callee(other.as_str()), "a.b_c");

        let m = &categories[2].block_types;
        assert_eq!(m.len(), 4);
        assert_eq!(m[0], "import_m_f");
        assert_eq!(m[1], "import_m_f_stmt");
        assert_eq!(callee(m[1].as_str()), "m.f_stmt");
        assert!(m[2].starts_with("import_m_f_stmt_"));
        assert_eq!(callee(m[2].as_str()), "m.f");
        assert_eq!(registry.lookup(&m[2]).unwrap().schema.shape, Shape::Statement);
        assert_eq!(m[3], "import_m_f_stmt_stmt");

        let again = synthesize_scan(&mut registry, &modules, SynthesisLimits::default());
        assert_eq!(again, categories);
    }

    #[test]
    fn unavailable_or_empty_modules_are_skipped() {
        let modules = parse_descriptors(
            r#"{"imports": [
                {"name": "missing", "available": false, "functions": [{"name": "f"}]},
                {"name": "hollow"},
                {"moduleName": "json", "functions": [{"name": "dumps", "parameterNames": ["obj"]}]}
            ]}"#,
        )
        .unwrap();
        let mut registry = BlockRegistry::new();
        let categories = synthesize_scan(&mut registry, &modules, SynthesisLimits::default());
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].name, "json");
        let call = registry.lookup("import_json_dumps").unwrap().call_rule().unwrap();
        assert_eq!(call.params, vec!["obj".to_string()]);
    }
}
