use crate::error::BlockError;
use crate::order::Order;
use crate::registry::BlockRegistry;
use crate::rules::Emission;
use crate::schema::{BlockSchema, FieldKind, SlotKind};
use crate::workspace::{Block, BlockId, Workspace};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitOptions {
    /// One indentation unit. Spaces only.
    pub indent: String,
    pub placeholder: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
            placeholder: "pass".to_string(),
        }
    }
}

impl EmitOptions {
    pub fn with_indent_width(width: usize) -> Self {
        Self {
            indent: " ".repeat(width.max(1)),
            ..Self::default()
        }
    }
}

pub struct Generator<'a> {
    registry: &'a BlockRegistry,
    workspace: &'a Workspace,
    options: &'a EmitOptions,
    active: HashSet<BlockId>,
}

impl<'a> Generator<'a> {
    pub fn new(
        registry: &'a BlockRegistry,
        workspace: &'a Workspace,
        options: &'a EmitOptions,
    ) -> Self {
        Self {
            registry,
            workspace,
            options,
            active: HashSet::new(),
        }
    }

    pub fn options(&self) -> &EmitOptions {
        self.options
    }

    pub fn block_to_code(&mut self, id: BlockId) -> Result<Emission, BlockError> {
        if !self.active.insert(id) {
            return Err(BlockError::Cycle(id));
        }
        let result = self.emit_block(id);
        self.active.remove(&id);
        result
    }

    fn emit_block(&mut self, id: BlockId) -> Result<Emission, BlockError> {
        let workspace = self.workspace;
        let registry = self.registry;
        let block = workspace.get(id)?;
        let definition = registry.lookup(&block.type_id)?;
        definition.rule.emit(self, block, definition.schema.shape)
    }

    /// Renders the block plugged into `slot`, bracketed against `required`.
    /// An empty slot yields the schema default.
    pub fn value(
        &mut self,
        block: &Block,
        slot: &str,
        required: Order,
    ) -> Result<String, BlockError> {
        match self.value_opt(block, slot, required)? {
            Some(code) => Ok(code),
            None => Ok(self
                .schema_of(block)
                .and_then(|schema| schema.default_text(slot))
                .unwrap_or_default()
                .to_string()),
        }
    }

    pub fn value_opt(
        &mut self,
        block: &Block,
        slot: &str,
        required: Order,
    ) -> Result<Option<String>, BlockError> {
        let Some(child) = block.input(slot) else {
            return Ok(None);
        };
        match self.block_to_code(child)? {
            Emission::Expression(code, produced) => Ok(Some(Order::wrap(code, produced, required))),
            Emission::Statement(_) => Err(BlockError::ShapeMismatch {
                parent: block.id,
                child,
                slot: slot.to_string(),
                reason: "block has no output",
            }),
        }
    }

    pub fn statement(&mut self, block: &Block, slot: &str) -> Result<String, BlockError> {
        let body = match block.input(slot) {
            Some(head) => self.sequence(head)?,
            None => String::new(),
        };
        if body.trim().is_empty() {
            return Ok(format!("{}{}\n", self.options.indent, self.options.placeholder));
        }
        Ok(indent_lines(&body, &self.options.indent))
    }

    pub fn sequence(&mut self, head: BlockId) -> Result<String, BlockError> {
        let mut code = String::new();
        let mut seen = HashSet::new();
        let mut current = Some(head);
        while let Some(id) = current {
            if !seen.insert(id) {
                return Err(BlockError::Cycle(id));
            }
            match self.block_to_code(id)? {
                Emission::Statement(text) => code.push_str(&text),
                Emission::Expression(text, _) => {
                    code.push_str(&text);
                    code.push('\n');
                }
            }
            current = self.workspace.get(id)?.next;
        }
        Ok(code)
    }

    /// Literal field value, validated against the slot's kind. Missing or invalid
    /// values fall back to the schema default.
    pub fn field(&self, block: &Block, name: &str) -> String {
        let slot = self.schema_of(block).and_then(|schema| schema.slot(name));
        let default = slot
            .and_then(|s| s.default.clone())
            .unwrap_or_default();
        let Some(raw) = block.field(name) else {
            return default;
        };
        match slot.map(|s| &s.kind) {
            Some(SlotKind::Literal(FieldKind::Number)) => normalize_number(raw).unwrap_or(default),
            Some(SlotKind::Literal(FieldKind::Choice(options))) => {
                if options.iter().any(|o| o == raw) {
                    raw.to_string()
                } else {
                    default
                }
            }
            _ => raw.to_string(),
        }
    }

    pub fn root_to_code(&mut self, root: BlockId) -> Result<String, BlockError> {
        self.active.clear();
        self.sequence(root)
    }

    fn schema_of(&self, block: &Block) -> Option<&'a BlockSchema> {
        let registry = self.registry;
        registry.lookup(&block.type_id).ok().map(|d| &d.schema)
    }
}

/// Renders every top-level stack; the first failing stack aborts the walk.
pub fn workspace_to_code(
    registry: &BlockRegistry,
    workspace: &Workspace,
    options: &EmitOptions,
) -> Result<String, BlockError> {
    let mut gen = Generator::new(registry, workspace, options);
    let mut stacks = Vec::new();
    for root in workspace.top_blocks() {
        stacks.push(gen.root_to_code(root)?);
    }
    Ok(finish(&stacks.join("\n")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub root: BlockId,
    pub message: String,
}

/// Fail-soft compilation for an editor preview. A stack that fails to render keeps
/// the text it produced on the last successful refresh.
#[derive(Debug, Default)]
pub struct LivePreview {
    cache: HashMap<BlockId, String>,
    code: String,
    diagnostics: Vec<Diagnostic>,
}

impl LivePreview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh(
        &mut self,
        registry: &BlockRegistry,
        workspace: &Workspace,
        options: &EmitOptions,
    ) -> &str {
        let mut gen = Generator::new(registry, workspace, options);
        let mut cache = HashMap::new();
        let mut stacks = Vec::new();
        self.diagnostics.clear();

        for root in workspace.top_blocks() {
            match gen.root_to_code(root) {
                Ok(code) => {
                    cache.insert(root, code.clone());
                    stacks.push(code);
                }
                Err(err) => {
                    warn!(root = %root, error = %err, "block stack failed to compile");
                    self.diagnostics.push(Diagnostic {
                        root,
                        message: err.to_string(),
                    });
                    if let Some(previous) = self.cache.get(&root) {
                        cache.insert(root, previous.clone());
                        stacks.push(previous.clone());
                    }
                }
            }
        }

        self.cache = cache;
        self.code = finish(&stacks.join("\n"));
        &self.code
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

fn cached_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

pub fn finish(code: &str) -> String {
    static LEADING: OnceLock<Option<Regex>> = OnceLock::new();
    static TRAILING: OnceLock<Option<Regex>> = OnceLock::new();
    static LINE_END: OnceLock<Option<Regex>> = OnceLock::new();

    let mut out = code.to_string();
    if let Some(re) = cached_regex(&LEADING, r"^\s+\n") {
        out = re.replace(&out, "").into_owned();
    }
    if let Some(re) = cached_regex(&TRAILING, r"\n\s+$") {
        out = re.replace(&out, "\n").into_owned();
    }
    if let Some(re) = cached_regex(&LINE_END, r"[ \t]+\n") {
        out = re.replace_all(&out, "\n").into_owned();
    }
    out
}

pub fn indent_lines(code: &str, indent: &str) -> String {
    let mut out = String::with_capacity(code.len() + indent.len() * 4);
    for line in code.split_inclusive('\n') {
        if !line.trim().is_empty() {
            out.push_str(indent);
        }
        out.push_str(line);
    }
    out
}

fn normalize_number(raw: &str) -> Option<String> {
    let value: f64 = raw.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Some(format!("{}", value as i64))
    } else {
        Some(format!("{}", value))
    }
}
