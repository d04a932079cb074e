pub mod args;
pub mod catalog;
pub mod custom;
pub mod emit;
pub mod error;
pub mod imports;
pub mod order;
pub mod palette;
pub mod registry;
pub mod rules;
pub mod schema;
pub mod workspace;
pub mod xml;

#[cfg(not(target_arch = "wasm32"))]
pub mod bundle;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(not(target_arch = "wasm32"))]
pub mod logging;

#[cfg(not(target_arch = "wasm32"))]
pub mod runner;

#[cfg(all(target_arch = "wasm32", feature = "wasm-bindings"))]
pub mod wasm;

use anyhow::{Context, Result};
use custom::{my_blocks_category, program_source, register_custom_block, CustomBlockDefinition};
use emit::{workspace_to_code, EmitOptions};
use imports::{synthesize_scan, ImportedModuleDescriptor, SynthesisLimits};
use palette::Category;
use registry::BlockRegistry;
use std::path::{Path, PathBuf};

pub struct Toolbox {
    pub registry: BlockRegistry,
    pub custom_blocks: Vec<CustomBlockDefinition>,
    pub imports: Vec<ImportedModuleDescriptor>,
    import_categories: Vec<Category>,
    limits: SynthesisLimits,
}

impl Toolbox {
    pub fn new(limits: SynthesisLimits) -> Self {
        Self {
            registry: BlockRegistry::with_builtins(),
            custom_blocks: Vec::new(),
            imports: Vec::new(),
            import_categories: Vec::new(),
            limits,
        }
    }

    pub fn add_custom_blocks(&mut self, definitions: Vec<CustomBlockDefinition>) {
        for definition in definitions {
            register_custom_block(&mut self.registry, &definition);
            if !self.custom_blocks.iter().any(|d| d.safe_name() == definition.safe_name()) {
                self.custom_blocks.push(definition);
            }
        }
    }

    /// Synthesizes blocks for `modules`. A module seen before is not added twice.
    pub fn add_imports(&mut self, modules: Vec<ImportedModuleDescriptor>) {
        let fresh = modules
            .into_iter()
            .filter(|m| !self.imports.iter().any(|known| known.name == m.name))
            .collect::<Vec<_>>();
        let categories = synthesize_scan(&mut self.registry, &fresh, self.limits);
        self.import_categories.extend(categories);
        self.imports.extend(fresh);
    }

    /// Stock categories, then "My Blocks" when there are custom blocks, then one
    /// category per imported module.
    pub fn categories(&self) -> Vec<Category> {
        let mut categories = catalog::stock_categories(&self.registry);
        if !self.custom_blocks.is_empty() {
            categories.push(my_blocks_category(&self.custom_blocks));
        }
        categories.extend(self.import_categories.iter().cloned());
        categories
    }
}

pub fn generate_python(
    workspace_xml: &str,
    custom_blocks_json: &str,
    imports_json: &str,
) -> Result<String> {
    let mut toolbox = Toolbox::new(SynthesisLimits::default());
    if !custom_blocks_json.trim().is_empty() {
        let definitions = serde_json::from_str(custom_blocks_json)
            .context("Invalid custom block definitions.")?;
        toolbox.add_custom_blocks(definitions);
    }
    if !imports_json.trim().is_empty() {
        toolbox.add_imports(imports::parse_descriptors(imports_json)?);
    }
    let workspace = xml::text_to_graph(workspace_xml)?;
    let options = EmitOptions::default();
    let code = workspace_to_code(&toolbox.registry, &workspace, &options)?;
    Ok(program_source(&toolbox.custom_blocks, &code, &options))
}

#[cfg(not(target_arch = "wasm32"))]
pub fn run_cli(args: &cli::Args) -> Result<()> {
    use runner::{Executor, ImportScanner, PythonRuntime};

    let writes_file = args.output.as_deref().is_some_and(|p| p != Path::new("-"));
    let total_stages = 4
        + usize::from(args.scan)
        + usize::from(args.bundle.is_some())
        + usize::from(args.run);
    let progress = CliProgress::new("Compile", total_stages);
    let mut stage = 0usize;

    stage += 1;
    progress.emit(stage, "Resolving input path");
    let input = canonicalize_file(&args.input)?;

    stage += 1;
    progress.emit(stage, "Loading workspace and block definitions");
    let limits = SynthesisLimits {
        statement_calls: args.max_statement_calls,
        constants: args.max_constants,
    };
    let mut toolbox = Toolbox::new(limits);
    let workspace = if is_bundle(&input)? {
        let project = bundle::read_bundle(&input)?;
        toolbox.add_custom_blocks(project.custom_blocks);
        toolbox.add_imports(project.imports);
        xml::text_to_graph(&project.workspace_xml)
            .with_context(|| format!("Invalid workspace.xml in '{}'.", input.display()))?
    } else {
        let text = std::fs::read_to_string(&input)
            .with_context(|| format!("Failed to read '{}'.", input.display()))?;
        xml::text_to_graph(&text)
            .with_context(|| format!("Invalid Blockly XML in '{}'.", input.display()))?
    };
    if let Some(path) = &args.custom_blocks {
        toolbox.add_custom_blocks(custom::load_custom_blocks(path)?);
    }
    if let Some(path) = &args.imports {
        toolbox.add_imports(imports::load_descriptors(path)?);
    }

    let options = EmitOptions::with_indent_width(args.indent);
    let runtime = PythonRuntime::new(&args.python);

    if args.scan {
        stage += 1;
        progress.emit(stage, "Scanning imports");
        let mut preview = emit::LivePreview::new();
        let draft = preview.refresh(&toolbox.registry, &workspace, &options).to_string();
        let draft_source = program_source(&toolbox.custom_blocks, &draft, &options);
        let modules = runtime.scan_imports(&draft_source)?;
        toolbox.add_imports(modules);
    }

    if args.categories {
        stage += 1;
        progress.emit(stage, "Writing palette categories");
        let json = serde_json::to_string_pretty(&toolbox.categories())?;
        return write_output(args.output.as_deref(), &format!("{}\n", json));
    }

    stage += 1;
    progress.emit(stage, "Generating Python");
    let code = workspace_to_code(&toolbox.registry, &workspace, &options)
        .with_context(|| format!("Failed to compile '{}'.", input.display()))?;
    let source = program_source(&toolbox.custom_blocks, &code, &options);

    stage += 1;
    progress.emit(stage, "Writing program");
    if !args.run || writes_file {
        let text = if args.no_prologue { &code } else { &source };
        write_output(args.output.as_deref(), text)?;
    }

    if let Some(path) = &args.bundle {
        stage += 1;
        progress.emit(stage, "Writing project bundle");
        let project = bundle::Project::new(
            &workspace,
            &toolbox.registry,
            toolbox.custom_blocks.clone(),
            toolbox.imports.clone(),
            source.clone(),
        )?;
        bundle::write_bundle(&project, path)?;
    }

    if args.run {
        stage += 1;
        progress.emit(stage, "Running program");
        let result = runtime.execute(&source)?;
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
        if result.exit_code != 0 {
            anyhow::bail!("Program exited with code {}.", result.exit_code);
        }
    }

    Ok(())
}

pub fn canonicalize_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() || !path.is_file() {
        return Err(anyhow::anyhow!("Input file not found: '{}'.", path.display()));
    }
    Ok(path.canonicalize()?)
}

#[cfg(not(target_arch = "wasm32"))]
fn is_bundle(path: &Path) -> Result<bool> {
    if path.extension().is_some_and(|ext| ext == "pyblocks") {
        return Ok(true);
    }
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read '{}'.", path.display()))?;
    Ok(bytes.starts_with(b"PK\x03\x04"))
}

#[cfg(not(target_arch = "wasm32"))]
fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) if path != Path::new("-") => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write '{}'.", path.display()))
        }
        _ => {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
struct CliProgress {
    prefix: &'static str,
    total: usize,
}

#[cfg(not(target_arch = "wasm32"))]
impl CliProgress {
    fn new(prefix: &'static str, total: usize) -> Self {
        Self {
            prefix,
            total: total.max(1),
        }
    }

    fn emit(&self, step: usize, label: &str) {
        let step = step.clamp(1, self.total);
        let bar = render_progress_bar(step, self.total, 14);
        eprintln!(
            "[{}] {}... ({}/{}) {}",
            self.prefix, label, step, self.total, bar
        );
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    let width = width.max(1);
    let filled = ((step * width) + (total / 2)) / total;
    let mut s = String::with_capacity(width + 2);
    s.push('[');
    for i in 0..width {
        s.push(if i < filled { '=' } else { '-' });
    }
    s.push(']');
    s
}
