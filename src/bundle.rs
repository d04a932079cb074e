use crate::custom::CustomBlockDefinition;
use crate::imports::ImportedModuleDescriptor;
use crate::registry::BlockRegistry;
use crate::workspace::Workspace;
use crate::xml::graph_to_text;
use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::ZipArchive;

const BUNDLE_FORMAT: &str = "pyblocks";
const BUNDLE_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub workspace_xml: String,
    pub block_count: usize,
    pub custom_blocks: Vec<CustomBlockDefinition>,
    pub imports: Vec<ImportedModuleDescriptor>,
    pub source: String,
}

impl Project {
    pub fn new(
        workspace: &Workspace,
        registry: &BlockRegistry,
        custom_blocks: Vec<CustomBlockDefinition>,
        imports: Vec<ImportedModuleDescriptor>,
        source: String,
    ) -> Result<Self> {
        let workspace_xml =
            graph_to_text(workspace, registry).context("Failed to serialize workspace.")?;
        Ok(Self {
            workspace_xml,
            block_count: workspace.len(),
            custom_blocks,
            imports,
            source,
        })
    }
}

pub fn write_bundle(project: &Project, output_path: &Path) -> Result<()> {
    let bytes = build_bundle_bytes(project)?;
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output_path, bytes)
        .with_context(|| format!("Failed to write '{}'.", output_path.display()))?;
    debug!(path = %output_path.display(), "wrote project bundle");
    Ok(())
}

pub fn build_bundle_bytes(project: &Project) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::<u8>::new());
    let mut zip = zip::ZipWriter::new(&mut out);
    let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": BUNDLE_VERSION,
        "source_md5": source_digest(&project.source),
        "block_count": project.block_count,
    });

    zip.start_file("manifest.json", opts)?;
    zip.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;

    zip.start_file("workspace.xml", opts)?;
    zip.write_all(project.workspace_xml.as_bytes())?;

    zip.start_file("custom_blocks.json", opts)?;
    zip.write_all(serde_json::to_string_pretty(&project.custom_blocks)?.as_bytes())?;

    zip.start_file("imports.json", opts)?;
    zip.write_all(serde_json::to_string_pretty(&project.imports)?.as_bytes())?;

    zip.start_file("main.py", opts)?;
    zip.write_all(project.source.as_bytes())?;

    zip.finish()?;
    Ok(out.into_inner())
}

pub fn read_bundle(path: &Path) -> Result<Project> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read '{}'.", path.display()))?;
    read_bundle_bytes(&bytes)
}

pub fn read_bundle_bytes(bytes: &[u8]) -> Result<Project> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))
        .map_err(|_| anyhow!("Input is not a valid .pyblocks archive."))?;

    let manifest_text = read_zip_entry_text(&mut zip, "manifest.json")?;
    let workspace_xml = read_zip_entry_text(&mut zip, "workspace.xml")?;
    let custom_text = read_zip_entry_text(&mut zip, "custom_blocks.json")?;
    let imports_text = read_zip_entry_text(&mut zip, "imports.json")?;
    let source = read_zip_entry_text(&mut zip, "main.py")?;

    let manifest: Value = serde_json::from_str(&manifest_text)
        .context("Invalid manifest.json in .pyblocks archive.")?;
    let format = manifest
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if format != BUNDLE_FORMAT {
        bail!("Invalid .pyblocks archive format '{}'.", format);
    }
    let version = manifest
        .get("version")
        .and_then(Value::as_u64)
        .unwrap_or_default();
    if version != BUNDLE_VERSION {
        bail!(
            "Unsupported .pyblocks version {} (expected {}).",
            version,
            BUNDLE_VERSION
        );
    }

    let expected = manifest
        .get("source_md5")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let actual = source_digest(&source);
    if expected != actual {
        warn!(expected, actual = %actual, "main.py was edited outside the block editor");
    }
    let block_count = manifest
        .get("block_count")
        .and_then(Value::as_u64)
        .unwrap_or_default() as usize;

    let custom_blocks = serde_json::from_str(&custom_text)
        .context("Invalid custom_blocks.json in .pyblocks archive.")?;
    let imports = serde_json::from_str(&imports_text)
        .context("Invalid imports.json in .pyblocks archive.")?;

    Ok(Project {
        workspace_xml,
        block_count,
        custom_blocks,
        imports,
        source,
    })
}

fn read_zip_entry_text<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> Result<String> {
    let mut entry = zip
        .by_name(name)
        .with_context(|| format!("Missing '{}' in .pyblocks archive.", name))?;
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .with_context(|| format!("Failed reading '{}' from .pyblocks archive.", name))?;
    Ok(text)
}

fn source_digest(source: &str) -> String {
    format!("{:x}", md5::compute(source.as_bytes()))
}
