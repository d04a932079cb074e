use crate::imports::{parse_descriptors, ImportedModuleDescriptor};
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the program was killed or ended by a signal.
    pub exit_code: i32,
    pub elapsed_seconds: f64,
}

pub trait Executor {
    fn execute(&self, source: &str) -> Result<ExecutionResult>;
}

pub trait ImportScanner {
    fn scan_imports(&self, source: &str) -> Result<Vec<ImportedModuleDescriptor>>;
}

/// Lists the top-level imports of the program in argv[1] and describes the public
/// surface of each one as JSON on stdout.
const SCAN_SCRIPT: &str = r#"
import ast, importlib, inspect, json, sys

with open(sys.argv[1], encoding="utf-8") as handle:
    code = handle.read()
try:
    tree = ast.parse(code)
except SyntaxError:
    print(json.dumps({"imports": []}))
    sys.exit(0)

names = set()
for node in ast.walk(tree):
    if isinstance(node, ast.Import):
        for alias in node.names:
            names.add(alias.name.split(".")[0])
    elif isinstance(node, ast.ImportFrom) and node.module:
        names.add(node.module.split(".")[0])

found = []
for name in sorted(names):
    info = {"name": name, "available": False, "installed": False,
            "functions": [], "classes": [], "constants": []}
    try:
        mod = importlib.import_module(name)
        info["available"] = True
    except Exception:
        found.append(info)
        continue
    try:
        seen = 0
        for member, obj in inspect.getmembers(mod):
            if member.startswith("_"):
                continue
            seen += 1
            if seen > 100:
                break
            if inspect.isfunction(obj) or inspect.isbuiltin(obj):
                if len(info["functions"]) >= 30:
                    continue
                try:
                    params = [p.name for p in list(inspect.signature(obj).parameters.values())[:10]
                              if p.name != "self"]
                except (ValueError, TypeError):
                    params = []
                info["functions"].append({"name": member, "params": params})
            elif inspect.isclass(obj):
                if len(info["classes"]) >= 10:
                    continue
                methods = []
                for method, value in inspect.getmembers(obj):
                    if method.startswith("_") and method != "__init__":
                        continue
                    if callable(value):
                        if len(methods) >= 10:
                            break
                        methods.append({"name": method, "params": []})
                info["classes"].append({"name": member, "methods": methods})
            elif not callable(obj):
                if len(info["constants"]) >= 15:
                    continue
                info["constants"].append({"name": member, "type": type(obj).__name__})
    except Exception:
        pass
    found.append(info)

print(json.dumps({"imports": found}))
"#;

#[derive(Debug, Clone)]
pub struct PythonRuntime {
    pub interpreter: PathBuf,
    pub timeout: Duration,
}

impl Default for PythonRuntime {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl PythonRuntime {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn run_script(&self, script: &Path, extra: &[&Path]) -> Result<ExecutionResult> {
        let mut stdout = tempfile::tempfile().context("Failed to create stdout capture file.")?;
        let mut stderr = tempfile::tempfile().context("Failed to create stderr capture file.")?;

        let start = Instant::now();
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?));
        let mut child = cmd.spawn().with_context(|| {
            format!(
                "Failed to start Python interpreter '{}'. Ensure it is installed or pass --python.",
                self.interpreter.display()
            )
        })?;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if start.elapsed() >= self.timeout {
                warn!(timeout = ?self.timeout, "python program timed out; killing it");
                child.kill()?;
                child.wait()?;
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };
        let elapsed_seconds = start.elapsed().as_secs_f64();

        let Some(status) = status else {
            return Ok(ExecutionResult {
                stdout: String::new(),
                stderr: format!("Execution timed out ({}s limit)", self.timeout.as_secs()),
                exit_code: -1,
                elapsed_seconds,
            });
        };
        Ok(ExecutionResult {
            stdout: read_capture(&mut stdout)?,
            stderr: read_capture(&mut stderr)?,
            exit_code: status.code().unwrap_or(-1),
            elapsed_seconds,
        })
    }
}

impl Executor for PythonRuntime {
    fn execute(&self, source: &str) -> Result<ExecutionResult> {
        let program = write_temp_script(source)?;
        let result = self.run_script(program.path(), &[])?;
        info!(
            exit_code = result.exit_code,
            elapsed = result.elapsed_seconds,
            "python program finished"
        );
        Ok(result)
    }
}

impl ImportScanner for PythonRuntime {
    fn scan_imports(&self, source: &str) -> Result<Vec<ImportedModuleDescriptor>> {
        let program = write_temp_script(source)?;
        let scanner = write_temp_script(SCAN_SCRIPT)?;
        let result = self.run_script(scanner.path(), &[program.path()])?;
        if result.exit_code != 0 {
            bail!(
                "Import scanner failed (exit code {}).\n{}",
                result.exit_code,
                result.stderr.trim()
            );
        }
        let modules = parse_descriptors(&result.stdout)
            .context("Import scanner printed invalid JSON.")?;
        debug!(modules = modules.len(), "import scan finished");
        Ok(modules)
    }
}

fn write_temp_script(source: &str) -> Result<NamedTempFile> {
    let mut temp = tempfile::Builder::new()
        .prefix("pyblocks-")
        .suffix(".py")
        .tempfile()
        .context("Failed to create temporary Python file.")?;
    temp.write_all(source.as_bytes())?;
    temp.flush()?;
    Ok(temp)
}

fn read_capture(file: &mut File) -> Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
