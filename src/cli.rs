use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pyblocks",
    about = "Compile a Blockly block workspace into a Python program."
)]
pub struct Args {
    #[arg(value_name = "INPUT", help = "Blockly XML workspace or .pyblocks bundle.")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT", help = "Where to write the Python program ('-' for stdout).")]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "JSON", help = "Custom block definitions to register and emit.")]
    pub custom_blocks: Option<PathBuf>,

    #[arg(long, value_name = "JSON", help = "Import descriptors to synthesize blocks from.")]
    pub imports: Option<PathBuf>,

    #[arg(
        long,
        help = "Scan the program's imports with the Python interpreter before emitting."
    )]
    pub scan: bool,

    #[arg(long, help = "Do not prepend custom block definitions to the program.")]
    pub no_prologue: bool,

    #[arg(long, help = "Run the generated program and print its output.")]
    pub run: bool,

    #[arg(long, value_name = "PATH", help = "Also write a .pyblocks project bundle.")]
    pub bundle: Option<PathBuf>,

    #[arg(long, help = "Print the palette categories as JSON instead of the program.")]
    pub categories: bool,

    #[arg(long, default_value_t = 2, help = "Spaces per indentation level.")]
    pub indent: usize,

    #[arg(
        long,
        default_value_t = crate::imports::DEFAULT_STATEMENT_CALL_LIMIT,
        help = "Imported functions that also get a statement block."
    )]
    pub max_statement_calls: usize,

    #[arg(
        long,
        default_value_t = crate::imports::DEFAULT_CONSTANT_LIMIT,
        help = "Imported constants that get a block."
    )]
    pub max_constants: usize,

    #[arg(long, default_value = "python3", help = "Python interpreter for --run and --scan.")]
    pub python: PathBuf,

    #[arg(short, long, action = clap::ArgAction::Count, help = "More log output (-v, -vv).")]
    pub verbose: u8,
}
